//! Out-of-band delivery of issued codes.
//!
//! The service renders the configured templates into a [`MailMessage`] and
//! hands it to a [`Mailer`]. Delivery either succeeds or fails as a whole; the
//! caller decides what a failure means for the pending challenge.
//!
//! Two mailers ship with the crate:
//!
//! - [`LogMailer`] records only the recipient and always succeeds. It is
//!   the default when no relay is configured and never writes the subject
//!   or body, either of which may carry the code.
//! - [`HttpMailer`] POSTs the message as JSON to a mail relay, optionally with
//!   a bearer token. Any transport error or non-2xx status is a failure.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

use super::config::{OtpConfig, OTP_PLACEHOLDER};
use crate::APP_USER_AGENT;

const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl std::fmt::Debug for MailMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailMessage")
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

/// Render the configured templates for `code`.
#[must_use]
pub fn render_message(config: &OtpConfig, code: u32, to: &str) -> MailMessage {
    let code = code.to_string();
    MailMessage {
        to: to.to_string(),
        subject: config.mail_subject().replace(OTP_PLACEHOLDER, &code),
        body: config.mail_body().replace(OTP_PLACEHOLDER, &code),
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `message` or report why it could not be delivered.
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        // Subject and body may carry the code.
        info!(to = %message.to, "otp mail logged, no relay configured");
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct HttpMailer {
    client: Client,
    endpoint: Url,
    token: Option<SecretString>,
}

impl HttpMailer {
    /// # Errors
    /// Fails when the URL is not an absolute http(s) URL or the client cannot be built.
    pub fn new(endpoint: &str, token: Option<SecretString>) -> Result<Self> {
        let endpoint = parse_relay_url(endpoint)?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(RELAY_TIMEOUT)
            .build()
            .context("Failed to build mail relay client")?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Accept only absolute http(s) URLs with a host.
///
/// # Errors
/// Returns a description of what is wrong with `raw`.
pub fn parse_relay_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid mail relay URL: {raw}"))?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(anyhow!("Unsupported mail relay scheme: {scheme}")),
    }
    if url.host_str().is_none() {
        return Err(anyhow!("Mail relay URL has no host: {raw}"));
    }
    Ok(url)
}

#[async_trait]
impl Mailer for HttpMailer {
    #[instrument(skip_all, fields(to = %message.to))]
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let mut request = self.client.post(self.endpoint.clone()).json(message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Mail relay request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} - {status}, {body}", self.endpoint));
        }

        debug!(%status, "mail relay accepted message");
        Ok(())
    }
}
