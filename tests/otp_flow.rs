use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use otpgate::{
    api::{self, OtpState},
    otp::{FixedClock, InMemorySessionStore, MailMessage, Mailer, OtpConfig, OtpService},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const USER_EMAIL: &str = "alice@example.com";

#[derive(Debug, Deserialize, PartialEq, Eq)]
struct Reply {
    status: bool,
    message: String,
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    fn count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or_default()
    }

    /// The code from the most recent mail body.
    fn last_code(&self) -> Result<String> {
        let sent = self
            .sent
            .lock()
            .map_err(|_| anyhow::anyhow!("mailer lock poisoned"))?;
        let body = &sent.last().context("no mail sent")?.body;
        let code: String = body.chars().filter(char::is_ascii_digit).collect();
        anyhow::ensure!(code.len() == 5, "unexpected mail body: {body}");
        Ok(code)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("mailer lock poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

struct Harness {
    app: Router,
    mailer: Arc<RecordingMailer>,
    clock: Arc<FixedClock>,
    cookie: Option<String>,
}

impl Harness {
    fn new(config: OtpConfig) -> Self {
        let mailer = Arc::new(RecordingMailer::default());
        let clock = Arc::new(FixedClock::new(1_700_000_000));
        let service = OtpService::new(
            config,
            Arc::new(InMemorySessionStore::new()),
            mailer.clone(),
        );
        let state = OtpState::new(service, clock.clone());
        Self {
            app: api::app(Arc::new(state)),
            mailer,
            clock,
            cookie: None,
        }
    }

    fn default_config() -> OtpConfig {
        OtpConfig::new(
            "Your verification code".to_string(),
            "Your code is [OTP]".to_string(),
        )
    }

    async fn call(&mut self, request: Request<Body>) -> Result<Response> {
        let response = self.app.clone().oneshot(request).await?;
        if let Some(cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
        {
            self.cookie = Some(cookie.to_string());
        }
        Ok(response)
    }

    fn request(&self, method: Method, uri: &str) -> axum::http::request::Builder {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-otpgate-user-email", USER_EMAIL);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder
    }

    async fn send(&mut self, email: &str) -> Result<(StatusCode, Reply)> {
        let request = self
            .request(Method::POST, "/v1/otp/send")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "form_id": "contact", "email": email }).to_string(),
            ))?;
        let response = self.call(request).await?;
        Ok((response.status(), reply(response).await?))
    }

    async fn validate(&mut self, answer: &str) -> Result<Reply> {
        let request = self
            .request(Method::POST, "/validate/otp?form=contact")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!(answer).to_string()))?;
        let response = self.call(request).await?;
        anyhow::ensure!(response.status() == StatusCode::OK, "{}", response.status());
        reply(response).await
    }

    async fn submit(&mut self, email: &str) -> Result<StatusCode> {
        let request = self
            .request(Method::POST, "/v1/otp/submit")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "form_id": "contact", "email": email }).to_string(),
            ))?;
        Ok(self.call(request).await?.status())
    }
}

async fn reply(response: Response) -> Result<Reply> {
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&body)?)
}

fn wrong_code(code: &str) -> &'static str {
    if code == "12345" {
        "54321"
    } else {
        "12345"
    }
}

#[tokio::test]
async fn send_verify_submit() -> Result<()> {
    let mut harness = Harness::new(Harness::default_config());

    let (status, sent) = harness.send(USER_EMAIL).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(sent.status);
    assert_eq!(
        sent.message,
        format!("An OTP has been sent to your email {USER_EMAIL}")
    );
    assert!(harness.cookie.is_some());
    let code = harness.mailer.last_code()?;

    let (_, again) = harness.send(USER_EMAIL).await?;
    assert_eq!(
        again.message,
        format!("An OTP has already been sent to {USER_EMAIL}")
    );
    assert_eq!(harness.mailer.count(), 1);

    assert_eq!(harness.submit(USER_EMAIL).await?, StatusCode::FORBIDDEN);

    let invalid = harness.validate(wrong_code(&code)).await?;
    assert_eq!(
        invalid,
        Reply {
            status: false,
            message: "Invalid otp entered".to_string()
        }
    );

    let valid = harness.validate(&code).await?;
    assert_eq!(
        valid,
        Reply {
            status: true,
            message: "Otp has been verified".to_string()
        }
    );

    assert_eq!(harness.submit(USER_EMAIL).await?, StatusCode::NO_CONTENT);
    // Submitting does not consume the verification.
    assert_eq!(harness.submit(USER_EMAIL).await?, StatusCode::NO_CONTENT);

    let (_, verified) = harness.send(USER_EMAIL).await?;
    assert_eq!(verified.message, "You Are Verified");
    Ok(())
}

#[tokio::test]
async fn changing_email_after_verification_resets() -> Result<()> {
    let mut harness = Harness::new(Harness::default_config());

    harness.send(USER_EMAIL).await?;
    let code = harness.mailer.last_code()?;
    assert!(harness.validate(&code).await?.status);

    assert_eq!(
        harness.submit("mallory@example.com").await?,
        StatusCode::FORBIDDEN
    );
    // The slot was reset, the original address has to verify again.
    assert_eq!(harness.submit(USER_EMAIL).await?, StatusCode::FORBIDDEN);

    let (status, resent) = harness.send(USER_EMAIL).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(resent.message.starts_with("An OTP has been sent"));
    assert_eq!(harness.mailer.count(), 2);
    Ok(())
}

#[tokio::test]
async fn expired_codes_time_out() -> Result<()> {
    let mut harness = Harness::new(Harness::default_config());

    harness.send(USER_EMAIL).await?;
    let code = harness.mailer.last_code()?;
    harness.clock.advance(301);

    let expired = harness.validate(&code).await?;
    assert_eq!(
        expired,
        Reply {
            status: false,
            message: "Timeout".to_string()
        }
    );

    // A new request after expiry mails a fresh code.
    harness.send(USER_EMAIL).await?;
    assert_eq!(harness.mailer.count(), 2);
    Ok(())
}

#[tokio::test]
async fn unrelated_roles_skip_the_gate() -> Result<()> {
    let mut harness = Harness::new(Harness::default_config().with_roles(["editor"]));

    let request = harness
        .request(Method::POST, "/v1/otp/submit")
        .header("x-otpgate-user-roles", "subscriber")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "form_id": "contact" }).to_string()))?;
    assert_eq!(harness.call(request).await?.status(), StatusCode::NO_CONTENT);

    let request = harness
        .request(Method::POST, "/v1/otp/submit")
        .header("x-otpgate-user-roles", "editor")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "form_id": "contact" }).to_string()))?;
    assert_eq!(harness.call(request).await?.status(), StatusCode::FORBIDDEN);
    assert_eq!(harness.mailer.count(), 0);
    Ok(())
}

#[tokio::test]
async fn validate_requires_json() -> Result<()> {
    let mut harness = Harness::new(Harness::default_config());

    let request = harness
        .request(Method::POST, "/validate/otp?form=contact")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("otp=12345"))?;
    let response = harness.call(request).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("/")
    );

    let missing = harness.validate("").await?;
    assert!(!missing.status);
    assert_eq!(missing.message, "OTP field is required");
    Ok(())
}

#[tokio::test]
async fn health_and_docs_are_served() -> Result<()> {
    let mut harness = Harness::new(Harness::default_config());

    let health = harness.request(Method::GET, "/health").body(Body::empty())?;
    let response = harness.call(health).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));
    assert!(response.headers().contains_key("x-request-id"));

    let docs = harness
        .request(Method::GET, "/api-docs/openapi.json")
        .body(Body::empty())?;
    let response = harness.call(docs).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    let doc: serde_json::Value = serde_json::from_slice(&body)?;
    assert!(doc["paths"]["/validate/otp"].is_object());
    Ok(())
}
