use crate::{
    api::{self, OtpState},
    cli::telemetry,
    otp::{
        HttpMailer, InMemorySessionStore, LogMailer, Mailer, NoopRateLimiter, OtpConfig,
        OtpService, RateLimiter, SystemClock, WindowRateLimiter,
    },
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub config: OtpConfig,
    pub cookie_secure: bool,
    pub mail_relay_url: Option<String>,
    pub mail_relay_token: Option<SecretString>,
    pub rate_limit_attempts: u32,
    pub rate_limit_window_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the mail relay URL is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let mailer = build_mailer(args.mail_relay_url.as_deref(), args.mail_relay_token)?;
    let limiter = build_rate_limiter(args.rate_limit_attempts, args.rate_limit_window_seconds);

    let service = OtpService::new(args.config, Arc::new(InMemorySessionStore::new()), mailer)
        .with_rate_limiter(limiter);
    let state = OtpState::new(service, Arc::new(SystemClock)).with_cookie_secure(args.cookie_secure);

    let result = api::new(args.port, Arc::new(state)).await;

    telemetry::shutdown_tracer();

    result
}

fn build_mailer(relay_url: Option<&str>, token: Option<SecretString>) -> Result<Arc<dyn Mailer>> {
    match relay_url {
        Some(url) => {
            let mailer = HttpMailer::new(url, token).context("invalid mail relay URL")?;
            info!(endpoint = %mailer.endpoint(), "Delivering OTP mail through HTTP relay");
            Ok(Arc::new(mailer))
        }
        None => {
            warn!("No mail relay configured; OTP mails are logged, not delivered");
            Ok(Arc::new(LogMailer))
        }
    }
}

fn build_rate_limiter(attempts: u32, window_seconds: u64) -> Arc<dyn RateLimiter> {
    if attempts == 0 {
        Arc::new(NoopRateLimiter)
    } else {
        Arc::new(WindowRateLimiter::new(attempts, window_seconds))
    }
}

fn log_startup_args(args: &Args) {
    info!(
        port = args.port,
        otp_timeout_seconds = args.config.timeout_seconds(),
        roles = ?args.config.roles(),
        cookie_secure = args.cookie_secure,
        rate_limit_attempts = args.rate_limit_attempts,
        rate_limit_window_seconds = args.rate_limit_window_seconds,
        "Starting otpgate"
    );
    if args.config.debug() {
        warn!("Debug mode enabled: issued codes are written to the log");
    }
}
