use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::otp::config::{MAX_TIMEOUT_SECONDS, MIN_TIMEOUT_SECONDS};

pub const ARG_OTP_TIMEOUT: &str = "otp-timeout";
pub const ARG_DEBUG: &str = "debug";
pub const ARG_MAIL_SUBJECT: &str = "mail-subject";
pub const ARG_MAIL_BODY: &str = "mail-body";
pub const ARG_ROLES: &str = "roles";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_RATE_LIMIT_ATTEMPTS: &str = "rate-limit-attempts";
pub const ARG_RATE_LIMIT_WINDOW: &str = "rate-limit-window-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub timeout_seconds: u64,
    pub debug: bool,
    pub mail_subject: String,
    pub mail_body: String,
    pub roles: Vec<String>,
    pub cookie_secure: bool,
    pub rate_limit_attempts: u32,
    pub rate_limit_window_seconds: u64,
}

impl Options {
    /// Parse OTP arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required template is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let template = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            timeout_seconds: matches
                .get_one::<u64>(ARG_OTP_TIMEOUT)
                .copied()
                .unwrap_or(MIN_TIMEOUT_SECONDS),
            debug: matches.get_flag(ARG_DEBUG),
            mail_subject: template(ARG_MAIL_SUBJECT)?,
            mail_body: template(ARG_MAIL_BODY)?,
            roles: matches
                .get_many::<String>(ARG_ROLES)
                .map(|roles| roles.cloned().collect())
                .unwrap_or_default(),
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
            rate_limit_attempts: matches
                .get_one::<u32>(ARG_RATE_LIMIT_ATTEMPTS)
                .copied()
                .unwrap_or(0),
            rate_limit_window_seconds: matches
                .get_one::<u64>(ARG_RATE_LIMIT_WINDOW)
                .copied()
                .unwrap_or(900),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_TIMEOUT)
                .long(ARG_OTP_TIMEOUT)
                .help("Seconds a code stays valid (300-1800)")
                .env("OTPGATE_OTP_TIMEOUT")
                .default_value("300")
                .value_parser(
                    clap::value_parser!(u64).range(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS),
                ),
        )
        .arg(
            Arg::new(ARG_DEBUG)
                .long(ARG_DEBUG)
                .help("Log issued codes; never enable in production")
                .env("OTPGATE_DEBUG")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_MAIL_SUBJECT)
                .long(ARG_MAIL_SUBJECT)
                .help("Subject of the OTP mail")
                .env("OTPGATE_MAIL_SUBJECT")
                .default_value("Your verification code"),
        )
        .arg(
            Arg::new(ARG_MAIL_BODY)
                .long(ARG_MAIL_BODY)
                .help("Body of the OTP mail; [OTP] is replaced with the code")
                .env("OTPGATE_MAIL_BODY")
                .default_value("Your one-time password is [OTP]."),
        )
        .arg(
            Arg::new(ARG_ROLES)
                .long(ARG_ROLES)
                .help("Comma-separated roles that must verify (at least one)")
                .env("OTPGATE_ROLES")
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookie Secure (serve over HTTPS)")
                .env("OTPGATE_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_ATTEMPTS)
                .long(ARG_RATE_LIMIT_ATTEMPTS)
                .help("Sends or verifications allowed per window; 0 disables limiting")
                .env("OTPGATE_RATE_LIMIT_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW)
                .long(ARG_RATE_LIMIT_WINDOW)
                .help("Rate limit window in seconds")
                .env("OTPGATE_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
