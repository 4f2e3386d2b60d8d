//! Map validated CLI arguments to an action.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{mail, otp, ARG_PORT};
use crate::otp::OtpConfig;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if the OTP configuration is inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let otp_opts = otp::Options::parse(matches)?;
    let mail_opts = mail::Options::parse(matches);

    let config = OtpConfig::new(otp_opts.mail_subject, otp_opts.mail_body)
        .with_timeout_seconds(otp_opts.timeout_seconds)
        .with_debug(otp_opts.debug)
        .with_roles(otp_opts.roles)
        .validate()
        .context("invalid OTP configuration")?;

    Ok(Action::Server(Args {
        port,
        config,
        cookie_secure: otp_opts.cookie_secure,
        mail_relay_url: mail_opts.relay_url,
        mail_relay_token: mail_opts.relay_token,
        rate_limit_attempts: otp_opts.rate_limit_attempts,
        rate_limit_window_seconds: otp_opts.rate_limit_window_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    fn clean_env() -> Vec<(&'static str, Option<&'static str>)> {
        [
            "OTPGATE_PORT",
            "OTPGATE_OTP_TIMEOUT",
            "OTPGATE_DEBUG",
            "OTPGATE_MAIL_SUBJECT",
            "OTPGATE_MAIL_BODY",
            "OTPGATE_ROLES",
            "OTPGATE_COOKIE_SECURE",
            "OTPGATE_RATE_LIMIT_ATTEMPTS",
            "OTPGATE_RATE_LIMIT_WINDOW_SECONDS",
            "OTPGATE_MAIL_RELAY_URL",
            "OTPGATE_MAIL_RELAY_TOKEN",
        ]
        .into_iter()
        .map(|key| (key, None))
        .collect()
    }

    #[test]
    fn builds_server_action() {
        temp_env::with_vars(clean_env(), || {
            let matches = commands::new().get_matches_from(vec![
                "otpgate",
                "--port",
                "9090",
                "--otp-timeout",
                "900",
                "--roles",
                "editor",
                "--cookie-secure",
            ]);
            let action = handler(&matches);
            assert!(action.is_ok());
            if let Ok(Action::Server(args)) = action {
                assert_eq!(args.port, 9090);
                assert_eq!(args.config.timeout_seconds(), 900);
                assert!(args.config.requires_verification(&["editor".to_string()]));
                assert!(!args.config.requires_verification(&["viewer".to_string()]));
                assert!(args.cookie_secure);
                assert!(args.mail_relay_url.is_none());
            }
        });
    }

    #[test]
    fn body_without_placeholder_is_rejected() {
        let mut vars = clean_env();
        vars.push(("OTPGATE_MAIL_BODY", Some("no code here")));
        temp_env::with_vars(vars, || {
            let matches = commands::new().get_matches_from(vec!["otpgate"]);
            let action = handler(&matches);
            assert!(action.is_err());
            if let Err(err) = action {
                assert!(format!("{err:#}").contains("[OTP] placeholder"));
            }
        });
    }

    #[test]
    fn missing_roles_are_rejected() {
        temp_env::with_vars(clean_env(), || {
            let matches = commands::new().get_matches_from(vec!["otpgate"]);
            let action = handler(&matches);
            assert!(action.is_err());
            if let Err(err) = action {
                assert!(format!("{err:#}").contains("at least one role"));
            }
        });
    }

    #[test]
    fn empty_subject_is_rejected() {
        let mut vars = clean_env();
        vars.push(("OTPGATE_MAIL_SUBJECT", Some("  ")));
        temp_env::with_vars(vars, || {
            let matches = commands::new().get_matches_from(vec!["otpgate"]);
            assert!(handler(&matches).is_err());
        });
    }
}
