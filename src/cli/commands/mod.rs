pub mod logging;
pub mod mail;
pub mod otp;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("otpgate")
        .about("Email one-time password gate for form submissions")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("OTPGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        );

    let command = otp::with_args(command);
    let command = mail::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const ENV_KEYS: [&str; 12] = [
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
        "OTPGATE_LOG_LEVEL",
    ];

    fn clean_env() -> Vec<(&'static str, Option<&'static str>)> {
        ENV_KEYS.iter().map(|key| (*key, None)).collect()
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "otpgate");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Email one-time password gate for form submissions".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars(clean_env(), || {
            let matches = new().get_matches_from(vec!["otpgate"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(8080));

            let opts = otp::Options::parse(&matches);
            assert!(opts.is_ok());
            if let Ok(opts) = opts {
                assert_eq!(opts.timeout_seconds, 300);
                assert!(!opts.debug);
                assert!(opts.roles.is_empty());
                assert!(opts.mail_body.contains("[OTP]"));
                assert_eq!(opts.rate_limit_attempts, 5);
                assert_eq!(opts.rate_limit_window_seconds, 900);
                assert!(!opts.cookie_secure);
            }

            let mail = mail::Options::parse(&matches);
            assert!(mail.relay_url.is_none());
            assert!(mail.relay_token.is_none());
        });
    }

    #[test]
    fn test_check_env() {
        let mut vars = clean_env();
        vars.extend([
            ("OTPGATE_PORT", Some("443")),
            ("OTPGATE_OTP_TIMEOUT", Some("600")),
            ("OTPGATE_DEBUG", Some("true")),
            ("OTPGATE_ROLES", Some("editor,author")),
            ("OTPGATE_MAIL_RELAY_URL", Some("https://relay.example.com/send")),
            ("OTPGATE_MAIL_RELAY_TOKEN", Some("relay-token")),
            ("OTPGATE_LOG_LEVEL", Some("info")),
        ]);
        temp_env::with_vars(vars, || {
            let matches = new().get_matches_from(vec!["otpgate"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
            assert_eq!(
                matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                Some(2)
            );

            let opts = otp::Options::parse(&matches);
            assert!(opts.is_ok());
            if let Ok(opts) = opts {
                assert_eq!(opts.timeout_seconds, 600);
                assert!(opts.debug);
                assert_eq!(opts.roles, vec!["editor".to_string(), "author".to_string()]);
            }

            let mail = mail::Options::parse(&matches);
            assert_eq!(
                mail.relay_url.as_deref(),
                Some("https://relay.example.com/send")
            );
            assert_eq!(
                mail.relay_token.as_ref().map(ExposeSecret::expose_secret),
                Some("relay-token")
            );
        });
    }

    #[test]
    fn test_timeout_bounds() {
        temp_env::with_vars(clean_env(), || {
            for timeout in ["299", "1801"] {
                let result =
                    new().try_get_matches_from(vec!["otpgate", "--otp-timeout", timeout]);
                assert!(result.is_err(), "{timeout} should be rejected");
            }
            let result = new().try_get_matches_from(vec!["otpgate", "--otp-timeout", "1800"]);
            assert!(result.is_ok());
        });
    }

    #[test]
    fn test_relay_token_requires_url() {
        temp_env::with_vars(clean_env(), || {
            let result =
                new().try_get_matches_from(vec!["otpgate", "--mail-relay-token", "secret"]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_check_log_level_verbosity() {
        for index in 0..5_u8 {
            temp_env::with_vars(clean_env(), || {
                let mut args = vec!["otpgate".to_string()];
                if index > 0 {
                    args.push(format!("-{}", "v".repeat(usize::from(index))));
                }
                let matches = new().get_matches_from(args);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(index)
                );
            });
        }
    }
}
