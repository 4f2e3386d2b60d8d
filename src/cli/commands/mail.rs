use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_MAIL_RELAY_URL: &str = "mail-relay-url";
pub const ARG_MAIL_RELAY_TOKEN: &str = "mail-relay-token";

#[derive(Debug, Clone)]
pub struct Options {
    pub relay_url: Option<String>,
    pub relay_token: Option<SecretString>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        Self {
            relay_url: get_non_empty(ARG_MAIL_RELAY_URL),
            relay_token: get_non_empty(ARG_MAIL_RELAY_TOKEN).map(SecretString::from),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAIL_RELAY_URL)
                .long(ARG_MAIL_RELAY_URL)
                .help("HTTP mail relay receiving {to, subject, body} JSON")
                .long_help(
                    "HTTP mail relay receiving {to, subject, body} JSON.\n\nWhen unset, mails are only logged (recipient and subject) and never delivered.",
                )
                .env("OTPGATE_MAIL_RELAY_URL"),
        )
        .arg(
            Arg::new(ARG_MAIL_RELAY_TOKEN)
                .long(ARG_MAIL_RELAY_TOKEN)
                .help("Bearer token for the mail relay")
                .env("OTPGATE_MAIL_RELAY_TOKEN")
                .hide_env_values(true)
                .requires(ARG_MAIL_RELAY_URL),
        )
}
