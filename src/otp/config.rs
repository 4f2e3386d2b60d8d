//! Deployment configuration for the OTP gate, validated at load time.

use std::collections::BTreeSet;
use thiserror::Error;

/// Token substituted with the issued code in the mail templates.
pub const OTP_PLACEHOLDER: &str = "[OTP]";

pub const MIN_TIMEOUT_SECONDS: u64 = 300;
pub const MAX_TIMEOUT_SECONDS: u64 = 1800;
const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("otp timeout must be between {min} and {max} seconds, got {value}")]
    TimeoutOutOfRange { value: u64, min: u64, max: u64 },
    #[error("mail subject must not be empty")]
    EmptySubject,
    #[error("mail body must not be empty")]
    EmptyBody,
    #[error("mail body must contain the [OTP] placeholder")]
    MissingPlaceholder,
    #[error("at least one role must be gated")]
    NoRoles,
}

#[derive(Clone, Debug)]
pub struct OtpConfig {
    timeout_seconds: u64,
    debug: bool,
    mail_subject: String,
    mail_body: String,
    roles: BTreeSet<String>,
}

impl OtpConfig {
    #[must_use]
    pub fn new(mail_subject: String, mail_body: String) -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            debug: false,
            mail_subject,
            mail_body,
            roles: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles
            .into_iter()
            .map(Into::into)
            .map(|role: String| role.trim().to_string())
            .filter(|role| !role.is_empty())
            .collect();
        self
    }

    /// Check bounds and templates, returning the config unchanged when valid.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&self.timeout_seconds) {
            return Err(ConfigError::TimeoutOutOfRange {
                value: self.timeout_seconds,
                min: MIN_TIMEOUT_SECONDS,
                max: MAX_TIMEOUT_SECONDS,
            });
        }
        if self.mail_subject.trim().is_empty() {
            return Err(ConfigError::EmptySubject);
        }
        if self.mail_body.trim().is_empty() {
            return Err(ConfigError::EmptyBody);
        }
        if !self.mail_body.contains(OTP_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder);
        }
        if self.roles.is_empty() {
            return Err(ConfigError::NoRoles);
        }
        Ok(self)
    }

    #[must_use]
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    /// When set, issued codes are logged for troubleshooting.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    #[must_use]
    pub fn mail_subject(&self) -> &str {
        &self.mail_subject
    }

    #[must_use]
    pub fn mail_body(&self) -> &str {
        &self.mail_body
    }

    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Whether an identity holding `roles` must pass the OTP gate.
    ///
    /// An empty role list gates everyone; [`OtpConfig::validate`] never lets
    /// one through, so this only applies to configs built in code.
    #[must_use]
    pub fn requires_verification(&self, roles: &[String]) -> bool {
        self.roles.is_empty() || roles.iter().any(|role| self.roles.contains(role.trim()))
    }
}
