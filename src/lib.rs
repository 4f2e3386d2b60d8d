//! # otpgate
//!
//! `otpgate` gates a protected action (typically a form submission) behind a
//! short-lived, single-use numeric code emailed to the user.
//!
//! ## Lifecycle
//!
//! - **Issue:** a five digit code is drawn uniformly from `[10000, 90000)` and
//!   bound to the session slot and to the address it was sent to. Re-requesting
//!   within the validity window reuses the pending code instead of mailing a new one.
//! - **Verify:** the submitted answer is validated strictly (five ASCII digits)
//!   and compared numerically. Expiry is elapsed wall-clock time checked on use;
//!   there are no timers or background cleanup.
//! - **Gate:** a verified slot stays verified only for the address it was
//!   verified against. Changing the address afterwards resets the slot and the
//!   user has to verify again.
//!
//! Session state lives behind the [`otp::store::SessionStore`] trait and mail
//! delivery behind [`otp::delivery::Mailer`], so both can be swapped without
//! touching the core.

pub mod api;
pub mod cli;
pub mod otp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
