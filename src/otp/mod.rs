//! One-time password lifecycle: issuing, verifying, and gating.
//!
//! - [`challenge`] owns the single pending code per session slot.
//! - [`verifier`] is the pure comparison of a submitted answer against it.
//! - [`gate`] binds the verification result to the context (email) it was
//!   obtained for and invalidates it when that context changes.
//! - [`service`] wires those together with delivery, locking, and logging in
//!   the shape the HTTP handlers need.

pub mod challenge;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod gate;
pub mod rate_limit;
pub mod service;
pub mod store;
pub mod verifier;

pub use challenge::{Challenge, ChallengeManager, IssuedChallenge};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, OtpConfig};
pub use delivery::{render_message, HttpMailer, LogMailer, MailMessage, Mailer};
pub use error::OtpError;
pub use gate::{ConsistencyResult, SessionGate, VerificationState};
pub use rate_limit::{
    NoopRateLimiter, RateLimitAction, RateLimitDecision, RateLimiter, WindowRateLimiter,
};
pub use service::{Identity, OtpService, SendOutcome};
pub use store::{InMemorySessionStore, SessionKey, SessionLocks, SessionStore, SessionValue};
pub use verifier::{VerificationOutcome, verify};
