//! Form-facing OTP flows: send, verify, guard and reset.
//!
//! Every operation that reads and then writes a slot holds that slot's lock
//! for its whole duration, so double submits from one browser session are
//! applied one after the other. A code is only persisted once the mailer has
//! accepted it; a failed delivery leaves the slot exactly as it was.

use anyhow::Result;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::challenge::ChallengeManager;
use super::config::OtpConfig;
use super::delivery::{render_message, Mailer};
use super::error::OtpError;
use super::gate::{ConsistencyResult, SessionGate};
use super::rate_limit::{NoopRateLimiter, RateLimitAction, RateLimitDecision, RateLimiter};
use super::store::{SessionKey, SessionLocks, SessionStore};
use super::verifier::{self, VerificationOutcome};

/// Who is filling the form, as asserted by the authenticating proxy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl Identity {
    #[must_use]
    pub fn new(email: Option<String>, roles: Vec<String>) -> Self {
        Self { email, roles }
    }

    /// The context a submission is bound to: the form's email field when it
    /// has one, otherwise the identity's own address.
    #[must_use]
    pub fn context_for<'a>(&'a self, form_email: Option<&'a str>) -> Option<&'a str> {
        form_email
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .or_else(|| self.email.as_deref().map(str::trim))
            .filter(|email| !email.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    NotRequired,
    AlreadyVerified,
    AlreadySent { to: String },
    Sent { to: String },
}

impl fmt::Display for SendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequired => write!(f, "OTP verification is not required"),
            Self::AlreadyVerified => write!(f, "You Are Verified"),
            Self::AlreadySent { to } => write!(f, "An OTP has already been sent to {to}"),
            Self::Sent { to } => write!(f, "An OTP has been sent to your email {to}"),
        }
    }
}

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

pub struct OtpService {
    config: OtpConfig,
    manager: ChallengeManager,
    gate: SessionGate,
    mailer: Arc<dyn Mailer>,
    limiter: Arc<dyn RateLimiter>,
    locks: SessionLocks,
}

impl OtpService {
    #[must_use]
    pub fn new(config: OtpConfig, store: Arc<dyn SessionStore>, mailer: Arc<dyn Mailer>) -> Self {
        let manager = ChallengeManager::new(store);
        Self {
            config,
            gate: SessionGate::new(manager.clone()),
            manager,
            mailer,
            limiter: Arc::new(NoopRateLimiter),
            locks: SessionLocks::new(),
        }
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Issue (or re-announce) a code for `context` and deliver it.
    ///
    /// # Errors
    /// [`OtpError::ContextChanged`] after resetting a slot verified for
    /// another address, [`OtpError::DeliveryFailure`] when the mailer fails,
    /// [`OtpError::InvalidEmail`], [`OtpError::RateLimited`], or store faults.
    #[instrument(skip_all, fields(slot = %key))]
    pub async fn send(
        &self,
        key: &SessionKey,
        identity: &Identity,
        context: &str,
        now: i64,
    ) -> Result<SendOutcome, OtpError> {
        if !self.config.requires_verification(&identity.roles) {
            return Ok(SendOutcome::NotRequired);
        }

        let _slot = self.locks.acquire(key).await?;

        match self.gate.enforce(key, context)? {
            ConsistencyResult::Consistent => return Ok(SendOutcome::AlreadyVerified),
            ConsistencyResult::ContextChangedAfterVerification => {
                return Err(OtpError::ContextChanged);
            }
            ConsistencyResult::NotYetVerified => {}
        }

        if !valid_email(context) {
            return Err(OtpError::InvalidEmail);
        }

        if self.manager.pending(key, context, now)?.is_some() {
            debug!("reusing pending challenge");
            return Ok(SendOutcome::AlreadySent {
                to: context.to_string(),
            });
        }

        if self.limiter.check(context, RateLimitAction::SendOtp, now) == RateLimitDecision::Limited
        {
            warn!("otp send rate limited");
            return Err(OtpError::RateLimited);
        }

        let challenge = ChallengeManager::draw(context, now, self.config.timeout_seconds());
        let message = render_message(&self.config, challenge.code(), context);
        if let Err(err) = self.mailer.send(&message).await {
            warn!("otp mail delivery failed: {err:#}");
            return Err(OtpError::DeliveryFailure(err));
        }
        self.manager.persist(key, &challenge)?;

        match self.manager.prune(now) {
            Ok(0) => {}
            Ok(pruned) => debug!(pruned, "dropped stale session slots"),
            Err(err) => warn!("failed to prune session slots: {err:#}"),
        }

        if self.config.debug() {
            info!(
                otp = challenge.code(),
                time = challenge.issued_at(),
                "A new OTP requested"
            );
        }

        Ok(SendOutcome::Sent {
            to: context.to_string(),
        })
    }

    /// Check `answer` against the slot's challenge and record the result.
    ///
    /// A missing answer, or a slot that never held a challenge, is reported
    /// without touching the store.
    ///
    /// # Errors
    /// [`OtpError::RateLimited`] or store faults.
    #[instrument(skip_all, fields(slot = %key))]
    pub async fn verify(
        &self,
        key: &SessionKey,
        answer: Option<&str>,
        now: i64,
    ) -> Result<VerificationOutcome, OtpError> {
        let _slot = self.locks.acquire(key).await?;

        let challenge = self.manager.current(key)?;
        let outcome = verifier::verify(answer, challenge.as_ref(), now);
        if outcome == VerificationOutcome::MissingInput {
            return Ok(outcome);
        }
        let Some(challenge) = challenge else {
            return Ok(outcome);
        };

        let subject = key.to_string();
        if self.limiter.check(&subject, RateLimitAction::VerifyOtp, now)
            == RateLimitDecision::Limited
        {
            warn!("otp verification rate limited");
            return Err(OtpError::RateLimited);
        }

        self.gate.persist(
            key,
            &SessionGate::record_outcome(outcome, challenge.bound_context()),
        )?;

        info!(outcome = ?outcome, "otp verification attempt");
        Ok(outcome)
    }

    /// Decide whether a protected submission for `context` may proceed.
    ///
    /// # Errors
    /// [`OtpError::NotVerified`], [`OtpError::ContextChanged`] after the slot
    /// has been reset, or store faults.
    #[instrument(skip_all, fields(slot = %key))]
    pub async fn guard(
        &self,
        key: &SessionKey,
        identity: &Identity,
        context: &str,
    ) -> Result<(), OtpError> {
        if !self.config.requires_verification(&identity.roles) {
            return Ok(());
        }

        let _slot = self.locks.acquire(key).await?;
        match self.gate.enforce(key, context)? {
            ConsistencyResult::Consistent => Ok(()),
            ConsistencyResult::NotYetVerified => Err(OtpError::NotVerified),
            ConsistencyResult::ContextChangedAfterVerification => Err(OtpError::ContextChanged),
        }
    }

    /// Drop the slot's challenge and verification so the user can start over.
    ///
    /// # Errors
    /// Returns store faults.
    #[instrument(skip_all, fields(slot = %key))]
    pub async fn reset(&self, key: &SessionKey) -> Result<(), OtpError> {
        let _slot = self.locks.acquire(key).await?;
        self.manager.reset(key)?;
        info!("otp slot reset");
        Ok(())
    }
}
