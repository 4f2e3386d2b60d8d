//! Pending challenge lifecycle: draw, reuse, persist, and reset.

use anyhow::Result;
use rand::{rngs::OsRng, Rng};
use std::sync::Arc;

use super::store::{self, SessionKey, SessionStore};

/// Inclusive lower bound of issued codes.
pub const CODE_MIN: u32 = 10_000;
/// Exclusive upper bound of issued codes.
pub const CODE_MAX: u32 = 90_000;
/// Digits an answer must have to be considered at all.
pub const CODE_DIGITS: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    code: u32,
    issued_at: i64,
    timeout_seconds: u64,
    bound_context: String,
}

impl Challenge {
    #[must_use]
    pub fn new(code: u32, issued_at: i64, timeout_seconds: u64, bound_context: String) -> Self {
        Self {
            code,
            issued_at,
            timeout_seconds,
            bound_context,
        }
    }

    #[must_use]
    pub fn code(&self) -> u32 {
        self.code
    }

    #[must_use]
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    #[must_use]
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    #[must_use]
    pub fn bound_context(&self) -> &str {
        &self.bound_context
    }

    /// Expired once strictly more than `timeout_seconds` have elapsed.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        expired(self.issued_at, self.timeout_seconds, now)
    }
}

pub(crate) fn expired(issued_at: i64, timeout_seconds: u64, now: i64) -> bool {
    let elapsed = i128::from(now) - i128::from(issued_at);
    elapsed > i128::from(timeout_seconds)
}

/// Draw a code uniformly from `[CODE_MIN, CODE_MAX)`.
pub fn generate_code<R: Rng>(rng: &mut R) -> u32 {
    rng.gen_range(CODE_MIN..CODE_MAX)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedChallenge {
    pub challenge: Challenge,
    pub is_new: bool,
}

#[derive(Clone)]
pub struct ChallengeManager {
    store: Arc<dyn SessionStore>,
}

impl ChallengeManager {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Return the pending challenge, or issue and persist a new one.
    ///
    /// A stored challenge is reused while it is unexpired and bound to the
    /// same context; otherwise it is replaced.
    ///
    /// # Errors
    /// Only session store faults are returned.
    pub fn request_challenge(
        &self,
        key: &SessionKey,
        context: &str,
        now: i64,
        timeout_seconds: u64,
    ) -> Result<IssuedChallenge> {
        if let Some(challenge) = self.pending(key, context, now)? {
            return Ok(IssuedChallenge {
                challenge,
                is_new: false,
            });
        }

        let challenge = Self::draw(context, now, timeout_seconds);
        self.persist(key, &challenge)?;
        Ok(IssuedChallenge {
            challenge,
            is_new: true,
        })
    }

    /// Stored challenge for `key` if it can still be answered for `context`.
    ///
    /// # Errors
    /// Returns session store faults.
    pub fn pending(&self, key: &SessionKey, context: &str, now: i64) -> Result<Option<Challenge>> {
        Ok(self
            .current(key)?
            .filter(|challenge| !challenge.is_expired(now) && challenge.bound_context() == context))
    }

    /// Stored challenge for `key`, expired or not.
    ///
    /// # Errors
    /// Returns session store faults.
    pub fn current(&self, key: &SessionKey) -> Result<Option<Challenge>> {
        store::load_challenge(self.store.as_ref(), key)
    }

    /// Build a fresh challenge without persisting it.
    #[must_use]
    pub fn draw(context: &str, now: i64, timeout_seconds: u64) -> Challenge {
        Challenge::new(
            generate_code(&mut OsRng),
            now,
            timeout_seconds,
            context.to_string(),
        )
    }

    /// Persist `challenge` as the slot's only challenge and drop prior verification.
    ///
    /// # Errors
    /// Returns session store faults.
    pub fn persist(&self, key: &SessionKey, challenge: &Challenge) -> Result<()> {
        store::save_challenge(self.store.as_ref(), key, challenge)
    }

    /// Drop slots whose challenge lapsed unverified, or whose verification
    /// outlived the retention window.
    ///
    /// # Errors
    /// Returns session store faults.
    pub fn prune(&self, now: i64) -> Result<usize> {
        self.store.prune(now)
    }

    /// Delete the challenge and verification state of the slot.
    ///
    /// # Errors
    /// Returns session store faults.
    pub fn reset(&self, key: &SessionKey) -> Result<()> {
        store::clear(self.store.as_ref(), key)
    }
}
