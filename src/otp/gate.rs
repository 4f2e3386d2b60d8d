//! Binding between a verification outcome and the context it was earned for.

use anyhow::Result;
use tracing::info;

use super::challenge::ChallengeManager;
use super::store::{self, SessionKey};
use super::verifier::VerificationOutcome;

/// Per-slot verification result.
///
/// A verified state always carries the context it was verified against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationState {
    verified_context: Option<String>,
}

impl VerificationState {
    #[must_use]
    pub fn verified(context: String) -> Self {
        Self {
            verified_context: Some(context),
        }
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verified_context.is_some()
    }

    #[must_use]
    pub fn verified_context(&self) -> Option<&str> {
        self.verified_context.as_deref()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsistencyResult {
    Consistent,
    ContextChangedAfterVerification,
    NotYetVerified,
}

#[derive(Clone)]
pub struct SessionGate {
    manager: ChallengeManager,
}

impl SessionGate {
    #[must_use]
    pub fn new(manager: ChallengeManager) -> Self {
        Self { manager }
    }

    /// Map an outcome to the state that should be stored for the slot.
    #[must_use]
    pub fn record_outcome(outcome: VerificationOutcome, context: &str) -> VerificationState {
        if outcome.is_valid() {
            VerificationState::verified(context.to_string())
        } else {
            VerificationState::default()
        }
    }

    #[must_use]
    pub fn check_context_consistency(
        current_context: &str,
        state: &VerificationState,
    ) -> ConsistencyResult {
        match state.verified_context() {
            None => ConsistencyResult::NotYetVerified,
            Some(context) if context == current_context => ConsistencyResult::Consistent,
            Some(_) => ConsistencyResult::ContextChangedAfterVerification,
        }
    }

    /// # Errors
    /// Returns session store faults.
    pub fn load(&self, key: &SessionKey) -> Result<VerificationState> {
        store::load_state(self.manager.store(), key)
    }

    /// # Errors
    /// Returns session store faults.
    pub fn persist(&self, key: &SessionKey, state: &VerificationState) -> Result<()> {
        store::save_state(self.manager.store(), key, state)
    }

    /// Check the stored state against `current_context`.
    ///
    /// A context change after verification resets the whole slot before the
    /// result is returned.
    ///
    /// # Errors
    /// Returns session store faults.
    pub fn enforce(&self, key: &SessionKey, current_context: &str) -> Result<ConsistencyResult> {
        let state = self.load(key)?;
        let result = Self::check_context_consistency(current_context, &state);
        if result == ConsistencyResult::ContextChangedAfterVerification {
            info!(slot = %key, "verified context changed, resetting slot");
            self.manager.reset(key)?;
        }
        Ok(result)
    }
}
