//! Session-scoped key-value storage for OTP state.
//!
//! The gate only needs six keys per slot (see [`keys`]). Stores implement the
//! raw [`SessionStore`] contract; the typed helpers in this module translate
//! between those keys and [`Challenge`]/[`VerificationState`].
//!
//! A slot is one protected form inside one browser session, so a user filling
//! two gated forms at once holds two independent challenges.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

use super::challenge::{expired, Challenge};
use super::gate::VerificationState;

/// How long a verified slot is kept after its challenge was issued.
pub const SLOT_RETENTION_SECONDS: u64 = 86_400;

pub mod keys {
    pub const CODE: &str = "otp.code";
    pub const ISSUED_AT: &str = "otp.issuedAt";
    pub const TIMEOUT_SECONDS: &str = "otp.timeoutSeconds";
    pub const BOUND_CONTEXT: &str = "otp.boundContext";
    pub const VERIFIED: &str = "otp.verified";
    pub const VERIFIED_CONTEXT: &str = "otp.verifiedContext";

    pub const ALL: [&str; 6] = [
        CODE,
        ISSUED_AT,
        TIMEOUT_SECONDS,
        BOUND_CONTEXT,
        VERIFIED,
        VERIFIED_CONTEXT,
    ];
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    session_id: String,
    form_id: String,
}

impl SessionKey {
    #[must_use]
    pub fn new(session_id: impl Into<String>, form_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            form_id: form_id.into(),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn form_id(&self) -> &str {
        &self.form_id
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.form_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionValue {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl SessionValue {
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// Key-value store scoped per session slot.
///
/// `get_many` must read a consistent snapshot and `write` must apply all of its
/// sets and removals atomically.
pub trait SessionStore: Send + Sync {
    fn get_many(&self, key: &SessionKey, names: &[&str]) -> Result<Vec<Option<SessionValue>>>;

    fn write(
        &self,
        key: &SessionKey,
        set: Vec<(&'static str, SessionValue)>,
        remove: &[&'static str],
    ) -> Result<()>;

    /// Drop every slot that can no longer affect a decision at `now` and
    /// return how many were dropped.
    fn prune(&self, now: i64) -> Result<usize>;

    fn get(&self, key: &SessionKey, name: &str) -> Result<Option<SessionValue>> {
        Ok(self.get_many(key, &[name])?.into_iter().next().flatten())
    }

    fn remove(&self, key: &SessionKey, names: &[&'static str]) -> Result<()> {
        self.write(key, Vec::new(), names)
    }
}

/// Process-local store; state is lost on restart.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    slots: Mutex<HashMap<SessionKey, HashMap<&'static str, SessionValue>>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots currently holding any value.
    pub fn len(&self) -> Result<usize> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        Ok(slots.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl SessionStore for InMemorySessionStore {
    fn get_many(&self, key: &SessionKey, names: &[&str]) -> Result<Vec<Option<SessionValue>>> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        let slot = slots.get(key);
        Ok(names
            .iter()
            .map(|name| slot.and_then(|values| values.get(*name).cloned()))
            .collect())
    }

    fn write(
        &self,
        key: &SessionKey,
        set: Vec<(&'static str, SessionValue)>,
        remove: &[&'static str],
    ) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        let values = slots.entry(key.clone()).or_default();
        for name in remove {
            values.remove(*name);
        }
        values.extend(set);
        if values.is_empty() {
            slots.remove(key);
        }
        Ok(())
    }

    fn prune(&self, now: i64) -> Result<usize> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        let before = slots.len();
        slots.retain(|_, values| !stale(values, now));
        Ok(before - slots.len())
    }
}

/// Unverified slots go with their challenge; verified ones are kept for
/// [`SLOT_RETENTION_SECONDS`]. A slot without a challenge is always stale.
fn stale(values: &HashMap<&'static str, SessionValue>, now: i64) -> bool {
    let int = |name: &str| values.get(name).and_then(SessionValue::as_int);
    let Some(issued_at) = int(keys::ISSUED_AT) else {
        return true;
    };
    let verified = values
        .get(keys::VERIFIED)
        .and_then(SessionValue::as_bool)
        .unwrap_or(false);
    let window = if verified {
        SLOT_RETENTION_SECONDS
    } else {
        int(keys::TIMEOUT_SECONDS)
            .and_then(|timeout| u64::try_from(timeout).ok())
            .unwrap_or(0)
    };
    expired(issued_at, window, now)
}

/// Per-slot async locks serializing read-modify-write sequences.
#[derive(Debug, Default)]
pub struct SessionLocks {
    slots: Mutex<HashMap<SessionKey, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`; released when the guard drops.
    pub async fn acquire(&self, key: &SessionKey) -> Result<OwnedMutexGuard<()>> {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .map_err(|_| anyhow!("session lock table poisoned"))?;
            // Only the table holds idle locks.
            slots.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        Ok(slot.lock_owned().await)
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }
}

/// Load the stored challenge, if the slot holds a complete one.
pub(crate) fn load_challenge(store: &dyn SessionStore, key: &SessionKey) -> Result<Option<Challenge>> {
    let values = store.get_many(
        key,
        &[
            keys::CODE,
            keys::ISSUED_AT,
            keys::TIMEOUT_SECONDS,
            keys::BOUND_CONTEXT,
        ],
    )?;
    let [code, issued_at, timeout, context] = <[Option<SessionValue>; 4]>::try_from(values)
        .map_err(|_| anyhow!("session store returned an unexpected number of values"))?;

    let (Some(code), Some(issued_at), Some(timeout), Some(context)) =
        (code, issued_at, timeout, context)
    else {
        return Ok(None);
    };

    let parsed = (|| {
        Some(Challenge::new(
            u32::try_from(code.as_int()?).ok()?,
            issued_at.as_int()?,
            u64::try_from(timeout.as_int()?).ok()?,
            context.as_text()?.to_string(),
        ))
    })();
    if parsed.is_none() {
        warn!(slot = %key, "ignoring malformed challenge in session store");
    }
    Ok(parsed)
}

/// Persist a freshly issued challenge; any earlier verification is dropped.
pub(crate) fn save_challenge(
    store: &dyn SessionStore,
    key: &SessionKey,
    challenge: &Challenge,
) -> Result<()> {
    store.write(
        key,
        vec![
            (keys::CODE, SessionValue::Int(i64::from(challenge.code()))),
            (keys::ISSUED_AT, SessionValue::Int(challenge.issued_at())),
            (
                keys::TIMEOUT_SECONDS,
                SessionValue::Int(i64::try_from(challenge.timeout_seconds()).unwrap_or(i64::MAX)),
            ),
            (
                keys::BOUND_CONTEXT,
                SessionValue::Text(challenge.bound_context().to_string()),
            ),
            (keys::VERIFIED, SessionValue::Bool(false)),
        ],
        &[keys::VERIFIED_CONTEXT],
    )
}

pub(crate) fn load_state(store: &dyn SessionStore, key: &SessionKey) -> Result<VerificationState> {
    let values = store.get_many(key, &[keys::VERIFIED, keys::VERIFIED_CONTEXT])?;
    let mut values = values.into_iter();
    let verified = values
        .next()
        .flatten()
        .and_then(|value| value.as_bool())
        .unwrap_or(false);
    let context = values
        .next()
        .flatten()
        .and_then(|value| value.as_text().map(ToString::to_string));

    Ok(match (verified, context) {
        (true, Some(context)) => VerificationState::verified(context),
        _ => VerificationState::default(),
    })
}

pub(crate) fn save_state(
    store: &dyn SessionStore,
    key: &SessionKey,
    state: &VerificationState,
) -> Result<()> {
    match state.verified_context() {
        Some(context) if state.is_verified() => store.write(
            key,
            vec![
                (keys::VERIFIED, SessionValue::Bool(true)),
                (keys::VERIFIED_CONTEXT, SessionValue::Text(context.to_string())),
            ],
            &[],
        ),
        _ => store.write(
            key,
            vec![(keys::VERIFIED, SessionValue::Bool(false))],
            &[keys::VERIFIED_CONTEXT],
        ),
    }
}

pub(crate) fn clear(store: &dyn SessionStore, key: &SessionKey) -> Result<()> {
    store.remove(key, &keys::ALL)
}
