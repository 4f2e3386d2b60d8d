//! Stateless answer validation.

use serde::Serialize;
use utoipa::ToSchema;

use super::challenge::{Challenge, CODE_DIGITS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Valid,
    Invalid,
    Expired,
    MissingInput,
}

impl VerificationOutcome {
    #[must_use]
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }
}

/// Check `submitted` against `challenge` at time `now`.
///
/// Precedence is missing input, then expiry (an absent challenge counts as
/// expired), then format and value.
#[must_use]
pub fn verify(submitted: Option<&str>, challenge: Option<&Challenge>, now: i64) -> VerificationOutcome {
    let Some(answer) = submitted.map(str::trim).filter(|answer| !answer.is_empty()) else {
        return VerificationOutcome::MissingInput;
    };

    let Some(challenge) = challenge.filter(|challenge| !challenge.is_expired(now)) else {
        return VerificationOutcome::Expired;
    };

    match parse_answer(answer) {
        Some(code) if code == challenge.code() => VerificationOutcome::Valid,
        _ => VerificationOutcome::Invalid,
    }
}

/// Accept exactly `CODE_DIGITS` ASCII digits and nothing else.
fn parse_answer(answer: &str) -> Option<u32> {
    if answer.len() != CODE_DIGITS || !answer.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    answer.parse().ok()
}
