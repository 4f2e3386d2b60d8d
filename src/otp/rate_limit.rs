//! Rate limiting primitives for OTP delivery and verification.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    SendOtp,
    VerifyOtp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    /// `subject` is the session slot for verification and the recipient for delivery.
    fn check(&self, subject: &str, action: RateLimitAction, now: i64) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _subject: &str, _action: RateLimitAction, _now: i64) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

/// Fixed-window counter kept in process memory.
#[derive(Debug)]
pub struct WindowRateLimiter {
    max_attempts: u32,
    window_seconds: i64,
    windows: Mutex<HashMap<(RateLimitAction, String), (i64, u32)>>,
}

impl WindowRateLimiter {
    #[must_use]
    pub fn new(max_attempts: u32, window_seconds: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            window_seconds: i64::try_from(window_seconds.max(1)).unwrap_or(i64::MAX),
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for WindowRateLimiter {
    fn check(&self, subject: &str, action: RateLimitAction, now: i64) -> RateLimitDecision {
        // A poisoned table fails open; the limiter is advisory.
        let Ok(mut windows) = self.windows.lock() else {
            return RateLimitDecision::Allowed;
        };
        let window_seconds = self.window_seconds;
        windows.retain(|_, (started, _)| now.saturating_sub(*started) < window_seconds);

        let (_, attempts) = windows
            .entry((action, subject.to_string()))
            .or_insert((now, 0));
        if *attempts >= self.max_attempts {
            return RateLimitDecision::Limited;
        }
        *attempts += 1;
        RateLimitDecision::Allowed
    }
}
