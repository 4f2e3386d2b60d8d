use std::sync::Arc;

use crate::otp::{Clock, OtpService};

/// Shared state for the OTP handlers.
pub struct OtpState {
    service: OtpService,
    clock: Arc<dyn Clock>,
    cookie_secure: bool,
}

impl OtpState {
    #[must_use]
    pub fn new(service: OtpService, clock: Arc<dyn Clock>) -> Self {
        Self {
            service,
            clock,
            cookie_secure: false,
        }
    }

    /// Mark the session cookie `Secure`; enable when served over HTTPS.
    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn service(&self) -> &OtpService {
        &self.service
    }

    /// Request time in Unix seconds.
    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}
