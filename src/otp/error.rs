use thiserror::Error;

use super::verifier::VerificationOutcome;

/// Failures surfaced to the person filling the protected form.
#[derive(Debug, Error)]
pub enum OtpError {
    #[error("OTP field is required")]
    MissingInput,
    #[error("Timeout")]
    Expired,
    #[error("Invalid otp entered")]
    Invalid,
    #[error("There was an error sending mail.")]
    DeliveryFailure(#[source] anyhow::Error),
    #[error("You can't change your email after verification kindly Reverify")]
    ContextChanged,
    #[error("OTP Verification is required")]
    NotVerified,
    #[error("Too many attempts, try again later")]
    RateLimited,
    #[error("A valid email address is required")]
    InvalidEmail,
    #[error("Internal error")]
    Infrastructure(#[from] anyhow::Error),
}

impl OtpError {
    /// The error a failed verification reports, `None` when it succeeded.
    #[must_use]
    pub fn from_outcome(outcome: VerificationOutcome) -> Option<Self> {
        match outcome {
            VerificationOutcome::Valid => None,
            VerificationOutcome::Invalid => Some(Self::Invalid),
            VerificationOutcome::Expired => Some(Self::Expired),
            VerificationOutcome::MissingInput => Some(Self::MissingInput),
        }
    }

    /// Whether the error comes from our side rather than the request.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }
}
