//! Request/response types for OTP endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Form state needed to send a code or guard a submission.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FormRequest {
    pub form_id: String,
    /// Value of the form's email field; the identity email is used when absent.
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(IntoParams, Deserialize, Debug)]
#[into_params(parameter_in = Query)]
pub struct FormQuery {
    /// Form the request belongs to.
    pub form: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct OtpResponse {
    pub status: bool,
    pub message: String,
}

impl OtpResponse {
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: true,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: false,
            message: message.into(),
        }
    }
}
