//! OTP endpoints: send a code, validate an answer, guard a submission, reset.
//!
//! Each protected form gets its own slot inside the browser session, keyed by
//! the `otpgate_session` cookie and the form id. The send endpoint mints the
//! cookie when it is missing; the other endpoints never create state for a
//! request without one.

pub mod session;
pub mod state;
pub mod types;

pub use state::OtpState;

use axum::{
    body::Bytes,
    extract::{Extension, Query},
    http::{
        header::{CONTENT_TYPE, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Json, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, error};
use ulid::Ulid;

use crate::otp::{self, OtpError};

use session::{
    extract_identity, extract_session_id, session_cookie, session_or_mint, slot, valid_form_id,
};
use types::{FormQuery, FormRequest, OtpResponse};

const VERIFIED_MESSAGE: &str = "Otp has been verified";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Endpoint {
    Send,
    Validate,
    Submit,
}

/// Send a code to the form's email (or the identity's), reusing a pending one.
#[utoipa::path(
    post,
    path = "/v1/otp/send",
    request_body = FormRequest,
    params(
        ("x-otpgate-user-email" = Option<String>, Header, description = "Authenticated user's email"),
        ("x-otpgate-user-roles" = Option<String>, Header, description = "Comma-separated roles")
    ),
    responses(
        (status = 200, description = "Code sent, already pending, or not needed", body = OtpResponse),
        (status = 400, description = "Invalid payload or email", body = OtpResponse),
        (status = 409, description = "Email changed after verification; slot reset", body = OtpResponse),
        (status = 429, description = "Rate limited", body = OtpResponse),
        (status = 502, description = "Mail delivery failed", body = OtpResponse)
    ),
    tag = "otp"
)]
pub async fn send_otp(
    headers: HeaderMap,
    state: Extension<Arc<OtpState>>,
    payload: Option<Json<FormRequest>>,
) -> Response {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return bad_request("Missing payload"),
    };
    if !valid_form_id(&request.form_id) {
        return bad_request("Invalid form id");
    }

    let identity = extract_identity(&headers);
    let Some(context) = identity.context_for(request.email.as_deref()) else {
        return error_response(&OtpError::InvalidEmail, Endpoint::Send);
    };

    let (session_id, minted) = session_or_mint(&headers);
    let key = slot(&session_id, &request.form_id);

    let mut response = match state
        .service()
        .send(&key, &identity, context, state.now())
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(OtpResponse::ok(outcome.to_string()))).into_response(),
        Err(err) => error_response(&err, Endpoint::Send),
    };

    if minted {
        match session_cookie(&session_id, state.cookie_secure()) {
            Ok(cookie) => {
                response.headers_mut().insert(SET_COOKIE, cookie);
            }
            Err(err) => error!("Failed to build session cookie: {err}"),
        }
    }
    response
}

/// Validate a submitted code. The body is the code itself, raw or as a JSON string.
#[utoipa::path(
    post,
    path = "/validate/otp",
    params(FormQuery),
    request_body(content = String, content_type = "application/json", description = "Submitted code"),
    responses(
        (status = 200, description = "Verification result", body = OtpResponse),
        (status = 303, description = "Not a JSON request; redirected to /"),
        (status = 400, description = "Missing or invalid form id", body = OtpResponse),
        (status = 429, description = "Rate limited", body = OtpResponse)
    ),
    tag = "otp"
)]
pub async fn validate_otp(
    headers: HeaderMap,
    state: Extension<Arc<OtpState>>,
    query: Option<Query<FormQuery>>,
    body: Bytes,
) -> Response {
    if !is_json(&headers) {
        return Redirect::to("/").into_response();
    }
    let Some(Query(query)) = query.filter(|Query(query)| valid_form_id(&query.form)) else {
        return bad_request("Invalid form id");
    };

    let answer = parse_answer_body(&body);
    let now = state.now();

    let outcome = match extract_session_id(&headers) {
        Some(session_id) => {
            let key = slot(&session_id, &query.form);
            match state.service().verify(&key, answer.as_deref(), now).await {
                Ok(outcome) => outcome,
                Err(err) => return error_response(&err, Endpoint::Validate),
            }
        }
        // Nothing was ever issued to this browser.
        None => otp::verify(answer.as_deref(), None, now),
    };

    debug!(outcome = ?outcome, "otp validation");
    let body = match OtpError::from_outcome(outcome) {
        None => OtpResponse::ok(VERIFIED_MESSAGE),
        Some(err) => OtpResponse::failed(err.to_string()),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Check whether the protected form may be submitted.
#[utoipa::path(
    post,
    path = "/v1/otp/submit",
    request_body = FormRequest,
    params(
        ("x-otpgate-user-email" = Option<String>, Header, description = "Authenticated user's email"),
        ("x-otpgate-user-roles" = Option<String>, Header, description = "Comma-separated roles")
    ),
    responses(
        (status = 204, description = "Submission may proceed"),
        (status = 400, description = "Invalid payload", body = OtpResponse),
        (status = 403, description = "Not verified, or email changed after verification", body = OtpResponse)
    ),
    tag = "otp"
)]
pub async fn submit_form(
    headers: HeaderMap,
    state: Extension<Arc<OtpState>>,
    payload: Option<Json<FormRequest>>,
) -> Response {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return bad_request("Missing payload"),
    };
    if !valid_form_id(&request.form_id) {
        return bad_request("Invalid form id");
    }

    let identity = extract_identity(&headers);
    let context = identity
        .context_for(request.email.as_deref())
        .unwrap_or_default();
    // Without a session the slot is empty and the guard writes nothing.
    let session_id = extract_session_id(&headers).unwrap_or_else(|| Ulid::new().to_string());
    let key = slot(&session_id, &request.form_id);

    match state.service().guard(&key, &identity, context).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err, Endpoint::Submit),
    }
}

/// Drop the form's challenge and verification so the user can start over.
#[utoipa::path(
    delete,
    path = "/v1/otp/session",
    params(FormQuery),
    responses(
        (status = 204, description = "Slot reset"),
        (status = 400, description = "Invalid form id", body = OtpResponse)
    ),
    tag = "otp"
)]
pub async fn reset_session(
    headers: HeaderMap,
    state: Extension<Arc<OtpState>>,
    Query(query): Query<FormQuery>,
) -> Response {
    if !valid_form_id(&query.form) {
        return bad_request("Invalid form id");
    }
    let Some(session_id) = extract_session_id(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    match state.service().reset(&slot(&session_id, &query.form)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err, Endpoint::Submit),
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .is_some_and(|mime| {
            mime.eq_ignore_ascii_case("application/json")
                || mime.to_ascii_lowercase().ends_with("+json")
        })
}

/// The submitted code: a JSON string or number, or the raw body text.
fn parse_answer_body(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::String(answer)) => Some(answer),
        Ok(serde_json::Value::Number(number)) => Some(number.to_string()),
        Ok(serde_json::Value::Null) => None,
        _ => Some(text.to_string()),
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(OtpResponse::failed(message))).into_response()
}

fn error_response(error: &OtpError, endpoint: Endpoint) -> Response {
    let status = match error {
        OtpError::MissingInput | OtpError::Expired | OtpError::Invalid => {
            if endpoint == Endpoint::Validate {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            }
        }
        OtpError::InvalidEmail => StatusCode::BAD_REQUEST,
        OtpError::DeliveryFailure(_) => StatusCode::BAD_GATEWAY,
        OtpError::ContextChanged => {
            if endpoint == Endpoint::Submit {
                StatusCode::FORBIDDEN
            } else {
                StatusCode::CONFLICT
            }
        }
        OtpError::NotVerified => StatusCode::FORBIDDEN,
        OtpError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        OtpError::Infrastructure(err) => {
            error!("OTP request failed: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(OtpResponse::failed(error.to_string()))).into_response()
}
