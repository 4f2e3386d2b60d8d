//! Browser session cookie and proxy-asserted identity.

use axum::http::{header::InvalidHeaderValue, HeaderMap, HeaderValue};
use regex::Regex;
use ulid::Ulid;

use crate::otp::{store::SLOT_RETENTION_SECONDS, Identity, SessionKey};

pub const SESSION_COOKIE_NAME: &str = "otpgate_session";
pub const USER_EMAIL_HEADER: &str = "x-otpgate-user-email";
pub const USER_ROLES_HEADER: &str = "x-otpgate-user-roles";

/// Session id from the cookie, if present and well formed.
pub(super) fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(axum::http::header::COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == SESSION_COOKIE_NAME {
                let val = val.trim();
                return Ulid::from_string(val).ok().map(|_| val.to_string());
            }
        }
    }
    None
}

/// Existing session id, or a freshly minted one flagged as new.
pub(super) fn session_or_mint(headers: &HeaderMap) -> (String, bool) {
    match extract_session_id(headers) {
        Some(id) => (id, false),
        None => (Ulid::new().to_string(), true),
    }
}

/// Build an `HttpOnly` cookie for the session id.
pub(super) fn session_cookie(id: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SLOT_RETENTION_SECONDS}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Form ids end up in storage keys; keep them short and plain.
pub(super) fn valid_form_id(form_id: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_-]{1,64}$").is_ok_and(|re| re.is_match(form_id))
}

pub(super) fn slot(session_id: &str, form_id: &str) -> SessionKey {
    SessionKey::new(session_id, form_id)
}

/// Identity asserted by the authenticating proxy in front of the service.
pub(super) fn extract_identity(headers: &HeaderMap) -> Identity {
    let email = headers
        .get(USER_EMAIL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(ToString::to_string);
    let roles = headers
        .get(USER_ROLES_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|roles| {
            roles
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();
    Identity::new(email, roles)
}
