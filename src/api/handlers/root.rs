use axum::response::{IntoResponse, Json};
use serde_json::json;

/// Landing route; non-JSON validation requests are redirected here.
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
