pub mod admin;
pub mod availability;
pub mod health;
pub mod reservations;

use axum::http::HeaderMap;

use crate::config::AppConfig;
use crate::errors::AppError;

/// Caller identity from the `X-User-Id` header. Absence is an error only
/// when the deployment requires authentication.
pub fn caller_identity(
    headers: &HeaderMap,
    config: &AppConfig,
) -> Result<Option<String>, AppError> {
    let user = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    if config.require_auth && user.is_none() {
        return Err(AppError::Unauthorized);
    }
    Ok(user)
}

/// Like [`caller_identity`] but for endpoints that cannot answer without
/// knowing who is asking.
pub fn require_identity(headers: &HeaderMap, config: &AppConfig) -> Result<String, AppError> {
    caller_identity(headers, config)?.ok_or(AppError::Unauthorized)
}
