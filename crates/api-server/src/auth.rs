//! Request authentication.
//!
//! Tenant routes carry an `X-API-Key` header that resolves to a
//! [`TenantContext`] extension. Platform routes carry
//! `Authorization: Bearer <platform admin token>` and an optional
//! `X-Platform-User` id recorded as the acting user.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use liyaqa_core::LiyaqaError;

use crate::rest::{ApiResult, AppState};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const PLATFORM_USER_HEADER: &str = "x-platform-user";

/// Platform user acting on a platform route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformActor(pub Uuid);

/// Resolves the API key into a `TenantContext` extension.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> ApiResult<Response> {
    let key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| LiyaqaError::Unauthorized("Missing X-API-Key header".into()))?;
    let ctx = state.api_keys.authenticate(key)?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Checks the platform admin bearer token and attaches the acting user.
pub async fn require_platform_admin(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> ApiResult<Response> {
    let token = extract_bearer(req.headers())
        .ok_or_else(|| LiyaqaError::Unauthorized("Missing bearer token".into()))?;
    if !tokens_match(token, &state.platform_admin_token) {
        return Err(LiyaqaError::Unauthorized("Invalid platform token".into()).into());
    }
    let actor = req
        .headers()
        .get(PLATFORM_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            Uuid::parse_str(v).map_err(|_| LiyaqaError::Validation("X-Platform-User must be a UUID".into()))
        })
        .transpose()?
        .unwrap_or_else(Uuid::nil);
    req.extensions_mut().insert(PlatformActor(actor));
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Compares digests so the check does not depend on the common prefix length.
fn tokens_match(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}
