//! Shared-secret guard for the sweep endpoint.
//!
//! The sweep is triggered by a scheduler rather than a user, so it is
//! authorised with a static bearer token (`SWEEP_SECRET`) instead of a JWT.
//! When no secret is configured the endpoint is open.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use genflow_core::error::CoreError;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::middleware::auth::bearer_token;
use crate::state::AppState;

/// Marker extractor: present only when the caller may trigger a sweep.
#[derive(Debug, Clone, Copy)]
pub struct SweepAuth;

impl FromRequestParts<AppState> for SweepAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.sweep_secret.as_deref() else {
            return Ok(SweepAuth);
        };

        let token = bearer_token(parts)?;
        if !secret_matches(token, secret) {
            tracing::warn!("Sweep request with wrong secret");
            return Err(AppError::Core(CoreError::Unauthorized(
                "Invalid sweep secret".into(),
            )));
        }
        Ok(SweepAuth)
    }
}

/// Compare fixed-length digests so the comparison time does not depend on
/// where the strings first differ.
fn secret_matches(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
