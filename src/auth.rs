//! Bearer token verification.
//!
//! The user service signs HS256 tokens with the shared `JWT_SECRET`; this
//! service only verifies them. Claims carry `userId` and `username`.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{clients::id_string, error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "userId")]
    user_id: Value,
    #[serde(default)]
    username: String,
}

/// Caller identity taken from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
}

pub fn verify_token(secret: &str, token: &str) -> Result<AuthUser, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        warn!("Token verification failed: {e}");
        AppError::InvalidToken
    })?;

    let user_id = id_string(&data.claims.user_id).ok_or(AppError::InvalidToken)?;

    Ok(AuthUser {
        user_id,
        username: data.claims.username,
    })
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        let token = header.strip_prefix("Bearer ").ok_or(AppError::MissingToken)?;

        verify_token(&state.config.jwt_secret, token)
    }
}
