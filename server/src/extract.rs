//! Request extractors: bearer authentication and client IP

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use vpanel_core::models::{Role, User};
use vpanel_core::{Claims, PanelError};

/// The authenticated account behind a `Bearer` token
pub struct AuthUser {
    pub user: User,
    pub claims: Claims,
    /// The raw token, kept for logout
    pub token: String,
}

/// [`AuthUser`] narrowed to admins
pub struct AdminUser(pub AuthUser);

fn bearer_token(parts: &Parts) -> Result<String, PanelError> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or_else(|| PanelError::unauthorized("missing bearer token"))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let (user, claims) = state.portal.authenticate(&token).await?;
        Ok(Self {
            user,
            claims,
            token,
        })
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;
        if auth.user.role != Role::Admin {
            return Err(PanelError::forbidden("admin access required").into());
        }
        Ok(Self(auth))
    }
}

/// Client address for rate limiting and access logs. Trusts the first
/// `X-Forwarded-For` hop when present (the panel normally sits behind its
/// own reverse proxy).
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "0.0.0.0".to_string())
}

/// User agent or the empty string.
#[must_use]
pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
