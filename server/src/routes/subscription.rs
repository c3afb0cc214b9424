//! Subscription delivery and management endpoints

use crate::error::{ApiError, ApiResult};
use crate::extract::{client_ip, user_agent, AuthUser};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use vpanel_core::models::ProxyProtocol;
use vpanel_core::subscription::{
    Credential, FetchOutcome, FetchQuery, UserInfo, PROFILE_UPDATE_INTERVAL_HOURS,
};
use vpanel_core::{ClientFormat, PanelError};

/// `GET /api/subscription/{token}`
pub async fn fetch_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    handle_fetch(&state, Credential::Token(&token), &params, &headers).await
}

/// `GET /s/{short_code}` - identical semantics under the short alias
pub async fn fetch_by_short_code(
    State(state): State<AppState>,
    Path(short_code): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    handle_fetch(&state, Credential::ShortCode(&short_code), &params, &headers).await
}

async fn handle_fetch(
    state: &AppState,
    credential: Credential<'_>,
    params: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let query = parse_query(params)?;
    let if_modified_since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
        .map(|value| value.with_timezone(&Utc));

    let outcome = state
        .subscriptions
        .fetch(
            credential,
            user_agent(headers).as_str(),
            &query,
            client_ip(headers).as_str(),
            if_modified_since,
        )
        .await?;

    Ok(match outcome {
        FetchOutcome::Content(content) => {
            let mut response_headers = common_headers(&content.userinfo, &content.profile_title);
            insert(
                &mut response_headers,
                header::CONTENT_TYPE,
                content.content_type,
            );
            insert(
                &mut response_headers,
                header::CONTENT_DISPOSITION,
                &format!("attachment; filename=\"{}\"", content.filename),
            );
            insert(
                &mut response_headers,
                header::LAST_MODIFIED,
                &httpdate(content.last_modified),
            );
            (StatusCode::OK, response_headers, content.body).into_response()
        }
        FetchOutcome::NotModified { userinfo } => {
            let response_headers = common_headers(&userinfo, "");
            (StatusCode::NOT_MODIFIED, response_headers).into_response()
        }
        FetchOutcome::Denied { reason, userinfo } => {
            let response_headers = common_headers(&userinfo, "");
            let body = PanelError::forbidden(reason).to_body(None);
            (StatusCode::FORBIDDEN, response_headers, Json(body)).into_response()
        }
    })
}

fn parse_query(params: &HashMap<String, String>) -> Result<FetchQuery, ApiError> {
    let format = match params.get("format") {
        Some(raw) => Some(
            ClientFormat::parse(raw)
                .ok_or_else(|| PanelError::validation(format!("unknown format '{raw}'")))?,
        ),
        None => None,
    };
    let list = |key: &str| -> Vec<String> {
        params
            .get(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    Ok(FetchQuery {
        format,
        protocols: list("protocols")
            .iter()
            .filter_map(|s| ProxyProtocol::parse(s))
            .collect(),
        include: list("include")
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect(),
        exclude: list("exclude")
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect(),
        rename: params.get("rename").cloned(),
    })
}

fn common_headers(userinfo: &UserInfo, title: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(
        &mut headers,
        "subscription-userinfo",
        &userinfo.header_value(),
    );
    insert(
        &mut headers,
        "profile-update-interval",
        &PROFILE_UPDATE_INTERVAL_HOURS.to_string(),
    );
    if !title.is_empty() {
        insert(&mut headers, "profile-title", title);
    }
    headers
}

fn insert<K>(headers: &mut HeaderMap, key: K, value: &str)
where
    K: axum::http::header::IntoHeaderName,
{
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(key, value);
    }
}

/// `Last-Modified` in IMF-fixdate shape.
fn httpdate(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[derive(Debug, Serialize)]
pub struct SubscriptionInfo {
    pub token: String,
    pub short_code: String,
    pub subscribe_url: String,
    pub short_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_access_at: Option<DateTime<Utc>>,
    pub access_count: u64,
}

impl SubscriptionInfo {
    fn from_sub(sub: &vpanel_core::models::Subscription) -> Self {
        Self {
            token: sub.token.clone(),
            short_code: sub.short_code.clone(),
            subscribe_url: format!("/api/subscription/{}", sub.token),
            short_url: format!("/s/{}", sub.short_code),
            created_at: sub.created_at,
            updated_at: sub.updated_at,
            last_access_at: sub.last_access_at,
            access_count: sub.access_count,
        }
    }
}

/// `GET /api/subscription/link`
pub async fn link(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<SubscriptionInfo>> {
    let sub = state.subscriptions.get_or_create(auth.user.id).await?;
    Ok(Json(SubscriptionInfo::from_sub(&sub)))
}

/// `GET /api/subscription/info`
pub async fn info(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<SubscriptionInfo>> {
    let sub = state.subscriptions.get_or_create(auth.user.id).await?;
    Ok(Json(SubscriptionInfo::from_sub(&sub)))
}

/// `POST /api/subscription/regenerate`
pub async fn regenerate(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<SubscriptionInfo>> {
    // First call for a brand-new account creates, then rotates.
    state.subscriptions.get_or_create(auth.user.id).await?;
    let sub = state.subscriptions.regenerate(auth.user.id).await?;
    Ok(Json(SubscriptionInfo::from_sub(&sub)))
}
