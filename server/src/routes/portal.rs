//! Portal authentication endpoints

use crate::error::ApiResult;
use crate::extract::{client_ip, AuthUser};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use vpanel_core::auth::{LoginOutcome, RegisterRequest};
use vpanel_core::models::User;
use vpanel_core::PanelError;

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub username: String,
    pub email: String,
    pub password: String,
    pub invite_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: u64,
    pub email: String,
    /// Whether a verification mail is on its way
    pub verification_sent: bool,
}

/// `POST /api/portal/auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<Json<RegisterResponse>> {
    let (user, _verification) = state
        .portal
        .register(RegisterRequest {
            username: body.username,
            email: body.email,
            password: body.password,
            invite_code: body.invite_code,
        })
        .await?;
    Ok(Json(RegisterResponse {
        user_id: user.id,
        email: user.email,
        verification_sent: true,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    /// Username or email
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens {
        token: String,
        refresh_token: String,
        user: User,
    },
    TwoFactor {
        requires_2fa: bool,
    },
}

fn login_response(outcome: LoginOutcome) -> LoginResponse {
    match outcome {
        LoginOutcome::Success {
            token,
            refresh_token,
            user,
        } => LoginResponse::Tokens {
            token,
            refresh_token,
            user,
        },
        LoginOutcome::TwoFactorRequired => LoginResponse::TwoFactor { requires_2fa: true },
    }
}

/// `POST /api/portal/auth/login`
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> ApiResult<Json<LoginResponse>> {
    let outcome = state
        .portal
        .login(&body.login, &body.password, &client_ip(&headers))
        .await?;
    Ok(Json(login_response(outcome)))
}

/// `POST /api/portal/auth/logout`
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    state.portal.logout(&auth.token).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    pub refresh_token: String,
}

/// `POST /api/portal/auth/refresh`
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshBody>,
) -> ApiResult<Json<LoginResponse>> {
    let outcome = state.portal.refresh(&body.refresh_token).await?;
    Ok(Json(login_response(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordBody {
    pub email: String,
}

/// `POST /api/portal/auth/forgot-password`
///
/// Always answers 200 for a well-formed request so the endpoint cannot be
/// used to probe which addresses exist.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state.portal.request_password_reset(&body.email).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordBody {
    pub token: String,
    pub password: String,
}

/// `POST /api/portal/auth/reset-password`
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .portal
        .execute_password_reset(&body.token, &body.password)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}

/// `GET /api/portal/auth/verify-email?token=...`
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    state.portal.verify_email(&query.token).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Serialize)]
pub struct EnrolmentResponse {
    pub secret: String,
    pub otpauth_url: String,
    pub backup_codes: Vec<String>,
}

/// `POST /api/portal/auth/2fa/enable`
pub async fn enable_2fa(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<EnrolmentResponse>> {
    let enrolment = state.portal.enable_2fa(auth.user.id).await?;
    Ok(Json(EnrolmentResponse {
        secret: enrolment.secret,
        otpauth_url: enrolment.otpauth_url,
        backup_codes: enrolment.backup_codes,
    }))
}

#[derive(Debug, Deserialize)]
pub struct Verify2FaBody {
    pub code: String,
    /// Present when completing a login, absent when confirming enrolment
    pub login: Option<String>,
    pub password: Option<String>,
}

/// `POST /api/portal/auth/2fa/verify`
///
/// Two roles share this endpoint: with a bearer token it confirms a fresh
/// enrolment; with `login` + `password` it completes a 2FA login.
pub async fn verify_2fa(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Verify2FaBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if let (Some(login), Some(password)) = (&body.login, &body.password) {
        let outcome = state
            .portal
            .verify_2fa(login, password, &body.code, &client_ip(&headers))
            .await?;
        return Ok(Json(serde_json::to_value(login_response(outcome)).map_err(
            PanelError::from,
        )?));
    }
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| PanelError::unauthorized("missing bearer token"))?;
    let (user, _) = state.portal.authenticate(token).await?;
    state.portal.confirm_2fa(user.id, &body.code).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct Disable2FaBody {
    pub code: String,
}

/// `POST /api/portal/auth/2fa/disable`
pub async fn disable_2fa(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<Disable2FaBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state.portal.disable_2fa(auth.user.id, &body.code).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `GET /api/portal/auth/profile`
pub async fn profile(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileBody {
    pub email: Option<String>,
}

/// `PUT /api/portal/auth/profile`
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<UpdateProfileBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut verification_sent = false;
    if let Some(email) = &body.email {
        if *email != auth.user.email {
            state
                .portal
                .request_email_change(auth.user.id, email)
                .await?;
            verification_sent = true;
        }
    }
    Ok(Json(
        serde_json::json!({ "ok": true, "verification_sent": verification_sent }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordBody {
    pub current_password: String,
    pub new_password: String,
}

/// `PUT /api/portal/auth/password`
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<ChangePasswordBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .portal
        .change_password(auth.user.id, &body.current_password, &body.new_password)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
