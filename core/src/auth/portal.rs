//! Portal authentication flows
//!
//! Register, login, second factor, password reset and email verification,
//! orchestrated over the stores and the crypto kernel. Failed logins never
//! reveal whether the username or the password was wrong, and password
//! resets never reveal whether an email exists.

use super::blacklist::TokenBlacklist;
use super::rate_limit::RateLimiter;
use super::service::{AuthService, Claims, TokenKind};
use super::validate::{validate_email, validate_password, validate_username};
use crate::error::{PanelError, Result};
use crate::models::{
    EmailVerificationToken, InviteCode, PasswordResetToken, Role, TwoFactorSecret, User,
};
use crate::notifier::{Notifier, NotifyEvent};
use crate::store::{AuthTokenStore, UserStore};
use crate::tokens::{generate_code_block, generate_token};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Password-reset tokens live one hour.
const RESET_TOKEN_TTL: i64 = 3600;
/// At most this many reset tokens per user per hour.
const RESET_TOKENS_PER_HOUR: u32 = 3;
/// Email-verification tokens live 24 hours.
const EMAIL_TOKEN_TTL_HOURS: i64 = 24;

/// Registration input
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub invite_code: Option<String>,
}

/// Outcome of a password login
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Credentials verified, session established
    Success {
        token: String,
        refresh_token: String,
        user: User,
    },
    /// Credentials verified but a second factor is still required
    TwoFactorRequired,
}

/// Material handed to the user during 2FA enrolment
#[derive(Debug, Clone)]
pub struct TwoFactorEnrolment {
    pub secret: String,
    pub otpauth_url: String,
    pub backup_codes: Vec<String>,
}

/// Portal auth orchestrator
pub struct PortalAuth {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn AuthTokenStore>,
    auth: Arc<AuthService>,
    limiter: Arc<RateLimiter>,
    blacklist: Arc<TokenBlacklist>,
    notifier: Arc<dyn Notifier>,
    invite_required: bool,
}

impl PortalAuth {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn AuthTokenStore>,
        auth: Arc<AuthService>,
        limiter: Arc<RateLimiter>,
        blacklist: Arc<TokenBlacklist>,
        notifier: Arc<dyn Notifier>,
        invite_required: bool,
    ) -> Self {
        Self {
            users,
            tokens,
            auth,
            limiter,
            blacklist,
            notifier,
            invite_required,
        }
    }

    /// Create an account. Returns the user together with the freshly issued
    /// email-verification token the caller mails out.
    pub async fn register(
        &self,
        request: RegisterRequest,
    ) -> Result<(User, EmailVerificationToken)> {
        let username = validate_username(&request.username)?;
        validate_email(&request.email)?;
        validate_password(&request.password)?;

        let invite = match (&request.invite_code, self.invite_required) {
            (Some(code), _) => {
                let invite = self
                    .tokens
                    .get_invite(code)
                    .await?
                    .filter(|i| i.is_valid(Utc::now()))
                    .ok_or_else(|| PanelError::validation("invalid invite code"))?;
                Some(invite)
            }
            (None, true) => return Err(PanelError::validation("invite code required")),
            (None, false) => None,
        };

        let user = self
            .users
            .create(User {
                id: 0,
                username,
                email: request.email.clone(),
                password_hash: self.auth.hash_password(&request.password)?,
                role: Role::User,
                enabled: true,
                email_verified: false,
                two_factor_enabled: false,
                expires_at: None,
                traffic_limit: 0,
                traffic_used: 0,
                inviter_id: invite.as_ref().map(|i| i.created_by),
                token_version: 0,
                last_login_at: None,
                created_at: Utc::now(),
            })
            .await?;

        if let Some(mut invite) = invite {
            invite.used_count += 1;
            invite.used_by = Some(user.id);
            self.tokens.update_invite(&invite).await?;
        }

        let verification = self.issue_email_token(&user, &user.email).await?;
        info!(user_id = user.id, "user registered");
        Ok((user, verification))
    }

    /// Password login step. When the account has 2FA enabled the caller
    /// must follow up with [`Self::verify_2fa`].
    pub async fn login(&self, login: &str, password: &str, ip: &str) -> Result<LoginOutcome> {
        let user = self.check_credentials(login, password, ip).await?;
        if user.two_factor_enabled {
            return Ok(LoginOutcome::TwoFactorRequired);
        }
        self.establish_session(user, ip).await
    }

    /// Complete a 2FA login with a six-digit TOTP or an 8-character backup
    /// code. Backup codes are one-shot.
    pub async fn verify_2fa(
        &self,
        login: &str,
        password: &str,
        code: &str,
        ip: &str,
    ) -> Result<LoginOutcome> {
        let user = self.check_credentials(login, password, ip).await?;
        if !user.two_factor_enabled {
            return Err(PanelError::validation("two-factor not enabled"));
        }
        if !self.consume_second_factor(user.id, code).await? {
            self.limiter.record_login_attempt(ip, false);
            return Err(PanelError::unauthorized("invalid two-factor code"));
        }
        self.establish_session(user, ip).await
    }

    /// Start 2FA enrolment: generates the secret and backup codes. The
    /// factor only becomes active after [`Self::confirm_2fa`] proves the
    /// user holds the secret.
    pub async fn enable_2fa(&self, user_id: u64) -> Result<TwoFactorEnrolment> {
        let user = self.require_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(PanelError::conflict("two-factor already enabled"));
        }
        let (secret, otpauth_url) = self.auth.generate_totp_secret(&user.username)?;
        let backup_codes = self.auth.generate_backup_codes(10);
        self.tokens
            .upsert_two_factor(TwoFactorSecret {
                id: 0,
                user_id,
                secret: secret.clone(),
                backup_codes: backup_codes.clone(),
                enabled_at: None,
                created_at: Utc::now(),
            })
            .await?;
        Ok(TwoFactorEnrolment {
            secret,
            otpauth_url,
            backup_codes,
        })
    }

    /// Prove possession of the enrolled secret and switch the factor on.
    pub async fn confirm_2fa(&self, user_id: u64, code: &str) -> Result<()> {
        let mut user = self.require_user(user_id).await?;
        let mut record = self
            .tokens
            .get_two_factor(user_id)
            .await?
            .ok_or_else(|| PanelError::not_found("two-factor enrolment"))?;
        if !self.auth.verify_totp(&record.secret, code)? {
            return Err(PanelError::unauthorized("invalid two-factor code"));
        }
        record.enabled_at = Some(Utc::now());
        self.tokens.update_two_factor(&record).await?;
        user.two_factor_enabled = true;
        self.users.update(&user).await?;
        info!(user_id, "two-factor enabled");
        Ok(())
    }

    /// Disable 2FA; requires a valid TOTP or backup code and invalidates
    /// outstanding sessions.
    pub async fn disable_2fa(&self, user_id: u64, code: &str) -> Result<()> {
        let mut user = self.require_user(user_id).await?;
        if !user.two_factor_enabled {
            return Err(PanelError::validation("two-factor not enabled"));
        }
        if !self.consume_second_factor(user_id, code).await? {
            return Err(PanelError::unauthorized("invalid two-factor code"));
        }
        self.tokens.delete_two_factor(user_id).await?;
        user.two_factor_enabled = false;
        user.token_version += 1;
        self.users.update(&user).await?;
        info!(user_id, "two-factor disabled");
        Ok(())
    }

    /// Issue a password-reset token. Silently succeeds with `None` when no
    /// account matches, so the endpoint is not an existence oracle.
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<PasswordResetToken>> {
        let Some(user) = self.users.get_by_email(email).await? else {
            return Ok(None);
        };
        let hour_ago = Utc::now() - Duration::seconds(RESET_TOKEN_TTL);
        if self
            .tokens
            .count_reset_tokens_since(user.id, hour_ago)
            .await?
            >= RESET_TOKENS_PER_HOUR
        {
            return Err(PanelError::rate_limit("too many reset requests"));
        }
        let token = self
            .tokens
            .create_reset_token(PasswordResetToken {
                id: 0,
                user_id: user.id,
                token: generate_token(),
                expires_at: Utc::now() + Duration::seconds(RESET_TOKEN_TTL),
                used_at: None,
                created_at: Utc::now(),
            })
            .await?;
        self.notifier
            .notify(NotifyEvent::PasswordResetRequested {
                user_id: user.id,
                token: token.token.clone(),
            })
            .await;
        Ok(Some(token))
    }

    /// Redeem a reset token: single use, one-hour validity. Bumps the
    /// user's token version so every outstanding session dies.
    pub async fn execute_password_reset(&self, token: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;
        let record = self
            .tokens
            .get_reset_token(token)
            .await?
            .ok_or_else(|| PanelError::not_found("reset token"))?;
        if record.used_at.is_some() {
            return Err(PanelError::unauthorized("reset token already used"));
        }
        if record.expires_at <= Utc::now() {
            return Err(PanelError::unauthorized("reset token expired"));
        }
        let mut user = self.require_user(record.user_id).await?;
        user.password_hash = self.auth.hash_password(new_password)?;
        user.token_version += 1;
        self.users.update(&user).await?;
        self.tokens.mark_reset_used(record.id, Utc::now()).await?;
        info!(user_id = user.id, "password reset completed");
        Ok(())
    }

    /// Redeem an email-verification token. Also applies a pending email
    /// change carried by the token.
    pub async fn verify_email(&self, token: &str) -> Result<()> {
        let record = self
            .tokens
            .get_email_token(token)
            .await?
            .ok_or_else(|| PanelError::not_found("verification token"))?;
        if record.verified_at.is_some() {
            return Err(PanelError::unauthorized("verification token already used"));
        }
        if record.expires_at <= Utc::now() {
            return Err(PanelError::unauthorized("verification token expired"));
        }
        let mut user = self.require_user(record.user_id).await?;
        user.email = record.email.clone();
        user.email_verified = true;
        self.users.update(&user).await?;
        self.tokens.mark_email_verified(record.id, Utc::now()).await?;
        Ok(())
    }

    /// Authenticated password change; invalidates other sessions.
    pub async fn change_password(
        &self,
        user_id: u64,
        current: &str,
        new_password: &str,
    ) -> Result<()> {
        let mut user = self.require_user(user_id).await?;
        if !self.auth.verify_password(current, &user.password_hash)? {
            return Err(PanelError::unauthorized("invalid credentials"));
        }
        validate_password(new_password)?;
        user.password_hash = self.auth.hash_password(new_password)?;
        user.token_version += 1;
        self.users.update(&user).await
    }

    /// Change the account email. The address only takes effect once the
    /// returned verification token is redeemed.
    pub async fn request_email_change(
        &self,
        user_id: u64,
        new_email: &str,
    ) -> Result<EmailVerificationToken> {
        validate_email(new_email)?;
        let user = self.require_user(user_id).await?;
        if self.users.get_by_email(new_email).await?.is_some() {
            return Err(PanelError::conflict("email already registered"));
        }
        self.issue_email_token(&user, new_email).await
    }

    /// Blacklist the presented JWT until its natural expiry.
    pub async fn logout(&self, token: &str) -> Result<()> {
        let claims = self.auth.verify_token(token)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| PanelError::unauthorized("invalid token"))?;
        self.blacklist.revoke(token, expires_at).await;
        Ok(())
    }

    /// Resolve a bearer token to a live account. Rejects revoked tokens,
    /// stale token versions, refresh tokens and disabled accounts.
    pub async fn authenticate(&self, token: &str) -> Result<(User, Claims)> {
        if self.blacklist.is_revoked(token) {
            return Err(PanelError::unauthorized("token revoked"));
        }
        let claims = self.auth.verify_token(token)?;
        if claims.kind != TokenKind::Access {
            return Err(PanelError::unauthorized("not an access token"));
        }
        let user = self.require_user(claims.user_id).await.map_err(|_| {
            PanelError::unauthorized("unknown account")
        })?;
        if claims.token_version != user.token_version {
            return Err(PanelError::unauthorized("session invalidated"));
        }
        if !user.enabled {
            return Err(PanelError::forbidden("account disabled"));
        }
        Ok((user, claims))
    }

    /// Exchange a refresh token for a fresh access/refresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<LoginOutcome> {
        if self.blacklist.is_revoked(refresh_token) {
            return Err(PanelError::unauthorized("token revoked"));
        }
        let claims = self.auth.verify_token(refresh_token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(PanelError::unauthorized("not a refresh token"));
        }
        let user = self.require_user(claims.user_id).await?;
        if claims.token_version != user.token_version || !user.enabled {
            return Err(PanelError::unauthorized("session invalidated"));
        }
        Ok(LoginOutcome::Success {
            token: self.auth.mint_token(&user)?,
            refresh_token: self.auth.mint_refresh_token(&user)?,
            user,
        })
    }

    /// Mint an invite code on behalf of `created_by`.
    pub async fn create_invite(
        &self,
        created_by: u64,
        max_uses: u32,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<InviteCode> {
        if max_uses == 0 {
            return Err(PanelError::validation("max_uses must be at least 1"));
        }
        self.tokens
            .create_invite(InviteCode {
                id: 0,
                code: generate_code_block(8),
                created_by,
                used_by: None,
                max_uses,
                used_count: 0,
                expires_at,
                created_at: Utc::now(),
            })
            .await
    }

    async fn check_credentials(&self, login: &str, password: &str, ip: &str) -> Result<User> {
        if login.trim().is_empty() || password.is_empty() {
            return Err(PanelError::validation("missing credentials"));
        }
        self.limiter.check_rate_limit(ip)?;
        let Some(user) = self.users.get_by_login(login.trim()).await? else {
            self.limiter.record_login_attempt(ip, false);
            return Err(PanelError::unauthorized("invalid credentials"));
        };
        if !user.enabled {
            return Err(PanelError::forbidden("account disabled"));
        }
        if !self.auth.verify_password(password, &user.password_hash)? {
            self.limiter.record_login_attempt(ip, false);
            warn!(user_id = user.id, ip, "failed login");
            return Err(PanelError::unauthorized("invalid credentials"));
        }
        Ok(user)
    }

    async fn establish_session(&self, mut user: User, ip: &str) -> Result<LoginOutcome> {
        self.limiter.record_login_attempt(ip, true);
        user.last_login_at = Some(Utc::now());
        self.users.update(&user).await?;
        info!(user_id = user.id, ip, "login succeeded");
        Ok(LoginOutcome::Success {
            token: self.auth.mint_token(&user)?,
            refresh_token: self.auth.mint_refresh_token(&user)?,
            user,
        })
    }

    /// Try TOTP first, then the one-shot backup codes.
    async fn consume_second_factor(&self, user_id: u64, code: &str) -> Result<bool> {
        let Some(mut record) = self.tokens.get_two_factor(user_id).await? else {
            return Ok(false);
        };
        if record.enabled_at.is_none() {
            return Ok(false);
        }
        if code.len() == 6 && self.auth.verify_totp(&record.secret, code)? {
            return Ok(true);
        }
        if let Some(pos) = record.backup_codes.iter().position(|c| c == code) {
            record.backup_codes.remove(pos);
            self.tokens.update_two_factor(&record).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn require_user(&self, user_id: u64) -> Result<User> {
        self.users
            .get(user_id)
            .await?
            .ok_or_else(|| PanelError::not_found("user"))
    }

    async fn issue_email_token(&self, user: &User, email: &str) -> Result<EmailVerificationToken> {
        self.tokens
            .create_email_token(EmailVerificationToken {
                id: 0,
                user_id: user.id,
                email: email.to_string(),
                token: generate_token(),
                expires_at: Utc::now() + Duration::hours(EMAIL_TOKEN_TTL_HOURS),
                verified_at: None,
                created_at: Utc::now(),
            })
            .await
    }
}
