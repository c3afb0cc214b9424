//! Cryptographic kernel: password hashing, JWT mint/verify, TOTP
//!
//! Everything here is pure computation over the configured secret; no
//! store access. Session semantics (who may log in, lockouts, token
//! versions) live in [`super::portal`].

use crate::error::{PanelError, Result};
use crate::models::{Role, User};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use totp_rs::{Secret, TOTP};

/// Distinguishes the short-lived access token from the refresh variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claim set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
    /// Token epoch; a stale value means the session was invalidated
    pub token_version: u32,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

/// Stateless crypto operations behind the auth flows
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry: Duration,
    refresh_expiry: Duration,
}

impl AuthService {
    #[must_use]
    pub fn new(jwt_secret: &str, token_expiry_hours: i64, refresh_expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_expiry: Duration::hours(token_expiry_hours),
            refresh_expiry: Duration::hours(refresh_expiry_hours),
        }
    }

    /// bcrypt at the library's default cost.
    pub fn hash_password(&self, password: &str) -> Result<String> {
        Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
    }

    /// Constant-time verify against a stored hash.
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        Ok(bcrypt::verify(password, hash)?)
    }

    /// Mint an HS256 access token for `user`.
    pub fn mint_token(&self, user: &User) -> Result<String> {
        self.mint(user, TokenKind::Access, self.token_expiry)
    }

    /// Refresh variant with the longer expiry.
    pub fn mint_refresh_token(&self, user: &User) -> Result<String> {
        self.mint(user, TokenKind::Refresh, self.refresh_expiry)
    }

    fn mint(&self, user: &User, kind: TokenKind, expiry: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            token_version: user.token_version,
            kind,
            iat: now.timestamp(),
            exp: (now + expiry).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| PanelError::internal(format!("jwt encode: {e}")))
    }

    /// Verify signature and expiry; any failure is `Unauthorized`.
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|_| PanelError::unauthorized("invalid token"))
    }

    /// Generate a fresh TOTP secret, returned base32-encoded together with
    /// the otpauth provisioning URI for authenticator apps.
    pub fn generate_totp_secret(&self, account: &str) -> Result<(String, String)> {
        let raw: Vec<u8> = (0..20).map(|_| rand::thread_rng().gen()).collect();
        let encoded = Secret::Raw(raw).to_encoded().to_string();
        let uri = format!(
            "otpauth://totp/V%20Panel:{account}?secret={encoded}&issuer=V%20Panel&algorithm=SHA1&digits=6&period=30"
        );
        Ok((encoded, uri))
    }

    /// Check a six-digit code against a base32 secret, allowing one 30 s
    /// step of clock skew either way.
    pub fn verify_totp(&self, secret_base32: &str, code: &str) -> Result<bool> {
        let totp = Self::totp(secret_base32)?;
        totp.check_current(code)
            .map_err(|e| PanelError::internal(format!("system clock: {e}")))
    }

    /// Current code for a secret; the enrolment tests use this.
    pub fn current_totp(&self, secret_base32: &str) -> Result<String> {
        let totp = Self::totp(secret_base32)?;
        totp.generate_current()
            .map_err(|e| PanelError::internal(format!("system clock: {e}")))
    }

    fn totp(secret_base32: &str) -> Result<TOTP> {
        let secret = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| PanelError::validation(format!("invalid TOTP secret: {e:?}")))?;
        TOTP::new(totp_rs::Algorithm::SHA1, 6, 1, 30, secret)
            .map_err(|e| PanelError::validation(format!("invalid TOTP secret: {e:?}")))
    }

    /// One-shot recovery codes, 8 alphanumeric characters each.
    #[must_use]
    pub fn generate_backup_codes(&self, count: usize) -> Vec<String> {
        (0..count).map(|_| random_alphanumeric(8)).collect()
    }

    /// Random 12-character password satisfying the user password rule.
    #[must_use]
    pub fn generate_temporary_password(&self) -> String {
        loop {
            let candidate = random_alphanumeric(12);
            if super::validate::validate_password(&candidate).is_ok() {
                return candidate;
            }
        }
    }
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn service() -> AuthService {
        AuthService::new("0123456789abcdef0123456789abcdef", 24, 168)
    }

    fn user() -> User {
        User {
            id: 42,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            role: Role::User,
            enabled: true,
            email_verified: true,
            two_factor_enabled: false,
            expires_at: None,
            traffic_limit: 0,
            traffic_used: 0,
            inviter_id: None,
            token_version: 3,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_hash_round_trip() {
        let service = service();
        let hash = service.hash_password("hunter42x").unwrap();
        assert!(service.verify_password("hunter42x", &hash).unwrap());
        assert!(!service.verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn test_jwt_round_trip_carries_claims() {
        let service = service();
        let token = service.mint_token(&user()).unwrap();
        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.token_version, 3);
        assert_eq!(claims.kind, TokenKind::Access);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_refresh_token_lives_longer() {
        let service = service();
        let u = user();
        let access = service.verify_token(&service.mint_token(&u).unwrap()).unwrap();
        let refresh = service
            .verify_token(&service.mint_refresh_token(&u).unwrap())
            .unwrap();
        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let service = service();
        let other = AuthService::new("another-secret-another-secret-xx", 24, 168);
        let token = other.mint_token(&user()).unwrap();
        assert!(service.verify_token(&token).is_err());
        assert!(service.verify_token("not-a-jwt").is_err());
    }

    #[test]
    fn test_totp_round_trip() {
        let service = service();
        let (secret, uri) = service.generate_totp_secret("alice").unwrap();
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains(&secret));

        let code = service.current_totp(&secret).unwrap();
        assert_eq!(code.len(), 6);
        assert!(service.verify_totp(&secret, &code).unwrap());
        assert!(!service.verify_totp(&secret, "000000").unwrap()
            || code == "000000");
    }

    #[test]
    fn test_backup_codes_shape() {
        let codes = service().generate_backup_codes(10);
        assert_eq!(codes.len(), 10);
        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_temporary_password_satisfies_rule() {
        let service = service();
        for _ in 0..20 {
            let password = service.generate_temporary_password();
            assert_eq!(password.len(), 12);
            assert!(super::super::validate::validate_password(&password).is_ok());
        }
    }
}
