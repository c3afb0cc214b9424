//! Configuration for the panel
//!
//! Configuration is resolved once at startup from three layers, lowest
//! precedence first: code defaults, a YAML file, then `V_`-prefixed
//! environment variables. The resolved [`PanelConfig`] is validated before
//! the server starts; an invalid configuration is fatal.

use crate::auth::validate::validate_password;
use crate::error::{PanelError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Sentinel default that must never survive into a running deployment.
const JWT_SECRET_SENTINEL: &str = "change-me-to-a-long-random-secret-value";

/// Cache backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Database location (the SQL layer itself lives behind the store traits)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/vpanel.db".to_string(),
        }
    }
}

/// Authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret; required, at least 32 characters
    pub jwt_secret: String,
    /// Access-token lifetime in hours
    pub token_expiry_hours: i64,
    /// Refresh-token lifetime in hours
    pub refresh_expiry_hours: i64,
    /// Seed admin username
    pub admin_user: String,
    /// Seed admin password; must satisfy the user password rule
    pub admin_pass: String,
    /// Whether registration consumes an invite code
    pub invite_required: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: JWT_SECRET_SENTINEL.to_string(),
            token_expiry_hours: 24,
            refresh_expiry_hours: 24 * 7,
            admin_user: "admin".to_string(),
            admin_pass: String::new(),
            invite_required: false,
        }
    }
}

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis_url: String,
    pub key_prefix: String,
    pub default_ttl_secs: u64,
    pub max_memory_items: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "vpanel".to_string(),
            default_ttl_secs: 300,
            max_memory_items: 10_000,
        }
    }
}

/// Subscription delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Per-token fetch budget per hour
    pub rate_limit_per_hour: u32,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_hour: 60,
        }
    }
}

/// Trial settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    pub enabled: bool,
    pub duration_days: i64,
    /// Trial traffic allowance in bytes; 0 means unlimited
    pub traffic_limit: u64,
    pub require_email_verify: bool,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_days: 3,
            traffic_limit: 5 * 1024 * 1024 * 1024,
            require_email_verify: true,
        }
    }
}

/// Referral commission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionConfig {
    pub enabled: bool,
    /// Commission rate in basis points (100 = 1%)
    pub rate_bps: u32,
    /// Days a commission stays pending before settlement
    pub settle_days: i64,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_bps: 1000,
            settle_days: 7,
        }
    }
}

/// Order settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Minutes an unpaid order stays `pending` before the sweep cancels it
    pub expiry_minutes: i64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self { expiry_minutes: 30 }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `trace` | `debug` | `info` | `warn` | `error`
    pub level: String,
    /// `text` | `json`
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Fully resolved panel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub subscription: SubscriptionConfig,
    pub trial: TrialConfig,
    pub commission: CommissionConfig,
    pub order: OrderConfig,
    pub log: LogConfig,
}

fn env_string(key: &str, target: &mut String) {
    if let Ok(value) = env::var(key) {
        *target = value;
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Some(value) = env::var(key).ok().and_then(|s| s.parse().ok()) {
        *target = value;
    }
}

fn env_bool(key: &str, target: &mut bool) {
    if let Ok(value) = env::var(key) {
        *target = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
    }
}

impl PanelConfig {
    /// Resolve configuration: defaults, then the YAML file (if any), then
    /// `V_*` environment variables. The result is validated.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    PanelError::internal(format!("cannot read config {}: {e}", path.display()))
                })?;
                serde_yaml::from_str(&raw)
                    .map_err(|e| PanelError::validation(format!("invalid config file: {e}")))?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Overlay `V_*` environment variables onto the current values.
    pub fn apply_env(&mut self) {
        env_string("V_SERVER_HOST", &mut self.server.host);
        env_parse("V_SERVER_PORT", &mut self.server.port);
        env_string("V_DB_PATH", &mut self.database.path);
        env_string("V_JWT_SECRET", &mut self.auth.jwt_secret);
        env_parse("V_TOKEN_EXPIRY", &mut self.auth.token_expiry_hours);
        env_string("V_ADMIN_USER", &mut self.auth.admin_user);
        env_string("V_ADMIN_PASS", &mut self.auth.admin_pass);
        env_bool("V_INVITE_REQUIRED", &mut self.auth.invite_required);
        env_string("V_LOG_LEVEL", &mut self.log.level);
        env_string("V_LOG_FORMAT", &mut self.log.format);
        env_string("V_REDIS_URL", &mut self.cache.redis_url);
        env_parse("V_SUB_RATE_LIMIT", &mut self.subscription.rate_limit_per_hour);
        env_bool("V_TRIAL_ENABLED", &mut self.trial.enabled);
        env_parse("V_TRIAL_DURATION_DAYS", &mut self.trial.duration_days);
        env_parse("V_COMMISSION_RATE_BPS", &mut self.commission.rate_bps);
        env_parse("V_COMMISSION_SETTLE_DAYS", &mut self.commission.settle_days);
        env_parse("V_ORDER_EXPIRY_MINUTES", &mut self.order.expiry_minutes);
        if let Ok(backend) = env::var("V_CACHE_BACKEND") {
            match backend.to_lowercase().as_str() {
                "redis" => self.cache.backend = CacheBackend::Redis,
                "memory" => self.cache.backend = CacheBackend::Memory,
                _ => {}
            }
        }
    }

    /// Check invariants that make a configuration deployable.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            return Err(PanelError::validation(
                "jwt_secret must be at least 32 characters",
            ));
        }
        if self.auth.jwt_secret == JWT_SECRET_SENTINEL {
            return Err(PanelError::validation(
                "jwt_secret is still the placeholder value",
            ));
        }
        if !self.auth.admin_pass.is_empty() {
            validate_password(&self.auth.admin_pass)
                .map_err(|e| PanelError::validation(format!("admin_pass: {e}")))?;
        }
        if self.server.host.trim().is_empty() {
            return Err(PanelError::validation("server.host must not be empty"));
        }
        if self.auth.token_expiry_hours <= 0 {
            return Err(PanelError::validation("token_expiry_hours must be positive"));
        }
        if self.order.expiry_minutes <= 0 {
            return Err(PanelError::validation("order.expiry_minutes must be positive"));
        }
        if self.commission.settle_days < 0 {
            return Err(PanelError::validation("commission.settle_days must be >= 0"));
        }
        Ok(())
    }
}
