//! Subscription lifecycle and content assembly
//!
//! Owns token/short-code issuance, the access gate, per-token rate
//! limiting, proxy selection and the dispatch into the format generators.
//! The fetch path is read-mostly: the proxy list is served through the
//! cache and the access-stat update is best-effort.

use super::detect::{detect_client_format, ClientFormat};
use super::formats::{generator_for, GeneratorOptions};
use super::PROFILE_UPDATE_INTERVAL_HOURS;
use crate::auth::rate_limit::{RateLimitConfig, RateLimiter};
use crate::cache::Cache;
use crate::config::SubscriptionConfig;
use crate::error::{PanelError, Result};
use crate::models::{Proxy, ProxyProtocol, Subscription, User};
use crate::store::{Page, ProxyStore, SubscriptionFilter, SubscriptionStore, UserStore};
use crate::tokens::{generate_short_code, generate_token};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How a fetch identifies its subscription
#[derive(Debug, Clone, Copy)]
pub enum Credential<'a> {
    Token(&'a str),
    ShortCode(&'a str),
}

/// Query-string options of a subscription fetch
#[derive(Debug, Clone, Default)]
pub struct FetchQuery {
    /// Explicit `?format=`; overrides UA detection
    pub format: Option<ClientFormat>,
    /// Protocol whitelist, empty means all
    pub protocols: Vec<ProxyProtocol>,
    /// Proxy-id include list, empty means all
    pub include: Vec<u64>,
    /// Proxy-id exclude list
    pub exclude: Vec<u64>,
    /// Rename template with `{name}`, `{protocol}`, `{index}` placeholders
    pub rename: Option<String>,
}

/// Values of the `Subscription-Userinfo` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserInfo {
    pub upload: u64,
    pub download: u64,
    pub total: u64,
    /// Unix seconds of account expiry, 0 when the account never expires
    pub expire: i64,
}

impl UserInfo {
    fn for_user(user: &User) -> Self {
        Self {
            upload: 0,
            download: user.traffic_used,
            total: user.traffic_limit,
            expire: user.expires_at.map_or(0, |at| at.timestamp()),
        }
    }

    /// Render the header value: `upload=U; download=D; total=T; expire=E`.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!(
            "upload={}; download={}; total={}; expire={}",
            self.upload, self.download, self.total, self.expire
        )
    }
}

/// A generated subscription body plus everything the HTTP layer attaches
#[derive(Debug, Clone)]
pub struct SubscriptionContent {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
    pub profile_title: String,
    pub userinfo: UserInfo,
    pub last_modified: DateTime<Utc>,
}

/// Result of a subscription fetch that resolved to a live subscription
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// 200 with the generated body
    Content(Box<SubscriptionContent>),
    /// 304, nothing newer than the client's copy
    NotModified { userinfo: UserInfo },
    /// 403; the account exists but is not serviceable
    Denied { reason: String, userinfo: UserInfo },
}

/// Subscription engine
pub struct SubscriptionService {
    subs: Arc<dyn SubscriptionStore>,
    users: Arc<dyn UserStore>,
    proxies: Arc<dyn ProxyStore>,
    cache: Arc<dyn Cache>,
    limiter: RateLimiter,
    config: SubscriptionConfig,
}

impl SubscriptionService {
    pub fn new(
        subs: Arc<dyn SubscriptionStore>,
        users: Arc<dyn UserStore>,
        proxies: Arc<dyn ProxyStore>,
        cache: Arc<dyn Cache>,
        config: SubscriptionConfig,
    ) -> Self {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_attempts: config.rate_limit_per_hour,
            window: Duration::from_secs(3600),
            lockout: Duration::from_secs(3600),
        });
        Self {
            subs,
            users,
            proxies,
            cache,
            limiter,
            config,
        }
    }

    /// The user's subscription, created on first use.
    pub async fn get_or_create(&self, user_id: u64) -> Result<Subscription> {
        if let Some(sub) = self.subs.get_by_user(user_id).await? {
            return Ok(sub);
        }
        let now = Utc::now();
        // Token collisions are astronomically rare but the unique index is
        // authoritative; retry a couple of times before giving up.
        for _ in 0..3 {
            let result = self
                .subs
                .create(Subscription {
                    id: 0,
                    user_id,
                    token: generate_token(),
                    short_code: generate_short_code(),
                    created_at: now,
                    updated_at: now,
                    last_access_at: None,
                    access_count: 0,
                })
                .await;
            match result {
                Ok(sub) => return Ok(sub),
                Err(PanelError::Conflict(_)) => {
                    // Either a token collision or a concurrent create won.
                    if let Some(sub) = self.subs.get_by_user(user_id).await? {
                        return Ok(sub);
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Err(PanelError::internal("could not allocate subscription token"))
    }

    /// Replace token and short code atomically; the old values stop
    /// resolving immediately.
    pub async fn regenerate(&self, user_id: u64) -> Result<Subscription> {
        let mut sub = self
            .subs
            .get_by_user(user_id)
            .await?
            .ok_or_else(|| PanelError::not_found("subscription"))?;
        for _ in 0..3 {
            sub.token = generate_token();
            sub.short_code = generate_short_code();
            sub.updated_at = Utc::now();
            match self.subs.update(&sub).await {
                Ok(()) => {
                    info!(user_id, "subscription regenerated");
                    return Ok(sub);
                }
                Err(PanelError::Conflict(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Err(PanelError::internal("could not allocate subscription token"))
    }

    /// Resolve a token or short code.
    pub async fn resolve(&self, credential: Credential<'_>) -> Result<Subscription> {
        let sub = match credential {
            Credential::Token(token) => self.subs.get_by_token(token).await?,
            Credential::ShortCode(code) => self.subs.get_by_short_code(code).await?,
        };
        sub.ok_or_else(|| PanelError::not_found("subscription"))
    }

    /// The full fetch pipeline: resolve, rate-limit, gate, select, filter,
    /// generate.
    pub async fn fetch(
        &self,
        credential: Credential<'_>,
        user_agent: &str,
        query: &FetchQuery,
        client_ip: &str,
        if_modified_since: Option<DateTime<Utc>>,
    ) -> Result<FetchOutcome> {
        let mut sub = self.resolve(credential).await?;

        // Budget is per token, regardless of which alias was used.
        self.limiter.check_rate_limit(&sub.token)?;
        self.limiter.record_login_attempt(&sub.token, false);

        let user = self
            .users
            .get(sub.user_id)
            .await?
            .ok_or_else(|| PanelError::not_found("user"))?;
        let userinfo = UserInfo::for_user(&user);

        let now = Utc::now();
        if !user.enabled {
            return Ok(FetchOutcome::Denied {
                reason: "account disabled".to_string(),
                userinfo,
            });
        }
        if user.expires_at.is_some_and(|at| at <= now) {
            return Ok(FetchOutcome::Denied {
                reason: "account expired".to_string(),
                userinfo,
            });
        }
        if user.traffic_limit > 0 && user.traffic_used >= user.traffic_limit {
            return Ok(FetchOutcome::Denied {
                reason: "traffic exceeded".to_string(),
                userinfo,
            });
        }

        info!(
            user_id = user.id,
            ip = client_ip,
            ua = user_agent,
            "subscription fetched"
        );
        // Best effort: a failed stat update must not lose the response.
        sub.last_access_at = Some(now);
        sub.access_count += 1;
        if let Err(err) = self.subs.update(&sub).await {
            debug!(error = %err, "access stat update skipped");
        }

        let all = self.load_proxies(user.id).await?;
        let mut selected = select_proxies(all, query);
        apply_rename(&mut selected, query.rename.as_deref());
        disambiguate_names(&mut selected);

        let last_modified = selected
            .iter()
            .map(|p| p.updated_at)
            .chain(std::iter::once(sub.updated_at))
            .max()
            .unwrap_or(sub.updated_at);
        if if_modified_since.is_some_and(|since| last_modified.timestamp() <= since.timestamp()) {
            return Ok(FetchOutcome::NotModified { userinfo });
        }

        let format = query
            .format
            .unwrap_or_else(|| detect_client_format(user_agent));
        let generator = generator_for(format);
        let options = GeneratorOptions {
            subscription_name: self.config_profile_title(&user),
            include_proxy_groups: true,
            update_interval: PROFILE_UPDATE_INTERVAL_HOURS,
        };
        let body = generator.generate(&selected, &options)?;

        Ok(FetchOutcome::Content(Box::new(SubscriptionContent {
            body,
            content_type: generator.content_type(),
            filename: format!(
                "{}.{}",
                options.subscription_name,
                generator.file_extension()
            ),
            profile_title: options.subscription_name.clone(),
            userinfo,
            last_modified,
        })))
    }

    /// Admin: delete the user's subscription, breaking all current links.
    pub async fn revoke(&self, user_id: u64) -> Result<()> {
        self.subs
            .get_by_user(user_id)
            .await?
            .ok_or_else(|| PanelError::not_found("subscription"))?;
        self.subs.delete_by_user(user_id).await?;
        info!(user_id, "subscription revoked");
        Ok(())
    }

    /// Admin: zero the access statistics.
    pub async fn reset_stats(&self, user_id: u64) -> Result<Subscription> {
        let mut sub = self
            .subs
            .get_by_user(user_id)
            .await?
            .ok_or_else(|| PanelError::not_found("subscription"))?;
        sub.access_count = 0;
        sub.last_access_at = None;
        self.subs.update(&sub).await?;
        Ok(sub)
    }

    /// Admin listing with pagination and filters.
    pub async fn list(
        &self,
        filter: &SubscriptionFilter,
        page: Page,
    ) -> Result<(Vec<Subscription>, u64)> {
        self.subs.list(filter, page).await
    }

    /// Drop the cached proxy list after proxy CRUD for `user_id`.
    pub async fn invalidate_proxies(&self, user_id: u64) {
        if let Err(err) = self.cache.delete(&proxy_cache_key(user_id)).await {
            debug!(error = %err, user_id, "proxy cache invalidation failed");
        }
    }

    /// Cache-through read of the user's enabled proxies. Cache faults fall
    /// through to the store.
    async fn load_proxies(&self, user_id: u64) -> Result<Vec<Proxy>> {
        let key = proxy_cache_key(user_id);
        if let Ok(Some(raw)) = self.cache.get(&key).await {
            if let Ok(proxies) = serde_json::from_str::<Vec<Proxy>>(&raw) {
                return Ok(proxies);
            }
        }
        let proxies = self.proxies.list_by_user(user_id, true).await?;
        if let Ok(raw) = serde_json::to_string(&proxies) {
            if let Err(err) = self.cache.set(&key, &raw, None).await {
                debug!(error = %err, "proxy cache write failed");
            }
        }
        Ok(proxies)
    }

    fn config_profile_title(&self, user: &User) -> String {
        format!("V Panel - {}", user.username)
    }
}

fn proxy_cache_key(user_id: u64) -> String {
    format!("sub:proxies:{user_id}")
}

/// Apply protocol whitelist, include list and exclude list, in that order.
fn select_proxies(proxies: Vec<Proxy>, query: &FetchQuery) -> Vec<Proxy> {
    proxies
        .into_iter()
        .filter(|p| query.protocols.is_empty() || query.protocols.contains(&p.protocol))
        .filter(|p| query.include.is_empty() || query.include.contains(&p.id))
        .filter(|p| !query.exclude.contains(&p.id))
        .collect()
}

/// Expand `{name}`, `{protocol}` and `{index}` per proxy.
fn apply_rename(proxies: &mut [Proxy], template: Option<&str>) {
    let Some(template) = template else { return };
    if template.is_empty() {
        return;
    }
    for (index, proxy) in proxies.iter_mut().enumerate() {
        proxy.name = template
            .replace("{name}", &proxy.name)
            .replace("{protocol}", proxy.protocol.as_str())
            .replace("{index}", &(index + 1).to_string());
    }
}

/// Disambiguate colliding names by appending `-2`, `-3`, ... in load order.
fn disambiguate_names(proxies: &mut [Proxy]) {
    use std::collections::HashMap;
    let mut seen: HashMap<String, u32> = HashMap::new();
    for proxy in proxies.iter_mut() {
        let count = seen.entry(proxy.name.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            proxy.name = format!("{}-{}", proxy.name, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::{ProxySettings, Role};
    use crate::store::{
        MemoryProxyStore, MemorySubscriptionStore, MemoryUserStore, ProxyStore, UserStore,
    };

    fn proxy(id: u64, name: &str, protocol: ProxyProtocol) -> Proxy {
        let mut settings = ProxySettings::new();
        settings
            .set("uuid", "U1")
            .set("password", "P1")
            .set("method", "aes-256-gcm");
        Proxy {
            id,
            user_id: 1,
            name: name.to_string(),
            remark: None,
            protocol,
            host: "a.example".to_string(),
            port: 443,
            settings,
            enabled: true,
            node_id: None,
            updated_at: Utc::now(),
        }
    }

    async fn service() -> (SubscriptionService, Arc<MemoryUserStore>, Arc<MemoryProxyStore>)
    {
        let users = Arc::new(MemoryUserStore::new());
        let proxies = Arc::new(MemoryProxyStore::new());
        let subs = Arc::new(MemorySubscriptionStore::new());
        let cache = Arc::new(MemoryCache::new(
            "test",
            1000,
            Duration::from_secs(60),
        ));
        let service = SubscriptionService::new(
            subs,
            users.clone(),
            proxies.clone(),
            cache,
            SubscriptionConfig::default(),
        );
        (service, users, proxies)
    }

    async fn seed_user(users: &MemoryUserStore) -> User {
        users
            .create(User {
                id: 0,
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
                token_version: 0,
                last_login_at: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (service, users, _) = service().await;
        let user = seed_user(&users).await;
        let first = service.get_or_create(user.id).await.unwrap();
        let second = service.get_or_create(user.id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.token, second.token);
        assert!(first.token.len() >= 32);
        assert_eq!(first.short_code.len(), 8);
    }

    #[tokio::test]
    async fn test_regenerate_invalidates_old_credentials() {
        let (service, users, _) = service().await;
        let user = seed_user(&users).await;
        let old = service.get_or_create(user.id).await.unwrap();
        let new = service.regenerate(user.id).await.unwrap();

        assert_ne!(old.token, new.token);
        assert_ne!(old.short_code, new.short_code);
        assert!(matches!(
            service.resolve(Credential::Token(&old.token)).await,
            Err(PanelError::NotFound(_))
        ));
        assert!(matches!(
            service
                .resolve(Credential::ShortCode(&old.short_code))
                .await,
            Err(PanelError::NotFound(_))
        ));
        let resolved = service
            .resolve(Credential::Token(&new.token))
            .await
            .unwrap();
        assert_eq!(resolved.user_id, user.id);
    }

    #[tokio::test]
    async fn test_short_code_and_token_resolve_same_subscription() {
        let (service, users, _) = service().await;
        let user = seed_user(&users).await;
        let sub = service.get_or_create(user.id).await.unwrap();
        let by_token = service
            .resolve(Credential::Token(&sub.token))
            .await
            .unwrap();
        let by_code = service
            .resolve(Credential::ShortCode(&sub.short_code))
            .await
            .unwrap();
        assert_eq!(by_token.id, by_code.id);
    }

    #[tokio::test]
    async fn test_fetch_gates_disabled_account() {
        let (service, users, _) = service().await;
        let mut user = seed_user(&users).await;
        let sub = service.get_or_create(user.id).await.unwrap();

        user.enabled = false;
        users.update(&user).await.unwrap();

        let outcome = service
            .fetch(
                Credential::Token(&sub.token),
                "v2rayN/6.42",
                &FetchQuery::default(),
                "1.2.3.4",
                None,
            )
            .await
            .unwrap();
        let FetchOutcome::Denied { reason, userinfo } = outcome else {
            panic!("expected denial");
        };
        assert_eq!(reason, "account disabled");
        assert_eq!(userinfo.download, 0);
    }

    #[tokio::test]
    async fn test_fetch_gates_traffic_exceeded() {
        let (service, users, _) = service().await;
        let mut user = seed_user(&users).await;
        let sub = service.get_or_create(user.id).await.unwrap();

        user.traffic_limit = 100;
        user.traffic_used = 100;
        users.update(&user).await.unwrap();

        let outcome = service
            .fetch(
                Credential::Token(&sub.token),
                "",
                &FetchQuery::default(),
                "1.2.3.4",
                None,
            )
            .await
            .unwrap();
        assert!(
            matches!(outcome, FetchOutcome::Denied { reason, .. } if reason == "traffic exceeded")
        );
    }

    #[tokio::test]
    async fn test_fetch_filters_and_disambiguates() {
        let (service, users, proxies) = service().await;
        let user = seed_user(&users).await;
        let sub = service.get_or_create(user.id).await.unwrap();

        for (name, protocol, enabled) in [
            ("node", ProxyProtocol::Vless, true),
            ("node", ProxyProtocol::Trojan, true),
            ("hidden", ProxyProtocol::Vless, false),
        ] {
            let mut p = proxy(0, name, protocol);
            p.user_id = user.id;
            p.enabled = enabled;
            proxies.create(p).await.unwrap();
        }

        let outcome = service
            .fetch(
                Credential::Token(&sub.token),
                "clash-verge/1.0",
                &FetchQuery {
                    format: Some(ClientFormat::ClashMeta),
                    ..FetchQuery::default()
                },
                "1.2.3.4",
                None,
            )
            .await
            .unwrap();
        let FetchOutcome::Content(content) = outcome else {
            panic!("expected content");
        };
        let doc: serde_yaml::Value = serde_yaml::from_slice(&content.body).unwrap();
        let names: Vec<&str> = doc["proxies"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        // Disabled proxy absent, colliding names disambiguated in order.
        assert_eq!(names, vec!["node", "node-2"]);
    }

    #[tokio::test]
    async fn test_fetch_not_modified() {
        let (service, users, _) = service().await;
        let user = seed_user(&users).await;
        let sub = service.get_or_create(user.id).await.unwrap();

        let outcome = service
            .fetch(
                Credential::Token(&sub.token),
                "",
                &FetchQuery::default(),
                "1.2.3.4",
                Some(Utc::now() + chrono::Duration::hours(1)),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::NotModified { .. }));

        let outcome = service
            .fetch(
                Credential::Token(&sub.token),
                "",
                &FetchQuery::default(),
                "1.2.3.4",
                Some(Utc::now() - chrono::Duration::hours(1)),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::Content(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_caps_fetches() {
        let (service, users, _) = service().await;
        let user = seed_user(&users).await;
        let sub = service.get_or_create(user.id).await.unwrap();

        for _ in 0..60 {
            service
                .fetch(
                    Credential::Token(&sub.token),
                    "",
                    &FetchQuery::default(),
                    "1.2.3.4",
                    None,
                )
                .await
                .unwrap();
        }
        let err = service
            .fetch(
                Credential::Token(&sub.token),
                "",
                &FetchQuery::default(),
                "1.2.3.4",
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::RateLimit(_)));
    }

    #[tokio::test]
    async fn test_reset_stats_and_revoke() {
        let (service, users, _) = service().await;
        let user = seed_user(&users).await;
        let sub = service.get_or_create(user.id).await.unwrap();
        service
            .fetch(
                Credential::Token(&sub.token),
                "",
                &FetchQuery::default(),
                "1.2.3.4",
                None,
            )
            .await
            .unwrap();

        let sub = service.reset_stats(user.id).await.unwrap();
        assert_eq!(sub.access_count, 0);
        assert!(sub.last_access_at.is_none());

        service.revoke(user.id).await.unwrap();
        assert!(service
            .resolve(Credential::Token(&sub.token))
            .await
            .is_err());
    }

    #[test]
    fn test_rename_template() {
        let mut proxies = vec![
            proxy(1, "alpha", ProxyProtocol::Vless),
            proxy(2, "beta", ProxyProtocol::Trojan),
        ];
        apply_rename(&mut proxies, Some("[{protocol}] {name} #{index}"));
        assert_eq!(proxies[0].name, "[vless] alpha #1");
        assert_eq!(proxies[1].name, "[trojan] beta #2");
    }

    #[test]
    fn test_disambiguation_appends_counters() {
        let mut proxies = vec![
            proxy(1, "n", ProxyProtocol::Vless),
            proxy(2, "n", ProxyProtocol::Vless),
            proxy(3, "n", ProxyProtocol::Vless),
            proxy(4, "other", ProxyProtocol::Vless),
        ];
        disambiguate_names(&mut proxies);
        let names: Vec<&str> = proxies.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["n", "n-2", "n-3", "other"]);
    }

    #[test]
    fn test_select_order_protocols_then_include_then_exclude() {
        let proxies = vec![
            proxy(1, "a", ProxyProtocol::Vless),
            proxy(2, "b", ProxyProtocol::Trojan),
            proxy(3, "c", ProxyProtocol::Vless),
        ];
        let query = FetchQuery {
            protocols: vec![ProxyProtocol::Vless],
            include: vec![1, 3],
            exclude: vec![3],
            ..FetchQuery::default()
        };
        let selected = select_proxies(proxies, &query);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, 1);
    }
}
