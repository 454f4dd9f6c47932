//! Koios API client with rate limiting, retries and a freshness-aware response cache.

use crate::chain::cache::{Cache, CacheError};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

pub const DEFAULT_KOIOS_URL: &str = "https://api.koios.rest/api/v1";
const RATE_LIMIT_MS: u64 = 200;
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 500;

/// Rewards grow once per epoch.
const REWARDS_MAX_AGE_SECS: i64 = 3_600;
const ACCOUNT_MAX_AGE_SECS: i64 = 300;
const POOL_MAX_AGE_SECS: i64 = 86_400;
const TIP_MAX_AGE_SECS: i64 = 20;
const CACHE_RETENTION_SECS: i64 = 30 * 86_400;

/// Endpoints whose responses belong to one wallet's account.
pub const ACCOUNT_ENDPOINTS: [&str; 2] = ["/account_rewards", "/account_info"];

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub base_url: String,
    pub rate_limit_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub offline: bool,
    /// Cached responses older than this are purged when an online fetcher
    /// opens the cache. `None` keeps everything.
    pub cache_retention_secs: Option<i64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_KOIOS_URL.to_string(),
            rate_limit_ms: RATE_LIMIT_MS,
            max_retries: MAX_RETRIES,
            retry_backoff_ms: RETRY_BACKOFF_MS,
            offline: false,
            cache_retention_secs: Some(CACHE_RETENTION_SECS),
        }
    }
}

impl FetchConfig {
    pub fn with_base_url(base_url: &str) -> Result<Self, FetchError> {
        let config = Self {
            base_url: base_url.to_string(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Base URL must be absolute http(s).
    pub fn validate(&self) -> Result<(), FetchError> {
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| FetchError::InvalidBaseUrl(format!("{}: {e}", self.base_url)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(FetchError::InvalidBaseUrl(format!(
                "unsupported scheme {other}"
            ))),
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("cache: {0}")]
    Cache(#[from] CacheError),
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
    #[error("api error: status {0} body {1}")]
    Api(u16, String),
    #[error("parse {endpoint}: {message}")]
    Parse { endpoint: String, message: String },
    #[error("offline mode: no cached data for key")]
    OfflineMiss,
}

#[derive(Clone, Debug, Deserialize)]
pub struct KoiosAccountRewards {
    pub stake_address: String,
    #[serde(default)]
    pub rewards: Vec<KoiosRewardRow>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct KoiosRewardRow {
    pub earned_epoch: u64,
    pub spendable_epoch: Option<u64>,
    pub amount: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub pool_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct KoiosAccountInfo {
    pub stake_address: String,
    pub status: String,
    pub delegated_pool: Option<String>,
    pub total_balance: Option<String>,
    pub rewards_available: Option<String>,
}

impl KoiosAccountInfo {
    pub fn is_registered(&self) -> bool {
        self.status == "registered"
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct KoiosPoolInfo {
    pub pool_id_bech32: String,
    pub pool_id_hex: Option<String>,
    pub meta_json: Option<KoiosPoolMetaJson>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct KoiosPoolMetaJson {
    pub name: Option<String>,
    pub ticker: Option<String>,
    pub homepage: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct KoiosTip {
    pub hash: Option<String>,
    pub epoch_no: u64,
    pub abs_slot: u64,
    pub epoch_slot: u64,
    pub block_time: Option<i64>,
}

fn parse_body<T: serde::de::DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Parse {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

/// Fetcher with rate limiting and optional SQLite cache.
pub struct Fetcher {
    config: FetchConfig,
    client: Option<reqwest::Client>,
    cache: Option<Cache>,
    last_request: Mutex<Option<OffsetDateTime>>,
    request_count: AtomicU64,
}

impl Fetcher {
    pub fn new(config: FetchConfig, cache: Option<Cache>) -> Result<Self, FetchError> {
        config.validate()?;
        let client = if config.offline {
            None
        } else {
            Some(
                reqwest::Client::builder()
                    .use_rustls_tls()
                    .timeout(Duration::from_secs(30))
                    .build()?,
            )
        };
        if let (Some(cache), Some(retention), false) =
            (&cache, config.cache_retention_secs, config.offline)
        {
            let cutoff = OffsetDateTime::now_utc().unix_timestamp() - retention;
            let purged = cache.purge_older_than(cutoff)?;
            if purged > 0 {
                debug!(purged, "purged expired cache entries");
            }
        }
        Ok(Self {
            config,
            client,
            cache,
            last_request: Mutex::new(None),
            request_count: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    /// Forget cached account responses so the next lookups hit the network.
    pub fn invalidate_account_data(&self) -> Result<usize, FetchError> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let mut removed = 0;
        for endpoint in ACCOUNT_ENDPOINTS {
            removed += cache.invalidate_endpoint(endpoint)?;
        }
        info!(removed, "invalidated cached account responses");
        Ok(removed)
    }

    async fn rate_limit(&self) {
        let prev = *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let sleep_ms = match prev {
            Some(prev) => {
                let elapsed = (OffsetDateTime::now_utc() - prev).whole_milliseconds();
                let need = i128::from(self.config.rate_limit_ms);
                u64::try_from((need - elapsed).max(0)).unwrap_or(0)
            }
            None => 0,
        };
        if sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }
        *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(OffsetDateTime::now_utc());
    }

    /// Serve from cache when fresh; otherwise hit the network and fall back to
    /// a stale copy if the network fails.
    async fn request_json(
        &self,
        endpoint: &str,
        post_body: Option<serde_json::Value>,
        max_age_secs: i64,
    ) -> Result<String, FetchError> {
        let norm = serde_json::json!({ "endpoint": endpoint, "body": post_body });
        let cache_key = Cache::key_for(&norm.to_string());
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let stale = match &self.cache {
            Some(cache) => match cache.get(&cache_key)? {
                Some(hit) if self.config.offline || hit.age_secs(now) <= max_age_secs => {
                    debug!(endpoint, key = %cache_key, "cache hit");
                    return Ok(hit.body);
                }
                other => other,
            },
            None => None,
        };
        let Some(client) = self.client.as_ref() else {
            return Err(FetchError::OfflineMiss);
        };

        match self.send_with_retries(client, endpoint, post_body.as_ref()).await {
            Ok(body) => {
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.set(&cache_key, endpoint, &body) {
                        warn!(endpoint, error = %e, "cache write failed");
                    }
                }
                Ok(body)
            }
            Err(e) => match stale {
                Some(hit) => {
                    warn!(endpoint, error = %e, age = hit.age_secs(now), "serving stale cached response");
                    Ok(hit.body)
                }
                None => Err(e),
            },
        }
    }

    async fn send_with_retries(
        &self,
        client: &reqwest::Client,
        path: &str,
        post_body: Option<&serde_json::Value>,
    ) -> Result<String, FetchError> {
        self.rate_limit().await;
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut last_err = None;
        for attempt in 0..=self.config.max_retries {
            let res = match post_body {
                Some(body) => client.post(&url).json(body).send().await,
                None => client.get(&url).send().await,
            };
            match res {
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await.unwrap_or_default();
                    if status.is_success() {
                        self.request_count.fetch_add(1, Ordering::Relaxed);
                        return Ok(body);
                    }
                    last_err = Some(FetchError::Api(status.as_u16(), body));
                }
                Err(e) => last_err = Some(FetchError::Request(e)),
            }
            if attempt < self.config.max_retries {
                let ms = self.config.retry_backoff_ms * (1 << attempt);
                warn!(attempt, ms, url = %url, "retry after error");
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
        }
        Err(last_err.unwrap_or(FetchError::Api(0, "unknown".to_string())))
    }

    /// Reward history rows for one stake address. Empty when the account is unknown.
    pub async fn account_rewards(
        &self,
        stake_address: &str,
    ) -> Result<Vec<KoiosRewardRow>, FetchError> {
        let body = serde_json::json!({ "_stake_addresses": [stake_address] });
        let raw = self
            .request_json(ACCOUNT_ENDPOINTS[0], Some(body), REWARDS_MAX_AGE_SECS)
            .await?;
        let parsed: Vec<KoiosAccountRewards> = parse_body("/account_rewards", &raw)?;
        let rows: Vec<KoiosRewardRow> = parsed
            .into_iter()
            .filter(|a| a.stake_address == stake_address)
            .flat_map(|a| a.rewards)
            .collect();
        info!(stake = stake_address, count = rows.len(), "account_rewards");
        Ok(rows)
    }

    pub async fn account_info(
        &self,
        stake_address: &str,
    ) -> Result<Option<KoiosAccountInfo>, FetchError> {
        let body = serde_json::json!({ "_stake_addresses": [stake_address] });
        let raw = self
            .request_json(ACCOUNT_ENDPOINTS[1], Some(body), ACCOUNT_MAX_AGE_SECS)
            .await?;
        let parsed: Vec<KoiosAccountInfo> = parse_body("/account_info", &raw)?;
        Ok(parsed.into_iter().find(|a| a.stake_address == stake_address))
    }

    /// Pool registration data, including off-chain metadata when published.
    pub async fn pool_info(&self, pool_ids: &[String]) -> Result<Vec<KoiosPoolInfo>, FetchError> {
        if pool_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut ids = pool_ids.to_vec();
        ids.sort();
        ids.dedup();
        let body = serde_json::json!({ "_pool_bech32_ids": ids });
        let raw = self
            .request_json("/pool_info", Some(body), POOL_MAX_AGE_SECS)
            .await?;
        parse_body("/pool_info", &raw)
    }

    pub async fn tip(&self) -> Result<KoiosTip, FetchError> {
        let raw = self
            .request_json("/tip", None, TIP_MAX_AGE_SECS)
            .await?;
        let mut parsed: Vec<KoiosTip> = parse_body("/tip", &raw)?;
        parsed.pop().ok_or_else(|| FetchError::Parse {
            endpoint: "/tip".to_string(),
            message: "empty response".to_string(),
        })
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_validation() {
        assert!(FetchConfig::with_base_url("https://preprod.koios.rest/api/v1").is_ok());
        assert!(matches!(
            FetchConfig::with_base_url("not a url"),
            Err(FetchError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            FetchConfig::with_base_url("ftp://example.org"),
            Err(FetchError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn parses_account_rewards_rows() {
        let raw = r#"[{"stake_address":"stake1u9","rewards":[
            {"earned_epoch":210,"spendable_epoch":212,"amount":"1234","type":"member","pool_id":"pool1x"},
            {"earned_epoch":211,"spendable_epoch":213,"amount":"5","type":"reserves","pool_id":null}
        ]}]"#;
        let parsed: Vec<KoiosAccountRewards> = parse_body("/account_rewards", raw).unwrap();
        assert_eq!(parsed[0].rewards.len(), 2);
        assert_eq!(parsed[0].rewards[0].kind.as_deref(), Some("member"));
        assert_eq!(parsed[0].rewards[1].pool_id, None);
    }

    #[tokio::test]
    async fn offline_serves_cache_regardless_of_age() {
        let cache = Cache::in_memory().unwrap();
        let norm = serde_json::json!({ "endpoint": "/tip", "body": null });
        cache
            .set_at(
                &Cache::key_for(&norm.to_string()),
                "/tip",
                r#"[{"epoch_no":500,"abs_slot":130000000,"epoch_slot":10}]"#,
                0,
            )
            .unwrap();
        let config = FetchConfig {
            offline: true,
            ..FetchConfig::default()
        };
        let fetcher = Fetcher::new(config, Some(cache)).unwrap();
        let tip = fetcher.tip().await.unwrap();
        assert_eq!(tip.epoch_no, 500);
        assert!(matches!(
            fetcher.account_rewards("stake1u9").await,
            Err(FetchError::OfflineMiss)
        ));
        assert_eq!(fetcher.request_count(), 0);
    }

    fn cache_key(endpoint: &str, body: serde_json::Value) -> String {
        Cache::key_for(&serde_json::json!({ "endpoint": endpoint, "body": body }).to_string())
    }

    #[test]
    fn online_open_purges_expired_entries() {
        let cache = Cache::in_memory().unwrap();
        cache.set_at("old", "/tip", "[]", 0).unwrap();
        cache.set("fresh", "/tip", "[]").unwrap();
        let fetcher = Fetcher::new(FetchConfig::default(), Some(cache)).unwrap();
        let cache = fetcher.cache().unwrap();
        assert!(cache.get("old").unwrap().is_none());
        assert!(cache.get("fresh").unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidating_account_data_keeps_tip() {
        let cache = Cache::in_memory().unwrap();
        let body = serde_json::json!({ "_stake_addresses": ["stake1u9"] });
        cache
            .set(
                &cache_key("/account_info", body),
                "/account_info",
                r#"[{"stake_address":"stake1u9","status":"registered"}]"#,
            )
            .unwrap();
        cache
            .set(
                &cache_key("/tip", serde_json::Value::Null),
                "/tip",
                r#"[{"epoch_no":500,"abs_slot":130000000,"epoch_slot":10}]"#,
            )
            .unwrap();
        let config = FetchConfig {
            offline: true,
            ..FetchConfig::default()
        };
        let fetcher = Fetcher::new(config, Some(cache)).unwrap();
        assert!(fetcher.account_info("stake1u9").await.unwrap().is_some());

        assert_eq!(fetcher.invalidate_account_data().unwrap(), 1);
        assert!(matches!(
            fetcher.account_info("stake1u9").await,
            Err(FetchError::OfflineMiss)
        ));
        assert_eq!(fetcher.tip().await.unwrap().epoch_no, 500);
    }
}
