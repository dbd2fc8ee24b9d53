//! Provider Rate-Limit Registry (C2): tracks, per named provider, whether
//! a recent response indicated a lockout and when it is safe to retry.
//! Grounded on `fetching/rate_limit_manager.py`'s header precedence:
//! `X-Ratelimit-Retry-At` (absolute timestamp) first, then `Retry-After`
//! (seconds or HTTP-date), then a generic fallback header list.
#![allow(dead_code)]

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use tokio::sync::RwLock;

const GENERIC_RATE_LIMIT_HEADERS: &[&str] = &["x-ratelimit-reset", "ratelimit-reset", "x-rate-limit-reset"];

#[derive(Debug, Clone)]
struct RateLimitInfo {
    retry_after: DateTime<Utc>,
    reset_time: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct RateLimitRegistry {
    limits: RwLock<HashMap<String, RateLimitInfo>>,
}

impl RateLimitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `provider` is currently inside a lockout window. Self-expiring:
    /// an entry whose `retry_after` has passed is treated as not rate limited.
    pub async fn is_rate_limited(&self, provider: &str) -> bool {
        let limits = self.limits.read().await;
        match limits.get(provider) {
            Some(info) => info.retry_after > Utc::now(),
            None => false,
        }
    }

    pub async fn get_retry_after(&self, provider: &str) -> Option<DateTime<Utc>> {
        self.limits.read().await.get(provider).map(|i| i.retry_after)
    }

    pub async fn set_rate_limit_manual(&self, provider: &str, retry_after: DateTime<Utc>) {
        self.limits.write().await.insert(
            provider.to_string(),
            RateLimitInfo {
                retry_after,
                reset_time: None,
                created_at: Utc::now(),
            },
        );
    }

    /// Parses a rate-limit signal out of response headers, in precedence
    /// order: `X-Ratelimit-Retry-At` (ISO-8601), `Retry-After` (delta-seconds
    /// or HTTP-date), then the first matching generic header (unix timestamp
    /// or ISO-8601). Returns `false` if none of the headers were present.
    pub async fn set_rate_limit_from_response(&self, provider: &str, headers: &HeaderMap) -> bool {
        if let Some(v) = headers.get("x-ratelimit-retry-at").and_then(|v| v.to_str().ok()) {
            if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
                self.set_rate_limit_manual(provider, dt.with_timezone(&Utc)).await;
                return true;
            }
        }

        if let Some(v) = headers.get(reqwest::header::RETRY_AFTER).and_then(|v| v.to_str().ok()) {
            if let Ok(seconds) = v.trim().parse::<i64>() {
                self.set_rate_limit_manual(provider, Utc::now() + chrono::Duration::seconds(seconds)).await;
                return true;
            }
            if let Ok(dt) = DateTime::parse_from_rfc2822(v) {
                self.set_rate_limit_manual(provider, dt.with_timezone(&Utc)).await;
                return true;
            }
        }

        for name in GENERIC_RATE_LIMIT_HEADERS {
            if let Some(v) = headers.get(*name).and_then(|v| v.to_str().ok()) {
                if let Ok(epoch) = v.trim().parse::<i64>() {
                    if let Some(dt) = DateTime::from_timestamp(epoch, 0) {
                        self.set_rate_limit_manual(provider, dt).await;
                        return true;
                    }
                }
                if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
                    self.set_rate_limit_manual(provider, dt.with_timezone(&Utc)).await;
                    return true;
                }
            }
        }
        false
    }

    pub async fn clear_rate_limit(&self, provider: &str) {
        self.limits.write().await.remove(provider);
    }

    pub async fn clear_all(&self) {
        self.limits.write().await.clear();
    }

    pub async fn get_all(&self) -> HashMap<String, DateTime<Utc>> {
        self.limits
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.retry_after))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, RETRY_AFTER};

    #[tokio::test]
    async fn manual_limit_reports_limited_until_expiry() {
        let reg = RateLimitRegistry::new();
        reg.set_rate_limit_manual("tibber", Utc::now() + chrono::Duration::seconds(60)).await;
        assert!(reg.is_rate_limited("tibber").await);
    }

    #[tokio::test]
    async fn past_retry_after_is_not_limited() {
        let reg = RateLimitRegistry::new();
        reg.set_rate_limit_manual("tibber", Utc::now() - chrono::Duration::seconds(1)).await;
        assert!(!reg.is_rate_limited("tibber").await);
    }

    #[tokio::test]
    async fn retry_after_seconds_header_sets_limit() {
        let reg = RateLimitRegistry::new();
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert!(reg.set_rate_limit_from_response("p", &headers).await);
        assert!(reg.is_rate_limited("p").await);
    }

    #[tokio::test]
    async fn no_recognized_header_returns_false() {
        let reg = RateLimitRegistry::new();
        let headers = HeaderMap::new();
        assert!(!reg.set_rate_limit_from_response("p", &headers).await);
    }
}
