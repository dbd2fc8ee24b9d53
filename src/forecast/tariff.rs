//! Tariff providers. Grounded on `dynamictariff/{awattar,tibber,evcc,tariffzones}.py`:
//! a day-ahead hourly market, a bearer-authenticated subscription API, a
//! local HTTP pass-through, and a synthetic two-tier time-of-day fallback.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::cache::TtlCache;
use crate::domain::Resolution;
use crate::error::ControlError;
use crate::http_client::DEFAULT_MAX_DELAY;
use crate::ratelimit::RateLimitRegistry;

#[async_trait]
pub trait TariffProvider: Send + Sync {
    /// Currency/kWh per interval, index 0 = current interval, aligned and
    /// resolution-converted per C1.
    async fn get_prices(&self, now: DateTime<Utc>, hours: usize) -> Result<Vec<f64>, ControlError>;
}

/// Adds per-unit fees/markup, then VAT: `((raw*(1+markup)+fees)*(1+vat))`.
pub fn apply_markup_fees_vat(raw: f64, markup: f64, fees: f64, vat: f64) -> f64 {
    (raw * (1.0 + markup) + fees) * (1.0 + vat)
}

/// A country-variant day-ahead hourly market tariff (no auth; polled no
/// more than every 15 minutes).
pub struct HourlyMarketTariffProvider {
    client: Client,
    base_url: String,
    markup: f64,
    fees_per_kwh: f64,
    vat: f64,
    cache: TtlCache<Vec<(DateTime<Utc>, f64)>>,
    rate_limits: Arc<RateLimitRegistry>,
}

#[derive(Deserialize)]
struct MarketPoint {
    start: DateTime<Utc>,
    price_per_kwh: f64,
}

impl HourlyMarketTariffProvider {
    pub fn new(client: Client, base_url: String, markup: f64, fees_per_kwh: f64, vat: f64, rate_limits: Arc<RateLimitRegistry>) -> Self {
        Self {
            client,
            base_url,
            markup,
            fees_per_kwh,
            vat,
            cache: TtlCache::new(),
            rate_limits,
        }
    }

    async fn fetch_native(&self) -> Result<Vec<(DateTime<Utc>, f64)>, ControlError> {
        if self.rate_limits.is_rate_limited("hourly-market").await {
            return Err(ControlError::RateLimited {
                provider: "hourly-market".to_string(),
                retry_after: Duration::from_secs(60),
            });
        }
        let resp = self
            .client
            .get(&self.base_url)
            .send()
            .await
            .map_err(|source| ControlError::Network { provider: "hourly-market".to_string(), source })?;
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.rate_limits.set_rate_limit_from_response("hourly-market", resp.headers()).await;
            return Err(ControlError::RateLimited {
                provider: "hourly-market".to_string(),
                retry_after: Duration::from_secs(60),
            });
        }
        let points: Vec<MarketPoint> = resp
            .json()
            .await
            .map_err(|source| ControlError::Network { provider: "hourly-market".to_string(), source })?;
        Ok(points
            .into_iter()
            .map(|p| (p.start, apply_markup_fees_vat(p.price_per_kwh, self.markup, self.fees_per_kwh, self.vat)))
            .collect())
    }
}

#[async_trait]
impl TariffProvider for HourlyMarketTariffProvider {
    async fn get_prices(&self, now: DateTime<Utc>, hours: usize) -> Result<Vec<f64>, ControlError> {
        let cache = &self.cache;
        let native = cache
            .get_or_fetch("hourly-market", Duration::from_secs(900), DEFAULT_MAX_DELAY, || self.fetch_native())
            .await?;
        let aligned = super::align_prices(native.into_iter().map(|(_, p)| p).collect(), Resolution::Hourly, Resolution::Hourly, now);
        Ok(aligned.into_iter().take(hours).collect())
    }
}

/// A bearer-authenticated subscription tariff. Tomorrow's prices may be
/// absent until roughly 13:00 local; when a "current" field and a "today"
/// array entry exist for the same hour and disagree, "current" wins.
pub struct SubscriptionTariffProvider {
    client: Client,
    base_url: String,
    token: String,
    cache: TtlCache<SubscriptionPayload>,
}

#[derive(Deserialize, Clone)]
pub struct SubscriptionPayload {
    pub current_price_per_kwh: Option<f64>,
    pub today: Vec<f64>,
    pub tomorrow: Option<Vec<f64>>,
}

impl SubscriptionTariffProvider {
    pub fn new(client: Client, base_url: String, token: String) -> Self {
        Self { client, base_url, token, cache: TtlCache::new() }
    }

    async fn fetch_native(&self) -> Result<SubscriptionPayload, ControlError> {
        let resp = self
            .client
            .get(&self.base_url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| ControlError::Network { provider: "subscription".to_string(), source })?;
        resp.json()
            .await
            .map_err(|source| ControlError::Network { provider: "subscription".to_string(), source })
    }
}

#[async_trait]
impl TariffProvider for SubscriptionTariffProvider {
    async fn get_prices(&self, now: DateTime<Utc>, hours: usize) -> Result<Vec<f64>, ControlError> {
        let payload = self
            .cache
            .get_or_fetch("subscription", Duration::from_secs(600), DEFAULT_MAX_DELAY, || self.fetch_native())
            .await?;

        let mut hourly = payload.today.clone();
        if let Some(tomorrow) = &payload.tomorrow {
            hourly.extend_from_slice(tomorrow);
        }
        let current_hour = now.hour() as usize;
        if let Some(current) = payload.current_price_per_kwh {
            if current_hour < hourly.len() {
                hourly[current_hour] = current;
            }
        }
        let aligned = super::align_prices(hourly, Resolution::Hourly, Resolution::Hourly, now);
        Ok(aligned.into_iter().take(hours).collect())
    }
}

/// An external pricing service reachable on the local network, no auth.
/// May supply 15-minute native resolution.
pub struct LocalHttpTariffProvider {
    client: Client,
    base_url: String,
    native_resolution: Resolution,
    cache: TtlCache<Vec<f64>>,
}

impl LocalHttpTariffProvider {
    pub fn new(client: Client, base_url: String, native_resolution: Resolution) -> Self {
        Self { client, base_url, native_resolution, cache: TtlCache::new() }
    }

    async fn fetch_native(&self) -> Result<Vec<f64>, ControlError> {
        let resp = self
            .client
            .get(&self.base_url)
            .send()
            .await
            .map_err(|source| ControlError::Network { provider: "local-http-tariff".to_string(), source })?;
        resp.json()
            .await
            .map_err(|source| ControlError::Network { provider: "local-http-tariff".to_string(), source })
    }
}

#[async_trait]
impl TariffProvider for LocalHttpTariffProvider {
    async fn get_prices(&self, now: DateTime<Utc>, hours: usize) -> Result<Vec<f64>, ControlError> {
        let native = self
            .cache
            .get_or_fetch("local-http-tariff", Duration::from_secs(300), DEFAULT_MAX_DELAY, || self.fetch_native())
            .await?;
        let aligned = super::align_prices(native, self.native_resolution, Resolution::Hourly, now);
        Ok(aligned.into_iter().take(hours).collect())
    }
}

/// Two-tier time-of-day fallback: synthesizes 48 h from two flat prices and
/// a zone-1 start/end hour, with wrap-around zone handling. Used when no
/// real tariff API is configured.
pub struct TimeOfDayFallbackProvider {
    pub zone1_price: f64,
    pub zone2_price: f64,
    pub zone1_start_hour: u32,
    pub zone1_end_hour: u32,
}

impl TimeOfDayFallbackProvider {
    fn price_for_hour(&self, hour_of_day: u32) -> f64 {
        let in_zone1 = if self.zone1_start_hour <= self.zone1_end_hour {
            hour_of_day >= self.zone1_start_hour && hour_of_day < self.zone1_end_hour
        } else {
            // wrap-around zone, e.g. 22:00-06:00
            hour_of_day >= self.zone1_start_hour || hour_of_day < self.zone1_end_hour
        };
        if in_zone1 {
            self.zone1_price
        } else {
            self.zone2_price
        }
    }
}

#[async_trait]
impl TariffProvider for TimeOfDayFallbackProvider {
    async fn get_prices(&self, now: DateTime<Utc>, hours: usize) -> Result<Vec<f64>, ControlError> {
        let start_hour = now.hour();
        Ok((0..hours.min(48))
            .map(|offset| self.price_for_hour((start_hour + offset as u32) % 24))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn markup_fees_vat_compose_in_order() {
        let price = apply_markup_fees_vat(0.10, 0.05, 0.02, 0.25);
        // ((0.10*1.05 + 0.02) * 1.25)
        assert!((price - 0.1525).abs() < 1e-6);
    }

    #[tokio::test]
    async fn time_of_day_fallback_wraps_around_midnight() {
        let provider = TimeOfDayFallbackProvider {
            zone1_price: 0.10,
            zone2_price: 0.30,
            zone1_start_hour: 22,
            zone1_end_hour: 6,
        };
        let now = Utc.with_ymd_and_hms(2026, 7, 26, 23, 0, 0).unwrap();
        let prices = provider.get_prices(now, 4).await.unwrap();
        assert_eq!(prices[0], 0.10); // 23:00 is inside the wrap-around zone
        let now_day = Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap();
        let prices_day = provider.get_prices(now_day, 1).await.unwrap();
        assert_eq!(prices_day[0], 0.30);
    }
}
