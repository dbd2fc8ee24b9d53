//! Resilient Inverter Facade (C4): wraps any `InverterDriver` with an
//! outage/backoff state machine so a flaky vendor connection degrades to
//! cached reads instead of crashing the scheduler loop. Grounded
//! one-for-one on `inverter/resilient_wrapper.py`'s `ResilientInverterWrapper`.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::ControlError;
use crate::inverter::driver::InverterDriver;

pub const DEFAULT_OUTAGE_TOLERANCE_SECONDS: u64 = 1_440;
pub const DEFAULT_RETRY_BACKOFF_SECONDS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FacadeState {
    Uninitialized,
    Healthy,
    Degraded,
    Backoff,
    Terminal,
}

#[derive(Debug, Default, Clone, Copy)]
struct CachedValues {
    soc_percent: Option<f64>,
    stored_energy_wh: Option<f64>,
    stored_usable_energy_wh: Option<f64>,
    capacity_wh: Option<f64>,
    free_capacity_wh: Option<f64>,
    max_capacity_wh: Option<f64>,
    updated_at: Option<DateTime<Utc>>,
}

struct Inner {
    facade_state: FacadeState,
    cache: CachedValues,
    initialization_complete: bool,
    consecutive_failures: u32,
    first_failure_time: Option<DateTime<Utc>>,
    last_failure_time: Option<DateTime<Utc>>,
}

/// Wraps a driver with outage tolerance (how long repeated failures are
/// tolerated before escalating to a fatal `Outage` error) and a retry
/// backoff (how long to avoid hammering a driver that just failed).
pub struct ResilientInverter<D: InverterDriver> {
    driver: D,
    outage_tolerance: Duration,
    retry_backoff: Duration,
    inner: RwLock<Inner>,
    attempt_counter: AtomicU32,
}

impl<D: InverterDriver> ResilientInverter<D> {
    pub fn new(driver: D) -> Self {
        Self::with_tolerances(
            driver,
            Duration::from_secs(DEFAULT_OUTAGE_TOLERANCE_SECONDS),
            Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECONDS),
        )
    }

    pub fn with_tolerances(driver: D, outage_tolerance: Duration, retry_backoff: Duration) -> Self {
        Self {
            driver,
            outage_tolerance,
            retry_backoff,
            inner: RwLock::new(Inner {
                facade_state: FacadeState::Uninitialized,
                cache: CachedValues::default(),
                initialization_complete: false,
                consecutive_failures: 0,
                first_failure_time: None,
                last_failure_time: None,
            }),
            attempt_counter: AtomicU32::new(0),
        }
    }

    async fn is_in_backoff_period(&self) -> bool {
        let inner = self.inner.read().await;
        match inner.last_failure_time {
            Some(t) => Utc::now().signed_duration_since(t) < chrono_duration(self.retry_backoff),
            None => false,
        }
    }

    /// Records a failure. Returns `Ok(())` if the caller should fall back to
    /// a cached/default value, `Err` if the caller must propagate a fatal
    /// error (either no value has ever been produced, or the outage
    /// tolerance window has elapsed).
    async fn handle_failure(&self, operation: &str) -> Result<(), ControlError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        inner.consecutive_failures += 1;
        inner.last_failure_time = Some(now);

        if !inner.initialization_complete {
            // Never seen a good value yet: nothing to fall back to, so
            // re-raise immediately rather than serve a cache or default.
            inner.facade_state = FacadeState::Backoff;
            return Err(ControlError::InverterComm {
                operation: operation.to_string(),
                source: anyhow::anyhow!("inverter never initialized successfully"),
            });
        }

        let first_failure = *inner.first_failure_time.get_or_insert(now);
        let outage_duration = now.signed_duration_since(first_failure);
        if outage_duration >= chrono_duration(self.outage_tolerance) {
            inner.facade_state = FacadeState::Terminal;
            return Err(ControlError::Outage {
                operation: operation.to_string(),
                elapsed: outage_duration.to_std().unwrap_or(self.outage_tolerance),
            });
        }
        inner.facade_state = FacadeState::Degraded;
        warn!(operation, consecutive_failures = inner.consecutive_failures, "inverter call failed, serving cache");
        Ok(())
    }

    async fn handle_success(&self, mark_initialized: bool) {
        let mut inner = self.inner.write().await;
        if inner.consecutive_failures > 0 {
            info!(after_failures = inner.consecutive_failures, "inverter communication restored");
        }
        inner.consecutive_failures = 0;
        inner.first_failure_time = None;
        inner.last_failure_time = None;
        if mark_initialized {
            inner.initialization_complete = true;
        }
        inner.facade_state = if inner.initialization_complete {
            FacadeState::Healthy
        } else {
            FacadeState::Uninitialized
        };
    }

    async fn call_read<F, Fut>(
        &self,
        operation: &str,
        default_value: Option<f64>,
        cached: impl Fn(&CachedValues) -> Option<f64>,
        store: impl Fn(&mut CachedValues, f64),
        call: F,
    ) -> Result<f64, ControlError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<f64>>,
    {
        if self.is_in_backoff_period().await {
            return self.get_cached_or_default(operation, default_value, cached).await;
        }
        match call().await {
            Ok(value) => {
                self.handle_success(false).await;
                let mut inner = self.inner.write().await;
                store(&mut inner.cache, value);
                inner.cache.updated_at = Some(Utc::now());
                Ok(value)
            }
            Err(source) => {
                let _ = source;
                self.handle_failure(operation).await?;
                self.get_cached_or_default(operation, default_value, cached).await
            }
        }
    }

    async fn get_cached_or_default(
        &self,
        operation: &str,
        default_value: Option<f64>,
        cached: impl Fn(&CachedValues) -> Option<f64>,
    ) -> Result<f64, ControlError> {
        let inner = self.inner.read().await;
        if let Some(v) = cached(&inner.cache) {
            return Ok(v);
        }
        drop(inner);
        default_value.ok_or_else(|| ControlError::InverterComm {
            operation: operation.to_string(),
            source: anyhow::anyhow!("no cached value and no default available"),
        })
    }

    pub async fn get_soc(&self) -> Result<f64, ControlError> {
        self.call_read(
            "get_soc",
            Some(50.0),
            |c| c.soc_percent,
            |c, v| c.soc_percent = Some(v),
            || self.driver.get_soc(),
        )
        .await
    }

    pub async fn get_stored_energy_wh(&self) -> Result<f64, ControlError> {
        self.call_read(
            "get_stored_energy_wh",
            None,
            |c| c.stored_energy_wh,
            |c, v| c.stored_energy_wh = Some(v),
            || self.driver.get_stored_energy_wh(),
        )
        .await
    }

    pub async fn get_stored_usable_energy_wh(&self) -> Result<f64, ControlError> {
        self.call_read(
            "get_stored_usable_energy_wh",
            None,
            |c| c.stored_usable_energy_wh,
            |c, v| c.stored_usable_energy_wh = Some(v),
            || self.driver.get_stored_usable_energy_wh(),
        )
        .await
    }

    pub async fn get_capacity_wh(&self) -> Result<f64, ControlError> {
        self.call_read(
            "get_capacity_wh",
            None,
            |c| c.capacity_wh,
            |c, v| c.capacity_wh = Some(v),
            || self.driver.get_capacity_wh(),
        )
        .await
    }

    pub async fn get_free_capacity_wh(&self) -> Result<f64, ControlError> {
        self.call_read(
            "get_free_capacity_wh",
            None,
            |c| c.free_capacity_wh,
            |c, v| c.free_capacity_wh = Some(v),
            || self.driver.get_free_capacity_wh(),
        )
        .await
    }

    pub async fn get_max_capacity_wh(&self) -> Result<f64, ControlError> {
        self.call_read(
            "get_max_capacity_wh",
            None,
            |c| c.max_capacity_wh,
            |c, v| c.max_capacity_wh = Some(v),
            || self.driver.get_max_capacity_wh(),
        )
        .await
    }

    async fn call_write<F, Fut>(&self, operation: &str, call: F) -> Result<(), ControlError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<()>>,
    {
        if self.is_in_backoff_period().await {
            return Err(ControlError::InverterComm {
                operation: operation.to_string(),
                source: anyhow::anyhow!("inverter in backoff period, write dropped"),
            });
        }
        match call().await {
            Ok(()) => {
                self.handle_success(true).await;
                Ok(())
            }
            Err(source) => {
                self.handle_failure(operation).await?;
                Err(ControlError::InverterComm { operation: operation.to_string(), source })
            }
        }
    }

    pub async fn set_mode_force_charge(&self, charge_rate_w: f64) -> Result<(), ControlError> {
        self.call_write("set_mode_force_charge", || self.driver.set_mode_force_charge(charge_rate_w)).await
    }

    pub async fn set_mode_avoid_discharge(&self) -> Result<(), ControlError> {
        self.call_write("set_mode_avoid_discharge", || self.driver.set_mode_avoid_discharge()).await
    }

    pub async fn set_mode_allow_discharge(&self) -> Result<(), ControlError> {
        self.call_write("set_mode_allow_discharge", || self.driver.set_mode_allow_discharge()).await
    }

    pub async fn set_mode_limit_battery_charge(&self, limit_rate_w: f64) -> Result<(), ControlError> {
        self.call_write("set_mode_limit_battery_charge", || self.driver.set_mode_limit_battery_charge(limit_rate_w)).await
    }

    pub async fn get_outage_status(&self) -> OutageStatus {
        let inner = self.inner.read().await;
        let now = Utc::now();
        let outage_duration = inner
            .first_failure_time
            .map(|t| now.signed_duration_since(t).num_seconds().max(0) as u64);
        let cache_age_seconds = inner
            .cache
            .updated_at
            .map(|t| now.signed_duration_since(t).num_seconds().max(0) as u64);
        let in_backoff = inner
            .last_failure_time
            .map(|t| now.signed_duration_since(t) < chrono_duration(self.retry_backoff))
            .unwrap_or(false);
        let time_until_retry_seconds = inner.last_failure_time.map(|t| {
            let elapsed = now.signed_duration_since(t);
            (chrono_duration(self.retry_backoff) - elapsed).num_seconds().max(0) as u64
        });

        OutageStatus {
            facade_state: inner.facade_state,
            is_connected: !matches!(inner.facade_state, FacadeState::Degraded | FacadeState::Terminal),
            initialization_complete: inner.initialization_complete,
            outage_duration_seconds: outage_duration,
            outage_tolerance_seconds: self.outage_tolerance.as_secs(),
            consecutive_failures: inner.consecutive_failures,
            cache_valid: inner.cache.updated_at.is_some(),
            cache_age_seconds,
            in_backoff_period: in_backoff,
            retry_backoff_seconds: self.retry_backoff.as_secs(),
            time_until_retry_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutageStatus {
    pub facade_state: FacadeState,
    pub is_connected: bool,
    pub initialization_complete: bool,
    pub outage_duration_seconds: Option<u64>,
    pub outage_tolerance_seconds: u64,
    pub consecutive_failures: u32,
    pub cache_valid: bool,
    pub cache_age_seconds: Option<u64>,
    pub in_backoff_period: bool,
    pub retry_backoff_seconds: u64,
    pub time_until_retry_seconds: Option<u64>,
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

pub type SharedResilientInverter<D> = Arc<ResilientInverter<D>>;
