//! `CoreContext`: the explicit, `Arc`-shared dependency bundle every
//! component is handed. Replaces the source's `CommonLogic.get_instance()`
//! / module-level `ProviderManager` singletons with ordinary constructor
//! injection, matching the teacher's `AppState` pattern.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::domain::{Parameters, Resolution, TickStatus};
use crate::forecast::{ConsumptionProvider, SolarProvider, TariffProvider};
use crate::inverter::{InverterDriver, ResilientInverter, SnapshotCapable, SnapshotStore};
use crate::ratelimit::RateLimitRegistry;

pub struct CoreContext {
    pub parameters: RwLock<Parameters>,
    pub inverter: Arc<ResilientInverter<Box<dyn InverterDriver>>>,
    pub tariff: Arc<dyn TariffProvider>,
    pub solar: Arc<dyn SolarProvider>,
    pub consumption: Arc<dyn ConsumptionProvider>,
    pub rate_limits: Arc<RateLimitRegistry>,
    pub snapshot_store: Arc<SnapshotStore>,
    /// Set only when the selected driver opts into C11 (currently
    /// `ModbusInverter`); `None` for drivers with nothing to snapshot.
    pub snapshot_capable: Option<Arc<dyn SnapshotCapable>>,
    pub last_status: RwLock<Option<TickStatus>>,
    pub resolution: Resolution,
    pub horizon_hours: usize,
    pub max_grid_charge_rate_w: f64,
    pub max_pv_charge_rate_w: f64,
    /// How often the scheduler's background refreshers poll the tariff /
    /// solar providers to keep their TTL caches warm (C2/C6). 30 min for
    /// external APIs, 15 min for local ones, per provider kind.
    pub tariff_refresh_interval: Duration,
    pub solar_refresh_interval: Duration,
}

impl CoreContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parameters: Parameters,
        inverter: Arc<ResilientInverter<Box<dyn InverterDriver>>>,
        tariff: Arc<dyn TariffProvider>,
        solar: Arc<dyn SolarProvider>,
        consumption: Arc<dyn ConsumptionProvider>,
        rate_limits: Arc<RateLimitRegistry>,
        snapshot_store: Arc<SnapshotStore>,
        snapshot_capable: Option<Arc<dyn SnapshotCapable>>,
        resolution: Resolution,
        horizon_hours: usize,
        max_grid_charge_rate_w: f64,
        max_pv_charge_rate_w: f64,
        tariff_refresh_interval: Duration,
        solar_refresh_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            parameters: RwLock::new(parameters),
            inverter,
            tariff,
            solar,
            consumption,
            rate_limits,
            snapshot_store,
            snapshot_capable,
            last_status: RwLock::new(None),
            resolution,
            horizon_hours,
            max_grid_charge_rate_w,
            max_pv_charge_rate_w,
            tariff_refresh_interval,
            solar_refresh_interval,
        })
    }

    /// Restores the pre-control snapshot if the driver opted into C11.
    /// Logs and returns without failing if nothing is capable or nothing
    /// was ever captured, so this is always safe to call on shutdown.
    pub async fn restore_pre_control_snapshot(&self) {
        if let Some(driver) = &self.snapshot_capable {
            self.snapshot_store.restore_on_shutdown(driver.as_ref()).await;
        }
    }

    pub async fn parameters_snapshot(&self) -> Parameters {
        self.parameters.read().await.clone()
    }
}
