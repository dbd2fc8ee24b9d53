//! Shared fixtures for the integration tests: a fully wired `CoreContext`
//! backed by in-memory test doubles, no network and no real inverter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use battery_optimization_controller::config::{
    AppConfig, AuthConfig, BatteryConfig, ControllerConfig, HardwareConfig, HardwareMode,
    ParametersConfig, ProvidersConfig, ServerConfig, TariffProviderConfig, SolarProviderConfig,
    ConsumptionProviderConfig, TelemetryConfig,
};
use battery_optimization_controller::context::CoreContext;
use battery_optimization_controller::domain::{Parameters, Resolution};
use battery_optimization_controller::error::ControlError;
use battery_optimization_controller::forecast::{ConsumptionProvider, SolarProvider, TariffProvider};
use battery_optimization_controller::inverter::{MockInverter, ResilientInverter, SnapshotStore};
use battery_optimization_controller::ratelimit::RateLimitRegistry;

/// A flat, constant forecast across the whole horizon — enough to drive
/// the scheduler and control surface without hitting the network.
pub struct FlatTariff(pub f64);

#[async_trait]
impl TariffProvider for FlatTariff {
    async fn get_prices(&self, _now: DateTime<Utc>, hours: usize) -> Result<Vec<f64>, ControlError> {
        Ok(vec![self.0; hours])
    }
}

pub struct FlatSolar(pub f64);

#[async_trait]
impl SolarProvider for FlatSolar {
    async fn get_forecast(
        &self,
        _now: DateTime<Utc>,
        hours: usize,
        _params: &Parameters,
    ) -> Result<Vec<f64>, ControlError> {
        Ok(vec![self.0; hours])
    }
}

pub struct FlatConsumption(pub f64);

#[async_trait]
impl ConsumptionProvider for FlatConsumption {
    async fn get_forecast(&self, _now: DateTime<Utc>, hours: usize) -> Result<Vec<f64>, ControlError> {
        Ok(vec![self.0; hours])
    }
}

pub const TEST_TOKEN: &str = "integration-test-token-0123456789ab";

pub fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout_secs: 30,
            enable_cors: false,
        },
        auth: AuthConfig { token: TEST_TOKEN.to_string() },
        controller: ControllerConfig {
            tick_seconds: 60,
            resolution_minutes: 60,
            horizon_hours: 6,
            state_dir: std::env::temp_dir().join("boc-test-state"),
        },
        battery: BatteryConfig {
            capacity_wh: 10_000.0,
            initial_soc_percent: 50.0,
            max_grid_charge_rate_w: 5000.0,
            max_pv_charge_rate_w: 5000.0,
            parameters: ParametersConfig::default(),
        },
        hardware: HardwareConfig { mode: HardwareMode::Mock, modbus: None },
        providers: ProvidersConfig {
            tariff: TariffProviderConfig::TimeOfDayFallback {
                zone1_price: 0.10,
                zone2_price: 0.30,
                zone1_start_hour: 22,
                zone1_end_hour: 6,
            },
            solar: SolarProviderConfig::LocalMl { base_url: "http://localhost".to_string(), token: "t".to_string() },
            consumption: ConsumptionProviderConfig { default_estimate_wh: 500.0, history_csv_path: None },
        },
        telemetry: TelemetryConfig {
            log_level: "error".to_string(),
            log_json: false,
            #[cfg(feature = "metrics")]
            enable_metrics: false,
            #[cfg(feature = "metrics")]
            metrics_port: 9090,
        },
    }
}

/// Builds a `CoreContext` wired entirely with in-memory doubles: a
/// `MockInverter`, flat forecast providers, and a throwaway snapshot path.
pub fn test_context() -> Arc<CoreContext> {
    let driver: Box<dyn battery_optimization_controller::inverter::InverterDriver> = Box::new(MockInverter::default());
    let inverter = Arc::new(ResilientInverter::new(driver));
    let snapshot_store = Arc::new(SnapshotStore::new(std::env::temp_dir().join("boc-test-state/snapshot.json")));

    CoreContext::new(
        Parameters::default(),
        inverter,
        Arc::new(FlatTariff(0.20)),
        Arc::new(FlatSolar(1000.0)),
        Arc::new(FlatConsumption(500.0)),
        Arc::new(RateLimitRegistry::new()),
        snapshot_store,
        None,
        Resolution::Hourly,
        6,
        5000.0,
        5000.0,
        Duration::from_secs(1800),
        Duration::from_secs(1800),
    )
}
