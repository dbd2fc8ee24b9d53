pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod domain;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod grid;
pub mod http_client;
pub mod inverter;
pub mod ratelimit;
pub mod scheduler;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use config::{Config, HardwareMode, SolarProviderConfig, TariffProviderConfig};
use context::CoreContext;
use domain::{Parameters, Resolution};
use inverter::{InverterDriver, MockInverter, ResilientInverter, SimulatedInverter, SnapshotStore};
use scheduler::{EXTERNAL_PROVIDER_REFRESH_INTERVAL, LOCAL_PROVIDER_REFRESH_INTERVAL};

/// Builds the fully wired `CoreContext` for a loaded configuration: picks
/// the inverter driver for `hardware.mode`, the tariff/solar providers for
/// their tagged config variants, and the historical consumption provider.
pub async fn build_context(cfg: &Config) -> Result<Arc<CoreContext>> {
    let resolution = match cfg.controller.resolution_minutes {
        15 => Resolution::Quarter,
        _ => Resolution::Hourly,
    };

    let snapshot_path = inverter::snapshot::default_snapshot_path(&cfg.controller.state_dir);
    let snapshot_store = Arc::new(SnapshotStore::new(snapshot_path));

    let mut snapshot_capable: Option<Arc<dyn inverter::SnapshotCapable>> = None;
    let inverter: Box<dyn InverterDriver> = match cfg.hardware.mode {
        HardwareMode::Simulated => {
            Box::new(SimulatedInverter::new(cfg.battery.initial_soc_percent, cfg.battery.capacity_wh))
        }
        HardwareMode::Mock => Box::new(MockInverter::default()),
        HardwareMode::Modbus => {
            #[cfg(feature = "modbus")]
            {
                let modbus_cfg = cfg
                    .hardware
                    .modbus
                    .as_ref()
                    .context("hardware.mode = modbus requires hardware.modbus configuration")?;
                let driver = inverter::ModbusInverter::connect(&modbus_cfg.address, modbus_cfg.port, modbus_cfg.unit_id)
                    .await
                    .context("failed to connect to modbus inverter")?;
                let driver: Arc<inverter::ModbusInverter> = Arc::new(driver);
                if let Err(e) = snapshot_store.capture_if_absent(driver.as_ref() as &dyn inverter::SnapshotCapable).await {
                    warn!(error = %e, "failed to capture pre-control snapshot, continuing without rollback");
                }
                snapshot_capable = Some(driver.clone() as Arc<dyn inverter::SnapshotCapable>);
                let driver: Arc<dyn InverterDriver> = driver;
                Box::new(driver)
            }
            #[cfg(not(feature = "modbus"))]
            {
                anyhow::bail!("hardware.mode = modbus requires the `modbus` feature to be enabled at build time");
            }
        }
    };
    let resilient = Arc::new(ResilientInverter::new(inverter));

    let http_client = http_client::build_client("battery-optimization-controller/0.1", Duration::from_secs(10))?;
    let rate_limits = Arc::new(ratelimit::RateLimitRegistry::new());

    let tariff: Arc<dyn forecast::TariffProvider> = match &cfg.providers.tariff {
        TariffProviderConfig::HourlyMarket { base_url, markup, fees_per_kwh, vat } => Arc::new(
            forecast::HourlyMarketTariffProvider::new(http_client.clone(), base_url.clone(), *markup, *fees_per_kwh, *vat, rate_limits.clone()),
        ),
        TariffProviderConfig::Subscription { base_url, token } => {
            Arc::new(forecast::SubscriptionTariffProvider::new(http_client.clone(), base_url.clone(), token.clone()))
        }
        TariffProviderConfig::LocalHttp { base_url, native_resolution_minutes } => {
            let native_res = if *native_resolution_minutes == 15 { Resolution::Quarter } else { Resolution::Hourly };
            Arc::new(forecast::LocalHttpTariffProvider::new(http_client.clone(), base_url.clone(), native_res))
        }
        TariffProviderConfig::TimeOfDayFallback { zone1_price, zone2_price, zone1_start_hour, zone1_end_hour } => {
            Arc::new(forecast::TimeOfDayFallbackProvider {
                zone1_price: *zone1_price,
                zone2_price: *zone2_price,
                zone1_start_hour: *zone1_start_hour,
                zone1_end_hour: *zone1_end_hour,
            })
        }
    };

    let solar: Arc<dyn forecast::SolarProvider> = match &cfg.providers.solar {
        SolarProviderConfig::Cloud { base_url, api_key, installations } => {
            let installations = installations
                .iter()
                .map(|i| forecast::solar::Installation {
                    latitude: i.latitude,
                    longitude: i.longitude,
                    declination_deg: i.declination_deg,
                    azimuth_deg: i.azimuth_deg,
                    kwp: i.kwp,
                })
                .collect();
            Arc::new(forecast::CloudSolarProvider::new(http_client.clone(), base_url.clone(), api_key.clone(), installations))
        }
        SolarProviderConfig::LocalMl { base_url, token } => {
            Arc::new(forecast::LocalMlSolarProvider::new(http_client.clone(), base_url.clone(), token.clone()))
        }
    };

    let history = match &cfg.providers.consumption.history_csv_path {
        Some(path) => forecast::consumption::load_history_csv(path).unwrap_or_else(|e| {
            warn!(error = %e, path = %path.display(), "failed to load consumption history, starting with none");
            Vec::new()
        }),
        None => Vec::new(),
    };
    let consumption: Arc<dyn forecast::ConsumptionProvider> =
        Arc::new(forecast::HistoricalConsumptionProvider::new(history, cfg.providers.consumption.default_estimate_wh));

    let parameters: Parameters = cfg.battery.parameters.clone().into();

    let tariff_refresh_interval = match &cfg.providers.tariff {
        TariffProviderConfig::LocalHttp { .. } => LOCAL_PROVIDER_REFRESH_INTERVAL,
        _ => EXTERNAL_PROVIDER_REFRESH_INTERVAL,
    };
    let solar_refresh_interval = match &cfg.providers.solar {
        SolarProviderConfig::LocalMl { .. } => LOCAL_PROVIDER_REFRESH_INTERVAL,
        SolarProviderConfig::Cloud { .. } => EXTERNAL_PROVIDER_REFRESH_INTERVAL,
    };

    Ok(CoreContext::new(
        parameters,
        resilient,
        tariff,
        solar,
        consumption,
        rate_limits,
        snapshot_store,
        snapshot_capable,
        resolution,
        cfg.controller.horizon_hours as usize,
        cfg.battery.max_grid_charge_rate_w,
        cfg.battery.max_pv_charge_rate_w,
        tariff_refresh_interval,
        solar_refresh_interval,
    ))
}
