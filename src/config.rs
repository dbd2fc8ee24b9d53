#![allow(dead_code)]
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::Parameters;

/// Top-level application configuration, loaded once at startup and
/// carried read-only after that (runtime-tunable fields live in
/// `Parameters`, guarded behind `CoreContext`, not here).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,

    #[validate(nested)]
    pub auth: AuthConfig,

    #[validate(nested)]
    pub controller: ControllerConfig,

    #[validate(nested)]
    pub battery: BatteryConfig,

    #[validate(nested)]
    pub hardware: HardwareConfig,

    #[validate(nested)]
    pub providers: ProvidersConfig,

    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub enable_cors: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("failed to parse socket address")
    }
}

/// Control-surface authentication (C7): a single shared bearer token.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AuthConfig {
    #[validate(length(min = 32))]
    pub token: String,
}

/// Evaluation loop cadence (C6).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ControllerConfig {
    #[validate(range(min = 1, max = 3600))]
    pub tick_seconds: u64,

    /// 15 (quarter-hourly) or 60 (hourly).
    #[validate(range(min = 15, max = 60))]
    pub resolution_minutes: i64,

    #[validate(range(min = 1, max = 168))]
    pub horizon_hours: u32,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

/// Battery hardware limits and the initial tunable `Parameters` values.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_battery_config"))]
pub struct BatteryConfig {
    #[validate(range(min = 100.0, max = 1_000_000.0))]
    pub capacity_wh: f64,

    #[validate(range(min = 0.0, max = 100.0))]
    pub initial_soc_percent: f64,

    #[validate(range(min = 100.0, max = 50_000.0))]
    pub max_grid_charge_rate_w: f64,

    #[validate(range(min = 100.0, max = 50_000.0))]
    pub max_pv_charge_rate_w: f64,

    #[serde(default)]
    #[validate(nested)]
    pub parameters: ParametersConfig,
}

fn validate_battery_config(config: &BatteryConfig) -> Result<(), validator::ValidationError> {
    if config.parameters.max_charging_from_grid_limit >= config.parameters.always_allow_discharge_limit {
        return Err(validator::ValidationError::new(
            "max_charging_from_grid_limit must be less than always_allow_discharge_limit",
        ));
    }
    Ok(())
}

/// The on-disk shape of `Parameters`, merged onto `Parameters::default()`.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ParametersConfig {
    #[serde(default = "default_always_allow_discharge_limit")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub always_allow_discharge_limit: f64,

    #[serde(default = "default_max_charging_from_grid_limit")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_charging_from_grid_limit: f64,

    #[serde(default = "default_min_price_difference")]
    pub min_price_difference: f64,

    #[serde(default = "default_min_price_difference_rel")]
    pub min_price_difference_rel: f64,

    #[serde(default = "default_charge_rate_multiplier")]
    pub charge_rate_multiplier: f64,

    #[serde(default = "default_production_offset_percent")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub production_offset_percent: f64,

    #[serde(default)]
    pub soften_price_difference_on_charging: bool,

    #[serde(default = "default_soften_factor")]
    pub soften_factor: f64,

    #[serde(default = "default_round_price_digits")]
    pub round_price_digits: i32,

    #[serde(default = "default_min_charge_energy_wh")]
    pub min_charge_energy_wh: f64,
}

impl Default for ParametersConfig {
    fn default() -> Self {
        Self {
            always_allow_discharge_limit: default_always_allow_discharge_limit(),
            max_charging_from_grid_limit: default_max_charging_from_grid_limit(),
            min_price_difference: default_min_price_difference(),
            min_price_difference_rel: default_min_price_difference_rel(),
            charge_rate_multiplier: default_charge_rate_multiplier(),
            production_offset_percent: default_production_offset_percent(),
            soften_price_difference_on_charging: false,
            soften_factor: default_soften_factor(),
            round_price_digits: default_round_price_digits(),
            min_charge_energy_wh: default_min_charge_energy_wh(),
        }
    }
}

impl From<ParametersConfig> for Parameters {
    fn from(c: ParametersConfig) -> Self {
        Parameters {
            always_allow_discharge_limit: c.always_allow_discharge_limit,
            max_charging_from_grid_limit: c.max_charging_from_grid_limit,
            min_price_difference: c.min_price_difference,
            min_price_difference_rel: c.min_price_difference_rel,
            charge_rate_multiplier: c.charge_rate_multiplier,
            production_offset_percent: c.production_offset_percent,
            soften_price_difference_on_charging: c.soften_price_difference_on_charging,
            soften_factor: c.soften_factor,
            round_price_digits: c.round_price_digits,
            min_charge_energy_wh: c.min_charge_energy_wh,
            discharge_blocked: false,
            limit_pv_charge_rate_w: 0.0,
            force_charge_rate_w: 0.0,
            mode_override: None,
        }
    }
}

/// Hardware backend selection (C4's driver behind the resilient facade).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct HardwareConfig {
    #[serde(default = "default_hardware_mode")]
    pub mode: HardwareMode,

    #[serde(default)]
    pub modbus: Option<ModbusConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareMode {
    Simulated,
    Modbus,
    Mock,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ModbusConfig {
    #[validate(length(min = 1))]
    pub address: String,

    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    #[validate(range(min = 1, max = 247))]
    pub unit_id: u8,

    #[validate(range(min = 100, max = 30_000))]
    pub timeout_ms: u64,
}

/// Forecast provider selection and per-provider connection details (C3).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ProvidersConfig {
    #[validate(nested)]
    pub tariff: TariffProviderConfig,

    #[validate(nested)]
    pub solar: SolarProviderConfig,

    #[validate(nested)]
    pub consumption: ConsumptionProviderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TariffProviderConfig {
    HourlyMarket {
        base_url: String,
        #[serde(default)]
        markup: f64,
        #[serde(default)]
        fees_per_kwh: f64,
        #[serde(default)]
        vat: f64,
    },
    Subscription {
        base_url: String,
        token: String,
    },
    LocalHttp {
        base_url: String,
        #[serde(default = "default_resolution_minutes")]
        native_resolution_minutes: i64,
    },
    TimeOfDayFallback {
        zone1_price: f64,
        zone2_price: f64,
        zone1_start_hour: u32,
        zone1_end_hour: u32,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolarProviderConfig {
    Cloud {
        base_url: String,
        #[serde(default)]
        api_key: Option<String>,
        installations: Vec<InstallationConfig>,
    },
    LocalMl {
        base_url: String,
        token: String,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct InstallationConfig {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub declination_deg: f64,
    #[serde(default)]
    pub azimuth_deg: f64,
    pub kwp: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ConsumptionProviderConfig {
    #[serde(default = "default_consumption_estimate_wh")]
    pub default_estimate_wh: f64,

    #[serde(default)]
    pub history_csv_path: Option<PathBuf>,
}

/// Tracing/logging configuration (C10).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[cfg(feature = "metrics")]
    #[serde(default)]
    pub enable_metrics: bool,

    #[cfg(feature = "metrics")]
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_request_timeout_secs() -> u64 {
    30
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}
fn default_always_allow_discharge_limit() -> f64 {
    0.9
}
fn default_max_charging_from_grid_limit() -> f64 {
    0.8
}
fn default_min_price_difference() -> f64 {
    0.05
}
fn default_min_price_difference_rel() -> f64 {
    0.2
}
fn default_charge_rate_multiplier() -> f64 {
    1.1
}
fn default_production_offset_percent() -> f64 {
    1.0
}
fn default_soften_factor() -> f64 {
    2.0
}
fn default_round_price_digits() -> i32 {
    4
}
fn default_min_charge_energy_wh() -> f64 {
    100.0
}
fn default_hardware_mode() -> HardwareMode {
    HardwareMode::Simulated
}
fn default_resolution_minutes() -> i64 {
    60
}
fn default_consumption_estimate_wh() -> f64 {
    500.0
}
fn default_log_level() -> String {
    "info".to_string()
}
#[cfg(feature = "metrics")]
fn default_metrics_port() -> u16 {
    9090
}

impl AppConfig {
    /// Loads configuration in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/<environment>.toml`, if given (else `config/local.toml` if present)
    /// 3. environment variables with an `OEC__` prefix, `__`-delimited
    pub fn load() -> Result<Self> {
        Self::load_with_env(None)
    }

    pub fn load_with_env(environment: Option<&str>) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file("config/default.toml"));

        if let Some(env) = environment {
            figment = figment.merge(Toml::file(format!("config/{env}.toml")));
        } else {
            figment = figment.merge(Toml::file("config/local.toml").nested());
        }

        figment = figment.merge(Env::prefixed("OEC__").split("__"));

        let config: AppConfig = figment.extract().context("failed to parse configuration")?;
        config.validate().context("configuration validation failed")?;
        Ok(config)
    }
}

pub type Config = AppConfig;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                request_timeout_secs: 30,
                enable_cors: false,
            },
            auth: AuthConfig { token: "x".repeat(32) },
            controller: ControllerConfig {
                tick_seconds: 60,
                resolution_minutes: 60,
                horizon_hours: 24,
                state_dir: default_state_dir(),
            },
            battery: BatteryConfig {
                capacity_wh: 10_000.0,
                initial_soc_percent: 50.0,
                max_grid_charge_rate_w: 5000.0,
                max_pv_charge_rate_w: 5000.0,
                parameters: ParametersConfig::default(),
            },
            hardware: HardwareConfig { mode: HardwareMode::Simulated, modbus: None },
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
                log_level: "info".to_string(),
                log_json: false,
                #[cfg(feature = "metrics")]
                enable_metrics: false,
                #[cfg(feature = "metrics")]
                metrics_port: 9090,
            },
        }
    }

    #[test]
    fn sample_config_validates() {
        sample().validate().unwrap();
    }

    #[test]
    fn grid_limit_must_be_below_discharge_limit() {
        let mut cfg = sample();
        cfg.battery.parameters.max_charging_from_grid_limit = 0.95;
        cfg.battery.parameters.always_allow_discharge_limit = 0.9;
        assert!(cfg.validate().is_err());
    }
}
