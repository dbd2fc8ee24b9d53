//! Forecast Providers (C3): tariff, solar, and consumption providers, each
//! implementing a common fetch-then-align contract on top of C1's interval
//! utilities and C2's cache/rate-limit layer.
#![allow(dead_code)]

pub mod consumption;
pub mod solar;
pub mod tariff;

pub use consumption::{ConsumptionProvider, HistoricalConsumptionProvider};
pub use solar::{CloudSolarProvider, LocalMlSolarProvider, SolarProvider};
pub use tariff::{
    HourlyMarketTariffProvider, LocalHttpTariffProvider, SubscriptionTariffProvider,
    TariffProvider, TimeOfDayFallbackProvider,
};

use chrono::{DateTime, Utc};

use crate::domain::Resolution;
use crate::error::ControlError;
use crate::grid::{
    downsample_hourly_avg, downsample_hourly_sum, replicate_hourly, shift_to_current_interval,
    upsample_equal, upsample_power_linear,
};

/// Shared resolution-conversion + alignment step every price series is run
/// through before it reaches the decision engine.
pub fn align_prices(native: Vec<f64>, native_res: Resolution, target_res: Resolution, now: DateTime<Utc>) -> Vec<f64> {
    let converted = match (native_res, target_res) {
        (Resolution::Hourly, Resolution::Quarter) => replicate_hourly(&native),
        (Resolution::Quarter, Resolution::Hourly) => downsample_hourly_avg(&native),
        _ => native,
    };
    shift_to_current_interval(&converted, now, target_res.minutes())
}

/// Alignment for energy series whose intra-hour shape is meaningful
/// (solar production): power-interpolated upsampling.
pub fn align_energy_linear(native: Vec<f64>, native_res: Resolution, target_res: Resolution, now: DateTime<Utc>) -> Vec<f64> {
    let converted = match (native_res, target_res) {
        (Resolution::Hourly, Resolution::Quarter) => upsample_power_linear(&native),
        (Resolution::Quarter, Resolution::Hourly) => downsample_hourly_sum(&native),
        _ => native,
    };
    shift_to_current_interval(&converted, now, target_res.minutes())
}

/// Alignment for energy series split equally across the hour (consumption).
pub fn align_energy_equal(native: Vec<f64>, native_res: Resolution, target_res: Resolution, now: DateTime<Utc>) -> Vec<f64> {
    let converted = match (native_res, target_res) {
        (Resolution::Hourly, Resolution::Quarter) => upsample_equal(&native),
        (Resolution::Quarter, Resolution::Hourly) => downsample_hourly_sum(&native),
        _ => native,
    };
    shift_to_current_interval(&converted, now, target_res.minutes())
}

/// Minimum forward-looking hours a solar forecast must supply; shorter is
/// a fatal `ShortHorizon` for the tick (missing-horizon policy).
pub const MIN_SOLAR_HORIZON_HOURS: usize = 18;

pub fn require_horizon(provider: &str, got: usize, needed: usize) -> Result<(), ControlError> {
    if got < needed {
        Err(ControlError::ShortHorizon { provider: provider.to_string(), got, needed })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_horizon_rejects_short_solar_forecast() {
        assert!(require_horizon("cloud-solar", 10, MIN_SOLAR_HORIZON_HOURS).is_err());
        assert!(require_horizon("cloud-solar", 24, MIN_SOLAR_HORIZON_HOURS).is_ok());
    }
}
