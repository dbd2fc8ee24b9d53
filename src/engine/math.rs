//! Common Battery Math (C8): SOC/capacity/energy predicates and the
//! charge-rate floor, held as an explicit struct passed by reference
//! rather than the source's `CommonLogic.get_instance()` singleton.
#![allow(dead_code)]

use crate::domain::MIN_CHARGE_RATE_W;

#[derive(Debug, Clone, Copy)]
pub struct BatteryMath {
    pub charge_rate_multiplier: f64,
    pub always_allow_discharge_limit: f64,
    pub max_capacity_wh: f64,
    pub min_charge_energy_wh: f64,
}

impl BatteryMath {
    pub fn is_discharge_always_allowed_soc(&self, soc_percent: f64) -> bool {
        soc_percent / 100.0 >= self.always_allow_discharge_limit
    }

    pub fn is_discharge_always_allowed_capacity(&self, stored_energy_wh: f64) -> bool {
        stored_energy_wh >= self.max_capacity_wh * self.always_allow_discharge_limit
    }

    pub fn is_charging_above_minimum(&self, needed_energy_wh: f64) -> bool {
        needed_energy_wh >= self.min_charge_energy_wh
    }

    /// Scales a raw required charge rate by the efficiency multiplier and
    /// floors it at `MIN_CHARGE_RATE_W`. Does not cap at a grid limit; the
    /// caller (the decision engine) applies the `max_grid_charge_rate` cap,
    /// a constraint this spec adds beyond the historical calculation.
    pub fn calculate_charge_rate(&self, charge_rate_w: f64) -> u32 {
        let adjusted = charge_rate_w * self.charge_rate_multiplier;
        let floored = adjusted.max(MIN_CHARGE_RATE_W);
        floored.round() as u32
    }
}
