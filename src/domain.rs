//! Shared data model: the entities every component passes around.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum charge rate the inverter will accept for a forced grid charge.
/// 500 W is Fronius' internal value for forced recharge; kept as the
/// cross-vendor floor since no driver advertises anything lower.
pub const MIN_CHARGE_RATE_W: f64 = 500.0;

/// One evaluation tick's worth of aligned, current-interval-anchored series.
/// Index 0 is always "now" (possibly a partial interval).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionInput {
    pub production_wh: Vec<f64>,
    pub consumption_wh: Vec<f64>,
    pub net_consumption_wh: Vec<f64>,
    pub prices: Vec<f64>,
    pub battery: BatteryState,
}

impl DecisionInput {
    /// Builds net_consumption = consumption - production and checks the
    /// equal-length invariant from the data model.
    pub fn new(
        production_wh: Vec<f64>,
        consumption_wh: Vec<f64>,
        prices: Vec<f64>,
        battery: BatteryState,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!prices.is_empty(), "decision input horizon must be >= 1");
        anyhow::ensure!(
            production_wh.len() == consumption_wh.len() && consumption_wh.len() == prices.len(),
            "production/consumption/price series must have equal length"
        );
        let net_consumption_wh = consumption_wh
            .iter()
            .zip(production_wh.iter())
            .map(|(c, p)| c - p)
            .collect();
        Ok(Self {
            production_wh,
            consumption_wh,
            net_consumption_wh,
            prices,
            battery,
        })
    }

    pub fn horizon(&self) -> usize {
        self.prices.len()
    }
}

/// A battery/inverter state snapshot as read through the resilient facade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatteryState {
    pub soc_percent: f64,
    pub stored_energy_wh: f64,
    pub stored_usable_energy_wh: f64,
    pub free_capacity_wh: f64,
    pub max_capacity_wh: f64,
    pub max_grid_charge_rate_w: f64,
    pub max_pv_charge_rate_w: f64,
}

/// One of the four inverter operating modes the decision engine can emit
/// (or that an operator can force through the control surface).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    AllowDischarge,
    AvoidDischarge,
    ForceCharge,
    LimitPvCharge,
}

impl Mode {
    /// The wire-level integer code used by the control surface, matching
    /// the historical FORCE_CHARGE=-1, AVOID_DISCHARGE=0, ALLOW_DISCHARGE=10,
    /// LIMIT_PV_CHARGE=8 encoding.
    pub fn code(self) -> i32 {
        match self {
            Mode::ForceCharge => -1,
            Mode::AvoidDischarge => 0,
            Mode::LimitPvCharge => 8,
            Mode::AllowDischarge => 10,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Mode::ForceCharge),
            0 => Some(Mode::AvoidDischarge),
            8 => Some(Mode::LimitPvCharge),
            10 => Some(Mode::AllowDischarge),
            _ => None,
        }
    }
}

/// Result of one decision-engine evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecisionOutput {
    pub mode: Mode,
    pub charge_rate_w: f64,
    pub limit_pv_charge_rate_w: f64,
    pub reserved_energy_wh: f64,
    pub required_recharge_energy_wh: f64,
    pub min_dynamic_price_diff: f64,
}

/// Tunable parameters, mutable only through the external control surface.
/// Lives behind a single guarded field inside `CoreContext` — this is the
/// typed, explicit replacement for the source's `CommonLogic` singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    pub always_allow_discharge_limit: f64,
    pub max_charging_from_grid_limit: f64,
    pub min_price_difference: f64,
    pub min_price_difference_rel: f64,
    pub charge_rate_multiplier: f64,
    pub production_offset_percent: f64,
    pub soften_price_difference_on_charging: bool,
    pub soften_factor: f64,
    pub round_price_digits: i32,
    pub min_charge_energy_wh: f64,
    pub discharge_blocked: bool,
    pub limit_pv_charge_rate_w: f64,
    /// Rate applied while `mode_override == Some(Mode::ForceCharge)`; kept
    /// separate from `limit_pv_charge_rate_w` so the two override setters
    /// don't clobber each other's value.
    pub force_charge_rate_w: f64,
    pub mode_override: Option<Mode>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            always_allow_discharge_limit: 0.9,
            max_charging_from_grid_limit: 0.8,
            min_price_difference: 0.05,
            min_price_difference_rel: 0.2,
            charge_rate_multiplier: 1.1,
            production_offset_percent: 1.0,
            soften_price_difference_on_charging: false,
            soften_factor: 2.0,
            round_price_digits: 4,
            min_charge_energy_wh: 100.0,
            discharge_blocked: false,
            limit_pv_charge_rate_w: 0.0,
            force_charge_rate_w: 0.0,
            mode_override: None,
        }
    }
}

impl Parameters {
    /// Enforces the cross-entity invariant from the data model:
    /// `max_charging_from_grid_limit < always_allow_discharge_limit`.
    /// Idempotent: calling this twice in a row leaves already-repaired
    /// parameters unchanged.
    pub fn repair(&mut self) -> bool {
        if self.max_charging_from_grid_limit >= self.always_allow_discharge_limit {
            let repaired = self.always_allow_discharge_limit - 0.01;
            tracing::warn!(
                old = self.max_charging_from_grid_limit,
                new = repaired,
                "max_charging_from_grid_limit >= always_allow_discharge_limit, lowering by 1pp"
            );
            self.max_charging_from_grid_limit = repaired;
            true
        } else {
            false
        }
    }
}

/// Status published after each tick, over the HTTP control surface.
#[derive(Debug, Clone, Serialize)]
pub struct TickStatus {
    pub soc_percent: f64,
    pub stored_energy_wh: f64,
    pub stored_usable_energy_wh: f64,
    pub free_capacity_wh: f64,
    pub max_capacity_wh: f64,
    pub last_mode: Mode,
    pub last_charge_rate_w: f64,
    pub reserved_energy_wh: f64,
    pub required_recharge_energy_wh: f64,
    pub min_dynamic_price_diff: f64,
    pub production_wh: Vec<f64>,
    pub consumption_wh: Vec<f64>,
    pub net_consumption_wh: Vec<f64>,
    pub prices: Vec<f64>,
    pub last_evaluation: DateTime<Utc>,
}

/// The resolution a forecast series is carried at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Hourly,
    Quarter,
}

impl Resolution {
    pub fn minutes(self) -> i64 {
        match self {
            Resolution::Hourly => 60,
            Resolution::Quarter => 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_code_round_trips() {
        for m in [
            Mode::ForceCharge,
            Mode::AvoidDischarge,
            Mode::LimitPvCharge,
            Mode::AllowDischarge,
        ] {
            assert_eq!(Mode::from_code(m.code()), Some(m));
        }
    }

    #[test]
    fn parameters_repair_is_idempotent() {
        let mut p = Parameters {
            always_allow_discharge_limit: 0.8,
            max_charging_from_grid_limit: 0.9,
            ..Default::default()
        };
        assert!(p.repair());
        let after_first = p.max_charging_from_grid_limit;
        assert!(!p.repair());
        assert_eq!(p.max_charging_from_grid_limit, after_first);
    }

    #[test]
    fn decision_input_rejects_mismatched_lengths() {
        let battery = BatteryState {
            soc_percent: 50.0,
            stored_energy_wh: 0.0,
            stored_usable_energy_wh: 0.0,
            free_capacity_wh: 0.0,
            max_capacity_wh: 10_000.0,
            max_grid_charge_rate_w: 3000.0,
            max_pv_charge_rate_w: 3000.0,
        };
        let res = DecisionInput::new(vec![1.0, 2.0], vec![1.0], vec![0.1, 0.2], battery);
        assert!(res.is_err());
    }
}
