//! Decision Engine (C5): the rule-based heuristic that turns aligned
//! forecasts plus battery state into one inverter-control decision per
//! tick. Grounded on the historical `logic/default.py` discharge-permission
//! and charge-from-grid rules; the automatic policy never emits
//! `Mode::LimitPvCharge` (that is reachable only through an override
//! applied by the caller before this function is ever invoked).
#![allow(dead_code)]

use chrono::{DateTime, Timelike, Utc};

use crate::domain::{DecisionInput, DecisionOutput, Mode, Parameters};
use crate::engine::math::BatteryMath;

/// Evaluates one tick. Callers are responsible for checking
/// `params.mode_override` first and short-circuiting this call entirely
/// when an override is active — the engine itself has no override logic.
pub fn evaluate(
    input: &DecisionInput,
    params: &Parameters,
    t_now: DateTime<Utc>,
    resolution_minutes: i64,
) -> DecisionOutput {
    let math = BatteryMath {
        charge_rate_multiplier: params.charge_rate_multiplier,
        always_allow_discharge_limit: params.always_allow_discharge_limit,
        max_capacity_wh: input.battery.max_capacity_wh,
        min_charge_energy_wh: params.min_charge_energy_wh,
    };

    let n = input.horizon();
    let minute_fraction = (t_now.minute() as i64 % resolution_minutes) as f64 / resolution_minutes as f64;
    let remaining_fraction_of_hour = 1.0 - minute_fraction;

    let mut net = input.net_consumption_wh.clone();
    net[0] *= remaining_fraction_of_hour;

    let consumption: Vec<f64> = net.iter().map(|&v| v.max(0.0)).collect();
    let production: Vec<f64> = net.iter().map(|&v| (-v).max(0.0)).collect();
    let prices = &input.prices;

    let min_dyn_diff = round_to(
        params
            .min_price_difference
            .max(params.min_price_difference_rel * prices[0].abs()),
        params.round_price_digits,
    );

    // 4.5.1 Step A: always-allow-discharge override.
    if math.is_discharge_always_allowed_capacity(input.battery.stored_energy_wh) {
        return allow_discharge(min_dyn_diff);
    }

    let reserved_energy = compute_reserved_energy(&consumption, &production, prices, min_dyn_diff, params.round_price_digits, n);

    // 4.5.1 Step D
    if input.battery.stored_usable_energy_wh > reserved_energy && !params.discharge_blocked {
        return DecisionOutput {
            mode: Mode::AllowDischarge,
            charge_rate_w: 0.0,
            limit_pv_charge_rate_w: 0.0,
            reserved_energy_wh: reserved_energy,
            required_recharge_energy_wh: 0.0,
            min_dynamic_price_diff: min_dyn_diff,
        };
    }

    // 4.5.2 charge-from-grid rule.
    let required_energy = compute_required_recharge(&consumption, &production, prices, params, min_dyn_diff, n);

    let recharge_energy_required = (required_energy - input.battery.stored_usable_energy_wh).max(0.0);
    let recharge_energy_clamped = recharge_energy_required.min(input.battery.free_capacity_wh);

    let soc_below_grid_ceiling = input.battery.soc_percent < params.max_charging_from_grid_limit * 100.0;
    if soc_below_grid_ceiling && math.is_charging_above_minimum(recharge_energy_clamped) {
        let raw_rate = recharge_energy_clamped / remaining_fraction_of_hour.max(f64::EPSILON);
        let floored = math.calculate_charge_rate(raw_rate) as f64;
        let capped = floored.min(input.battery.max_grid_charge_rate_w);
        DecisionOutput {
            mode: Mode::ForceCharge,
            charge_rate_w: capped,
            limit_pv_charge_rate_w: 0.0,
            reserved_energy_wh: reserved_energy,
            required_recharge_energy_wh: recharge_energy_clamped,
            min_dynamic_price_diff: min_dyn_diff,
        }
    } else {
        DecisionOutput {
            mode: Mode::AvoidDischarge,
            charge_rate_w: 0.0,
            limit_pv_charge_rate_w: 0.0,
            reserved_energy_wh: reserved_energy,
            required_recharge_energy_wh: recharge_energy_clamped,
            min_dynamic_price_diff: min_dyn_diff,
        }
    }
}

fn allow_discharge(min_dyn_diff: f64) -> DecisionOutput {
    DecisionOutput {
        mode: Mode::AllowDischarge,
        charge_rate_w: 0.0,
        limit_pv_charge_rate_w: 0.0,
        reserved_energy_wh: 0.0,
        required_recharge_energy_wh: 0.0,
        min_dynamic_price_diff: min_dyn_diff,
    }
}

/// 4.5.1 Steps B & C: narrow the horizon to the next cheap recharge window,
/// then walk higher-price hours latest-first, consuming earlier production
/// backward to see how much storage must be held in reserve.
fn compute_reserved_energy(
    consumption: &[f64],
    production: &[f64],
    prices: &[f64],
    min_dyn_diff: f64,
    round_price_digits: i32,
    n: usize,
) -> f64 {
    let window_end = (1..n)
        .find(|&h| round_to(prices[h], round_price_digits) <= round_to(prices[0] - min_dyn_diff, round_price_digits))
        .unwrap_or(n);

    let mut higher_price_hours: Vec<usize> = (1..window_end)
        .filter(|&h| round_to(prices[h], round_price_digits) > round_to(prices[0], round_price_digits))
        .collect();
    higher_price_hours.sort_unstable_by(|a, b| b.cmp(a)); // descending: latest first

    let mut working_production = production.to_vec();
    let mut reserved_energy = 0.0;

    for h in higher_price_hours {
        let mut need = consumption[h];
        let mut h_prime = h as isize - 1;
        while need > 0.0 && h_prime >= 0 {
            let idx = h_prime as usize;
            if working_production[idx] > 0.0 {
                let consumed = need.min(working_production[idx]);
                working_production[idx] -= consumed;
                need -= consumed;
            }
            h_prime -= 1;
        }
        reserved_energy += need;
    }
    reserved_energy
}

/// 4.5.2 Steps A-C: narrow the horizon to the next hour that is no more
/// expensive than now, collect nearest-first high-price hours, and walk
/// upcoming production forward to see how much must still come from the
/// grid.
fn compute_required_recharge(
    consumption: &[f64],
    production: &[f64],
    prices: &[f64],
    params: &Parameters,
    min_dyn_diff: f64,
    n: usize,
) -> f64 {
    let digits = params.round_price_digits;
    let threshold = if params.soften_price_difference_on_charging {
        prices[0] - params.min_price_difference / params.soften_factor
    } else {
        prices[0]
    };
    let threshold = round_to(threshold, digits);
    let window_end = (1..n).find(|&h| round_to(prices[h], digits) <= threshold).unwrap_or(n);

    let mut high_price_hours: Vec<usize> = (1..window_end)
        .filter(|&h| round_to(prices[h], digits) > round_to(prices[0] + min_dyn_diff, digits))
        .collect();
    high_price_hours.sort_unstable(); // ascending: nearest first

    let mut working_production = production.to_vec();
    let mut required_energy = 0.0;

    for h_prime in high_price_hours {
        let mut demand = consumption[h_prime];
        for h_double_prime in 1..h_prime {
            if demand <= 0.0 {
                break;
            }
            if working_production[h_double_prime] > 0.0 {
                let consumed = demand.min(working_production[h_double_prime]);
                working_production[h_double_prime] -= consumed;
                demand -= consumed;
            }
        }
        required_energy += demand;
    }
    required_energy
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BatteryState;
    use chrono::TimeZone;

    fn battery(
        soc: f64,
        stored: f64,
        usable: f64,
        free: f64,
        max_capacity: f64,
    ) -> BatteryState {
        BatteryState {
            soc_percent: soc,
            stored_energy_wh: stored,
            stored_usable_energy_wh: usable,
            free_capacity_wh: free,
            max_capacity_wh: max_capacity,
            max_grid_charge_rate_w: 5000.0,
            max_pv_charge_rate_w: 5000.0,
        }
    }

    fn params(min_diff: f64, min_diff_rel: f64, grid_limit: f64) -> Parameters {
        Parameters {
            always_allow_discharge_limit: 0.9,
            max_charging_from_grid_limit: grid_limit,
            min_price_difference: min_diff,
            min_price_difference_rel: min_diff_rel,
            ..Default::default()
        }
    }

    fn now_at_minute(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 26, 10, minute, 0).unwrap()
    }

    #[test]
    fn scenario_a_high_soc_prices_falling_allows_discharge() {
        let input = DecisionInput::new(
            vec![0.0, 0.0, 0.0],
            vec![500.0, 600.0, 700.0],
            vec![0.30, 0.25, 0.20],
            battery(95.0, 9500.0, 9000.0, 500.0, 10_000.0),
        )
        .unwrap();
        let p = params(0.05, 0.2, 0.8);
        let out = evaluate(&input, &p, now_at_minute(0), 60);
        assert_eq!(out.mode, Mode::AllowDischarge);
    }

    #[test]
    fn scenario_b_low_soc_no_future_discount_allows_discharge() {
        let input = DecisionInput::new(
            vec![0.0, 0.0, 0.0],
            vec![500.0, 500.0, 500.0],
            vec![0.30, 0.25, 0.20],
            battery(20.0, 2000.0, 1500.0, 8000.0, 10_000.0),
        )
        .unwrap();
        let p = params(0.05, 0.2, 0.8);
        let out = evaluate(&input, &p, now_at_minute(0), 60);
        assert_eq!(out.mode, Mode::AllowDischarge);
    }

    #[test]
    fn scenario_c_future_spike_covered_by_stock_avoids_discharge() {
        let input = DecisionInput::new(
            vec![0.0, 0.0, 0.0],
            vec![500.0, 500.0, 1000.0],
            vec![0.20, 0.25, 0.30],
            battery(15.0, 1500.0, 1000.0, 8500.0, 10_000.0),
        )
        .unwrap();
        let p = params(0.05, 0.2, 0.8);
        let out = evaluate(&input, &p, now_at_minute(0), 60);
        assert_eq!(out.mode, Mode::AvoidDischarge);
    }

    #[test]
    fn scenario_d_future_spike_forces_grid_charge() {
        let input = DecisionInput::new(
            vec![0.0, 0.0, 0.0],
            vec![500.0, 500.0, 1000.0],
            vec![0.20, 0.25, 0.30],
            battery(15.0, 1500.0, 100.0, 8500.0, 10_000.0),
        )
        .unwrap();
        let p = params(0.05, 0.2, 0.8);
        let out = evaluate(&input, &p, now_at_minute(0), 60);
        assert_eq!(out.mode, Mode::ForceCharge);
        assert!((out.charge_rate_w - 990.0).abs() < 1e-6);
    }

    #[test]
    fn scenario_e_discharge_blocked_falls_through_to_avoid() {
        let input = DecisionInput::new(
            vec![0.0, 0.0, 0.0],
            vec![500.0, 500.0, 500.0],
            vec![0.30, 0.25, 0.20],
            battery(20.0, 2000.0, 1500.0, 8000.0, 10_000.0),
        )
        .unwrap();
        let mut p = params(0.05, 0.2, 0.8);
        p.discharge_blocked = true;
        let out = evaluate(&input, &p, now_at_minute(0), 60);
        assert_eq!(out.mode, Mode::AvoidDischarge);
    }

    #[test]
    fn intra_interval_scaling_at_minute_zero_is_unchanged() {
        let input = DecisionInput::new(
            vec![0.0],
            vec![1000.0],
            vec![0.2],
            battery(50.0, 1000.0, 500.0, 1000.0, 10_000.0),
        )
        .unwrap();
        let p = params(0.05, 0.2, 0.8);
        // horizon 1: nothing to narrow, but we can check net[0] indirectly
        // through required_recharge/behaviour is consistent at minute 0.
        let out0 = evaluate(&input, &p, now_at_minute(0), 60);
        let out45 = evaluate(&input, &p, now_at_minute(45), 60);
        // At minute 45 of a 60-min resolution, net_consumption[0] is scaled
        // by 0.25, so any required recharge should shrink accordingly.
        assert!(out45.required_recharge_energy_wh <= out0.required_recharge_energy_wh);
    }

    #[test]
    fn limit_pv_charge_is_never_emitted_automatically() {
        // Sweep a handful of plausible inputs; none should ever produce
        // Mode::LimitPvCharge since the engine never constructs it.
        let input = DecisionInput::new(
            vec![0.0, 100.0, 0.0],
            vec![500.0, 500.0, 1500.0],
            vec![0.20, 0.10, 0.35],
            battery(40.0, 3000.0, 2000.0, 4000.0, 10_000.0),
        )
        .unwrap();
        let p = params(0.05, 0.2, 0.8);
        let out = evaluate(&input, &p, now_at_minute(0), 60);
        assert_ne!(out.mode, Mode::LimitPvCharge);
    }
}
