//! Interval Grid Utility (C1): resolution conversion and "current interval"
//! alignment between hourly and quarter-hourly series.
#![allow(dead_code)]

use chrono::{DateTime, Timelike, Utc};

/// Upsample an hourly energy series to quarter-hourly by linear
/// interpolation of *power*, not a flat split. `hourly_wh[h]` is treated as
/// the average power for hour h; the quarter at offset q in {0,1,2,3}
/// interpolates linearly toward hour h+1's power. The final hour has no
/// successor and is extrapolated flat.
pub fn upsample_power_linear(hourly_wh: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(hourly_wh.len() * 4);
    for h in 0..hourly_wh.len() {
        let p_h = hourly_wh[h];
        let p_next = hourly_wh.get(h + 1).copied().unwrap_or(p_h);
        for q in 0..4 {
            let frac = q as f64 / 4.0;
            let interpolated_power = p_h + (p_next - p_h) * frac;
            out.push(interpolated_power * 0.25);
        }
    }
    out
}

/// Upsample by equal division: each hourly value is split into 4 equal
/// quarters. Used for consumption and prices where intra-hour detail is
/// either unknown or meaningless to preserve.
pub fn upsample_equal(hourly: &[f64]) -> Vec<f64> {
    hourly.iter().flat_map(|&v| std::iter::repeat(v / 4.0).take(4)).collect()
}

/// Sum each run of 4 quarters into one hourly energy value.
pub fn downsample_hourly_sum(quarter_wh: &[f64]) -> Vec<f64> {
    quarter_wh.chunks(4).map(|c| c.iter().sum()).collect()
}

/// Average each run of 4 quarters into one hourly price.
pub fn downsample_hourly_avg(quarter_price: &[f64]) -> Vec<f64> {
    quarter_price
        .chunks(4)
        .map(|c| c.iter().sum::<f64>() / c.len() as f64)
        .collect()
}

/// Replicate each hourly price into 4 identical quarters (60 -> 15 min
/// tariff conversion; prices have no intra-hour structure to interpolate).
pub fn replicate_hourly(hourly_price: &[f64]) -> Vec<f64> {
    hourly_price
        .iter()
        .flat_map(|&v| std::iter::repeat(v).take(4))
        .collect()
}

/// Drop indices before "now"'s interval and re-index so index 0 is the
/// interval containing `now`. `hour_aligned_seq` starts at the top of the
/// current hour at the given resolution.
pub fn shift_to_current_interval(
    hour_aligned_seq: &[f64],
    now: DateTime<Utc>,
    resolution_minutes: i64,
) -> Vec<f64> {
    let current_interval_in_hour = (now.minute() as i64) / resolution_minutes;
    let drop = current_interval_in_hour.max(0) as usize;
    if drop >= hour_aligned_seq.len() {
        Vec::new()
    } else {
        hour_aligned_seq[drop..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const EPS: f64 = 1e-9;

    #[test]
    fn downsample_sum_inverts_upsample_equal() {
        let hourly = vec![100.0, 200.0, 0.0, 50.5];
        let quarters = upsample_equal(&hourly);
        let back = downsample_hourly_sum(&quarters);
        for (a, b) in hourly.iter().zip(back.iter()) {
            assert!((a - b).abs() < EPS, "{a} != {b}");
        }
    }

    #[test]
    fn downsample_avg_inverts_replicate() {
        let hourly = vec![0.30, 0.25, 0.20];
        let quarters = replicate_hourly(&hourly);
        let back = downsample_hourly_avg(&quarters);
        for (a, b) in hourly.iter().zip(back.iter()) {
            assert!((a - b).abs() < EPS);
        }
    }

    #[test]
    fn upsample_power_linear_preserves_energy_under_constant_power() {
        let hourly = vec![1000.0, 1000.0, 1000.0];
        let quarters = upsample_power_linear(&hourly);
        let total: f64 = quarters[0..4].iter().sum();
        assert!((total - 1000.0).abs() < EPS);
    }

    #[test]
    fn upsample_power_linear_ramps_between_hours() {
        let hourly = vec![0.0, 400.0];
        let quarters = upsample_power_linear(&hourly);
        // q=0 power is 0, q=3 power is 300 (3/4 of the way to 400)
        assert!((quarters[0] - 0.0).abs() < EPS);
        assert!((quarters[3] - 75.0).abs() < EPS); // 300 W * 0.25 h
    }

    #[test]
    fn shift_to_current_interval_aligns_at_10_20_quarter_resolution() {
        let now = Utc.with_ymd_and_hms(2026, 7, 26, 10, 20, 0).unwrap();
        let hour_aligned = vec![1.0, 2.0, 3.0, 4.0]; // 10:00,10:15,10:30,10:45
        let shifted = shift_to_current_interval(&hour_aligned, now, 15);
        // 10:20 falls in the 10:15-10:30 interval, i.e. index 1 of input.
        assert_eq!(shifted[0], 2.0);
    }

    #[test]
    fn shift_is_identity_at_start_of_interval() {
        let now = Utc.with_ymd_and_hms(2026, 7, 26, 10, 0, 0).unwrap();
        let hour_aligned = vec![1.0, 2.0, 3.0, 4.0];
        let shifted = shift_to_current_interval(&hour_aligned, now, 15);
        assert_eq!(shifted, hour_aligned);
    }
}
