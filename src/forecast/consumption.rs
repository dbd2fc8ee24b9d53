//! Consumption provider. Grounded on `forecastconsumption/forecastconsumption.py`:
//! a weighted average of N historic same-weekday-same-hour observations
//! (weights 1..10, most recent heaviest), falling back to a flat default
//! estimate for any slot with zero observations.
#![allow(dead_code)]

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::error::ControlError;

/// Loads `timestamp,wh` lines (RFC 3339 timestamp, one observation per
/// line) written by the historical-logging side of the system. Malformed
/// lines are skipped with a warning rather than failing the whole load,
/// since one bad row from hand-edited history shouldn't block startup.
pub fn load_history_csv(path: &Path) -> anyhow::Result<Vec<Observation>> {
    let content = std::fs::read_to_string(path)?;
    let mut observations = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((ts, wh)) = line.split_once(',') else {
            tracing::warn!(lineno, line, "skipping malformed consumption history line");
            continue;
        };
        match (DateTime::parse_from_rfc3339(ts.trim()), wh.trim().parse::<f64>()) {
            (Ok(at), Ok(consumption_wh)) => {
                observations.push(Observation { at: at.with_timezone(&Utc), consumption_wh });
            }
            _ => tracing::warn!(lineno, line, "skipping malformed consumption history line"),
        }
    }
    Ok(observations)
}

#[async_trait]
pub trait ConsumptionProvider: Send + Sync {
    /// Wh per interval, index 0 = current interval.
    async fn get_forecast(&self, now: DateTime<Utc>, hours: usize) -> Result<Vec<f64>, ControlError>;
}

/// One historical observation: the wall-clock it was recorded at and the
/// Wh consumed in that hour.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub at: DateTime<Utc>,
    pub consumption_wh: f64,
}

pub struct HistoricalConsumptionProvider {
    history: Vec<Observation>,
    default_estimate_wh: f64,
    max_weight_depth: usize,
}

impl HistoricalConsumptionProvider {
    pub fn new(history: Vec<Observation>, default_estimate_wh: f64) -> Self {
        Self { history, default_estimate_wh, max_weight_depth: 10 }
    }

    /// Weighted average for one (weekday, hour) slot, most recent
    /// observation weighted `max_weight_depth`, decreasing by 1 per step
    /// back, floored at weight 1. Returns `None` if there are no matching
    /// observations at all.
    fn weighted_average_for_slot(&self, weekday: chrono::Weekday, hour: u32) -> Option<f64> {
        let mut matches: Vec<&Observation> = self
            .history
            .iter()
            .filter(|o| o.at.weekday() == weekday && o.at.hour() == hour)
            .collect();
        if matches.is_empty() {
            return None;
        }
        matches.sort_by_key(|o| std::cmp::Reverse(o.at));

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (i, obs) in matches.iter().take(self.max_weight_depth).enumerate() {
            let weight = (self.max_weight_depth - i).max(1) as f64;
            weighted_sum += obs.consumption_wh * weight;
            weight_total += weight;
        }
        Some(weighted_sum / weight_total)
    }
}

#[async_trait]
impl ConsumptionProvider for HistoricalConsumptionProvider {
    async fn get_forecast(&self, now: DateTime<Utc>, hours: usize) -> Result<Vec<f64>, ControlError> {
        let mut out = Vec::with_capacity(hours);
        for offset in 0..hours {
            let t = now + chrono::Duration::hours(offset as i64);
            let estimate = self
                .weighted_average_for_slot(t.weekday(), t.hour())
                .unwrap_or(self.default_estimate_wh);
            out.push(estimate);
        }
        Ok(out)
    }
}
