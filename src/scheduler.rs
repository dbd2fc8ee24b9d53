//! Scheduler & Evaluation Loop (C6): replaces the source's `schedule`
//! library plus dedicated polling thread with a `tokio::time::interval`
//! loop and cooperative cancellation, so Ctrl-C/SIGTERM terminate
//! promptly instead of waiting out a sleep.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::context::CoreContext;
use crate::domain::{DecisionInput, Mode, Parameters, TickStatus};
use crate::engine;
use crate::error::ControlError;

/// How long the tick will keep serving the last emitted mode when fresh
/// forecasts cannot be obtained at all, before defaulting to the
/// always-safe ALLOW_DISCHARGE.
pub const FORECAST_ERROR_TOLERANCE: Duration = Duration::from_secs(600);

/// Background-refresh cadence for external (cloud) providers (C2/C6).
pub const EXTERNAL_PROVIDER_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);
/// Background-refresh cadence for providers reachable on the local network.
pub const LOCAL_PROVIDER_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Runs a per-provider background refresher: calls `fetch` on a fixed
/// interval purely to keep that provider's TTL cache warm, so the
/// scheduler's own tick reads hit the cache instead of blocking on the
/// network in steady state. The fetched value itself is discarded here;
/// `get_or_fetch`'s cache population is the side effect this exists for.
async fn run_background_refresher<F, Fut>(
    name: &'static str,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    fetch: F,
) where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<(), ControlError>>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = fetch().await {
                    warn!(provider = name, error = %e, "background refresh failed, will retry next interval");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(provider = name, "background refresher stopping");
                    return;
                }
            }
        }
    }
}

/// Spawns the C6 background refreshers for every provider with a network
/// fetch behind a TTL cache (tariff, solar); the historical consumption
/// provider has nothing to refresh, it's computed in-memory per call.
pub fn spawn_background_refreshers(ctx: Arc<CoreContext>, shutdown: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
    let tariff_ctx = ctx.clone();
    let tariff_interval = ctx.tariff_refresh_interval;
    let tariff_shutdown = shutdown.clone();
    let tariff_handle = tokio::spawn(async move {
        run_background_refresher("tariff", tariff_interval, tariff_shutdown, || {
            let ctx = tariff_ctx.clone();
            async move { ctx.tariff.get_prices(Utc::now(), ctx.horizon_hours).await.map(|_| ()) }
        })
        .await;
    });

    let solar_ctx = ctx.clone();
    let solar_interval = ctx.solar_refresh_interval;
    let solar_shutdown = shutdown;
    let solar_handle = tokio::spawn(async move {
        run_background_refresher("solar", solar_interval, solar_shutdown, || {
            let ctx = solar_ctx.clone();
            async move {
                let params = ctx.parameters_snapshot().await;
                ctx.solar.get_forecast(Utc::now(), ctx.horizon_hours, &params).await.map(|_| ())
            }
        })
        .await;
    });

    vec![tariff_handle, solar_handle]
}

pub async fn run(ctx: Arc<CoreContext>, tick_interval: Duration, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_good_status: Option<TickStatus> = None;
    let mut forecast_failure_since: Option<chrono::DateTime<Utc>> = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match run_one_tick(&ctx).await {
                    Ok(status) => {
                        forecast_failure_since = None;
                        last_good_status = Some(status.clone());
                        *ctx.last_status.write().await = Some(status);
                    }
                    Err(ControlError::Outage { operation, elapsed }) => {
                        error!(operation, ?elapsed, "inverter outage exceeded tolerance, shutting down");
                        return Err(ControlError::Outage { operation, elapsed }.into());
                    }
                    Err(e) if matches!(e, ControlError::ShortHorizon { .. } | ControlError::Forecast(_) | ControlError::Network { .. } | ControlError::RateLimited { .. }) => {
                        warn!(error = %e, "forecast unavailable this tick, holding last mode");
                        let since = *forecast_failure_since.get_or_insert_with(Utc::now);
                        if Utc::now().signed_duration_since(since).to_std().unwrap_or_default() > FORECAST_ERROR_TOLERANCE {
                            warn!("forecast error tolerance exceeded, defaulting to ALLOW_DISCHARGE");
                            if let Err(write_err) = ctx.inverter.set_mode_allow_discharge().await {
                                error!(error = %write_err, "failed to apply safe-default ALLOW_DISCHARGE");
                            }
                        }
                        let _ = &last_good_status;
                    }
                    Err(e) => {
                        error!(error = %e, "tick failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("scheduler received shutdown signal, stopping evaluation loop");
                    return Ok(());
                }
            }
        }
    }
}

async fn run_one_tick(ctx: &CoreContext) -> Result<TickStatus, ControlError> {
    let now = Utc::now();
    let mut params = ctx.parameters_snapshot().await;
    if params.repair() {
        *ctx.parameters.write().await = params.clone();
    }

    let (prices, production, consumption) = fetch_forecasts(ctx, now, &params).await?;

    let soc = ctx.inverter.get_soc().await?;
    let stored_energy = ctx.inverter.get_stored_energy_wh().await?;
    let stored_usable = ctx.inverter.get_stored_usable_energy_wh().await?;
    let free_capacity = ctx.inverter.get_free_capacity_wh().await?;
    let max_capacity = ctx.inverter.get_max_capacity_wh().await?;

    let battery = crate::domain::BatteryState {
        soc_percent: soc,
        stored_energy_wh: stored_energy,
        stored_usable_energy_wh: stored_usable,
        free_capacity_wh: free_capacity,
        max_capacity_wh: max_capacity,
        max_grid_charge_rate_w: ctx.max_grid_charge_rate_w,
        max_pv_charge_rate_w: ctx.max_pv_charge_rate_w,
    };

    let input = DecisionInput::new(production, consumption, prices, battery)
        .map_err(|e| ControlError::Forecast(e.to_string()))?;

    let output = if let Some(mode) = params.mode_override {
        override_output(mode, &params)
    } else {
        engine::evaluate(&input, &params, now, ctx.resolution.minutes())
    };

    apply_output(ctx, &output).await?;

    Ok(TickStatus {
        soc_percent: soc,
        stored_energy_wh: stored_energy,
        stored_usable_energy_wh: stored_usable,
        free_capacity_wh: free_capacity,
        max_capacity_wh: max_capacity,
        last_mode: output.mode,
        last_charge_rate_w: output.charge_rate_w,
        reserved_energy_wh: output.reserved_energy_wh,
        required_recharge_energy_wh: output.required_recharge_energy_wh,
        min_dynamic_price_diff: output.min_dynamic_price_diff,
        production_wh: input.production_wh,
        consumption_wh: input.consumption_wh,
        net_consumption_wh: input.net_consumption_wh,
        prices: input.prices,
        last_evaluation: now,
    })
}

async fn fetch_forecasts(
    ctx: &CoreContext,
    now: chrono::DateTime<Utc>,
    params: &Parameters,
) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>), ControlError> {
    let (prices, production, consumption) = tokio::join!(
        ctx.tariff.get_prices(now, ctx.horizon_hours),
        ctx.solar.get_forecast(now, ctx.horizon_hours, params),
        ctx.consumption.get_forecast(now, ctx.horizon_hours),
    );
    let prices = prices?;
    let mut production = production?;
    let mut consumption = consumption?;

    let horizon = prices.len().min(production.len()).min(consumption.len());
    production.truncate(horizon);
    consumption.truncate(horizon);
    let prices = prices.into_iter().take(horizon).collect();
    Ok((prices, production, consumption))
}

fn override_output(mode: Mode, params: &Parameters) -> crate::domain::DecisionOutput {
    crate::domain::DecisionOutput {
        mode,
        charge_rate_w: if mode == Mode::ForceCharge { params.force_charge_rate_w } else { 0.0 },
        limit_pv_charge_rate_w: if mode == Mode::LimitPvCharge { params.limit_pv_charge_rate_w } else { 0.0 },
        reserved_energy_wh: 0.0,
        required_recharge_energy_wh: 0.0,
        min_dynamic_price_diff: 0.0,
    }
}

async fn apply_output(ctx: &CoreContext, output: &crate::domain::DecisionOutput) -> Result<(), ControlError> {
    match output.mode {
        Mode::AllowDischarge => ctx.inverter.set_mode_allow_discharge().await,
        Mode::AvoidDischarge => ctx.inverter.set_mode_avoid_discharge().await,
        Mode::ForceCharge => ctx.inverter.set_mode_force_charge(output.charge_rate_w).await,
        Mode::LimitPvCharge => ctx.inverter.set_mode_limit_battery_charge(output.limit_pv_charge_rate_w).await,
    }
}
