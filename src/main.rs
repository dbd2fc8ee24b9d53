use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tracing::{info, warn};

use battery_optimization_controller::{api, build_context, config::Config, scheduler, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::load().context("failed to load configuration")?;
    telemetry::init_tracing_with(&cfg.telemetry.log_level, cfg.telemetry.log_json);

    let ctx = build_context(&cfg).await?;

    let mut app: Router = api::router(ctx.clone(), &cfg);

    #[cfg(feature = "swagger")]
    {
        app = api::with_swagger(app);
    }
    #[cfg(feature = "metrics")]
    {
        app = api::with_metrics(app);
    }

    let addr = cfg.server.socket_addr()?;
    info!(%addr, "starting battery optimization controller");

    let shutdown_rx = telemetry::shutdown_watch();
    let scheduler_ctx = ctx.clone();
    let tick_interval = Duration::from_secs(cfg.controller.tick_seconds);
    let refresher_handles = scheduler::spawn_background_refreshers(ctx.clone(), shutdown_rx.clone());
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler::run(scheduler_ctx, tick_interval, shutdown_rx).await {
            warn!(error = %e, "evaluation loop terminated");
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(telemetry::shutdown_signal()).await?;

    scheduler_handle.abort();
    for handle in refresher_handles {
        handle.abort();
    }
    ctx.restore_pre_control_snapshot().await;
    warn!("shutdown complete");
    Ok(())
}
