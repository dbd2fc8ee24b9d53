//! Exercises one full evaluation tick (C6) against a `CoreContext` wired
//! with in-memory forecast/inverter doubles, checking that a tick
//! publishes `last_status` and actually drives the inverter.

mod common;

use battery_optimization_controller::domain::Mode;
use battery_optimization_controller::scheduler;
use common::test_context;

#[tokio::test]
async fn one_tick_publishes_status_and_applies_a_mode() {
    let ctx = test_context();
    assert!(ctx.last_status.read().await.is_none());

    let (_tx, rx) = tokio::sync::watch::channel(false);
    let tick_interval = std::time::Duration::from_millis(10);

    let ctx_clone = ctx.clone();
    let handle = tokio::spawn(async move { scheduler::run(ctx_clone, tick_interval, rx).await });

    // Give the loop a couple of ticks to run, then ask it to stop.
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    _tx.send(true).unwrap();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), handle).await;

    let status = ctx.last_status.read().await.clone().expect("tick should have published a status");
    assert!(matches!(
        status.last_mode,
        Mode::AllowDischarge | Mode::AvoidDischarge | Mode::ForceCharge | Mode::LimitPvCharge
    ));
    assert_eq!(status.prices.len(), 6);
}

#[tokio::test]
async fn mode_override_bypasses_the_decision_engine() {
    let ctx = test_context();
    ctx.parameters.write().await.mode_override = Some(Mode::ForceCharge);

    let (_tx, rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn({
        let ctx = ctx.clone();
        async move { scheduler::run(ctx, std::time::Duration::from_millis(10), rx).await }
    });

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    _tx.send(true).unwrap();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), handle).await;

    let status = ctx.last_status.read().await.clone().expect("tick should have published a status");
    assert_eq!(status.last_mode, Mode::ForceCharge);
}
