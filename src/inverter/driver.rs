//! The raw inverter/battery driver surface (C4). `InverterDriver` is the
//! trait every vendor backend implements; `ResilientInverter` (in
//! `resilient.rs`) wraps any driver with the outage/backoff state machine.
//! Mirrors the historical per-vendor adapter methods one-for-one:
//! `get_SOC`, `get_stored_energy`, `get_stored_usable_energy`,
//! `get_capacity`, `get_free_capacity`, `get_max_capacity`, and the four
//! `set_mode_*` writers.
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

#[async_trait]
pub trait InverterDriver: Send + Sync {
    async fn get_soc(&self) -> Result<f64>;
    async fn get_stored_energy_wh(&self) -> Result<f64>;
    async fn get_stored_usable_energy_wh(&self) -> Result<f64>;
    async fn get_capacity_wh(&self) -> Result<f64>;
    async fn get_free_capacity_wh(&self) -> Result<f64>;
    async fn get_max_capacity_wh(&self) -> Result<f64>;

    async fn set_mode_force_charge(&self, charge_rate_w: f64) -> Result<()>;
    async fn set_mode_avoid_discharge(&self) -> Result<()>;
    async fn set_mode_allow_discharge(&self) -> Result<()>;
    async fn set_mode_limit_battery_charge(&self, limit_rate_w: f64) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct SimulatedState {
    soc_percent: f64,
    stored_energy_wh: f64,
    max_capacity_wh: f64,
}

/// An in-process physics-free inverter used as the default backend
/// (feature `sim`, also the fallback when no hardware feature is enabled).
/// SOC drifts deterministically toward whatever the last applied mode
/// implies, just enough to exercise the resilient facade and scheduler in
/// tests and local runs.
pub struct SimulatedInverter {
    state: Arc<RwLock<SimulatedState>>,
}

impl SimulatedInverter {
    pub fn new(initial_soc_percent: f64, max_capacity_wh: f64) -> Self {
        Self {
            state: Arc::new(RwLock::new(SimulatedState {
                soc_percent: initial_soc_percent,
                stored_energy_wh: max_capacity_wh * initial_soc_percent / 100.0,
                max_capacity_wh,
            })),
        }
    }
}

#[async_trait]
impl InverterDriver for SimulatedInverter {
    async fn get_soc(&self) -> Result<f64> {
        Ok(self.state.read().await.soc_percent)
    }

    async fn get_stored_energy_wh(&self) -> Result<f64> {
        Ok(self.state.read().await.stored_energy_wh)
    }

    async fn get_stored_usable_energy_wh(&self) -> Result<f64> {
        // Simplification: no reserved-minimum floor modeled in the simulator.
        Ok(self.state.read().await.stored_energy_wh)
    }

    async fn get_capacity_wh(&self) -> Result<f64> {
        Ok(self.state.read().await.max_capacity_wh)
    }

    async fn get_free_capacity_wh(&self) -> Result<f64> {
        let s = self.state.read().await;
        Ok(s.max_capacity_wh - s.stored_energy_wh)
    }

    async fn get_max_capacity_wh(&self) -> Result<f64> {
        Ok(self.state.read().await.max_capacity_wh)
    }

    async fn set_mode_force_charge(&self, charge_rate_w: f64) -> Result<()> {
        let mut s = self.state.write().await;
        s.stored_energy_wh = (s.stored_energy_wh + charge_rate_w / 60.0).min(s.max_capacity_wh);
        s.soc_percent = 100.0 * s.stored_energy_wh / s.max_capacity_wh;
        Ok(())
    }

    async fn set_mode_avoid_discharge(&self) -> Result<()> {
        Ok(())
    }

    async fn set_mode_allow_discharge(&self) -> Result<()> {
        Ok(())
    }

    async fn set_mode_limit_battery_charge(&self, _limit_rate_w: f64) -> Result<()> {
        Ok(())
    }
}

/// A driver double for unit/integration tests: every method is scripted
/// through the queued closures or fixed failure flags a test installs.
pub struct MockInverter {
    pub soc_percent: RwLock<f64>,
    pub stored_energy_wh: RwLock<f64>,
    pub stored_usable_energy_wh: RwLock<f64>,
    pub max_capacity_wh: RwLock<f64>,
    pub free_capacity_wh: RwLock<f64>,
    pub fail_reads: std::sync::atomic::AtomicBool,
    pub fail_writes: std::sync::atomic::AtomicBool,
}

impl Default for MockInverter {
    fn default() -> Self {
        Self {
            soc_percent: RwLock::new(50.0),
            stored_energy_wh: RwLock::new(5_000.0),
            stored_usable_energy_wh: RwLock::new(4_500.0),
            max_capacity_wh: RwLock::new(10_000.0),
            free_capacity_wh: RwLock::new(5_000.0),
            fail_reads: std::sync::atomic::AtomicBool::new(false),
            fail_writes: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl InverterDriver for MockInverter {
    async fn get_soc(&self) -> Result<f64> {
        self.check_read()?;
        Ok(*self.soc_percent.read().await)
    }

    async fn get_stored_energy_wh(&self) -> Result<f64> {
        self.check_read()?;
        Ok(*self.stored_energy_wh.read().await)
    }

    async fn get_stored_usable_energy_wh(&self) -> Result<f64> {
        self.check_read()?;
        Ok(*self.stored_usable_energy_wh.read().await)
    }

    async fn get_capacity_wh(&self) -> Result<f64> {
        self.check_read()?;
        Ok(*self.max_capacity_wh.read().await)
    }

    async fn get_free_capacity_wh(&self) -> Result<f64> {
        self.check_read()?;
        Ok(*self.free_capacity_wh.read().await)
    }

    async fn get_max_capacity_wh(&self) -> Result<f64> {
        self.check_read()?;
        Ok(*self.max_capacity_wh.read().await)
    }

    async fn set_mode_force_charge(&self, _charge_rate_w: f64) -> Result<()> {
        self.check_write()
    }

    async fn set_mode_avoid_discharge(&self) -> Result<()> {
        self.check_write()
    }

    async fn set_mode_allow_discharge(&self) -> Result<()> {
        self.check_write()
    }

    async fn set_mode_limit_battery_charge(&self, _limit_rate_w: f64) -> Result<()> {
        self.check_write()
    }
}

#[async_trait]
impl InverterDriver for Box<dyn InverterDriver> {
    async fn get_soc(&self) -> Result<f64> {
        (**self).get_soc().await
    }

    async fn get_stored_energy_wh(&self) -> Result<f64> {
        (**self).get_stored_energy_wh().await
    }

    async fn get_stored_usable_energy_wh(&self) -> Result<f64> {
        (**self).get_stored_usable_energy_wh().await
    }

    async fn get_capacity_wh(&self) -> Result<f64> {
        (**self).get_capacity_wh().await
    }

    async fn get_free_capacity_wh(&self) -> Result<f64> {
        (**self).get_free_capacity_wh().await
    }

    async fn get_max_capacity_wh(&self) -> Result<f64> {
        (**self).get_max_capacity_wh().await
    }

    async fn set_mode_force_charge(&self, charge_rate_w: f64) -> Result<()> {
        (**self).set_mode_force_charge(charge_rate_w).await
    }

    async fn set_mode_avoid_discharge(&self) -> Result<()> {
        (**self).set_mode_avoid_discharge().await
    }

    async fn set_mode_allow_discharge(&self) -> Result<()> {
        (**self).set_mode_allow_discharge().await
    }

    async fn set_mode_limit_battery_charge(&self, limit_rate_w: f64) -> Result<()> {
        (**self).set_mode_limit_battery_charge(limit_rate_w).await
    }
}

/// Lets a driver kept alive elsewhere (e.g. also held as `Arc<dyn
/// SnapshotCapable>` for C11) be boxed into the facade without cloning it.
#[async_trait]
impl InverterDriver for std::sync::Arc<dyn InverterDriver> {
    async fn get_soc(&self) -> Result<f64> {
        (**self).get_soc().await
    }

    async fn get_stored_energy_wh(&self) -> Result<f64> {
        (**self).get_stored_energy_wh().await
    }

    async fn get_stored_usable_energy_wh(&self) -> Result<f64> {
        (**self).get_stored_usable_energy_wh().await
    }

    async fn get_capacity_wh(&self) -> Result<f64> {
        (**self).get_capacity_wh().await
    }

    async fn get_free_capacity_wh(&self) -> Result<f64> {
        (**self).get_free_capacity_wh().await
    }

    async fn get_max_capacity_wh(&self) -> Result<f64> {
        (**self).get_max_capacity_wh().await
    }

    async fn set_mode_force_charge(&self, charge_rate_w: f64) -> Result<()> {
        (**self).set_mode_force_charge(charge_rate_w).await
    }

    async fn set_mode_avoid_discharge(&self) -> Result<()> {
        (**self).set_mode_avoid_discharge().await
    }

    async fn set_mode_allow_discharge(&self) -> Result<()> {
        (**self).set_mode_allow_discharge().await
    }

    async fn set_mode_limit_battery_charge(&self, limit_rate_w: f64) -> Result<()> {
        (**self).set_mode_limit_battery_charge(limit_rate_w).await
    }
}

impl MockInverter {
    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("simulated read failure");
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("simulated write failure");
        }
        Ok(())
    }
}
