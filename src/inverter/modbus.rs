//! Modbus TCP inverter driver (feature `modbus`). A thin generic register
//! map covering the fields `InverterDriver` needs; kept to one layout
//! rather than a per-vendor map since the decision engine only needs
//! SoC/energy/power, not vendor-specific telemetry.
#![cfg(feature = "modbus")]
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_modbus::client::tcp;
use tokio_modbus::prelude::*;

use crate::inverter::driver::InverterDriver;
use crate::inverter::snapshot::{PreControlSnapshot, SnapshotCapable};

const REG_SOC_PERCENT: u16 = 0; // scale 0.1 %
const REG_STORED_ENERGY_WH: u16 = 2; // scale 1 Wh, two registers (u32)
const REG_MAX_CAPACITY_WH: u16 = 4; // scale 1 Wh, two registers (u32)
const REG_POWER_COMMAND: u16 = 6; // signed, scale 1 W, positive = charge
const REG_SOC_MIN_LIMIT: u16 = 8; // scale 0.1 %, device-native discharge floor
const REG_SOC_MAX_LIMIT: u16 = 10; // scale 0.1 %, device-native charge ceiling
const REG_GRID_CHARGE_ENABLED: u16 = 12; // 0/1

fn u32_from_regs(regs: &[u16]) -> u32 {
    ((regs[0] as u32) << 16) | regs[1] as u32
}

struct ModbusClient {
    context: Mutex<tokio_modbus::client::Context>,
    unit_id: u8,
}

impl ModbusClient {
    async fn connect(addr: &str, unit_id: u8) -> Result<Self> {
        let socket_addr = addr.parse().context("invalid modbus address")?;
        let ctx = tcp::connect(socket_addr).await.context("failed to connect to modbus inverter")?;
        Ok(Self { context: Mutex::new(ctx), unit_id })
    }

    async fn read_holding_registers(&self, start: u16, count: u16) -> Result<Vec<u16>> {
        let mut ctx = self.context.lock().await;
        ctx.set_slave(Slave(self.unit_id));
        Ok(ctx.read_holding_registers(start, count).await?)
    }

    async fn write_single_register(&self, addr: u16, value: u16) -> Result<()> {
        let mut ctx = self.context.lock().await;
        ctx.set_slave(Slave(self.unit_id));
        ctx.write_single_register(addr, value).await?;
        Ok(())
    }
}

/// Holds a single persistent TCP connection, opened once at startup.
/// Reconnecting per tick would exhaust ephemeral ports under sustained
/// polling, so this is constructed once and shared via `Arc`.
pub struct ModbusInverter {
    client: Arc<ModbusClient>,
}

impl ModbusInverter {
    pub async fn connect(address: &str, port: u16, unit_id: u8) -> Result<Self> {
        let addr = format!("{address}:{port}");
        let client = ModbusClient::connect(&addr, unit_id).await?;
        Ok(Self { client: Arc::new(client) })
    }
}

#[async_trait]
impl InverterDriver for ModbusInverter {
    async fn get_soc(&self) -> Result<f64> {
        let regs = self.client.read_holding_registers(REG_SOC_PERCENT, 1).await?;
        Ok(regs[0] as f64 * 0.1)
    }

    async fn get_stored_energy_wh(&self) -> Result<f64> {
        let regs = self.client.read_holding_registers(REG_STORED_ENERGY_WH, 2).await?;
        Ok(u32_from_regs(&regs) as f64)
    }

    async fn get_stored_usable_energy_wh(&self) -> Result<f64> {
        self.get_stored_energy_wh().await
    }

    async fn get_capacity_wh(&self) -> Result<f64> {
        self.get_max_capacity_wh().await
    }

    async fn get_free_capacity_wh(&self) -> Result<f64> {
        let max = self.get_max_capacity_wh().await?;
        let stored = self.get_stored_energy_wh().await?;
        Ok((max - stored).max(0.0))
    }

    async fn get_max_capacity_wh(&self) -> Result<f64> {
        let regs = self.client.read_holding_registers(REG_MAX_CAPACITY_WH, 2).await?;
        Ok(u32_from_regs(&regs) as f64)
    }

    async fn set_mode_force_charge(&self, charge_rate_w: f64) -> Result<()> {
        self.write_power_command(charge_rate_w).await
    }

    async fn set_mode_avoid_discharge(&self) -> Result<()> {
        self.write_power_command(0.0).await
    }

    async fn set_mode_allow_discharge(&self) -> Result<()> {
        // Unconstrained discharge is represented on the wire as 0 (no forced
        // command); the inverter's own self-consumption logic takes over.
        self.write_power_command(0.0).await
    }

    async fn set_mode_limit_battery_charge(&self, limit_rate_w: f64) -> Result<()> {
        self.write_power_command(limit_rate_w).await
    }
}

impl ModbusInverter {
    async fn write_power_command(&self, watts: f64) -> Result<()> {
        // Integer overflow would wrap the signed register and silently
        // reverse charge/discharge polarity; clamp before casting.
        let clamped = watts.clamp(i16::MIN as f64, i16::MAX as f64);
        self.client.write_single_register(REG_POWER_COMMAND, clamped as i16 as u16).await
    }
}

/// The device's own SoC limits and grid-charging flag live in registers
/// this driver can read back out; the generic register map here has no
/// time-of-use schedule, so that field is always restored as `null`.
#[async_trait]
impl SnapshotCapable for ModbusInverter {
    async fn read_snapshot(&self) -> Result<PreControlSnapshot> {
        let min = self.client.read_holding_registers(REG_SOC_MIN_LIMIT, 1).await?;
        let max = self.client.read_holding_registers(REG_SOC_MAX_LIMIT, 1).await?;
        let grid = self.client.read_holding_registers(REG_GRID_CHARGE_ENABLED, 1).await?;
        Ok(PreControlSnapshot {
            soc_min_percent: min[0] as f64 * 0.1,
            soc_max_percent: max[0] as f64 * 0.1,
            time_of_use_schedule: serde_json::Value::Null,
            grid_charging_enabled: grid[0] != 0,
        })
    }

    async fn restore_snapshot(&self, snapshot: &PreControlSnapshot) -> Result<()> {
        self.client.write_single_register(REG_SOC_MIN_LIMIT, (snapshot.soc_min_percent * 10.0).round() as u16).await?;
        self.client.write_single_register(REG_SOC_MAX_LIMIT, (snapshot.soc_max_percent * 10.0).round() as u16).await?;
        self.client
            .write_single_register(REG_GRID_CHARGE_ENABLED, snapshot.grid_charging_enabled as u16)
            .await
    }
}
