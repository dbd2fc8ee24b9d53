//! Persisted Pre-Control Snapshot (C11): saves the device's own
//! configuration (SOC limits, time-of-use schedule, grid-charging flag)
//! before the controller first touches it, so the values can be restored
//! on shutdown. The file is the sole source of truth for rollback; if it
//! is absent, no restore is attempted.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreControlSnapshot {
    pub soc_min_percent: f64,
    pub soc_max_percent: f64,
    pub time_of_use_schedule: serde_json::Value,
    pub grid_charging_enabled: bool,
}

/// Opt-in hook for a driver that can read/write its own persistent
/// configuration. Drivers with nothing to snapshot (the simulator) simply
/// don't implement it; the resilient facade only calls it when present.
#[async_trait::async_trait]
pub trait SnapshotCapable: Send + Sync {
    async fn read_snapshot(&self) -> Result<PreControlSnapshot>;
    async fn restore_snapshot(&self, snapshot: &PreControlSnapshot) -> Result<()>;
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub async fn load(&self) -> Result<Option<PreControlSnapshot>> {
        if !self.exists() {
            return Ok(None);
        }
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("reading pre-control snapshot at {}", self.path.display()))?;
        let snapshot: PreControlSnapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing pre-control snapshot at {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    pub async fn save(&self, snapshot: &PreControlSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .with_context(|| format!("writing pre-control snapshot to {}", self.path.display()))
    }

    /// Captures the device's current configuration exactly once, the first
    /// time the controller ever runs against it. No-op if a snapshot is
    /// already on disk.
    pub async fn capture_if_absent(&self, driver: &dyn SnapshotCapable) -> Result<()> {
        if self.exists() {
            return Ok(());
        }
        let snapshot = driver.read_snapshot().await?;
        self.save(&snapshot).await?;
        info!(path = %self.path.display(), "captured pre-control snapshot");
        Ok(())
    }

    /// Restores the saved configuration on shutdown. Logs and returns
    /// without failing the caller if the restore itself errors, so a
    /// broken rollback never blocks process exit.
    pub async fn restore_on_shutdown(&self, driver: &dyn SnapshotCapable) {
        match self.load().await {
            Ok(Some(snapshot)) => {
                if let Err(e) = driver.restore_snapshot(&snapshot).await {
                    warn!(error = %e, "failed to restore pre-control snapshot, leaving device as-is");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to load pre-control snapshot for restore"),
        }
    }
}

pub fn default_snapshot_path(state_dir: &Path) -> PathBuf {
    state_dir.join("pre_control_snapshot.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeDriver {
        restored: AtomicBool,
    }

    #[async_trait::async_trait]
    impl SnapshotCapable for FakeDriver {
        async fn read_snapshot(&self) -> Result<PreControlSnapshot> {
            Ok(PreControlSnapshot {
                soc_min_percent: 10.0,
                soc_max_percent: 95.0,
                time_of_use_schedule: serde_json::json!({}),
                grid_charging_enabled: false,
            })
        }

        async fn restore_snapshot(&self, _snapshot: &PreControlSnapshot) -> Result<()> {
            self.restored.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn capture_is_idempotent() {
        let dir = tempdir();
        let store = SnapshotStore::new(dir.join("snap.json"));
        let driver = FakeDriver { restored: AtomicBool::new(false) };
        assert!(!store.exists());
        store.capture_if_absent(&driver).await.unwrap();
        assert!(store.exists());
        let first_bytes = tokio::fs::read(dir.join("snap.json")).await.unwrap();
        store.capture_if_absent(&driver).await.unwrap();
        let second_bytes = tokio::fs::read(dir.join("snap.json")).await.unwrap();
        assert_eq!(first_bytes, second_bytes);
    }

    #[tokio::test]
    async fn restore_noop_when_no_snapshot_present() {
        let dir = tempdir();
        let store = SnapshotStore::new(dir.join("missing.json"));
        let driver = FakeDriver { restored: AtomicBool::new(false) };
        store.restore_on_shutdown(&driver).await;
        assert!(!driver.restored.load(Ordering::SeqCst));
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("oec-snapshot-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
