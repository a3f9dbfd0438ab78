//! State snapshot persistence with atomic file writes.
//!
//! A snapshot captures the position books, the PnL logs and the order
//! ledger so a restart can reconcile against what was tracked before the
//! crash instead of starting from ghost state.
//!
//! # Safety
//! - Uses atomic file writes (write to temp, fsync, rename) for durability

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::orders::{Order, OrderLedger};
use crate::pnl::{PnlCalculator, RealizedPnlRecord, UnrealizedMark};
use crate::positions::{PositionAccountingEngine, PositionSummary};

/// Point-in-time capture of the subsystem's persistent state.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct StateSnapshot {
    pub captured_at: Option<DateTime<Utc>>,
    pub positions: Vec<PositionSummary>,
    pub realized: Vec<RealizedPnlRecord>,
    pub unrealized: Vec<UnrealizedMark>,
    pub orders: Vec<Order>,
}

impl StateSnapshot {
    /// Capture the live state of the shared ledgers.
    pub async fn capture(
        ledger: &OrderLedger,
        positions: &PositionAccountingEngine,
        pnl: &PnlCalculator,
    ) -> Self {
        Self {
            captured_at: Some(Utc::now()),
            positions: positions.summaries().await,
            realized: pnl.realized_records().await,
            unrealized: pnl.unrealized_marks().await,
            orders: ledger.snapshot().await,
        }
    }
}

/// Writes and reads snapshots at a fixed path.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the last saved snapshot, returning an empty one if the file
    /// does not exist or is corrupted.
    pub fn load(&self) -> StateSnapshot {
        match fs::read_to_string(&self.path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Corrupt snapshot, starting empty");
                    StateSnapshot::default()
                }
            },
            Err(_) => StateSnapshot::default(),
        }
    }

    /// Persist a snapshot atomically.
    ///
    /// 1. Write to a temporary file next to the target
    /// 2. Sync to disk (fsync)
    /// 3. Atomic rename (POSIX guarantees atomicity on the same filesystem)
    ///
    /// A crash at any point leaves either the old file or the new file,
    /// never a partial one.
    pub fn save(&self, snapshot: &StateSnapshot) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let temp_path = self.temp_path();

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        fs::rename(&temp_path, &self.path)?;
        info!(
            path = %self.path.display(),
            positions = snapshot.positions.len(),
            orders = snapshot.orders.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(".tmp");
        PathBuf::from(p)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::WallClockCalendar;
    use crate::orders::OrderId;
    use crate::positions::Execution;
    use crate::types::{Direction, Offset};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));

        let ledger = OrderLedger::default();
        let positions = PositionAccountingEngine::new(Arc::new(WallClockCalendar));
        let pnl = PnlCalculator::new(Arc::new(PositionAccountingEngine::new(Arc::new(
            WallClockCalendar,
        ))));

        ledger
            .submit(Order::new(
                OrderId::new("ord-1"),
                "IC2509".to_string(),
                Direction::Long,
                Offset::Open,
                dec!(5000),
                3,
            ))
            .await
            .unwrap();
        positions
            .apply_fill(&Execution {
                symbol: "IC2509".to_string(),
                direction: Direction::Long,
                offset: Offset::Open,
                price: dec!(5000),
                qty: 3,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        let snapshot = StateSnapshot::capture(&ledger, &positions, &pnl).await;
        store.save(&snapshot).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.orders.len(), 1);
        assert_eq!(loaded.positions.len(), 1);
        assert_eq!(loaded.positions[0].qty, 3);
        assert!(loaded.captured_at.is_some());
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        let loaded = store.load();
        assert!(loaded.orders.is_empty());
        assert!(loaded.captured_at.is_none());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json {").unwrap();
        let loaded = SnapshotStore::new(path).load();
        assert!(loaded.positions.is_empty());
    }
}
