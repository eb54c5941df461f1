/// Snapshot store: the latest published workspace snapshot plus scan
/// metadata, swapped as a whole under a write lock.
///
/// The background scan loop is the only writer. Readers clone the current
/// `Arc` and release the lock immediately, so they always see one complete
/// cycle and never block a scan in progress.
use crate::scan::WorkspaceSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// States of the background scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    Scanning,
    Publishing,
}

impl ScanPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ScanPhase::Scanning,
            2 => ScanPhase::Publishing,
            _ => ScanPhase::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ScanPhase::Idle => 0,
            ScanPhase::Scanning => 1,
            ScanPhase::Publishing => 2,
        }
    }
}

/// One published cycle: the snapshot and the metadata that belongs to it.
#[derive(Debug, Clone, Default)]
pub struct Published {
    pub snapshot: WorkspaceSnapshot,
    /// Wall time of the cycle that produced `snapshot`.
    pub last_duration: Duration,
    /// Sub-scan errors over the whole process lifetime. Never reset.
    pub scan_errors_total: u64,
    /// Completed cycles so far.
    pub cycles: u64,
    /// When `snapshot` was published; `None` before the first cycle.
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Arc<Published>>,
    phase: AtomicU8,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently published cycle.
    pub async fn current(&self) -> Arc<Published> {
        Arc::clone(&*self.current.read().await)
    }

    /// Replace the published cycle, folding this cycle's error count into
    /// the lifetime counter.
    pub async fn publish(&self, snapshot: WorkspaceSnapshot, duration: Duration) {
        let mut current = self.current.write().await;
        let next = Published {
            scan_errors_total: current.scan_errors_total + snapshot.error_count,
            cycles: current.cycles + 1,
            last_duration: duration,
            completed_at: Some(Utc::now()),
            snapshot,
        };
        *current = Arc::new(next);
    }

    pub fn phase(&self) -> ScanPhase {
        ScanPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set_phase(&self, phase: ScanPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }
}
