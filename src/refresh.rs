/// Background scan loop: scan the workspace on a fixed period and publish
/// each finished snapshot to the store.
///
/// The first scan runs immediately. Scans never overlap: a slow cycle
/// delays the next tick instead of starting a second scan.
use crate::metrics::LatencyHistogram;
use crate::scan::{ScanContext, WorkspaceScanner, WorkspaceSnapshot};
use crate::store::{ScanPhase, SnapshotStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Latency histogram operation label for a scan cycle.
pub const SCAN_OPERATION: &str = "openclaw_scan";

/// Timing of the scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSchedule {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ScanSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Everything one scan cycle needs, shared with the loop's task.
#[derive(Debug, Clone)]
pub struct Refresher {
    scanner: Arc<WorkspaceScanner>,
    store: Arc<SnapshotStore>,
    latency: Arc<LatencyHistogram>,
    schedule: ScanSchedule,
}

impl Refresher {
    pub fn new(
        scanner: WorkspaceScanner,
        store: Arc<SnapshotStore>,
        latency: Arc<LatencyHistogram>,
        schedule: ScanSchedule,
    ) -> Self {
        Self {
            scanner: Arc::new(scanner),
            store,
            latency,
            schedule,
        }
    }

    /// Run until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.schedule.interval.as_secs_f64(),
            timeout_secs = self.schedule.timeout.as_secs_f64(),
            workspace = %self.scanner.workspace().root().display(),
            "background scan loop started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.refresh_once(&shutdown).await;
        }

        tracing::info!("background scan loop stopped");
    }

    /// One cycle: scan on the blocking pool, then publish.
    pub async fn refresh_once(&self, shutdown: &CancellationToken) {
        self.store.set_phase(ScanPhase::Scanning);

        let ctx = ScanContext::new(self.schedule.timeout, shutdown.clone());
        let scanner = Arc::clone(&self.scanner);
        let start = Instant::now();
        let snapshot = match tokio::task::spawn_blocking(move || scanner.scan(&ctx)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "workspace scan task failed");
                WorkspaceSnapshot::failed()
            }
        };
        let elapsed = start.elapsed();

        self.store.set_phase(ScanPhase::Publishing);
        let errors = snapshot.error_count;
        self.store.publish(snapshot, elapsed).await;
        self.latency.observe(SCAN_OPERATION, elapsed);
        self.store.set_phase(ScanPhase::Idle);

        if errors > 0 {
            tracing::warn!(errors, elapsed_ms = elapsed.as_millis() as u64, "scan cycle degraded");
        } else {
            tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "scan cycle complete");
        }
    }
}
