//! Progress tracking

use tokio::sync::Mutex;
use tracing::info;

use portprobe_common::{PortState, ScanStats};

pub struct ProgressTracker {
    stats: Mutex<ScanStats>,
    failed: Mutex<usize>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            stats: Mutex::new(ScanStats::default()),
            failed: Mutex::new(0),
        }
    }

    /// Start a new batch of `total` targets.
    pub async fn reset(&self, total: usize) {
        *self.stats.lock().await = ScanStats {
            total,
            ..Default::default()
        };
        *self.failed.lock().await = 0;
    }

    pub async fn record(&self, state: PortState) {
        let mut stats = self.stats.lock().await;
        match state {
            PortState::Open => stats.open += 1,
            PortState::Closed => stats.closed += 1,
            PortState::Filtered => stats.filtered += 1,
        }
    }

    /// A probe task that died without reporting a state.
    pub async fn increment_failed(&self) {
        *self.failed.lock().await += 1;
    }

    pub async fn snapshot(&self) -> ScanStats {
        *self.stats.lock().await
    }

    pub async fn failed(&self) -> usize {
        *self.failed.lock().await
    }

    pub async fn print_summary(&self) {
        let stats = self.snapshot().await;
        let failed = self.failed().await;
        let done = stats.open + stats.closed + stats.filtered;

        info!("Scan Summary:");
        info!("  Total targets: {}", stats.total);
        info!("  Open: {}", stats.open);
        info!("  Closed: {}", stats.closed);
        info!("  Filtered: {}", stats.filtered);
        if failed > 0 {
            info!("  Failed tasks: {}", failed);
        }
        if stats.total > 0 {
            info!("  Completed: {:.1}%", (done as f64 / stats.total as f64) * 100.0);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_per_state() {
        let progress = ProgressTracker::new();
        progress.reset(4).await;
        progress.record(PortState::Open).await;
        progress.record(PortState::Filtered).await;
        progress.record(PortState::Closed).await;
        progress.increment_failed().await;

        let stats = progress.snapshot().await;
        assert_eq!(stats.total, 4);
        assert_eq!((stats.open, stats.closed, stats.filtered), (1, 1, 1));
        assert_eq!(progress.failed().await, 1);

        progress.reset(2).await;
        assert_eq!(progress.snapshot().await.open, 0);
        assert_eq!(progress.failed().await, 0);
    }
}
