//! Core traits for portprobe scanner components
//!
//! Two seams:
//! - `Scanner`: one independent probe per target, fanned out by the coordinator
//! - `BatchScanner`: engines that must see the whole batch at once because
//!   replies arrive on one shared socket and are correlated back by index

use crate::error::PortprobeResult;
use crate::types::{PortState, Target};
use async_trait::async_trait;

/// Per-target scanner. Implementations never fail: every outcome is a state.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Probe a single target. `index` is the target's slot in the batch.
    async fn scan(&self, index: usize, target: &Target) -> PortState;

    /// Scanner name/identifier
    fn name(&self) -> &str;

    /// Whether this scanner requires root/CAP_NET_RAW
    fn requires_root(&self) -> bool {
        false
    }
}

/// Whole-batch scanner for connectionless, shared-socket protocols.
#[async_trait]
pub trait BatchScanner: Send + Sync {
    /// Resolve every target. The returned states line up with `targets`.
    ///
    /// Only failures that make the whole batch impossible are errors.
    async fn scan_batch(&self, targets: &[Target]) -> PortprobeResult<Vec<PortState>>;

    fn name(&self) -> &str;

    fn requires_root(&self) -> bool {
        true
    }
}
