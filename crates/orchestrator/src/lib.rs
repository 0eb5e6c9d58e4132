//! Orchestrator - capability detection, bounded fan-out and result collection

mod capabilities;
mod orchestrator;
mod progress;

pub use capabilities::Capabilities;
pub use orchestrator::Orchestrator;
pub use progress::ProgressTracker;
pub use portprobe_common::RateLimiter;
