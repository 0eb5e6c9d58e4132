//! portprobe common - shared types and traits
//!
//! This crate provides the data model, error taxonomy and scanner traits
//! used across the portprobe workspace.

pub mod error;
pub mod rate_limiter;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{ParseError, PortprobeError, PortprobeResult};
pub use rate_limiter::RateLimiter;
pub use traits::{BatchScanner, Scanner};
pub use types::{
    PortState, Protocol, ScanOptions, ScanStats, Target, TcpStrategy, MAX_TARGETS,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
