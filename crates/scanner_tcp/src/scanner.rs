// crates/scanner_tcp/src/scanner.rs
//! TCP connect scanner implementation

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

use portprobe_common::{PortState, Scanner, Target};

/// Full-handshake scanner. Needs no privileges and can only tell open from
/// not-open: refused and timed-out dials both leave the target closed.
pub struct TcpScanner {
    timeout: Duration,
}

impl TcpScanner {
    /// Create a new scanner with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dial timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[instrument(skip(self), level = "trace")]
    async fn try_connect(&self, addr: SocketAddr) -> std::io::Result<TcpStream> {
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(result) => result,
            Err(_) => Err(std::io::ErrorKind::TimedOut.into()),
        }
    }
}

impl Default for TcpScanner {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
        }
    }
}

#[async_trait]
impl Scanner for TcpScanner {
    async fn scan(&self, _index: usize, target: &Target) -> PortState {
        let Some(port) = target.port else {
            return PortState::Closed;
        };
        let addr = SocketAddr::new(target.ip, port);

        match self.try_connect(addr).await {
            // The stream drops here, closing the connection.
            Ok(_stream) => PortState::Open,
            Err(e) => {
                debug!("failed to dial {}: {}", addr, e);
                PortState::Closed
            }
        }
    }

    fn name(&self) -> &str {
        "TCP Connect Scanner"
    }
}
