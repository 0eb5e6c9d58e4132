//! UDP scanner implementation

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use portprobe_common::{PortState, Scanner, Target};

/// Sends a fixed payload on a connected datagram socket and classifies by
/// what comes back:
/// - any datagram: open
/// - nothing before the deadline: filtered
/// - a receive error (port unreachable surfaced by the stack): closed
///
/// A service that silently drops unsolicited input reads as filtered.
pub struct UdpScanner {
    timeout: Duration,
    payload: Vec<u8>,
}

impl UdpScanner {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            timeout: Duration::from_millis(500),
            payload,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn probe(&self, addr: SocketAddr) -> std::io::Result<PortState> {
        let local: SocketAddr = match addr.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;
        socket.send(&self.payload).await?;

        let mut buf = [0u8; 256];
        match timeout(self.timeout, socket.recv(&mut buf)).await {
            Ok(Ok(n)) => {
                debug!("read {} bytes from {}", n, addr);
                Ok(PortState::Open)
            }
            Ok(Err(e)) => {
                debug!("failed to read (udp) from {}: {}", addr, e);
                Ok(PortState::Closed)
            }
            Err(_) => {
                debug!("reading timed out, {} filtered", addr);
                Ok(PortState::Filtered)
            }
        }
    }
}

impl Default for UdpScanner {
    fn default() -> Self {
        Self::new(b"ls\n".to_vec())
    }
}

#[async_trait]
impl Scanner for UdpScanner {
    async fn scan(&self, _index: usize, target: &Target) -> PortState {
        let Some(port) = target.port else {
            return PortState::Closed;
        };
        let addr = SocketAddr::new(target.ip, port);

        self.probe(addr).await.unwrap_or_else(|e| {
            debug!("failed to probe (udp) {}: {}", addr, e);
            PortState::Closed
        })
    }

    fn name(&self) -> &str {
        "UDP Scanner"
    }
}
