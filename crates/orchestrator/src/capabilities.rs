//! Raw-socket capability detection

use serde::Serialize;
use tracing::warn;

use portprobe_common::TcpStrategy;

/// What this process may do on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Raw IPv4 TCP sockets, needed for SYN scans.
    pub raw_tcp: bool,
    /// Raw ICMPv4 sockets, needed for echo scans.
    pub raw_icmp: bool,
}

impl Capabilities {
    /// Probe the OS by trying to open each kind of raw socket.
    pub fn detect() -> Self {
        Self {
            raw_tcp: portprobe_scanner_syn::raw_sockets_available(),
            raw_icmp: portprobe_scanner_icmp::icmp_available(),
        }
    }

    pub const fn unprivileged() -> Self {
        Self {
            raw_tcp: false,
            raw_icmp: false,
        }
    }

    pub const fn privileged() -> Self {
        Self {
            raw_tcp: true,
            raw_icmp: true,
        }
    }

    /// Settle a requested TCP strategy to `Connect` or `Syn`.
    pub fn tcp_strategy(&self, requested: TcpStrategy) -> TcpStrategy {
        match (requested, self.raw_tcp) {
            (TcpStrategy::Connect, _) => TcpStrategy::Connect,
            (TcpStrategy::Auto, true) | (TcpStrategy::Syn, true) => TcpStrategy::Syn,
            (TcpStrategy::Auto, false) => TcpStrategy::Connect,
            (TcpStrategy::Syn, false) => {
                warn!("SYN scan needs raw sockets (root or CAP_NET_RAW); using connect scan");
                TcpStrategy::Connect
            }
        }
    }
}
