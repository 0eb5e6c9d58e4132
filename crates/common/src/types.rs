//! Core data types for the portprobe engine
//!
//! - `Target` is both the unit of work and the place its result lands
//! - `ScanOptions` carries every tunable into the engines by value
//! - small helpers are `#[inline]` since they sit in per-probe paths

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::PortprobeError;

/// Hard cap on the number of targets in one batch.
pub const MAX_TARGETS: usize = 10_000;

/// Supported probe protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        }
    }

    /// Whether targets of this protocol carry a port.
    #[inline]
    #[must_use]
    pub const fn uses_ports(&self) -> bool {
        !matches!(self, Protocol::Icmp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = PortprobeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "icmp" => Ok(Protocol::Icmp),
            other => Err(PortprobeError::Config(format!("unsupported protocol '{}'", other))),
        }
    }
}

/// Tri-state classification of a target. `Closed` is the initial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    #[default]
    Closed,
    Open,
    Filtered,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortState::Closed => "closed",
            PortState::Open => "open",
            PortState::Filtered => "filtered",
        };
        f.write_str(s)
    }
}

/// Single probe target (protocol + address + optional port) with its result.
///
/// `port` is `None` for ICMP targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub protocol: Protocol,
    pub ip: IpAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub state: PortState,
    #[serde(skip)]
    resolved: bool,
}

impl Target {
    #[inline]
    #[must_use]
    pub fn new(protocol: Protocol, ip: IpAddr, port: Option<u16>) -> Self {
        Self {
            protocol,
            ip,
            port,
            state: PortState::Closed,
            resolved: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn tcp(ip: IpAddr, port: u16) -> Self {
        Self::new(Protocol::Tcp, ip, Some(port))
    }

    #[inline]
    #[must_use]
    pub fn udp(ip: IpAddr, port: u16) -> Self {
        Self::new(Protocol::Udp, ip, Some(port))
    }

    #[inline]
    #[must_use]
    pub fn icmp(ip: IpAddr) -> Self {
        Self::new(Protocol::Icmp, ip, None)
    }

    /// Record the probe outcome. Only the first call takes effect.
    ///
    /// Returns `false` when the slot had already been resolved.
    #[inline]
    pub fn resolve(&mut self, state: PortState) -> bool {
        if self.resolved {
            return false;
        }
        self.state = state;
        self.resolved = true;
        true
    }

    #[inline]
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolved
    }

    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, PortState::Open)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{} {}", self.protocol, std::net::SocketAddr::new(self.ip, port)),
            None => write!(f, "{} {}", self.protocol, self.ip),
        }
    }
}

/// How TCP targets are probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TcpStrategy {
    /// SYN scan when raw sockets are available, connect scan otherwise.
    #[default]
    Auto,
    Connect,
    Syn,
}

impl FromStr for TcpStrategy {
    type Err = PortprobeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(TcpStrategy::Auto),
            "connect" => Ok(TcpStrategy::Connect),
            "syn" => Ok(TcpStrategy::Syn),
            other => Err(PortprobeError::Config(format!("unknown tcp strategy '{}'", other))),
        }
    }
}

/// Scan behaviour tuning options.
///
/// Payload signatures live here rather than in globals so that concurrent
/// batches can run with different ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub connect_timeout: Duration,
    pub syn_timeout: Duration,
    pub udp_timeout: Duration,
    /// Global deadline of an ICMP batch.
    pub icmp_deadline: Duration,
    pub max_in_flight: usize,
    pub rate_limit: Option<u32>, // probes per second
    pub tcp_strategy: TcpStrategy,
    pub udp_payload: Vec<u8>,
    pub icmp_signature: Vec<u8>,
    pub icmp_identifier: u16,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
            syn_timeout: Duration::from_millis(500),
            udp_timeout: Duration::from_millis(500),
            icmp_deadline: Duration::from_secs(3),
            max_in_flight: 1024,
            rate_limit: None,
            tcp_strategy: TcpStrategy::Auto,
            udp_payload: b"ls\n".to_vec(),
            icmp_signature: b"PortScanner".to_vec(),
            icmp_identifier: 0x3333,
        }
    }
}

impl ScanOptions {
    /// Fast preset: short timeouts, high concurrency.
    #[inline]
    #[must_use]
    pub fn fast() -> Self {
        Self {
            connect_timeout: Duration::from_millis(300),
            syn_timeout: Duration::from_millis(300),
            udp_timeout: Duration::from_millis(300),
            icmp_deadline: Duration::from_secs(2),
            max_in_flight: 4096,
            ..Self::default()
        }
    }

    /// Accurate preset: longer waits for slow or distant hosts.
    #[inline]
    #[must_use]
    pub fn accurate() -> Self {
        Self {
            connect_timeout: Duration::from_millis(1500),
            syn_timeout: Duration::from_millis(1500),
            udp_timeout: Duration::from_millis(1000),
            icmp_deadline: Duration::from_secs(5),
            max_in_flight: 512,
            ..Self::default()
        }
    }

    /// Stealth preset: low concurrency and an explicit rate limit.
    #[inline]
    #[must_use]
    pub fn stealth() -> Self {
        Self {
            max_in_flight: 64,
            rate_limit: Some(100),
            tcp_strategy: TcpStrategy::Syn,
            ..Self::default()
        }
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Result<Self, PortprobeError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "balanced" | "default" => Ok(Self::default()),
            "fast" => Ok(Self::fast()),
            "accurate" => Ok(Self::accurate()),
            "stealth" => Ok(Self::stealth()),
            other => Err(PortprobeError::Config(format!("unknown preset '{}'", other))),
        }
    }

    /// Reject option combinations the engines cannot run with.
    pub fn validate(&self) -> Result<(), PortprobeError> {
        if self.max_in_flight == 0 {
            return Err(PortprobeError::Config("max_in_flight must be at least 1".into()));
        }
        if self.rate_limit == Some(0) {
            return Err(PortprobeError::Config("rate_limit must be positive".into()));
        }
        if self.udp_payload.is_empty() {
            return Err(PortprobeError::Config("udp payload must not be empty".into()));
        }
        if self.icmp_signature.is_empty() {
            return Err(PortprobeError::Config("icmp signature must not be empty".into()));
        }
        Ok(())
    }
}

/// Per-state counts over a resolved batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub filtered: usize,
}

impl ScanStats {
    #[must_use]
    pub fn from_targets(targets: &[Target]) -> Self {
        let mut stats = Self {
            total: targets.len(),
            ..Default::default()
        };
        for t in targets {
            match t.state {
                PortState::Open => stats.open += 1,
                PortState::Closed => stats.closed += 1,
                PortState::Filtered => stats.filtered += 1,
            }
        }
        stats
    }
}
