//! Target Resolver - address/port specification parsing and target generation
//!
//! Turns the request fields of a scan (protocol, address spec, port spec)
//! into an ordered, capped list of `Target`s. Supported address segments:
//! - single address: "1.2.3.4" or "2001:db8::1"
//! - CIDR block: "192.168.1.0/24"
//!
//! Port segments are single ports ("80") or inclusive ranges ("8000-8010").

mod address;
mod generator;
mod ports;

pub use address::{parse_addresses, AddressSpec, MAX_BLOCK_HOST_BITS, MAX_COLLECTED_ADDRESSES};
pub use generator::generate_targets;
pub use ports::parse_ports;

use portprobe_common::{ParseError, Protocol, Target};

pub struct TargetResolver;

impl TargetResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the request fields into targets.
    ///
    /// The port spec is required for TCP and UDP and ignored for ICMP.
    /// Addresses are walked lazily, so only as much of the address spec is
    /// enumerated as the target cap allows.
    pub fn resolve(
        &self,
        protocol: Protocol,
        addresses: &str,
        ports: Option<&str>,
    ) -> Result<Vec<Target>, ParseError> {
        let spec = AddressSpec::parse(addresses)?;
        let port_list = if protocol.uses_ports() {
            parse_ports(ports.unwrap_or(""))?
        } else {
            Vec::new()
        };
        Ok(generate_targets(spec.iter(), &port_list, protocol))
    }
}

impl Default for TargetResolver {
    fn default() -> Self {
        Self::new()
    }
}
