//! Address specification parsing and CIDR expansion

use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use portprobe_common::ParseError;

/// Largest CIDR block (in host bits) that will be enumerated.
pub const MAX_BLOCK_HOST_BITS: u8 = 24;

/// Most addresses `parse_addresses` will collect across all segments.
pub const MAX_COLLECTED_ADDRESSES: u128 = 1 << 24;

/// A validated address specification: one network per segment, singles
/// stored as host-length prefixes. Addresses are only produced on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpec {
    blocks: Vec<IpNet>,
}

impl AddressSpec {
    /// Validate every segment without enumerating any block.
    pub fn parse(spec: &str) -> Result<Self, ParseError> {
        if spec.trim().is_empty() {
            return Err(ParseError::EmptyResult("addresses"));
        }

        let mut blocks = Vec::new();
        for segment in spec.split(',').map(str::trim) {
            match segment.matches('/').count() {
                0 => blocks.push(IpNet::from(parse_single(segment)?)),
                1 => blocks.push(parse_block(segment)?),
                _ => return Err(ParseError::InvalidFormat(segment.to_string())),
            }
        }
        Ok(Self { blocks })
    }

    /// Number of addresses the spec expands to.
    pub fn len(&self) -> u128 {
        self.blocks
            .iter()
            .map(|net| 1u128 << (net.max_prefix_len() - net.prefix_len()))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Addresses in segment order, each block ascending.
    pub fn iter(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.blocks.iter().flat_map(|net| BlockAddresses::new(*net))
    }
}

/// Parse a comma-separated list of addresses and CIDR blocks.
///
/// Segment order is preserved and CIDR blocks expand in ascending order,
/// network and broadcast addresses included. The whole list is collected,
/// so specs expanding past `MAX_COLLECTED_ADDRESSES` are rejected; use
/// `AddressSpec::iter` to walk larger ones lazily.
pub fn parse_addresses(spec: &str) -> Result<Vec<IpAddr>, ParseError> {
    let parsed = AddressSpec::parse(spec)?;
    let total = parsed.len();
    if total > MAX_COLLECTED_ADDRESSES {
        return Err(ParseError::range(
            spec.trim(),
            format!(
                "spans {} addresses, limit is {}",
                total, MAX_COLLECTED_ADDRESSES
            ),
        ));
    }
    Ok(parsed.iter().collect())
}

fn parse_single(segment: &str) -> Result<IpAddr, ParseError> {
    if segment.is_empty() {
        return Err(ParseError::InvalidFormat("empty segment".into()));
    }
    segment
        .parse::<IpAddr>()
        .map_err(|_| ParseError::InvalidAddress(segment.to_string()))
}

fn parse_block(segment: &str) -> Result<IpNet, ParseError> {
    let net: IpNet = segment
        .parse()
        .map_err(|_| ParseError::range(segment, "malformed CIDR block"))?;

    let host_bits = net.max_prefix_len() - net.prefix_len();
    if host_bits > MAX_BLOCK_HOST_BITS {
        return Err(ParseError::range(
            segment,
            format!(
                "block spans 2^{} addresses, limit is 2^{}",
                host_bits, MAX_BLOCK_HOST_BITS
            ),
        ));
    }
    Ok(net)
}

/// Walks a block from its masked base address, incrementing with carry
/// while the address stays inside the network.
struct BlockAddresses {
    net: IpNet,
    next: Option<IpAddr>,
}

impl BlockAddresses {
    fn new(net: IpNet) -> Self {
        Self {
            net,
            next: Some(net.network()),
        }
    }
}

impl Iterator for BlockAddresses {
    type Item = IpAddr;

    fn next(&mut self) -> Option<IpAddr> {
        let ip = self.next.take()?;
        if !self.net.contains(&ip) {
            return None;
        }
        self.next = successor(ip);
        Some(ip)
    }
}

fn successor(ip: IpAddr) -> Option<IpAddr> {
    match ip {
        IpAddr::V4(ip) => {
            let mut octets = ip.octets();
            increment(&mut octets).then(|| IpAddr::V4(Ipv4Addr::from(octets)))
        }
        IpAddr::V6(ip) => {
            let mut octets = ip.octets();
            increment(&mut octets).then(|| IpAddr::V6(Ipv6Addr::from(octets)))
        }
    }
}

/// Big-endian increment. Returns `false` when the value wrapped past the
/// top of the address space.
fn increment(octets: &mut [u8]) -> bool {
    for byte in octets.iter_mut().rev() {
        let (next, overflow) = byte.overflowing_add(1);
        *byte = next;
        if !overflow {
            return true;
        }
    }
    false
}
