//! Cross-product of addresses and ports into a capped target list

use std::net::IpAddr;

use portprobe_common::{Protocol, Target, MAX_TARGETS};

/// Build targets in row-major order (addresses outer, ports inner).
///
/// ICMP gets one target per address and ignores `ports`. Generation stops as
/// soon as `MAX_TARGETS` targets exist, even in the middle of an address, and
/// `addresses` is not read any further.
pub fn generate_targets<I>(addresses: I, ports: &[u16], protocol: Protocol) -> Vec<Target>
where
    I: IntoIterator<Item = IpAddr>,
{
    if protocol.uses_ports() && ports.is_empty() {
        return Vec::new();
    }
    let mut targets = Vec::new();

    'outer: for ip in addresses {
        if !protocol.uses_ports() {
            if targets.len() >= MAX_TARGETS {
                break;
            }
            targets.push(Target::new(protocol, ip, None));
            continue;
        }
        for &port in ports {
            if targets.len() >= MAX_TARGETS {
                break 'outer;
            }
            targets.push(Target::new(protocol, ip, Some(port)));
        }
    }
    targets
}
