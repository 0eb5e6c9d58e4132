//! ICMP echo request building and inbound packet splitting

use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{IcmpCode, IcmpTypes};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::util::checksum;
use pnet_packet::Packet;
use std::net::Ipv4Addr;

/// Echo request with the given identifier, sequence number and payload.
pub fn build_echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; MutableEchoRequestPacket::minimum_packet_size() + payload.len()];
    if let Some(mut packet) = MutableEchoRequestPacket::new(&mut buf) {
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
        packet.set_payload(payload);
        // Checksum word is the second 16-bit word of the header.
        let sum = checksum(packet.packet(), 1);
        packet.set_checksum(sum);
    }
    buf
}

/// Source address and ICMP message of a raw IPv4 packet.
///
/// Raw ICMP sockets hand back the IP header along with the message.
pub fn split_ipv4(packet: &[u8]) -> Option<(Ipv4Addr, &[u8])> {
    let ip = Ipv4Packet::new(packet)?;
    if ip.get_version() != 4 || ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return None;
    }
    let ihl = usize::from(ip.get_header_length()) * 4;
    if ihl < Ipv4Packet::minimum_packet_size() || ihl > packet.len() {
        return None;
    }
    Some((ip.get_source(), &packet[ihl..]))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pnet_packet::icmp::echo_reply::EchoReplyPacket;

    /// Wrap an ICMP message in a minimal IPv4 header from `source`.
    pub(crate) fn ipv4_wrap(source: Ipv4Addr, icmp: &[u8]) -> Vec<u8> {
        let mut packet = vec![0u8; 20];
        packet[0] = 0x45;
        packet[2..4].copy_from_slice(&((20 + icmp.len()) as u16).to_be_bytes());
        packet[8] = 64;
        packet[9] = 1;
        packet[12..16].copy_from_slice(&source.octets());
        packet[16..20].copy_from_slice(&Ipv4Addr::LOCALHOST.octets());
        packet.extend_from_slice(icmp);
        packet
    }

    /// The reply a well-behaved host sends for `request`.
    pub(crate) fn echo_reply_for(request: &[u8]) -> Vec<u8> {
        let mut reply = request.to_vec();
        reply[0] = 0; // echo reply
        reply[2] = 0;
        reply[3] = 0;
        let sum = checksum(&reply, 1);
        reply[2..4].copy_from_slice(&sum.to_be_bytes());
        reply
    }

    #[test]
    fn test_echo_request_layout() {
        let packet = build_echo_request(0x3333, 7, b"PortScanner");
        assert_eq!(packet.len(), 8 + 11);
        assert_eq!(packet[0], 8);
        assert_eq!(packet[1], 0);
        assert_eq!(&packet[4..6], &[0x33, 0x33]);
        assert_eq!(&packet[6..8], &[0, 7]);
        assert_eq!(&packet[8..], b"PortScanner");
        assert_eq!(checksum(&packet, 1), u16::from_be_bytes([packet[2], packet[3]]));
        assert_ne!(u16::from_be_bytes([packet[2], packet[3]]), 0);
    }

    #[test]
    fn test_reply_round_trip() {
        let reply = echo_reply_for(&build_echo_request(0x3333, 42, b"sig"));
        let parsed = EchoReplyPacket::new(&reply).unwrap();
        assert_eq!(parsed.get_icmp_type(), IcmpTypes::EchoReply);
        assert_eq!(parsed.get_sequence_number(), 42);
        assert_eq!(parsed.payload(), b"sig");
    }

    #[test]
    fn test_split_ipv4() {
        let source = Ipv4Addr::new(10, 0, 0, 9);
        let icmp = build_echo_request(1, 2, b"x");
        let wrapped = ipv4_wrap(source, &icmp);

        let (from, message) = split_ipv4(&wrapped).unwrap();
        assert_eq!(from, source);
        assert_eq!(message, icmp.as_slice());

        let mut tcp = wrapped.clone();
        tcp[9] = 6;
        assert!(split_ipv4(&tcp).is_none());
        assert!(split_ipv4(&wrapped[..10]).is_none());
    }
}
