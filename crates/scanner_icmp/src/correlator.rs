//! Matching inbound echo replies back to batch slots
//!
//! The sequence number of every request is the target's index in the batch.
//! A reply only counts when it is an echo reply carrying our identifier and
//! signature, its sequence number is in range, and it came from the address
//! probed at that index.

use pnet_packet::icmp::echo_reply::EchoReplyPacket;
use pnet_packet::icmp::{IcmpPacket, IcmpTypes};
use pnet_packet::Packet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use crate::echo::split_ipv4;

/// Why a packet was not attributed to any target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotIcmp,
    Truncated,
    NotEchoReply,
    ForeignIdentifier(u16),
    SignatureMismatch,
    SequenceOutOfRange(u16),
    SourceMismatch { index: usize, source: Ipv4Addr },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotIcmp => f.write_str("not an IPv4 ICMP packet"),
            Rejection::Truncated => f.write_str("truncated ICMP message"),
            Rejection::NotEchoReply => f.write_str("message type is not echo reply"),
            Rejection::ForeignIdentifier(id) => write!(f, "identifier {:#06x} is not ours", id),
            Rejection::SignatureMismatch => f.write_str("payload does not match signature"),
            Rejection::SequenceOutOfRange(seq) => write!(f, "sequence number {} out of range", seq),
            Rejection::SourceMismatch { index, source } => {
                write!(f, "reply for slot {} came from {}", index, source)
            }
        }
    }
}

pub struct ReplyCorrelator {
    identifier: u16,
    signature: Vec<u8>,
    /// Address probed at each index.
    expected: Vec<IpAddr>,
}

impl ReplyCorrelator {
    pub fn new(identifier: u16, signature: Vec<u8>, expected: Vec<IpAddr>) -> Self {
        Self {
            identifier,
            signature,
            expected,
        }
    }

    /// Correlate a raw IPv4 packet as read from the listening socket.
    pub fn correlate_packet(&self, packet: &[u8]) -> Result<usize, Rejection> {
        let (source, message) = split_ipv4(packet).ok_or(Rejection::NotIcmp)?;
        self.correlate(source, message)
    }

    /// Correlate an ICMP message received from `source`.
    pub fn correlate(&self, source: Ipv4Addr, message: &[u8]) -> Result<usize, Rejection> {
        let icmp = IcmpPacket::new(message).ok_or(Rejection::Truncated)?;
        if icmp.get_icmp_type() != IcmpTypes::EchoReply {
            return Err(Rejection::NotEchoReply);
        }
        let echo = EchoReplyPacket::new(message).ok_or(Rejection::Truncated)?;

        if echo.get_identifier() != self.identifier {
            return Err(Rejection::ForeignIdentifier(echo.get_identifier()));
        }
        if echo.payload() != self.signature.as_slice() {
            return Err(Rejection::SignatureMismatch);
        }

        let seq = echo.get_sequence_number();
        let index = usize::from(seq);
        let expected = self
            .expected
            .get(index)
            .ok_or(Rejection::SequenceOutOfRange(seq))?;
        if *expected != IpAddr::V4(source) {
            return Err(Rejection::SourceMismatch { index, source });
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.expected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }
}
