//! TCP segment encoding/decoding and checksums
//!
//! The header is kept as plain fields; `encode` packs the 16-bit
//! offset/reserved/ECN/flags word and pads the result to at least 20 bytes.
//! Checksums follow RFC 1071 over the RFC 793 pseudo-header.

use std::net::Ipv4Addr;

use crate::error::SynError;

/// TCP flag constants
pub mod tcp_flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
}

/// Minimum TCP header length in bytes (data offset 5).
pub const MIN_HEADER_LEN: usize = 20;

/// IP protocol number for TCP.
pub const IPPROTO_TCP: u8 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpOption {
    pub kind: u8,
    pub length: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub source: u16,
    pub destination: u16,
    pub seq: u32,
    pub ack: u32,
    pub data_offset: u8, // 4 bits
    pub reserved: u8,    // 3 bits
    pub ecn: u8,         // 3 bits
    pub flags: u8,       // 6 bits
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
    pub options: Vec<TcpOption>,
}

impl TcpHeader {
    /// Bare SYN segment with a 20-byte header and a full window.
    pub fn syn(source: u16, destination: u16, seq: u32) -> Self {
        Self {
            source,
            destination,
            seq,
            ack: 0,
            data_offset: 5,
            reserved: 0,
            ecn: 0,
            flags: tcp_flags::SYN,
            window: 65535,
            checksum: 0,
            urgent: 0,
            options: Vec::new(),
        }
    }

    #[inline]
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// offset (4) | reserved (3) | ECN (3) | flags (6)
    #[inline]
    pub fn mixed_field(&self) -> u16 {
        (u16::from(self.data_offset & 0x0f) << 12)
            | (u16::from(self.reserved & 0x07) << 9)
            | (u16::from(self.ecn & 0x07) << 6)
            | u16::from(self.flags & 0x3f)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MIN_HEADER_LEN + 40);
        buf.extend_from_slice(&self.source.to_be_bytes());
        buf.extend_from_slice(&self.destination.to_be_bytes());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(&self.ack.to_be_bytes());
        buf.extend_from_slice(&self.mixed_field().to_be_bytes());
        buf.extend_from_slice(&self.window.to_be_bytes());
        buf.extend_from_slice(&self.checksum.to_be_bytes());
        buf.extend_from_slice(&self.urgent.to_be_bytes());

        for option in &self.options {
            buf.push(option.kind);
            if option.length > 1 {
                buf.push(option.length);
                buf.extend_from_slice(&option.data);
            }
        }

        // Pad to the minimum header and to a 32-bit boundary.
        let padded = buf.len().max(MIN_HEADER_LEN).next_multiple_of(4);
        buf.resize(padded, 0);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, SynError> {
        if buf.len() < MIN_HEADER_LEN {
            return Err(SynError::Malformed(format!(
                "tcp header needs {} bytes, got {}",
                MIN_HEADER_LEN,
                buf.len()
            )));
        }

        let mixed = u16::from_be_bytes([buf[12], buf[13]]);
        let data_offset = (mixed >> 12) as u8;
        let header_len = usize::from(data_offset) * 4;
        let options = if header_len > MIN_HEADER_LEN && buf.len() >= header_len {
            decode_options(&buf[MIN_HEADER_LEN..header_len])
        } else {
            Vec::new()
        };

        Ok(Self {
            source: u16::from_be_bytes([buf[0], buf[1]]),
            destination: u16::from_be_bytes([buf[2], buf[3]]),
            seq: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ack: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            data_offset,
            reserved: ((mixed >> 9) & 0x07) as u8,
            ecn: ((mixed >> 6) & 0x07) as u8,
            flags: (mixed & 0x3f) as u8,
            window: u16::from_be_bytes([buf[14], buf[15]]),
            checksum: u16::from_be_bytes([buf[16], buf[17]]),
            urgent: u16::from_be_bytes([buf[18], buf[19]]),
            options,
        })
    }
}

/// Options stop at end-of-list or at the first truncated entry.
fn decode_options(mut raw: &[u8]) -> Vec<TcpOption> {
    const EOL: u8 = 0;
    const NOP: u8 = 1;

    let mut options = Vec::new();
    while let Some(&kind) = raw.first() {
        match kind {
            EOL => break,
            NOP => {
                options.push(TcpOption { kind, length: 1, data: Vec::new() });
                raw = &raw[1..];
            }
            _ => {
                let Some(&length) = raw.get(1) else { break };
                let len = usize::from(length);
                if len < 2 || len > raw.len() {
                    break;
                }
                options.push(TcpOption {
                    kind,
                    length,
                    data: raw[2..len].to_vec(),
                });
                raw = &raw[len..];
            }
        }
    }
    options
}

/// RFC 1071 one's-complement sum over big-endian 16-bit words.
#[inline]
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum = 0u32;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }

    sum = (sum >> 16) + (sum & 0xffff);
    sum += sum >> 16;
    !(sum as u16)
}

/// TCP checksum with the IPv4 pseudo-header prepended to `segment`.
pub fn tcp_checksum(segment: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> u16 {
    let mut data = Vec::with_capacity(12 + segment.len());
    data.extend_from_slice(&src.octets());
    data.extend_from_slice(&dst.octets());
    data.push(0);
    data.push(IPPROTO_TCP);
    data.extend_from_slice(&(segment.len() as u16).to_be_bytes());
    data.extend_from_slice(segment);
    internet_checksum(&data)
}

/// Build a SYN segment with its checksum filled in.
pub fn build_syn_segment(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    seq: u32,
) -> Vec<u8> {
    let mut header = TcpHeader::syn(src_port, dst_port, seq);
    header.checksum = tcp_checksum(&header.encode(), src, dst);
    header.encode()
}
