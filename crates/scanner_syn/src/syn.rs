//! SYN scanner over per-target raw sockets
//!
//! Each probe owns its raw socket: it sends one SYN, then reads packets from
//! the target until a reply for our port pair arrives or the deadline passes.

use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use portprobe_common::{PortState, Scanner, Target};

use crate::error::SynError;
use crate::packet::{build_syn_segment, tcp_flags, TcpHeader};
use crate::raw::{ephemeral_port, ipv4_payload, is_timeout, local_addr_for, RawTcpSocket};

pub struct SynScanner {
    timeout: Duration,
    /// Sequence number of slot 0; slot `i` uses `seq_base + i`.
    seq_base: u32,
    /// Used for targets a raw IPv4 probe cannot reach (IPv6).
    fallback: Option<Arc<dyn Scanner>>,
}

impl SynScanner {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            seq_base: rand::random(),
            fallback: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Scanner>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[inline]
    fn seq_for(&self, index: usize) -> u32 {
        self.seq_base.wrapping_add(index as u32)
    }
}

impl Default for SynScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Send one SYN and wait for the answer. Blocking.
///
/// Setup and send failures are errors; once the SYN is out, every outcome
/// is a state.
pub fn probe_blocking(
    dst: Ipv4Addr,
    dst_port: u16,
    seq: u32,
    timeout: Duration,
) -> Result<PortState, SynError> {
    let src = local_addr_for(dst)?;
    let src_port = ephemeral_port()?;
    let segment = build_syn_segment(src, dst, src_port, dst_port, seq);

    let socket = RawTcpSocket::connect(dst)?;
    socket.send(&segment)?;

    let sent = SentSyn {
        dst,
        dst_port,
        src_port,
        seq,
    };
    let deadline = Instant::now() + timeout;
    Ok(await_reply(
        |buf, wait| socket.recv_within(buf, wait),
        sent,
        deadline,
    ))
}

/// What a reply has to match to answer a sent SYN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentSyn {
    pub dst: Ipv4Addr,
    pub dst_port: u16,
    pub src_port: u16,
    pub seq: u32,
}

/// Read packets through `recv` until one answers `sent` or `deadline`
/// passes. `recv` gets the buffer and the longest it may wait.
///
/// Unrelated packets are skipped; a timeout or read error is `Filtered`.
pub fn await_reply<R>(mut recv: R, sent: SentSyn, deadline: Instant) -> PortState
where
    R: FnMut(&mut [u8], Duration) -> io::Result<usize>,
{
    let mut buf = [0u8; 1500];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return PortState::Filtered;
        }
        match recv(&mut buf, remaining) {
            Ok(n) => {
                let reply = classify_reply(
                    &buf[..n],
                    sent.dst,
                    sent.dst_port,
                    sent.src_port,
                    sent.seq,
                );
                if let Some(state) = reply {
                    return state;
                }
            }
            Err(e) if is_timeout(&e) => return PortState::Filtered,
            Err(e) => {
                debug!("raw read from {} failed: {}", sent.dst, e);
                return PortState::Filtered;
            }
        }
    }
}

/// Classify a raw IPv4 packet against the probe it may answer.
///
/// `None` means the packet belongs to some other conversation.
pub fn classify_reply(
    packet: &[u8],
    dst: Ipv4Addr,
    dst_port: u16,
    src_port: u16,
    seq: u32,
) -> Option<PortState> {
    let (from, segment) = ipv4_payload(packet)?;
    if from != dst {
        return None;
    }
    let reply = TcpHeader::decode(segment).ok()?;
    if reply.source != dst_port || reply.destination != src_port {
        return None;
    }
    Some(classify_flags(&reply, seq))
}

#[inline]
fn classify_flags(reply: &TcpHeader, seq: u32) -> PortState {
    if reply.has_flag(tcp_flags::SYN) && reply.has_flag(tcp_flags::ACK) {
        if reply.ack == seq.wrapping_add(1) {
            PortState::Open
        } else {
            PortState::Filtered
        }
    } else if reply.has_flag(tcp_flags::RST) {
        PortState::Closed
    } else {
        PortState::Filtered
    }
}

#[async_trait]
impl Scanner for SynScanner {
    async fn scan(&self, index: usize, target: &Target) -> PortState {
        let (IpAddr::V4(dst), Some(port)) = (target.ip, target.port) else {
            return match &self.fallback {
                Some(fallback) => fallback.scan(index, target).await,
                None => {
                    debug!("{} is not reachable by an IPv4 SYN probe", target);
                    PortState::Closed
                }
            };
        };

        let seq = self.seq_for(index);
        let timeout = self.timeout;
        match tokio::task::spawn_blocking(move || probe_blocking(dst, port, seq, timeout)).await {
            Ok(Ok(state)) => {
                debug!("{} -> {}", target, state);
                state
            }
            Ok(Err(e)) => {
                warn!("SYN probe to {} could not be sent: {}", target, e);
                PortState::Closed
            }
            Err(e) => {
                warn!("SYN probe task for {} failed: {}", target, e);
                PortState::Closed
            }
        }
    }

    fn name(&self) -> &str {
        "SYN Scanner"
    }

    fn requires_root(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::IPPROTO_TCP;
    use crate::raw::raw_sockets_available;

    fn reply_packet(from: Ipv4Addr, header: &TcpHeader) -> Vec<u8> {
        let mut packet = vec![0u8; 20];
        packet[0] = 0x45;
        packet[9] = IPPROTO_TCP;
        packet[12..16].copy_from_slice(&from.octets());
        packet.extend_from_slice(&header.encode());
        packet
    }

    fn reply(flags: u8, ack: u32) -> TcpHeader {
        TcpHeader {
            flags,
            ack,
            ..TcpHeader::syn(80, 40000, 99)
        }
    }

    #[test]
    fn test_scanner_creation() {
        let scanner = SynScanner::new().with_timeout(Duration::from_millis(250));
        assert_eq!(scanner.timeout, Duration::from_millis(250));
        assert_eq!(scanner.seq_for(3), scanner.seq_base.wrapping_add(3));
        assert!(scanner.requires_root());
    }

    #[test]
    fn test_classify_reply() {
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let seq = 1000;

        let syn_ack = reply_packet(dst, &reply(tcp_flags::SYN | tcp_flags::ACK, seq + 1));
        assert_eq!(classify_reply(&syn_ack, dst, 80, 40000, seq), Some(PortState::Open));

        let rst = reply_packet(dst, &reply(tcp_flags::RST | tcp_flags::ACK, seq + 1));
        assert_eq!(classify_reply(&rst, dst, 80, 40000, seq), Some(PortState::Closed));

        let stray_ack = reply_packet(dst, &reply(tcp_flags::ACK, 0));
        assert_eq!(classify_reply(&stray_ack, dst, 80, 40000, seq), Some(PortState::Filtered));

        let wrong_ack = reply_packet(dst, &reply(tcp_flags::SYN | tcp_flags::ACK, 7));
        assert_eq!(classify_reply(&wrong_ack, dst, 80, 40000, seq), Some(PortState::Filtered));
    }

    #[test]
    fn test_classify_ignores_other_conversations() {
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let packet = reply_packet(dst, &reply(tcp_flags::SYN | tcp_flags::ACK, 1001));

        assert_eq!(classify_reply(&packet, dst, 443, 40000, 1000), None);
        assert_eq!(classify_reply(&packet, dst, 80, 40001, 1000), None);
        assert_eq!(classify_reply(&packet, Ipv4Addr::new(10, 0, 0, 3), 80, 40000, 1000), None);
        assert_eq!(classify_reply(&packet[..30], dst, 80, 40000, 1000), None);
    }

    fn pending() -> SentSyn {
        SentSyn {
            dst: Ipv4Addr::new(10, 0, 0, 2),
            dst_port: 80,
            src_port: 40000,
            seq: 1000,
        }
    }

    #[test]
    fn test_await_reply_times_out_as_filtered() {
        let start = Instant::now();
        let state = await_reply(
            |_buf: &mut [u8], wait: Duration| {
                std::thread::sleep(wait.min(Duration::from_millis(20)));
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            },
            pending(),
            start + Duration::from_millis(50),
        );
        assert_eq!(state, PortState::Filtered);
    }

    #[test]
    fn test_await_reply_skips_noise_until_deadline() {
        let noise = reply_packet(
            Ipv4Addr::new(10, 0, 0, 9),
            &reply(tcp_flags::SYN | tcp_flags::ACK, 1001),
        );
        let mut reads = 0;
        let start = Instant::now();
        let state = await_reply(
            |buf: &mut [u8], _wait: Duration| {
                reads += 1;
                std::thread::sleep(Duration::from_millis(5));
                buf[..noise.len()].copy_from_slice(&noise);
                Ok(noise.len())
            },
            pending(),
            start + Duration::from_millis(60),
        );
        assert_eq!(state, PortState::Filtered);
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert!(reads > 1);
    }

    #[test]
    fn test_await_reply_finds_answer_after_noise() {
        let sent = pending();
        let answer = reply_packet(sent.dst, &reply(tcp_flags::SYN | tcp_flags::ACK, 1001));
        // Same reply aimed at another local port.
        let mut wrong_port = answer.clone();
        wrong_port[22..24].copy_from_slice(&40001u16.to_be_bytes());

        let mut packets = vec![answer, wrong_port];
        let state = await_reply(
            |buf: &mut [u8], _wait: Duration| match packets.pop() {
                Some(p) => {
                    buf[..p.len()].copy_from_slice(&p);
                    Ok(p.len())
                }
                None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            },
            sent,
            Instant::now() + Duration::from_secs(1),
        );
        assert_eq!(state, PortState::Open);
    }

    #[test]
    fn test_await_reply_read_error_and_expired_deadline() {
        let state = await_reply(
            |_buf: &mut [u8], _wait: Duration| {
                Err(io::Error::from(io::ErrorKind::ConnectionReset))
            },
            pending(),
            Instant::now() + Duration::from_secs(1),
        );
        assert_eq!(state, PortState::Filtered);

        let mut called = false;
        let state = await_reply(
            |_buf: &mut [u8], _wait: Duration| {
                called = true;
                Ok(0)
            },
            pending(),
            Instant::now(),
        );
        assert_eq!(state, PortState::Filtered);
        assert!(!called);
    }

    #[tokio::test]
    async fn test_syn_probe_loopback() {
        if !raw_sockets_available() {
            return;
        }
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let open_port = listener.local_addr().unwrap().port();
        let closed_port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };

        let scanner = SynScanner::new();
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert_eq!(scanner.scan(0, &Target::tcp(ip, open_port)).await, PortState::Open);
        assert_eq!(scanner.scan(1, &Target::tcp(ip, closed_port)).await, PortState::Closed);
    }
}
