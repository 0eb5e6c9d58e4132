//! Raw IPv4/TCP socket plumbing
//!
//! The kernel builds the IP header on send; received packets still carry
//! it, so readers strip it with `ipv4_payload`.

use socket2::{Domain, Protocol as SockProtocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::time::Duration;

use crate::error::SynError;
use crate::packet::IPPROTO_TCP;

/// Whether this process may open raw network-layer sockets.
pub fn raw_sockets_available() -> bool {
    Socket::new(Domain::IPV4, Type::RAW, Some(SockProtocol::TCP)).is_ok()
}

/// Source address the routing table picks for `dst`.
///
/// Connecting a UDP socket sends nothing; it only resolves the route.
pub fn local_addr_for(dst: Ipv4Addr) -> io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((dst, 9))?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(ip) => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("route to {} picked IPv6 source {}", dst, ip),
        )),
    }
}

/// A port the kernel considers free right now.
pub fn ephemeral_port() -> io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    Ok(listener.local_addr()?.port())
}

/// Raw TCP socket connected to a single peer; the kernel only delivers
/// packets whose source is that peer.
pub struct RawTcpSocket {
    socket: Socket,
}

impl RawTcpSocket {
    pub fn connect(dst: Ipv4Addr) -> Result<Self, SynError> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(SockProtocol::TCP)).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                SynError::NotPermitted
            } else {
                SynError::Io(e)
            }
        })?;
        socket.connect(&SockAddr::from(SocketAddr::new(IpAddr::V4(dst), 0)))?;
        Ok(Self { socket })
    }

    pub fn send(&self, segment: &[u8]) -> io::Result<usize> {
        self.socket.send(segment)
    }

    /// Read one packet, waiting at most `wait`.
    pub fn recv_within(&self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        // A zero timeout would mean "block forever".
        self.socket.set_read_timeout(Some(wait.max(Duration::from_millis(1))))?;
        (&self.socket).read(buf)
    }
}

/// Source address and transport payload of an IPv4 packet carrying TCP.
pub fn ipv4_payload(packet: &[u8]) -> Option<(Ipv4Addr, &[u8])> {
    let first = *packet.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let ihl = usize::from(first & 0x0f) * 4;
    if ihl < 20 || packet.len() < ihl || packet[9] != IPPROTO_TCP {
        return None;
    }
    let src = Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]);
    Some((src, &packet[ihl..]))
}

/// Read errors that only mean "nothing arrived in time".
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
