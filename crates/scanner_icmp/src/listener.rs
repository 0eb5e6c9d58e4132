//! Shared raw ICMP socket and the listener loop that feeds the correlator

use socket2::{Domain, Protocol as SockProtocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::correlator::ReplyCorrelator;

/// Upper bound on a single blocking read so the stop flag is checked often.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Whether this process may open a raw ICMP socket.
pub fn icmp_available() -> bool {
    Socket::new(Domain::IPV4, Type::RAW, Some(SockProtocol::ICMPV4)).is_ok()
}

/// One raw ICMPv4 socket per batch. Senders share it for writes from
/// blocking threads, the listener is its only reader.
pub struct IcmpSocket {
    socket: Socket,
}

impl IcmpSocket {
    pub fn open() -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(SockProtocol::ICMPV4))?;
        socket.set_write_timeout(Some(WRITE_TIMEOUT))?;
        Ok(Self { socket })
    }

    pub fn send_to(&self, message: &[u8], dst: Ipv4Addr) -> io::Result<usize> {
        let addr = SockAddr::from(SocketAddr::new(IpAddr::V4(dst), 0));
        self.socket.send_to(message, &addr)
    }

    /// Read one packet, waiting at most `wait`.
    pub fn recv_within(&self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        // A zero timeout would mean "block forever".
        self.socket.set_read_timeout(Some(wait.max(Duration::from_millis(1))))?;
        (&self.socket).read(buf)
    }
}

/// Errors that only mean "nothing arrived yet".
pub fn is_routine(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

pub struct Listener {
    pub socket: Arc<IcmpSocket>,
    pub correlator: Arc<ReplyCorrelator>,
    pub hits: UnboundedSender<usize>,
    pub runtime: Handle,
}

impl Listener {
    /// Read until `stop` is set, spawning one correlation task per packet.
    ///
    /// Returns `Ok` once stopped and `Err` on the first fatal read error.
    /// Blocking; run it on a blocking thread.
    pub fn run(self, stop: Arc<AtomicBool>) -> io::Result<()> {
        let mut buf = vec![0u8; 1500];
        loop {
            if stop.load(Ordering::Acquire) {
                return Ok(());
            }
            match self.socket.recv_within(&mut buf, POLL_INTERVAL) {
                Ok(n) => self.dispatch(buf[..n].to_vec()),
                Err(e) if is_routine(&e) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn dispatch(&self, packet: Vec<u8>) {
        let correlator = self.correlator.clone();
        let hits = self.hits.clone();
        self.runtime.spawn(async move {
            match correlator.correlate_packet(&packet) {
                Ok(index) => {
                    trace!("echo reply for slot {}", index);
                    let _ = hits.send(index);
                }
                Err(reason) => debug!("dropped ICMP packet: {}", reason),
            }
        });
    }
}

/// Stops a listener when told to, or when dropped with its batch.
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// The signal and the flag to hand to `Listener::run`.
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (Self(flag.clone()), flag)
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Drop for StopSignal {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_signal() {
        let (signal, flag) = StopSignal::new();
        assert!(!flag.load(Ordering::Acquire));
        signal.stop();
        assert!(flag.load(Ordering::Acquire));

        let (signal, flag) = StopSignal::new();
        drop(signal);
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_routine_errors() {
        assert!(is_routine(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_routine(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_routine(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn test_open_matches_capability() {
        assert_eq!(IcmpSocket::open().is_ok(), icmp_available());
    }
}
