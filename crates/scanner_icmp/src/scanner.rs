//! ICMP echo scanner
//!
//! One raw socket per batch. Every target gets an echo request whose
//! sequence number is its index; a single listener reads replies and hands
//! each packet to a correlation task. Requests are paced by the shared rate
//! limiter, and the reply window opens once the last one has been launched.
//! Matched indices flow back over a channel and are applied by the
//! collector once the window closes or the listener dies.

use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use portprobe_common::{
    BatchScanner, PortState, PortprobeError, PortprobeResult, RateLimiter, Target,
};

use crate::correlator::ReplyCorrelator;
use crate::echo::build_echo_request;
use crate::listener::{IcmpSocket, Listener, StopSignal};

pub struct IcmpScanner {
    identifier: u16,
    signature: Vec<u8>,
    deadline: Duration,
    max_in_flight: usize,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl IcmpScanner {
    pub fn new(identifier: u16, signature: Vec<u8>) -> Self {
        Self {
            identifier,
            signature,
            deadline: Duration::from_secs(3),
            max_in_flight: 1024,
            rate_limiter: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Pace echo requests with `limiter`, which may be shared with other
    /// scanners.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }
}

impl Default for IcmpScanner {
    fn default() -> Self {
        Self::new(0x3333, b"PortScanner".to_vec())
    }
}

/// Launch one blocking `send(sequence, destination)` per IPv4 target, at
/// most `max_in_flight` at a time and no faster than `limiter` allows.
///
/// Returns how many sends were launched. IPv6 targets are skipped, as is
/// everything past the 16-bit sequence space.
pub async fn dispatch_requests<F>(
    targets: &[Target],
    max_in_flight: usize,
    limiter: Option<&RateLimiter>,
    send: F,
) -> usize
where
    F: Fn(u16, Ipv4Addr) + Send + Sync + 'static,
{
    let send = Arc::new(send);
    let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut launched = 0;

    for (index, target) in targets.iter().enumerate() {
        let IpAddr::V4(dst) = target.ip else {
            debug!("{} skipped: echo requests are IPv4 only", target);
            continue;
        };
        let Ok(sequence) = u16::try_from(index) else {
            warn!("batch exceeds the 16-bit sequence space at slot {}", index);
            break;
        };
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        if let Some(limiter) = limiter {
            limiter.acquire().await;
        }

        let send = send.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            send(sequence, dst);
        });
        launched += 1;
    }
    launched
}

/// Apply every index received so far. Out-of-range indices are ignored.
pub fn collect_hits(hits: &mut mpsc::UnboundedReceiver<usize>, len: usize) -> Vec<PortState> {
    let mut states = vec![PortState::Closed; len];
    while let Ok(index) = hits.try_recv() {
        if let Some(slot) = states.get_mut(index) {
            *slot = PortState::Open;
        }
    }
    states
}

#[async_trait]
impl BatchScanner for IcmpScanner {
    #[instrument(skip(self, targets), fields(targets = targets.len()))]
    async fn scan_batch(&self, targets: &[Target]) -> PortprobeResult<Vec<PortState>> {
        let socket = IcmpSocket::open().map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => {
                PortprobeError::PermissionDenied(format!("raw ICMP socket: {}", e))
            }
            _ => PortprobeError::Io(e),
        })?;
        let socket = Arc::new(socket);

        let expected = targets.iter().map(|t| t.ip).collect();
        let correlator = Arc::new(ReplyCorrelator::new(
            self.identifier,
            self.signature.clone(),
            expected,
        ));
        let (hit_tx, mut hit_rx) = mpsc::unbounded_channel();
        let (fatal_tx, mut fatal_rx) = oneshot::channel::<io::Error>();
        let (stop, stop_flag) = StopSignal::new();

        // Listener starts before any request leaves.
        let listener = Listener {
            socket: socket.clone(),
            correlator,
            hits: hit_tx,
            runtime: Handle::current(),
        };
        tokio::task::spawn_blocking(move || {
            if let Err(e) = listener.run(stop_flag) {
                let _ = fatal_tx.send(e);
            }
        });

        let identifier = self.identifier;
        let signature = self.signature.clone();
        let sender = socket.clone();
        let launched = dispatch_requests(
            targets,
            self.max_in_flight,
            self.rate_limiter.as_deref(),
            move |sequence, dst| {
                let message = build_echo_request(identifier, sequence, &signature);
                debug!("sending ICMP echo to {}", dst);
                if let Err(e) = sender.send_to(&message, dst) {
                    debug!("failed to send ICMP echo to {}: {}", dst, e);
                }
            },
        )
        .await;
        debug!("{} echo requests launched", launched);

        let deadline = Instant::now() + self.deadline;
        tokio::select! {
            result = &mut fatal_rx => {
                if let Ok(e) = result {
                    warn!("ICMP listener failed: {}", e);
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                info!("ICMP wait deadline reached");
            }
        }
        stop.stop();

        Ok(collect_hits(&mut hit_rx, targets.len()))
    }

    fn name(&self) -> &str {
        "ICMP Echo Scanner"
    }
}
