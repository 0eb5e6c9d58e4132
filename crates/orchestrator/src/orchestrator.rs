//! Orchestrator - fans probes out and joins results back in order

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use portprobe_common::{
    BatchScanner, PortState, PortprobeError, PortprobeResult, Protocol, RateLimiter, ScanOptions,
    ScanStats, Scanner, Target, TcpStrategy,
};
use portprobe_scanner_icmp::IcmpScanner;
use portprobe_scanner_syn::SynScanner;
use portprobe_scanner_tcp::TcpScanner;
use portprobe_scanner_udp::UdpScanner;

use crate::capabilities::Capabilities;
use crate::progress::ProgressTracker;

/// How a protocol's scanner is driven.
#[derive(Clone)]
enum Registered {
    /// One task per target.
    PerTarget(Arc<dyn Scanner>),
    /// The scanner handles the whole batch itself.
    Batch(Arc<dyn BatchScanner>),
}

impl Registered {
    fn name(&self) -> &str {
        match self {
            Registered::PerTarget(s) => s.name(),
            Registered::Batch(s) => s.name(),
        }
    }
}

/// Orchestrator coordinates probe tasks, rate limiting and result collection.
pub struct Orchestrator {
    scanners: HashMap<Protocol, Registered>,
    max_in_flight: usize,
    /// Shared by every scanner so the rate holds across protocols.
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl Orchestrator {
    /// Create an orchestrator with no scanners registered.
    pub fn new(max_in_flight: usize, rate_limit: Option<u32>) -> Self {
        Self {
            scanners: HashMap::new(),
            max_in_flight: max_in_flight.max(1),
            rate_limiter: rate_limit.map(|rate| Arc::new(RateLimiter::new(rate))),
        }
    }

    /// Build an orchestrator for the detected capabilities of this process.
    pub fn from_options(options: &ScanOptions) -> PortprobeResult<Self> {
        Self::with_capabilities(options, Capabilities::detect())
    }

    /// Register the scanners `options` and `caps` allow.
    ///
    /// TCP always gets a scanner (SYN or connect), UDP always gets one,
    /// ICMP only when raw ICMP sockets are available.
    pub fn with_capabilities(options: &ScanOptions, caps: Capabilities) -> PortprobeResult<Self> {
        options.validate()?;
        let mut orch = Self::new(options.max_in_flight, options.rate_limit);

        let connect: Arc<dyn Scanner> =
            Arc::new(TcpScanner::new().with_timeout(options.connect_timeout));
        match caps.tcp_strategy(options.tcp_strategy) {
            TcpStrategy::Syn => {
                let syn = SynScanner::new()
                    .with_timeout(options.syn_timeout)
                    .with_fallback(connect);
                orch.add_scanner(Protocol::Tcp, Arc::new(syn));
            }
            _ => orch.add_scanner(Protocol::Tcp, connect),
        }

        let udp = UdpScanner::new(options.udp_payload.clone()).with_timeout(options.udp_timeout);
        orch.add_scanner(Protocol::Udp, Arc::new(udp));

        if caps.raw_icmp {
            let mut icmp =
                IcmpScanner::new(options.icmp_identifier, options.icmp_signature.clone())
                    .with_deadline(options.icmp_deadline)
                    .with_max_in_flight(options.max_in_flight);
            if let Some(limiter) = &orch.rate_limiter {
                icmp = icmp.with_rate_limiter(limiter.clone());
            }
            orch.add_batch_scanner(Protocol::Icmp, Arc::new(icmp));
        } else {
            warn!("ICMP scans need raw sockets (root or CAP_NET_RAW); ICMP is unavailable");
        }

        Ok(orch)
    }

    /// Register a per-target scanner for `protocol`.
    pub fn add_scanner(&mut self, protocol: Protocol, scanner: Arc<dyn Scanner>) {
        self.scanners.insert(protocol, Registered::PerTarget(scanner));
    }

    /// Register a batch scanner for `protocol`.
    pub fn add_batch_scanner(&mut self, protocol: Protocol, scanner: Arc<dyn BatchScanner>) {
        self.scanners.insert(protocol, Registered::Batch(scanner));
    }

    /// Name of the scanner that would handle `protocol`.
    pub fn scanner_name(&self, protocol: Protocol) -> Option<&str> {
        self.scanners.get(&protocol).map(Registered::name)
    }

    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    /// Probe every target and return them in input order, each resolved.
    ///
    /// Every target must carry `protocol`.
    pub async fn probe(
        &self,
        protocol: Protocol,
        targets: Vec<Target>,
    ) -> PortprobeResult<Vec<Target>> {
        self.probe_with_stats(protocol, targets)
            .await
            .map(|(targets, _)| targets)
    }

    /// Like `probe`, also returning the per-state counts of this batch.
    /// Each call tracks its own progress, so batches may run concurrently.
    #[instrument(skip(self, targets), fields(targets = targets.len()))]
    pub async fn probe_with_stats(
        &self,
        protocol: Protocol,
        mut targets: Vec<Target>,
    ) -> PortprobeResult<(Vec<Target>, ScanStats)> {
        if let Some(stray) = targets.iter().find(|t| t.protocol != protocol) {
            return Err(PortprobeError::Config(format!(
                "{} does not belong in a {} batch",
                stray, protocol
            )));
        }
        let scanner = self
            .scanners
            .get(&protocol)
            .cloned()
            .ok_or_else(|| PortprobeError::ScannerUnavailable(protocol.as_str().to_string()))?;
        if targets.is_empty() {
            return Ok((targets, ScanStats::default()));
        }

        let batch = Uuid::new_v4();
        info!(
            "Starting batch {} protocol={} targets={} scanner={}",
            batch,
            protocol,
            targets.len(),
            scanner.name()
        );
        let progress = ProgressTracker::new();
        progress.reset(targets.len()).await;

        match scanner {
            Registered::PerTarget(scanner) => {
                self.fan_out(scanner, &mut targets, &progress).await
            }
            Registered::Batch(scanner) => {
                let states = scanner.scan_batch(&targets).await?;
                for (target, state) in targets.iter_mut().zip(states) {
                    apply(target, state, &progress).await;
                }
            }
        }

        // Slots nobody reported on keep their default.
        for target in targets.iter_mut().filter(|t| !t.is_resolved()) {
            apply(target, PortState::Closed, &progress).await;
        }

        progress.print_summary().await;
        info!("Finished batch {}", batch);
        let stats = progress.snapshot().await;
        Ok((targets, stats))
    }

    /// One task per target, at most `max_in_flight` at once. Tasks only
    /// report `(index, state)`; writes happen here.
    async fn fan_out(
        &self,
        scanner: Arc<dyn Scanner>,
        targets: &mut [Target],
        progress: &ProgressTracker,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();

        for index in 0..targets.len() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if let Some(limiter) = &self.rate_limiter {
                limiter.acquire().await;
            }

            let scanner = scanner.clone();
            let target = targets[index].clone();
            tasks.spawn(async move {
                let _permit = permit;
                let state = scanner.scan(index, &target).await;
                (index, state)
            });

            // Collect whatever already finished so results don't pile up.
            while let Some(joined) = tasks.try_join_next() {
                collect(joined, targets, progress).await;
            }
        }

        while let Some(joined) = tasks.join_next().await {
            collect(joined, targets, progress).await;
        }
    }
}

async fn collect(
    joined: Result<(usize, PortState), tokio::task::JoinError>,
    targets: &mut [Target],
    progress: &ProgressTracker,
) {
    match joined {
        Ok((index, state)) => {
            if let Some(target) = targets.get_mut(index) {
                apply(target, state, progress).await;
            }
        }
        Err(e) => {
            warn!("probe task failed: {}", e);
            progress.increment_failed().await;
        }
    }
}

async fn apply(target: &mut Target, state: PortState, progress: &ProgressTracker) {
    if target.resolve(state) {
        debug!("{} -> {}", target, state);
        progress.record(state).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Open on even ports; later slots answer faster.
    struct Staggered;

    #[async_trait]
    impl Scanner for Staggered {
        async fn scan(&self, index: usize, target: &Target) -> PortState {
            tokio::time::sleep(Duration::from_millis(50u64.saturating_sub(index as u64 * 10))).await;
            match target.port {
                Some(p) if p % 2 == 0 => PortState::Open,
                _ => PortState::Filtered,
            }
        }

        fn name(&self) -> &str {
            "staggered"
        }
    }

    #[derive(Default)]
    struct Counting {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Scanner for Counting {
        async fn scan(&self, _index: usize, _target: &Target) -> PortState {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            PortState::Open
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct EveryOther;

    #[async_trait]
    impl BatchScanner for EveryOther {
        async fn scan_batch(&self, targets: &[Target]) -> PortprobeResult<Vec<PortState>> {
            Ok((0..targets.len())
                .map(|i| if i % 2 == 0 { PortState::Open } else { PortState::Closed })
                .collect())
        }

        fn name(&self) -> &str {
            "every-other"
        }
    }

    fn tcp_targets(ports: std::ops::Range<u16>) -> Vec<Target> {
        ports
            .map(|p| Target::tcp(IpAddr::V4(Ipv4Addr::LOCALHOST), p))
            .collect()
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let mut orch = Orchestrator::new(16, None);
        orch.add_scanner(Protocol::Tcp, Arc::new(Staggered));

        let (result, stats) = orch
            .probe_with_stats(Protocol::Tcp, tcp_targets(20000..20005))
            .await
            .unwrap();
        let ports: Vec<_> = result.iter().map(|t| t.port.unwrap()).collect();
        assert_eq!(ports, vec![20000, 20001, 20002, 20003, 20004]);
        assert_eq!(result[0].state, PortState::Open);
        assert_eq!(result[1].state, PortState::Filtered);
        assert!(result.iter().all(Target::is_resolved));
        assert_eq!((stats.total, stats.open, stats.filtered), (5, 3, 2));
    }

    #[tokio::test]
    async fn test_concurrent_batches_keep_their_own_counts() {
        let mut orch = Orchestrator::new(16, None);
        orch.add_scanner(Protocol::Tcp, Arc::new(Staggered));

        // Even ports only, then odd ports only, on the same orchestrator.
        let evens = (0..4).map(|i| Target::tcp(IpAddr::V4(Ipv4Addr::LOCALHOST), 2000 + 2 * i));
        let odds = (0..3).map(|i| Target::tcp(IpAddr::V4(Ipv4Addr::LOCALHOST), 3001 + 2 * i));
        let (a, b) = tokio::join!(
            orch.probe_with_stats(Protocol::Tcp, evens.collect()),
            orch.probe_with_stats(Protocol::Tcp, odds.collect()),
        );
        let (_, a) = a.unwrap();
        let (_, b) = b.unwrap();

        assert_eq!((a.total, a.open, a.filtered), (4, 4, 0));
        assert_eq!((b.total, b.open, b.filtered), (3, 0, 3));
    }

    #[test]
    fn test_rate_limiter_is_shared() {
        let options = ScanOptions {
            rate_limit: Some(7),
            ..ScanOptions::default()
        };
        let orch = Orchestrator::with_capabilities(&options, Capabilities::privileged()).unwrap();
        assert_eq!(orch.rate_limiter().map(|l| l.rate()), Some(7));
        assert!(Orchestrator::new(4, None).rate_limiter().is_none());
    }

    #[tokio::test]
    async fn test_in_flight_is_bounded() {
        let scanner = Arc::new(Counting::default());
        let mut orch = Orchestrator::new(2, None);
        orch.add_scanner(Protocol::Tcp, scanner.clone());

        let result = orch.probe(Protocol::Tcp, tcp_targets(1..9)).await.unwrap();
        assert_eq!(result.len(), 8);
        assert!(scanner.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_batch_scanner() {
        let mut orch = Orchestrator::new(4, None);
        orch.add_batch_scanner(Protocol::Icmp, Arc::new(EveryOther));

        let targets = (1..=3)
            .map(|i| Target::icmp(IpAddr::V4(Ipv4Addr::new(10, 0, 0, i))))
            .collect();
        let result = orch.probe(Protocol::Icmp, targets).await.unwrap();
        let states: Vec<_> = result.iter().map(|t| t.state).collect();
        assert_eq!(states, vec![PortState::Open, PortState::Closed, PortState::Open]);
    }

    #[tokio::test]
    async fn test_unregistered_protocol() {
        let orch = Orchestrator::new(4, None);
        let targets = vec![Target::icmp(IpAddr::V4(Ipv4Addr::LOCALHOST))];
        let err = orch.probe(Protocol::Icmp, targets).await.unwrap_err();
        assert!(matches!(err, PortprobeError::ScannerUnavailable(ref p) if p == "icmp"));
    }

    #[tokio::test]
    async fn test_mixed_protocols_rejected() {
        let mut orch = Orchestrator::new(4, None);
        orch.add_scanner(Protocol::Tcp, Arc::new(Staggered));
        let mut targets = tcp_targets(80..81);
        targets.push(Target::udp(IpAddr::V4(Ipv4Addr::LOCALHOST), 53));

        let err = orch.probe(Protocol::Tcp, targets).await.unwrap_err();
        assert!(matches!(err, PortprobeError::Config(_)));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let mut orch = Orchestrator::new(4, None);
        orch.add_scanner(Protocol::Tcp, Arc::new(Staggered));
        assert!(orch.probe(Protocol::Tcp, Vec::new()).await.unwrap().is_empty());
    }

    #[test]
    fn test_unprivileged_registration() {
        let orch =
            Orchestrator::with_capabilities(&ScanOptions::default(), Capabilities::unprivileged())
                .unwrap();
        assert_eq!(orch.scanner_name(Protocol::Tcp), Some("TCP Connect Scanner"));
        assert_eq!(orch.scanner_name(Protocol::Udp), Some("UDP Scanner"));
        assert_eq!(orch.scanner_name(Protocol::Icmp), None);
    }

    #[test]
    fn test_privileged_registration() {
        let orch =
            Orchestrator::with_capabilities(&ScanOptions::default(), Capabilities::privileged())
                .unwrap();
        assert_eq!(orch.scanner_name(Protocol::Tcp), Some("SYN Scanner"));
        assert_eq!(orch.scanner_name(Protocol::Icmp), Some("ICMP Echo Scanner"));

        let connect_only = ScanOptions {
            tcp_strategy: TcpStrategy::Connect,
            ..ScanOptions::default()
        };
        let orch =
            Orchestrator::with_capabilities(&connect_only, Capabilities::privileged()).unwrap();
        assert_eq!(orch.scanner_name(Protocol::Tcp), Some("TCP Connect Scanner"));
    }

    #[tokio::test]
    async fn test_connect_scan_against_loopback() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };

        let options = ScanOptions {
            tcp_strategy: TcpStrategy::Connect,
            ..ScanOptions::default()
        };
        let orch = Orchestrator::with_capabilities(&options, Capabilities::unprivileged()).unwrap();
        let targets = vec![
            Target::tcp(IpAddr::V4(Ipv4Addr::LOCALHOST), open),
            Target::tcp(IpAddr::V4(Ipv4Addr::LOCALHOST), closed),
        ];
        let result = orch.probe(Protocol::Tcp, targets).await.unwrap();
        assert_eq!(result[0].state, PortState::Open);
        assert_eq!(result[1].state, PortState::Closed);
    }
}
