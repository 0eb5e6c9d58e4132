// runner.rs
use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::info;

use portprobe_common::{Protocol, ScanOptions, TcpStrategy};
use portprobe_orchestrator::{Capabilities, Orchestrator};
use portprobe_target_resolver::TargetResolver;

use crate::args::ScanArgs;
use crate::output::{print_capabilities, print_results};

pub async fn run_scan(args: ScanArgs) -> Result<()> {
    let protocol: Protocol = args.protocol.parse()?;
    let options = build_options(&args)?;

    info!("Starting scan...");
    info!("Protocol: {}", protocol);
    info!("Addresses: {}", args.addresses);
    if let Some(ports) = &args.ports {
        info!("Ports: {}", ports);
    }
    info!("Max in flight: {}", options.max_in_flight);
    if let Some(rate) = options.rate_limit {
        info!("Rate limit: {}/s", rate);
    }

    let targets = TargetResolver::new()
        .resolve(protocol, &args.addresses, args.ports.as_deref())
        .context("Invalid scan request")?;
    info!("Total scan targets: {}", targets.len());

    let orchestrator = Orchestrator::from_options(&options)?;
    if let Some(name) = orchestrator.scanner_name(protocol) {
        info!("Scanner: {}", name);
    }

    let scan_start = Instant::now();
    let results = orchestrator.probe(protocol, targets).await?;
    let scan_duration = scan_start.elapsed();

    print_results(&results, &args.output_format, scan_duration)?;
    Ok(())
}

pub fn show_capabilities(json: bool) -> Result<()> {
    print_capabilities(&Capabilities::detect(), json)
}

/// Start from the preset, then apply explicit flags.
pub fn build_options(args: &ScanArgs) -> Result<ScanOptions> {
    let mut options = ScanOptions::preset(&args.preset)?;

    if let Some(strategy) = &args.tcp_strategy {
        options.tcp_strategy = strategy.parse::<TcpStrategy>()?;
    }
    if let Some(ms) = args.timeout {
        let timeout = Duration::from_millis(ms);
        options.connect_timeout = timeout;
        options.syn_timeout = timeout;
        options.udp_timeout = timeout;
    }
    if let Some(ms) = args.icmp_deadline {
        options.icmp_deadline = Duration::from_millis(ms);
    }
    if let Some(max) = args.max_in_flight {
        options.max_in_flight = max;
    }
    if args.rate_limit.is_some() {
        options.rate_limit = args.rate_limit;
    }

    options.validate()?;
    Ok(options)
}
