use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "portprobe")]
#[command(version)]
#[command(about = "Concurrent TCP/UDP/ICMP reachability prober", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe a batch of targets
    Scan(ScanArgs),

    /// Show which raw-socket scans this process may run
    Capabilities {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Protocol to probe with
    #[arg(long, default_value = "tcp", value_parser = ["tcp", "udp", "icmp"])]
    pub protocol: String,

    /// Addresses. Examples: 127.0.0.1 or 10.0.0.0/30,192.168.1.7
    #[arg(short, long, required = true)]
    pub addresses: String,

    /// Ports (tcp/udp only). Examples: 80,443 or 1-1024 or 22,80-90
    #[arg(short, long)]
    pub ports: Option<String>,

    /// TCP strategy; defaults to the preset's
    #[arg(long, value_parser = ["auto", "connect", "syn"])]
    pub tcp_strategy: Option<String>,

    /// Per-target timeout in milliseconds (connect, SYN and UDP)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Overall wait for ICMP replies in milliseconds
    #[arg(long)]
    pub icmp_deadline: Option<u64>,

    /// Max probes in flight
    #[arg(short = 'c', long)]
    pub max_in_flight: Option<usize>,

    /// Rate limit (probes per second)
    #[arg(short = 'r', long)]
    pub rate_limit: Option<u32>,

    /// Preset: fast, balanced, accurate, stealth
    #[arg(long, default_value = "balanced", value_parser = ["fast", "balanced", "accurate", "stealth"])]
    pub preset: String,

    /// Output format: text, json, csv
    #[arg(short, long, default_value = "text", value_parser = ["text", "json", "csv"])]
    pub output_format: String,
}
