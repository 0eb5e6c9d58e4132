//! Output formatting for scan results

use anyhow::Result;
use serde_json::json;
use std::io::{self, Write};
use std::time::Duration;

use portprobe_common::{PortState, ScanStats, Target};
use portprobe_orchestrator::Capabilities;

/// Print scan results to stdout in the specified format.
pub fn print_results(results: &[Target], format: &str, scan_duration: Duration) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_results(&mut out, results, format, scan_duration)
}

pub fn write_results(
    out: &mut impl Write,
    results: &[Target],
    format: &str,
    scan_duration: Duration,
) -> Result<()> {
    match format.trim().to_lowercase().as_str() {
        "json" | "j" => write_json(out, results, scan_duration)?,
        "csv" | "c" => write_csv(out, results)?,
        "table" | "text" | "t" | "" => write_table(out, results, scan_duration)?,
        other => {
            eprintln!("Warning: Unknown format '{}', using default table format", other);
            write_table(out, results, scan_duration)?;
        }
    }
    Ok(())
}

/// Results in probe order; closed targets only show up in the summary.
fn write_table(out: &mut impl Write, results: &[Target], scan_duration: Duration) -> io::Result<()> {
    if results.is_empty() {
        writeln!(out, "\nNo results to display.\n")?;
        return Ok(());
    }

    writeln!(out, "\n{:-<60}", "")?;
    writeln!(out, "{:<10} {:<40} {:<8} {:<10}", "PROTOCOL", "HOST", "PORT", "STATE")?;
    writeln!(out, "{:-<60}", "")?;

    for target in results.iter().filter(|t| t.state != PortState::Closed) {
        let port = target.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:<10} {:<40} {:<8} {:<10}",
            target.protocol,
            target.ip.to_string(),
            port,
            target.state
        )?;
    }

    let stats = ScanStats::from_targets(results);
    writeln!(out, "{:-<60}", "")?;
    writeln!(out, "\nSummary:")?;
    writeln!(out, "  Total probed: {}", stats.total)?;
    writeln!(out, "  Open: {}", stats.open)?;
    writeln!(out, "  Closed: {}", stats.closed)?;
    writeln!(out, "  Filtered: {}", stats.filtered)?;
    writeln!(out, "  Scan duration: {}", format_duration(scan_duration))?;
    writeln!(out)
}

fn write_json(out: &mut impl Write, results: &[Target], scan_duration: Duration) -> Result<()> {
    let output = json!({
        "scan_info": {
            "duration_seconds": scan_duration.as_secs_f64(),
            "duration_formatted": format_duration(scan_duration),
            "stats": ScanStats::from_targets(results),
        },
        "results": results,
    });

    writeln!(out, "{}", serde_json::to_string_pretty(&output)?)?;
    Ok(())
}

fn write_csv(out: &mut impl Write, results: &[Target]) -> io::Result<()> {
    writeln!(out, "protocol,ip,port,state")?;
    for target in results {
        let port = target.port.map(|p| p.to_string()).unwrap_or_default();
        writeln!(out, "{},{},{},{}", target.protocol, target.ip, port, target.state)?;
    }
    Ok(())
}

pub fn print_capabilities(caps: &Capabilities, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(caps)?);
        return Ok(());
    }
    let yes_no = |b: bool| if b { "available" } else { "unavailable (needs root or CAP_NET_RAW)" };
    println!("tcp connect: available");
    println!("tcp syn:     {}", yes_no(caps.raw_tcp));
    println!("udp:         available");
    println!("icmp echo:   {}", yes_no(caps.raw_icmp));
    Ok(())
}

/// Format duration in a human-readable way
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs == 0 {
        format!("{}ms", millis)
    } else if total_secs < 60 {
        if millis > 0 {
            format!("{}.{:03}s", total_secs, millis)
        } else {
            format!("{}s", total_secs)
        }
    } else {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    }
}
