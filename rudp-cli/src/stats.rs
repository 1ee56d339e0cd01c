//! Statistics display and formatting

use rudp_protocol::ConnectionStats;
use std::io::Write;
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format bandwidth in human-readable form
pub fn format_bandwidth(bps: u64) -> String {
    const KBPS: u64 = 1000;
    const MBPS: u64 = KBPS * 1000;

    if bps >= MBPS {
        format!("{:.2} Mbps", bps as f64 / MBPS as f64)
    } else if bps >= KBPS {
        format!("{:.2} Kbps", bps as f64 / KBPS as f64)
    } else {
        format!("{} bps", bps)
    }
}

/// Format an optional RTT sample
pub fn format_rtt(rtt: Option<Duration>) -> String {
    match rtt {
        None => "N/A".to_string(),
        Some(rtt) if rtt >= Duration::from_secs(1) => format!("{:.2}s", rtt.as_secs_f64()),
        Some(rtt) if rtt >= Duration::from_millis(1) => {
            format!("{:.2}ms", rtt.as_secs_f64() * 1_000.0)
        }
        Some(rtt) => format!("{}µs", rtt.as_micros()),
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn throughput_bps(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 * 8.0 / secs) as u64
    } else {
        0
    }
}

/// Render the end-of-transfer summary table
pub fn render_connection_stats(stats: &ConnectionStats, elapsed: Duration) -> String {
    let rows = [
        ("Elapsed", format_duration(elapsed)),
        (
            "Packets",
            format!(
                "{} sent / {} received",
                stats.packets_sent, stats.packets_received
            ),
        ),
        (
            "Payload",
            format!(
                "{} sent / {} received",
                format_bytes(stats.bytes_sent),
                format_bytes(stats.bytes_received)
            ),
        ),
        (
            "Throughput",
            format_bandwidth(throughput_bps(
                stats.bytes_sent.max(stats.bytes_received),
                elapsed,
            )),
        ),
        ("Retransmits", stats.packets_retransmitted.to_string()),
        (
            "Dropped",
            format!(
                "{} corrupt / {} duplicate / {} out of order",
                stats.corrupt_dropped, stats.duplicates_received, stats.out_of_order_received
            ),
        ),
        ("Last RTT", format_rtt(stats.last_rtt)),
    ];

    let mut out = String::new();
    out.push_str("┌──────────────────────────────────────────────────────────┐\n");
    out.push_str("│ CONNECTION STATISTICS                                    │\n");
    out.push_str("├──────────────────────────────────────────────────────────┤\n");
    for (label, value) in rows {
        out.push_str(&format!("│ {:<12} {:<43} │\n", label, value));
    }
    out.push_str("└──────────────────────────────────────────────────────────┘");
    out
}

/// Display the summary table on stderr
pub fn display_connection_stats(stats: &ConnectionStats, elapsed: Duration) {
    eprintln!("\n{}", render_connection_stats(stats, elapsed));
}

/// Display compact stats on one line (for continuous updates)
pub fn display_compact_stats(stats: &ConnectionStats, elapsed: Duration) {
    eprint!(
        "\r[{:8}] Sent: {} | Recv: {} | Rate: {} | Retx: {}         ",
        format_duration(elapsed),
        format_bytes(stats.bytes_sent),
        format_bytes(stats.bytes_received),
        format_bandwidth(throughput_bps(
            stats.bytes_sent.max(stats.bytes_received),
            elapsed
        )),
        stats.packets_retransmitted
    );
    let _ = std::io::stderr().flush();
}
