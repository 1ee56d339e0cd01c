//! RUDP Receiver
//!
//! Accepts one `rudp-send` peer and writes everything it delivers to stdout
//! or a file, stopping once the peer has been silent for the idle timeout.

use clap::Parser;
use rudp::RudpStream;
use rudp_cli::{
    display_compact_stats, display_connection_stats, init_logging, open_output, Config,
};
use rudp_io::Timer;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "rudp-recv")]
#[command(about = "Receive an RUDP transfer into stdout or a file", long_about = None)]
struct Args {
    /// Listen address (default 127.0.0.1:20001)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Output destination: file path or '-' for stdout
    #[arg(short, long)]
    output: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many seconds without data
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Give up if no sender connects within this many seconds
    #[arg(long)]
    accept_timeout: Option<u64>,

    /// Write an example configuration file and exit
    #[arg(long)]
    example_config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Some(path) = &args.example_config {
        Config::example_receiver().to_file(path)?;
        tracing::info!("Wrote example receiver configuration to {}", path.display());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::example_receiver(),
    };
    if let Some(bind) = args.bind {
        config.endpoint.bind = bind;
    }
    if let Some(output) = args.output {
        config.endpoint.output = output;
    }
    if let Some(secs) = args.idle_timeout {
        config.endpoint.idle_timeout_secs = secs;
    }
    let conn_config = config.connection_config()?;

    tracing::info!("RUDP Receiver starting...");
    tracing::info!("Listening on: {}", config.endpoint.bind);
    let mut stream = RudpStream::accept_udp(
        config.endpoint.bind.ip(),
        conn_config,
        args.accept_timeout.map(Duration::from_secs),
    )?;
    if let Some(peer) = stream.peer_addr() {
        tracing::info!("Accepted connection from {}", peer);
    }

    let mut writer = open_output(&config.endpoint.output)?;
    let idle_timeout = config.endpoint.idle_timeout();
    let mut stats_timer = config.endpoint.stats_interval().map(Timer::new);
    let start = Instant::now();

    while let Some((payload, from)) = stream.receive(Some(idle_timeout))? {
        tracing::trace!("{} bytes from {}", payload.len(), from);
        writer.write_all(&payload)?;

        if let Some(timer) = stats_timer.as_mut() {
            if timer.try_fire() {
                display_compact_stats(stream.stats(), start.elapsed());
            }
        }
    }
    tracing::info!("No data for {:?}, finishing", idle_timeout);

    writer.flush()?;
    display_connection_stats(stream.stats(), start.elapsed());
    Ok(())
}
