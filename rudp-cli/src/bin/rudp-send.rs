//! RUDP Sender
//!
//! Reads from stdin or a file and reliably sends it to a waiting `rudp-recv`.

use clap::Parser;
use rudp::RudpStream;
use rudp_cli::pipe::read_chunk;
use rudp_cli::{display_compact_stats, display_connection_stats, init_logging, open_input, Config};
use rudp_io::Timer;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "rudp-send")]
#[command(about = "Send stdin or a file over RUDP", long_about = None)]
struct Args {
    /// Receiver address (host:port)
    #[arg(short, long)]
    peer: Option<SocketAddr>,

    /// Local bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Input source: file path or '-' for stdin
    #[arg(short, long)]
    input: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bytes handed to each reliable send
    #[arg(long, default_value = "16384")]
    chunk_size: usize,

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
        Config::example_sender().to_file(path)?;
        tracing::info!("Wrote example sender configuration to {}", path.display());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::example_sender(),
    };
    if let Some(peer) = args.peer {
        config.endpoint.peer = Some(peer);
    }
    if let Some(bind) = args.bind {
        config.endpoint.bind = bind;
    }
    if let Some(input) = args.input {
        config.endpoint.input = input;
    }
    if args.chunk_size == 0 {
        anyhow::bail!("--chunk-size must be at least 1");
    }

    let Some(peer) = config.endpoint.peer else {
        anyhow::bail!("A peer address is required (--peer or [endpoint] peer)");
    };
    let conn_config = config.connection_config()?;

    tracing::info!("RUDP Sender starting...");
    tracing::info!("Connecting {} -> {}", config.endpoint.bind, peer);
    let mut stream = RudpStream::connect_udp(config.endpoint.bind.ip(), peer, conn_config)?;
    tracing::info!("Connected from {}", stream.local_addr()?);

    let mut reader = open_input(&config.endpoint.input)?;
    let mut buf = vec![0u8; args.chunk_size];
    let mut stats_timer = config.endpoint.stats_interval().map(Timer::new);
    let start = Instant::now();

    loop {
        let n = read_chunk(&mut reader, &mut buf)?;
        if n == 0 {
            tracing::info!("End of input reached");
            break;
        }
        stream.send(&buf[..n])?;

        if let Some(timer) = stats_timer.as_mut() {
            if timer.try_fire() {
                display_compact_stats(stream.stats(), start.elapsed());
            }
        }
    }

    stream.flush()?;
    display_connection_stats(stream.stats(), start.elapsed());
    Ok(())
}
