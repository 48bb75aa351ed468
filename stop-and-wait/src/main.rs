//! Entry point for `stop-and-wait`.
//!
//! Parses CLI arguments and dispatches into **send**, **recv** or
//! **simulate** mode.  All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, argument parsing, files).

use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use stop_and_wait::config::{DriverConfig, EndpointConfig, DEFAULT_MSS};
use stop_and_wait::driver::{drive, run_lockstep};
use stop_and_wait::simulator::{SimulatedLink, SimulatorConfig};
use stop_and_wait::socket::UdpLink;
use stop_and_wait::timer::MockClock;
use stop_and_wait::{Link, ReceiverEndpoint, SenderEndpoint};

/// Reliable file transfer with Stop-and-Wait ARQ.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Act as Endpoint A: connect to a receiver and send a file over UDP.
    Send {
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// Receiver address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        peer: SocketAddr,
        /// File to send.
        #[arg(short, long)]
        input: PathBuf,
        /// Maximum payload bytes per data packet.
        #[arg(long, default_value_t = DEFAULT_MSS)]
        mss: usize,
        /// Retransmit timeout in milliseconds.
        #[arg(long, default_value_t = 3000)]
        rto_ms: u64,
        /// Give up after this many seconds.
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Act as Endpoint B: accept one transfer over UDP and write it to a file.
    Recv {
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Sender address replies go to.  Defaults to wherever the first
        /// packet comes from.
        #[arg(short, long)]
        peer: Option<SocketAddr>,
        /// Where received bytes are written.
        #[arg(short, long)]
        output: PathBuf,
        /// Keep answering retransmitted FINs this long after teardown.
        #[arg(long, default_value_t = 6000)]
        linger_ms: u64,
    },
    /// Run both endpoints in-process over a simulated lossy link.
    Simulate {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MSS)]
        mss: usize,
        /// Probability of dropping any packet.
        #[arg(long, default_value_t = 0.0, value_parser = parse_probability)]
        loss: f64,
        /// Probability of delivering a packet twice.
        #[arg(long, default_value_t = 0.0, value_parser = parse_probability)]
        duplicate: f64,
        /// Seed for the fault model.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Simulated time per round, in milliseconds.
        #[arg(long, default_value_t = 10)]
        tick_ms: u64,
        /// Retransmit timeout in simulated milliseconds.
        #[arg(long, default_value_t = 3000)]
        rto_ms: u64,
        #[arg(long, default_value_t = 10_000_000)]
        max_rounds: usize,
    },
}

fn parse_probability(raw: &str) -> Result<f64, String> {
    let p: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(format!("{p} is not a probability in [0, 1]"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send {
            bind,
            peer,
            input,
            mss,
            rto_ms,
            deadline_secs,
        } => {
            let source = File::open(&input)
                .with_context(|| format!("opening {}", input.display()))?;
            let link = UdpLink::bind(bind, Some(peer)).await?;
            log::info!("Sending {} from {} to {peer}", input.display(), link.local_addr);

            let config = EndpointConfig::sender()
                .with_mss(mss)
                .with_retransmit_interval(Duration::from_millis(rto_ms));
            let mut sender = SenderEndpoint::new(config, source, Arc::new(link))?;
            let driver = DriverConfig {
                deadline: deadline_secs.map(Duration::from_secs),
                ..DriverConfig::default()
            };
            drive(&mut sender, &driver).await?;
            log::info!("Transfer complete");
        }
        Mode::Recv {
            bind,
            peer,
            output,
            linger_ms,
        } => {
            let sink = File::create(&output)
                .with_context(|| format!("creating {}", output.display()))?;
            let link = UdpLink::bind(bind, peer).await?;
            log::info!("Receiving on {} into {}", link.local_addr, output.display());

            let mut receiver =
                ReceiverEndpoint::new(EndpointConfig::receiver(), sink, Arc::new(link))?;
            let driver = DriverConfig {
                linger: Duration::from_millis(linger_ms),
                ..DriverConfig::default()
            };
            drive(&mut receiver, &driver).await?;
            log::info!("Peer closed the connection");
        }
        Mode::Simulate {
            input,
            output,
            mss,
            loss,
            duplicate,
            seed,
            tick_ms,
            rto_ms,
            max_rounds,
        } => {
            let source = File::open(&input)
                .with_context(|| format!("opening {}", input.display()))?;
            let sink = File::create(&output)
                .with_context(|| format!("creating {}", output.display()))?;

            let simulated = Arc::new(SimulatedLink::new(SimulatorConfig {
                loss_rate: loss,
                duplicate_rate: duplicate,
                seed,
            }));
            let link: Arc<dyn Link> = simulated.clone();
            let clock = Arc::new(MockClock::new());

            let config = EndpointConfig::sender()
                .with_mss(mss)
                .with_retransmit_interval(Duration::from_millis(rto_ms));
            let mut sender =
                SenderEndpoint::new(config, source, link.clone())?.with_clock(clock.clone());
            let mut receiver = ReceiverEndpoint::new(EndpointConfig::receiver(), sink, link)?;

            let tick = Duration::from_millis(tick_ms);
            let rounds = run_lockstep(&mut sender, &mut receiver, || clock.advance(tick), max_rounds)?;
            log::info!(
                "Simulation finished after {rounds} rounds: {} packets sent, {} dropped",
                simulated.sent().len(),
                simulated.dropped().len()
            );
        }
    }

    Ok(())
}
