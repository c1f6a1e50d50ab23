//! RDT demo node: pumps lines of stdin through a go-back-N transport
//! connected to a single UDP peer, printing whatever the transport
//! delivers back to stdout (§4.3, §6).

use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use overlay_common::substrate::{PointSubstrate, UdpPointSubstrate};
use rdt::{Rdt, IDLE_SLEEP};

/// RDT demo: reliable delivery of stdin lines to a UDP peer.
#[derive(Parser, Debug)]
#[command(name = "rdt-node", about = "Go-back-N reliable transport demo")]
struct Cli {
    /// Local UDP address to bind.
    #[arg(long)]
    local: SocketAddr,
    /// Remote peer's UDP address.
    #[arg(long)]
    remote: SocketAddr,
    /// Send-window size (must be <= 2^14 - 1).
    #[arg(long, default_value_t = 8)]
    window: u16,
    /// Retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    info!(local = %cli.local, remote = %cli.remote, window = cli.window, "rdt-node starting");

    let substrate = Arc::new(UdpPointSubstrate::connect(cli.local, cli.remote)?);
    let mut rdt = Rdt::new(cli.window, Duration::from_millis(cli.timeout_ms), substrate)?;

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = quit.clone();
        ctrlc::set_handler(move || {
            info!("shutdown signal received, draining send window");
            quit.store(true, Ordering::SeqCst);
        })
        .expect("error setting signal handler");
    }

    let (line_tx, line_rx) = crossbeam_channel::unbounded::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let stdout = std::io::stdout();
    while !(quit.load(Ordering::SeqCst) && rdt.drained()) {
        let mut did_work = false;

        if let Ok(line) = line_rx.try_recv() {
            rdt.send(Bytes::from(line.into_bytes()));
            did_work = true;
        }
        if let Some(payload) = rdt.receive() {
            let mut out = stdout.lock();
            out.write_all(&payload)?;
            out.write_all(b"\n")?;
            did_work = true;
        }
        if rdt.run_once() {
            did_work = true;
        }
        if !did_work {
            std::thread::sleep(IDLE_SLEEP);
        }
    }

    info!("rdt-node stopped");
    Ok(())
}
