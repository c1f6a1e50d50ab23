//! DHT server node: joins (or bootstraps) a Chord-style ring and serves
//! `get`/`put` requests until asked to leave (§6, §9).

use std::io::Write;
use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dht_server::{AddressedSubstrate, DhtNode, UdpAddressedSubstrate};

/// DHT ring node daemon.
#[derive(Parser, Debug)]
#[command(name = "dht-server", about = "Chord-style DHT ring node")]
struct Cli {
    /// This node's own address (`ip:port`), used both to bind and to
    /// identify itself to peers.
    my_ip: SocketAddrV4,
    /// Bound size of the shortcut routing table.
    num_routes: usize,
    /// File this node persists its own `ip port` line to.
    cfg_file: PathBuf,
    /// Enable the per-key value cache.
    #[arg(long)]
    cache: bool,
    /// Verbose routing-table change logging.
    #[arg(long)]
    debug: bool,
    /// File containing the address of an existing ring member to join
    /// through. Omit to bootstrap a brand-new ring of one.
    #[arg(long)]
    pred_file: Option<PathBuf>,
}

fn persist_cfg(path: &PathBuf, addr: SocketAddrV4) -> anyhow::Result<()> {
    let mut f = std::fs::File::create(path)?;
    writeln!(f, "{} {}", addr.ip(), addr.port())?;
    Ok(())
}

fn read_pred_addr(path: &PathBuf) -> anyhow::Result<SocketAddrV4> {
    let text = std::fs::read_to_string(path)?;
    let text = text.trim();
    if let Some((ip, port)) = text.split_once(' ') {
        Ok(format!("{ip}:{port}").parse()?)
    } else {
        Ok(text.parse()?)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!(my_ip = %cli.my_ip, num_routes = cli.num_routes, cache = cli.cache, "dht-server starting");

    let debug_level = u8::from(cli.debug);
    let substrate: Arc<dyn AddressedSubstrate> = Arc::new(UdpAddressedSubstrate::bind(cli.my_ip)?);
    let mut node = DhtNode::bootstrap(cli.my_ip, cli.num_routes, cli.cache, debug_level, substrate);

    if let Some(pred_file) = &cli.pred_file {
        let pred = read_pred_addr(pred_file)?;
        node.join(pred);
    }

    persist_cfg(&cli.cfg_file, cli.my_ip)?;

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = quit.clone();
        ctrlc::set_handler(move || {
            info!("shutdown signal received");
            quit.store(true, Ordering::SeqCst);
        })
        .expect("error setting signal handler");
    }

    node.run(|| quit.load(Ordering::SeqCst));
    node.leave();

    info!("dht-server stopped");
    Ok(())
}
