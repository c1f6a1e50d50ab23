//! Overlay router node: runs the Forwarder and Router as two threads
//! sharing a forwarding table and a UDP link substrate (§5).

mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use overlay_common::substrate::{LinkSubstrate, UdpLinkSubstrate};
use overlay_forwarder::{Forwarder, ForwardingTable};
use overlay_router::Router;

use config::NodeConfigInput;

/// Overlay router node daemon.
#[derive(Parser, Debug)]
#[command(name = "overlay-node", about = "Path-vector overlay router node")]
struct Cli {
    /// Path to the node's TOML config file.
    #[arg(long, default_value = "node.toml")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let raw = std::fs::read_to_string(&cli.config)?;
    let input: NodeConfigInput = toml::from_str(&raw)?;
    let cfg = input.resolve()?;

    info!(
        my_ip = %overlay_common::format_ip(cfg.my_ip),
        bind_addr = %cfg.bind_addr,
        prefix = %cfg.prefix,
        links = cfg.links.len(),
        "overlay-node starting"
    );

    let peer_addrs: Vec<_> = cfg.links.iter().map(|l| l.peer_addr).collect();
    let peer_ips: Vec<u32> = cfg.links.iter().map(|l| l.peer_ip).collect();

    let substrate: Arc<dyn LinkSubstrate> =
        Arc::new(UdpLinkSubstrate::bind(cfg.bind_addr, peer_addrs)?);

    let table = Arc::new(ForwardingTable::new(0));
    let forwarder = Arc::new(Forwarder::new(cfg.my_ip, table, substrate));

    let mut router = Router::new(
        cfg.my_ip,
        cfg.prefix,
        peer_ips,
        forwarder.clone(),
        cfg.debug,
        cfg.failure_advert,
    );

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = quit.clone();
        ctrlc::set_handler(move || {
            info!("shutdown signal received");
            quit.store(true, Ordering::SeqCst);
        })
        .expect("error setting signal handler");
    }

    let fwd_quit = quit.clone();
    let fwd_for_thread = forwarder.clone();
    let forwarder_handle =
        std::thread::spawn(move || fwd_for_thread.run(|| fwd_quit.load(Ordering::SeqCst)));

    let router_quit = quit.clone();
    let router_handle =
        std::thread::spawn(move || router.run(|| router_quit.load(Ordering::SeqCst)));

    forwarder_handle.join().expect("forwarder thread panicked");
    router_handle.join().expect("router thread panicked");

    info!("overlay-node stopped");
    Ok(())
}
