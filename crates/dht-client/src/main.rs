//! DHT client: sends a single `get`/`put` request to a ring member read
//! from its persisted `cfgFile` and prints the reply (§6, §9).

use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dht_server::{AddressedSubstrate, DhtPacket, PacketKind, UdpAddressedSubstrate};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_SLEEP: Duration = Duration::from_millis(5);

#[derive(Subcommand, Debug)]
enum Command {
    Get { key: String },
    Put { key: String, value: Option<String> },
}

/// Single-shot DHT client.
#[derive(Parser, Debug)]
#[command(name = "dht-client", about = "Send one get/put to a DHT ring")]
struct Cli {
    /// This client's own address (`ip:port`) to bind its socket to.
    my_ip: SocketAddrV4,
    /// File holding the target server's persisted `ip port` line.
    cfg_file: PathBuf,
    #[command(subcommand)]
    command: Command,
}

fn read_server_addr(path: &PathBuf) -> anyhow::Result<SocketAddrV4> {
    let text = std::fs::read_to_string(path)?;
    let (ip, port) = text
        .trim()
        .split_once(' ')
        .ok_or_else(|| anyhow::anyhow!("malformed cfg file {path:?}: expected '<ip> <port>'"))?;
    Ok(format!("{ip}:{port}").parse()?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let server = read_server_addr(&cli.cfg_file)?;

    let mut pkt = match &cli.command {
        Command::Get { key } => {
            let mut p = DhtPacket::empty(PacketKind::Get, 1);
            p.key = Some(key.clone());
            p
        }
        Command::Put { key, value } => {
            let mut p = DhtPacket::empty(PacketKind::Put, 1);
            p.key = Some(key.clone());
            p.value = value.clone();
            p
        }
    };
    pkt.ttl = Some(32);

    let substrate = UdpAddressedSubstrate::bind(cli.my_ip)?;
    substrate.send(pkt.encode().as_bytes(), server)?;
    info!(%server, key = ?pkt.key, "request sent");

    let deadline = Instant::now() + REQUEST_TIMEOUT;
    loop {
        if let Some((bytes, _from)) = substrate.receive() {
            if let Ok(text) = std::str::from_utf8(&bytes) {
                if let Ok(reply) = DhtPacket::parse(text) {
                    if reply.tag == pkt.tag {
                        match reply.kind {
                            PacketKind::Success => match reply.value {
                                Some(v) => println!("{v}"),
                                None => println!("ok"),
                            },
                            PacketKind::NoMatch => println!("no match"),
                            PacketKind::Failure => {
                                println!("failure: {}", reply.reason.unwrap_or_default());
                                std::process::exit(1);
                            }
                            _ => continue,
                        }
                        return Ok(());
                    }
                }
            }
        }
        if Instant::now() >= deadline {
            eprintln!("timed out waiting for a reply");
            std::process::exit(1);
        }
        std::thread::sleep(POLL_SLEEP);
    }
}
