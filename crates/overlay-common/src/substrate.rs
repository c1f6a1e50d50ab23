//! The substrate abstraction (§2): the lower-level packet I/O layer that
//! performs datagram socket I/O and admission control, treated by the
//! spec as an external collaborator. Two trait shapes are needed:
//!
//! - [`LinkSubstrate`]: the overlay router's view, where link numbers
//!   index a fixed neighbor set (`ready(link)`, `send(pkt, link)`,
//!   `receive() -> (pkt, link)`).
//! - [`PointSubstrate`]: RDT's view, talking to a single peer
//!   (`ready()`, `send(pkt)`, `receive() -> pkt`).
//!
//! Both ship a real UDP-backed implementation and a deterministic
//! in-memory mock, following the same trait-plus-real-and-fake-impl shape
//! as `rist-bonding-core::net::interface::LinkSender`.

use crate::error::Result;
use std::collections::VecDeque;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Mutex;

/// A fixed-neighbor-set packet substrate, as seen by the Forwarder/Router.
pub trait LinkSubstrate: Send + Sync {
    /// Number of configured links.
    fn link_count(&self) -> usize;
    /// True iff a packet is ready to be dequeued via `receive`.
    fn incoming(&self) -> bool;
    /// Dequeue one inbound packet and the link it arrived on.
    fn receive(&self) -> Option<(Vec<u8>, usize)>;
    /// True iff `send` on this link would not block/drop.
    fn ready(&self, link: usize) -> bool;
    /// Send `data` out on `link`.
    fn send(&self, data: &[u8], link: usize) -> Result<()>;
}

/// A single-peer packet substrate, as seen by RDT.
pub trait PointSubstrate: Send + Sync {
    fn incoming(&self) -> bool;
    fn receive(&self) -> Option<Vec<u8>>;
    fn ready(&self) -> bool;
    fn send(&self, data: &[u8]) -> Result<()>;
}

// ─── UDP-backed implementations ─────────────────────────────────────────────

/// A real substrate over a single nonblocking UDP socket with one peer
/// address per link.
pub struct UdpLinkSubstrate {
    socket: UdpSocket,
    peers: Vec<SocketAddr>,
}

impl UdpLinkSubstrate {
    pub fn bind(local: SocketAddr, peers: Vec<SocketAddr>) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        Ok(UdpLinkSubstrate { socket, peers })
    }

    fn link_of(&self, addr: SocketAddr) -> Option<usize> {
        self.peers.iter().position(|p| *p == addr)
    }
}

impl LinkSubstrate for UdpLinkSubstrate {
    fn link_count(&self) -> usize {
        self.peers.len()
    }

    fn incoming(&self) -> bool {
        // UDP sockets don't expose a peek-without-consume primitive that's
        // portable, so `incoming` and `receive` are effectively fused: a
        // zero-length nonblocking peek tells us readiness without consuming.
        let mut probe = [0u8; 0];
        match self.socket.peek_from(&mut probe) {
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(_) => false,
        }
    }

    fn receive(&self) -> Option<(Vec<u8>, usize)> {
        let mut buf = [0u8; 65536];
        match self.socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                let link = self.link_of(from)?;
                Some((buf[..n].to_vec(), link))
            }
            Err(_) => None,
        }
    }

    fn ready(&self, link: usize) -> bool {
        link < self.peers.len()
    }

    fn send(&self, data: &[u8], link: usize) -> Result<()> {
        let peer = self
            .peers
            .get(link)
            .copied()
            .ok_or(crate::error::OverlayError::LinkNotReady(link))?;
        self.socket.send_to(data, peer)?;
        Ok(())
    }
}

/// A real substrate over a single nonblocking UDP socket connected to one peer.
pub struct UdpPointSubstrate {
    socket: UdpSocket,
}

impl UdpPointSubstrate {
    pub fn connect(local: SocketAddr, remote: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        socket.connect(remote)?;
        Ok(UdpPointSubstrate { socket })
    }
}

impl PointSubstrate for UdpPointSubstrate {
    fn incoming(&self) -> bool {
        let mut probe = [0u8; 0];
        matches!(self.socket.peek(&mut probe), Ok(_))
    }

    fn receive(&self) -> Option<Vec<u8>> {
        let mut buf = [0u8; 65536];
        match self.socket.recv(&mut buf) {
            Ok(n) => Some(buf[..n].to_vec()),
            Err(_) => None,
        }
    }

    fn ready(&self) -> bool {
        true
    }

    fn send(&self, data: &[u8]) -> Result<()> {
        self.socket.send(data)?;
        Ok(())
    }
}

// ─── In-memory mocks for tests ──────────────────────────────────────────────

/// A deterministic in-memory multi-link substrate for tests: each link has
/// its own inbound queue that the test harness fills directly, and an
/// outbound log the test harness can inspect.
#[derive(Default)]
pub struct MockLinkSubstrate {
    inbound: Vec<Mutex<VecDeque<Vec<u8>>>>,
    outbound: Mutex<Vec<(Vec<u8>, usize)>>,
    link_ready: Vec<Mutex<bool>>,
}

impl MockLinkSubstrate {
    pub fn new(links: usize) -> Self {
        MockLinkSubstrate {
            inbound: (0..links).map(|_| Mutex::new(VecDeque::new())).collect(),
            outbound: Mutex::new(Vec::new()),
            link_ready: (0..links).map(|_| Mutex::new(true)).collect(),
        }
    }

    /// Inject an inbound packet arriving on `link`.
    pub fn inject(&self, link: usize, data: Vec<u8>) {
        self.inbound[link].lock().unwrap().push_back(data);
    }

    /// Drain everything sent so far.
    pub fn drain_sent(&self) -> Vec<(Vec<u8>, usize)> {
        std::mem::take(&mut self.outbound.lock().unwrap())
    }

    pub fn set_ready(&self, link: usize, ready: bool) {
        *self.link_ready[link].lock().unwrap() = ready;
    }
}

impl LinkSubstrate for MockLinkSubstrate {
    fn link_count(&self) -> usize {
        self.inbound.len()
    }

    fn incoming(&self) -> bool {
        self.inbound.iter().any(|q| !q.lock().unwrap().is_empty())
    }

    fn receive(&self) -> Option<(Vec<u8>, usize)> {
        for (link, q) in self.inbound.iter().enumerate() {
            if let Some(data) = q.lock().unwrap().pop_front() {
                return Some((data, link));
            }
        }
        None
    }

    fn ready(&self, link: usize) -> bool {
        self.link_ready
            .get(link)
            .map(|r| *r.lock().unwrap())
            .unwrap_or(false)
    }

    fn send(&self, data: &[u8], link: usize) -> Result<()> {
        if !self.ready(link) {
            return Err(crate::error::OverlayError::LinkNotReady(link));
        }
        self.outbound.lock().unwrap().push((data.to_vec(), link));
        Ok(())
    }
}

/// A deterministic in-memory single-peer substrate for RDT tests, with
/// optional loss/reorder injection driven by the test, not randomness.
#[derive(Default)]
pub struct MockPointSubstrate {
    inbound: Mutex<VecDeque<Vec<u8>>>,
    outbound: Mutex<Vec<Vec<u8>>>,
    ready: Mutex<bool>,
}

impl MockPointSubstrate {
    pub fn new() -> Self {
        MockPointSubstrate {
            inbound: Mutex::new(VecDeque::new()),
            outbound: Mutex::new(Vec::new()),
            ready: Mutex::new(true),
        }
    }

    pub fn inject(&self, data: Vec<u8>) {
        self.inbound.lock().unwrap().push_back(data);
    }

    pub fn drain_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbound.lock().unwrap())
    }

    pub fn set_ready(&self, ready: bool) {
        *self.ready.lock().unwrap() = ready;
    }
}

impl PointSubstrate for MockPointSubstrate {
    fn incoming(&self) -> bool {
        !self.inbound.lock().unwrap().is_empty()
    }

    fn receive(&self) -> Option<Vec<u8>> {
        self.inbound.lock().unwrap().pop_front()
    }

    fn ready(&self) -> bool {
        *self.ready.lock().unwrap()
    }

    fn send(&self, data: &[u8]) -> Result<()> {
        if !self.ready() {
            return Err(crate::error::OverlayError::LinkNotReady(0));
        }
        self.outbound.lock().unwrap().push(data.to_vec());
        Ok(())
    }
}
