//! The DHT's packet I/O layer: unlike the overlay router/RDT substrates,
//! a DHT node talks to an open-ended set of peers addressed by
//! `SocketAddrV4`, so it gets its own small trait rather than reusing
//! `overlay_common::substrate` — same trait-plus-real-and-fake-impl
//! shape, different addressing model.

use std::collections::VecDeque;
use std::net::{SocketAddrV4, UdpSocket};
use std::sync::Mutex;

use crate::error::Result;

pub trait AddressedSubstrate: Send + Sync {
    fn incoming(&self) -> bool;
    fn receive(&self) -> Option<(Vec<u8>, SocketAddrV4)>;
    fn send(&self, data: &[u8], to: SocketAddrV4) -> Result<()>;
}

pub struct UdpAddressedSubstrate {
    socket: UdpSocket,
}

impl UdpAddressedSubstrate {
    pub fn bind(local: SocketAddrV4) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        Ok(UdpAddressedSubstrate { socket })
    }
}

impl AddressedSubstrate for UdpAddressedSubstrate {
    fn incoming(&self) -> bool {
        let mut probe = [0u8; 0];
        matches!(self.socket.peek_from(&mut probe), Ok(_))
    }

    fn receive(&self) -> Option<(Vec<u8>, SocketAddrV4)> {
        let mut buf = [0u8; 65536];
        match self.socket.recv_from(&mut buf) {
            Ok((n, std::net::SocketAddr::V4(from))) => Some((buf[..n].to_vec(), from)),
            _ => None,
        }
    }

    fn send(&self, data: &[u8], to: SocketAddrV4) -> Result<()> {
        self.socket.send_to(data, to)?;
        Ok(())
    }
}

/// Deterministic in-memory substrate for tests.
#[derive(Default)]
pub struct MockAddressedSubstrate {
    inbound: Mutex<VecDeque<(Vec<u8>, SocketAddrV4)>>,
    outbound: Mutex<Vec<(Vec<u8>, SocketAddrV4)>>,
}

impl MockAddressedSubstrate {
    pub fn new() -> Self {
        MockAddressedSubstrate::default()
    }

    pub fn inject(&self, data: Vec<u8>, from: SocketAddrV4) {
        self.inbound.lock().unwrap().push_back((data, from));
    }

    pub fn drain_sent(&self) -> Vec<(Vec<u8>, SocketAddrV4)> {
        std::mem::take(&mut self.outbound.lock().unwrap())
    }
}

impl AddressedSubstrate for MockAddressedSubstrate {
    fn incoming(&self) -> bool {
        !self.inbound.lock().unwrap().is_empty()
    }

    fn receive(&self) -> Option<(Vec<u8>, SocketAddrV4)> {
        self.inbound.lock().unwrap().pop_front()
    }

    fn send(&self, data: &[u8], to: SocketAddrV4) -> Result<()> {
        self.outbound.lock().unwrap().push((data.to_vec(), to));
        Ok(())
    }
}
