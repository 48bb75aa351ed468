//! UDP-backed [`Link`].
//!
//! [`UdpLink`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`Packet`] instead of raw bytes.  The endpoints expect a non-blocking,
//! pollable link, so only the socket's `try_*` operations are used: nothing
//! here ever awaits.  UDP is already unreliable, and the protocol recovers
//! from loss, so anything the socket cannot deliver right now is treated as
//! a lost packet.
//!
//! A link bound without a peer adopts the source of the first datagram
//! addressed to it, so Endpoint B can answer a sender on an ephemeral port.

use std::io;
use std::net::SocketAddr;
use std::sync::OnceLock;

use tokio::net::UdpSocket;

use crate::link::{Link, LinkError};
use crate::packet::{Address, Packet};

/// Largest UDP payload an IPv4 datagram can carry.
pub const MAX_DATAGRAM: usize = 65_507;

/// One endpoint's half of a UDP point-to-point link.
#[derive(Debug)]
pub struct UdpLink {
    /// Address this socket is bound to (after the OS assigns a port).
    pub local_addr: SocketAddr,
    peer: OnceLock<SocketAddr>,
    inner: UdpSocket,
}

impl UdpLink {
    /// Bind `local_addr` and send everything to `peer`.
    ///
    /// Passing port `0` lets the OS choose an ephemeral port.  With no
    /// `peer`, the first sender heard from becomes the peer.
    pub async fn bind(
        local_addr: SocketAddr,
        peer: Option<SocketAddr>,
    ) -> Result<Self, LinkError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            peer: peer.map(OnceLock::from).unwrap_or_default(),
            inner,
        })
    }

    /// Where outbound packets go, `None` until a peer is known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer.get().copied()
    }

    /// Redirect outbound packets, e.g. once the peer's ephemeral port is known.
    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = OnceLock::from(peer);
    }
}

impl Link for UdpLink {
    fn send(&self, packet: &Packet, from: &Address) -> Result<(), LinkError> {
        let bytes = packet.encode()?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(LinkError::DatagramTooLarge(bytes.len()));
        }
        let Some(peer) = self.peer() else {
            log::warn!("[{from}] no peer known yet, dropping {packet}");
            return Ok(());
        };
        match self.inner.try_send_to(&bytes, peer) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                log::warn!("[{from}] socket busy, dropping {packet}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn recv(&self, at: &Address) -> Result<Option<Packet>, LinkError> {
        let mut buf = vec![0u8; u16::MAX as usize];
        loop {
            let (n, addr) = match self.inner.try_recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            match Packet::decode(&buf[..n]) {
                Ok(packet) if packet.dst() == at => {
                    if self.peer.set(addr).is_ok() {
                        log::info!("[{at}] peer is {addr}");
                    }
                    return Ok(Some(packet));
                }
                Ok(packet) => log::warn!("[{at}] datagram from {addr} for {}, dropped", packet.dst()),
                Err(e) => log::warn!("[{at}] undecodable datagram from {addr}: {e}"),
            }
        }
    }
}
