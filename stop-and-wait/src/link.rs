//! The link abstraction both endpoints talk through.
//!
//! A [`Link`] is an unreliable, non-blocking, point-to-point packet carrier.
//! It may drop or duplicate packets; it never blocks.  Endpoints hold it as
//! `Arc<dyn Link>`, so it is the only state shared between them.
//!
//! Implementations:
//! - [`crate::simulator::SimulatedLink`]: in-memory with fault injection.
//! - [`crate::socket::UdpLink`]: one side of a UDP socket pair.

use thiserror::Error;

use crate::packet::{Address, Packet, PacketError};

/// Non-blocking packet carrier between endpoints.
pub trait Link: Send + Sync {
    /// Hand `packet` to the link on behalf of `from`.
    ///
    /// Success means the link accepted the packet, not that it will arrive.
    fn send(&self, packet: &Packet, from: &Address) -> Result<(), LinkError>;

    /// Poll for the next packet addressed to `at`.
    ///
    /// `Ok(None)` means nothing is waiting right now; it is not an error.
    fn recv(&self, at: &Address) -> Result<Option<Packet>, LinkError>;
}

/// Failures of the link itself (as opposed to packet loss, which is silent).
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet could not be encoded: {0}")]
    Packet(#[from] PacketError),
    #[error("encoded packet is {0} bytes, more than one datagram can carry")]
    DatagramTooLarge(usize),
    #[error("link state poisoned by a panicking user")]
    Poisoned,
}
