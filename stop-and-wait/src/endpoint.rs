//! The capability shared by both endpoint roles.
//!
//! Each role is its own type ([`crate::sender::SenderEndpoint`],
//! [`crate::receiver::ReceiverEndpoint`]), chosen once at construction.  A
//! driver only needs this trait: it calls [`Endpoint::on_packet_available`]
//! and [`Endpoint::on_tick`] repeatedly, from a single task, until
//! [`Endpoint::is_terminated`] says to stop.

use thiserror::Error;

use crate::config::ConfigError;
use crate::link::LinkError;
use crate::packet::Address;

/// One side of a connection, driven by an external loop.
pub trait Endpoint {
    fn address(&self) -> &Address;

    /// Send or retransmit if the state machine calls for it.
    fn on_tick(&mut self) -> Result<(), EndpointError>;

    /// Consume at most one inbound packet.
    ///
    /// Returns `Ok(false)` when the link had nothing waiting.  That is a
    /// normal outcome and never advances any sequence state.
    fn on_packet_available(&mut self) -> Result<bool, EndpointError>;

    /// `true` once the endpoint has reached its terminal state.
    fn is_terminated(&self) -> bool;
}

/// Errors surfaced by endpoints.
///
/// Protocol anomalies (lost, duplicate or stale packets) are handled inside
/// the state machines and never show up here; only collaborator failures do.
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("link failure: {0}")]
    Link(#[from] LinkError),
    #[error("byte source read failed: {0}")]
    Source(#[source] std::io::Error),
    #[error("byte sink write failed: {0}")]
    Sink(#[source] std::io::Error),
}
