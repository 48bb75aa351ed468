//! `stop-and-wait`: reliable byte transfer over an unreliable link using
//! Stop-and-Wait ARQ.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────────┐  SYN / DATA / FIN   ┌──────────────────┐
//!  │ SenderEndpoint │────────────────────▶│ ReceiverEndpoint │
//!  │      (A)       │◀────────────────────│       (B)        │
//!  └───────┬────────┘  SYN-ACK / ACK /    └────────┬─────────┘
//!          │           FIN-ACK                     │
//!     ByteSource                               ByteSink
//!          │                                       │
//!  ┌───────▼───────────────────────────────────────▼─────────┐
//!  │                  Link (Arc<dyn Link>)                    │
//!  │      SimulatedLink (in-memory)  |  UdpLink (UDP)         │
//!  └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]:    packet value, 1-bit sequence numbers, wire codec
//! - [`state`]:     finite-state-machine types for both roles
//! - [`timer`]:     clocks and the fixed-interval retransmit timer
//! - [`endpoint`]:  the `Endpoint` capability and its error type
//! - [`sender`]:    Endpoint A state machine
//! - [`receiver`]:  Endpoint B state machine
//! - [`link`]:      the link abstraction
//! - [`simulator`]: lossy in-memory link for tests and simulation
//! - [`socket`]:    UDP link
//! - [`io`]:        byte source / sink collaborators
//! - [`trace`]:     protocol trace events and sinks
//! - [`config`]:    endpoint and driver configuration
//! - [`driver`]:    loops that step endpoints

pub mod config;
pub mod driver;
pub mod endpoint;
pub mod io;
pub mod link;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;
pub mod trace;

pub use config::{DriverConfig, EndpointConfig};
pub use endpoint::{Endpoint, EndpointError};
pub use link::{Link, LinkError};
pub use packet::{Address, Packet, PacketKind, SeqBit};
pub use receiver::ReceiverEndpoint;
pub use sender::SenderEndpoint;
