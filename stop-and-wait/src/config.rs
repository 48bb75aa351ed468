//! Endpoint and driver configuration.
//!
//! Everything an endpoint needs besides its collaborators is supplied up
//! front in an [`EndpointConfig`] and validated once at construction.

use std::time::Duration;

use thiserror::Error;

use crate::packet::Address;
use crate::timer::DEFAULT_RETRANSMIT_INTERVAL;

/// Default maximum segment size in bytes.
pub const DEFAULT_MSS: usize = 1024;

/// Largest MSS the wire format can carry.  Over UDP the whole encoded
/// packet must also fit [`crate::socket::MAX_DATAGRAM`].
pub const MAX_MSS: usize = u16::MAX as usize;

/// Per-endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// This endpoint's address.
    pub address: Address,
    /// The address every outbound packet is sent to.
    pub peer: Address,
    /// Maximum payload bytes per data packet.  Only used by the sender.
    pub mss: usize,
    /// Fixed retransmit timeout.  Only used by the sender.
    pub retransmit_interval: Duration,
}

impl EndpointConfig {
    /// Defaults for Endpoint A: `"A"` talking to `"B"`.
    pub fn sender() -> Self {
        Self {
            address: Address::new("A"),
            peer: Address::new("B"),
            mss: DEFAULT_MSS,
            retransmit_interval: DEFAULT_RETRANSMIT_INTERVAL,
        }
    }

    /// Defaults for Endpoint B: `"B"` talking to `"A"`.
    pub fn receiver() -> Self {
        Self {
            address: Address::new("B"),
            peer: Address::new("A"),
            ..Self::sender()
        }
    }

    pub fn with_address(mut self, address: impl Into<Address>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_peer(mut self, peer: impl Into<Address>) -> Self {
        self.peer = peer.into();
        self
    }

    pub fn with_mss(mut self, mss: usize) -> Self {
        self.mss = mss;
        self
    }

    pub fn with_retransmit_interval(mut self, interval: Duration) -> Self {
        self.retransmit_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.as_str().is_empty() || self.peer.as_str().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if self.address == self.peer {
            return Err(ConfigError::SelfPeer(self.address.clone()));
        }
        if self.mss == 0 || self.mss > MAX_MSS {
            return Err(ConfigError::InvalidMss(self.mss));
        }
        if self.retransmit_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

/// Settings for the async per-endpoint driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Delay between two steps of the endpoint.
    pub poll_interval: Duration,
    /// How long to keep servicing packets after the endpoint terminates.
    pub linger: Duration,
    /// Give up if the endpoint has not terminated by then.
    pub deadline: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            linger: Duration::ZERO,
            deadline: None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("endpoint addresses must not be empty")]
    EmptyAddress,
    #[error("endpoint {0} cannot be its own peer")]
    SelfPeer(Address),
    #[error("MSS must be between 1 and 65535, got {0}")]
    InvalidMss(usize),
    #[error("retransmit interval must be non-zero")]
    ZeroInterval,
}
