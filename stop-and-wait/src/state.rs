//! Endpoint finite-state-machine types.
//!
//! State transitions live in [`crate::sender`] and [`crate::receiver`]; this
//! module only names the states and the flags derived from them.

use std::fmt;

/// States of Endpoint A, visited strictly in declaration order.
///
/// ```text
///  IDLE ──SYN sent──▶ SYN_SENT ──SYN-ACK──▶ ESTABLISHED
///                                               │
///                                  source EOF,  │
///                                  FIN sent     ▼
///                     CLOSED ◀──FIN-ACK── FIN_SENT
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Nothing sent yet.
    #[default]
    Idle,
    /// SYN in flight; waiting for SYN-ACK.
    SynSent,
    /// Handshake done; data transfer in progress.
    Established,
    /// FIN in flight; waiting for FIN-ACK.
    FinSent,
    /// Final ACK sent.  Terminal.
    Closed,
}

impl SenderState {
    pub fn conn_setup_done(self) -> bool {
        self != SenderState::Idle
    }

    pub fn conn_established(self) -> bool {
        matches!(
            self,
            SenderState::Established | SenderState::FinSent | SenderState::Closed
        )
    }

    /// 0 = teardown not started, 1 = FIN sent, 2 = FIN-ACK acknowledged.
    pub fn conn_terminate(self) -> u8 {
        match self {
            SenderState::FinSent => 1,
            SenderState::Closed => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SenderState::Idle => "IDLE",
            SenderState::SynSent => "SYN_SENT",
            SenderState::Established => "ESTABLISHED",
            SenderState::FinSent => "FIN_SENT",
            SenderState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// States of Endpoint B.
///
/// There is deliberately no closed state: after answering a FIN, B keeps
/// answering retransmitted FINs for as long as it is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// Waiting for SYN.
    #[default]
    Listen,
    /// SYN answered; accepting data.
    Established,
    /// FIN answered with FIN-ACK.
    FinReceived,
}

impl ReceiverState {
    pub fn conn_setup_done(self) -> bool {
        self != ReceiverState::Listen
    }

    /// 0 = teardown not started, 1 = FIN answered.
    pub fn conn_terminate(self) -> u8 {
        match self {
            ReceiverState::FinReceived => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReceiverState::Listen => "LISTEN",
            ReceiverState::Established => "ESTABLISHED",
            ReceiverState::FinReceived => "FIN_RECEIVED",
        };
        f.write_str(name)
    }
}
