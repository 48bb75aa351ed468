//! Protocol trace events and the sinks that consume them.
//!
//! Endpoints never print.  Every received packet and every protocol decision
//! is reported as a [`TraceEvent`] to an injected [`TraceSink`]:
//! - [`LogTrace`] forwards to the `log` facade (the binary wires this up).
//! - [`RecordingTrace`] keeps events in memory so tests can assert on them.
//! - [`NullTrace`] drops everything.

use std::fmt;
use std::sync::Mutex;

use crate::packet::{Address, Packet, PacketKind, SeqBit};

/// Something an endpoint observed or decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A packet was taken off the link.
    Received(Packet),
    /// A packet was handed to the link for the first time.
    Sent(Packet),
    /// The in-flight packet was resent after a timeout.
    Retransmitted { packet: Packet, tx_count: u32 },
    /// SYN-ACK arrived after the connection was already established.
    DuplicateSynAck,
    /// SYN arrived after setup; SYN-ACK resent without a state change.
    DuplicateSyn,
    /// Plain ACK whose number does not match the in-flight packet.
    StaleAck { got: SeqBit, expected: SeqBit },
    /// Plain ACK matching the in-flight packet; sequence number advanced.
    AckAccepted { seq: SeqBit },
    /// Data packet with an unexpected sequence number; previous ACK resent.
    DuplicateData { seq: SeqBit, expected: SeqBit },
    /// Payload handed to the byte sink.
    Delivered { seq: SeqBit, len: usize },
    /// Packet kind that has no meaning in the current state.
    Ignored { kind: PacketKind },
    /// Handshake complete on this side.
    Established,
    /// Byte source exhausted; FIN queued.
    TeardownStarted,
    /// FIN answered (B) or FIN-ACK acknowledged (A).
    Closed,
    /// A's final ACK reached B.  B's state does not change.
    FinalAckObserved,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Received(p) => write!(f, "received {p}"),
            TraceEvent::Sent(p) => write!(f, "sent {p}"),
            TraceEvent::Retransmitted { packet, tx_count } => {
                write!(f, "timeout, retransmitted {packet} (tx #{tx_count})")
            }
            TraceEvent::DuplicateSynAck => write!(f, "duplicate SYN-ACK ignored"),
            TraceEvent::DuplicateSyn => write!(f, "duplicate SYN, SYN-ACK resent"),
            TraceEvent::StaleAck { got, expected } => {
                write!(f, "stale ACK {got} ignored (expected {expected})")
            }
            TraceEvent::AckAccepted { seq } => write!(f, "ACK for seq {seq} accepted"),
            TraceEvent::DuplicateData { seq, expected } => {
                write!(f, "duplicate data seq {seq} (expected {expected}), re-acked")
            }
            TraceEvent::Delivered { seq, len } => write!(f, "delivered {len} bytes (seq {seq})"),
            TraceEvent::Ignored { kind } => write!(f, "{kind} ignored in current state"),
            TraceEvent::Established => write!(f, "connection established"),
            TraceEvent::TeardownStarted => write!(f, "source exhausted, tearing down"),
            TraceEvent::Closed => write!(f, "connection closed"),
            TraceEvent::FinalAckObserved => write!(f, "final ACK observed"),
        }
    }
}

/// Observer for endpoint activity.
pub trait TraceSink: Send + Sync {
    fn record(&self, at: &Address, event: &TraceEvent);
}

/// Forwards events to the `log` facade.
///
/// Packet traffic goes to `debug`, lifecycle changes to `info`, timeouts to
/// `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTrace;

impl TraceSink for LogTrace {
    fn record(&self, at: &Address, event: &TraceEvent) {
        match event {
            TraceEvent::Established | TraceEvent::TeardownStarted | TraceEvent::Closed => {
                log::info!("[{at}] {event}")
            }
            TraceEvent::Retransmitted { .. } => log::warn!("[{at}] {event}"),
            _ => log::debug!("[{at}] {event}"),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    fn record(&self, _at: &Address, _event: &TraceEvent) {}
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingTrace {
    events: Mutex<Vec<(Address, TraceEvent)>>,
}

impl RecordingTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<(Address, TraceEvent)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events recorded by one endpoint.
    pub fn events_for(&self, at: &Address) -> Vec<TraceEvent> {
        self.events()
            .into_iter()
            .filter(|(addr, _)| addr == at)
            .map(|(_, event)| event)
            .collect()
    }

    /// Packets sent (first transmissions only) by one endpoint.
    pub fn sent_by(&self, at: &Address) -> Vec<Packet> {
        self.events_for(at)
            .into_iter()
            .filter_map(|event| match event {
                TraceEvent::Sent(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl TraceSink for RecordingTrace {
    fn record(&self, at: &Address, event: &TraceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((at.clone(), event.clone()));
        }
    }
}
