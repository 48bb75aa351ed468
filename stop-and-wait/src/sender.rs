//! Endpoint A: the initiating, data-sending side.
//!
//! [`SenderEndpoint`] opens the connection, streams its byte source in
//! `MSS`-sized data packets and tears the connection down once the source is
//! exhausted.
//!
//! # Stop-and-Wait contract
//! - At most **one** packet is in flight at any moment (`unacked`).
//! - A new packet may only be sent once `unacked` is `None`.
//! - On a matching ACK: flip `seq`; clear `unacked`.
//! - On timeout: increment `tx_count`; resend the same packet unchanged and
//!   re-arm the timer with the same interval.
//!
//! The in-flight packet and its retransmit timer live in one
//! [`RetransmitEntry`], so a timer can never run without a packet to resend.

use std::sync::Arc;

use crate::config::EndpointConfig;
use crate::endpoint::{Endpoint, EndpointError};
use crate::io::ByteSource;
use crate::link::Link;
use crate::packet::{Address, Packet, PacketKind, SeqBit};
use crate::state::SenderState;
use crate::timer::{Clock, RetransmitTimer, SystemClock};
use crate::trace::{LogTrace, TraceEvent, TraceSink};

// ---------------------------------------------------------------------------
// RetransmitEntry
// ---------------------------------------------------------------------------

/// A packet that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitEntry {
    /// The packet on the wire, resent verbatim on timeout.
    pub packet: Packet,
    /// How many times this packet has been transmitted (1 = first send).
    pub tx_count: u32,
    /// Armed at the most recent transmission.
    pub timer: RetransmitTimer,
}

// ---------------------------------------------------------------------------
// SenderEndpoint
// ---------------------------------------------------------------------------

/// Stop-and-wait state machine for Endpoint A.
pub struct SenderEndpoint<S> {
    config: EndpointConfig,
    state: SenderState,

    /// Sequence number for the next new data packet (or the FIN).
    ///
    /// Flips on each acknowledged data packet; unchanged while in flight.
    seq: SeqBit,

    /// The in-flight packet, or `None` when nothing awaits an ACK.
    unacked: Option<RetransmitEntry>,

    source: S,
    link: Arc<dyn Link>,
    clock: Arc<dyn Clock>,
    trace: Arc<dyn TraceSink>,
}

impl<S: ByteSource> SenderEndpoint<S> {
    /// Create an endpoint in [`SenderState::Idle`].
    ///
    /// Uses the system clock and logs through [`LogTrace`]; swap either with
    /// [`with_clock`](Self::with_clock) / [`with_trace`](Self::with_trace)
    /// before the first tick.
    pub fn new(
        config: EndpointConfig,
        source: S,
        link: Arc<dyn Link>,
    ) -> Result<Self, EndpointError> {
        config.validate()?;
        Ok(Self {
            config,
            state: SenderState::Idle,
            seq: SeqBit::ZERO,
            unacked: None,
            source,
            link,
            clock: Arc::new(SystemClock::new()),
            trace: Arc::new(LogTrace),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_trace(mut self, trace: Arc<dyn TraceSink>) -> Self {
        self.trace = trace;
        self
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn seq(&self) -> SeqBit {
        self.seq
    }

    pub fn conn_setup_done(&self) -> bool {
        self.state.conn_setup_done()
    }

    pub fn conn_established(&self) -> bool {
        self.state.conn_established()
    }

    /// 0 = running, 1 = FIN sent, 2 = FIN-ACK acknowledged.
    pub fn conn_terminate(&self) -> u8 {
        self.state.conn_terminate()
    }

    /// `true` when a packet is waiting for an ACK.
    pub fn waiting_for_ack(&self) -> bool {
        self.unacked.is_some()
    }

    pub fn current_packet(&self) -> Option<&Packet> {
        self.unacked.as_ref().map(|e| &e.packet)
    }

    /// Number of times the in-flight packet has been sent, `0` when idle.
    pub fn retransmit_count(&self) -> u32 {
        self.unacked.as_ref().map_or(0, |e| e.tx_count)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn emit(&self, event: TraceEvent) {
        self.trace.record(&self.config.address, &event);
    }

    fn addresses(&self) -> (Address, Address) {
        (self.config.address.clone(), self.config.peer.clone())
    }

    /// Send a packet that is not tracked for retransmission (ACKs).
    fn send_untracked(&self, packet: Packet) -> Result<(), EndpointError> {
        self.link.send(&packet, &self.config.address)?;
        self.emit(TraceEvent::Sent(packet));
        Ok(())
    }

    /// First transmission of a packet that must be acknowledged.
    ///
    /// The packet is stored before it is handed to the link, so a failed
    /// send is recovered by the retransmit timer like a lost packet.
    fn send_tracked(&mut self, packet: Packet) -> Result<(), EndpointError> {
        debug_assert!(
            self.unacked.is_none(),
            "send_tracked called while a packet is already in flight"
        );
        let entry = self.unacked.insert(RetransmitEntry {
            packet,
            tx_count: 1,
            timer: RetransmitTimer::start(self.config.retransmit_interval, self.clock.now()),
        });
        self.link.send(&entry.packet, &self.config.address)?;
        let sent = entry.packet.clone();
        self.emit(TraceEvent::Sent(sent));
        Ok(())
    }

    /// Resend the in-flight packet verbatim if its timer has expired.
    fn retransmit_if_expired(&mut self) -> Result<(), EndpointError> {
        let now = self.clock.now();
        let Some(entry) = self.unacked.as_mut() else {
            return Ok(());
        };
        if !entry.timer.is_expired(now) {
            return Ok(());
        }
        self.link.send(&entry.packet, &self.config.address)?;
        entry.tx_count += 1;
        entry.timer.restart(now);
        let event = TraceEvent::Retransmitted {
            packet: entry.packet.clone(),
            tx_count: entry.tx_count,
        };
        self.emit(event);
        Ok(())
    }

    /// Pull the next chunk from the source: a data packet, or FIN at EOF.
    fn send_next_segment(&mut self) -> Result<(), EndpointError> {
        let chunk = self
            .source
            .read_chunk(self.config.mss)
            .map_err(EndpointError::Source)?;
        let (src, dst) = self.addresses();
        if chunk.is_empty() {
            self.emit(TraceEvent::TeardownStarted);
            self.state = SenderState::FinSent;
            self.send_tracked(Packet::fin(src, dst, self.seq))?;
        } else {
            self.send_tracked(Packet::data(src, dst, self.seq, chunk))?;
        }
        Ok(())
    }

    fn on_syn_ack(&mut self) -> Result<(), EndpointError> {
        match self.state {
            SenderState::SynSent => {
                let (src, dst) = self.addresses();
                self.send_untracked(Packet::ack(src, dst, SeqBit::ZERO))?;
                self.state = SenderState::Established;
                self.unacked = None;
                self.emit(TraceEvent::Established);
            }
            state if state.conn_established() => self.emit(TraceEvent::DuplicateSynAck),
            _ => self.emit(TraceEvent::Ignored {
                kind: PacketKind::SynAck,
            }),
        }
        Ok(())
    }

    fn on_fin_ack(&mut self) -> Result<(), EndpointError> {
        match self.state {
            SenderState::FinSent | SenderState::Closed => {
                let (src, dst) = self.addresses();
                self.send_untracked(Packet::ack(src, dst, SeqBit::ZERO))?;
                if self.state == SenderState::FinSent {
                    self.state = SenderState::Closed;
                    self.unacked = None;
                    self.emit(TraceEvent::Closed);
                }
            }
            _ => self.emit(TraceEvent::Ignored {
                kind: PacketKind::FinAck,
            }),
        }
        Ok(())
    }

    fn on_ack(&mut self, ack: SeqBit) {
        if self.state == SenderState::Established && self.unacked.is_some() && ack == self.seq {
            self.emit(TraceEvent::AckAccepted { seq: self.seq });
            self.seq = self.seq.flip();
            self.unacked = None;
        } else {
            // Stale or reordered: keep waiting, the timer will resend.
            self.emit(TraceEvent::StaleAck {
                got: ack,
                expected: self.seq,
            });
        }
    }
}

impl<S: ByteSource> Endpoint for SenderEndpoint<S> {
    fn address(&self) -> &Address {
        &self.config.address
    }

    fn on_tick(&mut self) -> Result<(), EndpointError> {
        match self.state {
            SenderState::Idle => {
                let (src, dst) = self.addresses();
                self.state = SenderState::SynSent;
                self.send_tracked(Packet::syn(src, dst))?;
            }
            SenderState::SynSent | SenderState::FinSent => self.retransmit_if_expired()?,
            SenderState::Established => {
                if self.unacked.is_some() {
                    self.retransmit_if_expired()?;
                } else {
                    self.send_next_segment()?;
                }
            }
            SenderState::Closed => {}
        }
        Ok(())
    }

    fn on_packet_available(&mut self) -> Result<bool, EndpointError> {
        let Some(packet) = self.link.recv(&self.config.address)? else {
            return Ok(false);
        };
        self.emit(TraceEvent::Received(packet.clone()));

        match packet.kind() {
            PacketKind::SynAck => self.on_syn_ack()?,
            PacketKind::FinAck => self.on_fin_ack()?,
            PacketKind::Ack => self.on_ack(packet.ack_num()),
            kind => self.emit(TraceEvent::Ignored { kind }),
        }
        Ok(true)
    }

    fn is_terminated(&self) -> bool {
        self.state == SenderState::Closed
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
