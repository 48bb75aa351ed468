//! Endpoint B: the responding, data-receiving side.
//!
//! [`ReceiverEndpoint`] is purely reactive.  It has no timer and never
//! retransmits on its own; every packet it sends answers one it received.
//! Lost answers are recovered by A's retransmissions:
//! - a repeated SYN is answered with another SYN-ACK,
//! - a repeated FIN with another FIN-ACK,
//! - a repeated data packet with the ACK for the previous sequence number,
//!   without delivering its payload again.

use std::sync::Arc;

use crate::config::EndpointConfig;
use crate::endpoint::{Endpoint, EndpointError};
use crate::io::ByteSink;
use crate::link::Link;
use crate::packet::{Address, Packet, PacketKind, SeqBit};
use crate::state::ReceiverState;
use crate::trace::{LogTrace, TraceEvent, TraceSink};

/// Stop-and-wait state machine for Endpoint B.
pub struct ReceiverEndpoint<W> {
    config: EndpointConfig,
    state: ReceiverState,
    /// Sequence number of the next data packet to deliver.
    expected_seq: SeqBit,
    sink: W,
    link: Arc<dyn Link>,
    trace: Arc<dyn TraceSink>,
}

impl<W: ByteSink> ReceiverEndpoint<W> {
    /// Create an endpoint in [`ReceiverState::Listen`], tracing through
    /// [`LogTrace`].
    pub fn new(config: EndpointConfig, sink: W, link: Arc<dyn Link>) -> Result<Self, EndpointError> {
        config.validate()?;
        Ok(Self {
            config,
            state: ReceiverState::Listen,
            expected_seq: SeqBit::ZERO,
            sink,
            link,
            trace: Arc::new(LogTrace),
        })
    }

    pub fn with_trace(mut self, trace: Arc<dyn TraceSink>) -> Self {
        self.trace = trace;
        self
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn expected_seq(&self) -> SeqBit {
        self.expected_seq
    }

    pub fn conn_setup_done(&self) -> bool {
        self.state.conn_setup_done()
    }

    /// 0 = running, 1 = FIN answered.
    pub fn conn_terminate(&self) -> u8 {
        self.state.conn_terminate()
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    fn emit(&self, event: TraceEvent) {
        self.trace.record(&self.config.address, &event);
    }

    fn reply(&self, build: impl FnOnce(Address, Address) -> Packet) -> Result<(), EndpointError> {
        let packet = build(self.config.address.clone(), self.config.peer.clone());
        self.link.send(&packet, &self.config.address)?;
        self.emit(TraceEvent::Sent(packet));
        Ok(())
    }

    fn on_syn(&mut self) -> Result<(), EndpointError> {
        self.reply(Packet::syn_ack)?;
        if self.state == ReceiverState::Listen {
            self.state = ReceiverState::Established;
            self.emit(TraceEvent::Established);
        } else {
            // Our SYN-ACK was lost and A retried.
            self.emit(TraceEvent::DuplicateSyn);
        }
        Ok(())
    }

    fn on_fin(&mut self) -> Result<(), EndpointError> {
        self.reply(Packet::fin_ack)?;
        if self.state != ReceiverState::FinReceived {
            self.state = ReceiverState::FinReceived;
            self.emit(TraceEvent::Closed);
        }
        Ok(())
    }

    fn on_data(&mut self, packet: &Packet) -> Result<(), EndpointError> {
        let seq = packet.seq();
        if seq == self.expected_seq {
            if let Some(payload) = packet.payload() {
                self.sink.write_chunk(payload).map_err(EndpointError::Sink)?;
                self.emit(TraceEvent::Delivered {
                    seq,
                    len: payload.len(),
                });
            }
            // Delivered: from here on a failed ACK is just a lost ACK.
            self.expected_seq = self.expected_seq.flip();
            self.reply(|src, dst| Packet::ack(src, dst, seq))?;
        } else {
            self.emit(TraceEvent::DuplicateData {
                seq,
                expected: self.expected_seq,
            });
            let previous = self.expected_seq.prev();
            self.reply(|src, dst| Packet::ack(src, dst, previous))?;
        }
        Ok(())
    }
}

impl<W: ByteSink> Endpoint for ReceiverEndpoint<W> {
    fn address(&self) -> &Address {
        &self.config.address
    }

    /// B never initiates a send.
    fn on_tick(&mut self) -> Result<(), EndpointError> {
        Ok(())
    }

    fn on_packet_available(&mut self) -> Result<bool, EndpointError> {
        let Some(packet) = self.link.recv(&self.config.address)? else {
            return Ok(false);
        };
        self.emit(TraceEvent::Received(packet.clone()));

        match packet.kind() {
            PacketKind::Syn => self.on_syn()?,
            PacketKind::Fin => self.on_fin()?,
            PacketKind::Data => self.on_data(&packet)?,
            PacketKind::Ack if self.state == ReceiverState::FinReceived => {
                self.emit(TraceEvent::FinalAckObserved)
            }
            kind => self.emit(TraceEvent::Ignored { kind }),
        }
        Ok(true)
    }

    /// B's only terminal signal is having answered a FIN.
    fn is_terminated(&self) -> bool {
        self.state == ReceiverState::FinReceived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatedLink;
    use crate::trace::RecordingTrace;

    fn a() -> Address {
        Address::new("A")
    }

    fn b() -> Address {
        Address::new("B")
    }

    struct Harness {
        link: Arc<SimulatedLink>,
        trace: Arc<RecordingTrace>,
        receiver: ReceiverEndpoint<Vec<u8>>,
    }

    fn harness() -> Harness {
        let link = Arc::new(SimulatedLink::reliable());
        let trace = Arc::new(RecordingTrace::new());
        let receiver = ReceiverEndpoint::new(EndpointConfig::receiver(), Vec::new(), link.clone())
            .unwrap()
            .with_trace(trace.clone());
        Harness {
            link,
            trace,
            receiver,
        }
    }

    impl Harness {
        /// Deliver `packet` to B and return whatever B answered.
        fn feed(&mut self, packet: Packet) -> Vec<Packet> {
            self.link.inject(packet).unwrap();
            assert!(self.receiver.on_packet_available().unwrap());
            std::iter::from_fn(|| self.link.recv(&a()).unwrap()).collect()
        }
    }

    #[test]
    fn syn_is_answered_with_syn_ack() {
        let mut h = harness();
        let replies = h.feed(Packet::syn(a(), b()));
        assert_eq!(replies, vec![Packet::syn_ack(b(), a())]);
        assert!(h.receiver.conn_setup_done());
        assert_eq!(h.receiver.state(), ReceiverState::Established);
    }

    #[test]
    fn repeated_syn_is_answered_again_without_state_change() {
        let mut h = harness();
        h.feed(Packet::syn(a(), b()));
        let replies = h.feed(Packet::syn(a(), b()));
        assert_eq!(replies, vec![Packet::syn_ack(b(), a())]);
        assert_eq!(h.receiver.state(), ReceiverState::Established);
        assert!(h.trace.events_for(&b()).contains(&TraceEvent::DuplicateSyn));
    }

    #[test]
    fn in_order_data_is_delivered_and_acked() {
        let mut h = harness();
        h.feed(Packet::syn(a(), b()));

        let replies = h.feed(Packet::data(a(), b(), SeqBit::ZERO, b"abcd".to_vec()));
        assert_eq!(replies, vec![Packet::ack(b(), a(), SeqBit::ZERO)]);
        assert_eq!(h.receiver.expected_seq(), SeqBit::ONE);

        let replies = h.feed(Packet::data(a(), b(), SeqBit::ONE, b"ef".to_vec()));
        assert_eq!(replies, vec![Packet::ack(b(), a(), SeqBit::ONE)]);
        assert_eq!(h.receiver.expected_seq(), SeqBit::ZERO);
        assert_eq!(h.receiver.sink(), b"abcdef");
    }

    #[test]
    fn duplicate_data_is_written_once_and_acked_twice() {
        let mut h = harness();
        h.feed(Packet::syn(a(), b()));
        let data = Packet::data(a(), b(), SeqBit::ZERO, b"once".to_vec());

        let first = h.feed(data.clone());
        let second = h.feed(data);

        assert_eq!(h.receiver.sink(), b"once");
        assert_eq!(first, vec![Packet::ack(b(), a(), SeqBit::ZERO)]);
        // expected is now 1, so the re-ACK carries (1 - 1) mod 2 = 0.
        assert_eq!(second, vec![Packet::ack(b(), a(), SeqBit::ZERO)]);
        assert_eq!(h.receiver.expected_seq(), SeqBit::ONE);
        assert!(h.trace.events_for(&b()).contains(&TraceEvent::DuplicateData {
            seq: SeqBit::ZERO,
            expected: SeqBit::ONE,
        }));
    }

    #[test]
    fn failed_ack_send_does_not_redeliver() {
        let mut h = harness();
        h.feed(Packet::syn(a(), b()));
        h.link
            .fail_matching(1, |p| p.kind() == PacketKind::Ack)
            .unwrap();
        let data = Packet::data(a(), b(), SeqBit::ZERO, b"abc".to_vec());

        h.link.inject(data.clone()).unwrap();
        assert!(h.receiver.on_packet_available().is_err());
        assert_eq!(h.receiver.expected_seq(), SeqBit::ONE);

        // A times out and resends; B re-ACKs without writing again.
        let replies = h.feed(data);
        assert_eq!(replies, vec![Packet::ack(b(), a(), SeqBit::ZERO)]);
        assert_eq!(h.receiver.into_sink(), b"abc");
    }

    #[test]
    fn fin_is_answered_with_fin_ack_every_time() {
        let mut h = harness();
        h.feed(Packet::syn(a(), b()));

        let replies = h.feed(Packet::fin(a(), b(), SeqBit::ZERO));
        assert_eq!(replies, vec![Packet::fin_ack(b(), a())]);
        assert_eq!(h.receiver.conn_terminate(), 1);
        assert!(h.receiver.is_terminated());

        let replies = h.feed(Packet::fin(a(), b(), SeqBit::ZERO));
        assert_eq!(replies, vec![Packet::fin_ack(b(), a())]);
        assert_eq!(h.receiver.conn_terminate(), 1);
    }

    #[test]
    fn final_ack_is_observed_but_state_stays() {
        let mut h = harness();
        h.feed(Packet::syn(a(), b()));
        h.feed(Packet::fin(a(), b(), SeqBit::ZERO));

        let replies = h.feed(Packet::ack(a(), b(), SeqBit::ZERO));
        assert!(replies.is_empty());
        assert_eq!(h.receiver.state(), ReceiverState::FinReceived);
        assert_eq!(
            h.trace.events_for(&b()).last(),
            Some(&TraceEvent::FinalAckObserved)
        );
    }

    #[test]
    fn handshake_ack_sends_nothing() {
        let mut h = harness();
        h.feed(Packet::syn(a(), b()));
        let replies = h.feed(Packet::ack(a(), b(), SeqBit::ZERO));
        assert!(replies.is_empty());
        assert_eq!(h.receiver.state(), ReceiverState::Established);
    }

    #[test]
    fn tick_never_sends() {
        let mut h = harness();
        h.receiver.on_tick().unwrap();
        assert_eq!(h.link.pending(&a()), 0);
        assert!(!h.receiver.on_packet_available().unwrap());
    }
}
