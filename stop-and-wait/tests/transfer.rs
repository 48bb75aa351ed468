//! Integration tests for data transfer over a simulated link.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use stop_and_wait::{
    driver::{run_lockstep, step},
    simulator::{SimulatedLink, SimulatorConfig},
    timer::MockClock,
    trace::NullTrace,
    Endpoint, EndpointConfig, Packet, PacketKind, ReceiverEndpoint, SeqBit, SenderEndpoint,
};

type Sender = SenderEndpoint<Cursor<Vec<u8>>>;
type Receiver = ReceiverEndpoint<Vec<u8>>;

fn endpoints(
    link: &Arc<SimulatedLink>,
    clock: &Arc<MockClock>,
    data: &[u8],
    mss: usize,
) -> (Sender, Receiver) {
    let sender = SenderEndpoint::new(
        EndpointConfig::sender().with_mss(mss),
        Cursor::new(data.to_vec()),
        link.clone(),
    )
    .expect("sender config")
    .with_clock(clock.clone());
    let receiver = ReceiverEndpoint::new(EndpointConfig::receiver(), Vec::new(), link.clone())
        .expect("receiver config");
    (sender, receiver)
}

fn data_packets(link: &SimulatedLink) -> Vec<Packet> {
    link.sent()
        .into_iter()
        .filter(|p| p.kind() == PacketKind::Data)
        .collect()
}

/// Deterministic pseudo-random payload.
fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[test]
fn ten_bytes_mss_four_three_packets() {
    let link = Arc::new(SimulatedLink::reliable());
    let clock = Arc::new(MockClock::new());
    let (mut sender, mut receiver) = endpoints(&link, &clock, b"0123456789", 4);

    run_lockstep(&mut sender, &mut receiver, || clock.advance(Duration::from_millis(10)), 1_000)
        .unwrap();

    let data = data_packets(&link);
    let lens: Vec<usize> = data.iter().map(Packet::payload_len).collect();
    let seqs: Vec<SeqBit> = data.iter().map(Packet::seq).collect();
    assert_eq!(lens, vec![4, 4, 2]);
    assert_eq!(seqs, vec![SeqBit::ZERO, SeqBit::ONE, SeqBit::ZERO]);
    assert_eq!(receiver.sink(), b"0123456789");
}

/// Losing the first data ACK forces exactly one retransmission, no sooner
/// than the interval, and the payload still arrives once.
#[test]
fn lost_data_ack_is_recovered_without_duplicate_delivery() {
    let link = Arc::new(SimulatedLink::reliable());
    let clock = Arc::new(MockClock::new());
    let (mut sender, mut receiver) = endpoints(&link, &clock, b"hello", 8);
    link.drop_matching(1, |p| p.kind() == PacketKind::Ack && p.src().as_str() == "B")
        .unwrap();

    // Handshake.
    step(&mut sender).unwrap();
    step(&mut receiver).unwrap();
    step(&mut sender).unwrap(); // ACK, then the data packet goes out
    step(&mut receiver).unwrap(); // handshake ACK
    step(&mut receiver).unwrap(); // data: delivered, ACK dropped
    assert_eq!(receiver.sink(), b"hello");
    assert_eq!(data_packets(&link).len(), 1);

    clock.advance(Duration::from_millis(2_999));
    step(&mut sender).unwrap();
    assert_eq!(data_packets(&link).len(), 1, "retransmitted too early");

    clock.advance(Duration::from_millis(1));
    step(&mut sender).unwrap();
    let data = data_packets(&link);
    assert_eq!(data.len(), 2);
    assert_eq!(data[0], data[1], "retransmission must be verbatim");

    step(&mut receiver).unwrap(); // duplicate: re-ACK with previous seq
    step(&mut sender).unwrap(); // ACK accepted, FIN sent
    assert_eq!(sender.seq(), SeqBit::ONE);
    assert_eq!(receiver.sink(), b"hello");

    run_lockstep(&mut sender, &mut receiver, || clock.advance(Duration::from_millis(10)), 100)
        .unwrap();
    assert_eq!(receiver.sink(), b"hello");
}

/// Losing a data packet itself is also recovered by the timer.
#[test]
fn lost_data_packet_is_retransmitted() {
    let link = Arc::new(SimulatedLink::reliable());
    let clock = Arc::new(MockClock::new());
    let (mut sender, mut receiver) = endpoints(&link, &clock, &payload(40), 16);
    link.drop_matching(1, |p| p.kind() == PacketKind::Data && p.seq() == SeqBit::ONE)
        .unwrap();

    run_lockstep(&mut sender, &mut receiver, || clock.advance(Duration::from_millis(250)), 1_000)
        .unwrap();

    assert_eq!(receiver.sink(), &payload(40));
    assert_eq!(link.dropped().len(), 1);
    assert_eq!(data_packets(&link).len(), 4);
}

/// Under random loss and duplication the stream still arrives intact, and
/// the data packets' sequence numbers alternate across distinct segments.
#[test]
fn lossy_duplicating_link_delivers_exact_bytes() {
    for seed in [1, 2, 3, 42, 1234] {
        let link = Arc::new(SimulatedLink::new(SimulatorConfig {
            loss_rate: 0.2,
            duplicate_rate: 0.1,
            seed,
        }));
        let clock = Arc::new(MockClock::new());
        let input = payload(1_000);
        let (sender, receiver) = endpoints(&link, &clock, &input, 64);
        // Thousands of rounds per seed; keep the log quiet.
        let mut sender = sender.with_trace(Arc::new(NullTrace));
        let mut receiver = receiver.with_trace(Arc::new(NullTrace));

        run_lockstep(
            &mut sender,
            &mut receiver,
            || clock.advance(Duration::from_millis(100)),
            1_000_000,
        )
        .unwrap_or_else(|e| panic!("seed {seed}: {e}"));

        assert_eq!(receiver.sink(), &input, "seed {seed}");
        assert!(sender.is_terminated());

        // Collapse retransmissions; what remains must alternate 0,1,0,...
        let mut distinct: Vec<Packet> = Vec::new();
        for pkt in data_packets(&link) {
            if distinct.last() != Some(&pkt) {
                distinct.push(pkt);
            }
        }
        assert_eq!(distinct.len(), 1_000 / 64 + 1, "seed {seed}");
        for (i, pkt) in distinct.iter().enumerate() {
            let expected = if i % 2 == 0 { SeqBit::ZERO } else { SeqBit::ONE };
            assert_eq!(pkt.seq(), expected, "seed {seed}, segment {i}");
        }
    }
}

#[test]
fn empty_source_sends_no_data() {
    let link = Arc::new(SimulatedLink::reliable());
    let clock = Arc::new(MockClock::new());
    let (mut sender, mut receiver) = endpoints(&link, &clock, b"", 4);

    run_lockstep(&mut sender, &mut receiver, || clock.advance(Duration::from_millis(10)), 100)
        .unwrap();

    assert!(data_packets(&link).is_empty());
    assert!(receiver.sink().is_empty());
    assert_eq!(sender.conn_terminate(), 2);
}
