/// Reliable ordering and partial reassembly at the channel level

use proptest::prelude::*;
use replica_shared::{Channel, Connection, Message, PartialKind, ReplicationConfig};
use replica_test::{LocalTransport, SentMessage};

fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

fn payload(byte: u8) -> Message {
    Message::new(vec![byte], 8).with_reliable(true)
}

/// Opens a sender/receiver pair and returns them with the wire cleared
fn opened(transport: &mut LocalTransport) -> (Channel, Channel) {
    let config = ReplicationConfig::default();
    let mut sender = Channel::new(0, &config);
    let mut receiver = Channel::new(0, &config);
    sender.send(transport, Message::empty().with_open()).unwrap();
    for sent in transport.take_sent() {
        receiver.receive(sent.message).unwrap();
        sender.notify_packet_delivered(sent.packet);
    }
    assert!(sender.is_open_acked());
    (sender, receiver)
}

fn first_bytes(messages: &[Message]) -> Vec<u8> {
    messages.iter().map(|message| message.payload()[0]).collect()
}

#[test]
fn out_of_order_reliable_messages_apply_in_order() {
    init_logging();
    let mut transport = LocalTransport::new();
    let (mut sender, mut receiver) = opened(&mut transport);

    for byte in [1, 2, 3] {
        sender.send(&mut transport, payload(byte)).unwrap();
    }
    let sent = transport.take_sent();
    let sequences: Vec<u16> = sent.iter().map(|sent| sent.message.sequence).collect();
    assert_eq!(sequences, vec![2, 3, 4]);

    let first = receiver.receive(sent[0].message.clone()).unwrap();
    assert_eq!(first_bytes(&first), vec![1]);

    // the third arrives before the second: held back
    let early = receiver.receive(sent[2].message.clone()).unwrap();
    assert!(early.is_empty());
    assert_eq!(receiver.buffered_reliable(), 1);

    let late = receiver.receive(sent[1].message.clone()).unwrap();
    assert_eq!(first_bytes(&late), vec![2, 3]);
    assert_eq!(receiver.buffered_reliable(), 0);
}

#[test]
fn duplicates_are_applied_once() {
    let mut transport = LocalTransport::new();
    let (mut sender, mut receiver) = opened(&mut transport);

    sender.send(&mut transport, payload(7)).unwrap();
    let sent = transport.take_sent();
    assert_eq!(receiver.receive(sent[0].message.clone()).unwrap().len(), 1);
    assert!(receiver.receive(sent[0].message.clone()).unwrap().is_empty());
}

#[test]
fn lost_reliable_message_is_resent_unchanged() {
    let mut transport = LocalTransport::new();
    let (mut sender, _) = opened(&mut transport);

    sender.send(&mut transport, payload(9)).unwrap();
    let lost = transport.take_sent().remove(0);
    assert_eq!(sender.notify_packet_dropped(&mut transport, lost.packet), 1);

    let resent = transport.take_sent().remove(0);
    assert_ne!(resent.packet, lost.packet);
    assert_eq!(resent.message, lost.message);

    sender.notify_packet_delivered(resent.packet);
    assert_eq!(sender.outstanding_reliable(), 0);
}

#[test]
fn ten_thousand_bits_split_into_three_partials() {
    init_logging();
    // 4000 bits of payload per message once the header allowance is taken
    let mut transport = LocalTransport::with_budget(4000 + replica_shared::MESSAGE_HEADER_MAX_BITS);
    let (mut sender, mut receiver) = opened(&mut transport);

    let bytes: Vec<u8> = (0..1250).map(|i| (i % 251) as u8).collect();
    let original = Message::new(bytes.clone(), 10_000).with_reliable(true);
    sender.send(&mut transport, original).unwrap();

    let sent = transport.take_sent();
    let kinds: Vec<Option<PartialKind>> = sent.iter().map(|sent| sent.message.partial).collect();
    assert_eq!(
        kinds,
        vec![
            Some(PartialKind::Initial),
            Some(PartialKind::Continuation),
            Some(PartialKind::Final)
        ]
    );
    let bits: Vec<u32> = sent.iter().map(|sent| sent.message.payload_bits()).collect();
    assert_eq!(bits, vec![4000, 4000, 2000]);
    for part in &sent {
        assert!(part.bytes.len() * 8 <= transport.max_message_size_bits() as usize);
    }

    let mut rebuilt = Vec::new();
    for part in sent {
        let message = Message::from_bytes(&part.bytes).unwrap();
        rebuilt.extend(receiver.receive(message).unwrap());
    }
    assert_eq!(rebuilt.len(), 1);
    assert_eq!(rebuilt[0].payload_bits(), 10_000);
    assert_eq!(rebuilt[0].payload(), bytes.as_slice());
    assert!(!receiver.has_pending_partial());
}

#[test]
fn interrupted_reliable_partial_is_never_interpreted() {
    let mut transport = LocalTransport::with_budget(4000 + replica_shared::MESSAGE_HEADER_MAX_BITS);
    let (mut sender, mut receiver) = opened(&mut transport);

    sender
        .send(&mut transport, Message::new(vec![0x5A; 1250], 10_000).with_reliable(true))
        .unwrap();
    sender.send(&mut transport, payload(42)).unwrap();
    let sent: Vec<SentMessage> = transport.take_sent();
    assert_eq!(sent.len(), 4);

    // the final partial is lost
    assert!(receiver.receive(sent[0].message.clone()).unwrap().is_empty());
    assert!(receiver.receive(sent[1].message.clone()).unwrap().is_empty());
    assert!(receiver.receive(sent[3].message.clone()).unwrap().is_empty());
    assert!(receiver.has_pending_partial());
    assert_eq!(receiver.buffered_reliable(), 1);

    sender.notify_packet_dropped(&mut transport, sent[2].packet);
    let resent = transport.take_sent().remove(0);
    let released = receiver.receive(resent.message).unwrap();
    assert_eq!(released.len(), 2);
    assert_eq!(released[0].payload_bits(), 10_000);
    assert_eq!(released[1].payload(), &[42]);
    assert!(!receiver.has_pending_partial());
}

#[test]
fn new_partial_before_reliable_partial_completes_is_fatal() {
    let mut transport = LocalTransport::with_budget(4000 + replica_shared::MESSAGE_HEADER_MAX_BITS);
    let (_, mut receiver) = opened(&mut transport);

    let mut first = Message::new(vec![1; 500], 4000).with_reliable(true);
    first.sequence = 2;
    first.partial = Some(PartialKind::Initial);
    let mut second = first.clone();
    second.sequence = 3;

    receiver.receive(first).unwrap();
    assert!(receiver.receive(second).unwrap_err().is_fatal());
}

#[test]
fn unreliable_partials_during_a_reliable_sequence_are_dropped() {
    init_logging();
    let mut transport = LocalTransport::with_budget(4000 + replica_shared::MESSAGE_HEADER_MAX_BITS);
    let (mut sender, mut receiver) = opened(&mut transport);

    let reliable = Message::new(vec![5; 1250], 10_000).with_reliable(true);
    sender.send(&mut transport, reliable.clone()).unwrap();
    sender
        .send(&mut transport, Message::new(vec![6; 1250], 10_000))
        .unwrap();
    let sent = transport.take_sent();
    assert_eq!(sent.len(), 6);
    assert!(sent[..3].iter().all(|sent| sent.message.reliable));
    assert!(sent[3..].iter().all(|sent| !sent.message.reliable));

    // the reliable continuation is late; the unreliable message overtakes it
    assert!(receiver.receive(sent[0].message.clone()).unwrap().is_empty());
    for unreliable in &sent[3..] {
        assert!(receiver.receive(unreliable.message.clone()).unwrap().is_empty());
    }

    assert!(receiver.receive(sent[1].message.clone()).unwrap().is_empty());
    let rebuilt = receiver.receive(sent[2].message.clone()).unwrap();
    assert_eq!(rebuilt.len(), 1);
    assert_eq!(rebuilt[0].payload(), reliable.payload());
}

#[test]
fn open_is_acked_only_when_every_partial_is() {
    let config = ReplicationConfig::default();
    let mut transport = LocalTransport::with_budget(4000 + replica_shared::MESSAGE_HEADER_MAX_BITS);
    let mut sender = Channel::new(0, &config);

    sender
        .send(&mut transport, Message::new(vec![3; 1250], 10_000).with_open())
        .unwrap();
    let sent = transport.take_sent();
    assert_eq!(sent.len(), 3);

    assert!(!sender.notify_packet_delivered(sent[0].packet).open_acked);
    assert!(!sender.notify_packet_delivered(sent[2].packet).open_acked);
    assert!(sender.notify_packet_delivered(sent[1].packet).open_acked);
    assert!(sender.is_open_acked());
}

proptest! {
    #[test]
    fn any_arrival_order_is_applied_in_sequence(order in Just((0..12usize).collect::<Vec<_>>()).prop_shuffle()) {
        let mut transport = LocalTransport::new();
        let (mut sender, mut receiver) = opened(&mut transport);
        for byte in 0..12u8 {
            sender.send(&mut transport, payload(byte)).unwrap();
        }
        let sent = transport.take_sent();

        let mut applied = Vec::new();
        for index in order {
            applied.extend(receiver.receive(sent[index].message.clone()).unwrap());
        }
        prop_assert_eq!(first_bytes(&applied), (0..12u8).collect::<Vec<_>>());
    }
}
