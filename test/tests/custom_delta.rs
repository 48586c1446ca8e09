/// Properties that serialize their own deltas

use replica_shared::{
    BitReader, BitWrite, BitWriter, FieldValue, Replica, ReplicationConfig, ReplicationError,
    ReplicationFlags, Serde, UnsignedVariableInteger,
};
use replica_test::{protocol, test_protocol::SCOREBOARD, AgentLink, ScoreDelta};

struct Board {
    live: Replica,
    remote: Replica,
    sent: ScoreDelta,
    received: ScoreDelta,
    link: AgentLink,
}

fn board() -> Board {
    let schema = protocol().class_schema(SCOREBOARD).unwrap();
    let sent = ScoreDelta::new();
    let received = ScoreDelta::new();
    let mut live = Replica::new(schema.clone());
    live.attach_custom_delta("scores", Box::new(sent.clone())).unwrap();
    let mut remote = Replica::new(schema);
    remote
        .attach_custom_delta("scores", Box::new(received.clone()))
        .unwrap();
    let link = AgentLink::new(&live, &remote, &ReplicationConfig::default());
    Board {
        live,
        remote,
        sent,
        received,
        link,
    }
}

#[test]
fn delta_reaches_the_remote_serializer() {
    let mut board = board();
    board.sent.push(10);
    board.sent.push(20);

    let notifies = board
        .link
        .sync(&board.live, &mut board.remote, ReplicationFlags::new());
    assert_eq!(board.received.scores(), vec![10, 20]);
    assert_eq!(board.received.version(), 2);
    assert!(notifies.iter().any(|notify| notify.name == "scores"));
}

#[test]
fn unchanged_delta_is_not_rewritten() {
    let mut board = board();
    board.sent.push(1);
    board
        .link
        .sync(&board.live, &mut board.remote, ReplicationFlags::new());

    let pass = board.link.send(&board.live, ReplicationFlags::new());
    assert!(!pass.wrote);
    assert!(board.link.sender.ready_for_dormancy());
}

#[test]
fn lost_delta_is_rewritten_in_full() {
    let mut board = board();
    board.sent.push(1);
    board
        .link
        .sync(&board.live, &mut board.remote, ReplicationFlags::new());

    board.sent.push(2);
    let lost = board.link.send(&board.live, ReplicationFlags::new());
    assert!(lost.wrote);
    assert!(!board.link.sender.ready_for_dormancy());
    board.link.nak(lost.packet);

    // nothing new, but the lost base forces a rewrite
    let pass = board.link.send(&board.live, ReplicationFlags::new());
    assert!(pass.wrote);
    board.link.receive(&pass, &mut board.remote);
    board.link.ack(pass.packet);
    assert_eq!(board.received.scores(), vec![1, 2]);
}

#[test]
fn delta_and_plain_properties_share_a_pass() {
    let mut board = board();
    board
        .live
        .set_field("title", FieldValue::String("finals".into()));
    board.sent.push(7);

    let pass = board.link.send(&board.live, ReplicationFlags::new());
    board.link.receive(&pass, &mut board.remote);
    assert_eq!(
        board.remote.field("title"),
        Some(&FieldValue::String("finals".into()))
    );
    assert_eq!(board.received.scores(), vec![7]);
}

#[test]
fn delta_for_a_property_without_serializer_is_rejected() {
    let mut board = board();
    board.sent.push(3);
    let pass = board.link.send(&board.live, ReplicationFlags::new());

    let schema = protocol().class_schema(SCOREBOARD).unwrap();
    let mut bare = Replica::new(schema);
    let mut reader = BitReader::with_bit_len(&pass.bytes, pass.bits);
    let err = board
        .link
        .receiver
        .receive(&mut bare, &mut reader, &board.link.resolver)
        .unwrap_err();
    assert!(matches!(err, ReplicationError::UnknownCustomDelta { .. }));
    assert!(err.is_fatal());
}

#[test]
fn delta_tag_beyond_any_property_index_is_rejected() {
    let mut board = board();
    let mut writer = BitWriter::new();
    writer.write_bit(false);
    UnsignedVariableInteger::<7>::new(1_i128 << 100).ser(&mut writer);
    let (bytes, bits) = writer.into_bits();

    let err = board
        .link
        .receiver
        .receive(
            &mut board.remote,
            &mut BitReader::with_bit_len(&bytes, bits),
            &board.link.resolver,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ReplicationError::UnknownCustomDelta {
            parent: usize::MAX,
            ..
        }
    ));
    assert!(board.received.scores().is_empty());
}
