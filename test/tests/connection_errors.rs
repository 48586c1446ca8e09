/// Errors that close a replication connection, and the ones that do not

use replica_shared::{
    ConnectionError, FieldValue, ObjectKey, ReceiveContext, Replica, ReplicationError,
    ReplicationEvent, ReplicationFlags, SchemaRegistry,
};
use replica_test::{
    test_protocol::{weapon, PAWN},
    HostPair,
};

fn spawn_pawn(pair: &mut HostPair) -> ObjectKey {
    let schema = pair.registry.class_schema(PAWN).unwrap();
    pair.server_world.spawn(Replica::new(schema))
}

#[test]
fn unknown_class_closes_the_connection() {
    let mut pair = HostPair::new();
    let pawn = spawn_pawn(&mut pair);
    // the receiving host only knows weapons
    let registry = SchemaRegistry::new();
    registry.register_class(weapon()).unwrap();
    pair.registry = registry;

    pair.frame += 1;
    pair.replicate(&pawn, ReplicationFlags::new()).unwrap();
    let sent = pair.take_sent();
    assert_eq!(
        pair.deliver(&sent[0]),
        Err(ConnectionError::Replication(ReplicationError::UnknownClass {
            class: PAWN.to_string()
        }))
    );
    assert!(pair.client.is_closed());
    assert!(pair.client_world.is_empty());

    // every later call reports the closed connection
    assert_eq!(pair.deliver(&sent[0]), Err(ConnectionError::Closed));
}

#[test]
fn malformed_bytes_close_the_connection() {
    let mut pair = HostPair::new();
    let mut context = ReceiveContext {
        world: &mut pair.client_world,
        resolver: &mut pair.client_resolver,
        registry: &pair.registry,
    };
    let err = pair.client.receive_bytes(3, &[], &mut context).unwrap_err();
    assert!(matches!(err, ConnectionError::MalformedMessage { channel: 3, .. }));
    assert!(err.is_fatal());
    assert!(pair.client.is_closed());
}

#[test]
fn missing_object_leaves_the_connection_open() {
    let mut pair = HostPair::new();
    let ghost = ObjectKey::new(999);
    assert_eq!(
        pair.replicate(&ghost, ReplicationFlags::new()),
        Err(ConnectionError::ObjectNotFound { object: 999 })
    );
    assert!(!pair.server.is_closed());

    let pawn = spawn_pawn(&mut pair);
    pair.tick(&pawn, ReplicationFlags::new());
    assert!(pair.client_object(&pawn).is_some());
}

#[test]
fn dormancy_needs_an_open_channel() {
    let mut pair = HostPair::new();
    let pawn = spawn_pawn(&mut pair);
    assert_eq!(
        pair.server.start_becoming_dormant(&pawn),
        Err(ConnectionError::ChannelNotFound {
            object: pawn.value()
        })
    );
    assert!(!pair.server.is_closed());
}

#[test]
fn closing_object_stops_replicating() {
    let mut pair = HostPair::new();
    let pawn = spawn_pawn(&mut pair);
    pair.tick(&pawn, ReplicationFlags::new());

    pair.server.close_object(&pawn).unwrap();
    let close = pair.take_sent();
    assert_eq!(close.len(), 1);
    assert!(close[0].message.close);

    // changes made while the close is in flight are not sent
    pair.server_world
        .get_mut(&pawn)
        .set_field("health", FieldValue::Int(1));
    pair.frame += 1;
    assert_eq!(pair.replicate(&pawn, ReplicationFlags::new()), Ok(None));
    assert!(pair.take_sent().is_empty());
}

#[test]
fn lost_close_is_resent() {
    let mut pair = HostPair::new();
    let pawn = spawn_pawn(&mut pair);
    pair.tick(&pawn, ReplicationFlags::new());
    let remote = pair.client_object(&pawn).unwrap();

    pair.server.close_object(&pawn).unwrap();
    let lost = pair.take_sent().remove(0);
    pair.drop_packet(lost.packet);

    let resent = pair.take_sent();
    assert_eq!(resent.len(), 1);
    assert!(resent[0].message.close);
    assert_eq!(resent[0].message.sequence, lost.message.sequence);

    let events = pair.exchange();
    assert_eq!(events, vec![ReplicationEvent::Destroyed { object: remote }]);
    assert_eq!(pair.client_world.destroyed(), &[remote]);
    assert!(pair.server.object_channel(&pawn).is_none());
}
