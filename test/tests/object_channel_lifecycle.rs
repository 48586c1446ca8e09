/// Spawn, update, sub-object and close flows between two hosts

use replica_shared::{
    ConnectionError, FieldValue, ObjectKey, ObjectRef, ObjectWorld, Replica, ReplicationError,
    ReplicationEvent, ReplicationFlags,
};
use replica_test::{
    test_protocol::{PAWN, WEAPON},
    HostPair,
};

fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

fn spawn(pair: &mut HostPair, class: &str) -> ObjectKey {
    let schema = pair.registry.class_schema(class).unwrap();
    pair.server_world.spawn(Replica::new(schema))
}

fn spawn_weapon(pair: &mut HostPair, owner: &ObjectKey, rounds: i32) -> ObjectKey {
    let schema = pair.registry.class_schema(WEAPON).unwrap();
    let mut weapon = Replica::new(schema);
    weapon.set_field("rounds", FieldValue::Int(rounds));
    weapon.set_field("holder", FieldValue::Object(ObjectRef::Object(*owner)));
    pair.server_world.spawn_subobject(owner, weapon)
}

fn flags() -> ReplicationFlags {
    ReplicationFlags::new()
}

#[test]
fn first_pass_spawns_the_object() {
    init_logging();
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    pair.server_world.get_mut(&pawn).set_field("health", FieldValue::Int(90));
    pair.server_world
        .get_mut(&pawn)
        .set_field("name", FieldValue::String("Ada".into()));

    pair.frame += 1;
    pair.replicate(&pawn, flags()).unwrap();
    let sent = pair.take_sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].message.open);
    assert!(sent[0].message.reliable);

    let events = pair.deliver(&sent[0]).unwrap();
    pair.ack(sent[0].packet);

    let remote = pair.client_object(&pawn).unwrap();
    assert_eq!(
        events[0],
        ReplicationEvent::Spawned {
            object: remote,
            owner: None,
            class: PAWN.to_string(),
        }
    );
    match &events[1] {
        ReplicationEvent::Updated { object, notifies } => {
            assert_eq!(*object, remote);
            assert_eq!(notifies.len(), 1);
            assert_eq!(notifies[0].name, "health");
        }
        other => panic!("expected an update, got {:?}", other),
    }

    let replica = pair.client_world.get(&remote);
    assert_eq!(replica.field("health"), Some(&FieldValue::Int(90)));
    assert_eq!(replica.field("name"), Some(&FieldValue::String("Ada".into())));
    assert!(pair.server.object_channel(&pawn).unwrap().channel().is_open_acked());
}

#[test]
fn later_updates_are_unreliable() {
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    pair.tick(&pawn, flags());

    pair.server_world.get_mut(&pawn).set_field("health", FieldValue::Int(5));
    pair.frame += 1;
    pair.replicate(&pawn, flags()).unwrap();
    let sent = pair.take_sent();
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].message.reliable);
    assert!(!sent[0].message.open);

    pair.deliver(&sent[0]).unwrap();
    let remote = pair.client_object(&pawn).unwrap();
    assert_eq!(pair.client_world.get(&remote).field("health"), Some(&FieldValue::Int(5)));
}

#[test]
fn idle_object_sends_nothing() {
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    pair.tick(&pawn, flags());

    pair.frame += 1;
    assert_eq!(pair.replicate(&pawn, flags()).unwrap(), None);
    assert!(pair.take_sent().is_empty());
}

#[test]
fn dropped_update_is_carried_by_the_next_message() {
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    pair.tick(&pawn, flags());

    pair.server_world.get_mut(&pawn).set_field("health", FieldValue::Int(1));
    pair.frame += 1;
    pair.replicate(&pawn, flags()).unwrap();
    let lost = pair.take_sent().remove(0);
    pair.drop_packet(lost.packet);
    // unreliable: nothing is resent by the channel itself
    assert!(pair.take_sent().is_empty());

    pair.server_world
        .get_mut(&pawn)
        .set_field("name", FieldValue::String("late".into()));
    pair.tick(&pawn, flags());

    let remote = pair.client_object(&pawn).unwrap();
    let replica = pair.client_world.get(&remote);
    assert_eq!(replica.field("health"), Some(&FieldValue::Int(1)));
    assert_eq!(replica.field("name"), Some(&FieldValue::String("late".into())));
}

#[test]
fn unreliable_before_open_is_folded_in_after_open_ack() {
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);

    pair.frame += 1;
    pair.replicate(&pawn, flags()).unwrap();
    let open = pair.take_sent().remove(0);

    // an unreliable update goes out while the open is still in flight, and is lost
    pair.server_world.get_mut(&pawn).set_field("health", FieldValue::Int(33));
    pair.frame += 1;
    pair.replicate(&pawn, flags()).unwrap();
    let early = pair.take_sent().remove(0);
    assert!(!early.message.reliable);

    pair.deliver(&open).unwrap();
    pair.ack(open.packet);
    assert!(pair.server.object_channel(&pawn).unwrap().agent(&pawn).unwrap().has_pending_resend());

    // the next pass carries the early change even though nothing else changed
    pair.tick(&pawn, flags());
    let remote = pair.client_object(&pawn).unwrap();
    assert_eq!(pair.client_world.get(&remote).field("health"), Some(&FieldValue::Int(33)));
}

#[test]
fn subobjects_spawn_under_their_owner() {
    init_logging();
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    let weapon = spawn_weapon(&mut pair, &pawn, 30);

    let events = pair.tick(&pawn, flags());
    let remote_pawn = pair.client_object(&pawn).unwrap();
    let remote_weapon = pair.client_object(&weapon).unwrap();

    assert!(events.contains(&ReplicationEvent::Spawned {
        object: remote_weapon,
        owner: Some(remote_pawn),
        class: WEAPON.to_string(),
    }));
    let replica = pair.client_world.get(&remote_weapon);
    assert_eq!(replica.field("rounds"), Some(&FieldValue::Int(30)));
    assert_eq!(
        replica.field("holder"),
        Some(&FieldValue::Object(ObjectRef::Object(remote_pawn)))
    );
    assert_eq!(pair.client_world.subobjects(&remote_pawn), vec![remote_weapon]);
}

#[test]
fn unchanged_subobject_is_skipped_by_key() {
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    let weapon = spawn_weapon(&mut pair, &pawn, 30);
    pair.tick(&pawn, flags());

    let net_id = pair.server_resolver.identity_of(&weapon).unwrap();
    let key = pair.server_world.get(&weapon).replication_key();
    let channel = pair.server.object_channel(&pawn).unwrap();
    assert!(!channel.key_needs_to_replicate(&net_id, key));
    assert!(channel.key_needs_to_replicate(&net_id, key + 1));

    pair.server_world.get_mut(&weapon).set_field("rounds", FieldValue::Int(29));
    let events = pair.tick(&pawn, flags());
    let remote_weapon = pair.client_object(&weapon).unwrap();
    assert!(events
        .iter()
        .any(|event| matches!(event, ReplicationEvent::Updated { object, .. } if *object == remote_weapon)));
    assert_eq!(
        pair.client_world.get(&remote_weapon).field("rounds"),
        Some(&FieldValue::Int(29))
    );
}

#[test]
fn failed_pass_resends_what_the_owner_wrote() {
    init_logging();
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    let weapon = spawn_weapon(&mut pair, &pawn, 30);
    pair.tick(&pawn, flags());
    pair.tick(&pawn, flags());

    pair.server_world.get_mut(&pawn).set_field("health", FieldValue::Int(55));
    pair.server_world.get_mut(&weapon).set_field("rounds", FieldValue::Int(29));
    let cache = pair.caches.get_or_create(&weapon);
    let guard = cache.write().unwrap();
    pair.frame += 1;
    assert_eq!(
        pair.replicate(&pawn, flags()),
        Err(ConnectionError::Replication(
            ReplicationError::ReentrantReplication {
                object: weapon.value()
            }
        ))
    );
    drop(guard);
    assert!(pair.take_sent().is_empty());
    assert!(pair
        .server
        .object_channel(&pawn)
        .unwrap()
        .agent(&pawn)
        .unwrap()
        .has_pending_resend());

    pair.tick(&pawn, flags());
    let remote_pawn = pair.client_object(&pawn).unwrap();
    let remote_weapon = pair.client_object(&weapon).unwrap();
    assert_eq!(
        pair.client_world.get(&remote_pawn).field("health"),
        Some(&FieldValue::Int(55))
    );
    assert_eq!(
        pair.client_world.get(&remote_weapon).field("rounds"),
        Some(&FieldValue::Int(29))
    );
}

#[test]
fn failed_first_mention_is_announced_again() {
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    pair.tick(&pawn, flags());

    let weapon = spawn_weapon(&mut pair, &pawn, 12);
    let cache = pair.caches.get_or_create(&weapon);
    let guard = cache.write().unwrap();
    pair.frame += 1;
    assert!(pair.replicate(&pawn, flags()).is_err());
    drop(guard);

    let events = pair.tick(&pawn, flags());
    let remote_weapon = pair.client_object(&weapon).unwrap();
    assert!(events
        .iter()
        .any(|event| matches!(event, ReplicationEvent::Spawned { object, owner: Some(_), .. } if *object == remote_weapon)));
    assert_eq!(
        pair.client_world.get(&remote_weapon).field("rounds"),
        Some(&FieldValue::Int(12))
    );
}

#[test]
fn destroyed_subobject_is_deleted_remotely() {
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    let weapon = spawn_weapon(&mut pair, &pawn, 30);
    pair.tick(&pawn, flags());
    let remote_weapon = pair.client_object(&weapon).unwrap();

    pair.server_world.destroy_replica(&weapon);
    pair.frame += 1;
    pair.replicate(&pawn, flags()).unwrap();
    let sent = pair.take_sent();
    assert!(sent[0].message.reliable);

    let events = pair.deliver(&sent[0]).unwrap();
    assert_eq!(
        events,
        vec![ReplicationEvent::SubObjectDestroyed {
            object: remote_weapon
        }]
    );
    assert!(!pair.client_world.contains(&remote_weapon));
}

#[test]
fn close_destroys_the_remote_object() {
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    let weapon = spawn_weapon(&mut pair, &pawn, 1);
    pair.tick(&pawn, flags());
    let remote_pawn = pair.client_object(&pawn).unwrap();
    let remote_weapon = pair.client_object(&weapon).unwrap();

    pair.server.close_object(&pawn).unwrap();
    let events = pair.exchange();

    assert!(events.contains(&ReplicationEvent::SubObjectDestroyed {
        object: remote_weapon
    }));
    assert_eq!(
        events.last(),
        Some(&ReplicationEvent::Destroyed { object: remote_pawn })
    );
    assert!(pair.client_world.is_empty());
    assert_eq!(pair.client.channel_count(), 0);
    // the acked close released the sending channel
    assert!(pair.server.object_channel(&pawn).is_none());
    assert_eq!(pair.server.channel_count(), 0);
}

#[test]
fn resent_close_after_release_is_ignored() {
    init_logging();
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    pair.tick(&pawn, flags());
    let remote_pawn = pair.client_object(&pawn).unwrap();

    pair.server.close_object(&pawn).unwrap();
    let close = pair.take_sent();
    assert_eq!(close.len(), 1);
    let events = pair.deliver(&close[0]).unwrap();
    assert!(events.contains(&ReplicationEvent::Destroyed { object: remote_pawn }));
    assert_eq!(pair.client.channel_count(), 0);

    // the ack is lost, so the close goes out again
    pair.drop_packet(close[0].packet);
    let resent = pair.take_sent();
    assert_eq!(resent.len(), 1);
    assert!(resent[0].message.close);
    assert_eq!(resent[0].channel, close[0].channel);

    assert!(pair.deliver(&resent[0]).unwrap().is_empty());
    assert_eq!(pair.client.channel_count(), 0);
    assert!(pair.client_world.is_empty());
    pair.ack(resent[0].packet);
    assert_eq!(pair.server.channel_count(), 0);
}

#[test]
fn close_before_open_sends_nothing() {
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    pair.server.start_becoming_dormant(&pawn).unwrap_err();
    pair.server.close_object(&pawn).unwrap();
    assert!(pair.take_sent().is_empty());
}

#[test]
fn framed_bytes_decode_to_the_sent_message() {
    let mut pair = HostPair::new();
    let pawn = spawn(&mut pair, PAWN);
    pair.server_world.get_mut(&pawn).set_field("health", FieldValue::Int(4));
    pair.frame += 1;
    pair.replicate(&pawn, flags()).unwrap();

    let sent = pair.take_sent().remove(0);
    // the framed bytes decode to the message that was handed to the transport
    let decoded = replica_shared::Message::from_bytes(&sent.bytes).unwrap();
    assert_eq!(decoded, sent.message);
}
