/// Diff, serialize and receive through a pair of agents

use std::sync::Arc;

use proptest::prelude::*;
use replica_shared::{
    FieldValue, PropertySchema, Replica, ReplicationConfig, ReplicationFlags, Vec3,
};
use replica_test::{protocol, test_protocol::PAWN, AgentLink};

fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

fn pawn_schema() -> Arc<PropertySchema> {
    protocol().class_schema(PAWN).unwrap()
}

fn ints(values: &[i32]) -> FieldValue {
    FieldValue::Array(values.iter().map(|value| vec![FieldValue::Int(*value)]).collect())
}

fn owner() -> ReplicationFlags {
    ReplicationFlags::new().with_owner(true)
}

#[test]
fn received_state_matches_live_state() {
    init_logging();
    let schema = pawn_schema();
    let mut live = Replica::new(schema.clone());
    let mut remote = Replica::new(schema);
    live.set_field("health", FieldValue::Int(90));
    live.set_field("name", FieldValue::String("Ada".into()));
    live.set_field("position", FieldValue::Vector(Vec3::new(1.5, -2.0, 8.25)));
    live.set_field("inventory", ints(&[4, 8, 15]));
    live.set_field("ammo", FieldValue::Int(12));

    let mut link = AgentLink::new(&live, &remote, &ReplicationConfig::default());
    link.sync(&live, &mut remote, owner());

    assert_eq!(remote.state(), live.state());
}

#[test]
fn untouched_fields_keep_their_values() {
    let schema = pawn_schema();
    let mut live = Replica::new(schema.clone());
    let mut remote = Replica::new(schema);
    live.set_field("name", FieldValue::String("Ada".into()));
    let mut link = AgentLink::new(&live, &remote, &ReplicationConfig::default());
    link.sync(&live, &mut remote, owner());

    // a local edit on the receiving side survives an update to another field
    remote.set_field("health", FieldValue::Int(-1));
    live.set_field("name", FieldValue::String("Grace".into()));
    link.sync(&live, &mut remote, owner());

    assert_eq!(remote.field("name"), Some(&FieldValue::String("Grace".into())));
    assert_eq!(remote.field("health"), Some(&FieldValue::Int(-1)));
}

#[test]
fn unchanged_state_sends_nothing() {
    let schema = pawn_schema();
    let mut live = Replica::new(schema.clone());
    let mut remote = Replica::new(schema);
    live.set_field("health", FieldValue::Int(3));
    let mut link = AgentLink::new(&live, &remote, &ReplicationConfig::default());
    link.sync(&live, &mut remote, owner());

    // touching a field without changing it is not a change
    live.set_field("health", FieldValue::Int(3));
    let pass = link.send(&live, owner());
    assert!(!pass.wrote);
    assert_eq!(pass.bits, 1);
}

#[test]
fn array_shrink_costs_the_same_for_any_length() {
    let schema = pawn_schema();
    let config = ReplicationConfig::default();

    let mut shrink_bits = Vec::new();
    for length in [10, 100] {
        let mut live = Replica::new(schema.clone());
        let mut remote = Replica::new(schema.clone());
        let values: Vec<i32> = (0..length).collect();
        live.set_field("inventory", ints(&values));
        let mut link = AgentLink::new(&live, &remote, &config);
        link.sync(&live, &mut remote, owner());

        live.set_field("inventory", ints(&[0, 1]));
        let pass = link.send(&live, owner());
        link.receive(&pass, &mut remote);
        assert_eq!(remote.field("inventory"), Some(&ints(&[0, 1])));
        shrink_bits.push(pass.bits);
    }

    assert_eq!(shrink_bits[0], shrink_bits[1]);
}

#[test]
fn grown_array_sends_new_elements() {
    let schema = pawn_schema();
    let mut live = Replica::new(schema.clone());
    let mut remote = Replica::new(schema);
    live.set_field("inventory", ints(&[1]));
    let mut link = AgentLink::new(&live, &remote, &ReplicationConfig::default());
    link.sync(&live, &mut remote, owner());

    live.set_field("inventory", ints(&[1, 0, 0]));
    link.sync(&live, &mut remote, owner());
    assert_eq!(remote.field("inventory"), Some(&ints(&[1, 0, 0])));
}

#[test]
fn changed_health_notifies_once() {
    let schema = pawn_schema();
    let mut live = Replica::new(schema.clone());
    let mut remote = Replica::new(schema);
    let mut link = AgentLink::new(&live, &remote, &ReplicationConfig::default());

    live.set_field("health", FieldValue::Int(50));
    let notifies = link.sync(&live, &mut remote, owner());
    assert_eq!(notifies.len(), 1);
    assert_eq!(notifies[0].name, "health");
    assert_eq!(notifies[0].old_values, vec![FieldValue::Int(0)]);

    // name has no notify policy
    live.set_field("name", FieldValue::String("Ada".into()));
    assert!(link.sync(&live, &mut remote, owner()).is_empty());
}

#[test]
fn checksummed_stream_round_trips() {
    let schema = pawn_schema();
    let config = ReplicationConfig {
        checksum_enabled: true,
        ..ReplicationConfig::default()
    };
    let mut live = Replica::new(schema.clone());
    let mut remote = Replica::new(schema);
    live.set_field("health", FieldValue::Int(7));
    live.set_field("inventory", ints(&[2, 3]));

    let mut plain = AgentLink::new(&live, &remote, &ReplicationConfig::default());
    let plain_bits = plain.send(&live, owner()).bits;

    let mut link = AgentLink::new(&live, &remote, &config);
    let pass = link.send(&live, owner());
    link.receive(&pass, &mut remote);

    assert_eq!(remote.state(), live.state());
    assert!(pass.bits > plain_bits + 32 * 4);
}

#[test]
fn lost_pass_is_resent() {
    let schema = pawn_schema();
    let mut live = Replica::new(schema.clone());
    let mut remote = Replica::new(schema);
    let mut link = AgentLink::new(&live, &remote, &ReplicationConfig::default());

    live.set_field("health", FieldValue::Int(10));
    let lost = link.send(&live, owner());
    link.nak(lost.packet);
    assert!(link.sender.has_pending_resend());

    // nothing new changed, the lost change goes out again
    let resend = link.send(&live, owner());
    assert!(resend.wrote);
    link.receive(&resend, &mut remote);
    link.ack(resend.packet);

    assert_eq!(remote.field("health"), Some(&FieldValue::Int(10)));
    assert!(!link.sender.has_pending_resend());
    assert!(link.sender.snapshot().history().is_empty());
}

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z ]{0,24}"
}

proptest! {
    #[test]
    fn any_two_updates_round_trip(
        first in (any::<i32>(), name_strategy(), prop::collection::vec(any::<i32>(), 0..16)),
        second in (any::<i32>(), name_strategy(), prop::collection::vec(any::<i32>(), 0..16)),
        x in -1000.0f32..1000.0,
    ) {
        let schema = pawn_schema();
        let mut live = Replica::new(schema.clone());
        let mut remote = Replica::new(schema);
        let mut link = AgentLink::new(&live, &remote, &ReplicationConfig::default());

        for (health, name, inventory) in [first, second] {
            live.set_field("health", FieldValue::Int(health));
            live.set_field("name", FieldValue::String(name));
            live.set_field("inventory", ints(&inventory));
            live.set_field("position", FieldValue::Vector(Vec3::new(x, 0.0, -x)));
            link.sync(&live, &mut remote, owner());
            prop_assert_eq!(remote.state(), live.state());
        }

        let idle = link.send(&live, owner());
        prop_assert!(!idle.wrote);
    }
}
