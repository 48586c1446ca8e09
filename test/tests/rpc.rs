/// Function parameters written in full between two hosts

use std::sync::Arc;

use replica_shared::{
    replication::{receive_properties_for_rpc, send_properties_for_rpc},
    BitReader, BitWriter, FieldValue, ObjectKey, ObjectRef, ObjectState, PropertySchema,
    ReferenceResolver, ReplicationError, Vec3,
};
use replica_test::{protocol, test_protocol::SERVER_FIRE, TestResolver};

fn fire_schema() -> Arc<PropertySchema> {
    protocol().function_schema(SERVER_FIRE).unwrap()
}

fn set(schema: &PropertySchema, state: &mut ObjectState, name: &str, value: FieldValue) {
    let slot = schema.slot_of(name).unwrap();
    state.slots[slot] = value;
}

fn get<'s>(schema: &PropertySchema, state: &'s ObjectState, name: &str) -> &'s FieldValue {
    &state.slots[schema.slot_of(name).unwrap()]
}

fn call(
    schema: &PropertySchema,
    state: &ObjectState,
    sender: &mut TestResolver,
    receiver: &TestResolver,
) -> Result<ObjectState, ReplicationError> {
    let mut writer = BitWriter::new();
    send_properties_for_rpc(schema, state, &mut writer, sender)?;
    let (bytes, bits) = writer.into_bits();
    let mut reader = BitReader::with_bit_len(&bytes, bits);
    receive_properties_for_rpc(schema, &mut reader, receiver, 64)
}

#[test]
fn parameters_arrive_with_object_references_mapped() {
    let schema = fire_schema();
    let mut sender = TestResolver::new();
    let mut receiver = TestResolver::new();
    let enemy = ObjectKey::new(40);
    let net_id = sender.resolve_or_assign_identity(&enemy);
    receiver.learn(net_id, ObjectKey::new(1040));

    let mut state = schema.default_state().clone();
    set(&schema, &mut state, "charged", FieldValue::Bool(true));
    set(&schema, &mut state, "power", FieldValue::Int(250));
    set(
        &schema,
        &mut state,
        "targets",
        FieldValue::Array(vec![
            vec![FieldValue::Object(ObjectRef::Object(enemy))],
            vec![FieldValue::Object(ObjectRef::Null)],
        ]),
    );

    let received = call(&schema, &state, &mut sender, &receiver).unwrap();
    assert_eq!(get(&schema, &received, "charged"), &FieldValue::Bool(true));
    assert_eq!(get(&schema, &received, "power"), &FieldValue::Int(250));
    assert_eq!(
        get(&schema, &received, "targets"),
        &FieldValue::Array(vec![
            vec![FieldValue::Object(ObjectRef::Object(ObjectKey::new(1040)))],
            vec![FieldValue::Object(ObjectRef::Null)],
        ])
    );
}

#[test]
fn unknown_reference_arrives_unresolved() {
    let schema = fire_schema();
    let mut sender = TestResolver::new();
    let receiver = TestResolver::new();
    let stranger = ObjectKey::new(7);

    let mut state = schema.default_state().clone();
    set(
        &schema,
        &mut state,
        "targets",
        FieldValue::Array(vec![vec![FieldValue::Object(ObjectRef::Object(stranger))]]),
    );
    let received = call(&schema, &state, &mut sender, &receiver).unwrap();
    let net_id = sender.identity_of(&stranger).unwrap();
    assert_eq!(
        get(&schema, &received, "targets"),
        &FieldValue::Array(vec![vec![FieldValue::Object(ObjectRef::Unresolved(net_id))]])
    );
}

#[test]
fn normal_vector_is_quantized() {
    let schema = fire_schema();
    let mut state = schema.default_state().clone();
    set(&schema, &mut state, "aim", FieldValue::Vector(Vec3::new(0.6, 0.8, 0.0)));

    let received = call(&schema, &state, &mut TestResolver::new(), &TestResolver::new()).unwrap();
    let FieldValue::Vector(aim) = get(&schema, &received, "aim") else {
        panic!("aim is not a vector");
    };
    assert!((aim.x - 0.6).abs() < 1e-3);
    assert!((aim.y - 0.8).abs() < 1e-3);
    assert_eq!(aim.z, 0.0);
}

#[test]
fn oversized_array_is_rejected() {
    let schema = fire_schema();
    let mut state = schema.default_state().clone();
    let targets = (0..65)
        .map(|_| vec![FieldValue::Object(ObjectRef::Null)])
        .collect();
    set(&schema, &mut state, "targets", FieldValue::Array(targets));

    let err = call(&schema, &state, &mut TestResolver::new(), &TestResolver::new()).unwrap_err();
    assert!(matches!(
        err,
        ReplicationError::ArrayTooLarge {
            length: 65,
            limit: 64,
            ..
        }
    ));
}

#[test]
fn mismatched_bool_parameter_is_reported() {
    let schema = fire_schema();
    let mut state = schema.default_state().clone();
    set(&schema, &mut state, "charged", FieldValue::Int(1));

    let mut writer = BitWriter::new();
    let err = send_properties_for_rpc(&schema, &state, &mut writer, &mut TestResolver::new()).unwrap_err();
    assert!(matches!(err, ReplicationError::ValueKindMismatch { .. }));
    assert!(!err.is_fatal());
}
