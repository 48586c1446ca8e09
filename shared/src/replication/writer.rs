use replica_serde::{BitWrite, Serde, UnsignedVariableInteger};

use crate::{
    connection::ReferenceResolver,
    replication::{
        change_list::{array_entry, ChangeList, HandleScope},
        error::ReplicationError,
        schema::{FieldKind, FieldValue, LeafField, ObjectState, PropertySchema},
    },
};

/// Marker written after every handle when checksums are on
pub(crate) const PROPERTY_CHECKSUM: u32 = 0xABAD_F00D;

pub(crate) fn write_handle_delta(writer: &mut dyn BitWrite, delta: u32, checksum: bool) {
    UnsignedVariableInteger::<5>::new(delta).ser(writer);
    if checksum {
        PROPERTY_CHECKSUM.ser(writer);
    }
}

struct SendContext<'a> {
    schema: &'a PropertySchema,
    checksum: bool,
    resolver: &'a mut dyn ReferenceResolver,
}

/// Writes every field named by `changes` from `live`, copying each written
/// value into `shadow`. Returns the handles whose object references the
/// remote cannot resolve yet, in change list form.
pub(crate) fn send_properties(
    schema: &PropertySchema,
    shadow: &mut ObjectState,
    live: &ObjectState,
    changes: &[u32],
    writer: &mut dyn BitWrite,
    resolver: &mut dyn ReferenceResolver,
    checksum: bool,
) -> Result<ChangeList, ReplicationError> {
    writer.write_bit(checksum);
    let mut context = SendContext {
        schema,
        checksum,
        resolver,
    };
    let unmapped = send_scope(
        &mut context,
        HandleScope::root(schema),
        changes,
        std::slice::from_mut(&mut shadow.slots),
        std::slice::from_ref(&live.slots),
        writer,
    )?;
    write_handle_delta(writer, 0, checksum);
    Ok(unmapped)
}

fn send_scope(
    context: &mut SendContext,
    scope: HandleScope,
    changes: &[u32],
    shadow: &mut [Vec<FieldValue>],
    live: &[Vec<FieldValue>],
    writer: &mut dyn BitWrite,
) -> Result<ChangeList, ReplicationError> {
    let schema = context.schema;
    let mut unmapped = ChangeList::new();
    let mut last_handle: u32 = 0;
    let mut pos = 0;

    while pos < changes.len() {
        let handle = changes[pos];
        let malformed = || ReplicationError::ChangeListMalformed {
            schema: schema.name().to_string(),
            position: pos,
        };
        if handle <= last_handle {
            return Err(malformed());
        }
        let (element, cmd_index) = scope.locate(handle).ok_or_else(malformed)?;
        let cmd = schema.cmds().get(cmd_index).ok_or_else(malformed)?;

        let (sub, next) = if cmd.kind == FieldKind::DynamicArray {
            let (sub, next) = array_entry(changes, pos).ok_or_else(malformed)?;
            (Some(sub), next)
        } else {
            (None, pos + 1)
        };
        pos = next;

        let (Some(live_slots), Some(shadow_slots)) = (live.get(element), shadow.get_mut(element)) else {
            // element removed since the change was recorded
            continue;
        };
        let slot = cmd.slot();
        let live_value = live_slots.get(slot).ok_or_else(|| kind_mismatch(schema, cmd, "nothing"))?;

        write_handle_delta(writer, handle - last_handle, context.checksum);
        last_handle = handle;

        match sub {
            Some(sub) => {
                let live_elements = live_value
                    .as_array()
                    .ok_or_else(|| kind_mismatch(schema, cmd, live_value.variant_name()))?;
                let length = u16::try_from(live_elements.len()).map_err(|_| ReplicationError::ArrayTooLarge {
                    schema: schema.name().to_string(),
                    field: cmd.name.clone(),
                    length: live_elements.len(),
                    limit: usize::from(u16::MAX),
                })?;
                length.ser(writer);

                let shadow_elements = shadow_array(shadow_slots, slot, cmd, live_elements.len());
                let nested = send_scope(
                    context,
                    HandleScope::element(cmd),
                    sub,
                    shadow_elements,
                    live_elements,
                    writer,
                )?;
                write_handle_delta(writer, 0, context.checksum);

                if !nested.is_empty() {
                    unmapped.push(handle);
                    unmapped.push(nested.len() as u32);
                    unmapped.extend(nested);
                    unmapped.push(0);
                }
            }
            None => {
                let mapped = cmd
                    .kind
                    .write_value(live_value, writer, context.resolver)
                    .ok_or_else(|| kind_mismatch(schema, cmd, live_value.variant_name()))?;
                if let Some(shadow_value) = shadow_slots.get_mut(slot) {
                    *shadow_value = live_value.clone();
                }
                if !mapped {
                    unmapped.push(handle);
                }
            }
        }
    }
    Ok(unmapped)
}

/// Resizes the shadow copy of an array to `length`, growing with element
/// defaults
fn shadow_array<'s>(
    shadow_slots: &'s mut Vec<FieldValue>,
    slot: usize,
    cmd: &LeafField,
    length: usize,
) -> &'s mut [Vec<FieldValue>] {
    if shadow_slots.len() <= slot {
        shadow_slots.resize(slot + 1, FieldValue::Array(Vec::new()));
    }
    let value = &mut shadow_slots[slot];
    if value.as_array().is_none() {
        *value = FieldValue::Array(Vec::new());
    }
    match value {
        FieldValue::Array(elements) => {
            elements.resize(length, cmd.element_default.clone());
            elements.as_mut_slice()
        }
        _ => &mut [],
    }
}

pub(crate) fn kind_mismatch(
    schema: &PropertySchema,
    cmd: &LeafField,
    found: &'static str,
) -> ReplicationError {
    ReplicationError::ValueKindMismatch {
        schema: schema.name().to_string(),
        field: cmd.name.clone(),
        expected: format!("{:?}", cmd.kind),
        found,
    }
}
