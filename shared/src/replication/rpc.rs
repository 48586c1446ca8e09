use replica_serde::{BitReader, BitWrite, Serde};

use crate::{
    connection::ReferenceResolver,
    replication::{
        error::ReplicationError,
        schema::{FieldKind, FieldValue, ObjectState, PropertySchema},
        writer::kind_mismatch,
    },
};

/// Writes call parameters. Bools are written as their value, other
/// parameters as a "differs from default" bit followed by the value when set.
/// Parameters holding arrays are always written.
pub fn send_properties_for_rpc(
    schema: &PropertySchema,
    state: &ObjectState,
    writer: &mut dyn BitWrite,
    resolver: &mut dyn ReferenceResolver,
) -> Result<(), ReplicationError> {
    let defaults = schema.default_state();
    for (index, parent) in schema.parents().iter().enumerate() {
        if parent.flags.custom_delta {
            continue;
        }
        let slots = schema.parent_slots(index);
        match rpc_layout(schema, index) {
            RpcLayout::Bool => {
                let value = slots.clone().next().and_then(|slot| state.slots.get(slot));
                let Some(FieldValue::Bool(value)) = value else {
                    return Err(parameter_mismatch(schema, index, value));
                };
                writer.write_bit(*value);
                continue;
            }
            RpcLayout::Flagged => {
                let differs = slots
                    .clone()
                    .any(|slot| state.slots.get(slot) != defaults.slots.get(slot));
                writer.write_bit(differs);
                if !differs {
                    continue;
                }
            }
            RpcLayout::Always => {}
        }
        for slot in slots {
            if let Some(cmd_index) = schema.root_cmds().get(slot) {
                write_full(schema, state.slots.get(slot), *cmd_index, writer, resolver)?;
            }
        }
    }
    Ok(())
}

/// Reads call parameters written by `send_properties_for_rpc` into a fresh
/// default state
pub fn receive_properties_for_rpc(
    schema: &PropertySchema,
    reader: &mut BitReader,
    resolver: &dyn ReferenceResolver,
    max_array_length: usize,
) -> Result<ObjectState, ReplicationError> {
    let mut state = schema.default_state().clone();
    for index in 0..schema.parents().len() {
        if schema.parents()[index].flags.custom_delta {
            continue;
        }
        let slots = schema.parent_slots(index);
        match rpc_layout(schema, index) {
            RpcLayout::Bool => {
                let value = reader.read_bit().map_err(|source| decode(schema, source))?;
                if let Some(slot) = slots.clone().next().and_then(|slot| state.slots.get_mut(slot)) {
                    *slot = FieldValue::Bool(value);
                }
                continue;
            }
            RpcLayout::Flagged => {
                if !reader.read_bit().map_err(|source| decode(schema, source))? {
                    continue;
                }
            }
            RpcLayout::Always => {}
        }
        for slot in slots {
            let Some(cmd_index) = schema.root_cmds().get(slot) else {
                continue;
            };
            let value = read_full(schema, *cmd_index, reader, resolver, max_array_length)?;
            if let Some(target) = state.slots.get_mut(slot) {
                *target = value;
            }
        }
    }
    Ok(state)
}

/// Writes every field of a plain struct, no change tracking
pub fn net_serialize_struct(
    schema: &PropertySchema,
    state: &ObjectState,
    writer: &mut dyn BitWrite,
    resolver: &mut dyn ReferenceResolver,
) -> Result<(), ReplicationError> {
    for (slot, cmd_index) in schema.root_cmds().iter().enumerate() {
        write_full(schema, state.slots.get(slot), *cmd_index, writer, resolver)?;
    }
    Ok(())
}

pub fn net_deserialize_struct(
    schema: &PropertySchema,
    reader: &mut BitReader,
    resolver: &dyn ReferenceResolver,
    max_array_length: usize,
) -> Result<ObjectState, ReplicationError> {
    let mut state = schema.default_state().clone();
    for (slot, cmd_index) in schema.root_cmds().iter().enumerate() {
        let value = read_full(schema, *cmd_index, reader, resolver, max_array_length)?;
        if let Some(target) = state.slots.get_mut(slot) {
            *target = value;
        }
    }
    Ok(state)
}

enum RpcLayout {
    Bool,
    Flagged,
    Always,
}

fn rpc_layout(schema: &PropertySchema, parent: usize) -> RpcLayout {
    let parent = match schema.parent(parent) {
        Some(parent) => parent,
        None => return RpcLayout::Flagged,
    };
    let cmds = &schema.cmds()[parent.cmd_start..parent.cmd_end];
    if cmds.iter().any(|cmd| cmd.kind == FieldKind::DynamicArray) {
        RpcLayout::Always
    } else if cmds.len() == 1 && cmds[0].kind == FieldKind::Bool {
        RpcLayout::Bool
    } else {
        RpcLayout::Flagged
    }
}

fn write_full(
    schema: &PropertySchema,
    value: Option<&FieldValue>,
    cmd_index: usize,
    writer: &mut dyn BitWrite,
    resolver: &mut dyn ReferenceResolver,
) -> Result<(), ReplicationError> {
    let Some(cmd) = schema.cmds().get(cmd_index) else {
        return Ok(());
    };
    let Some(value) = value else {
        return Err(kind_mismatch(schema, cmd, "nothing"));
    };

    if cmd.kind == FieldKind::DynamicArray {
        let elements = value
            .as_array()
            .ok_or_else(|| kind_mismatch(schema, cmd, value.variant_name()))?;
        let length = u16::try_from(elements.len()).map_err(|_| ReplicationError::ArrayTooLarge {
            schema: schema.name().to_string(),
            field: cmd.name.clone(),
            length: elements.len(),
            limit: usize::from(u16::MAX),
        })?;
        length.ser(writer);
        for element in elements {
            for (slot, child) in cmd.element_cmds.iter().enumerate() {
                write_full(schema, element.get(slot), *child, writer, resolver)?;
            }
        }
        return Ok(());
    }

    cmd.kind
        .write_value(value, writer, resolver)
        .map(|_| ())
        .ok_or_else(|| kind_mismatch(schema, cmd, value.variant_name()))
}

fn read_full(
    schema: &PropertySchema,
    cmd_index: usize,
    reader: &mut BitReader,
    resolver: &dyn ReferenceResolver,
    max_array_length: usize,
) -> Result<FieldValue, ReplicationError> {
    let Some(cmd) = schema.cmds().get(cmd_index) else {
        return Ok(FieldValue::Bytes(Vec::new()));
    };
    if cmd.kind != FieldKind::DynamicArray {
        return cmd.kind.read_value(reader, resolver).map_err(|source| decode(schema, source));
    }

    let length = usize::from(u16::de(reader).map_err(|source| decode(schema, source))?);
    if length > max_array_length {
        return Err(ReplicationError::ArrayTooLarge {
            schema: schema.name().to_string(),
            field: cmd.name.clone(),
            length,
            limit: max_array_length,
        });
    }
    let mut elements = Vec::with_capacity(length);
    for _ in 0..length {
        let mut element = Vec::with_capacity(cmd.element_cmds.len());
        for child in &cmd.element_cmds {
            element.push(read_full(schema, *child, reader, resolver, max_array_length)?);
        }
        elements.push(element);
    }
    Ok(FieldValue::Array(elements))
}

fn decode(schema: &PropertySchema, source: replica_serde::SerdeErr) -> ReplicationError {
    ReplicationError::Decode {
        schema: schema.name().to_string(),
        source,
    }
}

fn parameter_mismatch(
    schema: &PropertySchema,
    parent: usize,
    value: Option<&FieldValue>,
) -> ReplicationError {
    ReplicationError::ValueKindMismatch {
        schema: schema.name().to_string(),
        field: schema
            .parent(parent)
            .map(|parent| parent.name.clone())
            .unwrap_or_default(),
        expected: "Bool".to_string(),
        found: value.map(FieldValue::variant_name).unwrap_or("nothing"),
    }
}
