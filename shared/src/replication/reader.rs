use replica_serde::{BitReader, Serde, SerdeErr, UnsignedVariableInteger};

use crate::{
    connection::ReferenceResolver,
    replication::{
        change_list::HandleScope,
        error::ReplicationError,
        schema::{FieldKind, FieldValue, ObjectRef, ObjectState, PropertySchema},
        writer::{kind_mismatch, PROPERTY_CHECKSUM},
    },
};

/// What a property stream changed on the receiving object
#[derive(Debug, Default)]
pub(crate) struct ReceivedProperties {
    /// Every parent written to, in arrival order, with its slots as they
    /// were before this stream
    pub parents: Vec<(usize, Vec<FieldValue>)>,
    /// Locations of object references the resolver could not map
    pub unresolved: Vec<Vec<usize>>,
}

struct ReceiveContext<'a, 'r> {
    schema: &'a PropertySchema,
    reader: &'a mut BitReader<'r>,
    resolver: &'a dyn ReferenceResolver,
    max_array_length: usize,
    checksum: bool,
    received: ReceivedProperties,
}

impl ReceiveContext<'_, '_> {
    fn decode_error(&self, source: SerdeErr) -> ReplicationError {
        ReplicationError::Decode {
            schema: self.schema.name().to_string(),
            source,
        }
    }

    fn read_handle_delta(&mut self, handle: u32) -> Result<u32, ReplicationError> {
        let delta = UnsignedVariableInteger::<5>::de(self.reader)
            .map_err(|err| self.decode_error(err))?
            .get();
        if self.checksum {
            let marker = u32::de(self.reader).map_err(|err| self.decode_error(err))?;
            if marker != PROPERTY_CHECKSUM {
                return Err(ReplicationError::ChecksumMismatch {
                    schema: self.schema.name().to_string(),
                    handle,
                    found: marker,
                });
            }
        }
        u32::try_from(delta).map_err(|_| ReplicationError::HandleOutOfSequence {
            schema: self.schema.name().to_string(),
            handle: u32::MAX,
            max_handle: handle,
        })
    }
}

/// Applies one property stream to `state`. Out-of-range handles and
/// oversized arrays are protocol violations.
pub(crate) fn receive_properties(
    schema: &PropertySchema,
    state: &mut ObjectState,
    reader: &mut BitReader,
    resolver: &dyn ReferenceResolver,
    max_array_length: usize,
) -> Result<ReceivedProperties, ReplicationError> {
    let checksum = reader.read_bit().map_err(|source| ReplicationError::Decode {
        schema: schema.name().to_string(),
        source,
    })?;
    let mut context = ReceiveContext {
        schema,
        reader,
        resolver,
        max_array_length,
        checksum,
        received: ReceivedProperties::default(),
    };
    receive_scope(
        &mut context,
        HandleScope::root(schema),
        std::slice::from_mut(&mut state.slots),
        &[],
        true,
    )?;
    Ok(context.received)
}

fn receive_scope(
    context: &mut ReceiveContext,
    scope: HandleScope,
    elements: &mut [Vec<FieldValue>],
    prefix: &[usize],
    root: bool,
) -> Result<(), ReplicationError> {
    let schema = context.schema;
    let max_handle = scope.max_handle(elements.len());
    let mut handle: u32 = 0;

    loop {
        let delta = context.read_handle_delta(handle)?;
        if delta == 0 {
            return Ok(());
        }
        let out_of_sequence = |handle: u32| ReplicationError::HandleOutOfSequence {
            schema: schema.name().to_string(),
            handle,
            max_handle,
        };
        handle = handle.checked_add(delta).ok_or_else(|| out_of_sequence(u32::MAX))?;
        let (element, cmd_index) = scope.locate(handle).ok_or_else(|| out_of_sequence(handle))?;
        let Some(slots) = elements.get_mut(element) else {
            return Err(out_of_sequence(handle));
        };
        let mut cmd = schema.cmds().get(cmd_index).ok_or_else(|| out_of_sequence(handle))?;
        let mut slot = cmd.slot();

        if root {
            let mut parent = cmd.parent_index;
            if let Some(swap) = schema.parent(parent).and_then(|field| field.role_swap_index) {
                let offset = slot - schema.parent_slots(parent).start;
                slot = schema.parent_slots(swap).start + offset;
                parent = swap;
                if let Some(swapped) = schema.root_cmds().get(slot).and_then(|index| schema.cmds().get(*index)) {
                    cmd = swapped;
                }
            }
            if !context.received.parents.iter().any(|(seen, _)| *seen == parent) {
                let range = schema.parent_slots(parent);
                let old = slots.get(range).map(<[FieldValue]>::to_vec).unwrap_or_default();
                context.received.parents.push((parent, old));
            }
        }

        let mut path = prefix.to_vec();
        if !root {
            path.push(element);
        }
        path.push(slot);

        let Some(target) = slots.get_mut(slot) else {
            return Err(kind_mismatch(schema, cmd, "nothing"));
        };

        if cmd.kind == FieldKind::DynamicArray {
            let length = u16::de(context.reader).map_err(|err| context.decode_error(err))?;
            let length = usize::from(length);
            if length > context.max_array_length {
                return Err(ReplicationError::ArrayTooLarge {
                    schema: schema.name().to_string(),
                    field: cmd.name.clone(),
                    length,
                    limit: context.max_array_length,
                });
            }
            if target.as_array().is_none() {
                *target = FieldValue::Array(Vec::new());
            }
            if let FieldValue::Array(array) = target {
                array.resize(length, cmd.element_default.clone());
                receive_scope(context, HandleScope::element(cmd), array.as_mut_slice(), &path, false)?;
            }
            continue;
        }

        let value = cmd
            .kind
            .read_value(context.reader, context.resolver)
            .map_err(|err| context.decode_error(err))?;
        if let FieldValue::Object(ObjectRef::Unresolved(_)) = value {
            context.received.unresolved.push(path);
        }
        *target = value;
    }
}
