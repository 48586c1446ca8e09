use std::{collections::HashMap, fmt, sync::Arc};

use crate::replication::{
    custom_delta::NetDeltaSerialize,
    error::ReplicationError,
    schema::{FieldValue, ObjectState, PropertySchema},
};

/// A replicated object instance: its schema, live property values and any
/// custom delta properties
pub struct Replica {
    schema: Arc<PropertySchema>,
    state: ObjectState,
    replication_key: u32,
    custom_deltas: HashMap<usize, Box<dyn NetDeltaSerialize>>,
}

impl Replica {
    pub fn new(schema: Arc<PropertySchema>) -> Self {
        let state = schema.default_state().clone();
        Self {
            schema,
            state,
            replication_key: 0,
            custom_deltas: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<PropertySchema> {
        &self.schema
    }

    pub fn class_name(&self) -> &str {
        self.schema.name()
    }

    pub fn state(&self) -> &ObjectState {
        &self.state
    }

    /// Mutable access to the live values. Bumps the replication key.
    pub fn state_mut(&mut self) -> &mut ObjectState {
        self.mark_dirty();
        &mut self.state
    }

    /// Bumped on every mutable access; an unchanged key lets a sub-object be
    /// skipped for a pass
    pub fn replication_key(&self) -> u32 {
        self.replication_key
    }

    pub fn mark_dirty(&mut self) {
        self.replication_key = self.replication_key.wrapping_add(1);
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        let slot = self.schema.slot_of(name)?;
        self.state.slots.get(slot)
    }

    pub fn try_set_field(&mut self, name: &str, value: FieldValue) -> Result<(), ReplicationError> {
        let unknown = || ReplicationError::UnknownField {
            schema: self.schema.name().to_string(),
            field: name.to_string(),
        };
        let slot = self.schema.slot_of(name).ok_or_else(unknown)?;
        let cmd_index = *self.schema.root_cmds().get(slot).ok_or_else(unknown)?;
        let cmd = self.schema.cmds().get(cmd_index).ok_or_else(unknown)?;
        if !cmd.kind.accepts(&value) {
            return Err(ReplicationError::ValueKindMismatch {
                schema: self.schema.name().to_string(),
                field: name.to_string(),
                expected: format!("{:?}", cmd.kind),
                found: value.variant_name(),
            });
        }
        self.state_mut().slots[slot] = value;
        Ok(())
    }

    /// Sets a field by name.
    ///
    /// # Panics
    ///
    /// Panics if no field has this name or the value is of the wrong kind.
    pub fn set_field(&mut self, name: &str, value: FieldValue) {
        if let Err(err) = self.try_set_field(name, value) {
            panic!("{}", err);
        }
    }

    /// Attaches the serializer for a property declared with a custom delta
    /// struct
    pub fn attach_custom_delta(
        &mut self,
        name: &str,
        serializer: Box<dyn NetDeltaSerialize>,
    ) -> Result<(), ReplicationError> {
        let index = self
            .schema
            .parent_index(name)
            .filter(|index| self.schema.custom_delta_parents().contains(index))
            .ok_or_else(|| ReplicationError::UnknownField {
                schema: self.schema.name().to_string(),
                field: name.to_string(),
            })?;
        self.custom_deltas.insert(index, serializer);
        Ok(())
    }

    pub fn custom_delta(&self, parent_index: usize) -> Option<&dyn NetDeltaSerialize> {
        self.custom_deltas.get(&parent_index).map(|delta| delta.as_ref())
    }

    pub(crate) fn custom_delta_mut(
        &mut self,
        parent_index: usize,
    ) -> Option<&mut Box<dyn NetDeltaSerialize>> {
        self.custom_deltas.get_mut(&parent_index)
    }

    /// Receive side access to the live values that leaves the replication
    /// key alone
    pub(crate) fn state_for_receive(&mut self) -> &mut ObjectState {
        &mut self.state
    }
}

impl fmt::Debug for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replica")
            .field("class", &self.schema.name())
            .field("state", &self.state)
            .field("replication_key", &self.replication_key)
            .finish()
    }
}
