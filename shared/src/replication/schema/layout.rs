use std::{collections::HashMap, ops::Range};

use crate::replication::schema::{
    field::{LeafField, ParentField},
    state::ObjectState,
};

/// Immutable flattened description of a class, function or struct. Commands
/// are laid out depth first; every dynamic array is followed by its element
/// commands and a closing `Return`.
#[derive(Debug)]
pub struct PropertySchema {
    pub(crate) name: String,
    pub(crate) cmds: Vec<LeafField>,
    pub(crate) parents: Vec<ParentField>,
    pub(crate) root_cmds: Vec<usize>,
    pub(crate) parent_slots: Vec<Range<usize>>,
    pub(crate) unconditional: Vec<usize>,
    pub(crate) conditional: Vec<usize>,
    pub(crate) custom_delta: Vec<usize>,
    pub(crate) default_state: ObjectState,
    pub(crate) slot_names: HashMap<String, usize>,
    pub(crate) parent_names: HashMap<String, usize>,
}

impl PropertySchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cmds(&self) -> &[LeafField] {
        &self.cmds
    }

    pub fn parents(&self) -> &[ParentField] {
        &self.parents
    }

    pub fn parent(&self, index: usize) -> Option<&ParentField> {
        self.parents.get(index)
    }

    pub fn parent_index(&self, name: &str) -> Option<usize> {
        self.parent_names.get(name).copied()
    }

    /// Command index of each root handle, in handle order
    pub fn root_cmds(&self) -> &[usize] {
        &self.root_cmds
    }

    /// Root slots a parent's value occupies
    pub fn parent_slots(&self, parent_index: usize) -> Range<usize> {
        self.parent_slots
            .get(parent_index)
            .cloned()
            .unwrap_or(0..0)
    }

    /// Root slot of a field, by dotted name (`position.x`, `ammo[2]`)
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.slot_names.get(name).copied()
    }

    pub fn unconditional_parents(&self) -> &[usize] {
        &self.unconditional
    }

    pub fn conditional_parents(&self) -> &[usize] {
        &self.conditional
    }

    pub fn custom_delta_parents(&self) -> &[usize] {
        &self.custom_delta
    }

    pub fn has_custom_delta(&self) -> bool {
        !self.custom_delta.is_empty()
    }

    pub fn default_state(&self) -> &ObjectState {
        &self.default_state
    }

    pub fn root_handle_count(&self) -> u32 {
        self.root_cmds.len() as u32
    }

    /// Parent owning the root slot `slot`
    pub fn parent_of_slot(&self, slot: usize) -> Option<usize> {
        let cmd = self.root_cmds.get(slot)?;
        self.cmds.get(*cmd).map(|cmd| cmd.parent_index)
    }
}
