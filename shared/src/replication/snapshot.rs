use crate::{
    config::ReplicationConfig,
    connection::PacketNotifiable,
    replication::{
        change_list::ChangeList,
        condition::{RepCondition, ReplicationFlags},
        history::ChangeHistory,
        schema::{ObjectState, PropertySchema},
    },
    types::PacketIndex,
};

/// Everything one connection knows about what it last sent for one object
pub struct ReplicationSnapshot {
    shadow: ObjectState,
    history: ChangeHistory,
    /// Handles written with references the remote could not resolve yet
    pub(crate) unmapped: ChangeList,
    pub(crate) unmapped_frames: u32,
    /// Changes sent unreliably before the open was acknowledged
    pub(crate) pre_open_ack: Vec<ChangeList>,
    open_acked: bool,
    active_conditionals: Vec<usize>,
    conditions_built_for: Option<(ReplicationFlags, u32)>,
    /// Frame of the last pass that diffed this snapshot
    pub(crate) last_replication_frame: u64,
}

impl ReplicationSnapshot {
    /// Builds a snapshot from the schema defaults. Config parents are loaded
    /// on both hosts, so their shadow starts at the live values.
    pub fn new(schema: &PropertySchema, live: &ObjectState, config: &ReplicationConfig) -> Self {
        let mut shadow = schema.default_state().clone();
        for (index, parent) in schema.parents().iter().enumerate() {
            if !parent.flags.config {
                continue;
            }
            for slot in schema.parent_slots(index) {
                if let (Some(target), Some(value)) = (shadow.slots.get_mut(slot), live.slots.get(slot)) {
                    *target = value.clone();
                }
            }
        }

        Self {
            shadow,
            history: ChangeHistory::new(config.max_change_history),
            unmapped: ChangeList::new(),
            unmapped_frames: 0,
            pre_open_ack: Vec::new(),
            open_acked: false,
            active_conditionals: Vec::new(),
            conditions_built_for: None,
            last_replication_frame: 0,
        }
    }

    pub fn shadow(&self) -> &ObjectState {
        &self.shadow
    }

    pub(crate) fn shadow_mut(&mut self) -> &mut ObjectState {
        &mut self.shadow
    }

    pub fn history(&self) -> &ChangeHistory {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut ChangeHistory {
        &mut self.history
    }

    pub fn unmapped(&self) -> &[u32] {
        &self.unmapped
    }

    pub fn is_open_acked(&self) -> bool {
        self.open_acked
    }

    pub(crate) fn set_open_acked(&mut self) {
        self.open_acked = true;
    }

    pub(crate) fn reset_open_acked(&mut self) {
        self.open_acked = false;
    }

    /// Conditional parents currently replicated to this connection
    pub fn active_conditionals(&self) -> &[usize] {
        &self.active_conditionals
    }

    /// Re-evaluates which conditional parents apply, if the flags or the
    /// object's custom condition generation moved since the last build.
    /// Returns true when the subset was rebuilt.
    pub(crate) fn rebuild_conditionals(
        &mut self,
        schema: &PropertySchema,
        flags: ReplicationFlags,
        generation: u32,
        custom_active: impl Fn(usize) -> bool,
    ) -> bool {
        if self.conditions_built_for == Some((flags, generation)) {
            return false;
        }
        self.active_conditionals = schema
            .conditional_parents()
            .iter()
            .copied()
            .filter(|index| {
                let Some(parent) = schema.parent(*index) else {
                    return false;
                };
                parent.condition.is_active(&flags)
                    && (parent.condition != RepCondition::Custom || custom_active(*index))
            })
            .collect();
        self.conditions_built_for = Some((flags, generation));
        true
    }

    /// True once every change sent has been acknowledged and nothing is
    /// waiting to be re-sent
    pub fn all_acked(&self) -> bool {
        self.history.is_empty()
            && self.history.num_naks() == 0
            && self.unmapped.is_empty()
            && self.pre_open_ack.is_empty()
            && self.open_acked
    }
}

impl PacketNotifiable for ReplicationSnapshot {
    fn notify_packet_delivered(&mut self, packet_index: PacketIndex) {
        self.history.notify_packet_delivered(packet_index);
    }

    fn notify_packet_dropped(&mut self, packet_index: PacketIndex) {
        self.history.notify_packet_dropped(packet_index);
    }
}
