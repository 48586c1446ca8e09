use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use log::{debug, warn};
use replica_serde::{BitReader, BitWrite, BitWriter, Serde, UnsignedVariableInteger};

use crate::{
    config::ReplicationConfig,
    connection::{PacketNotifiable, ReferenceResolver},
    replication::{
        change_list::{concat_parents, merge_all, ChangeList},
        compare::compare_parents,
        condition::ReplicationFlags,
        error::ReplicationError,
        notify::RepNotify,
        reader::receive_properties,
        replica::Replica,
        schema::{FieldValue, ObjectRef, PropertySchema, RepNotifyPolicy},
        shared_change_cache::{try_lock_for_pass, SharedChangeCache},
        snapshot::ReplicationSnapshot,
        writer::send_properties,
    },
    types::{ObjectKey, PacketIdRange, PacketIndex},
};

/// Custom delta versions written in one message, waiting on its packets
struct DeltaInFlight {
    range: Option<PacketIdRange>,
    parents: Vec<usize>,
}

/// Replicates one object over one connection: diffs the live state against
/// the connection's snapshot, folds in retransmission debt and writes the
/// result. On the receiving host it applies the stream to the local replica.
pub struct ReplicationAgent {
    object: ObjectKey,
    schema: Arc<PropertySchema>,
    snapshot: ReplicationSnapshot,
    config: ReplicationConfig,
    initial: bool,
    last_update_empty: bool,
    /// Changes written by the last pass, until the message is sent
    last_sent: Option<ChangeList>,
    delta_bases: HashMap<usize, u32>,
    deltas_in_flight: Vec<DeltaInFlight>,
    /// Receive side locations of references to identities not yet known
    unresolved: Vec<Vec<usize>>,
}

impl ReplicationAgent {
    pub fn new(object: ObjectKey, replica: &Replica, config: &ReplicationConfig) -> Self {
        let schema = replica.schema().clone();
        let snapshot = ReplicationSnapshot::new(&schema, replica.state(), config);
        Self {
            object,
            schema,
            snapshot,
            config: config.clone(),
            initial: true,
            last_update_empty: false,
            last_sent: None,
            delta_bases: HashMap::new(),
            deltas_in_flight: Vec::new(),
            unresolved: Vec::new(),
        }
    }

    pub fn object(&self) -> &ObjectKey {
        &self.object
    }

    pub fn schema(&self) -> &Arc<PropertySchema> {
        &self.schema
    }

    pub fn snapshot(&self) -> &ReplicationSnapshot {
        &self.snapshot
    }

    // Sending

    /// Runs one replication pass, writing into `writer`. Returns false when
    /// nothing worth sending was written; the caller then drops the writer's
    /// contents and must not call `post_send`.
    pub fn replicate(
        &mut self,
        replica: &Replica,
        cache: &RwLock<SharedChangeCache>,
        frame: u64,
        flags: ReplicationFlags,
        writer: &mut dyn BitWrite,
        resolver: &mut dyn ReferenceResolver,
    ) -> Result<bool, ReplicationError> {
        let mut cache = try_lock_for_pass(cache, &self.object)?;
        let schema = self.schema.clone();
        let live = replica.state();
        self.last_sent = None;

        let flags = ReplicationFlags {
            initial: self.initial,
            ..flags
        };
        self.snapshot.rebuild_conditionals(
            &schema,
            flags,
            cache.active_generation(),
            |index| cache.is_custom_active(index),
        );

        let snapshot_frame = self.snapshot.last_replication_frame;
        let mut per_parent = if cache.can_reuse(frame, snapshot_frame, self.config.property_skip_enabled) {
            cache.cached().to_vec()
        } else {
            let lists = compare_parents(
                &schema,
                self.snapshot.shadow(),
                live,
                schema.unconditional_parents(),
            );
            cache.store(frame, snapshot_frame, lists.clone());
            lists
        };
        per_parent.extend(compare_parents(
            &schema,
            self.snapshot.shadow(),
            live,
            self.snapshot.active_conditionals(),
        ));
        let new_changes = concat_parents(per_parent);

        // retransmission debt
        let mut debt: Vec<ChangeList> = Vec::new();
        if self.snapshot.history().is_full() {
            warn!(
                "ReplicationAgent: change history of {} object {} is full, flushing",
                schema.name(),
                self.object.value()
            );
            debt.extend(self.snapshot.history_mut().take_all());
        }
        debt.extend(self.snapshot.history_mut().take_resends());
        if self.snapshot.is_open_acked() {
            debt.append(&mut self.snapshot.pre_open_ack);
        }
        let unmapped = std::mem::take(&mut self.snapshot.unmapped);

        let mut lists: Vec<&[u32]> = vec![new_changes.as_slice(), unmapped.as_slice()];
        lists.extend(debt.iter().map(|list| list.as_slice()));
        let merged = merge_all(&schema, &lists, live)?;

        writer.write_bit(!merged.is_empty());
        if !merged.is_empty() {
            self.snapshot.history_mut().push(merged.clone());
            let sent = send_properties(
                &schema,
                self.snapshot.shadow_mut(),
                live,
                &merged,
                writer,
                resolver,
                self.config.checksum_enabled,
            );
            let unmapped = match sent {
                Ok(unmapped) => unmapped,
                Err(err) => {
                    self.snapshot.history_mut().discard_unsent();
                    return Err(err);
                }
            };
            self.track_unmapped(unmapped);
            self.last_sent = Some(merged.clone());
        } else {
            self.snapshot.unmapped_frames = 0;
        }

        let wrote_delta = if schema.has_custom_delta() {
            self.write_custom_deltas(replica, writer)
        } else {
            false
        };

        self.last_update_empty = new_changes.is_empty() && !wrote_delta;
        self.snapshot.last_replication_frame = frame;
        self.initial = false;

        Ok(!merged.is_empty() || wrote_delta)
    }

    fn track_unmapped(&mut self, unmapped: ChangeList) {
        if unmapped.is_empty() {
            self.snapshot.unmapped_frames = 0;
        } else {
            self.snapshot.unmapped_frames += 1;
            let threshold = self.config.unmapped_frames_warning.max(1);
            if self.snapshot.unmapped_frames % threshold == 0 {
                warn!(
                    "ReplicationAgent: {} object {} has waited {} passes on unresolved references",
                    self.schema.name(),
                    self.object.value(),
                    self.snapshot.unmapped_frames
                );
            }
        }
        self.snapshot.unmapped = unmapped;
    }

    /// Writes `(parent + 1, delta)` blocks for every custom delta property
    /// that changed, closed by a zero
    fn write_custom_deltas(&mut self, replica: &Replica, writer: &mut dyn BitWrite) -> bool {
        let mut written = Vec::new();
        for parent in self.schema.custom_delta_parents() {
            let Some(serializer) = replica.custom_delta(*parent) else {
                continue;
            };
            let mut delta_writer = BitWriter::new();
            let base = self.delta_bases.get(parent).copied();
            let Some(version) = serializer.write_delta(base, &mut delta_writer) else {
                continue;
            };
            UnsignedVariableInteger::<7>::new(*parent as u64 + 1).ser(writer);
            let (bytes, bits) = delta_writer.into_bits();
            writer.write_bits(&bytes, bits);
            self.delta_bases.insert(*parent, version);
            written.push(*parent);
        }
        UnsignedVariableInteger::<7>::new(0u64).ser(writer);

        if written.is_empty() {
            return false;
        }
        self.deltas_in_flight.push(DeltaInFlight {
            range: None,
            parents: written,
        });
        true
    }

    /// Records the packets the last pass went out on
    pub fn post_send(&mut self, range: PacketIdRange, reliable: bool) {
        if let Some(sent) = self.last_sent.take() {
            self.snapshot.history_mut().mark_sent(range);
            if !reliable && !self.snapshot.is_open_acked() {
                self.snapshot.pre_open_ack.push(sent);
            }
        }
        if let Some(in_flight) = self.deltas_in_flight.last_mut() {
            if in_flight.range.is_none() {
                in_flight.range = Some(range);
            }
        }
    }

    /// The pass this agent wrote was never sent. Changes already folded into
    /// the shadow state become resend debt and unsent deltas are rewritten
    /// from their last known base.
    pub(crate) fn abandon_pass(&mut self) {
        if self.last_sent.take().is_some() {
            self.snapshot.history_mut().mark_unsent_for_resend();
        }
        let bases = &mut self.delta_bases;
        self.deltas_in_flight.retain(|in_flight| {
            if in_flight.range.is_some() {
                return true;
            }
            for parent in &in_flight.parents {
                bases.remove(parent);
            }
            false
        });
    }

    /// The channel's open was acknowledged. Unreliable changes sent before
    /// this are folded into the next pass.
    pub fn on_open_acked(&mut self) {
        if !self.snapshot.is_open_acked() {
            debug!(
                "ReplicationAgent: open acked for {} object {}",
                self.schema.name(),
                self.object.value()
            );
        }
        self.snapshot.set_open_acked();
    }

    /// The agent was reclaimed from dormancy onto a fresh channel whose open
    /// is not yet acknowledged
    pub(crate) fn on_reopen(&mut self) {
        self.snapshot.reset_open_acked();
    }

    /// The object was skipped this pass because nothing touched it
    pub(crate) fn mark_unchanged(&mut self) {
        self.last_update_empty = true;
    }

    /// True when the agent still owes the remote a retransmission
    pub fn has_pending_resend(&self) -> bool {
        self.snapshot.history().num_naks() > 0
            || !self.snapshot.unmapped().is_empty()
            || (self.snapshot.is_open_acked() && !self.snapshot.pre_open_ack.is_empty())
    }

    /// The object may stop replicating without losing anything: the last
    /// pass found no changes and every change ever sent has been acked
    pub fn ready_for_dormancy(&self) -> bool {
        self.last_update_empty && self.snapshot.all_acked() && self.deltas_in_flight.is_empty()
    }

    // Receiving

    /// Applies one block written by `replicate` on the remote host, returning
    /// the notifications it raised
    pub fn receive(
        &mut self,
        replica: &mut Replica,
        reader: &mut BitReader,
        resolver: &dyn ReferenceResolver,
    ) -> Result<Vec<RepNotify>, ReplicationError> {
        let schema = self.schema.clone();
        let decode = |source| ReplicationError::Decode {
            schema: schema.name().to_string(),
            source,
        };
        let mut notifies = Vec::new();

        if reader.read_bit().map_err(decode)? {
            let received = receive_properties(
                &schema,
                replica.state_for_receive(),
                reader,
                resolver,
                self.config.max_array_length,
            )?;
            for (parent_index, old_values) in received.parents {
                if self.should_notify(parent_index, &old_values, replica) {
                    notifies.push(self.notify(parent_index, old_values));
                }
            }

            let state = replica.state();
            self.unresolved.retain(|path| {
                matches!(
                    state.value_at(path),
                    Some(FieldValue::Object(ObjectRef::Unresolved(_)))
                )
            });
            for path in received.unresolved {
                if !self.unresolved.contains(&path) {
                    self.unresolved.push(path);
                }
            }
        }

        if schema.has_custom_delta() {
            loop {
                let tag = UnsignedVariableInteger::<7>::de(reader).map_err(decode)?.get();
                if tag == 0 {
                    break;
                }
                let parent_index =
                    usize::try_from(tag - 1).map_err(|_| ReplicationError::UnknownCustomDelta {
                        schema: schema.name().to_string(),
                        parent: usize::MAX,
                    })?;
                let Some(serializer) = replica.custom_delta_mut(parent_index) else {
                    return Err(ReplicationError::UnknownCustomDelta {
                        schema: schema.name().to_string(),
                        parent: parent_index,
                    });
                };
                serializer.read_delta(reader).map_err(decode)?;
                if schema.parent(parent_index).is_some_and(|parent| parent.notify.is_some()) {
                    notifies.push(self.notify(parent_index, Vec::new()));
                }
            }
        }

        Ok(notifies)
    }

    fn should_notify(&self, parent_index: usize, old_values: &[FieldValue], replica: &Replica) -> bool {
        let Some(parent) = self.schema.parent(parent_index) else {
            return false;
        };
        match parent.notify {
            None => false,
            Some(RepNotifyPolicy::Always) => true,
            Some(RepNotifyPolicy::OnChanged) => {
                let slots = self.schema.parent_slots(parent_index);
                replica.state().slots.get(slots) != Some(old_values)
            }
        }
    }

    fn notify(&self, parent_index: usize, old_values: Vec<FieldValue>) -> RepNotify {
        let name = self
            .schema
            .parent(parent_index)
            .map(|parent| parent.name.clone())
            .unwrap_or_default();
        RepNotify {
            parent_index,
            name,
            old_values,
        }
    }

    /// True while a received object reference still waits on its identity
    pub fn has_unresolved_references(&self) -> bool {
        !self.unresolved.is_empty()
    }

    /// Retries every reference received before its identity was known,
    /// notifying the properties that resolved
    pub fn update_unmapped_references(
        &mut self,
        replica: &mut Replica,
        resolver: &dyn ReferenceResolver,
    ) -> Vec<RepNotify> {
        let mut changed: Vec<(usize, Vec<FieldValue>)> = Vec::new();
        let mut still_unresolved = Vec::new();

        for path in std::mem::take(&mut self.unresolved) {
            let state = replica.state_for_receive();
            let net_id = match state.value_at(&path) {
                Some(FieldValue::Object(ObjectRef::Unresolved(net_id))) => *net_id,
                _ => continue,
            };
            let Some(object) = resolver.object_for_identity(&net_id) else {
                still_unresolved.push(path);
                continue;
            };

            let parent_index = path
                .first()
                .and_then(|slot| self.schema.parent_of_slot(*slot));
            if let Some(parent_index) = parent_index {
                if !changed.iter().any(|(index, _)| *index == parent_index) {
                    let slots = self.schema.parent_slots(parent_index);
                    let old_values = state.slots.get(slots).map(<[FieldValue]>::to_vec).unwrap_or_default();
                    changed.push((parent_index, old_values));
                }
            }
            if let Some(value) = state.value_at_mut(&path) {
                *value = FieldValue::Object(ObjectRef::Object(object));
            }
        }
        self.unresolved = still_unresolved;

        changed
            .into_iter()
            .filter(|(parent_index, _)| {
                self.schema
                    .parent(*parent_index)
                    .is_some_and(|parent| parent.notify.is_some())
            })
            .map(|(parent_index, old_values)| self.notify(parent_index, old_values))
            .collect()
    }
}

impl PacketNotifiable for ReplicationAgent {
    fn notify_packet_delivered(&mut self, packet_index: PacketIndex) {
        self.snapshot.notify_packet_delivered(packet_index);
        self.deltas_in_flight.retain(|in_flight| {
            !in_flight
                .range
                .is_some_and(|range| range.is_acked_by(packet_index))
        });
    }

    fn notify_packet_dropped(&mut self, packet_index: PacketIndex) {
        self.snapshot.notify_packet_dropped(packet_index);
        let bases = &mut self.delta_bases;
        self.deltas_in_flight.retain(|in_flight| {
            let lost = in_flight
                .range
                .is_some_and(|range| range.contains(packet_index));
            if lost {
                for parent in &in_flight.parents {
                    bases.remove(parent);
                }
            }
            !lost
        });
    }
}
