use std::collections::HashMap;

use crate::types::{NetId, PacketIdRange, PacketIndex};

struct NakSlot {
    packet_index: PacketIndex,
    sub_objects: Vec<NetId>,
}

/// Remembers the replication key each sub-object was last sent with, and
/// which packets carried them, so an unchanged sub-object can be skipped
/// until a packet that carried it is lost
pub(crate) struct SubObjectKeys {
    last_sent: HashMap<NetId, u32>,
    nak_map: Vec<Option<NakSlot>>,
}

impl SubObjectKeys {
    pub fn new(nak_buffer: usize) -> Self {
        let mut nak_map = Vec::new();
        nak_map.resize_with(nak_buffer.max(1), || None);
        Self {
            last_sent: HashMap::new(),
            nak_map,
        }
    }

    pub fn needs_to_replicate(&self, net_id: &NetId, key: u32) -> bool {
        self.last_sent.get(net_id) != Some(&key)
    }

    /// Records a key that needed no message because nothing changed
    pub fn note_unchanged(&mut self, net_id: NetId, key: u32) {
        self.last_sent.insert(net_id, key);
    }

    /// Records the keys a message carried and the packets it went out on
    pub fn record(&mut self, range: PacketIdRange, written: &[(NetId, u32)]) {
        if written.is_empty() {
            return;
        }
        for (net_id, key) in written {
            self.last_sent.insert(*net_id, *key);
        }
        let slots = self.nak_map.len();
        for packet_index in range.packets() {
            self.nak_map[usize::from(packet_index) % slots] = Some(NakSlot {
                packet_index,
                sub_objects: written.iter().map(|(net_id, _)| *net_id).collect(),
            });
        }
    }

    pub fn notify_packet_dropped(&mut self, packet_index: PacketIndex) {
        let slots = self.nak_map.len();
        let slot = &mut self.nak_map[usize::from(packet_index) % slots];
        if slot.as_ref().is_some_and(|slot| slot.packet_index == packet_index) {
            if let Some(slot) = slot.take() {
                for net_id in slot.sub_objects {
                    self.last_sent.remove(&net_id);
                }
            }
        }
    }

    pub fn forget(&mut self, net_id: &NetId) {
        self.last_sent.remove(net_id);
    }

    pub fn clear(&mut self) {
        self.last_sent.clear();
        for slot in self.nak_map.iter_mut() {
            *slot = None;
        }
    }
}
