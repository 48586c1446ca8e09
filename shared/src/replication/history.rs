use std::collections::VecDeque;

use crate::{
    connection::PacketNotifiable,
    replication::change_list::ChangeList,
    types::{PacketIdRange, PacketIndex},
};

#[derive(Clone, Debug)]
struct HistoryEntry {
    /// Packets the entry went out on; `None` until the message is sent
    pub range: Option<PacketIdRange>,
    pub changes: ChangeList,
    pub resend: bool,
}

/// Change lists sent but not yet acknowledged, oldest first, holding at most
/// `capacity` entries
pub struct ChangeHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    num_naks: usize,
    /// Lists marked for resend whose entries were retired before the resend
    retired_resends: Vec<ChangeList>,
}

impl ChangeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            num_naks: 0,
            retired_resends: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is waiting on acknowledgment or resend
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.retired_resends.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn num_naks(&self) -> usize {
        self.num_naks
    }

    pub(crate) fn push(&mut self, changes: ChangeList) {
        self.entries.push_back(HistoryEntry {
            range: None,
            changes,
            resend: false,
        });
    }

    /// Records the packets the newest entry went out on
    pub(crate) fn mark_sent(&mut self, range: PacketIdRange) {
        if let Some(entry) = self.entries.back_mut() {
            if entry.range.is_none() {
                entry.range = Some(range);
            }
        }
    }

    /// Drops the newest entry if it was never sent
    pub(crate) fn discard_unsent(&mut self) {
        if self.entries.back().is_some_and(|entry| entry.range.is_none()) {
            self.entries.pop_back();
        }
    }

    /// Marks entries that never went out for resend. Their changes are
    /// already in the shadow state, so the next pass must carry them.
    pub(crate) fn mark_unsent_for_resend(&mut self) {
        for entry in self.entries.iter_mut() {
            if entry.range.is_none() && !entry.resend {
                entry.resend = true;
                self.num_naks += 1;
            }
        }
    }

    /// Removes and returns every list marked for resend
    pub(crate) fn take_resends(&mut self) -> Vec<ChangeList> {
        let mut resends = std::mem::take(&mut self.retired_resends);
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if entry.resend {
                resends.push(entry.changes);
            } else {
                kept.push_back(entry);
            }
        }
        self.entries = kept;
        self.num_naks = 0;
        resends
    }

    /// Empties the history, returning every pending list
    pub(crate) fn take_all(&mut self) -> Vec<ChangeList> {
        let mut lists = std::mem::take(&mut self.retired_resends);
        lists.extend(self.entries.drain(..).map(|entry| entry.changes));
        self.num_naks = 0;
        lists
    }

    /// Packet ranges of sent entries still waiting on acknowledgment
    pub fn pending_ranges(&self) -> impl Iterator<Item = PacketIdRange> + '_ {
        self.entries
            .iter()
            .filter(|entry| !entry.resend)
            .filter_map(|entry| entry.range)
    }
}

impl PacketNotifiable for ChangeHistory {
    /// Retires every entry whose packets all lie at or before `packet_index`
    fn notify_packet_delivered(&mut self, packet_index: PacketIndex) {
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            let acked = entry
                .range
                .is_some_and(|range| range.is_acked_by(packet_index));
            if !acked {
                kept.push_back(entry);
            } else if entry.resend {
                self.retired_resends.push(entry.changes);
            }
        }
        self.entries = kept;
    }

    fn notify_packet_dropped(&mut self, packet_index: PacketIndex) {
        for entry in self.entries.iter_mut() {
            if entry.resend {
                continue;
            }
            if entry.range.is_some_and(|range| range.contains(packet_index)) {
                entry.resend = true;
                self.num_naks += 1;
            }
        }
    }
}
