use thiserror::Error;

use crate::sequence_less_than;

/// Errors that can occur during SequenceList operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// Attempted to insert a duplicate ID into the sequence list
    #[error("Duplicate sequence ID {id} not allowed in SequenceList")]
    DuplicateId { id: u16 },
}

/// List of items kept sorted by wrapping u16 sequence id, oldest first.
/// Inserts scan from the back since new ids are usually the newest.
pub struct SequenceList<T> {
    list: Vec<(u16, T)>,
}

impl<T> SequenceList<T> {
    pub fn new() -> Self {
        Self { list: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn front(&self) -> Option<&(u16, T)> {
        self.list.first()
    }

    pub fn pop_front(&mut self) -> Option<(u16, T)> {
        if self.list.is_empty() {
            return None;
        }
        Some(self.list.remove(0))
    }

    pub fn contains_scan_from_back(&self, id: &u16) -> bool {
        for (old_id, _) in self.list.iter().rev() {
            if old_id == id {
                return true;
            }
            if sequence_less_than(*old_id, *id) {
                return false;
            }
        }
        false
    }

    /// Inserts an item in sequence order.
    /// Returns an error if the ID already exists.
    pub fn try_insert_scan_from_back(&mut self, id: u16, item: T) -> Result<(), SequenceError> {
        let mut index = self.list.len();
        while index > 0 {
            let old_id = self.list[index - 1].0;
            if old_id == id {
                return Err(SequenceError::DuplicateId { id });
            }
            if sequence_less_than(old_id, id) {
                break;
            }
            index -= 1;
        }
        self.list.insert(index, (id, item));
        Ok(())
    }

    /// Inserts an item in sequence order.
    ///
    /// # Panics
    ///
    /// Panics if a duplicate ID already exists in the list.
    pub fn insert_scan_from_back(&mut self, id: u16, item: T) {
        if let Err(err) = self.try_insert_scan_from_back(id, item) {
            panic!("{}", err);
        }
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }
}

impl<T> Default for SequenceList<T> {
    fn default() -> Self {
        Self::new()
    }
}
