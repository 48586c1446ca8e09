use crate::replication::schema::FieldValue;

/// A property the receive side changed and asked to be told about
#[derive(Clone, Debug, PartialEq)]
pub struct RepNotify {
    pub parent_index: usize,
    pub name: String,
    /// The parent's slots before the update
    pub old_values: Vec<FieldValue>,
}
