use crate::replication::{
    error::ReplicationError,
    schema::{FieldKind, FieldValue, LeafField, ObjectState, PropertySchema},
};

/// Handles selected for sending, in schema order. A dynamic array entry is
/// `[handle, n, <n entries of its element scope>, 0]`; `[handle, 0, 0]`
/// marks a resize with no element changes. The top-level list carries no
/// terminator.
pub type ChangeList = Vec<u32>;

/// Handle numbering of one scope. Root handles run 1..=N; inside an array
/// element `e` the handle of a field with relative handle `r` is
/// `e * N + r`, N being the handles per element.
#[derive(Clone, Copy)]
pub(crate) struct HandleScope<'s> {
    cmds: &'s [usize],
}

impl<'s> HandleScope<'s> {
    pub fn root(schema: &'s PropertySchema) -> Self {
        Self {
            cmds: schema.root_cmds(),
        }
    }

    pub fn element(array: &'s LeafField) -> Self {
        Self {
            cmds: &array.element_cmds,
        }
    }

    pub fn per_element(&self) -> u32 {
        self.cmds.len() as u32
    }

    /// Element index and command index a handle refers to
    pub fn locate(&self, handle: u32) -> Option<(usize, usize)> {
        let per_element = self.per_element();
        if handle == 0 || per_element == 0 {
            return None;
        }
        let element = ((handle - 1) / per_element) as usize;
        let cmd = *self.cmds.get(((handle - 1) % per_element) as usize)?;
        Some((element, cmd))
    }

    /// `None` if the handle would not fit in 32 bits
    pub fn handle(&self, element: usize, relative_handle: u32) -> Option<u32> {
        u32::try_from(element)
            .ok()?
            .checked_mul(self.per_element())?
            .checked_add(relative_handle)
    }

    pub fn max_handle(&self, elements: usize) -> u32 {
        self.handle(elements, 0).unwrap_or(u32::MAX)
    }
}

/// Splits the array entry starting at `pos` into its element sub-list and
/// the position after its terminator
pub(crate) fn array_entry(list: &[u32], pos: usize) -> Option<(&[u32], usize)> {
    let count = *list.get(pos + 1)? as usize;
    let start = pos + 2;
    let end = start.checked_add(count)?;
    if *list.get(end)? != 0 {
        return None;
    }
    Some((&list[start..end], end + 1))
}

fn malformed(schema: &PropertySchema, position: usize) -> ReplicationError {
    ReplicationError::ChangeListMalformed {
        schema: schema.name().to_string(),
        position,
    }
}

/// Sorted, deduplicated union of two change lists. Entries that point past
/// the live length of their array are dropped.
pub(crate) fn merge(
    schema: &PropertySchema,
    a: &[u32],
    b: &[u32],
    live: &ObjectState,
) -> Result<ChangeList, ReplicationError> {
    if a.is_empty() && b.is_empty() {
        return Ok(ChangeList::new());
    }
    let mut output = ChangeList::with_capacity(a.len() + b.len());
    merge_scope(
        schema,
        HandleScope::root(schema),
        a,
        b,
        std::slice::from_ref(&live.slots),
        &mut output,
    )?;
    Ok(output)
}

pub(crate) fn merge_all(
    schema: &PropertySchema,
    lists: &[&[u32]],
    live: &ObjectState,
) -> Result<ChangeList, ReplicationError> {
    let mut output = ChangeList::new();
    for list in lists {
        if !list.is_empty() {
            output = merge(schema, &output, list, live)?;
        }
    }
    Ok(output)
}

struct Cursor<'l> {
    list: &'l [u32],
    pos: usize,
}

impl<'l> Cursor<'l> {
    fn peek(&self) -> Option<u32> {
        self.list.get(self.pos).copied()
    }
}

fn merge_scope(
    schema: &PropertySchema,
    scope: HandleScope,
    a: &[u32],
    b: &[u32],
    elements: &[Vec<FieldValue>],
    output: &mut ChangeList,
) -> Result<(), ReplicationError> {
    let mut a = Cursor { list: a, pos: 0 };
    let mut b = Cursor { list: b, pos: 0 };

    loop {
        let handle = match (a.peek(), b.peek()) {
            (None, None) => return Ok(()),
            (Some(x), None) => x,
            (None, Some(y)) => y,
            (Some(x), Some(y)) => x.min(y),
        };
        let (element, cmd_index) = scope
            .locate(handle)
            .ok_or_else(|| malformed(schema, a.pos.max(b.pos)))?;
        let cmd = schema
            .cmds()
            .get(cmd_index)
            .ok_or_else(|| malformed(schema, a.pos.max(b.pos)))?;
        let in_a = a.peek() == Some(handle);
        let in_b = b.peek() == Some(handle);

        if cmd.kind != FieldKind::DynamicArray {
            if in_a {
                a.pos += 1;
            }
            if in_b {
                b.pos += 1;
            }
            if element < elements.len() {
                output.push(handle);
            }
            continue;
        }

        let mut sub_a: &[u32] = &[];
        let mut sub_b: &[u32] = &[];
        if in_a {
            let (sub, next) = array_entry(a.list, a.pos).ok_or_else(|| malformed(schema, a.pos))?;
            sub_a = sub;
            a.pos = next;
        }
        if in_b {
            let (sub, next) = array_entry(b.list, b.pos).ok_or_else(|| malformed(schema, b.pos))?;
            sub_b = sub;
            b.pos = next;
        }

        let Some(slots) = elements.get(element) else {
            continue;
        };
        let nested: &[Vec<FieldValue>] = slots
            .get(cmd.slot())
            .and_then(FieldValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let mut sub = ChangeList::new();
        merge_scope(schema, HandleScope::element(cmd), sub_a, sub_b, nested, &mut sub)?;
        output.push(handle);
        output.push(sub.len() as u32);
        output.extend(sub);
        output.push(0);
    }
}

/// Concatenates per-parent lists in parent declaration order, which is also
/// root handle order
pub(crate) fn concat_parents(mut per_parent: Vec<(usize, ChangeList)>) -> ChangeList {
    per_parent.sort_by_key(|(parent, _)| *parent);
    per_parent.into_iter().flat_map(|(_, list)| list).collect()
}
