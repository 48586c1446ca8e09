use crate::replication::{
    change_list::{ChangeList, HandleScope},
    schema::{FieldKind, FieldValue, ObjectState, PropertySchema},
};

/// Diffs live state against the shadow for the given parents, returning one
/// change list per parent that changed
pub(crate) fn compare_parents(
    schema: &PropertySchema,
    shadow: &ObjectState,
    live: &ObjectState,
    parents: &[usize],
) -> Vec<(usize, ChangeList)> {
    let mut output = Vec::new();
    for parent in parents {
        let mut changes = ChangeList::new();
        for slot in schema.parent_slots(*parent) {
            let Some(cmd_index) = schema.root_cmds().get(slot) else {
                continue;
            };
            compare_cmd(
                schema,
                *cmd_index,
                Some(&shadow.slots),
                &live.slots,
                slot as u32 + 1,
                &mut changes,
            );
        }
        if !changes.is_empty() {
            output.push((*parent, changes));
        }
    }
    output
}

fn compare_cmd(
    schema: &PropertySchema,
    cmd_index: usize,
    shadow: Option<&[FieldValue]>,
    live: &[FieldValue],
    handle: u32,
    changes: &mut ChangeList,
) {
    let Some(cmd) = schema.cmds().get(cmd_index) else {
        return;
    };
    let slot = cmd.slot();
    let Some(live_value) = live.get(slot) else {
        return;
    };
    let shadow_value = shadow.and_then(|shadow| shadow.get(slot));

    if cmd.kind != FieldKind::DynamicArray {
        let changed = match shadow_value {
            Some(shadow_value) => !cmd.kind.values_equal(shadow_value, live_value),
            None => true,
        };
        if changed {
            changes.push(handle);
        }
        return;
    }

    let live_elements: &[Vec<FieldValue>] = live_value.as_array().map(Vec::as_slice).unwrap_or(&[]);
    let shadow_elements: &[Vec<FieldValue>] = shadow_value
        .and_then(FieldValue::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let scope = HandleScope::element(cmd);
    let mut sub = ChangeList::new();
    for (element, live_slots) in live_elements.iter().enumerate() {
        let shadow_slots = shadow_elements.get(element).map(Vec::as_slice);
        for (index, child) in cmd.element_cmds.iter().enumerate() {
            let Some(child_handle) = scope.handle(element, index as u32 + 1) else {
                continue;
            };
            compare_cmd(schema, *child, shadow_slots, live_slots, child_handle, &mut sub);
        }
    }

    if !sub.is_empty() || live_elements.len() != shadow_elements.len() {
        changes.push(handle);
        changes.push(sub.len() as u32);
        changes.extend(sub);
        changes.push(0);
    }
}
