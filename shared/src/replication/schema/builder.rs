use std::collections::HashMap;

use log::warn;

use crate::replication::{
    condition::RepCondition,
    schema::{
        descriptor::{
            ClassDescriptor, FunctionDescriptor, PropertyDescriptor, PropertyType,
            StructDescriptor, StructSerializer,
        },
        error::SchemaError,
        field::{FieldKind, LeafField, ParentField, ParentFlags},
        layout::PropertySchema,
        state::{FieldValue, ObjectState},
    },
};

const ROLE: &str = "role";
const REMOTE_ROLE: &str = "remote_role";

impl PropertySchema {
    pub fn from_class(class: &ClassDescriptor) -> Result<Self, SchemaError> {
        SchemaBuilder::new(&class.name).build(&class.properties)
    }

    pub fn from_function(function: &FunctionDescriptor) -> Result<Self, SchemaError> {
        SchemaBuilder::new(&function.name).build(&function.parameters)
    }

    /// Every member of the struct becomes a top-level property
    pub fn from_struct(descriptor: &StructDescriptor) -> Result<Self, SchemaError> {
        let mut members: Vec<PropertyDescriptor> = descriptor.members.clone();
        members.sort_by_key(|member| member.offset);
        SchemaBuilder::new(&descriptor.name).build(&members)
    }
}

#[derive(Default)]
struct Scope {
    cmds: Vec<usize>,
    defaults: Vec<FieldValue>,
}

impl Scope {
    fn next_handle(&self) -> u32 {
        self.cmds.len() as u32 + 1
    }

    fn push(&mut self, cmd_index: usize, default: FieldValue) {
        self.cmds.push(cmd_index);
        self.defaults.push(default);
    }
}

struct SchemaBuilder {
    name: String,
    cmds: Vec<LeafField>,
    parents: Vec<ParentField>,
}

impl SchemaBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cmds: Vec::new(),
            parents: Vec::new(),
        }
    }

    fn build(mut self, properties: &[PropertyDescriptor]) -> Result<PropertySchema, SchemaError> {
        let mut root = Scope::default();
        let mut parent_slots = Vec::new();

        for property in properties {
            let dim = property.array_dim.max(1);
            for array_index in 0..dim {
                let name = if dim > 1 {
                    format!("{}[{}]", property.name, array_index)
                } else {
                    property.name.clone()
                };
                let parent_index = self.parents.len();
                let cmd_start = self.cmds.len();
                let slot_start = root.cmds.len();

                let custom_delta = matches!(
                    &property.ty,
                    PropertyType::Struct(StructDescriptor {
                        serializer: StructSerializer::CustomDelta,
                        ..
                    })
                );
                if !custom_delta {
                    self.emit(&property.ty, name.clone(), parent_index, property.default.as_ref(), &mut root)?;
                }

                let conditional = property.condition != RepCondition::None;
                self.parents.push(ParentField {
                    name,
                    cmd_start,
                    cmd_end: self.cmds.len(),
                    flags: ParentFlags {
                        lifetime: !conditional,
                        conditional,
                        custom_delta,
                        config: property.config,
                    },
                    condition: property.condition,
                    notify: property.notify,
                    role_swap_index: None,
                    array_index,
                });
                parent_slots.push(slot_start..root.cmds.len());
            }
        }

        self.pair_roles()?;

        let mut unconditional = Vec::new();
        let mut conditional = Vec::new();
        let mut custom_delta = Vec::new();
        for (index, parent) in self.parents.iter().enumerate() {
            if parent.flags.custom_delta {
                custom_delta.push(index);
            } else if parent.flags.conditional {
                conditional.push(index);
            } else {
                unconditional.push(index);
            }
        }

        let slot_names: HashMap<String, usize> = root
            .cmds
            .iter()
            .enumerate()
            .filter_map(|(slot, cmd)| self.cmds.get(*cmd).map(|cmd| (cmd.name.clone(), slot)))
            .collect();
        let parent_names = self
            .parents
            .iter()
            .enumerate()
            .map(|(index, parent)| (parent.name.clone(), index))
            .collect();

        Ok(PropertySchema {
            name: self.name,
            cmds: self.cmds,
            parents: self.parents,
            root_cmds: root.cmds,
            parent_slots,
            unconditional,
            conditional,
            custom_delta,
            default_state: ObjectState::new(root.defaults),
            slot_names,
            parent_names,
        })
    }

    fn emit(
        &mut self,
        ty: &PropertyType,
        name: String,
        parent_index: usize,
        default: Option<&FieldValue>,
        scope: &mut Scope,
    ) -> Result<(), SchemaError> {
        match ty {
            PropertyType::Struct(descriptor) => match descriptor.serializer {
                StructSerializer::Native => {
                    let mut members: Vec<&PropertyDescriptor> = descriptor.members.iter().collect();
                    members.sort_by_key(|member| member.offset);
                    for member in members {
                        let dim = member.array_dim.max(1);
                        for index in 0..dim {
                            let member_name = if dim > 1 {
                                format!("{}.{}[{}]", name, member.name, index)
                            } else {
                                format!("{}.{}", name, member.name)
                            };
                            self.emit(&member.ty, member_name, parent_index, member.default.as_ref(), scope)?;
                        }
                    }
                    Ok(())
                }
                StructSerializer::Custom => self.push_leaf(FieldKind::Opaque, name, parent_index, default, scope),
                StructSerializer::CustomDelta => {
                    warn!(
                        "Schema {}: delta serialized struct {} is nested in {}; replicating it as opaque bytes",
                        self.name, descriptor.name, name
                    );
                    self.push_leaf(FieldKind::Opaque, name, parent_index, default, scope)
                }
            },
            PropertyType::Array(inner) => {
                let array_default = self.checked_default(FieldKind::DynamicArray, &name, default)?;
                let cmd_index = self.cmds.len();
                self.cmds.push(LeafField {
                    kind: FieldKind::DynamicArray,
                    name: name.clone(),
                    relative_handle: scope.next_handle(),
                    parent_index,
                    end_cmd: cmd_index + 1,
                    element_cmds: Vec::new(),
                    element_default: Vec::new(),
                });
                scope.push(cmd_index, array_default);

                let mut element = Scope::default();
                let element_name = format!("{}[]", name);
                self.emit(inner, element_name.clone(), parent_index, None, &mut element)?;

                let return_index = self.cmds.len();
                self.cmds.push(LeafField {
                    kind: FieldKind::Return,
                    name: element_name,
                    relative_handle: 0,
                    parent_index,
                    end_cmd: return_index + 1,
                    element_cmds: Vec::new(),
                    element_default: Vec::new(),
                });

                let end_cmd = self.cmds.len();
                if let Some(array) = self.cmds.get_mut(cmd_index) {
                    array.end_cmd = end_cmd;
                    array.element_cmds = element.cmds;
                    array.element_default = element.defaults;
                }
                Ok(())
            }
            PropertyType::Unknown(type_name) => {
                warn!(
                    "Schema {}: property {} has unrecognized type {}, falling back to generic serialization",
                    self.name, name, type_name
                );
                self.push_leaf(FieldKind::Generic, name, parent_index, default, scope)
            }
            leaf => self.push_leaf(leaf_kind(leaf), name, parent_index, default, scope),
        }
    }

    fn push_leaf(
        &mut self,
        kind: FieldKind,
        name: String,
        parent_index: usize,
        default: Option<&FieldValue>,
        scope: &mut Scope,
    ) -> Result<(), SchemaError> {
        let value = self.checked_default(kind, &name, default)?;
        let cmd_index = self.cmds.len();
        self.cmds.push(LeafField {
            kind,
            name,
            relative_handle: scope.next_handle(),
            parent_index,
            end_cmd: cmd_index + 1,
            element_cmds: Vec::new(),
            element_default: Vec::new(),
        });
        scope.push(cmd_index, value);
        Ok(())
    }

    fn checked_default(
        &self,
        kind: FieldKind,
        name: &str,
        default: Option<&FieldValue>,
    ) -> Result<FieldValue, SchemaError> {
        match default {
            None => Ok(kind.default_value()),
            Some(value) if kind.accepts(value) => Ok(value.clone()),
            Some(value) => Err(SchemaError::DefaultTypeMismatch {
                schema: self.name.clone(),
                property: name.to_string(),
                expected: format!("{:?}", kind),
                found: value.variant_name(),
            }),
        }
    }

    fn pair_roles(&mut self) -> Result<(), SchemaError> {
        let role = self.parents.iter().position(|parent| parent.name == ROLE);
        let remote_role = self.parents.iter().position(|parent| parent.name == REMOTE_ROLE);

        match (role, remote_role) {
            (None, None) => Ok(()),
            (Some(_), None) => Err(SchemaError::UnpairedRole {
                schema: self.name.clone(),
                present: ROLE,
                missing: REMOTE_ROLE,
            }),
            (None, Some(_)) => Err(SchemaError::UnpairedRole {
                schema: self.name.clone(),
                present: REMOTE_ROLE,
                missing: ROLE,
            }),
            (Some(role), Some(remote_role)) => {
                let role_fields = self.parents[role].cmd_end - self.parents[role].cmd_start;
                let remote_fields =
                    self.parents[remote_role].cmd_end - self.parents[remote_role].cmd_start;
                let same_kinds = self.cmds[self.parents[role].cmd_start..self.parents[role].cmd_end]
                    .iter()
                    .zip(&self.cmds[self.parents[remote_role].cmd_start..self.parents[remote_role].cmd_end])
                    .all(|(a, b)| a.kind == b.kind);
                if role_fields != remote_fields || !same_kinds {
                    return Err(SchemaError::RoleShapeMismatch {
                        schema: self.name.clone(),
                        role_fields,
                        remote_role_fields: remote_fields,
                    });
                }

                self.parents[role].role_swap_index = Some(remote_role);
                let remote = &mut self.parents[remote_role];
                remote.role_swap_index = Some(role);
                // compared per connection so the swapped value is always current
                remote.flags.conditional = true;
                remote.flags.lifetime = false;
                Ok(())
            }
        }
    }
}

fn leaf_kind(ty: &PropertyType) -> FieldKind {
    match ty {
        PropertyType::Bool => FieldKind::Bool,
        PropertyType::Byte => FieldKind::Byte,
        PropertyType::Int => FieldKind::Int,
        PropertyType::UInt32 => FieldKind::UInt32,
        PropertyType::UInt64 => FieldKind::UInt64,
        PropertyType::Float => FieldKind::Float,
        PropertyType::Name => FieldKind::Name,
        PropertyType::Object => FieldKind::Object,
        PropertyType::Vector => FieldKind::Vector,
        PropertyType::Vector100 => FieldKind::Vector100,
        PropertyType::Vector10 => FieldKind::Vector10,
        PropertyType::VectorQuantize => FieldKind::VectorQuantize,
        PropertyType::VectorNormal => FieldKind::VectorNormal,
        PropertyType::Plane => FieldKind::Plane,
        PropertyType::Rotator => FieldKind::Rotator,
        PropertyType::String => FieldKind::String,
        PropertyType::Struct(_) | PropertyType::Array(_) | PropertyType::Unknown(_) => {
            FieldKind::Generic
        }
    }
}
