use crate::replication::{condition::RepCondition, schema::state::FieldValue};

/// Declared type of a replicated property
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyType {
    Bool,
    Byte,
    Int,
    UInt32,
    UInt64,
    Float,
    Name,
    /// Reference to another replicated object
    Object,
    Vector,
    /// Vector rounded to two decimal places on the wire
    Vector100,
    /// Vector rounded to one decimal place on the wire
    Vector10,
    /// Vector rounded to whole units on the wire
    VectorQuantize,
    /// Unit vector, 16 bits per component
    VectorNormal,
    Plane,
    Rotator,
    String,
    Struct(StructDescriptor),
    Array(Box<PropertyType>),
    /// A type the schema has no encoding for; replicated as opaque bytes
    Unknown(String),
}

/// How a struct property reaches the wire
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StructSerializer {
    /// Member by member, each member its own handle
    #[default]
    Native,
    /// One opaque blob produced by the struct itself
    Custom,
    /// Delta serialized by an attached `NetDeltaSerialize`, outside the schema
    CustomDelta,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDescriptor {
    pub name: String,
    pub members: Vec<PropertyDescriptor>,
    pub serializer: StructSerializer,
}

impl StructDescriptor {
    pub fn new(name: &str, members: Vec<PropertyDescriptor>) -> Self {
        Self {
            name: name.to_string(),
            members,
            serializer: StructSerializer::Native,
        }
    }

    pub fn with_serializer(mut self, serializer: StructSerializer) -> Self {
        self.serializer = serializer;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RepNotifyPolicy {
    /// Notify only when the received value differs from the local one
    OnChanged,
    /// Notify whenever the property is received
    Always,
}

/// One replicated property as declared by its owner
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: PropertyType,
    /// Position within the owner. Struct members are flattened in offset order.
    pub offset: usize,
    /// Fixed element count of a static array, 1 otherwise
    pub array_dim: usize,
    pub condition: RepCondition,
    pub notify: Option<RepNotifyPolicy>,
    /// Value comes from configuration and is assumed known to the remote
    pub config: bool,
    pub default: Option<FieldValue>,
}

impl PropertyDescriptor {
    pub fn new(name: &str, ty: PropertyType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            offset: 0,
            array_dim: 1,
            condition: RepCondition::None,
            notify: None,
            config: false,
            default: None,
        }
    }

    pub fn at_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_array_dim(mut self, array_dim: usize) -> Self {
        self.array_dim = array_dim.max(1);
        self
    }

    pub fn with_condition(mut self, condition: RepCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_notify(mut self, policy: RepNotifyPolicy) -> Self {
        self.notify = Some(policy);
        self
    }

    pub fn from_config(mut self) -> Self {
        self.config = true;
        self
    }

    pub fn with_default(mut self, default: FieldValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// Replicated layout of an object class
#[derive(Clone, Debug, PartialEq)]
pub struct ClassDescriptor {
    pub name: String,
    pub properties: Vec<PropertyDescriptor>,
}

impl ClassDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }
}

/// Parameter list of a remote procedure call
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDescriptor {
    pub name: String,
    pub parameters: Vec<PropertyDescriptor>,
}

impl FunctionDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: PropertyDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }
}
