use crate::types::{NetId, ObjectKey};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Plane {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// Angles in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotator {
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }
}

/// A replicated reference to another object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    #[default]
    Null,
    Object(ObjectKey),
    /// Received an identity the local resolver does not know yet
    Unresolved(NetId),
}

impl ObjectRef {
    pub fn key(&self) -> Option<ObjectKey> {
        match self {
            ObjectRef::Object(key) => Some(*key),
            _ => None,
        }
    }
}

/// Value held by one slot of an object's replicated memory
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Byte(u8),
    Int(i32),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Name(String),
    String(String),
    Object(ObjectRef),
    Vector(Vec3),
    Plane(Plane),
    Rotator(Rotator),
    /// Payload of a custom-serialized struct or a generic property
    Bytes(Vec<u8>),
    /// Dynamic array, one slot list per element
    Array(Vec<Vec<FieldValue>>),
}

impl FieldValue {
    pub fn as_array(&self) -> Option<&Vec<Vec<FieldValue>>> {
        match self {
            FieldValue::Array(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Vec<FieldValue>>> {
        match self {
            FieldValue::Array(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            FieldValue::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Short name of the variant, for error reporting
    pub fn variant_name(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "Bool",
            FieldValue::Byte(_) => "Byte",
            FieldValue::Int(_) => "Int",
            FieldValue::UInt32(_) => "UInt32",
            FieldValue::UInt64(_) => "UInt64",
            FieldValue::Float(_) => "Float",
            FieldValue::Name(_) => "Name",
            FieldValue::String(_) => "String",
            FieldValue::Object(_) => "Object",
            FieldValue::Vector(_) => "Vector",
            FieldValue::Plane(_) => "Plane",
            FieldValue::Rotator(_) => "Rotator",
            FieldValue::Bytes(_) => "Bytes",
            FieldValue::Array(_) => "Array",
        }
    }
}

/// Replicated memory of one object. Each slot belongs to one handle of the
/// root scope; dynamic arrays nest one slot list per element.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectState {
    pub slots: Vec<FieldValue>,
}

impl ObjectState {
    pub fn new(slots: Vec<FieldValue>) -> Self {
        Self { slots }
    }

    /// Follows a location of alternating slot and element indices
    pub fn value_at(&self, path: &[usize]) -> Option<&FieldValue> {
        let (first, rest) = path.split_first()?;
        let mut value = self.slots.get(*first)?;
        let mut rest = rest;
        while let [element, slot, tail @ ..] = rest {
            value = value.as_array()?.get(*element)?.get(*slot)?;
            rest = tail;
        }
        Some(value)
    }

    pub fn value_at_mut(&mut self, path: &[usize]) -> Option<&mut FieldValue> {
        let (first, rest) = path.split_first()?;
        let mut value = self.slots.get_mut(*first)?;
        let mut rest = rest;
        while let [element, slot, tail @ ..] = rest {
            value = value.as_array_mut()?.get_mut(*element)?.get_mut(*slot)?;
            rest = tail;
        }
        Some(value)
    }
}
