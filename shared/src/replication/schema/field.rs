use replica_serde::{
    BitReader, BitWrite, Serde, SerdeErr, SignedInteger, SignedVariableInteger,
};

use crate::{
    connection::ReferenceResolver,
    replication::{
        condition::RepCondition,
        schema::{
            descriptor::RepNotifyPolicy,
            state::{FieldValue, ObjectRef, Plane, Rotator, Vec3},
        },
    },
    types::NetId,
};

/// Wire encoding of one leaf field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    Byte,
    Int,
    UInt32,
    UInt64,
    Float,
    Name,
    Object,
    Vector,
    Vector100,
    Vector10,
    VectorQuantize,
    VectorNormal,
    Plane,
    Rotator,
    String,
    /// Struct with its own binary serializer
    Opaque,
    /// Fallback for types without a dedicated encoding
    Generic,
    DynamicArray,
    /// Closes the element scope of the preceding dynamic array
    Return,
}

impl FieldKind {
    pub fn default_value(&self) -> FieldValue {
        match self {
            FieldKind::Bool => FieldValue::Bool(false),
            FieldKind::Byte => FieldValue::Byte(0),
            FieldKind::Int => FieldValue::Int(0),
            FieldKind::UInt32 => FieldValue::UInt32(0),
            FieldKind::UInt64 => FieldValue::UInt64(0),
            FieldKind::Float => FieldValue::Float(0.0),
            FieldKind::Name => FieldValue::Name(String::new()),
            FieldKind::String => FieldValue::String(String::new()),
            FieldKind::Object => FieldValue::Object(ObjectRef::Null),
            FieldKind::Vector
            | FieldKind::Vector100
            | FieldKind::Vector10
            | FieldKind::VectorQuantize
            | FieldKind::VectorNormal => FieldValue::Vector(Vec3::ZERO),
            FieldKind::Plane => FieldValue::Plane(Plane::default()),
            FieldKind::Rotator => FieldValue::Rotator(Rotator::default()),
            FieldKind::Opaque | FieldKind::Generic => FieldValue::Bytes(Vec::new()),
            FieldKind::DynamicArray | FieldKind::Return => FieldValue::Array(Vec::new()),
        }
    }

    /// Whether `value` is the variant this kind stores
    pub fn accepts(&self, value: &FieldValue) -> bool {
        std::mem::discriminant(&self.default_value()) == std::mem::discriminant(value)
    }

    /// Change detection. Exact comparison except for quantized vectors, which
    /// compare what would reach the wire.
    pub fn values_equal(&self, a: &FieldValue, b: &FieldValue) -> bool {
        if let Some(scale) = self.quantize_scale() {
            if let (FieldValue::Vector(a), FieldValue::Vector(b)) = (a, b) {
                return quantize_vector(a, scale) == quantize_vector(b, scale);
            }
        }
        if *self == FieldKind::VectorNormal {
            if let (FieldValue::Vector(a), FieldValue::Vector(b)) = (a, b) {
                return quantize_normal(a) == quantize_normal(b);
            }
        }
        a == b
    }

    fn quantize_scale(&self) -> Option<f32> {
        match self {
            FieldKind::Vector100 => Some(100.0),
            FieldKind::Vector10 => Some(10.0),
            FieldKind::VectorQuantize => Some(1.0),
            _ => None,
        }
    }

    /// Writes a leaf value. Returns `None` if the value is not of this kind,
    /// otherwise whether every object it references is known to the remote.
    pub fn write_value(
        &self,
        value: &FieldValue,
        writer: &mut dyn BitWrite,
        resolver: &mut dyn ReferenceResolver,
    ) -> Option<bool> {
        match (self, value) {
            (FieldKind::Bool, FieldValue::Bool(v)) => v.ser(writer),
            (FieldKind::Byte, FieldValue::Byte(v)) => v.ser(writer),
            (FieldKind::Int, FieldValue::Int(v)) => v.ser(writer),
            (FieldKind::UInt32, FieldValue::UInt32(v)) => v.ser(writer),
            (FieldKind::UInt64, FieldValue::UInt64(v)) => v.ser(writer),
            (FieldKind::Float, FieldValue::Float(v)) => v.ser(writer),
            (FieldKind::Name, FieldValue::Name(v)) | (FieldKind::String, FieldValue::String(v)) => {
                v.ser(writer)
            }
            (FieldKind::Object, FieldValue::Object(object)) => {
                return Some(write_object(object, writer, resolver));
            }
            (FieldKind::Vector, FieldValue::Vector(v)) => {
                v.x.ser(writer);
                v.y.ser(writer);
                v.z.ser(writer);
            }
            (FieldKind::Vector100 | FieldKind::Vector10 | FieldKind::VectorQuantize, FieldValue::Vector(v)) => {
                let scale = self.quantize_scale().unwrap_or(1.0);
                for component in quantize_vector(v, scale) {
                    SignedVariableInteger::<10>::new(component).ser(writer);
                }
            }
            (FieldKind::VectorNormal, FieldValue::Vector(v)) => {
                for component in quantize_normal(v) {
                    SignedInteger::<15>::new(component).ser(writer);
                }
            }
            (FieldKind::Plane, FieldValue::Plane(p)) => {
                p.x.ser(writer);
                p.y.ser(writer);
                p.z.ser(writer);
                p.w.ser(writer);
            }
            (FieldKind::Rotator, FieldValue::Rotator(r)) => {
                for axis in [r.pitch, r.yaw, r.roll] {
                    let compressed = compress_axis(axis);
                    writer.write_bit(compressed != 0);
                    if compressed != 0 {
                        compressed.ser(writer);
                    }
                }
            }
            (FieldKind::Opaque | FieldKind::Generic, FieldValue::Bytes(bytes)) => bytes.ser(writer),
            _ => return None,
        }
        Some(true)
    }

    pub fn read_value(
        &self,
        reader: &mut BitReader,
        resolver: &dyn ReferenceResolver,
    ) -> Result<FieldValue, SerdeErr> {
        Ok(match self {
            FieldKind::Bool => FieldValue::Bool(bool::de(reader)?),
            FieldKind::Byte => FieldValue::Byte(u8::de(reader)?),
            FieldKind::Int => FieldValue::Int(i32::de(reader)?),
            FieldKind::UInt32 => FieldValue::UInt32(u32::de(reader)?),
            FieldKind::UInt64 => FieldValue::UInt64(u64::de(reader)?),
            FieldKind::Float => FieldValue::Float(f32::de(reader)?),
            FieldKind::Name => FieldValue::Name(String::de(reader)?),
            FieldKind::String => FieldValue::String(String::de(reader)?),
            FieldKind::Object => {
                let object = match Option::<NetId>::de(reader)? {
                    None => ObjectRef::Null,
                    Some(net_id) => match resolver.object_for_identity(&net_id) {
                        Some(key) => ObjectRef::Object(key),
                        None => ObjectRef::Unresolved(net_id),
                    },
                };
                FieldValue::Object(object)
            }
            FieldKind::Vector => FieldValue::Vector(Vec3::new(
                f32::de(reader)?,
                f32::de(reader)?,
                f32::de(reader)?,
            )),
            FieldKind::Vector100 | FieldKind::Vector10 | FieldKind::VectorQuantize => {
                let scale = self.quantize_scale().unwrap_or(1.0);
                let mut components = [0.0f32; 3];
                for component in components.iter_mut() {
                    let quantized = SignedVariableInteger::<10>::de(reader)?.get();
                    *component = quantized as f32 / scale;
                }
                FieldValue::Vector(Vec3::new(components[0], components[1], components[2]))
            }
            FieldKind::VectorNormal => {
                let mut components = [0.0f32; 3];
                for component in components.iter_mut() {
                    let quantized = SignedInteger::<15>::de(reader)?.get();
                    *component = quantized as f32 / NORMAL_SCALE;
                }
                FieldValue::Vector(Vec3::new(components[0], components[1], components[2]))
            }
            FieldKind::Plane => FieldValue::Plane(Plane {
                x: f32::de(reader)?,
                y: f32::de(reader)?,
                z: f32::de(reader)?,
                w: f32::de(reader)?,
            }),
            FieldKind::Rotator => {
                let mut axes = [0.0f32; 3];
                for axis in axes.iter_mut() {
                    if reader.read_bit()? {
                        *axis = decompress_axis(u16::de(reader)?);
                    }
                }
                FieldValue::Rotator(Rotator::new(axes[0], axes[1], axes[2]))
            }
            FieldKind::Opaque | FieldKind::Generic => FieldValue::Bytes(Vec::<u8>::de(reader)?),
            FieldKind::DynamicArray | FieldKind::Return => FieldValue::Array(Vec::new()),
        })
    }
}

const NORMAL_SCALE: f32 = 32767.0;

fn quantize_vector(v: &Vec3, scale: f32) -> [i32; 3] {
    [v.x, v.y, v.z].map(|c| round_to_i32(c * scale))
}

fn quantize_normal(v: &Vec3) -> [i32; 3] {
    [v.x, v.y, v.z].map(|c| round_to_i32(c.clamp(-1.0, 1.0) * NORMAL_SCALE))
}

fn round_to_i32(value: f32) -> i32 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(-(1 << 30) as f32, (1 << 30) as f32) as i32
}

fn compress_axis(angle: f32) -> u16 {
    if !angle.is_finite() {
        return 0;
    }
    ((angle * 65536.0 / 360.0).round() as i64 & 0xFFFF) as u16
}

fn decompress_axis(compressed: u16) -> f32 {
    f32::from(compressed) * 360.0 / 65536.0
}

fn write_object(
    object: &ObjectRef,
    writer: &mut dyn BitWrite,
    resolver: &mut dyn ReferenceResolver,
) -> bool {
    match object {
        ObjectRef::Null => {
            None::<NetId>.ser(writer);
            true
        }
        ObjectRef::Object(key) => {
            let net_id = resolver.resolve_or_assign_identity(key);
            Some(net_id).ser(writer);
            resolver.is_fully_acknowledged(&net_id)
        }
        ObjectRef::Unresolved(net_id) => {
            Some(*net_id).ser(writer);
            false
        }
    }
}

/// One command of a flattened schema
#[derive(Clone, Debug, PartialEq)]
pub struct LeafField {
    pub kind: FieldKind,
    /// Dotted path from the top-level property, `[]` marking array elements
    pub name: String,
    /// 1-based position within the enclosing scope; 0 for `Return`
    pub relative_handle: u32,
    pub parent_index: usize,
    /// Index of the first command after this one's subtree
    pub end_cmd: usize,
    /// Element scope of a dynamic array: command index of each handle
    pub element_cmds: Vec<usize>,
    /// Slots of a freshly grown array element
    pub element_default: Vec<FieldValue>,
}

impl LeafField {
    /// Slot within the enclosing scope
    pub fn slot(&self) -> usize {
        self.relative_handle.saturating_sub(1) as usize
    }

    pub fn handles_per_element(&self) -> u32 {
        self.element_cmds.len() as u32
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ParentFlags {
    /// Compared for every connection without evaluating a condition
    pub lifetime: bool,
    pub conditional: bool,
    /// Replicated through an attached delta serializer, not the command list
    pub custom_delta: bool,
    /// Value is sourced from configuration
    pub config: bool,
}

/// One top-level replicated property
#[derive(Clone, Debug, PartialEq)]
pub struct ParentField {
    pub name: String,
    pub cmd_start: usize,
    pub cmd_end: usize,
    pub flags: ParentFlags,
    pub condition: RepCondition,
    pub notify: Option<RepNotifyPolicy>,
    /// Parent whose value this one is written into on receive
    pub role_swap_index: Option<usize>,
    /// Index within a static array
    pub array_index: usize,
}
