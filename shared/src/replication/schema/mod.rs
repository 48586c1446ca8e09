mod builder;
mod descriptor;
mod error;
mod field;
mod layout;
mod registry;
mod state;

pub use descriptor::{
    ClassDescriptor, FunctionDescriptor, PropertyDescriptor, PropertyType, RepNotifyPolicy,
    StructDescriptor, StructSerializer,
};
pub use error::SchemaError;
pub use field::{FieldKind, LeafField, ParentField, ParentFlags};
pub use layout::PropertySchema;
pub use registry::{SchemaKey, SchemaRegistry};
pub use state::{FieldValue, ObjectRef, ObjectState, Plane, Rotator, Vec3};
