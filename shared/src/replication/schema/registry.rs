use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use log::info;

use crate::replication::schema::{
    descriptor::{ClassDescriptor, FunctionDescriptor, StructDescriptor},
    error::SchemaError,
    layout::PropertySchema,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SchemaKey {
    Class(String),
    Function(String),
    Struct(String),
}

impl SchemaKey {
    fn kind(&self) -> &'static str {
        match self {
            SchemaKey::Class(_) => "Class",
            SchemaKey::Function(_) => "Function",
            SchemaKey::Struct(_) => "Struct",
        }
    }

    fn name(&self) -> &str {
        match self {
            SchemaKey::Class(name) | SchemaKey::Function(name) | SchemaKey::Struct(name) => name,
        }
    }
}

enum Descriptor {
    Class(ClassDescriptor),
    Function(FunctionDescriptor),
    Struct(StructDescriptor),
}

/// Process-wide store of descriptors. Schemas are built on first use and
/// cached for the life of the registry.
pub struct SchemaRegistry {
    descriptors: RwLock<HashMap<SchemaKey, Descriptor>>,
    schemas: RwLock<HashMap<SchemaKey, Arc<PropertySchema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
            schemas: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_class(&self, class: ClassDescriptor) -> Result<(), SchemaError> {
        self.register(SchemaKey::Class(class.name.clone()), Descriptor::Class(class))
    }

    pub fn register_function(&self, function: FunctionDescriptor) -> Result<(), SchemaError> {
        self.register(
            SchemaKey::Function(function.name.clone()),
            Descriptor::Function(function),
        )
    }

    pub fn register_struct(&self, descriptor: StructDescriptor) -> Result<(), SchemaError> {
        self.register(
            SchemaKey::Struct(descriptor.name.clone()),
            Descriptor::Struct(descriptor),
        )
    }

    pub fn is_registered(&self, key: &SchemaKey) -> bool {
        self.descriptors
            .read()
            .map(|descriptors| descriptors.contains_key(key))
            .unwrap_or(false)
    }

    pub fn class_schema(&self, name: &str) -> Result<Arc<PropertySchema>, SchemaError> {
        self.schema(&SchemaKey::Class(name.to_string()))
    }

    pub fn function_schema(&self, name: &str) -> Result<Arc<PropertySchema>, SchemaError> {
        self.schema(&SchemaKey::Function(name.to_string()))
    }

    pub fn struct_schema(&self, name: &str) -> Result<Arc<PropertySchema>, SchemaError> {
        self.schema(&SchemaKey::Struct(name.to_string()))
    }

    /// Returns the cached schema for `key`, building it on first request
    pub fn schema(&self, key: &SchemaKey) -> Result<Arc<PropertySchema>, SchemaError> {
        {
            let schemas = self.schemas.read().map_err(|_| SchemaError::RegistryPoisoned)?;
            if let Some(schema) = schemas.get(key) {
                return Ok(schema.clone());
            }
        }

        let built = {
            let descriptors = self
                .descriptors
                .read()
                .map_err(|_| SchemaError::RegistryPoisoned)?;
            let descriptor = descriptors.get(key).ok_or_else(|| SchemaError::NotRegistered {
                kind: key.kind(),
                name: key.name().to_string(),
            })?;
            match descriptor {
                Descriptor::Class(class) => PropertySchema::from_class(class)?,
                Descriptor::Function(function) => PropertySchema::from_function(function)?,
                Descriptor::Struct(descriptor) => PropertySchema::from_struct(descriptor)?,
            }
        };

        let mut schemas = self.schemas.write().map_err(|_| SchemaError::RegistryPoisoned)?;
        let schema = schemas
            .entry(key.clone())
            .or_insert_with(|| {
                info!(
                    "SchemaRegistry: built {} {} with {} field(s)",
                    key.kind(),
                    key.name(),
                    built.cmds().len()
                );
                Arc::new(built)
            })
            .clone();
        Ok(schema)
    }

    fn register(&self, key: SchemaKey, descriptor: Descriptor) -> Result<(), SchemaError> {
        let mut descriptors = self
            .descriptors
            .write()
            .map_err(|_| SchemaError::RegistryPoisoned)?;
        if descriptors.contains_key(&key) {
            return Err(SchemaError::DuplicateRegistration {
                kind: key.kind(),
                name: key.name().to_string(),
            });
        }
        info!("SchemaRegistry: registering {} {}", key.kind(), key.name());
        descriptors.insert(key, descriptor);
        Ok(())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
