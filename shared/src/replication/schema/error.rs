use thiserror::Error;

/// Errors raised while building or registering property schemas
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Only one of the role / remote role pair was declared
    #[error("Schema {schema} declares `{present}` without `{missing}`")]
    UnpairedRole {
        schema: String,
        present: &'static str,
        missing: &'static str,
    },

    /// The role pair cannot be swapped because the two differ in shape
    #[error("Schema {schema} role properties differ in layout ({role_fields} vs {remote_role_fields} fields)")]
    RoleShapeMismatch {
        schema: String,
        role_fields: usize,
        remote_role_fields: usize,
    },

    /// A property declared a default of the wrong type
    #[error("Property {property} of {schema} has a {found} default for a {expected} field")]
    DefaultTypeMismatch {
        schema: String,
        property: String,
        expected: String,
        found: &'static str,
    },

    // Registry Errors

    /// A descriptor with this name was already registered
    #[error("{kind} {name} is already registered")]
    DuplicateRegistration { kind: &'static str, name: String },

    /// No descriptor is registered under this name
    #[error("{kind} {name} is not registered")]
    NotRegistered { kind: &'static str, name: String },

    /// A previous holder of the registry lock panicked
    #[error("Schema registry lock is poisoned")]
    RegistryPoisoned,
}
