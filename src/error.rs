//! Error types for the entity store.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the exact failure and read the native storage code of a conflict.

use thiserror::Error;

use crate::storage::StorageError;
use crate::value::PropertyType;

/// Errors raised while building a schema or binding an entity to storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Entity schema must declare at least one property")]
    NoProperties,

    #[error("Property '{name}' is declared more than once")]
    DuplicateProperty {
        name: String,
    },

    #[error("Property name '{name}' is invalid (expected [A-Za-z][A-Za-z0-9_]*)")]
    InvalidPropertyName {
        name: String,
    },

    #[error("Key property '{name}' is not a declared property")]
    UnknownKeyProperty {
        name: String,
    },

    #[error("Key property '{name}' has type {property_type}, which cannot be used in a key")]
    UnkeyableProperty {
        name: String,
        property_type: PropertyType,
    },

    #[error("The {which} key is empty")]
    EmptyKey {
        which: &'static str,
    },

    #[error("Property '{name}' appears more than once in the {which} key")]
    DuplicateKeyProperty {
        name: String,
        which: &'static str,
    },

    #[error("Table name '{name}' is invalid (expected [a-z][a-z0-9_]*)")]
    InvalidTableName {
        name: String,
    },

    #[error("Service name cannot be empty")]
    EmptyServiceName,

    #[error("Entity is already bound to table '{table_name}'")]
    AlreadyBound {
        table_name: String,
    },

    #[error("Invalid entity descriptor: {reason}")]
    InvalidDescriptor {
        reason: String,
    },

    #[error("Invalid storage configuration: {reason}")]
    InvalidStorageConfig {
        reason: String,
    },
}

/// Errors raised when an entry does not match the entity schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required property '{property}' is missing")]
    MissingProperty {
        property: String,
    },

    #[error("Property '{property}' is not declared by the schema")]
    UnknownProperty {
        property: String,
    },

    #[error("Property '{property}' expects {expected}, got {actual}")]
    TypeMismatch {
        property: String,
        expected: PropertyType,
        actual: PropertyType,
    },

    #[error("Property '{property}' holds a non-finite number")]
    NonFiniteNumber {
        property: String,
    },

    #[error("Key property '{property}' cannot be changed by modify")]
    KeyChanged {
        property: String,
    },

    #[error("Stored value is not an object")]
    NotAnObject,

    #[error("Stored value for '{property}' is invalid: {reason}")]
    InvalidStoredValue {
        property: String,
        reason: String,
    },

    #[error("Unknown property type '{name}'")]
    UnknownPropertyType {
        name: String,
    },
}

/// Top-level error type for entity operations.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Entity is not bound to a table; call setup() first")]
    NotBound,

    #[error("Entity '{id}' already exists (code {code})")]
    AlreadyExists {
        id: String,
        code: String,
    },

    #[error("Entity '{id}' not found (code {code})")]
    NotFound {
        id: String,
        code: String,
    },

    #[error("Entity '{id}' was modified concurrently (code {code})")]
    Modified {
        id: String,
        code: String,
    },

    #[error("Storage unavailable (code {code}): {message}")]
    StoreUnavailable {
        message: String,
        code: String,
    },

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for EntityError {
    fn from(err: StorageError) -> Self {
        let code = err.code().to_string();
        match err {
            StorageError::UniqueViolation { id } => Self::AlreadyExists { id, code },
            StorageError::NotFound { id } => Self::NotFound { id, code },
            StorageError::EtagMismatch { id } => Self::Modified { id, code },
            StorageError::Unavailable(message) => Self::StoreUnavailable { message, code },
            other => Self::Storage(other),
        }
    }
}

impl EntityError {
    /// Returns the native storage code carried by this error, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::AlreadyExists { code, .. }
            | Self::NotFound { code, .. }
            | Self::Modified { code, .. }
            | Self::StoreUnavailable { code, .. } => Some(code),
            Self::Storage(e) => Some(e.code()),
            Self::Configuration(_) | Self::Validation(_) | Self::NotBound => None,
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the entity was used before `setup`.
    #[must_use]
    pub const fn is_not_bound(&self) -> bool {
        matches!(self, Self::NotBound)
    }

    /// Returns true if a create collided with an existing record.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true if the addressed record does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for optimistic-concurrency conflicts (existing id or stale etag).
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. } | Self::Modified { .. })
    }

    /// Returns true if retrying the same call could succeed.
    ///
    /// Conflicts are not retryable as-is; the caller must reload or overwrite.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

/// Result type alias for entity operations.
pub type EntityResult<T> = Result<T, EntityError>;
