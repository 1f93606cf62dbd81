//! # dpv-schema
//!
//! Schema model, package descriptor loader, and locators for tabular data packages.
//!
//! A package descriptor declares named tabular resources, each pairing a data
//! location with a field-level schema, plus the foreign keys linking them:
//! descriptor → resources → schema fields / primary key → foreign keys.

pub mod loader;
pub mod locator;
pub mod model;
pub mod registry;
pub mod types;

pub use loader::{DescriptorFormat, PackageLoader, parse_descriptor, parse_schema};
pub use locator::Locator;
pub use model::{
    Constraints, Dialect, ForeignKeyRef, PackageDescriptor, Pattern, ResourceDefinition,
    ResourceSchema, SchemaField,
};
pub use registry::SchemaRegistry;
pub use types::{BooleanTokens, CastOptions, FieldType, TemporalFormat, Value};

use std::time::Duration;
use thiserror::Error;

/// Errors in a single resource's schema declaration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unknown type '{type_name}' for field '{field}'")]
    UnknownType { field: String, type_name: String },

    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    #[error("Key field '{0}' is not declared in the schema")]
    UnknownKeyField(String),

    #[error("Invalid constraint on field '{field}': {message}")]
    InvalidConstraint { field: String, message: String },
}

/// Errors that can occur when loading a package descriptor
#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("IO error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch '{url}': {message}")]
    Fetch { url: String, message: String },

    #[error("Fetching '{url}' timed out after {timeout:?}")]
    FetchTimeout { url: String, timeout: Duration },

    #[error("Invalid descriptor format: {0}")]
    InvalidFormat(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Schema error in resource '{resource}': {source}")]
    Schema {
        resource: String,
        #[source]
        source: SchemaError,
    },

    #[error("Duplicate resource name: {0}")]
    DuplicateResource(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Invalid foreign key on resource '{resource}': {message}")]
    InvalidForeignKey { resource: String, message: String },
}

impl DescriptorError {
    /// Wrap a schema error with the resource it was found in.
    pub fn schema(resource: impl Into<String>, source: SchemaError) -> Self {
        Self::Schema {
            resource: resource.into(),
            source,
        }
    }

    /// Whether the failure came from reaching the descriptor rather than its content.
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Fetch { .. } | Self::FetchTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DescriptorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_is_wrapped_with_resource_name() {
        let err = DescriptorError::schema("organization", SchemaError::UnknownKeyField("uid".into()));
        let text = err.to_string();
        assert!(text.contains("organization"));
        assert!(text.contains("uid"));
        assert!(!err.is_fetch());
    }

    #[test]
    fn timeout_counts_as_fetch_failure() {
        let err = DescriptorError::FetchTimeout {
            url: "http://example.org/datapackage.json".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(err.is_fetch());
    }
}
