#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # dpv-validation
//!
//! Row, resource, and relation validation for tabular data resources.
//!
//! Content problems (wrong types, missing values, duplicate keys, dangling
//! references) are collected into a [`ValidationResult`]; only a data source
//! that cannot be read fails a call, with a [`StreamError`].
//!
//! ## Example Usage
//!
//! ```rust
//! use dpv_schema::{FieldType, ResourceSchema, SchemaField};
//! use dpv_validation::{ErrorKind, ResourceValidator};
//!
//! let schema = ResourceSchema::new(
//!     "people",
//!     vec![
//!         SchemaField::new("id", FieldType::Integer).required(),
//!         SchemaField::new("name", FieldType::String).required(),
//!     ],
//!     vec!["id".to_string()],
//! )
//! .unwrap();
//!
//! let data = "id,name\n1,Alice\n1,Carol\n";
//! let result = ResourceValidator::new().validate(&schema, data.as_bytes()).unwrap();
//!
//! assert!(!result.is_valid());
//! assert_eq!(result.errors()[0].kind, ErrorKind::DuplicateKey);
//! assert_eq!(result.errors()[0].related_row, Some(1));
//! ```

pub mod engine;
pub mod keys;
pub mod relations;
pub mod reporter;
pub mod rules;

// Re-export main types
pub use engine::{ResourceOutcome, ResourceValidation, ResourceValidator, ValidationConfig};
pub use keys::{KeyCaptures, Occurrences, PrimaryKeyIndex, ReferenceIndex};
pub use relations::{ReferenceScan, RelationErrors, RelationPlan};
pub use reporter::{ErrorKind, ValidationError, ValidationResult};
pub use rules::{
    Cell, RowCheck, RowValidator, RuleResult, validate_enum, validate_length, validate_pattern,
    validate_range,
};

use dpv_adapter_csv::CsvError;
use dpv_schema::ResourceSchema;
use std::io::Read;
use thiserror::Error;

/// A resource's data could not be read to the end
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("Cannot open data of resource '{resource}' at '{location}': {message}")]
    Open {
        resource: String,
        location: String,
        message: String,
    },

    #[error("Cannot decode data of resource '{resource}': {source}")]
    Decode {
        resource: String,
        #[source]
        source: CsvError,
    },
}

impl StreamError {
    /// Resource whose data failed
    pub fn resource(&self) -> &str {
        match self {
            Self::Open { resource, .. } | Self::Decode { resource, .. } => resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

/// Convenience function to validate comma-separated data with default settings
///
/// # Errors
///
/// Returns a [`StreamError`] when the input cannot be read or decoded.
pub fn validate_resource<R: Read>(schema: &ResourceSchema, input: R) -> Result<ValidationResult> {
    ResourceValidator::new().validate(schema, input)
}
