//! Validation errors and per-resource results

use crate::StreamError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of a content error found while validating a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Header row does not line up with the declared fields
    HeaderMismatch,
    /// Row has a different number of values than the schema has fields
    ColumnCountMismatch,
    /// Required field is empty
    MissingRequiredValue,
    /// Value cannot be read as the field's type
    TypeMismatch,
    /// Typed value breaks a declared constraint
    ConstraintViolation,
    /// Primary key tuple seen before in the same resource
    DuplicateKey,
    /// Foreign key tuple matches no row of the referenced resource
    UnresolvedForeignKey,
    /// The data source could not be read to the end
    StreamError,
}

impl ErrorKind {
    /// Stable machine-readable code
    pub fn code(self) -> &'static str {
        match self {
            Self::HeaderMismatch => "HEADER_MISMATCH",
            Self::ColumnCountMismatch => "COLUMN_COUNT_MISMATCH",
            Self::MissingRequiredValue => "MISSING_REQUIRED_VALUE",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::ConstraintViolation => "CONSTRAINT_VIOLATION",
            Self::DuplicateKey => "DUPLICATE_KEY",
            Self::UnresolvedForeignKey => "UNRESOLVED_FOREIGN_KEY",
            Self::StreamError => "STREAM_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One content error.
///
/// `row` is the 1-based data row, not counting the header; header and stream
/// errors use row 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
    /// Earlier row involved in the error (first occurrence of a duplicate)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_row: Option<usize>,
}

impl ValidationError {
    /// An error about the row as a whole
    pub fn row_level(row: usize, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            row,
            field: None,
            kind,
            message: message.into(),
            related_row: None,
        }
    }

    /// An error about one field of a row
    pub fn field(
        row: usize,
        field: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            row,
            field: Some(field.into()),
            kind,
            message: message.into(),
            related_row: None,
        }
    }

    #[must_use]
    pub fn with_related_row(mut self, row: usize) -> Self {
        self.related_row = Some(row);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.row)?;
        if let Some(field) = &self.field {
            write!(f, ", field '{field}'")?;
        }
        write!(f, ": [{}] {}", self.kind, self.message)
    }
}

/// Outcome of validating one resource.
///
/// Errors can only be added, never removed: `valid` is false exactly when at
/// least one error was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    resource: String,
    valid: bool,
    errors: Vec<ValidationError>,
    row_count: usize,
    header_count: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    truncated: bool,
    /// Relation checks that could not run; they do not affect validity
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped_relations: Vec<String>,
    #[serde(skip)]
    max_errors: usize,
}

impl ValidationResult {
    /// An empty, valid result
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            valid: true,
            errors: Vec::new(),
            row_count: 0,
            header_count: 0,
            truncated: false,
            skipped_relations: Vec::new(),
            max_errors: 0,
        }
    }

    /// Keep at most `max_errors` errors (0 = unlimited)
    #[must_use]
    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    /// The result for a resource whose data could not be read
    pub fn stream_failure(resource: impl Into<String>, error: &StreamError) -> Self {
        let mut result = Self::new(resource);
        result.push(ValidationError::row_level(
            0,
            ErrorKind::StreamError,
            error.to_string(),
        ));
        result
    }

    /// Record an error; beyond the cap it is dropped and the result marked truncated
    pub fn push(&mut self, error: ValidationError) {
        self.valid = false;
        if self.max_errors > 0 && self.errors.len() >= self.max_errors {
            self.truncated = true;
            return;
        }
        self.errors.push(error);
    }

    /// Append errors found after the resource pass (e.g. by the relation pass)
    pub fn append_errors(&mut self, errors: impl IntoIterator<Item = ValidationError>) {
        for error in errors {
            self.push(error);
        }
    }

    /// Note a relation check that was not run for this resource
    pub fn skip_relation(&mut self, note: impl Into<String>) {
        self.skipped_relations.push(note.into());
    }

    pub fn skipped_relations(&self) -> &[String] {
        &self.skipped_relations
    }

    /// Record the number of columns seen in the header row
    pub fn set_header_count(&mut self, header_count: usize) {
        self.header_count = header_count;
    }

    pub(crate) fn record_row(&mut self) {
        self.row_count += 1;
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Data rows processed, header excluded
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn header_count(&self) -> usize {
        self.header_count
    }

    /// Whether errors were dropped because of the error cap
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Errors of one kind, in recorded order
    pub fn errors_of(&self, kind: ErrorKind) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    /// Whether the data source failed
    pub fn is_stream_failure(&self) -> bool {
        self.errors_of(ErrorKind::StreamError).next().is_some()
    }

    pub fn error_counts_by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for error in &self.errors {
            *counts.entry(error.kind).or_insert(0) += 1;
        }
        counts
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        if self.valid {
            return format!("{}: valid ({} rows)", self.resource, self.row_count);
        }
        let more = if self.truncated { "+" } else { "" };
        format!(
            "{}: invalid, {}{more} errors in {} rows",
            self.resource,
            self.errors.len(),
            self.row_count
        )
    }
}
