//! Validation rules

use crate::reporter::{ErrorKind, ValidationError};
use dpv_schema::{BooleanTokens, Constraints, Pattern, ResourceSchema, SchemaField, Value};
use std::cmp::Ordering;

/// Validation rule result
#[derive(Debug, Clone)]
pub struct RuleResult {
    pub is_valid: bool,
    pub message: Option<String>,
}

impl RuleResult {
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: Some(message.into()),
        }
    }
}

/// Validate length constraints; length counts characters
#[must_use]
pub fn validate_length(value: &str, constraints: &Constraints) -> RuleResult {
    let len = value.chars().count();

    if let Some(min) = constraints.min_length {
        if len < min {
            return RuleResult::invalid(format!("Value length {len} is less than minimum {min}"));
        }
    }

    if let Some(max) = constraints.max_length {
        if len > max {
            return RuleResult::invalid(format!("Value length {len} exceeds maximum {max}"));
        }
    }

    RuleResult::valid()
}

/// Validate the whole value against an anchored pattern
#[must_use]
pub fn validate_pattern(value: &str, pattern: &Pattern) -> RuleResult {
    if pattern.is_match(value) {
        RuleResult::valid()
    } else {
        RuleResult::invalid(format!(
            "Value '{value}' does not match pattern '{}'",
            pattern.as_str()
        ))
    }
}

/// Validate inclusive minimum/maximum bounds
#[must_use]
pub fn validate_range(value: &Value, constraints: &Constraints) -> RuleResult {
    if let Some(min) = &constraints.minimum {
        if value.compare(min) == Some(Ordering::Less) {
            return RuleResult::invalid(format!("Value {value} is less than minimum {min}"));
        }
    }

    if let Some(max) = &constraints.maximum {
        if value.compare(max) == Some(Ordering::Greater) {
            return RuleResult::invalid(format!("Value {value} exceeds maximum {max}"));
        }
    }

    RuleResult::valid()
}

/// Validate membership in an allowed-value set
#[must_use]
pub fn validate_enum(value: &Value, allowed: &[Value]) -> RuleResult {
    if allowed
        .iter()
        .any(|candidate| value.compare(candidate) == Some(Ordering::Equal))
    {
        return RuleResult::valid();
    }

    let listed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
    RuleResult::invalid(format!(
        "Value '{value}' is not one of [{}]",
        listed.join(", ")
    ))
}

/// Outcome of checking one value against its field
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Empty or one of the schema's missing-value markers
    Missing,
    /// Coerced successfully (constraints may still have failed)
    Valid(Value),
    /// Could not be coerced to the field's type
    Invalid,
}

impl Cell {
    /// Text used for this cell in a key tuple; `None` when the cell is missing.
    ///
    /// Coerced values use their canonical form so `1` and `01` in an integer
    /// field are the same key.
    pub fn key_text(&self, raw: &str) -> Option<String> {
        match self {
            Self::Missing => None,
            Self::Valid(value) => Some(value.key_text()),
            Self::Invalid => Some(raw.to_string()),
        }
    }
}

/// Row-level check output: the errors plus per-field cells for key building.
#[derive(Debug, Clone)]
pub struct RowCheck {
    pub errors: Vec<ValidationError>,
    /// One cell per field; `None` when the row was not aligned with the schema
    pub cells: Option<Vec<Cell>>,
}

/// Validates single rows against a resource schema
#[derive(Debug, Clone, Copy)]
pub struct RowValidator<'a> {
    schema: &'a ResourceSchema,
    booleans: &'a BooleanTokens,
}

impl<'a> RowValidator<'a> {
    pub fn new(schema: &'a ResourceSchema, booleans: &'a BooleanTokens) -> Self {
        Self { schema, booleans }
    }

    /// Errors for one data row; `row` is its 1-based index
    pub fn validate_row<S: AsRef<str>>(&self, row: usize, values: &[S]) -> Vec<ValidationError> {
        self.check_row(row, values).errors
    }

    /// Check one data row, keeping the coerced cells
    pub fn check_row<S: AsRef<str>>(&self, row: usize, values: &[S]) -> RowCheck {
        let expected = self.schema.field_count();
        if values.len() != expected {
            let error = ValidationError::row_level(
                row,
                ErrorKind::ColumnCountMismatch,
                format!("Row has {} values but the schema declares {expected} fields", values.len()),
            );
            return RowCheck {
                errors: vec![error],
                cells: None,
            };
        }

        let mut errors = Vec::new();
        let cells = self
            .schema
            .fields()
            .iter()
            .zip(values)
            .map(|(field, raw)| self.check_value(row, field, raw.as_ref(), &mut errors))
            .collect();

        RowCheck {
            errors,
            cells: Some(cells),
        }
    }

    fn check_value(
        &self,
        row: usize,
        field: &SchemaField,
        raw: &str,
        errors: &mut Vec<ValidationError>,
    ) -> Cell {
        if self.schema.is_missing(raw) {
            if field.is_required() {
                errors.push(ValidationError::field(
                    row,
                    &field.name,
                    ErrorKind::MissingRequiredValue,
                    format!("Field '{}' is required", field.name),
                ));
            }
            return Cell::Missing;
        }

        let Some(value) = field.cast(raw, self.booleans) else {
            errors.push(ValidationError::field(
                row,
                &field.name,
                ErrorKind::TypeMismatch,
                format!("Value '{raw}' is not a valid {}", field.field_type),
            ));
            return Cell::Invalid;
        };

        let constraints = &field.constraints;
        let mut results = vec![validate_length(raw, constraints)];
        if let Some(pattern) = &constraints.pattern {
            results.push(validate_pattern(raw, pattern));
        }
        results.push(validate_range(&value, constraints));
        if let Some(allowed) = &constraints.enumeration {
            results.push(validate_enum(&value, allowed));
        }

        errors.extend(results.into_iter().filter_map(|r| r.message).map(|message| {
            ValidationError::field(row, &field.name, ErrorKind::ConstraintViolation, message)
        }));

        Cell::Valid(value)
    }
}
