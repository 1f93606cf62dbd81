//! Resource validation engine

use crate::keys::{KeyCaptures, PrimaryKeyIndex};
use crate::relations::ReferenceScan;
use crate::reporter::{ErrorKind, ValidationError, ValidationResult};
use crate::rules::{Cell, RowValidator};
use crate::{Result, StreamError};
use dpv_adapter_csv::{CsvConfig, CsvReader};
use dpv_schema::{BooleanTokens, ResourceSchema};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, trace};

/// Validation configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Tokens accepted for boolean fields without their own override
    pub booleans: BooleanTokens,
    /// Maximum errors kept per resource (0 = unlimited)
    pub max_errors: usize,
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_booleans(mut self, booleans: BooleanTokens) -> Self {
        self.booleans = booleans;
        self
    }

    #[must_use]
    pub fn max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }
}

/// Everything one resource pass produces
#[derive(Debug, Clone)]
pub struct ResourceOutcome {
    pub result: ValidationResult,
    /// Key tuples requested for the relation pass
    pub captures: KeyCaptures,
}

/// Validates whole resources: header, rows, and key uniqueness
#[derive(Debug, Clone, Default)]
pub struct ResourceValidator {
    config: ValidationConfig,
}

impl ResourceValidator {
    /// Create a new validator with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with specific configuration
    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate comma-separated data with a header row.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] when the input cannot be read or decoded.
    pub fn validate<R: Read>(&self, schema: &ResourceSchema, input: R) -> Result<ValidationResult> {
        self.validate_with(schema, &CsvConfig::default(), input, KeyCaptures::new())
            .map(|outcome| outcome.result)
    }

    /// Validate data in the given dialect, collecting the requested key tuples.
    ///
    /// Rows are decoded, checked, and dropped one at a time.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] when the input cannot be read or decoded;
    /// content problems never fail the call.
    pub fn validate_with<R: Read>(
        &self,
        schema: &ResourceSchema,
        csv: &CsvConfig,
        input: R,
        captures: KeyCaptures,
    ) -> Result<ResourceOutcome> {
        let decode = |source| StreamError::Decode {
            resource: schema.name().to_string(),
            source,
        };

        let mut records = CsvReader::new()
            .with_config(csv.clone())
            .records(input)
            .map_err(decode)?;
        let mut validation = self.start(schema, captures);

        match records.header().map_err(decode)? {
            Some(header) => validation.header(header),
            None if csv.has_header => validation.missing_header(),
            None => {}
        }

        for record in records {
            let record = record.map_err(decode)?;
            trace!(line = record.line, "Validating record");
            validation.row(&record.values);
        }

        Ok(validation.finish())
    }

    /// Read a resource again to find the later rows of repeated unresolved tuples.
    ///
    /// Rows are numbered as in the validating pass. Errors are in row order.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] when the input cannot be read or decoded.
    pub fn rescan<R: Read>(
        &self,
        schema: &ResourceSchema,
        csv: &CsvConfig,
        input: R,
        scans: &[ReferenceScan],
    ) -> Result<Vec<ValidationError>> {
        let decode = |source| StreamError::Decode {
            resource: schema.name().to_string(),
            source,
        };

        let mut records = CsvReader::new()
            .with_config(csv.clone())
            .records(input)
            .map_err(decode)?;
        records.header().map_err(decode)?;

        let rows = RowValidator::new(schema, &self.config.booleans);
        let mut errors = Vec::new();
        for (index, record) in records.enumerate() {
            let record = record.map_err(decode)?;
            let row = index + 1;
            let Some(cells) = rows.check_row(row, &record.values).cells else {
                continue;
            };
            for scan in scans {
                let found = key_tuple(scan.positions(), &cells, &record.values)
                    .and_then(|key| scan.check(row, &key));
                errors.extend(found);
            }
        }

        debug!(resource = schema.name(), found = errors.len(), "Rescanned resource");
        Ok(errors)
    }

    /// Validate rows that were already decoded
    pub fn validate_rows<I, S>(
        &self,
        schema: &ResourceSchema,
        header: Option<&[S]>,
        rows: I,
    ) -> ValidationResult
    where
        I: IntoIterator,
        I::Item: AsRef<[S]>,
        S: AsRef<str>,
    {
        let mut validation = self.start(schema, KeyCaptures::new());
        if let Some(header) = header {
            validation.header(header);
        }
        for row in rows {
            validation.row(row.as_ref());
        }
        validation.finish().result
    }

    /// Begin an incremental pass; feed it the header and rows as they arrive
    pub fn start<'a>(
        &'a self,
        schema: &'a ResourceSchema,
        mut captures: KeyCaptures,
    ) -> ResourceValidation<'a> {
        let primary = schema
            .has_primary_key()
            .then(|| PrimaryKeyIndex::new(schema.primary_key_positions().to_vec()));
        if primary.is_some() {
            captures.share_primary(schema.primary_key_positions());
        }

        // A single-field primary key already reports repeats as duplicate keys
        let unique = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| field.constraints.unique)
            .filter(|(position, _)| schema.primary_key_positions() != [*position])
            .map(|(position, _)| (position, HashMap::new()))
            .collect();

        debug!(resource = schema.name(), "Starting resource validation");
        ResourceValidation {
            schema,
            rows: RowValidator::new(schema, &self.config.booleans),
            result: ValidationResult::new(schema.name()).with_max_errors(self.config.max_errors),
            primary,
            unique,
            captures,
            next_row: 1,
        }
    }
}

/// State of one in-progress resource pass
pub struct ResourceValidation<'a> {
    schema: &'a ResourceSchema,
    rows: RowValidator<'a>,
    result: ValidationResult,
    primary: Option<PrimaryKeyIndex>,
    unique: Vec<(usize, HashMap<String, usize>)>,
    captures: KeyCaptures,
    next_row: usize,
}

impl ResourceValidation<'_> {
    /// Check the header row against the declared fields
    pub fn header<S: AsRef<str>>(&mut self, header: &[S]) {
        self.result.set_header_count(header.len());

        let expected = self.schema.field_count();
        if header.len() != expected {
            self.result.push(ValidationError::row_level(
                0,
                ErrorKind::HeaderMismatch,
                format!(
                    "Header has {} columns but the schema declares {expected} fields",
                    header.len()
                ),
            ));
            return;
        }

        for (position, (field, column)) in self.schema.fields().iter().zip(header).enumerate() {
            let column = column.as_ref();
            if column != field.name {
                self.result.push(ValidationError::field(
                    0,
                    &field.name,
                    ErrorKind::HeaderMismatch,
                    format!(
                        "Header column {} is '{column}', expected '{}'",
                        position + 1,
                        field.name
                    ),
                ));
            }
        }
    }

    /// Record that a header row was expected but the data was empty
    pub fn missing_header(&mut self) {
        if self.schema.field_count() > 0 {
            self.result.push(ValidationError::row_level(
                0,
                ErrorKind::HeaderMismatch,
                "Data has no header row",
            ));
        }
    }

    /// Check the next data row
    pub fn row<S: AsRef<str>>(&mut self, values: &[S]) {
        let row = self.next_row;
        self.next_row += 1;
        self.result.record_row();

        let check = self.rows.check_row(row, values);
        self.result.append_errors(check.errors);

        let Some(cells) = check.cells else {
            return;
        };
        let key_of = |positions: &[usize]| key_tuple(positions, &cells, values);

        for (position, seen) in &mut self.unique {
            let Some(text) = cells[*position].key_text(values[*position].as_ref()) else {
                continue;
            };
            if let Some(&first) = seen.get(&text) {
                let name = &self.schema.fields()[*position].name;
                self.result.push(
                    ValidationError::field(
                        row,
                        name,
                        ErrorKind::ConstraintViolation,
                        format!("Value '{text}' is not unique; first seen in row {first}"),
                    )
                    .with_related_row(first),
                );
            } else {
                seen.insert(text, row);
            }
        }

        if let Some(index) = &mut self.primary {
            if let Some(key) = key_of(index.positions()) {
                let shown = key.join(", ");
                if let Some(first) = index.insert(key, row) {
                    self.result.push(
                        ValidationError::row_level(
                            row,
                            ErrorKind::DuplicateKey,
                            format!(
                                "Duplicate primary key ({}) = ({shown}); first seen in row {first}",
                                self.schema.primary_key().join(", ")
                            ),
                        )
                        .with_related_row(first),
                    );
                }
            }
        }

        self.captures.record(row, key_of);
    }

    /// Rows seen so far
    pub fn row_count(&self) -> usize {
        self.result.row_count()
    }

    /// Close the pass
    pub fn finish(mut self) -> ResourceOutcome {
        if let Some(index) = self.primary.take() {
            self.captures.adopt_primary(index);
        }
        debug!(
            resource = self.schema.name(),
            rows = self.result.row_count(),
            errors = self.result.error_count(),
            "Finished resource validation"
        );
        ResourceOutcome {
            result: self.result,
            captures: self.captures,
        }
    }
}

/// Key tuple at `positions`, or `None` when any component is missing
fn key_tuple<S: AsRef<str>>(positions: &[usize], cells: &[Cell], values: &[S]) -> Option<Vec<String>> {
    positions
        .iter()
        .map(|&p| cells[p].key_text(values[p].as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpv_schema::{FieldType, SchemaField};

    fn people() -> ResourceSchema {
        ResourceSchema::new(
            "people",
            vec![
                SchemaField::new("id", FieldType::Integer),
                SchemaField::new("name", FieldType::String).required(),
            ],
            vec!["id".to_string()],
        )
        .unwrap()
    }

    fn validate(data: &str) -> ValidationResult {
        ResourceValidator::new().validate(&people(), data.as_bytes()).unwrap()
    }

    #[test]
    fn test_valid_resource() {
        let result = validate("id,name\n1,Alice\n2,Bob\n");
        assert!(result.is_valid());
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.header_count(), 2);
    }

    #[test]
    fn test_duplicate_key_references_first_row() {
        let result = validate("id,name\n1,Alice\n2,Bob\n1,Carol\n");
        let errors = result.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::DuplicateKey);
        assert_eq!(errors[0].row, 3);
        assert_eq!(errors[0].related_row, Some(1));
    }

    #[test]
    fn test_duplicate_key_uses_coerced_values() {
        let result = validate("id,name\n1,Alice\n01,Bob\n");
        assert_eq!(result.errors_of(ErrorKind::DuplicateKey).count(), 1);
    }

    #[test]
    fn test_header_count_mismatch_continues() {
        let result = validate("id\n1,Alice\n");
        assert_eq!(result.header_count(), 1);
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors()[0].kind, ErrorKind::HeaderMismatch);
        assert_eq!(result.errors()[0].row, 0);
    }

    #[test]
    fn test_header_name_mismatch_per_column() {
        let result = validate("id,nme\n1,Alice\n");
        assert_eq!(result.error_count(), 1);
        let error = &result.errors()[0];
        assert_eq!(error.kind, ErrorKind::HeaderMismatch);
        assert_eq!(error.field.as_deref(), Some("name"));
    }

    #[test]
    fn test_empty_data_is_missing_header() {
        let result = validate("");
        assert_eq!(result.row_count(), 0);
        assert_eq!(result.errors()[0].kind, ErrorKind::HeaderMismatch);
    }

    #[test]
    fn test_empty_key_component_is_not_indexed() {
        let result = validate("id,name\n,Alice\n,Bob\n");
        assert_eq!(result.errors_of(ErrorKind::MissingRequiredValue).count(), 2);
        assert_eq!(result.errors_of(ErrorKind::DuplicateKey).count(), 0);
    }

    #[test]
    fn test_unique_field_constraint() {
        let schema = ResourceSchema::new(
            "accounts",
            vec![
                SchemaField::new("id", FieldType::Integer),
                SchemaField::new("email", FieldType::String).unique(),
            ],
            vec!["id".to_string()],
        )
        .unwrap();
        let data = "id,email\n1,a@example.org\n2,\n3,\n4,a@example.org\n";
        let result = ResourceValidator::new().validate(&schema, data.as_bytes()).unwrap();

        assert_eq!(result.error_count(), 1);
        let error = &result.errors()[0];
        assert_eq!(error.kind, ErrorKind::ConstraintViolation);
        assert_eq!(error.row, 4);
        assert_eq!(error.related_row, Some(1));
    }

    #[test]
    fn test_unique_primary_key_field_reports_once() {
        let schema = ResourceSchema::new(
            "codes",
            vec![SchemaField::new("code", FieldType::String).unique()],
            vec!["code".to_string()],
        )
        .unwrap();
        let result = ResourceValidator::new()
            .validate(&schema, "code\nA\nA\n".as_bytes())
            .unwrap();
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors()[0].kind, ErrorKind::DuplicateKey);
    }

    #[test]
    fn test_max_errors_truncates() {
        let validator = ResourceValidator::with_config(ValidationConfig::new().max_errors(2));
        let data = "id,name\nx,\ny,\nz,\n";
        let result = validator.validate(&people(), data.as_bytes()).unwrap();
        assert_eq!(result.error_count(), 2);
        assert!(result.is_truncated());
        assert_eq!(result.row_count(), 3);
    }

    #[test]
    fn test_decode_failure_is_stream_error() {
        let data: &[u8] = b"id,name\n1,\xff\xfe\n";
        let err = ResourceValidator::new().validate(&people(), data).unwrap_err();
        assert!(matches!(err, StreamError::Decode { ref resource, .. } if resource == "people"));
    }

    #[test]
    fn test_validate_rows_from_decoded_values() {
        let header = ["id", "name"];
        let rows = vec![vec!["1", "Alice"], vec!["1", "Carol"]];
        let result = ResourceValidator::new().validate_rows(&people(), Some(&header[..]), rows);
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.errors()[0].kind, ErrorKind::DuplicateKey);
        assert_eq!(result.errors()[0].row, 2);
    }

    #[test]
    fn test_captures_collect_requested_keys() {
        let schema = ResourceSchema::new(
            "organization",
            vec![
                SchemaField::new("id", FieldType::String),
                SchemaField::new("parent_id", FieldType::String),
            ],
            vec!["id".to_string()],
        )
        .unwrap();
        let mut captures = KeyCaptures::new();
        captures.capture_target(vec![0]);
        captures.capture_source(vec![1]);

        let data = "id,parent_id\norg-1,\norg-2,org-1\norg-2,org-9\n";
        let outcome = ResourceValidator::new()
            .validate_with(&schema, &CsvConfig::default(), data.as_bytes(), captures)
            .unwrap();

        let target = outcome.captures.target(&[0]).unwrap();
        assert_eq!(target.len(), 2);
        assert_eq!(target.get(&["org-1".to_string()]), Some(1));
        assert_eq!(target.get(&["org-2".to_string()]), Some(2));
        assert_eq!(outcome.captures.source(&[1]).unwrap().len(), 2);
        assert_eq!(outcome.result.errors_of(ErrorKind::DuplicateKey).count(), 1);
    }

    #[test]
    fn test_rescan_finds_repeated_unresolved_rows() {
        use crate::relations::RelationPlan;
        use dpv_schema::{DescriptorFormat, parse_descriptor};

        let json = r#"{"resources": [
            {"name": "people", "path": "people.csv",
             "schema": {"fields": [{"name": "id", "type": "integer"}, {"name": "name"}], "primaryKey": "id"}},
            {"name": "pets", "path": "pets.csv",
             "schema": {"fields": [{"name": "name"}, {"name": "owner_id", "type": "integer"}],
                        "foreignKeys": [{"fields": "owner_id", "reference": {"resource": "people", "fields": "id"}}]}}
        ]}"#;
        let descriptor = parse_descriptor(json, DescriptorFormat::Json, None).unwrap();
        let plan = RelationPlan::build(&descriptor).unwrap();
        let pets = descriptor.resource("pets").unwrap().schema();
        let pet_data = "name,owner_id\nRex,7\nTom,1\nBo,07\nMia,\nKit,7\n";

        let validator = ResourceValidator::new();
        let csv = CsvConfig::default();
        let owners = validator
            .validate_with(&people(), &csv, "id,name\n1,Alice\n".as_bytes(), plan.captures_for("people"))
            .unwrap();
        let owned = validator
            .validate_with(pets, &csv, pet_data.as_bytes(), plan.captures_for("pets"))
            .unwrap();
        let captures = HashMap::from([
            ("people".to_string(), owners.captures),
            ("pets".to_string(), owned.captures),
        ]);

        let outcome = plan.validate(&captures);
        assert_eq!(outcome[0].errors.len(), 1);
        assert_eq!(outcome[0].errors[0].row, 1);

        let later = validator
            .rescan(pets, &csv, pet_data.as_bytes(), &outcome[0].rescans)
            .unwrap();
        let rows: Vec<_> = later.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![3, 5]);
    }
}
