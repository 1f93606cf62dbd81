//! Package-level summaries over per-resource results

use crate::pipeline::BundleResults;
use dpv_validation::{ErrorKind, ValidationResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// True when every result is valid
pub fn all_valid(results: &[ValidationResult]) -> bool {
    results.iter().all(ValidationResult::is_valid)
}

/// Errors recorded across all results
pub fn total_errors(results: &[ValidationResult]) -> usize {
    results.iter().map(ValidationResult::error_count).sum()
}

/// One resource's result, tagged with its bundle file when it came from one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(flatten)]
    pub result: ValidationResult,
}

/// Outcome of a package or bundle run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    package: Option<String>,
    valid: bool,
    error_count: usize,
    resources: Vec<ResourceReport>,
}

impl PackageReport {
    pub fn new(package: Option<String>, results: Vec<ValidationResult>) -> Self {
        Self::from_reports(
            package,
            results
                .into_iter()
                .map(|result| ResourceReport { file: None, result })
                .collect(),
        )
    }

    /// Report over bundle results, keeping each file stem
    pub fn from_bundle(package: Option<String>, results: BundleResults) -> Self {
        Self::from_reports(
            package,
            results
                .into_iter()
                .map(|(file, result)| ResourceReport {
                    file: Some(file),
                    result,
                })
                .collect(),
        )
    }

    fn from_reports(package: Option<String>, resources: Vec<ResourceReport>) -> Self {
        let valid = resources.iter().all(|r| r.result.is_valid());
        let error_count = resources.iter().map(|r| r.result.error_count()).sum();
        Self {
            package,
            valid,
            error_count,
            resources,
        }
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn resources(&self) -> &[ResourceReport] {
        &self.resources
    }

    pub fn results(&self) -> impl Iterator<Item = &ValidationResult> {
        self.resources.iter().map(|r| &r.result)
    }

    /// Names of resources with at least one error
    pub fn invalid_resources(&self) -> Vec<&str> {
        self.results()
            .filter(|r| !r.is_valid())
            .map(ValidationResult::resource)
            .collect()
    }

    /// Error counts by kind across all resources
    pub fn counts_by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for result in self.results() {
            for (kind, count) in result.error_counts_by_kind() {
                *counts.entry(kind).or_insert(0) += count;
            }
        }
        counts
    }

    /// Process exit status: 0 when everything is valid, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        u8::from(!self.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpv_validation::ValidationError;

    fn invalid(resource: &str, kinds: &[ErrorKind]) -> ValidationResult {
        let mut result = ValidationResult::new(resource);
        for (i, kind) in kinds.iter().enumerate() {
            result.push(ValidationError::row_level(i + 1, *kind, "bad row"));
        }
        result
    }

    #[test]
    fn test_all_valid_and_totals() {
        let results = vec![ValidationResult::new("a"), ValidationResult::new("b")];
        assert!(all_valid(&results));
        assert_eq!(total_errors(&results), 0);

        let results = vec![
            ValidationResult::new("a"),
            invalid("b", &[ErrorKind::TypeMismatch, ErrorKind::DuplicateKey]),
        ];
        assert!(!all_valid(&results));
        assert_eq!(total_errors(&results), 2);
    }

    #[test]
    fn test_report_summary() {
        let report = PackageReport::new(
            Some("hsds".into()),
            vec![
                invalid("organization", &[ErrorKind::DuplicateKey]),
                ValidationResult::new("service"),
                invalid("program", &[ErrorKind::DuplicateKey, ErrorKind::TypeMismatch]),
            ],
        );

        assert!(!report.is_valid());
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.error_count(), 3);
        assert_eq!(report.invalid_resources(), vec!["organization", "program"]);
        assert_eq!(report.counts_by_kind()[&ErrorKind::DuplicateKey], 2);
    }

    #[test]
    fn test_empty_report_is_valid() {
        let report = PackageReport::new(None, Vec::new());
        assert!(report.is_valid());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_bundle_report_serializes_file() {
        let report = PackageReport::from_bundle(
            None,
            vec![("services".to_string(), invalid("service", &[ErrorKind::UnresolvedForeignKey]))],
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["resources"][0]["file"], "services");
        assert_eq!(json["resources"][0]["resource"], "service");
        assert_eq!(json["resources"][0]["errors"][0]["kind"], "UNRESOLVED_FOREIGN_KEY");
        assert!(json.get("package").is_none());
    }
}
