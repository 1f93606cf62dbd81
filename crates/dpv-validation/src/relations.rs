//! Foreign-key resolution across the resources of one package
//!
//! Resource passes collect distinct key tuples only. An unresolved tuple is
//! reported on the first row carrying it; when more rows carry it, a
//! [`ReferenceScan`] finds them by reading the dependent resource again.

use crate::keys::{KeyCaptures, Occurrences};
use crate::reporter::{ErrorKind, ValidationError};
use dpv_schema::{DescriptorError, ForeignKeyRef, PackageDescriptor};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A foreign key with its field names resolved to column positions
#[derive(Debug, Clone, PartialEq, Eq)]
struct RelationCheck {
    foreign_key: ForeignKeyRef,
    source_positions: Vec<usize>,
    target_positions: Vec<usize>,
}

/// Relation outcome for one dependent resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationErrors {
    pub resource: String,
    /// One error per unresolved tuple, on the first row carrying it
    pub errors: Vec<ValidationError>,
    /// Foreign keys of this resource that were not checked, with the reason
    pub skipped: Vec<String>,
    /// Unresolved tuples carried by more than one row
    pub rescans: Vec<ReferenceScan>,
}

impl RelationErrors {
    fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            errors: Vec::new(),
            skipped: Vec::new(),
            rescans: Vec::new(),
        }
    }
}

/// Unresolved tuples of one foreign key that appear on several rows.
///
/// Feed it every row of the dependent resource with [`Self::check`] to get
/// the errors for the rows after each tuple's first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceScan {
    foreign_key: ForeignKeyRef,
    positions: Vec<usize>,
    tuples: HashMap<Vec<String>, Occurrences>,
}

impl ReferenceScan {
    /// The dependent resource to read again
    pub fn resource(&self) -> &str {
        &self.foreign_key.source_resource
    }

    pub fn foreign_key(&self) -> &ForeignKeyRef {
        &self.foreign_key
    }

    /// Field positions forming the foreign key
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Rows still to be reported
    pub fn pending_rows(&self) -> usize {
        self.tuples.values().map(|seen| seen.rows - 1).sum()
    }

    /// Error for `row` when it repeats an unresolved tuple
    pub fn check(&self, row: usize, key: &[String]) -> Option<ValidationError> {
        let seen = self.tuples.get(key)?;
        (row != seen.first_row).then(|| unresolved(&self.foreign_key, row, key, *seen))
    }
}

/// The foreign keys to resolve in one package run, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationPlan {
    checks: Vec<RelationCheck>,
    /// Keys left out because their referenced resource has no data
    absent: Vec<ForeignKeyRef>,
}

impl RelationPlan {
    /// Plan every foreign key of the package.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::UnknownResource`] when a foreign key points
    /// at a resource the package does not declare.
    pub fn build(descriptor: &PackageDescriptor) -> Result<Self, DescriptorError> {
        let mut checks = Vec::with_capacity(descriptor.foreign_keys().len());
        for foreign_key in descriptor.foreign_keys() {
            if descriptor.resource(&foreign_key.target_resource).is_none() {
                return Err(DescriptorError::UnknownResource(format!(
                    "{} (referenced by {foreign_key})",
                    foreign_key.target_resource
                )));
            }
            checks.push(resolve(descriptor, foreign_key)?);
        }
        Ok(Self {
            checks,
            absent: Vec::new(),
        })
    }

    /// Plan only the foreign keys whose source and target are both in `present`.
    ///
    /// Keys leading out of the present set are skipped with a warning and
    /// noted on their source resource by [`Self::validate`].
    pub fn build_partial(descriptor: &PackageDescriptor, present: &[&str]) -> Self {
        let mut plan = Self::default();
        for fk in descriptor.foreign_keys() {
            if !present.contains(&fk.source_resource.as_str()) {
                continue;
            }
            if !present.contains(&fk.target_resource.as_str()) {
                warn!(foreign_key = %fk, "Skipping relation: referenced resource has no data");
                plan.absent.push(fk.clone());
                continue;
            }
            if let Ok(check) = resolve(descriptor, fk) {
                plan.checks.push(check);
            }
        }
        plan
    }

    /// True when there is nothing to check and nothing to note
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty() && self.absent.is_empty()
    }

    /// Foreign keys to check
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// The key tuples a resource's pass must collect for this plan
    pub fn captures_for(&self, resource: &str) -> KeyCaptures {
        let mut captures = KeyCaptures::new();
        for check in &self.checks {
            if check.foreign_key.target_resource == resource {
                captures.capture_target(check.target_positions.clone());
            }
            if check.foreign_key.source_resource == resource {
                captures.capture_source(check.source_positions.clone());
            }
        }
        captures
    }

    /// Resolve every planned foreign key against the collected tuples.
    ///
    /// A key whose source or target has no captures (its data could not be
    /// read) is skipped and noted. Outcomes are grouped by dependent resource
    /// in plan order; errors within a group are sorted by row.
    pub fn validate(&self, captures: &HashMap<String, KeyCaptures>) -> Vec<RelationErrors> {
        let mut grouped: Vec<RelationErrors> = Vec::new();
        let mut notes = Vec::new();
        let mut found = Vec::new();

        for fk in &self.absent {
            notes.push((
                fk.source_resource.clone(),
                format!("{fk} not checked: resource '{}' has no data", fk.target_resource),
            ));
        }

        for check in &self.checks {
            let fk = &check.foreign_key;
            let source = captures
                .get(&fk.source_resource)
                .and_then(|c| c.source(&check.source_positions));
            let target = captures
                .get(&fk.target_resource)
                .and_then(|c| c.target(&check.target_positions));
            let (Some(source), Some(target)) = (source, target) else {
                let unreadable = if source.is_none() {
                    &fk.source_resource
                } else {
                    &fk.target_resource
                };
                warn!(foreign_key = %fk, resource = %unreadable, "Skipping relation: key tuples unavailable");
                notes.push((
                    fk.source_resource.clone(),
                    format!("{fk} not checked: resource '{unreadable}' could not be read"),
                ));
                continue;
            };

            let missing: HashMap<Vec<String>, Occurrences> = source
                .iter()
                .filter(|(key, _)| !target.contains(key))
                .map(|(key, seen)| (key.to_vec(), seen))
                .collect();
            debug!(foreign_key = %fk, unresolved = missing.len(), "Resolved relation");
            if missing.is_empty() {
                continue;
            }

            let errors: Vec<ValidationError> = missing
                .iter()
                .map(|(key, seen)| unresolved(fk, seen.first_row, key, *seen))
                .collect();
            let tuples: HashMap<_, _> = missing
                .into_iter()
                .filter(|(_, seen)| seen.rows > 1)
                .collect();
            let rescan = (!tuples.is_empty()).then(|| ReferenceScan {
                foreign_key: fk.clone(),
                positions: check.source_positions.clone(),
                tuples,
            });
            found.push((fk.source_resource.clone(), errors, rescan));
        }

        for (resource, note) in notes {
            group_for(&mut grouped, &resource).skipped.push(note);
        }
        for (resource, errors, rescan) in found {
            let group = group_for(&mut grouped, &resource);
            group.errors.extend(errors);
            group.rescans.extend(rescan);
        }
        for outcome in &mut grouped {
            outcome.errors.sort_by_key(|e| e.row);
        }

        grouped
    }
}

fn group_for<'a>(grouped: &'a mut Vec<RelationErrors>, resource: &str) -> &'a mut RelationErrors {
    let index = match grouped.iter().position(|g| g.resource == resource) {
        Some(index) => index,
        None => {
            grouped.push(RelationErrors::new(resource));
            grouped.len() - 1
        }
    };
    &mut grouped[index]
}

/// `UnresolvedForeignKey` for one row carrying `key`
fn unresolved(fk: &ForeignKeyRef, row: usize, key: &[String], seen: Occurrences) -> ValidationError {
    let field = fk.source_fields.join(", ");
    let repeated = if seen.rows > 1 {
        format!("; {} rows carry it", seen.rows)
    } else {
        String::new()
    };
    let message = format!(
        "Value ({}) of ({field}) has no match in {}({}){repeated}",
        key.join(", "),
        fk.target_resource,
        fk.target_fields.join(", ")
    );
    ValidationError::field(row, field, ErrorKind::UnresolvedForeignKey, message)
}

fn resolve(
    descriptor: &PackageDescriptor,
    foreign_key: &ForeignKeyRef,
) -> Result<RelationCheck, DescriptorError> {
    let positions = |resource: &str, fields: &[String]| -> Result<Vec<usize>, DescriptorError> {
        let definition = descriptor
            .resource(resource)
            .ok_or_else(|| DescriptorError::UnknownResource(resource.to_string()))?;
        definition
            .schema()
            .positions(fields)
            .map_err(|e| DescriptorError::schema(resource, e))
    };

    Ok(RelationCheck {
        source_positions: positions(&foreign_key.source_resource, &foreign_key.source_fields)?,
        target_positions: positions(&foreign_key.target_resource, &foreign_key.target_fields)?,
        foreign_key: foreign_key.clone(),
    })
}
