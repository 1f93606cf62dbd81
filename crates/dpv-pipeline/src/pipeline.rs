//! Package orchestration
//!
//! One pass per resource, run in parallel on blocking tasks, followed by the
//! relation pass once every resource pass has finished.

use crate::source::{DataSource, SourceOpener};
use crate::{Error, Result};
use dpv_adapter_csv::CsvConfig;
use dpv_schema::loader::DEFAULT_FETCH_TIMEOUT;
use dpv_schema::{Locator, PackageDescriptor, PackageLoader, ResourceDefinition};
use dpv_validation::{
    KeyCaptures, ReferenceScan, RelationPlan, ResourceValidator, ValidationConfig, ValidationError,
    ValidationResult,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Bundle results: file stem to result, in declaration order
pub type BundleResults = Vec<(String, ValidationResult)>;

/// Options for a package run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageOptions {
    /// Resolve foreign keys after the resource passes
    pub relations: bool,
    /// Resources validated at once; `None` runs them all together
    pub max_parallel_resources: Option<usize>,
    /// Deadline for each remote fetch, in seconds
    #[serde(with = "secs")]
    pub fetch_timeout: Duration,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            relations: false,
            max_parallel_resources: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl PackageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn relations(mut self, relations: bool) -> Self {
        self.relations = relations;
        self
    }

    #[must_use]
    pub fn max_parallel_resources(mut self, limit: usize) -> Self {
        self.max_parallel_resources = Some(limit);
        self
    }

    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// One resource pass to run; the location can be read again by the relation pass
#[derive(Debug, Clone)]
struct Job {
    resource: ResourceDefinition,
    location: Locator,
}

/// Result of one resource pass, with its key tuples when the data was readable
type JobOutcome = (ValidationResult, Option<KeyCaptures>);

/// Validates whole packages, bundles, and single resources of a package
#[derive(Debug, Clone)]
pub struct PackageValidator {
    config: ValidationConfig,
    options: PackageOptions,
    client: reqwest::Client,
}

impl Default for PackageValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageValidator {
    /// Create a validator with default configuration and options
    pub fn new() -> Self {
        Self {
            config: ValidationConfig::default(),
            options: PackageOptions::default(),
            client: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ValidationConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: PackageOptions) -> Self {
        self.options = options;
        self
    }

    /// Share an HTTP client with other components
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn options(&self) -> &PackageOptions {
        &self.options
    }

    /// Load a package descriptor from a path or URL
    ///
    /// # Errors
    ///
    /// Returns [`Error::Descriptor`] when the descriptor cannot be fetched,
    /// parsed, or checked.
    pub async fn load_package(&self, locator: &str) -> Result<PackageDescriptor> {
        let loader = PackageLoader::with_client(self.client.clone(), self.options.fetch_timeout);
        Ok(loader.load(locator).await?)
    }

    /// Load a package and validate every resource in declaration order
    ///
    /// # Errors
    ///
    /// Fails only on descriptor-level problems; unreadable data is recorded
    /// in that resource's result.
    pub async fn validate_package(&self, locator: &str) -> Result<Vec<ValidationResult>> {
        let descriptor = self.load_package(locator).await?;
        self.validate_descriptor(&descriptor).await
    }

    /// Validate every resource of an already loaded package
    ///
    /// # Errors
    ///
    /// Returns [`Error::Descriptor`] when relations are requested and a
    /// foreign key references a resource the package does not declare.
    pub async fn validate_descriptor(
        &self,
        descriptor: &PackageDescriptor,
    ) -> Result<Vec<ValidationResult>> {
        // Contradictory relations fail before any data is read
        let plan = if self.options.relations {
            Some(RelationPlan::build(descriptor)?)
        } else {
            None
        };

        info!(
            package = descriptor.name().unwrap_or("<unnamed>"),
            resources = descriptor.resources().len(),
            relations = self.options.relations,
            "Validating package"
        );

        let jobs = descriptor
            .resources()
            .iter()
            .map(|resource| Job {
                resource: resource.clone(),
                location: resource.location().clone(),
            })
            .collect::<Vec<_>>();
        let outcomes = self.run(&jobs, plan.as_ref()).await?;
        self.resolve_relations(&jobs, outcomes, plan.as_ref()).await
    }

    /// Validate one data source against a named resource of a package
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownResource`] for a name the package does not
    /// declare and [`Error::Stream`] when the data cannot be read.
    pub async fn validate_resource(
        &self,
        descriptor: &PackageDescriptor,
        resource: &str,
        source: DataSource,
    ) -> Result<ValidationResult> {
        let definition = descriptor
            .resource(resource)
            .cloned()
            .ok_or_else(|| Error::UnknownResource(resource.to_string()))?;

        debug!(resource, source = %source.describe(), "Validating single resource");
        let reader = self.opener().open(resource, source).await?;
        let validator = ResourceValidator::with_config(self.config.clone());
        let outcome = tokio::task::spawn_blocking(move || {
            let csv = CsvConfig::from_dialect(definition.dialect());
            validator.validate_with(definition.schema(), &csv, reader, KeyCaptures::new())
        })
        .await
        .map_err(|e| Error::Runtime(e.to_string()))??;

        Ok(outcome.result)
    }

    /// Validate an extracted directory of data files against a package.
    ///
    /// Each resource is matched by the file name of its declared path;
    /// resources without a file are left out. Relations only consider the
    /// resources present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingBundle`] when `directory` is not a directory.
    pub async fn validate_bundle(
        &self,
        descriptor: &PackageDescriptor,
        directory: &Path,
    ) -> Result<BundleResults> {
        if !directory.is_dir() {
            return Err(Error::MissingBundle(directory.display().to_string()));
        }

        let mut present: Vec<(String, &ResourceDefinition, PathBuf)> = Vec::new();
        for resource in descriptor.resources() {
            let Some(file_name) = resource.location().file_name() else {
                continue;
            };
            let path = directory.join(&file_name);
            if !path.is_file() {
                debug!(resource = resource.name(), file = %file_name, "No data in bundle");
                continue;
            }
            let stem = Path::new(&file_name)
                .file_stem()
                .map_or_else(|| file_name.clone(), |s| s.to_string_lossy().into_owned());
            present.push((stem, resource, path));
        }

        info!(
            bundle = %directory.display(),
            files = present.len(),
            relations = self.options.relations,
            "Validating bundle"
        );

        let plan = self.options.relations.then(|| {
            let names: Vec<&str> = present.iter().map(|(_, resource, _)| resource.name()).collect();
            RelationPlan::build_partial(descriptor, &names)
        });

        let jobs = present
            .iter()
            .map(|(_, resource, path)| Job {
                resource: (*resource).clone(),
                location: Locator::Local(path.clone()),
            })
            .collect::<Vec<_>>();
        let outcomes = self.run(&jobs, plan.as_ref()).await?;
        let results = self.resolve_relations(&jobs, outcomes, plan.as_ref()).await?;

        Ok(present
            .into_iter()
            .map(|(stem, ..)| stem)
            .zip(results)
            .collect())
    }

    fn opener(&self) -> SourceOpener {
        SourceOpener::new(self.client.clone(), self.options.fetch_timeout)
    }

    /// Run every job, at most `max_parallel_resources` at once; outcomes keep job order
    async fn run(&self, jobs: &[Job], plan: Option<&RelationPlan>) -> Result<Vec<JobOutcome>> {
        let limit = self
            .options
            .max_parallel_resources
            .filter(|&n| n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let captures = plan
                .map(|plan| plan.captures_for(job.resource.name()))
                .unwrap_or_default();
            let validator = ResourceValidator::with_config(self.config.clone());
            let opener = self.opener();
            let limit = limit.clone();
            let job = job.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match limit {
                    Some(semaphore) => Some(
                        semaphore
                            .acquire_owned()
                            .await
                            .map_err(|e| Error::Runtime(e.to_string()))?,
                    ),
                    None => None,
                };
                run_job(&opener, validator, job, captures).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await.map_err(|e| Error::Runtime(e.to_string()))??);
        }
        Ok(outcomes)
    }

    /// Run the relation pass over finished resource passes and append its outcome.
    ///
    /// Dependent resources with repeated unresolved tuples are read once more
    /// to report every row. If that read fails, the first-row errors stand.
    async fn resolve_relations(
        &self,
        jobs: &[Job],
        outcomes: Vec<JobOutcome>,
        plan: Option<&RelationPlan>,
    ) -> Result<Vec<ValidationResult>> {
        let Some(plan) = plan.filter(|plan| !plan.is_empty()) else {
            return Ok(outcomes.into_iter().map(|(result, _)| result).collect());
        };

        let mut results = Vec::with_capacity(outcomes.len());
        let mut captures = HashMap::new();
        for (result, captured) in outcomes {
            if let Some(captured) = captured {
                captures.insert(result.resource().to_string(), captured);
            }
            results.push(result);
        }

        let mut unresolved = 0;
        for mut group in plan.validate(&captures) {
            if !group.rescans.is_empty() {
                if let Some(job) = jobs.iter().find(|job| job.resource.name() == group.resource) {
                    let later = self.rescan(job, group.rescans).await?;
                    group.errors.extend(later);
                    group.errors.sort_by_key(|e| e.row);
                }
            }
            unresolved += group.errors.len();

            if let Some(result) = results.iter_mut().find(|r| r.resource() == group.resource) {
                result.append_errors(group.errors);
                for note in group.skipped {
                    result.skip_relation(note);
                }
            }
        }

        info!(relations = plan.len(), unresolved, "Relation pass finished");
        Ok(results)
    }

    /// Read a dependent resource again for the later rows of repeated tuples
    async fn rescan(&self, job: &Job, scans: Vec<ReferenceScan>) -> Result<Vec<ValidationError>> {
        let name = job.resource.name().to_string();
        let pending: usize = scans.iter().map(ReferenceScan::pending_rows).sum();
        debug!(resource = %name, pending, "Reading resource again for repeated references");

        let pass = match self
            .opener()
            .open(&name, DataSource::Location(job.location.clone()))
            .await
        {
            Ok(reader) => {
                let validator = ResourceValidator::with_config(self.config.clone());
                let resource = job.resource.clone();
                tokio::task::spawn_blocking(move || {
                    let csv = CsvConfig::from_dialect(resource.dialect());
                    validator.rescan(resource.schema(), &csv, reader, &scans)
                })
                .await
                .map_err(|e| Error::Runtime(e.to_string()))?
            }
            Err(error) => Err(error),
        };

        Ok(pass.unwrap_or_else(|error| {
            warn!(resource = %name, %error, "Repeated references not located");
            Vec::new()
        }))
    }
}

async fn run_job(
    opener: &SourceOpener,
    validator: ResourceValidator,
    job: Job,
    captures: KeyCaptures,
) -> Result<JobOutcome> {
    let name = job.resource.name().to_string();
    let pass = match opener.open(&name, DataSource::Location(job.location)).await {
        Ok(reader) => {
            let resource = job.resource;
            tokio::task::spawn_blocking(move || {
                let csv = CsvConfig::from_dialect(resource.dialect());
                validator.validate_with(resource.schema(), &csv, reader, captures)
            })
            .await
            .map_err(|e| Error::Runtime(e.to_string()))?
        }
        Err(error) => Err(error),
    };

    Ok(match pass {
        Ok(outcome) => {
            info!(
                resource = %name,
                rows = outcome.result.row_count(),
                errors = outcome.result.error_count(),
                "Validated resource"
            );
            (outcome.result, Some(outcome.captures))
        }
        Err(error) => {
            warn!(resource = %name, %error, "Resource data could not be read");
            (ValidationResult::stream_failure(&name, &error), None)
        }
    })
}
