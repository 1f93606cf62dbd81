#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # dpv-pipeline
//!
//! Package validation: opens each resource's data, runs the resource passes
//! in parallel, then resolves foreign keys across the finished passes.
//!
//! A resource whose data cannot be read gets a result holding a single
//! stream error; the rest of the package is still validated. Descriptor
//! problems fail the whole call.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use dpv_pipeline::{PackageOptions, PackageReport, PackageValidator};
//!
//! # async fn run() -> dpv_pipeline::Result<()> {
//! let validator = PackageValidator::new()
//!     .with_options(PackageOptions::new().relations(true));
//!
//! let results = validator.validate_package("data/datapackage.json").await?;
//! let report = PackageReport::new(None, results);
//! for resource in report.results() {
//!     println!("{}", resource.summary());
//! }
//! # Ok(())
//! # }
//! ```

pub mod pipeline;
pub mod report;
pub mod source;

pub use pipeline::{BundleResults, PackageOptions, PackageValidator};
pub use report::{PackageReport, ResourceReport, all_valid, total_errors};
pub use source::DataSource;

use dpv_schema::DescriptorError;
use dpv_validation::StreamError;
use thiserror::Error;

/// Errors that fail a whole pipeline call
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("Unknown resource '{0}'")]
    UnknownResource(String),

    #[error("Bundle directory '{0}' does not exist")]
    MissingBundle(String),

    #[error("Validation task failed: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, Error>;
