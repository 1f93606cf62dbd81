//! # dpv-cli
//!
//! Command-line front end for validating data packages, single resources,
//! and extracted bundles.
//!
//! Exit status: 0 when every resource is valid, 1 when any resource has
//! errors, 2 when the call itself fails (bad descriptor, unreadable input).

mod config;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::CliConfig;
use dpv_pipeline::{DataSource, PackageReport};
use dpv_schema::Locator;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dpv")]
#[command(about = "Validate tabular data packages against their schemas")]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Deadline for each remote fetch, in seconds
    #[arg(long, global = true)]
    fetch_timeout: Option<f64>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every resource of a data package
    Package {
        /// Descriptor path or URL
        locator: String,

        /// Also check foreign keys across resources
        #[arg(long)]
        relations: bool,
    },

    /// Validate one data file against a resource of a package
    Resource {
        /// Data file path or URL
        data: String,

        /// Descriptor path or URL
        #[arg(short, long)]
        descriptor: String,

        /// Resource name in the descriptor
        #[arg(short, long)]
        resource: String,
    },

    /// Validate an extracted directory of data files
    Bundle {
        /// Directory holding the data files
        directory: PathBuf,

        /// Descriptor path or URL
        #[arg(short, long)]
        descriptor: String,

        /// Also check foreign keys between the files present
        #[arg(long)]
        relations: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(report) => ExitCode::from(report.exit_code()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<PackageReport> {
    let mut config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    if let Some(secs) = cli.fetch_timeout {
        config.package.fetch_timeout =
            Duration::try_from_secs_f64(secs).context("Invalid --fetch-timeout")?;
    }

    let report = match cli.command {
        Commands::Package { locator, relations } => {
            let validator = config.validator(relations);
            let descriptor = validator.load_package(&locator).await?;
            let results = validator.validate_descriptor(&descriptor).await?;
            PackageReport::new(descriptor.name().map(str::to_string), results)
        }
        Commands::Resource {
            data,
            descriptor,
            resource,
        } => {
            let validator = config.validator(false);
            let package = validator.load_package(&descriptor).await?;
            let source = DataSource::from(Locator::parse(&data)?);
            let result = validator
                .validate_resource(&package, &resource, source)
                .await
                .with_context(|| format!("Cannot validate '{data}' as resource '{resource}'"))?;
            PackageReport::new(package.name().map(str::to_string), vec![result])
        }
        Commands::Bundle {
            directory,
            descriptor,
            relations,
        } => {
            let validator = config.validator(relations);
            let package = validator.load_package(&descriptor).await?;
            let results = validator.validate_bundle(&package, &directory).await?;
            PackageReport::from_bundle(package.name().map(str::to_string), results)
        }
    };

    output::print(&report, cli.json)?;
    Ok(report)
}
