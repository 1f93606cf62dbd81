//! Configuration file for the `dpv` binary

use anyhow::Context;
use dpv_pipeline::{PackageOptions, PackageValidator};
use dpv_validation::ValidationConfig;
use serde::Deserialize;
use std::path::Path;

/// Settings read from `--config`; every section is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub validation: ValidationConfig,
    pub package: PackageOptions,
}

impl CliConfig {
    /// Read a YAML (`.yaml`/`.yml`) or JSON configuration file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let config = if is_yaml {
            serde_yaml::from_str(&text)?
        } else {
            serde_json::from_str(&text)?
        };
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Build a validator; `relations` from the command line adds to the file setting
    pub fn validator(&self, relations: bool) -> PackageValidator {
        let options = self.package.clone().relations(self.package.relations || relations);
        PackageValidator::new()
            .with_config(self.validation.clone())
            .with_options(options)
    }
}
