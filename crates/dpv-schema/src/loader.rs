//! Package descriptor loader

use crate::locator::Locator;
use crate::model::{Dialect, ForeignKeyRef, PackageDescriptor, ResourceDefinition, ResourceSchema, SchemaField};
use crate::types::{BooleanTokens, FieldType, TemporalFormat, Value};
use crate::{DescriptorError, Result, SchemaError};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Default deadline for fetching a remote descriptor
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Serialization format of a descriptor document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescriptorFormat {
    #[default]
    Json,
    Yaml,
}

impl DescriptorFormat {
    /// YAML for `.yaml`/`.yml`, JSON otherwise
    pub fn from_locator(locator: &Locator) -> Self {
        match locator.extension().as_deref() {
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// A single name or a list of names
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(name) => vec![name],
            Self::Many(names) => names,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageFile {
    #[serde(default)]
    name: Option<String>,
    resources: Vec<ResourceFile>,
    #[serde(default)]
    foreign_keys: Vec<ForeignKeyFile>,
}

#[derive(Debug, Deserialize)]
struct ResourceFile {
    name: String,
    #[serde(default)]
    path: Option<String>,
    schema: SchemaFile,
    #[serde(default)]
    dialect: Option<DialectFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaFile {
    fields: Vec<FieldFile>,
    #[serde(default)]
    primary_key: Option<OneOrMany>,
    #[serde(default)]
    foreign_keys: Vec<ForeignKeyFile>,
    #[serde(default)]
    missing_values: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldFile {
    name: String,
    #[serde(rename = "type", default = "default_type")]
    type_name: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    constraints: ConstraintsFile,
    #[serde(default)]
    true_values: Option<Vec<String>>,
    #[serde(default)]
    false_values: Option<Vec<String>>,
}

fn default_type() -> String {
    "string".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConstraintsFile {
    #[serde(default)]
    required: bool,
    #[serde(default)]
    unique: bool,
    #[serde(default)]
    min_length: Option<usize>,
    #[serde(default)]
    max_length: Option<usize>,
    #[serde(default)]
    minimum: Option<serde_json::Value>,
    #[serde(default)]
    maximum: Option<serde_json::Value>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default, rename = "enum")]
    enumeration: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ForeignKeyFile {
    /// Source resource; only used at the package level
    #[serde(default)]
    resource: Option<String>,
    fields: OneOrMany,
    reference: ReferenceFile,
}

#[derive(Debug, Deserialize)]
struct ReferenceFile {
    #[serde(default)]
    resource: String,
    fields: OneOrMany,
}

impl ForeignKeyFile {
    fn into_ref(self, source: &str) -> ForeignKeyRef {
        let target = if self.reference.resource.is_empty() {
            source.to_string()
        } else {
            self.reference.resource
        };
        ForeignKeyRef::new(
            source,
            self.fields.into_vec(),
            target,
            self.reference.fields.into_vec(),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DialectFile {
    #[serde(default)]
    delimiter: Option<String>,
    #[serde(default)]
    quote_char: Option<String>,
    #[serde(default)]
    double_quote: Option<bool>,
    #[serde(default)]
    escape_char: Option<String>,
    #[serde(default)]
    header: Option<bool>,
}

/// Loads package descriptors from local files or remote URLs
#[derive(Debug, Clone)]
pub struct PackageLoader {
    client: reqwest::Client,
    fetch_timeout: Duration,
}

impl PackageLoader {
    /// Create a loader with its own HTTP client and the default fetch deadline
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new(), DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a loader sharing an existing HTTP client
    pub fn with_client(client: reqwest::Client, fetch_timeout: Duration) -> Self {
        Self {
            client,
            fetch_timeout,
        }
    }

    /// Override the remote fetch deadline
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Load a descriptor from a path or URL
    ///
    /// # Errors
    ///
    /// Fails when the descriptor cannot be reached, parsed, or checked.
    pub async fn load(&self, locator: &str) -> Result<PackageDescriptor> {
        let locator = Locator::parse(locator)?;
        self.load_locator(&locator).await
    }

    /// Load a descriptor from a parsed locator
    ///
    /// # Errors
    ///
    /// Fails when the descriptor cannot be reached, parsed, or checked.
    pub async fn load_locator(&self, locator: &Locator) -> Result<PackageDescriptor> {
        info!(%locator, "Loading package descriptor");
        let text = self.fetch_text(locator).await?;
        let descriptor = parse_descriptor(&text, DescriptorFormat::from_locator(locator), Some(locator))?;
        debug!(
            resources = descriptor.resources().len(),
            foreign_keys = descriptor.foreign_keys().len(),
            "Loaded package descriptor"
        );
        Ok(descriptor)
    }

    async fn fetch_text(&self, locator: &Locator) -> Result<String> {
        match locator {
            Locator::Local(path) => {
                trace!("Reading descriptor file: {:?}", path);
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| DescriptorError::Io {
                        path: path.display().to_string(),
                        source,
                    })
            }
            Locator::Remote(url) => {
                trace!("Fetching remote descriptor: {}", url);
                let request = async {
                    let response = self.client.get(url.clone()).send().await?.error_for_status()?;
                    Ok::<_, reqwest::Error>(response.text().await?)
                };
                match tokio::time::timeout(self.fetch_timeout, request).await {
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(e)) => Err(DescriptorError::Fetch {
                        url: url.to_string(),
                        message: e.to_string(),
                    }),
                    Err(_) => Err(DescriptorError::FetchTimeout {
                        url: url.to_string(),
                        timeout: self.fetch_timeout,
                    }),
                }
            }
        }
    }
}

impl Default for PackageLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse descriptor text; relative data paths resolve against `base` when given.
///
/// # Errors
///
/// Fails on malformed structure, schema errors, or inconsistent foreign keys.
pub fn parse_descriptor(
    text: &str,
    format: DescriptorFormat,
    base: Option<&Locator>,
) -> Result<PackageDescriptor> {
    let file: PackageFile = match format {
        DescriptorFormat::Json => serde_json::from_str(text)
            .map_err(|e| DescriptorError::InvalidFormat(format!("JSON parse error: {e}")))?,
        DescriptorFormat::Yaml => serde_yaml::from_str(text)
            .map_err(|e| DescriptorError::InvalidFormat(format!("YAML parse error: {e}")))?,
    };
    convert_package(file, base)
}

/// Parse a standalone table schema (the `schema` object of a resource).
///
/// Foreign keys declared in a standalone schema are ignored.
///
/// # Errors
///
/// Fails on malformed structure or schema errors.
pub fn parse_schema(name: &str, text: &str, format: DescriptorFormat) -> Result<ResourceSchema> {
    let file: SchemaFile = match format {
        DescriptorFormat::Json => serde_json::from_str(text)
            .map_err(|e| DescriptorError::InvalidFormat(format!("JSON parse error: {e}")))?,
        DescriptorFormat::Yaml => serde_yaml::from_str(text)
            .map_err(|e| DescriptorError::InvalidFormat(format!("YAML parse error: {e}")))?,
    };
    convert_schema(name, file)
        .map(|(schema, _)| schema)
        .map_err(|e| DescriptorError::schema(name, e))
}

fn convert_package(file: PackageFile, base: Option<&Locator>) -> Result<PackageDescriptor> {
    let mut resources = Vec::with_capacity(file.resources.len());
    let mut foreign_keys = Vec::new();

    for resource in file.resources {
        let name = resource.name;
        let path = resource.path.ok_or_else(|| {
            DescriptorError::InvalidFormat(format!("Resource '{name}' has no data path"))
        })?;
        let location = match base {
            Some(base) => base.join(&path)?,
            None => Locator::parse(&path)?,
        };

        let (schema, schema_keys) =
            convert_schema(&name, resource.schema).map_err(|e| DescriptorError::schema(&name, e))?;
        foreign_keys.extend(schema_keys.into_iter().map(|fk| fk.into_ref(&name)));

        let dialect = match resource.dialect {
            Some(dialect) => convert_dialect(&name, dialect)?,
            None => Dialect::default(),
        };

        trace!(resource = %name, %location, "Declared resource");
        resources.push(ResourceDefinition::new(schema, location).with_dialect(dialect));
    }

    for foreign_key in file.foreign_keys {
        let source = foreign_key.resource.clone().ok_or_else(|| {
            DescriptorError::InvalidFormat(
                "Package-level foreign key must name its source 'resource'".to_string(),
            )
        })?;
        foreign_keys.push(foreign_key.into_ref(&source));
    }

    PackageDescriptor::new(file.name, resources, foreign_keys)
}

fn convert_schema(
    name: &str,
    file: SchemaFile,
) -> std::result::Result<(ResourceSchema, Vec<ForeignKeyFile>), SchemaError> {
    let fields = file
        .fields
        .into_iter()
        .map(convert_field)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let primary_key = file.primary_key.map(OneOrMany::into_vec).unwrap_or_default();

    let mut schema = ResourceSchema::new(name, fields, primary_key)?;
    if let Some(missing_values) = file.missing_values {
        schema = schema.with_missing_values(missing_values);
    }
    Ok((schema, file.foreign_keys))
}

fn convert_field(file: FieldFile) -> std::result::Result<SchemaField, SchemaError> {
    // `enum` and `pattern` name a string field carrying that constraint
    let field_type = match file.type_name.as_str() {
        "enum" | "pattern" => FieldType::String,
        other => FieldType::from_name(other).ok_or_else(|| SchemaError::UnknownType {
            field: file.name.clone(),
            type_name: other.to_string(),
        })?,
    };

    let mut field = SchemaField::new(file.name, field_type)
        .with_format(TemporalFormat::parse(file.format.as_deref()));

    if file.true_values.is_some() || file.false_values.is_some() {
        let defaults = BooleanTokens::default();
        field = field.with_boolean_tokens(BooleanTokens {
            true_values: file.true_values.unwrap_or(defaults.true_values),
            false_values: file.false_values.unwrap_or(defaults.false_values),
        });
    }

    let constraints = file.constraints;
    let invalid = |message: String| SchemaError::InvalidConstraint {
        field: field.name.clone(),
        message,
    };

    if let (Some(min), Some(max)) = (constraints.min_length, constraints.max_length) {
        if min > max {
            return Err(invalid(format!("minLength {min} exceeds maxLength {max}")));
        }
    }
    if file.type_name == "enum" && constraints.enumeration.is_none() {
        return Err(invalid("type 'enum' requires an 'enum' constraint".to_string()));
    }
    if file.type_name == "pattern" && constraints.pattern.is_none() {
        return Err(invalid("type 'pattern' requires a 'pattern' constraint".to_string()));
    }

    let minimum = constraints
        .minimum
        .map(|v| cast_bound(&field, "minimum", &v))
        .transpose()?;
    let maximum = constraints
        .maximum
        .map(|v| cast_bound(&field, "maximum", &v))
        .transpose()?;
    let enumeration = constraints
        .enumeration
        .map(|values| {
            values
                .iter()
                .map(|v| cast_bound(&field, "enum", v))
                .collect::<std::result::Result<Vec<_>, _>>()
        })
        .transpose()?;

    field.constraints.required = constraints.required;
    field.constraints.unique = constraints.unique;
    field.constraints.min_length = constraints.min_length;
    field.constraints.max_length = constraints.max_length;
    field.constraints.minimum = minimum;
    field.constraints.maximum = maximum;
    field.constraints.enumeration = enumeration;

    match constraints.pattern {
        Some(pattern) => field.with_pattern(&pattern),
        None => Ok(field),
    }
}

/// Cast a constraint operand with the field's own type
fn cast_bound(
    field: &SchemaField,
    constraint: &str,
    value: &serde_json::Value,
) -> std::result::Result<Value, SchemaError> {
    let raw = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => {
            return Err(SchemaError::InvalidConstraint {
                field: field.name.clone(),
                message: format!("{constraint} value {other} is not a scalar"),
            });
        }
    };

    field
        .cast(&raw, &BooleanTokens::default())
        .ok_or_else(|| SchemaError::InvalidConstraint {
            field: field.name.clone(),
            message: format!("{constraint} value '{raw}' is not a valid {}", field.field_type),
        })
}

fn convert_dialect(resource: &str, file: DialectFile) -> Result<Dialect> {
    let defaults = Dialect::default();
    Ok(Dialect {
        delimiter: single_char(resource, "delimiter", file.delimiter)?.unwrap_or(defaults.delimiter),
        quote_char: single_char(resource, "quoteChar", file.quote_char)?.unwrap_or(defaults.quote_char),
        double_quote: file.double_quote.unwrap_or(defaults.double_quote),
        escape_char: single_char(resource, "escapeChar", file.escape_char)?,
        header: file.header.unwrap_or(defaults.header),
    })
}

fn single_char(resource: &str, key: &str, value: Option<String>) -> Result<Option<char>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(Some(c)),
        _ => Err(DescriptorError::InvalidFormat(format!(
            "Resource '{resource}': dialect {key} must be a single ASCII character, got '{value}'"
        ))),
    }
}
