//! Schema model definitions

use crate::locator::Locator;
use crate::types::{BooleanTokens, CastOptions, FieldType, TemporalFormat, Value};
use crate::{DescriptorError, Result, SchemaError};
use regex::Regex;
use std::collections::HashSet;

/// A compiled value pattern, anchored to the whole value
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern; `source` is matched against the entire value
    pub fn new(source: impl Into<String>) -> std::result::Result<Self, regex::Error> {
        let source = source.into();
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self { source, regex })
    }

    /// The pattern as declared
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Constraints declared on a field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub required: bool,
    pub unique: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<Value>,
    pub maximum: Option<Value>,
    pub pattern: Option<Pattern>,
    pub enumeration: Option<Vec<Value>>,
}

/// Definition of a single field (column)
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub format: TemporalFormat,
    pub constraints: Constraints,
    /// Field-level override of the configured boolean tokens
    pub booleans: Option<BooleanTokens>,
}

impl SchemaField {
    /// Create an unconstrained optional field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            format: TemporalFormat::Default,
            constraints: Constraints::default(),
            booleans: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.constraints.required = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.constraints.unique = true;
        self
    }

    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        self.constraints.min_length = Some(len);
        self
    }

    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.constraints.max_length = Some(len);
        self
    }

    #[must_use]
    pub fn minimum(mut self, value: Value) -> Self {
        self.constraints.minimum = Some(value);
        self
    }

    #[must_use]
    pub fn maximum(mut self, value: Value) -> Self {
        self.constraints.maximum = Some(value);
        self
    }

    #[must_use]
    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.constraints.enumeration = Some(values);
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TemporalFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_boolean_tokens(mut self, booleans: BooleanTokens) -> Self {
        self.booleans = Some(booleans);
        self
    }

    /// Attach a pattern constraint
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidConstraint`] when the pattern does not compile.
    pub fn with_pattern(mut self, pattern: &str) -> std::result::Result<Self, SchemaError> {
        let compiled = Pattern::new(pattern).map_err(|e| SchemaError::InvalidConstraint {
            field: self.name.clone(),
            message: format!("invalid pattern '{pattern}': {e}"),
        })?;
        self.constraints.pattern = Some(compiled);
        Ok(self)
    }

    pub fn is_required(&self) -> bool {
        self.constraints.required
    }

    /// Coerce a non-empty raw value using this field's type and format
    pub fn cast(&self, raw: &str, default_booleans: &BooleanTokens) -> Option<Value> {
        let options = CastOptions {
            format: &self.format,
            booleans: self.booleans.as_ref().unwrap_or(default_booleans),
        };
        self.field_type.cast(raw, &options)
    }
}

/// The schema of one tabular resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    name: String,
    fields: Vec<SchemaField>,
    primary_key: Vec<String>,
    primary_key_positions: Vec<usize>,
    missing_values: Vec<String>,
}

impl ResourceSchema {
    /// Build a schema, checking field names and the primary key.
    ///
    /// Primary-key fields are marked required.
    ///
    /// # Errors
    ///
    /// Fails on duplicate field names or a primary-key name with no matching field.
    pub fn new(
        name: impl Into<String>,
        mut fields: Vec<SchemaField>,
        primary_key: Vec<String>,
    ) -> std::result::Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }

        let primary_key_positions = positions_in(&fields, &primary_key)?;
        for &position in &primary_key_positions {
            fields[position].constraints.required = true;
        }

        Ok(Self {
            name: name.into(),
            fields,
            primary_key,
            primary_key_positions,
            missing_values: vec![String::new()],
        })
    }

    /// Replace the raw values treated as empty (default: the empty string)
    #[must_use]
    pub fn with_missing_values(mut self, missing_values: Vec<String>) -> Self {
        self.missing_values = missing_values;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn primary_key_positions(&self) -> &[usize] {
        &self.primary_key_positions
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn missing_values(&self) -> &[String] {
        &self.missing_values
    }

    /// Whether a raw value counts as empty
    pub fn is_missing(&self, raw: &str) -> bool {
        self.missing_values.iter().any(|m| m == raw)
    }

    /// Column positions of the named fields, in the given order
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownKeyField`] for a name that is not declared.
    pub fn positions(&self, names: &[String]) -> std::result::Result<Vec<usize>, SchemaError> {
        positions_in(&self.fields, names)
    }
}

fn positions_in(
    fields: &[SchemaField],
    names: &[String],
) -> std::result::Result<Vec<usize>, SchemaError> {
    names
        .iter()
        .map(|name| {
            fields
                .iter()
                .position(|f| &f.name == name)
                .ok_or_else(|| SchemaError::UnknownKeyField(name.clone()))
        })
        .collect()
}

/// A foreign key from a dependent resource to a referenced resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub source_resource: String,
    pub source_fields: Vec<String>,
    pub target_resource: String,
    pub target_fields: Vec<String>,
}

impl ForeignKeyRef {
    pub fn new(
        source_resource: impl Into<String>,
        source_fields: Vec<String>,
        target_resource: impl Into<String>,
        target_fields: Vec<String>,
    ) -> Self {
        Self {
            source_resource: source_resource.into(),
            source_fields,
            target_resource: target_resource.into(),
            target_fields,
        }
    }

    pub fn is_self_reference(&self) -> bool {
        self.source_resource == self.target_resource
    }
}

impl std::fmt::Display for ForeignKeyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({}) -> {}({})",
            self.source_resource,
            self.source_fields.join(", "),
            self.target_resource,
            self.target_fields.join(", ")
        )
    }
}

/// CSV dialect declared for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: char,
    pub quote_char: char,
    pub double_quote: bool,
    pub escape_char: Option<char>,
    pub header: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote_char: '"',
            double_quote: true,
            escape_char: None,
            header: true,
        }
    }
}

/// A resource declared in a package: schema plus data location
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDefinition {
    schema: ResourceSchema,
    location: Locator,
    dialect: Dialect,
}

impl ResourceDefinition {
    pub fn new(schema: ResourceSchema, location: Locator) -> Self {
        Self {
            schema,
            location,
            dialect: Dialect::default(),
        }
    }

    #[must_use]
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn location(&self) -> &Locator {
        &self.location
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }
}

/// A loaded package descriptor: resources in declaration order plus a flat foreign-key list
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    name: Option<String>,
    resources: Vec<ResourceDefinition>,
    foreign_keys: Vec<ForeignKeyRef>,
}

impl PackageDescriptor {
    /// Assemble a descriptor, checking resource names and foreign keys.
    ///
    /// A foreign key whose target resource is absent is accepted here and
    /// rejected when relations are checked.
    ///
    /// # Errors
    ///
    /// Fails on duplicate resource names, a foreign key from an undeclared
    /// resource, unknown key fields, or mismatched key arity.
    pub fn new(
        name: Option<String>,
        resources: Vec<ResourceDefinition>,
        foreign_keys: Vec<ForeignKeyRef>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for resource in &resources {
            if !seen.insert(resource.name()) {
                return Err(DescriptorError::DuplicateResource(resource.name().to_string()));
            }
        }

        for foreign_key in &foreign_keys {
            check_foreign_key(&resources, foreign_key)?;
        }

        Ok(Self {
            name,
            resources,
            foreign_keys,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn resources(&self) -> &[ResourceDefinition] {
        &self.resources
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceDefinition> {
        self.resources.iter().find(|r| r.name() == name)
    }

    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(ResourceDefinition::name).collect()
    }

    pub fn foreign_keys(&self) -> &[ForeignKeyRef] {
        &self.foreign_keys
    }

    /// Foreign keys declared on a dependent resource
    pub fn foreign_keys_from<'a>(&'a self, resource: &'a str) -> impl Iterator<Item = &'a ForeignKeyRef> {
        self.foreign_keys
            .iter()
            .filter(move |fk| fk.source_resource == resource)
    }
}

fn check_foreign_key(resources: &[ResourceDefinition], foreign_key: &ForeignKeyRef) -> Result<()> {
    let find = |name: &str| resources.iter().find(|r| r.name() == name);
    let invalid = |message: String| DescriptorError::InvalidForeignKey {
        resource: foreign_key.source_resource.clone(),
        message,
    };

    let source = find(&foreign_key.source_resource)
        .ok_or_else(|| DescriptorError::UnknownResource(foreign_key.source_resource.clone()))?;

    if foreign_key.source_fields.is_empty() {
        return Err(invalid(format!("{foreign_key} declares no fields")));
    }
    if foreign_key.source_fields.len() != foreign_key.target_fields.len() {
        return Err(invalid(format!(
            "{foreign_key} maps {} fields onto {}",
            foreign_key.source_fields.len(),
            foreign_key.target_fields.len()
        )));
    }

    source
        .schema()
        .positions(&foreign_key.source_fields)
        .map_err(|e| DescriptorError::schema(source.name(), e))?;

    if let Some(target) = find(&foreign_key.target_resource) {
        target
            .schema()
            .positions(&foreign_key.target_fields)
            .map_err(|e| DescriptorError::schema(target.name(), e))?;

        let key_len = target.schema().primary_key().len();
        if target.schema().has_primary_key() && key_len != foreign_key.target_fields.len() {
            return Err(invalid(format!(
                "{foreign_key} references {} fields but the primary key of '{}' has {key_len}",
                foreign_key.target_fields.len(),
                target.name()
            )));
        }
    }

    Ok(())
}
