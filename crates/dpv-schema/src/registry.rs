//! Registry of resource schemas by name

use crate::model::{PackageDescriptor, ResourceSchema};
use std::collections::HashMap;

/// Named resource schemas, for validating data outside of a full package
pub struct SchemaRegistry {
    schemas: HashMap<String, ResourceSchema>,
}

impl SchemaRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// Collect every resource schema declared in a package
    pub fn from_descriptor(descriptor: &PackageDescriptor) -> Self {
        let mut registry = Self::new();
        for resource in descriptor.resources() {
            registry.register(resource.schema().clone());
        }
        registry
    }

    /// Register a schema under its own name, replacing any previous one
    pub fn register(&mut self, schema: ResourceSchema) -> Option<ResourceSchema> {
        self.schemas.insert(schema.name().to_string(), schema)
    }

    /// Get a schema by name
    pub fn get(&self, name: &str) -> Option<&ResourceSchema> {
        self.schemas.get(name)
    }

    /// Check if a schema exists
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
