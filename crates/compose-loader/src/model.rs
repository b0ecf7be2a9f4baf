//! The typed project model handed back to callers.
//!
//! The canonical tree is wrapped rather than decoded field-by-field into
//! structs: downstream orchestrators address the model through accessors,
//! and the tree is already normalized, validated, and path-resolved by the
//! time it gets here.

use std::path::PathBuf;

use compose_yaml::Value;
use indexmap::IndexMap;

use crate::error::{LoadError, Result};
use crate::include::IncludeConfig;

/// A fully loaded, normalized project.
#[derive(Debug, Clone)]
pub struct Project {
    /// Canonical project name (lowercase `[a-z0-9_-]`, starts
    /// alphanumeric).
    pub name: String,

    /// Directory all relative paths were resolved against.
    pub working_dir: PathBuf,

    /// The variable environment the project was loaded with.
    pub environment: IndexMap<String, String>,

    /// Files pulled in via `include`, keyed by the file that included
    /// them.
    pub include_references: IndexMap<String, Vec<IncludeConfig>>,

    model: Value,
}

impl Project {
    pub(crate) fn new(
        name: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        environment: IndexMap<String, String>,
        model: Value,
    ) -> Result<Self> {
        if !model.is_mapping() {
            return Err(LoadError::InvalidModel(
                "project model must be a mapping".to_string(),
            ));
        }
        Ok(Project {
            name: name.into(),
            working_dir: working_dir.into(),
            environment,
            include_references: IndexMap::new(),
            model,
        })
    }

    /// The canonical tree.
    pub fn model(&self) -> &Value {
        &self.model
    }

    /// Iterate services in declaration order.
    pub fn services(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.model
            .get("services")
            .and_then(Value::as_mapping)
            .into_iter()
            .flat_map(|services| services.iter().map(|(name, body)| (name.as_str(), body)))
    }

    pub fn service(&self, name: &str) -> Option<&Value> {
        self.model.at_keys(&["services", name])
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services().map(|(name, _)| name).collect()
    }

    pub(crate) fn services_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        self.model.get_mut("services").and_then(Value::as_mapping_mut)
    }

    /// Entries of a top-level resource section (`volumes`, `networks`,
    /// `secrets`, `configs`).
    pub fn resources(&self, section: &str) -> Option<&IndexMap<String, Value>> {
        self.model.get(section).and_then(Value::as_mapping)
    }

    pub fn has_resource(&self, section: &str, name: &str) -> bool {
        self.resources(section)
            .map(|entries| entries.contains_key(name))
            .unwrap_or(false)
    }
}
