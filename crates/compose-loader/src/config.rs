//! Input description: which files make up the project, and the environment
//! used for interpolation.

use std::path::PathBuf;

use compose_yaml::Value;
use indexmap::IndexMap;

/// One compose file. At least one of `content` and `parsed` should be set;
/// when both are absent, the loader reads `filename` from disk.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub filename: String,
    pub content: Option<String>,
    pub parsed: Option<Value>,
}

impl ConfigFile {
    /// A file to be read from disk.
    pub fn from_file(filename: impl Into<String>) -> Self {
        ConfigFile {
            filename: filename.into(),
            content: None,
            parsed: None,
        }
    }

    /// A file whose content is already in memory.
    pub fn from_content(filename: impl Into<String>, content: impl Into<String>) -> Self {
        ConfigFile {
            filename: filename.into(),
            content: Some(content.into()),
            parsed: None,
        }
    }

    /// A file that was already parsed into a tree by the caller.
    pub fn from_parsed(filename: impl Into<String>, parsed: Value) -> Self {
        ConfigFile {
            filename: filename.into(),
            content: None,
            parsed: Some(parsed),
        }
    }
}

/// The full input to a load: working directory, ordered config files, and
/// the variable environment.
///
/// File order matters: later files override earlier ones during the merge.
#[derive(Debug, Clone, Default)]
pub struct ConfigDetails {
    pub working_dir: PathBuf,
    pub config_files: Vec<ConfigFile>,
    pub environment: IndexMap<String, String>,
}

impl ConfigDetails {
    pub fn new(working_dir: impl Into<PathBuf>, config_files: Vec<ConfigFile>) -> Self {
        ConfigDetails {
            working_dir: working_dir.into(),
            config_files,
            environment: IndexMap::new(),
        }
    }

    pub fn with_environment(mut self, environment: IndexMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// Variable lookup used by interpolation.
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.environment.get(name).cloned()
    }
}
