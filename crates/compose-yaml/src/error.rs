//! Error types for tree construction.

use thiserror::Error;

/// Result type alias for compose-yaml operations.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors that can occur while parsing a compose document into a tree.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreeError {
    /// YAML syntax error from the underlying scanner.
    #[error("Parse error: {0}")]
    Scan(String),

    /// A document whose root is not a mapping.
    #[error("Top-level object must be a mapping")]
    TopLevelNotMapping,

    /// A mapping key that is not a string scalar.
    ///
    /// `location` is either `at top level` or `in <breadcrumb>`.
    #[error("Non-string key {location}: {key}")]
    NonStringKey { location: String, key: String },
}

impl From<yaml_rust2::ScanError> for TreeError {
    fn from(err: yaml_rust2::ScanError) -> Self {
        TreeError::Scan(err.to_string())
    }
}
