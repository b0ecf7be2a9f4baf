//! Error types for the loader pipeline.

use compose_yaml::{TreeError, TreePath};
use thiserror::Error;

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors surfaced by the loader pipeline.
///
/// Nothing is recovered locally (the project-name pre-pass swallows its own
/// failures on purpose, before any of these are constructed); on error the
/// caller gets no project model.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No files specified")]
    NoFiles,

    #[error("empty compose file")]
    EmptyFile,

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("IO error reading {filename}: {source}")]
    Io {
        filename: String,
        source: std::io::Error,
    },

    #[error("error while interpolating {path}: {message}")]
    Interpolation { path: TreePath, message: String },

    #[error("validating {filename}: {message}")]
    Validation { filename: String, message: String },

    #[error("{0}")]
    InvalidModel(String),

    /// Extends or include chains that revisit a node; the message already
    /// carries the formatted multi-line chain.
    #[error("{0}")]
    CircularReference(String),

    #[error("cannot extend service {service:?} in {filename}: service not found")]
    ExtendsServiceNotFound { service: String, filename: String },

    #[error("cannot read {path}")]
    UnresolvableFile { path: String },

    #[error("cannot override {path}")]
    CannotOverride { path: TreePath },

    #[error("project name must not be empty")]
    EmptyProjectName,

    #[error("invalid project name {name:?}: must consist only of lowercase alphanumeric characters, hyphens, and underscores as well as start with a letter or number")]
    InvalidProjectName { name: String },

    #[error("load cancelled")]
    Cancelled,
}
