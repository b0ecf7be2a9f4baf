//! # compose-yaml
//!
//! YAML parsing for compose files, producing string-keyed dynamic trees.
//!
//! This crate provides [`Value`], a loosely-typed tree (scalars, sequences,
//! string-keyed mappings) that the loader pipeline transforms, plus
//! [`TreePath`] for addressing and glob-matching locations inside a tree.
//!
//! ## Design
//!
//! Parsing uses yaml-rust2's event API rather than `YamlLoader` because the
//! pipeline needs three things the loader-level API discards:
//!
//! - document boundaries (compose files may be multi-document streams),
//! - scalar style (quoted scalars must stay strings: `"8080"` is not `8080`),
//! - tags (`!reset` and `!override` are recorded as path-addressed
//!   [`TagRecord`]s and replayed against the merged tree later).
//!
//! Mapping keys are canonicalized to strings during the build; any
//! non-string key is a fatal [`TreeError::NonStringKey`] carrying a
//! breadcrumb such as `services.web.environment`.
//!
//! ## Example
//!
//! ```rust
//! use compose_yaml::parse_documents;
//!
//! let docs = parse_documents("services:\n  web:\n    image: nginx\n").unwrap();
//! let web = docs[0].root.at_keys(&["services", "web"]).unwrap();
//! assert_eq!(web.get("image").and_then(|v| v.as_str()), Some("nginx"));
//! ```

mod error;
mod parser;
mod path;
mod value;

pub use error::{Result, TreeError};
pub use parser::{apply_tag_records, parse_documents, Document, TagKind, TagRecord};
pub use path::{PathSegment, TreePath};
pub use value::Value;
