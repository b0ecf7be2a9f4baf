//! # compose-loader
//!
//! The composition engine for multi-container app manifests: a set of
//! compose YAML files goes in, a single normalized, validated project
//! model comes out.
//!
//! ## Architecture
//!
//! Loading is a pipeline of tree transformers threaded through a shared
//! [`Options`] record:
//!
//! 1. **Per file**: parse (with tag metadata), interpolate `${…}` forms,
//!    validate the shape, inline `extends` bases, merge into the
//!    accumulator under path-matched rules.
//! 2. **Across files**: enforce unicity, canonicalize short forms, expand
//!    `include`, group `x-*` extensions, re-validate, resolve relative
//!    paths.
//! 3. **Post-model**: normalization, Windows path conversion, consistency
//!    checks, profile activation, and env-file resolution, each gated by
//!    its option.
//!
//! ## Example
//!
//! ```rust,no_run
//! use compose_loader::{load, ConfigDetails, ConfigFile, Options};
//!
//! let details = ConfigDetails::new(
//!     ".",
//!     vec![ConfigFile::from_file("compose.yml")],
//! );
//! let mut options = Options::new();
//! options.set_project_name("demo", true);
//!
//! let project = load(details, options)?;
//! for (name, _service) in project.services() {
//!     println!("{name}");
//! }
//! # Ok::<(), compose_loader::LoadError>(())
//! ```

mod config;
mod environment;
mod error;
mod extends;
mod extensions;
mod include;
mod interpolation;
mod loader;
mod merge;
mod model;
mod options;
mod paths;
mod ports;
mod schema;
mod template;
mod transform;
mod validate;

pub use config::{ConfigDetails, ConfigFile};
pub use error::{LoadError, Result};
pub use include::IncludeConfig;
pub use interpolation::{default_type_casts, CastKind, InterpolateOptions, LookupFn};
pub use loader::{load, load_with_context, normalize_project_name, COMPOSE_PROJECT_NAME};
pub use model::Project;
pub use options::{CancelToken, LoadContext, LocalResourceLoader, Options, ResourceLoader};
pub use template::{substitute, TemplateError};
