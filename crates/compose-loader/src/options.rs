//! Loader configuration and the resource-loading seam.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{LoadError, Result};
use crate::interpolation::InterpolateOptions;

/// Cooperative cancellation for long-running resource loads.
///
/// The engine itself is synchronous; the only stage that may block is a
/// [`ResourceLoader`], so that is where the token is checked.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-invocation context threaded through the pipeline stages: the file
/// currently being processed (for error messages) and the cancellation
/// token.
#[derive(Debug, Clone)]
pub struct LoadContext {
    pub filename: String,
    pub cancel: CancelToken,
}

impl LoadContext {
    pub fn new(filename: impl Into<String>) -> Self {
        LoadContext {
            filename: filename.into(),
            cancel: CancelToken::new(),
        }
    }

    /// The same context, pointed at another file.
    pub fn with_file(&self, filename: impl Into<String>) -> Self {
        LoadContext {
            filename: filename.into(),
            cancel: self.cancel.clone(),
        }
    }
}

/// A pluggable resolver for file references (`extends.file`, `include`).
///
/// Loaders are consulted in registration order and the first whose
/// `accept` returns true performs the load; the built-in
/// [`LocalResourceLoader`] is appended last so user-supplied loaders take
/// precedence. `accept` must stay cheap (syntactic or a local stat);
/// `load` may be slow and must honor cancellation.
pub trait ResourceLoader {
    fn accept(&self, path: &str) -> bool;
    fn load(&self, ctx: &LoadContext, path: &str) -> Result<PathBuf>;
}

/// The built-in loader for paths on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalResourceLoader {
    pub working_dir: PathBuf,
}

impl LocalResourceLoader {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        LocalResourceLoader {
            working_dir: working_dir.into(),
        }
    }

    fn absolute(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.working_dir.join(p)
        }
    }
}

impl ResourceLoader for LocalResourceLoader {
    fn accept(&self, path: &str) -> bool {
        self.absolute(path).exists()
    }

    fn load(&self, ctx: &LoadContext, path: &str) -> Result<PathBuf> {
        if ctx.cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }
        Ok(self.absolute(path))
    }
}

/// Toggles controlling the pipeline stages.
///
/// Use [`Options::new`] for the loader's conventional defaults (every
/// stage enabled, paths resolved); `Options::default()` leaves every
/// toggle off.
#[derive(Clone, Default)]
pub struct Options {
    /// Bypass both schema validation and post-canonical validation.
    pub skip_validation: bool,
    /// Leave `${…}` forms untouched.
    pub skip_interpolation: bool,
    /// Bypass final-stage normalization of the project model.
    pub skip_normalization: bool,
    /// Rewrite relative host paths to absolute (default: on).
    pub resolve_paths: bool,
    /// Rewrite `C:\x` volume sources to `/c/x`.
    pub convert_windows_paths: bool,
    /// Bypass cross-entity reference checks.
    pub skip_consistency_check: bool,
    /// Do not inline base services.
    pub skip_extends: bool,
    /// Do not expand `include` directives.
    pub skip_include: bool,
    /// Do not inline `env_file` contents into service environments.
    pub skip_resolve_environment: bool,
    /// Drop `env_file` keys after inlining.
    pub discard_env_files: bool,
    /// Profiles to activate after the model is built.
    pub profiles: Vec<String>,
    /// Ordered resource loaders; first accepting loader wins.
    pub resource_loaders: Vec<Arc<dyn ResourceLoader>>,
    /// Substitution configuration; filled in by the orchestrator when the
    /// caller leaves it empty.
    pub interpolate: Option<InterpolateOptions>,

    project_name: String,
    project_name_imperative: bool,
}

impl Options {
    pub fn new() -> Self {
        Options {
            resolve_paths: true,
            ..Options::default()
        }
    }

    pub fn with_profiles(mut self, profiles: Vec<String>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_resource_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.resource_loaders.push(loader);
        self
    }

    pub fn with_skip_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }

    pub fn with_discard_env_files(mut self) -> Self {
        self.discard_env_files = true;
        self
    }

    /// Set the project name, recording whether the caller chose it
    /// imperatively or merely guessed it from context.
    pub fn set_project_name(&mut self, name: impl Into<String>, imperatively_set: bool) {
        self.project_name = name.into();
        self.project_name_imperative = imperatively_set;
    }

    pub fn project_name(&self) -> (&str, bool) {
        (&self.project_name, self.project_name_imperative)
    }
}
