//! File-level composition: expanding `include` directives.
//!
//! Each include entry loads an isolated sub-project (own working
//! directory, own environment overlay) through the regular pipeline, and
//! the resulting model merges back into the including tree. A chain of
//! included files detects cycles across the whole include graph.

use std::path::{Path, PathBuf};

use compose_yaml::Value;
use tracing::debug;

use crate::config::{ConfigDetails, ConfigFile};
use crate::environment::parse_env_file;
use crate::error::{LoadError, Result};
use crate::extends::CycleTracker;
use crate::interpolation::InterpolateOptions;
use crate::loader;
use crate::options::{CancelToken, LoadContext, Options};

/// One parsed `include` entry, with its paths resolved to local files.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeConfig {
    /// The compose files of the sub-project; the first is the main file,
    /// the rest are overrides.
    pub path: Vec<String>,
    /// Working directory of the sub-project; defaults to the directory of
    /// the main file.
    pub project_directory: Option<String>,
    /// Env files overlaid onto the parent environment for the sub-load.
    pub env_file: Vec<String>,
}

/// Expand every `include` entry, merging sub-project models into `tree`.
///
/// `included` is the chain of files currently being loaded; the chain is
/// cloned per entry so sibling includes of the same file stay legal while
/// genuine cycles error.
pub(crate) fn apply_include(
    cancel: &CancelToken,
    details: &ConfigDetails,
    tree: &mut Value,
    opts: &Options,
    included: &[String],
) -> Result<Vec<IncludeConfig>> {
    let entries = match tree
        .as_mapping_mut()
        .and_then(|root| root.shift_remove("include"))
    {
        Some(Value::Sequence(entries)) => entries,
        Some(other) => {
            return Err(LoadError::InvalidModel(format!(
                "include must be a sequence, got {}",
                other.type_name()
            )))
        }
        None => return Ok(Vec::new()),
    };

    let ctx = LoadContext {
        filename: details.config_files[0].filename.clone(),
        cancel: cancel.clone(),
    };

    let mut refs = Vec::new();
    for entry in entries {
        let config = parse_include_entry(entry)?;
        let resolved = resolve_include(&ctx, &config, details, opts)?;
        debug!(files = ?resolved.path, "expanding include");

        let main_file = resolved.path[0].clone();
        if included.contains(&main_file) {
            let mut chain = included.to_vec();
            chain.push(main_file);
            return Err(LoadError::CircularReference(format!(
                "include cycle detected:\n{}\n include {}",
                chain[0],
                chain[1..].join("\n include ")
            )));
        }

        let project_directory = resolved
            .project_directory
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                Path::new(&main_file)
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| details.working_dir.clone())
            });

        // Environment overlay: entry env files win over the parent
        // environment for the sub-load.
        let mut environment = details.environment.clone();
        for env_file in &resolved.env_file {
            let path = if Path::new(env_file).is_absolute() {
                PathBuf::from(env_file)
            } else {
                details.working_dir.join(env_file)
            };
            for (key, value) in parse_env_file(&path)? {
                environment.insert(key, value);
            }
        }

        let mut sub_opts = opts.clone();
        let lookup_env = environment.clone();
        sub_opts.interpolate = Some(InterpolateOptions::new(std::sync::Arc::new(
            move |name: &str| lookup_env.get(name).cloned(),
        )));

        let sub_details = ConfigDetails::new(
            project_directory,
            resolved
                .path
                .iter()
                .map(|file| ConfigFile::from_file(file.clone()))
                .collect(),
        )
        .with_environment(environment);

        let mut sub_included = included.to_vec();
        let (sub_model, _) = loader::load_model(
            cancel,
            &sub_details,
            &sub_opts,
            &mut CycleTracker::default(),
            &mut sub_included,
        )?;

        // The including file's own definitions win over included ones.
        let parent = std::mem::replace(tree, Value::empty_mapping());
        *tree = crate::merge::merge(sub_model, parent)?;

        refs.push(resolved);
    }
    Ok(refs)
}

/// Accept the short string form and the `{path, project_directory,
/// env_file}` mapping, where `path` and `env_file` may be scalar or
/// sequence.
fn parse_include_entry(entry: Value) -> Result<IncludeConfig> {
    match entry {
        Value::String(path) => Ok(IncludeConfig {
            path: vec![path],
            project_directory: None,
            env_file: Vec::new(),
        }),
        Value::Mapping(entries) => {
            let path = match entries.get("path") {
                Some(Value::String(path)) => vec![path.clone()],
                Some(Value::Sequence(parts)) => parts
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            };
            if path.is_empty() {
                return Err(LoadError::InvalidModel(
                    "include entry requires a path".to_string(),
                ));
            }
            let env_file = match entries.get("env_file") {
                Some(Value::String(file)) => vec![file.clone()],
                Some(Value::Sequence(files)) => files
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            };
            Ok(IncludeConfig {
                path,
                project_directory: entries
                    .get("project_directory")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                env_file,
            })
        }
        other => Err(LoadError::InvalidModel(format!(
            "include entry must be a string or a mapping, got {}",
            other.type_name()
        ))),
    }
}

/// Run every path of the entry through the resource-loader chain.
fn resolve_include(
    ctx: &LoadContext,
    config: &IncludeConfig,
    details: &ConfigDetails,
    opts: &Options,
) -> Result<IncludeConfig> {
    let mut resolved_paths = Vec::with_capacity(config.path.len());
    for path in &config.path {
        let mut local = None;
        for resource_loader in &opts.resource_loaders {
            if resource_loader.accept(path) {
                local = Some(resource_loader.load(ctx, path)?);
                break;
            }
        }
        match local {
            Some(local) => {
                let local = if local.is_absolute() {
                    local
                } else {
                    details.working_dir.join(local)
                };
                resolved_paths.push(local.to_string_lossy().into_owned());
            }
            None => return Err(LoadError::UnresolvableFile { path: path.clone() }),
        }
    }
    Ok(IncludeConfig {
        path: resolved_paths,
        project_directory: config.project_directory.as_ref().map(|dir| {
            if Path::new(dir).is_absolute() {
                dir.clone()
            } else {
                details
                    .working_dir
                    .join(dir)
                    .to_string_lossy()
                    .into_owned()
            }
        }),
        env_file: config.env_file.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_include_entry_string_form() {
        let config = parse_include_entry(Value::from("../other/compose.yml")).unwrap();
        assert_eq!(config.path, ["../other/compose.yml"]);
        assert!(config.project_directory.is_none());
        assert!(config.env_file.is_empty());
    }

    #[test]
    fn test_parse_include_entry_mapping_form() {
        let entry = compose_yaml::parse_documents(
            "path:\n  - base.yml\n  - override.yml\nproject_directory: ../other\nenv_file: .env\n",
        )
        .unwrap()
        .remove(0)
        .root;
        let config = parse_include_entry(entry).unwrap();
        assert_eq!(config.path, ["base.yml", "override.yml"]);
        assert_eq!(config.project_directory.as_deref(), Some("../other"));
        assert_eq!(config.env_file, [".env"]);
    }

    #[test]
    fn test_parse_include_entry_requires_path() {
        let entry = compose_yaml::parse_documents("project_directory: ../other\n")
            .unwrap()
            .remove(0)
            .root;
        assert!(parse_include_entry(entry).is_err());
    }
}
