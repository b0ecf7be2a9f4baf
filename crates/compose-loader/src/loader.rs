//! The loader orchestrator.
//!
//! ## Pipeline stages
//!
//! Per file: parse → interpolate → validate → extends → merge into the
//! accumulator (then replay `!reset`/`!override` metadata).
//!
//! Across files: unicity → canonicalize → include → group extensions →
//! re-validate → resolve paths.
//!
//! Post-model: normalize → windows paths → consistency → profiles →
//! environment resolution, each gated by its option.

use std::sync::Arc;

use compose_yaml::{apply_tag_records, parse_documents, Document, TreePath, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::ConfigDetails;
use crate::environment;
use crate::error::{LoadError, Result};
use crate::extends::{self, CycleTracker};
use crate::extensions;
use crate::include::{self, IncludeConfig};
use crate::interpolation::{self, InterpolateOptions};
use crate::merge;
use crate::model::Project;
use crate::options::{CancelToken, LoadContext, LocalResourceLoader, Options};
use crate::paths;
use crate::schema;
use crate::template;
use crate::transform;
use crate::validate;

/// Environment variable carrying the canonical project name.
pub const COMPOSE_PROJECT_NAME: &str = "COMPOSE_PROJECT_NAME";

/// Load a project from the given config files.
pub fn load(details: ConfigDetails, options: Options) -> Result<Project> {
    load_with_context(&CancelToken::new(), details, options)
}

/// Load a project, with a caller-owned cancellation token.
pub fn load_with_context(
    cancel: &CancelToken,
    mut details: ConfigDetails,
    mut opts: Options,
) -> Result<Project> {
    if details.config_files.is_empty() {
        return Err(LoadError::NoFiles);
    }

    let caller_interpolate = opts.interpolate.clone();
    if caller_interpolate.is_none() {
        opts.interpolate = Some(environment_interpolate_options(&details));
    }
    opts.resource_loaders
        .push(Arc::new(LocalResourceLoader::new(&details.working_dir)));

    let project_name = derive_project_name(&details, &opts)?.unwrap_or_default();
    let (_, imperatively_set) = opts.project_name();
    opts.set_project_name(project_name.clone(), imperatively_set);

    if !project_name.is_empty() && !details.environment.contains_key(COMPOSE_PROJECT_NAME) {
        details
            .environment
            .insert(COMPOSE_PROJECT_NAME.to_string(), project_name.clone());
        // The default lookup captured the environment before the name was
        // injected; rebuild it. A caller-supplied lookup is left alone.
        if caller_interpolate.is_none() {
            opts.interpolate = Some(environment_interpolate_options(&details));
        }
    }

    let mut included = Vec::new();
    load_project(cancel, &details, &opts, &mut included, project_name)
}

fn environment_interpolate_options(details: &ConfigDetails) -> InterpolateOptions {
    let environment = details.environment.clone();
    InterpolateOptions::new(Arc::new(move |name: &str| environment.get(name).cloned()))
}

fn load_project(
    cancel: &CancelToken,
    details: &ConfigDetails,
    opts: &Options,
    included: &mut Vec<String>,
    name: String,
) -> Result<Project> {
    let main_file = details.config_files[0].filename.clone();
    let mut ct = CycleTracker::default();
    let (mut dict, include_refs) = load_model(cancel, details, opts, &mut ct, included)?;

    if dict.as_mapping().map(|m| m.is_empty()).unwrap_or(true) {
        return Err(LoadError::EmptyFile);
    }

    // The project name is owned by the options; a `name` key surviving in
    // the tree would shadow it in the model.
    if let Some(root) = dict.as_mapping_mut() {
        root.shift_remove("name");
    }

    if !opts.skip_normalization {
        normalize_model(&mut dict);
    }

    let mut project = Project::new(
        name,
        details.working_dir.clone(),
        details.environment.clone(),
        dict,
    )?;
    if !include_refs.is_empty() {
        project.include_references.insert(main_file, include_refs);
    }

    if opts.convert_windows_paths {
        convert_windows_volume_paths(&mut project);
    }

    if !opts.skip_consistency_check {
        validate::check_consistency(&project)?;
    }

    environment::apply_profiles(&mut project, &opts.profiles);

    if !opts.skip_resolve_environment {
        environment::resolve_services_environment(&mut project, opts.discard_env_files)?;
    }

    Ok(project)
}

/// Run the per-file pipeline for every config file and the cross-file
/// stages over the merged result, producing the canonical tree.
pub(crate) fn load_model(
    cancel: &CancelToken,
    details: &ConfigDetails,
    opts: &Options,
    ct: &mut CycleTracker,
    included: &mut Vec<String>,
) -> Result<(Value, Vec<IncludeConfig>)> {
    let mut dict = Value::empty_mapping();

    for file in &details.config_files {
        debug!(file = %file.filename, "processing config file");
        let ctx = LoadContext {
            filename: file.filename.clone(),
            cancel: cancel.clone(),
        };

        let documents: Vec<Document> = if let Some(parsed) = &file.parsed {
            vec![Document::from_value(parsed.clone())?]
        } else {
            let content = match &file.content {
                Some(content) => content.clone(),
                None => std::fs::read_to_string(&file.filename).map_err(|source| {
                    LoadError::Io {
                        filename: file.filename.clone(),
                        source,
                    }
                })?,
            };
            parse_documents(&content)?
        };

        for document in documents {
            let Document { root, tags } = document;

            let mut cfg = root;
            if !opts.skip_interpolation {
                if let Some(interpolate) = &opts.interpolate {
                    cfg = interpolation::interpolate(cfg, interpolate)?;
                }
            }

            fix_empty_not_null(&mut cfg);

            if !opts.skip_validation {
                schema::validate(&cfg).map_err(|message| LoadError::Validation {
                    filename: file.filename.clone(),
                    message,
                })?;
            }

            if !opts.skip_extends {
                extends::apply_extends(&ctx, &mut cfg, &details.working_dir, opts, ct, &tags)?;
            }

            dict = merge::merge(dict, cfg)?;
            apply_tag_records(&tags, &mut dict);
        }
    }

    dict = merge::enforce_unicity(dict)?;
    dict = transform::canonical(dict)?;

    let mut include_refs = Vec::new();
    if !opts.skip_include {
        included.push(details.config_files[0].filename.clone());
        include_refs = include::apply_include(cancel, details, &mut dict, opts, included)?;
    }

    dict = extensions::group_extensions(dict);

    if !opts.skip_validation {
        validate::validate_model(&dict)?;
    }

    if opts.resolve_paths {
        paths::resolve_relative_paths(&mut dict, &details.working_dir)?;
    }

    Ok((dict, include_refs))
}

/// Entries under the resource sections may be written as bare keys
/// (`volumes: {data:}`); give them empty mappings so merge and transforms
/// have something to work with.
fn fix_empty_not_null(tree: &mut Value) {
    let root = match tree.as_mapping_mut() {
        Some(root) => root,
        None => return,
    };
    for section in ["services", "volumes", "networks", "secrets", "configs"] {
        if let Some(value) = root.get_mut(section) {
            if value.is_null() {
                *value = Value::empty_mapping();
            }
            if let Some(entries) = value.as_mapping_mut() {
                for entry in entries.values_mut() {
                    if entry.is_null() {
                        *entry = Value::empty_mapping();
                    }
                }
            }
        }
    }
}

/// Model normalization: services without explicit attachment join the
/// `default` network, which is declared on demand.
fn normalize_model(tree: &mut Value) {
    let mut needs_default_network = false;
    if let Some(services) = tree.get_mut("services").and_then(Value::as_mapping_mut) {
        for service in services.values_mut() {
            let service = match service.as_mapping_mut() {
                Some(service) => service,
                None => continue,
            };
            if service.contains_key("network_mode") {
                continue;
            }
            let attached = service
                .entry("networks".to_string())
                .or_insert_with(|| {
                    Value::Mapping(indexmap::IndexMap::from([(
                        "default".to_string(),
                        Value::Null,
                    )]))
                });
            let uses_default = match attached {
                Value::Mapping(networks) => networks.contains_key("default"),
                Value::Sequence(networks) => networks
                    .iter()
                    .any(|network| network.as_str() == Some("default")),
                _ => false,
            };
            needs_default_network = needs_default_network || uses_default;
        }
    }

    if needs_default_network {
        let root = match tree.as_mapping_mut() {
            Some(root) => root,
            None => return,
        };
        let networks = root
            .entry("networks".to_string())
            .or_insert_with(Value::empty_mapping);
        if let Some(networks) = networks.as_mapping_mut() {
            networks
                .entry("default".to_string())
                .or_insert_with(Value::empty_mapping);
        }
    }
}

fn convert_windows_volume_paths(project: &mut Project) {
    let services = match project.services_mut() {
        Some(services) => services,
        None => return,
    };
    for service in services.values_mut() {
        if let Some(volumes) = service.get_mut("volumes").and_then(Value::as_sequence_mut) {
            for volume in volumes {
                if let Some(Value::String(source)) = volume.get_mut("source") {
                    *source = paths::convert_windows_path(source);
                }
            }
        }
    }
}

/// Determine the canonical project name.
///
/// Imperatively set names win. Otherwise the config files get a cheap
/// pre-pass for their last non-empty `name` field, which is interpolated
/// and must already be canonical. Pre-pass failures (unreadable file,
/// unparseable YAML, non-string name) are deliberately swallowed by
/// returning `None`: the main pipeline reports them with richer context.
fn derive_project_name(details: &ConfigDetails, opts: &Options) -> Result<Option<String>> {
    let (imperative_name, imperatively_set) = opts.project_name();
    let mut name = imperative_name.to_string();

    if !imperatively_set {
        let mut raw = String::new();
        for file in &details.config_files {
            let tree = match (&file.parsed, &file.content) {
                (Some(parsed), _) => parsed.clone(),
                (None, content) => {
                    let content = match content {
                        Some(content) => content.clone(),
                        None => match std::fs::read_to_string(&file.filename) {
                            Ok(content) => content,
                            Err(_) => return Ok(None),
                        },
                    };
                    match parse_documents(&content) {
                        Ok(documents) => match documents.into_iter().next() {
                            Some(document) => document.root,
                            None => continue,
                        },
                        Err(_) => return Ok(None),
                    }
                }
            };
            match tree.get("name") {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) if s.is_empty() => {}
                Some(Value::String(s)) => raw = s.clone(),
                Some(_) => return Ok(None),
            }
        }

        if !opts.skip_interpolation {
            if let Some(interpolate) = &opts.interpolate {
                raw = template::substitute(&raw, &*interpolate.lookup).map_err(|err| {
                    LoadError::Interpolation {
                        path: TreePath::root().child("name"),
                        message: err.to_string(),
                    }
                })?;
            }
        }

        if !raw.is_empty() {
            name = raw;
        }
    }

    if name.is_empty() {
        return Err(LoadError::EmptyProjectName);
    }
    if normalize_project_name(&name) != name {
        return Err(LoadError::InvalidProjectName { name });
    }
    Ok(Some(name))
}

/// Reduce a candidate name to its canonical form: lowercase, only
/// `[a-z0-9_-]`, starting with an alphanumeric.
pub fn normalize_project_name(name: &str) -> String {
    static ALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new("[a-z0-9_-]").expect("valid pattern"));
    let lowered = name.to_lowercase();
    let kept: String = ALLOWED
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .collect();
    kept.trim_start_matches(['_', '-']).to_string()
}
