//! Service inheritance: inlining `extends` bases, with cycle detection.

use std::path::Path;

use compose_yaml::{apply_tag_records, TagRecord, TreePath, Value};
use indexmap::IndexMap;
use tracing::debug;

use crate::config::{ConfigDetails, ConfigFile};
use crate::error::{LoadError, Result};
use crate::loader;
use crate::merge;
use crate::options::{LoadContext, Options};

/// A `(file, service)` node in the extends graph.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ServiceRef {
    filename: String,
    service: String,
}

/// The current extends chain. A node may appear at most once; re-adding
/// an existing node produces the formatted chain error.
#[derive(Debug, Default)]
pub(crate) struct CycleTracker {
    loaded: Vec<ServiceRef>,
}

impl CycleTracker {
    fn add(&mut self, filename: &str, service: &str) -> Result<()> {
        let to_add = ServiceRef {
            filename: filename.to_string(),
            service: service.to_string(),
        };
        if self.loaded.contains(&to_add) {
            // Error message of the form:
            //   Circular reference:
            //     service-a in compose.yml
            //     extends service-b in compose.yml
            //     extends service-a in compose.yml
            let mut lines = vec![
                "Circular reference:".to_string(),
                format!("  {} in {}", self.loaded[0].service, self.loaded[0].filename),
            ];
            for entry in self.loaded[1..].iter().chain(std::iter::once(&to_add)) {
                lines.push(format!("  extends {} in {}", entry.service, entry.filename));
            }
            return Err(LoadError::CircularReference(lines.join("\n")));
        }
        self.loaded.push(to_add);
        Ok(())
    }
}

/// Inline the base of every service carrying an `extends` key.
///
/// `tags` are the current document's tag records; they are replayed on a
/// synthetic `{services: {name: base}}` document before the merge so
/// `!reset` / `!override` can strip inherited values.
pub(crate) fn apply_extends(
    ctx: &LoadContext,
    tree: &mut Value,
    working_dir: &Path,
    opts: &Options,
    ct: &mut CycleTracker,
    tags: &[TagRecord],
) -> Result<()> {
    let names: Vec<String> = match tree.get("services").and_then(Value::as_mapping) {
        Some(services) => services.keys().cloned().collect(),
        None => return Ok(()),
    };
    for name in names {
        resolve_service(ctx, tree, &name, working_dir, opts, ct, tags)?;
    }
    Ok(())
}

fn resolve_service(
    ctx: &LoadContext,
    tree: &mut Value,
    name: &str,
    working_dir: &Path,
    opts: &Options,
    ct: &mut CycleTracker,
    tags: &[TagRecord],
) -> Result<()> {
    let directive = match tree
        .at_keys(&["services", name])
        .and_then(|service| service.get("extends"))
    {
        Some(directive) => normalize_directive(directive, name)?,
        None => return Ok(()),
    };

    ct.add(&ctx.filename, name)?;
    let (base_name, file) = directive;

    let base = match file {
        Some(path) => load_base_from_file(ctx, &path, &base_name, working_dir, opts, ct)?,
        None => {
            // A same-file base may itself extend another service; resolve
            // it first so the clone below already carries its inherited
            // fields.
            let base_has_extends = tree
                .at_keys(&["services", base_name.as_str()])
                .map(|base| base.get("extends").is_some())
                .unwrap_or(false);
            if base_has_extends {
                resolve_service(ctx, tree, &base_name, working_dir, opts, ct, tags)?;
            }
            match tree.at_keys(&["services", base_name.as_str()]) {
                Some(base) => base.clone(),
                None => {
                    return Err(LoadError::ExtendsServiceNotFound {
                        service: base_name,
                        filename: ctx.filename.clone(),
                    })
                }
            }
        }
    };

    // The clone above keeps the base itself untouched by whatever the
    // dependent service overrides. Replay the document's tag metadata
    // against a synthetic document rooted like the real one.
    let base_path = TreePath::root().child("services").child(name);
    let mut synthetic = Value::Mapping(IndexMap::from([(
        "services".to_string(),
        Value::Mapping(IndexMap::from([(name.to_string(), base)])),
    )]));
    apply_tag_records(tags, &mut synthetic);
    let base = synthetic
        .remove_at(&base_path)
        .unwrap_or_else(Value::empty_mapping);

    let service = tree
        .at_keys(&["services", name])
        .cloned()
        .unwrap_or_else(Value::empty_mapping);
    let mut merged = merge::merge_service(base, service, name)?;
    if let Some(entries) = merged.as_mapping_mut() {
        entries.shift_remove("extends");
    }

    if let Some(services) = tree.get_mut("services").and_then(Value::as_mapping_mut) {
        services.insert(name.to_string(), merged);
    }
    Ok(())
}

/// Accept both the short string form and the `{service, file?}` mapping.
fn normalize_directive(directive: &Value, name: &str) -> Result<(String, Option<String>)> {
    match directive {
        Value::String(base) => Ok((base.clone(), None)),
        Value::Mapping(entries) => {
            let base = entries
                .get("service")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    LoadError::InvalidModel(format!(
                        "services.{}.extends requires a service name",
                        name
                    ))
                })?;
            let file = entries.get("file").and_then(Value::as_str).map(str::to_string);
            Ok((base.to_string(), file))
        }
        other => Err(LoadError::InvalidModel(format!(
            "services.{}.extends must be a string or a mapping, got {}",
            name,
            other.type_name()
        ))),
    }
}

/// Resolve a cross-file base through the resource-loader chain and a
/// recursive, include-free pipeline run over the referenced file.
fn load_base_from_file(
    ctx: &LoadContext,
    path: &str,
    base_name: &str,
    working_dir: &Path,
    opts: &Options,
    ct: &mut CycleTracker,
) -> Result<Value> {
    for resource_loader in &opts.resource_loaders {
        if !resource_loader.accept(path) {
            continue;
        }
        let local = resource_loader.load(ctx, path)?;
        debug!(reference = path, local = %local.display(), "loading extends base");

        let sub_working_dir = match local.parent() {
            Some(parent) if parent.as_os_str().is_empty() => working_dir.to_path_buf(),
            Some(parent) if parent.is_absolute() => parent.to_path_buf(),
            Some(parent) => working_dir.join(parent),
            None => working_dir.to_path_buf(),
        };

        let mut sub_opts = opts.clone();
        sub_opts.resolve_paths = true;
        sub_opts.skip_normalization = true;
        sub_opts.skip_consistency_check = true;
        sub_opts.skip_include = true;

        let filename = local.to_string_lossy().into_owned();
        let details =
            ConfigDetails::new(sub_working_dir, vec![ConfigFile::from_file(filename)]);
        let (model, _) =
            loader::load_model(&ctx.cancel, &details, &sub_opts, ct, &mut Vec::new())?;

        return match model.at_keys(&["services", base_name]) {
            Some(base) => Ok(base.clone()),
            None => Err(LoadError::ExtendsServiceNotFound {
                service: base_name.to_string(),
                filename: path.to_string(),
            }),
        };
    }
    Err(LoadError::UnresolvableFile {
        path: path.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use compose_yaml::parse_documents;

    fn apply(yaml: &str) -> Result<Value> {
        let mut tree = parse_documents(yaml).unwrap().remove(0).root;
        let ctx = LoadContext::new("compose.yml");
        let opts = Options::new();
        let mut ct = CycleTracker::default();
        apply_extends(&ctx, &mut tree, Path::new("."), &opts, &mut ct, &[])?;
        Ok(tree)
    }

    #[test]
    fn test_same_file_extends() {
        let tree = apply(
            r#"
services:
  base:
    image: app
    environment:
      A: "1"
  web:
    extends: base
    environment:
      B: "2"
"#,
        )
        .unwrap();

        let web = tree.at_keys(&["services", "web"]).unwrap();
        assert_eq!(web.get("image").unwrap().as_str(), Some("app"));
        assert!(web.get("extends").is_none());
        let environment: Vec<&str> = web
            .get("environment")
            .unwrap()
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(environment, ["A=1", "B=2"]);
    }

    #[test]
    fn test_base_is_not_mutated_by_dependent() {
        let tree = apply(
            r#"
services:
  base:
    image: app
    labels:
      tier: backend
  web:
    extends:
      service: base
    labels:
      tier: frontend
"#,
        )
        .unwrap();

        assert_eq!(
            tree.at_keys(&["services", "base", "labels", "tier"])
                .unwrap()
                .as_str(),
            Some("backend")
        );
        assert_eq!(
            tree.at_keys(&["services", "web", "labels", "tier"])
                .unwrap()
                .as_str(),
            Some("frontend")
        );
    }

    #[test]
    fn test_transitive_same_file_chain() {
        let tree = apply(
            r#"
services:
  a:
    image: app
  b:
    extends: a
    restart: always
  c:
    extends: b
"#,
        )
        .unwrap();

        let c = tree.at_keys(&["services", "c"]).unwrap();
        assert_eq!(c.get("image").unwrap().as_str(), Some("app"));
        assert_eq!(c.get("restart").unwrap().as_str(), Some("always"));
        assert!(c.get("extends").is_none());
    }

    #[test]
    fn test_self_cycle() {
        let err = apply("services:\n  a:\n    extends: a\n").unwrap_err();
        let message = err.to_string();
        assert_eq!(
            message,
            "Circular reference:\n  a in compose.yml\n  extends a in compose.yml"
        );
    }

    #[test]
    fn test_two_service_cycle_lists_chain() {
        let err = apply(
            "services:\n  a:\n    extends: b\n  b:\n    extends: a\n",
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Circular reference:\n"));
        // Three chain lines: a, b, a.
        assert_eq!(message.lines().count(), 4);
        assert!(message.contains("extends a in compose.yml"));
        assert!(message.contains("extends b in compose.yml"));
    }

    #[test]
    fn test_missing_base_names_real_file() {
        let err = apply("services:\n  web:\n    extends: ghost\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot extend service \"ghost\" in compose.yml: service not found"
        );
    }
}
