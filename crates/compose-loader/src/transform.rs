//! Canonicalization: rewriting short-form fields to their long form.
//!
//! Driven by a path→function table, like the merge specials. Transforms
//! run on the merged tree, before includes are expanded and extensions are
//! grouped, so every later stage only sees canonical shapes.

use compose_yaml::{TreePath, Value};
use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::error::{LoadError, Result};
use crate::ports;

type TransformFn = fn(Value, &TreePath) -> Result<Value>;

static CANONICAL_TRANSFORMS: Lazy<Vec<(TreePath, TransformFn)>> = Lazy::new(|| {
    vec![
        (
            TreePath::pattern("services.*.ports"),
            ports::transform_ports as TransformFn,
        ),
        (TreePath::pattern("services.*.build"), transform_build),
        (
            TreePath::pattern("services.*.depends_on"),
            transform_depends_on,
        ),
        (TreePath::pattern("services.*.env_file"), transform_env_file),
        (
            TreePath::pattern("services.*.volumes.*"),
            transform_volume_entry,
        ),
    ]
});

/// Apply every canonical transform across the tree.
pub fn canonical(tree: Value) -> Result<Value> {
    canonical_value(tree, &TreePath::root())
}

fn canonical_value(value: Value, path: &TreePath) -> Result<Value> {
    let mut value = value;
    for (pattern, transform) in CANONICAL_TRANSFORMS.iter() {
        if path.matches(pattern) {
            value = transform(value, path)?;
        }
    }

    match value {
        Value::Mapping(entries) => {
            let mut out = IndexMap::with_capacity(entries.len());
            for (key, entry) in entries {
                let child = canonical_value(entry, &path.child(&key))?;
                out.insert(key, child);
            }
            Ok(Value::Mapping(out))
        }
        Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(canonical_value(item, &path.indexed(i))?);
            }
            Ok(Value::Sequence(out))
        }
        other => Ok(other),
    }
}

/// `build: ./dir` becomes `build: {context: ./dir}`.
fn transform_build(value: Value, path: &TreePath) -> Result<Value> {
    match value {
        Value::String(context) => {
            let mut entry = IndexMap::new();
            entry.insert("context".to_string(), Value::String(context));
            Ok(Value::Mapping(entry))
        }
        mapping @ Value::Mapping(_) => Ok(mapping),
        other => Err(LoadError::InvalidModel(format!(
            "{}: invalid type {} for build",
            path,
            other.type_name()
        ))),
    }
}

/// The list form of `depends_on` becomes the mapping form with default
/// conditions; mapping entries get the defaults filled in.
fn transform_depends_on(value: Value, path: &TreePath) -> Result<Value> {
    match value {
        Value::Sequence(names) => {
            let mut out = IndexMap::with_capacity(names.len());
            for name in names {
                match name {
                    Value::String(name) => {
                        out.insert(name, default_dependency());
                    }
                    other => {
                        return Err(LoadError::InvalidModel(format!(
                            "{}: invalid type {} for service dependency",
                            path,
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(Value::Mapping(out))
        }
        Value::Mapping(entries) => {
            let mut out = IndexMap::with_capacity(entries.len());
            for (name, entry) in entries {
                let entry = match entry {
                    Value::Null => default_dependency(),
                    Value::Mapping(mut config) => {
                        config
                            .entry("condition".to_string())
                            .or_insert_with(|| Value::from("service_started"));
                        config
                            .entry("required".to_string())
                            .or_insert(Value::Bool(true));
                        Value::Mapping(config)
                    }
                    other => {
                        return Err(LoadError::InvalidModel(format!(
                            "{}.{}: invalid type {} for service dependency",
                            path,
                            name,
                            other.type_name()
                        )))
                    }
                };
                out.insert(name, entry);
            }
            Ok(Value::Mapping(out))
        }
        other => Err(LoadError::InvalidModel(format!(
            "{}: invalid type {} for depends_on",
            path,
            other.type_name()
        ))),
    }
}

fn default_dependency() -> Value {
    let mut entry = IndexMap::new();
    entry.insert("condition".to_string(), Value::from("service_started"));
    entry.insert("required".to_string(), Value::Bool(true));
    Value::Mapping(entry)
}

/// A single env file becomes a one-element list.
fn transform_env_file(value: Value, path: &TreePath) -> Result<Value> {
    match value {
        Value::String(file) => Ok(Value::Sequence(vec![Value::String(file)])),
        sequence @ Value::Sequence(_) => Ok(sequence),
        other => Err(LoadError::InvalidModel(format!(
            "{}: invalid type {} for env_file",
            path,
            other.type_name()
        ))),
    }
}

/// Short-form volume entries (`./src:/app:ro`, `data:/var/lib`, `/anon`)
/// become long-form mappings.
fn transform_volume_entry(value: Value, path: &TreePath) -> Result<Value> {
    let spec = match value {
        Value::String(spec) => spec,
        mapping @ Value::Mapping(_) => return Ok(mapping),
        other => {
            return Err(LoadError::InvalidModel(format!(
                "{}: invalid type {} for volume",
                path,
                other.type_name()
            )))
        }
    };

    let invalid = |reason: &str| {
        LoadError::InvalidModel(format!("{}: invalid volume {:?}: {}", path, spec, reason))
    };

    let parts = split_volume_spec(&spec);
    let (source, target, mode) = match parts.len() {
        1 => (None, parts[0].clone(), None),
        2 => (Some(parts[0].clone()), parts[1].clone(), None),
        3 => (
            Some(parts[0].clone()),
            parts[1].clone(),
            Some(parts[2].clone()),
        ),
        _ => return Err(invalid("too many colon-separated fields")),
    };
    if target.is_empty() {
        return Err(invalid("empty target"));
    }

    let mut entry = IndexMap::new();
    match source {
        Some(source) if is_host_path(&source) => {
            entry.insert("type".to_string(), Value::from("bind"));
            entry.insert("source".to_string(), Value::String(source));
            entry.insert("target".to_string(), Value::String(target));
            // Short syntax implies the engine creates missing host paths.
            let mut bind = IndexMap::new();
            bind.insert("create_host_path".to_string(), Value::Bool(true));
            entry.insert("bind".to_string(), Value::Mapping(bind));
        }
        Some(source) => {
            entry.insert("type".to_string(), Value::from("volume"));
            entry.insert("source".to_string(), Value::String(source));
            entry.insert("target".to_string(), Value::String(target));
        }
        None => {
            entry.insert("type".to_string(), Value::from("volume"));
            entry.insert("target".to_string(), Value::String(target));
        }
    }
    match mode.as_deref() {
        None | Some("rw") => {}
        Some("ro") => {
            entry.insert("read_only".to_string(), Value::Bool(true));
        }
        Some(other) => return Err(invalid(&format!("unknown mode {:?}", other))),
    }
    Ok(Value::Mapping(entry))
}

/// Split a volume spec on `:`, gluing a Windows drive letter back onto its
/// path (`C:\data:/data` splits as `C:\data` and `/data`).
fn split_volume_spec(spec: &str) -> Vec<String> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() > 1 && parts[0].len() == 1 && parts[0].chars().all(char::is_alphabetic) {
        let mut glued = vec![format!("{}:{}", parts[0], parts[1])];
        glued.extend(parts[2..].iter().map(|p| p.to_string()));
        glued
    } else {
        parts.into_iter().map(str::to_string).collect()
    }
}

/// Does a short-form volume source name a host path rather than a named
/// volume?
fn is_host_path(source: &str) -> bool {
    source.starts_with('.')
        || source.starts_with('/')
        || source.starts_with('~')
        || source.starts_with('\\')
        || (source.len() >= 2
            && source.as_bytes()[1] == b':'
            && source.chars().next().is_some_and(|c| c.is_ascii_alphabetic()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use compose_yaml::parse_documents;

    fn canonicalized(yaml: &str) -> Value {
        canonical(parse_documents(yaml).unwrap().remove(0).root).unwrap()
    }

    #[test]
    fn test_short_port_becomes_mapping() {
        let tree = canonicalized("services:\n  web:\n    ports:\n      - \"8080:80\"\n");
        let port = tree.at_keys(&["services", "web", "ports"]).unwrap();
        let entry = &port.as_sequence().unwrap()[0];
        assert!(entry.is_mapping());
        assert_eq!(entry.get("target").unwrap().as_int(), Some(80));
        assert_eq!(entry.get("published").unwrap().as_str(), Some("8080"));
    }

    #[test]
    fn test_build_string_becomes_context() {
        let tree = canonicalized("services:\n  web:\n    build: ./web\n");
        assert_eq!(
            tree.at_keys(&["services", "web", "build", "context"])
                .unwrap()
                .as_str(),
            Some("./web")
        );
    }

    #[test]
    fn test_depends_on_list_becomes_mapping() {
        let tree = canonicalized("services:\n  web:\n    depends_on:\n      - db\n");
        let dependency = tree
            .at_keys(&["services", "web", "depends_on", "db"])
            .unwrap();
        assert_eq!(
            dependency.get("condition").unwrap().as_str(),
            Some("service_started")
        );
        assert_eq!(dependency.get("required").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn test_env_file_scalar_becomes_sequence() {
        let tree = canonicalized("services:\n  web:\n    env_file: .env\n");
        let env_file = tree
            .at_keys(&["services", "web", "env_file"])
            .unwrap()
            .as_sequence()
            .unwrap();
        assert_eq!(env_file.len(), 1);
        assert_eq!(env_file[0].as_str(), Some(".env"));
    }

    #[test]
    fn test_bind_volume_short_form() {
        let tree = canonicalized("services:\n  web:\n    volumes:\n      - ./src:/app:ro\n");
        let volume = &tree
            .at_keys(&["services", "web", "volumes"])
            .unwrap()
            .as_sequence()
            .unwrap()[0];
        assert_eq!(volume.get("type").unwrap().as_str(), Some("bind"));
        assert_eq!(volume.get("source").unwrap().as_str(), Some("./src"));
        assert_eq!(volume.get("target").unwrap().as_str(), Some("/app"));
        assert_eq!(volume.get("read_only").unwrap().as_bool(), Some(true));
        assert_eq!(
            volume.at_keys(&["bind", "create_host_path"]).unwrap().as_bool(),
            Some(true)
        );
    }

    #[test]
    fn test_named_volume_short_form() {
        let tree = canonicalized("services:\n  db:\n    volumes:\n      - data:/var/lib\n");
        let volume = &tree
            .at_keys(&["services", "db", "volumes"])
            .unwrap()
            .as_sequence()
            .unwrap()[0];
        assert_eq!(volume.get("type").unwrap().as_str(), Some("volume"));
        assert_eq!(volume.get("source").unwrap().as_str(), Some("data"));
    }

    #[test]
    fn test_anonymous_volume_short_form() {
        let tree = canonicalized("services:\n  db:\n    volumes:\n      - /var/lib/data\n");
        let volume = &tree
            .at_keys(&["services", "db", "volumes"])
            .unwrap()
            .as_sequence()
            .unwrap()[0];
        assert_eq!(volume.get("type").unwrap().as_str(), Some("volume"));
        assert!(volume.get("source").is_none());
        assert_eq!(volume.get("target").unwrap().as_str(), Some("/var/lib/data"));
    }

    #[test]
    fn test_windows_source_volume() {
        let tree = canonicalized("services:\n  web:\n    volumes:\n      - \"C:\\\\data:/data\"\n");
        let volume = &tree
            .at_keys(&["services", "web", "volumes"])
            .unwrap()
            .as_sequence()
            .unwrap()[0];
        assert_eq!(volume.get("type").unwrap().as_str(), Some("bind"));
        assert_eq!(volume.get("source").unwrap().as_str(), Some("C:\\data"));
        assert_eq!(volume.get("target").unwrap().as_str(), Some("/data"));
    }

    #[test]
    fn test_long_form_volume_passes_through() {
        let tree = canonicalized(
            "services:\n  web:\n    volumes:\n      - type: bind\n        source: ./src\n        target: /app\n",
        );
        let volume = &tree
            .at_keys(&["services", "web", "volumes"])
            .unwrap()
            .as_sequence()
            .unwrap()[0];
        assert_eq!(volume.get("type").unwrap().as_str(), Some("bind"));
        assert!(volume.get("bind").is_none());
    }

    #[test]
    fn test_invalid_ports_type_fails() {
        let tree = parse_documents("services:\n  web:\n    ports: \"8080:80\"\n")
            .unwrap()
            .remove(0)
            .root;
        let err = canonical(tree).unwrap_err();
        assert!(err.to_string().contains("invalid type string for port"));
    }
}
