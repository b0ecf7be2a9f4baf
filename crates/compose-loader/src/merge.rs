//! Path-matched merging of compose trees.
//!
//! An override tree merges into a base tree under the default rules
//! (mappings union recursively, sequences concatenate, scalars are
//! replaced) except where a special rule matches the current path. The
//! special table is a compile-time constant owned by this module.
//!
//! Merging consumes both operands: the base is the accumulator and may be
//! reused inside the result, the override is never observable afterwards.

use compose_yaml::{TreePath, Value};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::error::{LoadError, Result};

type MergeFn = fn(Value, Value, &TreePath) -> Result<Value>;

/// Custom rules applied when merging compose trees.
static MERGE_SPECIALS: Lazy<Vec<(TreePath, MergeFn)>> = Lazy::new(|| {
    vec![
        (TreePath::pattern("services.*.logging"), merge_logging as MergeFn),
        (TreePath::pattern("services.*.command"), replace),
        (TreePath::pattern("services.*.entrypoint"), replace),
        (TreePath::pattern("services.*.healthcheck.test"), replace),
        (TreePath::pattern("services.*.environment"), merge_environment),
        (TreePath::pattern("services.*.ulimits.*"), merge_ulimit),
    ]
});

/// Merge an override tree into a base tree, starting at the root.
pub fn merge(base: Value, other: Value) -> Result<Value> {
    merge_value(base, other, &TreePath::root())
}

/// Merge a service override into a base service.
///
/// Used by the extends resolver: both operands are service bodies, so the
/// walk starts at `services.<name>` and the same special rules apply.
pub fn merge_service(base: Value, other: Value, name: &str) -> Result<Value> {
    merge_value(base, other, &TreePath::root().child("services").child(name))
}

fn merge_value(base: Value, other: Value, path: &TreePath) -> Result<Value> {
    for (pattern, special) in MERGE_SPECIALS.iter() {
        if path.matches(pattern) {
            return special(base, other, path);
        }
    }

    match (base, other) {
        (Value::Mapping(base), Value::Mapping(other)) => {
            Ok(Value::Mapping(merge_mappings(base, other, path)?))
        }
        (Value::Mapping(_), _) => Err(LoadError::CannotOverride { path: path.clone() }),
        (Value::Sequence(mut base), Value::Sequence(other)) => {
            base.extend(other);
            Ok(Value::Sequence(base))
        }
        (Value::Sequence(_), _) => Err(LoadError::CannotOverride { path: path.clone() }),
        // Scalars (and null) are replaced by whatever overrides them.
        (_, other) => Ok(other),
    }
}

fn merge_mappings(
    mut base: IndexMap<String, Value>,
    other: IndexMap<String, Value>,
    path: &TreePath,
) -> Result<IndexMap<String, Value>> {
    for (key, value) in other {
        // Extension keys overwrite wholesale, never structurally.
        if !base.contains_key(&key) || key.starts_with("x-") {
            base.insert(key, value);
            continue;
        }
        let next = path.child(&key);
        let existing = std::mem::replace(base.get_mut(&key).expect("key present"), Value::Null);
        let merged = merge_value(existing, value, &next)?;
        // Re-inserting an existing key keeps its position.
        base.insert(key, merged);
    }
    Ok(base)
}

/// Logging options merge only when both files agree on the driver (or one
/// of them leaves it implicit); a driver change discards the old options.
fn merge_logging(base: Value, other: Value, path: &TreePath) -> Result<Value> {
    match (base, other) {
        (Value::Mapping(base), Value::Mapping(other)) => {
            let base_driver = base.get("driver").and_then(Value::as_str);
            let other_driver = other.get("driver").and_then(Value::as_str);
            match (base_driver, other_driver) {
                (Some(b), Some(o)) if b != o => Ok(Value::Mapping(other)),
                _ => Ok(Value::Mapping(merge_mappings(base, other, path)?)),
            }
        }
        (_, other) => Ok(other),
    }
}

/// Environment declarations may be mappings or `KEY=VALUE` sequences; both
/// sides convert to the sequence form before concatenating so that later
/// entries win when the model flattens them.
fn merge_environment(base: Value, other: Value, _path: &TreePath) -> Result<Value> {
    let mut entries = into_environment_sequence(base);
    entries.extend(into_environment_sequence(other));
    Ok(Value::Sequence(entries))
}

/// Convert an environment declaration into sorted `KEY=VALUE` sequence
/// form. Sequences pass through unchanged; anything else is empty.
pub(crate) fn into_environment_sequence(value: Value) -> Vec<Value> {
    match value {
        Value::Mapping(entries) => {
            let mut rendered: Vec<String> = entries
                .into_iter()
                .map(|(key, value)| {
                    if value.is_null() {
                        key
                    } else {
                        format!("{}={}", key, value.render_scalar().unwrap_or_default())
                    }
                })
                .collect();
            rendered.sort();
            rendered.into_iter().map(Value::String).collect()
        }
        Value::Sequence(items) => items,
        _ => Vec::new(),
    }
}

fn merge_ulimit(base: Value, other: Value, path: &TreePath) -> Result<Value> {
    match (base, other) {
        (Value::Mapping(base), Value::Mapping(other)) => {
            Ok(Value::Mapping(merge_mappings(base, other, path)?))
        }
        (_, other) => Ok(other),
    }
}

fn replace(_base: Value, other: Value, _path: &TreePath) -> Result<Value> {
    Ok(other)
}

/// Post-merge deduplication of sequences whose semantics require
/// uniqueness. Volumes and ports keep the first occurrence; later
/// duplicates came from override files re-declaring the same entry.
/// Environment declarations are normalized into sequence form and deduped
/// by variable name keeping the last occurrence, since later entries win.
pub fn enforce_unicity(mut tree: Value) -> Result<Value> {
    if let Some(services) = tree.get_mut("services").and_then(Value::as_mapping_mut) {
        for service in services.values_mut() {
            if let Some(volumes) = service.get_mut("volumes").and_then(Value::as_sequence_mut) {
                dedupe_by(volumes, volume_target);
            }
            if let Some(ports) = service.get_mut("ports").and_then(Value::as_sequence_mut) {
                dedupe_by(ports, port_key);
            }
            if let Some(environment) = service.get_mut("environment") {
                if environment.is_mapping() || environment.is_sequence() {
                    let taken = std::mem::replace(environment, Value::Null);
                    let mut entries = into_environment_sequence(taken);
                    dedupe_environment(&mut entries);
                    *environment = Value::Sequence(entries);
                }
            }
        }
    }
    Ok(tree)
}

fn dedupe_by(entries: &mut Vec<Value>, key: fn(&Value) -> Option<String>) {
    let mut seen = HashSet::new();
    entries.retain(|entry| match key(entry) {
        Some(k) => seen.insert(k),
        None => true,
    });
}

/// Dedupe `KEY=VALUE` entries by variable name, keeping the last
/// occurrence in place.
fn dedupe_environment(entries: &mut Vec<Value>) {
    let mut seen = HashSet::new();
    let mut kept: Vec<Value> = Vec::with_capacity(entries.len());
    for entry in std::mem::take(entries).into_iter().rev() {
        match entry.as_str() {
            Some(item) => {
                let name = item.split_once('=').map(|(name, _)| name).unwrap_or(item);
                if seen.insert(name.to_string()) {
                    kept.push(entry);
                }
            }
            None => kept.push(entry),
        }
    }
    kept.reverse();
    *entries = kept;
}

/// Identity of a volume entry: its container target.
fn volume_target(entry: &Value) -> Option<String> {
    match entry {
        Value::Mapping(m) => m.get("target").and_then(Value::as_str).map(str::to_string),
        Value::String(spec) => Some(short_volume_target(spec)),
        _ => None,
    }
}

/// Extract the target from a short-form volume spec, accounting for
/// Windows drive letters in the source (`C:\data:/data`).
fn short_volume_target(spec: &str) -> String {
    let parts: Vec<&str> = spec.split(':').collect();
    let parts = if parts.len() > 1 && parts[0].len() == 1 && parts[0].chars().all(char::is_alphabetic)
    {
        let mut glued = vec![format!("{}:{}", parts[0], parts[1])];
        glued.extend(parts[2..].iter().map(|p| p.to_string()));
        glued
    } else {
        parts.into_iter().map(str::to_string).collect()
    };
    match parts.len() {
        1 => parts[0].clone(),
        _ => parts[1].clone(),
    }
}

/// Identity of a port entry, for both short and long form.
fn port_key(entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Mapping(m) => {
            let field = |name: &str| {
                m.get(name)
                    .and_then(Value::render_scalar)
                    .unwrap_or_default()
            };
            Some(format!(
                "{}:{}:{}/{}",
                field("host_ip"),
                field("published"),
                field("target"),
                field("protocol"),
            ))
        }
        _ => None,
    }
}
