//! Variable substitution over a tree, with path-addressed type casts.

use std::sync::Arc;

use compose_yaml::{TreePath, Value};

use crate::error::{LoadError, Result};
use crate::template;

/// Variable lookup used during substitution.
pub type LookupFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Primitive type a substituted string should be parsed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    Int,
    Float,
    Bool,
}

/// Substitution configuration: the lookup plus the cast table.
///
/// Casts only apply where substitution actually happened. YAML typing
/// already handles literal scalars; the casts recover typing for values
/// that were spelled as `${…}` templates and thus parsed as strings.
#[derive(Clone)]
pub struct InterpolateOptions {
    pub lookup: LookupFn,
    pub casts: Vec<(TreePath, CastKind)>,
}

impl InterpolateOptions {
    /// Build with the default cast table.
    pub fn new(lookup: LookupFn) -> Self {
        InterpolateOptions {
            lookup,
            casts: default_type_casts(),
        }
    }

    pub fn with_cast(mut self, pattern: &str, kind: CastKind) -> Self {
        self.casts.push((TreePath::pattern(pattern), kind));
        self
    }
}

/// Cast rules for the fields whose schema type is not string.
pub fn default_type_casts() -> Vec<(TreePath, CastKind)> {
    [
        ("services.*.scale", CastKind::Int),
        ("services.*.deploy.replicas", CastKind::Int),
        ("services.*.healthcheck.disable", CastKind::Bool),
        ("services.*.privileged", CastKind::Bool),
        ("services.*.stdin_open", CastKind::Bool),
        ("services.*.tty", CastKind::Bool),
    ]
    .into_iter()
    .map(|(pattern, kind)| (TreePath::pattern(pattern), kind))
    .collect()
}

/// Substitute `${…}` forms in every string leaf of the tree.
pub fn interpolate(value: Value, opts: &InterpolateOptions) -> Result<Value> {
    interpolate_value(value, &TreePath::root(), opts)
}

fn interpolate_value(value: Value, path: &TreePath, opts: &InterpolateOptions) -> Result<Value> {
    match value {
        Value::String(s) => {
            let substituted =
                template::substitute(&s, &*opts.lookup).map_err(|err| LoadError::Interpolation {
                    path: path.clone(),
                    message: err.to_string(),
                })?;
            if substituted == s {
                return Ok(Value::String(s));
            }
            for (pattern, kind) in &opts.casts {
                if path.matches(pattern) {
                    return cast(&substituted, *kind, path);
                }
            }
            Ok(Value::String(substituted))
        }

        Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(interpolate_value(item, &path.indexed(i), opts)?);
            }
            Ok(Value::Sequence(out))
        }

        Value::Mapping(entries) => {
            let mut out = indexmap::IndexMap::with_capacity(entries.len());
            for (key, entry) in entries {
                let child = interpolate_value(entry, &path.child(&key), opts)?;
                out.insert(key, child);
            }
            Ok(Value::Mapping(out))
        }

        other => Ok(other),
    }
}

fn cast(raw: &str, kind: CastKind, path: &TreePath) -> Result<Value> {
    let parsed = match kind {
        CastKind::Int => raw.parse::<i64>().ok().map(Value::Int),
        CastKind::Float => raw.parse::<f64>().ok().map(Value::Float),
        CastKind::Bool => match raw {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(Value::Bool(true)),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(Value::Bool(false)),
            _ => None,
        },
    };
    parsed.ok_or_else(|| LoadError::Interpolation {
        path: path.clone(),
        message: format!(
            "failed to cast {:?} to {}",
            raw,
            match kind {
                CastKind::Int => "integer",
                CastKind::Float => "number",
                CastKind::Bool => "boolean",
            }
        ),
    })
}
