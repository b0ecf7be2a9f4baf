//! The dynamic value tree.

use indexmap::IndexMap;

use crate::path::{PathSegment, TreePath};

/// A loosely-typed tree node.
///
/// Every compose document is one of these after parsing: a scalar, an
/// ordered sequence, or a string-keyed mapping. Mapping keys are guaranteed
/// to be strings by the parser; nothing downstream ever needs to handle any
/// other key type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(IndexMap<String, Value>),
}

impl Value {
    /// Create an empty mapping.
    pub fn empty_mapping() -> Self {
        Value::Mapping(IndexMap::new())
    }

    /// Check if this is a scalar (anything but a sequence or mapping).
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Sequence(_) | Value::Mapping(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Sequence(_))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Value::Mapping(_))
    }

    /// Get as a string slice if this is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        match self {
            Value::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    /// Shorthand for mapping lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.as_mapping_mut().and_then(|m| m.get_mut(key))
    }

    /// Navigate to a descendant node.
    pub fn at(&self, path: &TreePath) -> Option<&Value> {
        let mut current = self;
        for segment in path.segments() {
            current = match (segment, current) {
                (PathSegment::Key(key), Value::Mapping(entries)) => entries.get(key.as_str())?,
                (PathSegment::Index(i), Value::Sequence(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Navigate by mapping keys only; convenience for tests and accessors.
    pub fn at_keys(&self, keys: &[&str]) -> Option<&Value> {
        let mut current = self;
        for key in keys {
            current = current.get(key)?;
        }
        Some(current)
    }

    pub fn at_mut(&mut self, path: &TreePath) -> Option<&mut Value> {
        let mut current = self;
        for segment in path.segments() {
            current = match (segment, current) {
                (PathSegment::Key(key), Value::Mapping(entries)) => {
                    entries.get_mut(key.as_str())?
                }
                (PathSegment::Index(i), Value::Sequence(items)) => items.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Remove the node at `path`, returning it if it was present.
    ///
    /// Removing a mapping entry preserves the order of the remaining keys;
    /// removing a sequence element shifts later elements down.
    pub fn remove_at(&mut self, path: &TreePath) -> Option<Value> {
        let (last, parent_path) = path.split_last()?;
        let parent = self.at_mut(&parent_path)?;
        match (last, parent) {
            (PathSegment::Key(key), Value::Mapping(entries)) => entries.shift_remove(key.as_str()),
            (PathSegment::Index(i), Value::Sequence(items)) => {
                if *i < items.len() {
                    Some(items.remove(*i))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Set the node at `path`, replacing an existing node or inserting a new
    /// mapping entry when the parent exists. Returns false when the parent
    /// is missing or cannot hold the final segment.
    pub fn set_at(&mut self, path: &TreePath, value: Value) -> bool {
        if path.is_root() {
            *self = value;
            return true;
        }
        let (last, parent_path) = match path.split_last() {
            Some(split) => split,
            None => return false,
        };
        let parent = match self.at_mut(&parent_path) {
            Some(parent) => parent,
            None => return false,
        };
        match (last, parent) {
            (PathSegment::Key(key), Value::Mapping(entries)) => {
                entries.insert(key.clone(), value);
                true
            }
            (PathSegment::Index(i), Value::Sequence(items)) => {
                if *i < items.len() {
                    items[*i] = value;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// A short name for the node's shape, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
        }
    }

    /// Render a scalar as the string form used in `KEY=VALUE` entries and
    /// error messages. Returns `None` for sequences and mappings.
    pub fn render_scalar(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Sequence(_) | Value::Mapping(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(entries: Vec<(&str, Value)>) -> Value {
        Value::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[test]
    fn test_accessors() {
        let value = mapping(vec![
            ("name", Value::from("web")),
            ("replicas", Value::from(3)),
            ("enabled", Value::from(true)),
        ]);

        assert!(value.is_mapping());
        assert_eq!(value.get("name").unwrap().as_str(), Some("web"));
        assert_eq!(value.get("replicas").unwrap().as_int(), Some(3));
        assert_eq!(value.get("enabled").unwrap().as_bool(), Some(true));
        assert!(value.get("missing").is_none());
    }

    #[test]
    fn test_at_navigates_keys_and_indices() {
        let value = mapping(vec![(
            "services",
            mapping(vec![(
                "web",
                mapping(vec![(
                    "ports",
                    Value::Sequence(vec![Value::from("8080:80")]),
                )]),
            )]),
        )]);

        let path = TreePath::root()
            .child("services")
            .child("web")
            .child("ports")
            .indexed(0);
        assert_eq!(value.at(&path).unwrap().as_str(), Some("8080:80"));

        let missing = TreePath::root().child("services").child("db");
        assert!(value.at(&missing).is_none());
    }

    #[test]
    fn test_remove_at_preserves_sibling_order() {
        let mut value = mapping(vec![
            ("a", Value::from(1)),
            ("b", Value::from(2)),
            ("c", Value::from(3)),
        ]);

        let removed = value.remove_at(&TreePath::root().child("b"));
        assert_eq!(removed, Some(Value::Int(2)));

        let keys: Vec<&String> = value.as_mapping().unwrap().keys().collect();
        assert_eq!(keys, ["a", "c"]);
    }

    #[test]
    fn test_render_scalar() {
        assert_eq!(Value::from("x").render_scalar().unwrap(), "x");
        assert_eq!(Value::from(8).render_scalar().unwrap(), "8");
        assert_eq!(Value::from(true).render_scalar().unwrap(), "true");
        assert_eq!(Value::Null.render_scalar().unwrap(), "");
        assert!(Value::Sequence(vec![]).render_scalar().is_none());
    }
}
