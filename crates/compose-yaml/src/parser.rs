//! YAML parser that builds string-keyed [`Value`] trees.
//!
//! Built on yaml-rust2's event API. The builder keeps a stack of open
//! sequences and mappings, resolves anchors by cloning the anchored node,
//! and records `!reset` / `!override` tags as path-addressed side-channel
//! metadata instead of trying to express them in the tree itself.

use std::collections::HashMap;

use indexmap::IndexMap;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, TScalarStyle};

use crate::error::{Result, TreeError};
use crate::path::TreePath;
use crate::value::Value;

/// Merge-control tags understood by the loader pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `!reset`: drop the merged value at this path, restoring the default.
    Reset,
    /// `!override`: replace the merged value at this path instead of
    /// merging into it.
    Override,
}

/// A tag sighting recorded during parse, replayed after merging.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRecord {
    pub path: TreePath,
    pub kind: TagKind,
    /// The tagged node's own value, as parsed from this document.
    pub value: Value,
}

/// One parsed YAML document: the tree plus its tag metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Value,
    pub tags: Vec<TagRecord>,
}

impl Document {
    /// Wrap an already-parsed tree. The root must be a mapping.
    pub fn from_value(root: Value) -> Result<Document> {
        if !root.is_mapping() {
            return Err(TreeError::TopLevelNotMapping);
        }
        Ok(Document {
            root,
            tags: Vec::new(),
        })
    }

    /// Replay this document's tag records against a merged tree.
    pub fn apply_tags(&self, target: &mut Value) {
        apply_tag_records(&self.tags, target);
    }
}

/// Replay tag records against a tree.
///
/// `Reset` removes the node at the recorded path; `Override` replaces it
/// with the value recorded at parse time (inserting it when merging dropped
/// the entry entirely).
pub fn apply_tag_records(records: &[TagRecord], target: &mut Value) {
    for record in records {
        match record.kind {
            TagKind::Reset => {
                target.remove_at(&record.path);
            }
            TagKind::Override => {
                target.set_at(&record.path, record.value.clone());
            }
        }
    }
}

/// Parse a YAML stream into its documents.
///
/// Every document's top level must be a mapping with string keys; compose
/// streams may hold several documents separated by `---`, each processed
/// independently by the loader.
pub fn parse_documents(content: &str) -> Result<Vec<Document>> {
    let mut parser = Parser::new_from_str(content);
    let mut builder = TreeBuilder::default();
    parser.load(&mut builder, true)?;

    builder
        .docs
        .into_iter()
        .map(|node| {
            if !matches!(node, Node::Mapping(_, _)) {
                return Err(TreeError::TopLevelNotMapping);
            }
            let mut tags = Vec::new();
            let root = convert(node, &TreePath::root(), &mut tags)?;
            Ok(Document { root, tags })
        })
        .collect()
}

/// A parsed node before key canonicalization.
///
/// Keys are still arbitrary nodes here; `convert` turns the tree into a
/// [`Value`] and rejects anything with a non-string key.
#[derive(Debug, Clone)]
enum Node {
    Scalar(Value, Option<TagKind>),
    Sequence(Vec<Node>, Option<TagKind>),
    Mapping(Vec<(Node, Node)>, Option<TagKind>),
}

enum BuildNode {
    Sequence {
        items: Vec<Node>,
        tag: Option<TagKind>,
        anchor: usize,
    },
    Mapping {
        entries: Vec<(Node, Option<Node>)>,
        tag: Option<TagKind>,
        anchor: usize,
    },
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<BuildNode>,
    current_root: Option<Node>,
    docs: Vec<Node>,
    /// Anchored nodes, per document. Aliases resolve by cloning.
    anchors: HashMap<usize, Node>,
}

impl TreeBuilder {
    fn push_complete(&mut self, node: Node) {
        match self.stack.last_mut() {
            None => self.current_root = Some(node),
            Some(BuildNode::Sequence { items, .. }) => items.push(node),
            Some(BuildNode::Mapping { entries, .. }) => match entries.last_mut() {
                Some((_, value)) if value.is_none() => *value = Some(node),
                _ => entries.push((node, None)),
            },
        }
    }

    fn register_anchor(&mut self, anchor: usize, node: &Node) {
        if anchor > 0 {
            self.anchors.insert(anchor, node.clone());
        }
    }
}

fn tag_kind(tag: &Option<Tag>) -> Option<TagKind> {
    match tag {
        Some(t) if t.suffix == "reset" => Some(TagKind::Reset),
        Some(t) if t.suffix == "override" => Some(TagKind::Override),
        _ => None,
    }
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, ev: Event, _marker: Marker) {
        match ev {
            Event::Nothing | Event::StreamStart | Event::StreamEnd => {}

            Event::DocumentStart => {
                self.anchors.clear();
                self.current_root = None;
            }

            Event::DocumentEnd => {
                if let Some(root) = self.current_root.take() {
                    self.docs.push(root);
                }
            }

            Event::Scalar(value, style, anchor, tag) => {
                let node = Node::Scalar(parse_scalar(&value, style), tag_kind(&tag));
                self.register_anchor(anchor, &node);
                self.push_complete(node);
            }

            Event::SequenceStart(anchor, tag) => {
                self.stack.push(BuildNode::Sequence {
                    items: Vec::new(),
                    tag: tag_kind(&tag),
                    anchor,
                });
            }

            Event::SequenceEnd => {
                if let Some(BuildNode::Sequence { items, tag, anchor }) = self.stack.pop() {
                    let node = Node::Sequence(items, tag);
                    self.register_anchor(anchor, &node);
                    self.push_complete(node);
                }
            }

            Event::MappingStart(anchor, tag) => {
                self.stack.push(BuildNode::Mapping {
                    entries: Vec::new(),
                    tag: tag_kind(&tag),
                    anchor,
                });
            }

            Event::MappingEnd => {
                if let Some(BuildNode::Mapping {
                    entries,
                    tag,
                    anchor,
                }) = self.stack.pop()
                {
                    let pairs = entries
                        .into_iter()
                        .filter_map(|(key, value)| value.map(|v| (key, v)))
                        .collect();
                    let node = Node::Mapping(pairs, tag);
                    self.register_anchor(anchor, &node);
                    self.push_complete(node);
                }
            }

            Event::Alias(anchor) => {
                let node = self
                    .anchors
                    .get(&anchor)
                    .cloned()
                    .unwrap_or(Node::Scalar(Value::Null, None));
                self.push_complete(node);
            }
        }
    }
}

/// Scalar type inference.
///
/// Only plain scalars are inferred; quoted, literal, and folded scalars are
/// always strings, which is what keeps `published: "8080"` a string.
fn parse_scalar(value: &str, style: TScalarStyle) -> Value {
    if style != TScalarStyle::Plain {
        return Value::String(value.to_string());
    }

    match value {
        "" | "~" | "null" | "Null" | "NULL" => return Value::Null,
        "true" | "True" | "TRUE" | "yes" | "Yes" | "YES" | "on" | "On" | "ON" => {
            return Value::Bool(true)
        }
        "false" | "False" | "FALSE" | "no" | "No" | "NO" | "off" | "Off" | "OFF" => {
            return Value::Bool(false)
        }
        _ => {}
    }

    if let Ok(i) = value.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = value.parse::<f64>() {
        return Value::Float(f);
    }

    Value::String(value.to_string())
}

/// Convert a parsed node into a [`Value`], enforcing string keys and
/// collecting tag records with their breadcrumb paths.
fn convert(node: Node, path: &TreePath, tags: &mut Vec<TagRecord>) -> Result<Value> {
    let (value, tag) = match node {
        Node::Scalar(value, tag) => (value, tag),

        Node::Sequence(items, tag) => {
            let mut converted = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                converted.push(convert(item, &path.indexed(i), tags)?);
            }
            (Value::Sequence(converted), tag)
        }

        Node::Mapping(entries, tag) => {
            let mut converted = IndexMap::with_capacity(entries.len());
            for (key_node, value_node) in entries {
                let key = match key_node {
                    Node::Scalar(Value::String(s), _) => s,
                    other => {
                        return Err(TreeError::NonStringKey {
                            location: if path.is_root() {
                                "at top level".to_string()
                            } else {
                                format!("in {}", path)
                            },
                            key: describe_key(&other),
                        })
                    }
                };
                let child = convert(value_node, &path.child(&key), tags)?;
                converted.insert(key, child);
            }
            (Value::Mapping(converted), tag)
        }
    };

    if let Some(kind) = tag {
        tags.push(TagRecord {
            path: path.clone(),
            kind,
            value: value.clone(),
        });
    }

    Ok(value)
}

fn describe_key(node: &Node) -> String {
    match node {
        Node::Scalar(value, _) => value
            .render_scalar()
            .unwrap_or_else(|| value.type_name().to_string()),
        Node::Sequence(_, _) => "sequence".to_string(),
        Node::Mapping(_, _) => "mapping".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(content: &str) -> Document {
        let mut docs = parse_documents(content).unwrap();
        assert_eq!(docs.len(), 1);
        docs.remove(0)
    }

    #[test]
    fn test_parse_mapping_with_inferred_scalars() {
        let doc = parse_one(
            r#"
services:
  web:
    image: nginx
    scale: 3
    privileged: true
    labels: ~
"#,
        );
        let web = doc.root.at_keys(&["services", "web"]).unwrap();
        assert_eq!(web.get("image").unwrap().as_str(), Some("nginx"));
        assert_eq!(web.get("scale").unwrap().as_int(), Some(3));
        assert_eq!(web.get("privileged").unwrap().as_bool(), Some(true));
        assert!(web.get("labels").unwrap().is_null());
    }

    #[test]
    fn test_quoted_scalars_stay_strings() {
        let doc = parse_one("published: \"8080\"\nplain: 8080\nquoted_bool: 'no'\n");
        assert_eq!(doc.root.get("published").unwrap().as_str(), Some("8080"));
        assert_eq!(doc.root.get("plain").unwrap().as_int(), Some(8080));
        assert_eq!(doc.root.get("quoted_bool").unwrap().as_str(), Some("no"));
    }

    #[test]
    fn test_multi_document_stream() {
        let docs = parse_documents("a: 1\n---\nb: 2\n").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].root.get("a").unwrap().as_int(), Some(1));
        assert_eq!(docs[1].root.get("b").unwrap().as_int(), Some(2));
    }

    #[test]
    fn test_empty_input_has_no_documents() {
        assert!(parse_documents("").unwrap().is_empty());
    }

    #[test]
    fn test_top_level_must_be_mapping() {
        assert_eq!(
            parse_documents("- a\n- b\n").unwrap_err(),
            TreeError::TopLevelNotMapping
        );
        assert_eq!(
            parse_documents("just a scalar\n").unwrap_err(),
            TreeError::TopLevelNotMapping
        );
    }

    #[test]
    fn test_anchors_resolve_by_cloning() {
        let doc = parse_one(
            r#"
defaults: &defaults
  restart: always
services:
  web: *defaults
"#,
        );
        let web = doc.root.at_keys(&["services", "web"]).unwrap();
        assert_eq!(web.get("restart").unwrap().as_str(), Some("always"));
    }

    #[test]
    fn test_non_string_key_is_fatal() {
        let err = parse_documents("services:\n  web:\n    environment:\n      80: x\n")
            .unwrap_err();
        assert_eq!(
            err,
            TreeError::NonStringKey {
                location: "in services.web.environment".to_string(),
                key: "80".to_string(),
            }
        );
        assert_eq!(
            err.to_string(),
            "Non-string key in services.web.environment: 80"
        );
    }

    #[test]
    fn test_non_string_key_at_top_level() {
        let err = parse_documents("1: x\n").unwrap_err();
        assert_eq!(
            err,
            TreeError::NonStringKey {
                location: "at top level".to_string(),
                key: "1".to_string(),
            }
        );
    }

    #[test]
    fn test_reset_tag_recorded() {
        let doc = parse_one("services:\n  web:\n    command: !reset null\n");
        assert_eq!(doc.tags.len(), 1);
        let record = &doc.tags[0];
        assert_eq!(record.kind, TagKind::Reset);
        assert_eq!(record.path.to_string(), "services.web.command");
    }

    #[test]
    fn test_override_tag_recorded_with_value() {
        let doc = parse_one("services:\n  web:\n    ports: !override\n      - \"8080:80\"\n");
        assert_eq!(doc.tags.len(), 1);
        let record = &doc.tags[0];
        assert_eq!(record.kind, TagKind::Override);
        assert_eq!(record.path.to_string(), "services.web.ports");
        assert_eq!(
            record.value,
            Value::Sequence(vec![Value::from("8080:80")])
        );
    }

    #[test]
    fn test_apply_tags_reset_removes_merged_value() {
        let doc = parse_one("services:\n  web:\n    command: !reset null\n");
        let mut merged = parse_one(
            "services:\n  web:\n    command: run\n    image: nginx\n",
        )
        .root;
        doc.apply_tags(&mut merged);

        let web = merged.at_keys(&["services", "web"]).unwrap();
        assert!(web.get("command").is_none());
        assert_eq!(web.get("image").unwrap().as_str(), Some("nginx"));
    }

    #[test]
    fn test_apply_tags_override_replaces_merged_value() {
        let doc = parse_one("services:\n  web:\n    environment: !override\n      A: \"2\"\n");
        let mut merged = parse_one(
            "services:\n  web:\n    environment:\n      A: \"1\"\n      B: \"3\"\n",
        )
        .root;
        doc.apply_tags(&mut merged);

        let environment = merged
            .at_keys(&["services", "web", "environment"])
            .unwrap()
            .as_mapping()
            .unwrap();
        assert_eq!(environment.len(), 1);
        assert_eq!(environment.get("A").unwrap().as_str(), Some("2"));
    }

    #[test]
    fn test_unknown_tags_ignored() {
        let doc = parse_one("value: !str 42\n");
        assert!(doc.tags.is_empty());
        // Tagged scalars still go through plain-style inference.
        assert_eq!(doc.root.get("value").unwrap().as_int(), Some(42));
    }
}
