//! Tree locations and glob matching.

use std::fmt;

/// One step into a tree: a mapping key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A location in a tree, as a sequence of segments.
///
/// Paths serve two purposes: breadcrumbs in error messages
/// (`services.web.ports[0]`) and addressing for the rule tables of the
/// loader pipeline. Rule patterns are paths whose `*` key segments match
/// exactly one segment of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TreePath {
    segments: Vec<PathSegment>,
}

impl TreePath {
    /// The empty path, addressing the root of a tree.
    pub fn root() -> Self {
        TreePath::default()
    }

    /// Parse a dotted rule pattern such as `services.*.logging`.
    ///
    /// Every dot-separated part becomes a key segment; `*` parts are the
    /// glob wildcard understood by [`TreePath::matches`].
    pub fn pattern(pattern: &str) -> Self {
        TreePath {
            segments: pattern
                .split('.')
                .filter(|part| !part.is_empty())
                .map(|part| PathSegment::Key(part.to_string()))
                .collect(),
        }
    }

    /// Extend with a mapping key.
    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Key(key.into()));
        TreePath { segments }
    }

    /// Extend with a sequence index.
    pub fn indexed(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        TreePath { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// Split into the final segment and the path leading to it.
    pub fn split_last(&self) -> Option<(&PathSegment, TreePath)> {
        let (last, init) = self.segments.split_last()?;
        Some((
            last,
            TreePath {
                segments: init.to_vec(),
            },
        ))
    }

    /// Match against a rule pattern.
    ///
    /// Patterns match segment-for-segment; a `*` key segment in the pattern
    /// matches exactly one segment of any kind. An index segment matches a
    /// key pattern segment spelled as the same number, so patterns stay
    /// expressible as plain dotted strings.
    pub fn matches(&self, pattern: &TreePath) -> bool {
        if self.segments.len() != pattern.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(pattern.segments.iter())
            .all(|(segment, pattern_segment)| match pattern_segment {
                PathSegment::Key(p) if p == "*" => true,
                PathSegment::Key(p) => match segment {
                    PathSegment::Key(k) => k == p,
                    PathSegment::Index(i) => i.to_string() == *p,
                },
                PathSegment::Index(pi) => matches!(segment, PathSegment::Index(i) if i == pi),
            })
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", key)?;
                }
                PathSegment::Index(i) => write!(f, "[{}]", i)?,
            }
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keys_and_indices() {
        let path = TreePath::root()
            .child("services")
            .child("web")
            .child("ports")
            .indexed(0);
        assert_eq!(path.to_string(), "services.web.ports[0]");
        assert_eq!(TreePath::root().to_string(), "");
    }

    #[test]
    fn test_glob_matches_one_segment() {
        let pattern = TreePath::pattern("services.*.logging");

        let logging = TreePath::root()
            .child("services")
            .child("web")
            .child("logging");
        assert!(logging.matches(&pattern));

        let nested = TreePath::root()
            .child("services")
            .child("web")
            .child("logging")
            .child("driver");
        assert!(!nested.matches(&pattern));

        let short = TreePath::root().child("services").child("web");
        assert!(!short.matches(&pattern));
    }

    #[test]
    fn test_glob_matches_index_segment() {
        let pattern = TreePath::pattern("services.*.env_file.*");
        let path = TreePath::root()
            .child("services")
            .child("web")
            .child("env_file")
            .indexed(1);
        assert!(path.matches(&pattern));
    }

    #[test]
    fn test_exact_match_without_globs() {
        let pattern = TreePath::pattern("volumes");
        assert!(TreePath::root().child("volumes").matches(&pattern));
        assert!(!TreePath::root().child("services").matches(&pattern));
    }

    #[test]
    fn test_split_last() {
        let path = TreePath::root().child("services").child("web");
        let (last, parent) = path.split_last().unwrap();
        assert_eq!(last, &PathSegment::Key("web".to_string()));
        assert_eq!(parent.to_string(), "services");
        assert!(TreePath::root().split_last().is_none());
    }
}
