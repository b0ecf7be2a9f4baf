//! Grouping of `x-*` keys into `extensions` buckets.

use compose_yaml::{TreePath, Value};
use indexmap::IndexMap;
use once_cell::sync::Lazy;

/// Scopes whose keys are user-chosen names: an `x-` prefix there names an
/// entry, not an extension.
static USER_DEFINED_KEYS: Lazy<Vec<TreePath>> = Lazy::new(|| {
    ["services", "volumes", "networks", "secrets", "configs"]
        .iter()
        .map(|scope| TreePath::pattern(scope))
        .collect()
});

/// Move `x-*` keys into a sibling `extensions` mapping, recursively.
pub fn group_extensions(value: Value) -> Value {
    group_value(value, &TreePath::root())
}

fn group_value(value: Value, path: &TreePath) -> Value {
    match value {
        Value::Mapping(entries) => {
            let user_defined_scope = USER_DEFINED_KEYS
                .iter()
                .any(|scope| path.matches(scope));

            let mut out = IndexMap::with_capacity(entries.len());
            let mut extras = IndexMap::new();
            for (key, entry) in entries {
                if !user_defined_scope && key.starts_with("x-") {
                    extras.insert(key, entry);
                    continue;
                }
                let child = group_value(entry, &path.child(&key));
                out.insert(key, child);
            }
            if !extras.is_empty() {
                out.insert("extensions".to_string(), Value::Mapping(extras));
            }
            Value::Mapping(out)
        }
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| group_value(item, &path.indexed(i)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compose_yaml::parse_documents;

    fn grouped(yaml: &str) -> Value {
        group_extensions(parse_documents(yaml).unwrap().remove(0).root)
    }

    #[test]
    fn test_top_level_extension_moves() {
        let tree = grouped("x-metadata:\n  team: infra\nservices: {}\n");
        assert!(tree.get("x-metadata").is_none());
        assert_eq!(
            tree.at_keys(&["extensions", "x-metadata", "team"])
                .unwrap()
                .as_str(),
            Some("infra")
        );
    }

    #[test]
    fn test_extension_under_service_name_moves() {
        let tree = grouped("services:\n  web:\n    image: nginx\n    x-scaling: auto\n");
        let web = tree.at_keys(&["services", "web"]).unwrap();
        assert!(web.get("x-scaling").is_none());
        assert_eq!(
            web.at_keys(&["extensions", "x-scaling"]).unwrap().as_str(),
            Some("auto")
        );
    }

    #[test]
    fn test_x_key_directly_under_services_is_a_service_name() {
        let tree = grouped("services:\n  x-worker:\n    image: worker\n");
        let service = tree.at_keys(&["services", "x-worker"]).unwrap();
        assert_eq!(service.get("image").unwrap().as_str(), Some("worker"));
        assert!(tree.at_keys(&["services", "extensions"]).is_none());
    }

    #[test]
    fn test_x_keys_under_other_user_defined_scopes_stay() {
        for section in ["volumes", "networks", "secrets", "configs"] {
            let tree = grouped(&format!("{}:\n  x-named: {{}}\n", section));
            assert!(
                tree.at_keys(&[section, "x-named"]).is_some(),
                "x-named should stay under {}",
                section
            );
        }
    }

    #[test]
    fn test_recurses_into_sequence_elements() {
        let tree = grouped(
            "services:\n  web:\n    volumes:\n      - target: /data\n        x-backup: daily\n",
        );
        let volume = &tree
            .at_keys(&["services", "web", "volumes"])
            .unwrap()
            .as_sequence()
            .unwrap()[0];
        assert!(volume.get("x-backup").is_none());
        assert_eq!(
            volume.at_keys(&["extensions", "x-backup"]).unwrap().as_str(),
            Some("daily")
        );
    }
}
