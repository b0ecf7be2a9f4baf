//! Env-file parsing, service environment resolution, and profile
//! activation. These run as post-model steps, after the tree has been
//! mapped into a [`Project`].

use std::path::Path;

use compose_yaml::Value;
use indexmap::IndexMap;

use crate::error::{LoadError, Result};
use crate::model::Project;

/// Parse dotenv-style content: `KEY=VALUE` lines, `#` comments, optional
/// `export ` prefixes, and single or double quotes around values.
pub fn parse_env_file_content(content: &str) -> IndexMap<String, String> {
    let mut vars = IndexMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => continue,
        };
        if key.is_empty() {
            continue;
        }
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    vars
}

/// Read and parse an env file from disk.
pub fn parse_env_file(path: &Path) -> Result<IndexMap<String, String>> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        filename: path.to_string_lossy().into_owned(),
        source,
    })?;
    Ok(parse_env_file_content(&content))
}

/// Inline `env_file` contents into each service's `environment` mapping.
///
/// Explicit `environment` entries win over file entries; among files,
/// later entries in the `env_file` list win. With `discard_env_files`, the
/// `env_file` key is dropped once resolved.
pub fn resolve_services_environment(project: &mut Project, discard_env_files: bool) -> Result<()> {
    let working_dir = project.working_dir.clone();
    let services = match project.services_mut() {
        Some(services) => services,
        None => return Ok(()),
    };

    for service in services.values_mut() {
        let service = match service.as_mapping_mut() {
            Some(service) => service,
            None => continue,
        };

        let env_files: Vec<String> = service
            .get("env_file")
            .and_then(Value::as_sequence)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if env_files.is_empty() {
            continue;
        }

        let mut resolved: IndexMap<String, Value> = IndexMap::new();
        for file in &env_files {
            let path = if Path::new(file).is_absolute() {
                Path::new(file).to_path_buf()
            } else {
                working_dir.join(file)
            };
            for (key, value) in parse_env_file(&path)? {
                resolved.insert(key, Value::String(value));
            }
        }

        // Explicit environment wins over file contents.
        if let Some(environment) = service.get("environment") {
            for (key, value) in environment_entries(environment) {
                resolved.insert(key, value);
            }
        }

        service.insert("environment".to_string(), Value::Mapping(resolved));
        if discard_env_files {
            service.shift_remove("env_file");
        }
    }

    Ok(())
}

/// Flatten an environment declaration (mapping or `KEY=VALUE` sequence)
/// into ordered entries. Bare keys map to null, meaning "pass through from
/// the host environment".
fn environment_entries(environment: &Value) -> Vec<(String, Value)> {
    match environment {
        Value::Mapping(entries) => entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        Value::Sequence(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|item| match item.split_once('=') {
                Some((key, value)) => (key.to_string(), Value::String(value.to_string())),
                None => (item.to_string(), Value::Null),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Drop services whose profiles are not activated.
///
/// A service with no `profiles` is always active; otherwise at least one
/// of its profiles must be in the requested set.
pub fn apply_profiles(project: &mut Project, profiles: &[String]) {
    let services = match project.services_mut() {
        Some(services) => services,
        None => return,
    };
    services.retain(|_, service| {
        let declared = service
            .get("profiles")
            .and_then(Value::as_sequence)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        declared.is_empty() || declared.iter().any(|p| profiles.contains(p))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_file_content() {
        let vars = parse_env_file_content(
            "# comment\nA=1\nexport B=two\nC=\"quoted value\"\nD='single'\n\nMALFORMED\n",
        );
        assert_eq!(vars.len(), 4);
        assert_eq!(vars["A"], "1");
        assert_eq!(vars["B"], "two");
        assert_eq!(vars["C"], "quoted value");
        assert_eq!(vars["D"], "single");
    }

    #[test]
    fn test_environment_entries_from_sequence() {
        let environment = Value::Sequence(vec![Value::from("A=1"), Value::from("PASSTHROUGH")]);
        let entries = environment_entries(&environment);
        assert_eq!(entries[0], ("A".to_string(), Value::from("1")));
        assert_eq!(entries[1], ("PASSTHROUGH".to_string(), Value::Null));
    }
}
