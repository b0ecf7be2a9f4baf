//! Validation of the canonical tree and cross-entity consistency checks.

use compose_yaml::{TreePath, Value};

use crate::error::{LoadError, Result};
use crate::model::Project;

/// Re-validate the merged, canonical tree.
///
/// Canonicalization promises long forms everywhere; this is the check that
/// the promise held, with breadcrumbs for anything a transform let
/// through.
pub fn validate_model(tree: &Value) -> Result<()> {
    let services = match tree.get("services").and_then(Value::as_mapping) {
        Some(services) => services,
        None => return Ok(()),
    };

    for (name, service) in services {
        let path = TreePath::root().child("services").child(name);
        let service = match service.as_mapping() {
            Some(service) => service,
            None => continue,
        };

        if let Some(ports) = service.get("ports").and_then(Value::as_sequence) {
            for (i, port) in ports.iter().enumerate() {
                if !port.is_mapping() {
                    return Err(LoadError::InvalidModel(format!(
                        "{} must be a mapping, got {}",
                        path.child("ports").indexed(i),
                        port.type_name()
                    )));
                }
            }
        }

        if let Some(volumes) = service.get("volumes").and_then(Value::as_sequence) {
            for (i, volume) in volumes.iter().enumerate() {
                let target = volume.get("target").and_then(Value::as_str);
                if target.is_none() {
                    return Err(LoadError::InvalidModel(format!(
                        "{} must declare a target",
                        path.child("volumes").indexed(i),
                    )));
                }
            }
        }

    }

    Ok(())
}

/// Cross-entity reference checks over the finished model.
pub fn check_consistency(project: &Project) -> Result<()> {
    let service_names: Vec<&str> = project.services().map(|(name, _)| name).collect();

    for (name, service) in project.services() {
        let has_image = service.get("image").and_then(Value::as_str).is_some();
        let has_build = service.get("build").is_some();
        if !has_image && !has_build {
            return Err(LoadError::InvalidModel(format!(
                "service {:?} has neither an image nor a build context specified",
                name
            )));
        }

        if let Some(dependencies) = service.get("depends_on").and_then(Value::as_mapping) {
            for dependency in dependencies.keys() {
                if !service_names.contains(&dependency.as_str()) {
                    return Err(LoadError::InvalidModel(format!(
                        "service {:?} depends on undefined service {:?}",
                        name, dependency
                    )));
                }
            }
        }

        if let Some(mode) = service.get("network_mode").and_then(Value::as_str) {
            if let Some(target) = mode.strip_prefix("service:") {
                if !service_names.contains(&target) {
                    return Err(LoadError::InvalidModel(format!(
                        "service {:?} shares the network of undefined service {:?}",
                        name, target
                    )));
                }
            }
        }

        if let Some(networks) = service.get("networks") {
            let referenced: Vec<&str> = match networks {
                Value::Sequence(entries) => {
                    entries.iter().filter_map(Value::as_str).collect()
                }
                Value::Mapping(entries) => entries.keys().map(String::as_str).collect(),
                _ => Vec::new(),
            };
            for network in referenced {
                if !project.has_resource("networks", network) {
                    return Err(LoadError::InvalidModel(format!(
                        "service {:?} refers to undefined network {:?}",
                        name, network
                    )));
                }
            }
        }

        if let Some(volumes) = service.get("volumes").and_then(Value::as_sequence) {
            for volume in volumes {
                let is_named = volume.get("type").and_then(Value::as_str) == Some("volume");
                let source = volume.get("source").and_then(Value::as_str);
                if let (true, Some(source)) = (is_named, source) {
                    if !project.has_resource("volumes", source) {
                        return Err(LoadError::InvalidModel(format!(
                            "service {:?} refers to undefined volume {:?}",
                            name, source
                        )));
                    }
                }
            }
        }

        for (section, key) in [("secrets", "secrets"), ("configs", "configs")] {
            if let Some(refs) = service.get(key).and_then(Value::as_sequence) {
                for entry in refs {
                    let referenced = match entry {
                        Value::String(source) => Some(source.as_str()),
                        Value::Mapping(m) => m.get("source").and_then(Value::as_str),
                        _ => None,
                    };
                    if let Some(referenced) = referenced {
                        if !project.has_resource(section, referenced) {
                            return Err(LoadError::InvalidModel(format!(
                                "service {:?} refers to undefined {} {:?}",
                                name,
                                section.trim_end_matches('s'),
                                referenced
                            )));
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
