//! Structural validation of a single parsed file.
//!
//! This checks the shapes the pipeline itself depends on before extends
//! and merging run; the raw tree may still carry short forms at this
//! point. Errors are plain messages; the loader wraps them with the
//! offending filename.

use compose_yaml::{TreePath, Value};
use tracing::warn;

const TOP_LEVEL_SECTIONS: &[&str] = &["services", "volumes", "networks", "secrets", "configs"];

/// Validate one file's tree, before merging.
pub fn validate(tree: &Value) -> Result<(), String> {
    let root = match tree.as_mapping() {
        Some(root) => root,
        None => return Err("Top-level object must be a mapping".to_string()),
    };

    if root.contains_key("version") {
        warn!("the `version` field is obsolete and ignored");
    }

    if let Some(name) = root.get("name") {
        if !name.is_null() && name.as_str().is_none() {
            return Err(format!("name must be a string, got {}", name.type_name()));
        }
    }

    if let Some(include) = root.get("include") {
        if !include.is_sequence() {
            return Err(format!(
                "include must be a sequence, got {}",
                include.type_name()
            ));
        }
    }

    for section in TOP_LEVEL_SECTIONS {
        if let Some(value) = root.get(*section) {
            if !value.is_mapping() && !value.is_null() {
                return Err(format!(
                    "{} must be a mapping, got {}",
                    section,
                    value.type_name()
                ));
            }
        }
    }

    if let Some(services) = root.get("services").and_then(Value::as_mapping) {
        for (name, service) in services {
            let path = TreePath::root().child("services").child(name);
            validate_service(service, &path)?;
        }
    }

    Ok(())
}

fn validate_service(service: &Value, path: &TreePath) -> Result<(), String> {
    let service = match service {
        Value::Mapping(entries) => entries,
        Value::Null => return Ok(()),
        other => {
            return Err(format!(
                "{} must be a mapping, got {}",
                path,
                other.type_name()
            ))
        }
    };

    if let Some(ports) = service.get("ports") {
        if !ports.is_sequence() {
            return Err(format!(
                "{}.ports must be a sequence, got {}",
                path,
                ports.type_name()
            ));
        }
    }

    if let Some(environment) = service.get("environment") {
        if !environment.is_mapping() && !environment.is_sequence() {
            return Err(format!(
                "{}.environment must be a mapping or a sequence, got {}",
                path,
                environment.type_name()
            ));
        }
    }

    if let Some(env_file) = service.get("env_file") {
        if env_file.as_str().is_none() && !env_file.is_sequence() {
            return Err(format!(
                "{}.env_file must be a string or a sequence, got {}",
                path,
                env_file.type_name()
            ));
        }
    }

    if let Some(extends) = service.get("extends") {
        match extends {
            Value::String(_) => {}
            Value::Mapping(directive) => {
                if directive.get("service").and_then(Value::as_str).is_none() {
                    return Err(format!("{}.extends requires a service name", path));
                }
            }
            other => {
                return Err(format!(
                    "{}.extends must be a string or a mapping, got {}",
                    path,
                    other.type_name()
                ))
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use compose_yaml::parse_documents;

    fn check(yaml: &str) -> Result<(), String> {
        validate(&parse_documents(yaml).unwrap().remove(0).root)
    }

    #[test]
    fn test_minimal_file_is_valid() {
        assert!(check("services:\n  web:\n    image: nginx\n").is_ok());
    }

    #[test]
    fn test_null_sections_are_valid() {
        assert!(check("services:\n  web:\n    image: nginx\nvolumes:\n").is_ok());
    }

    #[test]
    fn test_scalar_services_section_fails() {
        let err = check("services: nope\n").unwrap_err();
        assert_eq!(err, "services must be a mapping, got string");
    }

    #[test]
    fn test_scalar_service_fails() {
        let err = check("services:\n  web: nginx\n").unwrap_err();
        assert_eq!(err, "services.web must be a mapping, got string");
    }

    #[test]
    fn test_scalar_ports_fails() {
        let err = check("services:\n  web:\n    ports: 80\n").unwrap_err();
        assert_eq!(err, "services.web.ports must be a sequence, got integer");
    }

    #[test]
    fn test_non_string_name_fails() {
        let err = check("name: 42\nservices: {}\n").unwrap_err();
        assert_eq!(err, "name must be a string, got integer");
    }

    #[test]
    fn test_extends_without_service_fails() {
        let err = check("services:\n  web:\n    extends:\n      file: other.yml\n").unwrap_err();
        assert_eq!(err, "services.web.extends requires a service name");
    }
}
