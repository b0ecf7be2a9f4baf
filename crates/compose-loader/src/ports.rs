//! Canonicalization of port declarations.

use compose_yaml::{TreePath, Value};
use indexmap::IndexMap;

use crate::error::{LoadError, Result};

/// Rewrite a `ports` sequence into long form.
///
/// The whole list is processed rather than individual entries: one short
/// entry can expand to several canonical entries when it declares a range.
pub fn transform_ports(data: Value, path: &TreePath) -> Result<Value> {
    let entries = match data {
        Value::Sequence(entries) => entries,
        other => {
            return Err(LoadError::InvalidModel(format!(
                "{}: invalid type {} for port",
                path,
                other.type_name()
            )))
        }
    };

    let mut ports = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Value::Int(i) => expand_port_spec(&i.to_string(), path, &mut ports)?,
            Value::String(spec) => expand_port_spec(&spec, path, &mut ports)?,
            mapping @ Value::Mapping(_) => ports.push(mapping),
            other => {
                return Err(LoadError::InvalidModel(format!(
                    "{}: invalid type {} for port",
                    path,
                    other.type_name()
                )))
            }
        }
    }
    Ok(Value::Sequence(ports))
}

/// Parse a short-form port spec into one or more canonical entries.
///
/// Grammar: `[host_ip:][published[-published]:]target[-target][/protocol]`.
/// The published side stays a string in canonical form; the target is an
/// integer.
fn expand_port_spec(spec: &str, path: &TreePath, out: &mut Vec<Value>) -> Result<()> {
    let invalid = |reason: &str| {
        LoadError::InvalidModel(format!("{}: invalid port {:?}: {}", path, spec, reason))
    };

    let (addr, protocol) = match spec.split_once('/') {
        Some((addr, protocol)) if !protocol.is_empty() => (addr, protocol),
        Some(_) => return Err(invalid("empty protocol")),
        None => (spec, "tcp"),
    };

    // Split from the right: the last part is the target, the one before it
    // the published port, anything left is the host address (which may
    // itself contain colons, e.g. an IPv6 address).
    let parts: Vec<&str> = addr.split(':').collect();
    let (host_ip, published, target) = match parts.len() {
        1 => (None, None, parts[0]),
        2 => (None, non_empty(parts[0]), parts[1]),
        n => (
            Some(parts[..n - 2].join(":")),
            non_empty(parts[n - 2]),
            parts[n - 1],
        ),
    };
    let host_ip = host_ip.map(|ip| ip.trim_start_matches('[').trim_end_matches(']').to_string());

    let targets = parse_range(target).ok_or_else(|| invalid("invalid target port"))?;
    let published = match published {
        Some(p) => Some(parse_range(p).ok_or_else(|| invalid("invalid published port"))?),
        None => None,
    };

    if let Some(published) = &published {
        if published.len() != targets.len() {
            return Err(invalid("published and target ranges differ in length"));
        }
    }

    for (i, target) in targets.iter().enumerate() {
        let mut entry = IndexMap::new();
        entry.insert("mode".to_string(), Value::from("ingress"));
        if let Some(ip) = &host_ip {
            entry.insert("host_ip".to_string(), Value::String(ip.clone()));
        }
        entry.insert("target".to_string(), Value::Int(*target));
        if let Some(published) = &published {
            entry.insert(
                "published".to_string(),
                Value::String(published[i].to_string()),
            );
        }
        entry.insert("protocol".to_string(), Value::String(protocol.to_string()));
        out.push(Value::Mapping(entry));
    }
    Ok(())
}

fn non_empty(part: &str) -> Option<&str> {
    if part.is_empty() {
        None
    } else {
        Some(part)
    }
}

/// Parse `80` or `80-90` into the list of ports it covers.
fn parse_range(part: &str) -> Option<Vec<i64>> {
    match part.split_once('-') {
        Some((start, end)) => {
            let start: i64 = start.parse().ok()?;
            let end: i64 = end.parse().ok()?;
            if start > end {
                return None;
            }
            Some((start..=end).collect())
        }
        None => Some(vec![part.parse().ok()?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports_path() -> TreePath {
        TreePath::root()
            .child("services")
            .child("web")
            .child("ports")
    }

    fn transform(entries: Vec<Value>) -> Vec<Value> {
        match transform_ports(Value::Sequence(entries), &ports_path()).unwrap() {
            Value::Sequence(out) => out,
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    fn field<'a>(entry: &'a Value, name: &str) -> &'a Value {
        entry.get(name).unwrap_or_else(|| panic!("missing {}", name))
    }

    #[test]
    fn test_published_and_target() {
        let out = transform(vec![Value::from("8080:80")]);
        assert_eq!(out.len(), 1);
        assert_eq!(field(&out[0], "target").as_int(), Some(80));
        assert_eq!(field(&out[0], "published").as_str(), Some("8080"));
        assert_eq!(field(&out[0], "protocol").as_str(), Some("tcp"));
        assert_eq!(field(&out[0], "mode").as_str(), Some("ingress"));
        assert!(out[0].get("host_ip").is_none());
    }

    #[test]
    fn test_target_only() {
        let out = transform(vec![Value::from(80)]);
        assert_eq!(out.len(), 1);
        assert_eq!(field(&out[0], "target").as_int(), Some(80));
        assert!(out[0].get("published").is_none());
    }

    #[test]
    fn test_protocol_suffix() {
        let out = transform(vec![Value::from("53:53/udp")]);
        assert_eq!(field(&out[0], "protocol").as_str(), Some("udp"));
    }

    #[test]
    fn test_host_ip() {
        let out = transform(vec![Value::from("127.0.0.1:8080:80")]);
        assert_eq!(field(&out[0], "host_ip").as_str(), Some("127.0.0.1"));
        assert_eq!(field(&out[0], "published").as_str(), Some("8080"));
    }

    #[test]
    fn test_ipv6_host() {
        let out = transform(vec![Value::from("[::1]:8080:80")]);
        assert_eq!(field(&out[0], "host_ip").as_str(), Some("::1"));
        assert_eq!(field(&out[0], "target").as_int(), Some(80));
    }

    #[test]
    fn test_host_ip_with_random_published_port() {
        let out = transform(vec![Value::from("127.0.0.1::80")]);
        assert_eq!(field(&out[0], "host_ip").as_str(), Some("127.0.0.1"));
        assert!(out[0].get("published").is_none());
    }

    #[test]
    fn test_range_expands_to_multiple_entries() {
        let out = transform(vec![Value::from("8080-8082:80-82")]);
        assert_eq!(out.len(), 3);
        assert_eq!(field(&out[0], "target").as_int(), Some(80));
        assert_eq!(field(&out[0], "published").as_str(), Some("8080"));
        assert_eq!(field(&out[2], "target").as_int(), Some(82));
        assert_eq!(field(&out[2], "published").as_str(), Some("8082"));
    }

    #[test]
    fn test_mismatched_ranges_fail() {
        let err = transform_ports(
            Value::Sequence(vec![Value::from("8080-8090:80-82")]),
            &ports_path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("differ in length"));
    }

    #[test]
    fn test_long_form_passes_through() {
        let mut entry = IndexMap::new();
        entry.insert("target".to_string(), Value::Int(80));
        let original = Value::Mapping(entry);
        let out = transform(vec![original.clone()]);
        assert_eq!(out[0], original);
    }

    #[test]
    fn test_non_sequence_fails() {
        let err = transform_ports(Value::from("8080:80"), &ports_path()).unwrap_err();
        assert!(err
            .to_string()
            .contains("services.web.ports: invalid type string for port"));
    }

    #[test]
    fn test_garbage_entry_fails() {
        let err =
            transform_ports(Value::Sequence(vec![Value::from("no:t:a:port")]), &ports_path())
                .unwrap_err();
        assert!(err.to_string().contains("invalid port"));
    }
}
