//! String-template substitution for `${VAR}` forms.
//!
//! A hand-rolled scanner rather than a regex: defaults and alternates can
//! nest further `${…}` forms (`${HOST:-${FALLBACK}}`), which is not a
//! regular language.
//!
//! Supported forms:
//!
//! - `${VAR}`, `$VAR`: value, or empty when unset
//! - `${VAR:-DEF}`: `DEF` when unset or empty
//! - `${VAR-DEF}`: `DEF` when unset
//! - `${VAR:?MSG}` / `${VAR?MSG}`: error when unset (or empty, for `:?`)
//! - `${VAR:+ALT}` / `${VAR+ALT}`: `ALT` when set (and non-empty, for `:+`)
//! - `$$`: a literal `$`

use std::fmt;

/// Result type alias for substitution.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Errors produced during substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// Malformed `$` syntax; carries the whole offending template.
    InvalidTemplate { template: String },

    /// A `${VAR:?MSG}` / `${VAR?MSG}` requirement failed.
    MissingRequired { name: String, message: String },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::InvalidTemplate { template } => {
                write!(f, "Invalid template: {}", template)
            }
            TemplateError::MissingRequired { name, message } => {
                write!(f, "required variable {} is missing a value", name)?;
                if !message.is_empty() {
                    write!(f, ": {}", message)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// Substitute every variable form in `template`.
///
/// Substitution is idempotent on fully resolved strings: with no `$` left,
/// the input comes back unchanged.
pub fn substitute<L>(template: &str, lookup: &L) -> Result<String>
where
    L: Fn(&str) -> Option<String> + ?Sized,
{
    let chars: Vec<char> = template.chars().collect();
    substitute_chars(&chars, template, lookup)
}

fn substitute_chars<L>(chars: &[char], template: &str, lookup: &L) -> Result<String>
where
    L: Fn(&str) -> Option<String> + ?Sized,
{
    let invalid = || TemplateError::InvalidTemplate {
        template: template.to_string(),
    };

    let mut out = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '$' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let next = *chars.get(i + 1).ok_or_else(invalid)?;
        match next {
            '$' => {
                out.push('$');
                i += 2;
            }
            '{' => {
                let close = find_closing_brace(chars, i + 2).ok_or_else(invalid)?;
                let inner: Vec<char> = chars[i + 2..close].to_vec();
                out.push_str(&expand_braced(&inner, template, lookup)?);
                i = close + 1;
            }
            c if is_name_start(c) => {
                let mut end = i + 1;
                while end < chars.len() && is_name_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[i + 1..end].iter().collect();
                out.push_str(&lookup(&name).unwrap_or_default());
                i = end;
            }
            _ => return Err(invalid()),
        }
    }
    Ok(out)
}

/// Find the `}` closing a `${` opened just before `start`, skipping over
/// nested `${…}` forms.
fn find_closing_brace(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 1;
    let mut i = start;
    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
            depth += 1;
            i += 2;
            continue;
        }
        if chars[i] == '}' {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

fn expand_braced<L>(inner: &[char], template: &str, lookup: &L) -> Result<String>
where
    L: Fn(&str) -> Option<String> + ?Sized,
{
    let invalid = || TemplateError::InvalidTemplate {
        template: template.to_string(),
    };

    let mut name_end = 0;
    while name_end < inner.len() && is_name_char(inner[name_end]) {
        name_end += 1;
    }
    if name_end == 0 || !is_name_start(inner[0]) {
        return Err(invalid());
    }

    let name: String = inner[..name_end].iter().collect();
    let value = lookup(&name);

    if name_end == inner.len() {
        return Ok(value.unwrap_or_default());
    }

    // Operator: one of :- :? :+ or their single-character variants.
    let rest = &inner[name_end..];
    let (colon, op) = match rest[0] {
        ':' if rest.len() >= 2 => (true, rest[1]),
        ':' => return Err(invalid()),
        c => (false, c),
    };
    let operand: String = rest[if colon { 2 } else { 1 }..].iter().collect();

    let set = value.is_some();
    let set_and_non_empty = value.as_deref().is_some_and(|v| !v.is_empty());

    match op {
        '-' => {
            let use_value = if colon { set_and_non_empty } else { set };
            if use_value {
                Ok(value.unwrap_or_default())
            } else {
                substitute(&operand, lookup)
            }
        }
        '?' => {
            let satisfied = if colon { set_and_non_empty } else { set };
            if satisfied {
                Ok(value.unwrap_or_default())
            } else {
                Err(TemplateError::MissingRequired {
                    name,
                    message: operand,
                })
            }
        }
        '+' => {
            let use_alternate = if colon { set_and_non_empty } else { set };
            if use_alternate {
                substitute(&operand, lookup)
            } else {
                Ok(String::new())
            }
        }
        _ => Err(invalid()),
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn sub(template: &str, pairs: &[(&str, &str)]) -> Result<String> {
        let vars = env(pairs);
        substitute(template, &move |name: &str| vars.get(name).cloned())
    }

    #[test]
    fn test_plain_forms() {
        assert_eq!(sub("image: $TAG", &[("TAG", "v1")]).unwrap(), "image: v1");
        assert_eq!(sub("image: ${TAG}", &[("TAG", "v1")]).unwrap(), "image: v1");
        assert_eq!(sub("image: ${TAG}", &[]).unwrap(), "image: ");
    }

    #[test]
    fn test_no_variables_is_identity() {
        assert_eq!(sub("plain text", &[]).unwrap(), "plain text");
    }

    #[test]
    fn test_escaped_dollar() {
        assert_eq!(sub("cost: $$5", &[]).unwrap(), "cost: $5");
        assert_eq!(sub("$$TAG", &[("TAG", "v1")]).unwrap(), "$TAG");
    }

    #[test]
    fn test_default_when_unset_or_empty() {
        assert_eq!(sub("${TAG:-latest}", &[]).unwrap(), "latest");
        assert_eq!(sub("${TAG:-latest}", &[("TAG", "")]).unwrap(), "latest");
        assert_eq!(sub("${TAG:-latest}", &[("TAG", "v1")]).unwrap(), "v1");
    }

    #[test]
    fn test_default_when_unset_only() {
        assert_eq!(sub("${TAG-latest}", &[]).unwrap(), "latest");
        assert_eq!(sub("${TAG-latest}", &[("TAG", "")]).unwrap(), "");
        assert_eq!(sub("${TAG-latest}", &[("TAG", "v1")]).unwrap(), "v1");
    }

    #[test]
    fn test_nested_default() {
        assert_eq!(
            sub("${HOST:-${FALLBACK}}", &[("FALLBACK", "localhost")]).unwrap(),
            "localhost"
        );
    }

    #[test]
    fn test_required() {
        assert_eq!(sub("${VAR:?no var}", &[("VAR", "x")]).unwrap(), "x");
        assert_eq!(
            sub("${VAR:?no var}", &[]).unwrap_err(),
            TemplateError::MissingRequired {
                name: "VAR".to_string(),
                message: "no var".to_string(),
            }
        );
        // `?` accepts empty values, `:?` does not.
        assert_eq!(sub("${VAR?msg}", &[("VAR", "")]).unwrap(), "");
        assert!(sub("${VAR:?msg}", &[("VAR", "")]).is_err());
    }

    #[test]
    fn test_required_error_message() {
        let err = sub("${VAR:?}", &[]).unwrap_err();
        assert_eq!(err.to_string(), "required variable VAR is missing a value");
        let err = sub("${VAR:?set me}", &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "required variable VAR is missing a value: set me"
        );
    }

    #[test]
    fn test_alternate() {
        assert_eq!(sub("${VAR:+alt}", &[("VAR", "x")]).unwrap(), "alt");
        assert_eq!(sub("${VAR:+alt}", &[("VAR", "")]).unwrap(), "");
        assert_eq!(sub("${VAR:+alt}", &[]).unwrap(), "");
        assert_eq!(sub("${VAR+alt}", &[("VAR", "")]).unwrap(), "alt");
    }

    #[test]
    fn test_invalid_templates() {
        for template in ["${", "${}", "${1VAR}", "${VAR.x}", "$ ", "trailing $"] {
            assert_eq!(
                sub(template, &[]).unwrap_err(),
                TemplateError::InvalidTemplate {
                    template: template.to_string(),
                },
                "template {:?} should be invalid",
                template
            );
        }
    }

    #[test]
    fn test_idempotent_on_resolved_strings() {
        let resolved = sub("app:${TAG:-latest}", &[]).unwrap();
        assert_eq!(resolved, "app:latest");
        assert_eq!(sub(&resolved, &[]).unwrap(), resolved);
    }
}
