//! Restricted XPath subset used by map link paths.
//!
//! A path is a leading '/' followed by one or more steps separated by '/'.
//! Each step is `local` or `prefix:local`; the final step may be an
//! attribute step `@local` / `@prefix:local`. No predicates, axes,
//! wildcards, or functions.

use crate::error::{Error, Result};

/// One parsed path step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step<'a> {
    pub prefix: &'a str,
    pub name: &'a str,
    pub attribute: bool,
}

/// Parse a link path into its steps.
pub fn parse_path(path: &str) -> Result<Vec<Step<'_>>> {
    let bad = || Error::BadPath(path.to_string());

    let rest = path.strip_prefix('/').ok_or_else(bad)?;
    if rest.is_empty() {
        return Err(bad());
    }

    let mut steps = Vec::new();
    for raw in rest.split('/') {
        if raw.is_empty() {
            return Err(bad());
        }
        // Attribute steps are only valid as the final step; reject one in
        // the middle by checking after the loop.
        let (attribute, body) = match raw.strip_prefix('@') {
            Some(b) => (true, b),
            None => (false, raw),
        };
        if body.is_empty() {
            return Err(bad());
        }
        let (prefix, name) = match body.split_once(':') {
            Some((p, n)) => (p, n),
            None => ("", body),
        };
        if name.is_empty() || name.contains(':') {
            return Err(bad());
        }
        steps.push(Step { prefix, name, attribute });
    }

    if steps[..steps.len() - 1].iter().any(|s| s.attribute) {
        return Err(bad());
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_steps() {
        let steps = parse_path("/a/b/c").unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1], Step { prefix: "", name: "b", attribute: false });
    }

    #[test]
    fn test_prefixed_steps() {
        let steps = parse_path("/x:a/y:b").unwrap();
        assert_eq!(steps[0], Step { prefix: "x", name: "a", attribute: false });
        assert_eq!(steps[1], Step { prefix: "y", name: "b", attribute: false });
    }

    #[test]
    fn test_final_attribute_step() {
        let steps = parse_path("/a/b/@n").unwrap();
        assert!(steps[2].attribute);
        assert_eq!(steps[2].name, "n");
    }

    #[test]
    fn test_prefixed_attribute_step() {
        let steps = parse_path("/a/@x:n").unwrap();
        assert_eq!(steps[1], Step { prefix: "x", name: "n", attribute: true });
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(matches!(parse_path(""), Err(Error::BadPath(_))));
        assert!(matches!(parse_path("/"), Err(Error::BadPath(_))));
    }

    #[test]
    fn test_missing_lead_slash_rejected() {
        assert!(matches!(parse_path("a/b"), Err(Error::BadPath(_))));
    }

    #[test]
    fn test_empty_step_rejected() {
        assert!(matches!(parse_path("/a//b"), Err(Error::BadPath(_))));
        assert!(matches!(parse_path("/a/"), Err(Error::BadPath(_))));
    }

    #[test]
    fn test_attribute_mid_path_rejected() {
        assert!(matches!(parse_path("/a/@n/b"), Err(Error::BadPath(_))));
    }

    #[test]
    fn test_bare_at_rejected() {
        assert!(matches!(parse_path("/a/@"), Err(Error::BadPath(_))));
    }
}
