// SPDX-License-Identifier: EUPL-1.2

//! Wildcard matching of STS role session names.
//!
//! Only `*` is special; everything else is matched literally and the whole
//! string must match.

use regex::{escape, Regex};

fn pattern_from_wildcard(wildcard: &str) -> String {
    let body = wildcard
        .split('*')
        .map(escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{body}$")
}

pub fn wildcard_matches(wildcard: &str, target: &str) -> bool {
    if !wildcard.contains('*') {
        return target == wildcard;
    }
    Regex::new(&pattern_from_wildcard(wildcard)).is_ok_and(|re| re.is_match(target))
}

/// A bookmark restricted to no role session names applies to every role.
pub fn matches_any_session_name(patterns: &[String], role_session_name: Option<&str>) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let Some(role_session_name) = role_session_name else {
        return false;
    };
    patterns
        .iter()
        .any(|pattern| wildcard_matches(pattern, role_session_name))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        assert_eq!(pattern_from_wildcard(""), "^$");
        assert_eq!(pattern_from_wildcard("a.b"), r"^a\.b$");
    }

    #[test]
    fn test_multi_wildcard_pattern() {
        assert_eq!(pattern_from_wildcard("*"), "^.*$");
        assert_eq!(pattern_from_wildcard("prod*"), "^prod.*$");
        assert_eq!(pattern_from_wildcard("a*c*"), "^a.*c.*$");
    }

    #[test]
    fn test_session_names() {
        let prod = vec!["prod-*".to_string()];
        assert!(matches_any_session_name(&prod, Some("prod-123")));
        assert!(!matches_any_session_name(&prod, Some("staging-1")));
        assert!(!matches_any_session_name(&prod, None));
        assert!(matches_any_session_name(&[], Some("staging-1")));
        assert!(matches_any_session_name(&[], None));
    }

    #[test]
    fn test_literal_is_not_a_regex() {
        assert!(wildcard_matches("a.c", "a.c"));
        assert!(!wildcard_matches("a.c", "abc"));
        assert!(!wildcard_matches("a.*", "abc"));
    }
}
