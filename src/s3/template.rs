// SPDX-License-Identifier: EUPL-1.2

//! `$N` placeholder substitution for claim-driven templates.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::claims::ResolvedMatch;

/// A string shown to users, either plain or translated per language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedString {
    Plain(String),
    ByLanguage(BTreeMap<String, String>),
}

impl From<&str> for LocalizedString {
    fn from(value: &str) -> Self {
        LocalizedString::Plain(value.to_string())
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\$(\d+)").expect("placeholder pattern is valid"))
}

/// Replace every `$N` with capture group `N` of the match, or with nothing
/// when the group does not exist.
pub fn substitute(template: &str, resolved_match: &ResolvedMatch) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|index| resolved_match.capture_groups.get(index))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

pub fn substitute_localized(
    template: &LocalizedString,
    resolved_match: &ResolvedMatch,
) -> LocalizedString {
    match template {
        LocalizedString::Plain(s) => LocalizedString::Plain(substitute(s, resolved_match)),
        LocalizedString::ByLanguage(by_language) => LocalizedString::ByLanguage(
            by_language
                .iter()
                .map(|(language, s)| (language.clone(), substitute(s, resolved_match)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(groups: &[&str]) -> ResolvedMatch {
        ResolvedMatch {
            value: groups[0].to_string(),
            capture_groups: groups.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn whole_match_placeholder() {
        assert_eq!(substitute("$0", &resolved(&["X"])), "X");
    }

    #[test]
    fn numbered_groups_and_missing_ones() {
        let m = resolved(&["team-alpha", "alpha"]);
        assert_eq!(substitute("session-$1", &m), "session-alpha");
        assert_eq!(substitute("s3://bucket/$1/$7/", &m), "s3://bucket/alpha//");
        assert_eq!(substitute("no placeholder", &m), "no placeholder");
    }

    #[test]
    fn localized_strings_are_rewritten_per_language() {
        let m = resolved(&["team-alpha", "alpha"]);
        let template = LocalizedString::ByLanguage(BTreeMap::from([
            ("en".to_string(), "Team $1".to_string()),
            ("fr".to_string(), "Équipe $1".to_string()),
        ]));
        let LocalizedString::ByLanguage(out) = substitute_localized(&template, &m) else {
            panic!("language map expected");
        };
        assert_eq!(out["en"], "Team alpha");
        assert_eq!(out["fr"], "Équipe alpha");
    }
}
