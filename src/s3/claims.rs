// SPDX-License-Identifier: EUPL-1.2

//! Identity-claim resolution.
//!
//! A claim-driven template names a claim of the decoded id token, and
//! optionally an inclusion and an exclusion pattern. Every claim value that
//! survives the exclusion pattern and matches the inclusion pattern yields one
//! [`ResolvedMatch`], carrying the regex capture groups used later by
//! [`super::template`] for `$N` substitution.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConsoleError, Result};

/// Claims of a decoded id token, as produced by the identity provider.
pub type DecodedIdToken = Map<String, Value>;

const DEFAULT_INCLUDED_CLAIM_PATTERN: &str = "^(.+)$";

/// Claim selection shared by bookmark and STS role templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSpec {
    /// When unset the owning template is not claim-driven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included_claim_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_claim_pattern: Option<String>,
}

/// One claim value that passed the filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMatch {
    pub value: String,
    /// Index 0 is the whole match. Groups that did not participate are empty.
    pub capture_groups: Vec<String>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| ConsoleError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Look a claim up by name, walking a dot-path into nested objects and
/// arrays when the name itself is not a top-level claim.
pub fn lookup_claim<'a>(decoded_id_token: &'a DecodedIdToken, claim_name: &str) -> Option<&'a Value> {
    if let Some(value) = decoded_id_token.get(claim_name) {
        return Some(value);
    }

    if !claim_name.contains('.') {
        return None;
    }

    let mut segments = claim_name.split('.');
    let mut current = decoded_id_token.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn invalid_claim(decoded_id_token: &DecodedIdToken, claim_name: &str) -> ConsoleError {
    ConsoleError::InvalidClaim {
        claim_name: claim_name.to_string(),
        token_dump: serde_json::to_string_pretty(decoded_id_token)
            .unwrap_or_else(|_| format!("{decoded_id_token:?}")),
    }
}

/// Resolve `claim_name` against the token and filter its values.
///
/// An absent or falsy claim is not an error and yields no match. A claim
/// that is neither a string nor an array of strings is a configuration error.
pub fn resolve_claim(
    decoded_id_token: &DecodedIdToken,
    claim_name: &str,
    included_claim_pattern: Option<&str>,
    excluded_claim_pattern: Option<&str>,
) -> Result<Vec<ResolvedMatch>> {
    let value = match lookup_claim(decoded_id_token, claim_name) {
        Some(value) if !is_falsy(value) => value,
        _ => return Ok(Vec::new()),
    };

    let values: Vec<&str> = match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid_claim(decoded_id_token, claim_name))?,
        _ => return Err(invalid_claim(decoded_id_token, claim_name)),
    };

    let included = compile(included_claim_pattern.unwrap_or(DEFAULT_INCLUDED_CLAIM_PATTERN))?;
    let excluded = excluded_claim_pattern.map(compile).transpose()?;

    let matches = values
        .into_iter()
        .filter(|value| !excluded.as_ref().is_some_and(|re| re.is_match(value)))
        .filter_map(|value| {
            let captures = included.captures(value)?;
            Some(ResolvedMatch {
                value: value.to_string(),
                capture_groups: captures
                    .iter()
                    .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect(),
            })
        })
        .collect();

    Ok(matches)
}

impl ClaimSpec {
    /// `None` when the template is not claim-driven.
    pub fn resolve(&self, decoded_id_token: &DecodedIdToken) -> Result<Option<Vec<ResolvedMatch>>> {
        let Some(claim_name) = self.claim_name.as_deref() else {
            return Ok(None);
        };

        resolve_claim(
            decoded_id_token,
            claim_name,
            self.included_claim_pattern.as_deref(),
            self.excluded_claim_pattern.as_deref(),
        )
        .map(Some)
    }
}
