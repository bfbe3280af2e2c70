// SPDX-License-Identifier: EUPL-1.2

//! Region-declared bookmark templates and their resolution.

use std::future::Future;

use serde::{Deserialize, Serialize};

use super::claims::{ClaimSpec, DecodedIdToken, ResolvedMatch};
use super::template::{substitute, substitute_localized, LocalizedString};
use super::uri::{parse_s3_uri_prefix, S3UriPrefixObj};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkTemplate {
    pub title: LocalizedString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedString>,
    #[serde(default)]
    pub tags: Vec<LocalizedString>,
    pub s3_uri_prefix: String,
    /// Profile names the bookmark is shown for. Empty means every profile.
    #[serde(default)]
    pub for_profile_names: Vec<String>,
    /// Wildcard patterns over STS role session names. Empty means every role.
    #[serde(default)]
    pub for_sts_role_session_names: Vec<String>,
    #[serde(flatten)]
    pub claim: ClaimSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedBookmark {
    pub title: LocalizedString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedString>,
    #[serde(default)]
    pub tags: Vec<LocalizedString>,
    pub s3_uri_prefix_obj: S3UriPrefixObj,
    #[serde(default)]
    pub for_profile_names: Vec<String>,
    #[serde(default)]
    pub for_sts_role_session_names: Vec<String>,
}

impl ResolvedBookmark {
    pub fn applies_to_profile(&self, profile_name: &str) -> bool {
        self.for_profile_names.is_empty() || self.for_profile_names.iter().any(|n| n == profile_name)
    }
}

impl BookmarkTemplate {
    fn literal(&self) -> Result<ResolvedBookmark> {
        Ok(ResolvedBookmark {
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            s3_uri_prefix_obj: parse_s3_uri_prefix(&self.s3_uri_prefix, true)?,
            for_profile_names: self.for_profile_names.clone(),
            for_sts_role_session_names: self.for_sts_role_session_names.clone(),
        })
    }

    fn instantiate(&self, resolved_match: &ResolvedMatch) -> Result<ResolvedBookmark> {
        Ok(ResolvedBookmark {
            title: substitute_localized(&self.title, resolved_match),
            description: self
                .description
                .as_ref()
                .map(|d| substitute_localized(d, resolved_match)),
            tags: self
                .tags
                .iter()
                .map(|tag| substitute_localized(tag, resolved_match))
                .collect(),
            s3_uri_prefix_obj: parse_s3_uri_prefix(
                &substitute(&self.s3_uri_prefix, resolved_match),
                true,
            )?,
            for_profile_names: self
                .for_profile_names
                .iter()
                .map(|name| substitute(name, resolved_match))
                .collect(),
            for_sts_role_session_names: self.for_sts_role_session_names.clone(),
        })
    }
}

/// Turn one bookmark template into one bookmark per matching claim value,
/// or exactly one when the template is not claim-driven. The token is only
/// fetched for claim-driven templates.
pub async fn resolve_templated_bookmark<F, Fut>(
    template: &BookmarkTemplate,
    get_decoded_id_token: F,
) -> Result<Vec<ResolvedBookmark>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<DecodedIdToken>>,
{
    if template.claim.claim_name.is_none() {
        return Ok(vec![template.literal()?]);
    }

    let decoded_id_token = get_decoded_id_token().await?;
    let matches = template.claim.resolve(&decoded_id_token)?.unwrap_or_default();

    matches
        .iter()
        .map(|resolved_match| template.instantiate(resolved_match))
        .collect()
}
