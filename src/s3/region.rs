// SPDX-License-Identifier: EUPL-1.2

//! Deployment-region S3 profile catalog and its per-user resolution.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::bookmarks::{resolve_templated_bookmark, BookmarkTemplate, ResolvedBookmark};
use super::claims::DecodedIdToken;
use super::hash::stable_id;
use super::sts::{resolve_templated_sts_role, ResolvedStsRole, StsRoleTemplate};
use crate::error::Result;

/// The part of the deployment region this core consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRegion {
    pub id: String,
    #[serde(default)]
    pub s3_profiles: Vec<RegionS3Profile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub oidc_params: OidcParams,
    #[serde(default)]
    pub roles: Vec<StsRoleTemplate>,
}

/// An admin-authored S3 profile template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionS3Profile {
    /// Used when no STS role overrides it.
    pub profile_name: String,
    pub url: String,
    #[serde(default)]
    pub path_style_access: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub sts: RegionSts,
    #[serde(default)]
    pub bookmarks: Vec<BookmarkTemplate>,
}

impl RegionS3Profile {
    /// Stable key of the template: a hash of the endpoint and the OIDC client.
    pub fn key(&self) -> Result<String> {
        self.profile_id(None)
    }

    /// Id of one expansion of the template. Without a role this is the
    /// template key; each role gets its own id.
    pub fn profile_id(&self, role: Option<&ResolvedStsRole>) -> Result<String> {
        match role {
            None => stable_id(&json!({
                "url": self.url,
                "clientId": self.sts.oidc_params.client_id,
            })),
            Some(role) => stable_id(&json!({
                "url": self.url,
                "clientId": self.sts.oidc_params.client_id,
                "profileName": role.profile_name,
            })),
        }
    }
}

/// One resolved STS role with the id of the profile it expands to.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleExpansion {
    pub id: String,
    pub role: ResolvedStsRole,
}

/// A region template together with the bookmarks and roles resolved for the
/// current user.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRegionProfile {
    pub key: String,
    pub template: RegionS3Profile,
    pub bookmarks: Vec<ResolvedBookmark>,
    pub sts_roles: Vec<RoleExpansion>,
}

impl ResolvedRegionProfile {
    pub fn without_bookmarks(&self) -> Self {
        Self {
            bookmarks: Vec::new(),
            ..self.clone()
        }
    }
}

/// Resolve every bookmark and STS role template of the region.
///
/// Templates sharing a key are collapsed, the first one wins.
pub async fn resolve_region_profiles<F, Fut>(
    region: &DeploymentRegion,
    get_decoded_id_token: F,
) -> Result<Vec<ResolvedRegionProfile>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<DecodedIdToken>>,
{
    let mut resolved: Vec<ResolvedRegionProfile> = Vec::with_capacity(region.s3_profiles.len());

    for template in &region.s3_profiles {
        let key = template.key()?;
        if resolved.iter().any(|r| r.key == key) {
            tracing::warn!(
                "Region S3 profile '{}' duplicates the endpoint/client of another one, ignored",
                template.profile_name
            );
            continue;
        }

        let mut bookmarks = Vec::new();
        for bookmark in &template.bookmarks {
            bookmarks.extend(resolve_templated_bookmark(bookmark, &get_decoded_id_token).await?);
        }

        let mut sts_roles = Vec::new();
        for role in &template.sts.roles {
            for role in resolve_templated_sts_role(role, &get_decoded_id_token).await? {
                sts_roles.push(RoleExpansion {
                    id: template.profile_id(Some(&role))?,
                    role,
                });
            }
        }

        tracing::debug!(
            "Resolved region S3 profile '{}': {} bookmark(s), {} role(s)",
            template.profile_name,
            bookmarks.len(),
            sts_roles.len()
        );

        resolved.push(ResolvedRegionProfile {
            key,
            template: template.clone(),
            bookmarks,
            sts_roles,
        });
    }

    Ok(resolved)
}
