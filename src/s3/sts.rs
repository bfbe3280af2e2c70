// SPDX-License-Identifier: EUPL-1.2

//! Region-declared STS role templates and their resolution.

use std::future::Future;

use serde::{Deserialize, Serialize};

use super::claims::{ClaimSpec, DecodedIdToken};
use super::template::substitute;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StsRoleTemplate {
    #[serde(rename = "roleARN")]
    pub role_arn: String,
    pub role_session_name: String,
    pub profile_name: String,
    #[serde(flatten)]
    pub claim: ClaimSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStsRole {
    #[serde(rename = "roleARN")]
    pub role_arn: String,
    pub role_session_name: String,
    pub profile_name: String,
}

pub async fn resolve_templated_sts_role<F, Fut>(
    template: &StsRoleTemplate,
    get_decoded_id_token: F,
) -> Result<Vec<ResolvedStsRole>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<DecodedIdToken>>,
{
    if template.claim.claim_name.is_none() {
        return Ok(vec![ResolvedStsRole {
            role_arn: template.role_arn.clone(),
            role_session_name: template.role_session_name.clone(),
            profile_name: template.profile_name.clone(),
        }]);
    }

    let decoded_id_token = get_decoded_id_token().await?;
    let matches = template.claim.resolve(&decoded_id_token)?.unwrap_or_default();

    Ok(matches
        .iter()
        .map(|m| ResolvedStsRole {
            role_arn: substitute(&template.role_arn, m),
            role_session_name: substitute(&template.role_session_name, m),
            profile_name: substitute(&template.profile_name, m),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn team_groups_become_roles() {
        let template: StsRoleTemplate = serde_json::from_value(json!({
            "roleARN": "arn:aws:iam::123456789012:role/$1",
            "roleSessionName": "session-$1",
            "profileName": "$1",
            "claimName": "groups",
            "includedClaimPattern": "^team-(.+)$",
        }))
        .unwrap();

        let roles = resolve_templated_sts_role(&template, || async {
            Ok(json!({ "groups": ["team-alpha", "other"] }).as_object().cloned().unwrap())
        })
        .await
        .unwrap();

        assert_eq!(
            roles,
            vec![ResolvedStsRole {
                role_arn: "arn:aws:iam::123456789012:role/alpha".into(),
                role_session_name: "session-alpha".into(),
                profile_name: "alpha".into(),
            }]
        );
    }

    #[tokio::test]
    async fn literal_role_ignores_token() {
        let template: StsRoleTemplate = serde_json::from_value(json!({
            "roleARN": "arn:aws:iam::123456789012:role/$1",
            "roleSessionName": "onyxia",
            "profileName": "default",
        }))
        .unwrap();

        let roles = resolve_templated_sts_role(&template, || async {
            Err(crate::error::ConsoleError::Unauthenticated("no token".into()))
        })
        .await
        .unwrap();

        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].role_arn, "arn:aws:iam::123456789012:role/$1");
    }

    #[tokio::test]
    async fn no_matching_claim_yields_no_role() {
        let template: StsRoleTemplate = serde_json::from_value(json!({
            "roleARN": "r",
            "roleSessionName": "s",
            "profileName": "p",
            "claimName": "groups",
        }))
        .unwrap();

        let roles = resolve_templated_sts_role(&template, || async {
            Ok(json!({ "sub": "abc" }).as_object().cloned().unwrap())
        })
        .await
        .unwrap();

        assert!(roles.is_empty());
    }
}
