// SPDX-License-Identifier: EUPL-1.2

//! Caller identity taken from the OIDC id token in the `Authorization` header.
//!
//! Tokens are verified with the identity provider's key before any claim is
//! read. Skipping the signature check is an explicit opt-in for deployments
//! where a gateway has already verified the token.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;

use crate::config::{Settings, TokenSettings};
use crate::db::AppState;
use crate::error::{ConsoleError, Result};
use crate::project::Project;
use crate::s3::claims::{lookup_claim, resolve_claim, DecodedIdToken};

pub fn parse_bearer_token(authorization_header: &str) -> Result<&str> {
    authorization_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ConsoleError::Unauthenticated("No bearer token in request header".into()))
}

fn algorithm_or(settings: &TokenSettings, default: Algorithm) -> anyhow::Result<Algorithm> {
    match &settings.algorithm {
        Some(name) => name
            .parse::<Algorithm>()
            .with_context(|| format!("unsupported OIDC_ALGORITHM '{name}'")),
        None => Ok(default),
    }
}

/// Checks signature, expiry and, when configured, issuer and audience.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn from_settings(settings: &TokenSettings) -> anyhow::Result<Self> {
        let (key, mut validation) = match (&settings.public_key_pem, &settings.hmac_secret) {
            (Some(pem), _) => {
                let algorithm = algorithm_or(settings, Algorithm::RS256)?;
                let key = match algorithm {
                    Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem.as_bytes()),
                    Algorithm::EdDSA => DecodingKey::from_ed_pem(pem.as_bytes()),
                    _ => DecodingKey::from_rsa_pem(pem.as_bytes()),
                }
                .context("parsing OIDC_PUBLIC_KEY")?;
                (key, Validation::new(algorithm))
            }
            (None, Some(secret)) => {
                let algorithm = algorithm_or(settings, Algorithm::HS256)?;
                (DecodingKey::from_secret(secret.as_bytes()), Validation::new(algorithm))
            }
            (None, None) if settings.trust_gateway => {
                tracing::warn!("TRUST_GATEWAY_TOKENS is set, token signatures are not checked");
                let mut validation = Validation::new(algorithm_or(settings, Algorithm::RS256)?);
                validation.insecure_disable_signature_validation();
                (DecodingKey::from_secret(&[]), validation)
            }
            (None, None) => anyhow::bail!(
                "no token verification configured: set OIDC_PUBLIC_KEY or OIDC_HMAC_SECRET, \
                 or TRUST_GATEWAY_TOKENS=true behind a verifying gateway"
            ),
        };

        if let Some(issuer) = &settings.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &settings.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self { key, validation })
    }

    /// The claims of a valid token.
    pub fn verify(&self, jwt: &str) -> Result<DecodedIdToken> {
        let data = decode::<DecodedIdToken>(jwt, &self.key, &self.validation).map_err(|e| {
            tracing::debug!("Rejected bearer token: {e}");
            ConsoleError::Unauthenticated(format!("invalid token: {e}"))
        })?;
        Ok(data.claims)
    }
}

fn string_claim(decoded_id_token: &DecodedIdToken, claim_name: &str) -> Option<String> {
    lookup_claim(decoded_id_token, claim_name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct Identity {
    /// Session key: `sub`, or the username when the token has none.
    pub user_id: String,
    pub username: String,
    pub decoded_id_token: DecodedIdToken,
}

impl Identity {
    pub fn from_bearer(
        authorization_header: &str,
        verifier: &TokenVerifier,
        settings: &Settings,
    ) -> Result<Self> {
        let decoded_id_token = verifier.verify(parse_bearer_token(authorization_header)?)?;

        let username = string_claim(&decoded_id_token, &settings.username_claim).ok_or_else(|| {
            ConsoleError::Unauthenticated(format!("token has no '{}' claim", settings.username_claim))
        })?;
        let user_id = string_claim(&decoded_id_token, "sub").unwrap_or_else(|| username.clone());

        Ok(Self {
            user_id,
            username,
            decoded_id_token,
        })
    }

    pub fn personal_project(&self, settings: &Settings) -> Project {
        Project {
            id: format!("user-{}", self.username),
            name: self.username.clone(),
            group: None,
            vault_top_dir_path: format!("{}/user-{}", settings.vault_top_dir, self.username),
        }
    }

    /// The personal project followed by one project per group.
    pub fn projects(&self, settings: &Settings) -> Result<Vec<Project>> {
        let mut projects = vec![self.personal_project(settings)];

        for group in resolve_claim(&self.decoded_id_token, &settings.groups_claim, None, None)? {
            let id = format!("projet-{}", group.value);
            if projects.iter().any(|p| p.id == id) {
                continue;
            }
            projects.push(Project {
                vault_top_dir_path: format!("{}/{id}", settings.vault_top_dir),
                id,
                name: group.value.clone(),
                group: Some(group.value),
            });
        }

        Ok(projects)
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Identity {
    type Rejection = ConsoleError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ConsoleError::Unauthenticated("No Authorization header".into()))?;

        Identity::from_bearer(header, &state.verifier, &state.settings)
    }
}

#[cfg(test)]
pub(crate) const TEST_SECRET: &str = "console-test-secret";

/// Settings whose tokens are signed with [`TEST_SECRET`].
#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        token: TokenSettings {
            hmac_secret: Some(TEST_SECRET.into()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// HS256 token carrying `claims`, valid for an hour unless `exp` is given.
#[cfg(test)]
pub(crate) fn signed_jwt_with(claims: &Value, secret: &str) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let mut claims = claims.clone();
    if let Value::Object(map) = &mut claims {
        map.entry("exp")
            .or_insert_with(|| Value::from(chrono::Utc::now().timestamp() + 3600));
    }
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

#[cfg(test)]
pub(crate) fn signed_jwt(claims: &Value) -> String {
    signed_jwt_with(claims, TEST_SECRET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // {"alg":"none","typ":"JWT"}.{"preferred_username":"victim","exp":4102444800}.
    const UNSIGNED: &str = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.\
        eyJwcmVmZXJyZWRfdXNlcm5hbWUiOiJ2aWN0aW0iLCJleHAiOjQxMDI0NDQ4MDB9.";

    fn verifier(token: TokenSettings) -> TokenVerifier {
        TokenVerifier::from_settings(&token).unwrap()
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(parse_bearer_token("Bearer abc").unwrap(), "abc");
        assert!(parse_bearer_token("Basic abc").is_err());
        assert!(parse_bearer_token("Bearer ").is_err());
    }

    #[test]
    fn signed_token_is_verified() {
        let verifier = verifier(test_settings().token);
        let decoded = verifier
            .verify(&signed_jwt(&json!({ "sub": "42", "preferred_username": "jdoe" })))
            .unwrap();
        assert_eq!(decoded["preferred_username"], "jdoe");
        assert!(verifier.verify("no-dots").is_err());
    }

    #[test]
    fn forged_tokens_are_rejected() {
        let verifier = verifier(test_settings().token);
        let claims = json!({ "preferred_username": "victim" });

        assert!(matches!(verifier.verify(UNSIGNED), Err(ConsoleError::Unauthenticated(_))));
        assert!(verifier.verify(&signed_jwt_with(&claims, "another-secret")).is_err());

        let expired = json!({
            "preferred_username": "victim",
            "exp": chrono::Utc::now().timestamp() - 3600,
        });
        assert!(verifier.verify(&signed_jwt(&expired)).is_err());
    }

    #[test]
    fn issuer_and_audience_are_checked_when_configured() {
        let verifier = verifier(TokenSettings {
            issuer: Some("https://auth.example.org/realms/onyxia".into()),
            audience: Some("onyxia".into()),
            ..test_settings().token
        });
        let good = json!({
            "iss": "https://auth.example.org/realms/onyxia",
            "aud": "onyxia",
            "preferred_username": "jdoe",
        });
        assert!(verifier.verify(&signed_jwt(&good)).is_ok());

        let mut other_issuer = good.clone();
        other_issuer["iss"] = json!("https://evil.example.org");
        assert!(verifier.verify(&signed_jwt(&other_issuer)).is_err());

        let mut other_audience = good;
        other_audience["aud"] = json!("someone-else");
        assert!(verifier.verify(&signed_jwt(&other_audience)).is_err());
    }

    #[test]
    fn verification_must_be_configured() {
        assert!(TokenVerifier::from_settings(&TokenSettings::default()).is_err());
        assert!(TokenVerifier::from_settings(&TokenSettings {
            public_key_pem: Some("not a pem".into()),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn gateway_trust_skips_only_the_signature() {
        let verifier = verifier(TokenSettings {
            trust_gateway: true,
            algorithm: Some("HS256".into()),
            ..Default::default()
        });
        let claims = json!({ "preferred_username": "jdoe" });
        assert!(verifier.verify(&signed_jwt_with(&claims, "gateway-secret")).is_ok());

        assert!(verifier.verify(UNSIGNED).is_err());
        let expired = json!({ "preferred_username": "jdoe", "exp": 1 });
        assert!(verifier.verify(&signed_jwt(&expired)).is_err());
    }

    #[test]
    fn projects_follow_group_membership() {
        let settings = test_settings();
        let jwt = signed_jwt(&json!({
            "preferred_username": "jdoe",
            "groups": ["alpha", "beta", "alpha"],
        }));
        let identity = Identity::from_bearer(
            &format!("Bearer {jwt}"),
            &verifier(settings.token.clone()),
            &settings,
        )
        .unwrap();
        assert_eq!(identity.user_id, "jdoe");

        let projects = identity.projects(&settings).unwrap();
        let ids: Vec<_> = projects.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["user-jdoe", "projet-alpha", "projet-beta"]);
        assert_eq!(projects[1].vault_top_dir_path, "onyxia/projet-alpha");
        assert_eq!(projects[1].group.as_deref(), Some("alpha"));
    }

    #[test]
    fn username_claim_is_required() {
        let settings = test_settings();
        let jwt = signed_jwt(&json!({ "sub": "42" }));
        let err = Identity::from_bearer(
            &format!("Bearer {jwt}"),
            &verifier(settings.token.clone()),
            &settings,
        )
        .unwrap_err();
        assert!(matches!(err, ConsoleError::Unauthenticated(_)));
    }
}
