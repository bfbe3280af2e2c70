// SPDX-License-Identifier: EUPL-1.2

//! Process configuration read from the environment.

use std::path::Path;

use anyhow::Context;

use crate::s3::region::DeploymentRegion;

/// How bearer tokens are verified before their claims are used.
#[derive(Debug, Clone, Default)]
pub struct TokenSettings {
    /// PEM public key of the identity provider.
    pub public_key_pem: Option<String>,
    /// Shared secret, for providers signing with HMAC.
    pub hmac_secret: Option<String>,
    /// Defaults to RS256 with a public key, HS256 with a secret.
    pub algorithm: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Accept tokens without checking their signature. Only for deployments
    /// where a gateway in front of the console verifies every token.
    pub trust_gateway: bool,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub listen_addr: String,
    pub database_url: Option<String>,
    pub region_config: Option<String>,
    pub vault_top_dir: String,
    pub groups_claim: String,
    pub username_claim: String,
    pub token: TokenSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3200".into(),
            database_url: None,
            region_config: None,
            vault_top_dir: "onyxia".into(),
            groups_claim: "groups".into(),
            username_claim: "preferred_username".into(),
            token: TokenSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Self {
            listen_addr: var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: var("DATABASE_URL"),
            region_config: var("REGION_CONFIG"),
            vault_top_dir: var("VAULT_TOP_DIR")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.vault_top_dir),
            groups_claim: var("GROUPS_CLAIM").unwrap_or(defaults.groups_claim),
            username_claim: var("USERNAME_CLAIM").unwrap_or(defaults.username_claim),
            token: TokenSettings {
                public_key_pem: var("OIDC_PUBLIC_KEY"),
                hmac_secret: var("OIDC_HMAC_SECRET"),
                algorithm: var("OIDC_ALGORITHM"),
                issuer: var("OIDC_ISSUER"),
                audience: var("OIDC_AUDIENCE"),
                trust_gateway: var("TRUST_GATEWAY_TOKENS")
                    .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
            },
        }
    }

    /// The deployment region, or an empty one when none is configured.
    pub fn load_region(&self) -> anyhow::Result<DeploymentRegion> {
        match &self.region_config {
            Some(path) => load_region_file(Path::new(path)),
            None => {
                tracing::info!("REGION_CONFIG not set, the region declares no S3 profiles");
                Ok(DeploymentRegion::default())
            }
        }
    }
}

pub fn load_region_file(path: &Path) -> anyhow::Result<DeploymentRegion> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading region config {}", path.display()))?;
    let region: DeploymentRegion = serde_json::from_str(&raw)
        .with_context(|| format!("parsing region config {}", path.display()))?;
    tracing::info!(
        "Loaded region '{}' with {} S3 profile template(s)",
        region.id,
        region.s3_profiles.len()
    );
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_file_is_parsed() {
        let path = std::env::temp_dir().join(format!("region-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"{
                "id": "paris",
                "s3Profiles": [{
                    "profileName": "minio",
                    "url": "https://minio.example.org",
                    "sts": { "oidcParams": { "clientId": "onyxia-minio" } }
                }]
            }"#,
        )
        .unwrap();

        let region = load_region_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(region.id, "paris");
        assert_eq!(region.s3_profiles[0].profile_name, "minio");
        assert!(region.s3_profiles[0].bookmarks.is_empty());
    }

    #[test]
    fn malformed_region_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("region-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_region_file(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_region_config_yields_empty_region() {
        let region = Settings::default().load_region().unwrap();
        assert!(region.s3_profiles.is_empty());
    }
}
