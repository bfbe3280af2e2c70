// SPDX-License-Identifier: EUPL-1.2

//! S3 client construction and the per-session client cache.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};

use super::region::OidcParams;
use super::sts::ResolvedStsRole;
use crate::error::{ConsoleError, Result};
use crate::project::configs::S3Credentials;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ResolvedStsRole>,
    pub oidc_params: OidcParams,
}

/// Everything needed to build a client. Compared structurally when looking
/// up credentials test results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ParamsOfCreateS3Client {
    #[serde(rename_all = "camelCase")]
    Sts {
        url: String,
        path_style_access: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
        sts: StsParams,
    },
    #[serde(rename_all = "camelCase")]
    NoSts {
        url: String,
        path_style_access: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<S3Credentials>,
    },
}

impl ParamsOfCreateS3Client {
    pub fn url(&self) -> &str {
        match self {
            ParamsOfCreateS3Client::Sts { url, .. } | ParamsOfCreateS3Client::NoSts { url, .. } => url,
        }
    }
}

/// How the client authenticates against the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClientCredentials {
    Anonymous,
    Static(S3Credentials),
    /// Credentials are minted by exchanging the caller's id token.
    #[serde(rename_all = "camelCase")]
    WebIdentity {
        sts_url: String,
        duration_seconds: Option<u64>,
        role: Option<ResolvedStsRole>,
        oidc_client_id: Option<String>,
    },
}

/// A ready-to-use connection description for one profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Client {
    pub url: String,
    pub path_style_access: bool,
    pub region: Option<String>,
    pub credentials: ClientCredentials,
}

#[async_trait]
pub trait S3ClientFactory: Send + Sync {
    async fn create(&self, params: &ParamsOfCreateS3Client) -> Result<S3Client>;
}

fn validate_endpoint(what: &str, raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ConsoleError::Validation(format!("invalid {what} '{raw}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConsoleError::Validation(format!(
            "{what} '{raw}' must use http or https"
        )));
    }
    Ok(())
}

/// Validates endpoints and hands back descriptors; credentials exchange is
/// left to whoever opens the connection.
#[derive(Debug, Default)]
pub struct DescriptorS3ClientFactory;

#[async_trait]
impl S3ClientFactory for DescriptorS3ClientFactory {
    async fn create(&self, params: &ParamsOfCreateS3Client) -> Result<S3Client> {
        validate_endpoint("S3 endpoint", params.url())?;

        let client = match params {
            ParamsOfCreateS3Client::Sts {
                url,
                path_style_access,
                region,
                sts,
            } => {
                let sts_url = sts.url.clone().unwrap_or_else(|| url.clone());
                validate_endpoint("STS endpoint", &sts_url)?;
                S3Client {
                    url: url.clone(),
                    path_style_access: *path_style_access,
                    region: region.clone(),
                    credentials: ClientCredentials::WebIdentity {
                        sts_url,
                        duration_seconds: sts.duration_seconds,
                        role: sts.role.clone(),
                        oidc_client_id: sts.oidc_params.client_id.clone(),
                    },
                }
            }
            ParamsOfCreateS3Client::NoSts {
                url,
                path_style_access,
                region,
                credentials,
            } => S3Client {
                url: url.clone(),
                path_style_access: *path_style_access,
                region: region.clone(),
                credentials: credentials
                    .clone()
                    .map_or(ClientCredentials::Anonymous, ClientCredentials::Static),
            },
        };

        Ok(client)
    }
}

const MAX_CACHED_CLIENTS: u64 = 256;
const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Clients keyed by profile id, built at most once each.
pub struct S3ClientCache {
    clients: Cache<String, Arc<S3Client>>,
}

impl Default for S3ClientCache {
    fn default() -> Self {
        Self {
            clients: Cache::builder()
                .max_capacity(MAX_CACHED_CLIENTS)
                .time_to_idle(CLIENT_IDLE_TIMEOUT)
                .build(),
        }
    }
}

impl S3ClientCache {
    /// Concurrent callers for the same id share one factory call. Failures
    /// are not cached.
    pub async fn get_or_create(
        &self,
        profile_id: &str,
        factory: &dyn S3ClientFactory,
        params: &ParamsOfCreateS3Client,
    ) -> Result<Arc<S3Client>> {
        self.clients
            .try_get_with(profile_id.to_string(), async {
                tracing::debug!("Creating S3 client for profile {profile_id}");
                factory.create(params).await.map(Arc::new)
            })
            .await
            .map_err(|e| Arc::try_unwrap(e).unwrap_or_else(|shared| anyhow!("{shared}").into()))
    }

    pub async fn evict(&self, profile_id: &str) {
        self.clients.invalidate(profile_id).await;
    }

    pub fn clear(&self) {
        self.clients.invalidate_all();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub(crate) struct CountingFactory {
        pub(crate) created: AtomicUsize,
    }

    #[async_trait]
    impl S3ClientFactory for CountingFactory {
        async fn create(&self, params: &ParamsOfCreateS3Client) -> Result<S3Client> {
            self.created.fetch_add(1, Ordering::SeqCst);
            DescriptorS3ClientFactory.create(params).await
        }
    }

    fn no_sts(url: &str) -> ParamsOfCreateS3Client {
        ParamsOfCreateS3Client::NoSts {
            url: url.into(),
            path_style_access: true,
            region: None,
            credentials: None,
        }
    }

    #[tokio::test]
    async fn clients_are_memoized_per_profile_id() {
        let cache = S3ClientCache::default();
        let factory = CountingFactory::default();
        let params = no_sts("https://minio.example.org");

        let a = cache.get_or_create("p", &factory, &params).await.unwrap();
        let b = cache.get_or_create("p", &factory, &params).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        cache.evict("p").await;
        cache.get_or_create("p", &factory, &params).await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);

        cache.clear();
        cache.get_or_create("p", &factory, &params).await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_creation() {
        let cache = Arc::new(S3ClientCache::default());
        let factory = Arc::new(CountingFactory::default());
        let params = no_sts("https://minio.example.org");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let (cache, factory, params) = (cache.clone(), factory.clone(), params.clone());
                tokio::spawn(async move {
                    cache.get_or_create("p", factory.as_ref(), &params).await.unwrap()
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_creation_is_retried_next_time() {
        let cache = S3ClientCache::default();
        let factory = CountingFactory::default();

        let err = cache
            .get_or_create("p", &factory, &no_sts("not a url"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a url"));
        let client = cache
            .get_or_create("p", &factory, &no_sts("http://localhost:9000"))
            .await
            .unwrap();
        assert_eq!(client.credentials, ClientCredentials::Anonymous);
    }

    #[tokio::test]
    async fn sts_params_produce_web_identity_client() {
        let params = ParamsOfCreateS3Client::Sts {
            url: "https://minio.example.org".into(),
            path_style_access: false,
            region: Some("us-east-1".into()),
            sts: StsParams {
                url: None,
                duration_seconds: Some(3600),
                role: None,
                oidc_params: OidcParams {
                    issuer_uri: None,
                    client_id: Some("minio".into()),
                },
            },
        };
        let client = DescriptorS3ClientFactory.create(&params).await.unwrap();
        match client.credentials {
            ClientCredentials::WebIdentity { sts_url, oidc_client_id, .. } => {
                assert_eq!(sts_url, "https://minio.example.org");
                assert_eq!(oidc_client_id.as_deref(), Some("minio"));
            }
            other => panic!("unexpected credentials: {other:?}"),
        }
    }
}
