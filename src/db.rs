// SPDX-License-Identifier: EUPL-1.2

//! Secret store connection, per-user sessions, and application state.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::error::{ConsoleError, Result};
use crate::identity::{Identity, TokenVerifier};
use crate::project::pg_secrets::PgSecretsManager;
use crate::project::secrets::{MemorySecretsManager, SecretsManager};
use crate::project::store::ProjectConfigStore;
use crate::project::Project;
use crate::s3::client::{DescriptorS3ClientFactory, S3ClientFactory};
use crate::s3::region::DeploymentRegion;
use crate::s3::service::S3ProfilesManagement;

/// Everything one user has selected and loaded.
pub struct Session {
    pub store: ProjectConfigStore,
    pub s3: S3ProfilesManagement,
}

impl Session {
    /// Select `project` and bring the S3 state in line with it.
    pub async fn change_project(&self, project: Project) -> Result<()> {
        self.store.change_project(project).await?;
        self.s3.on_project_changed();
        if self.s3.is_initialized().await {
            self.s3.reconcile_defaults(&self.store).await?;
        }
        Ok(())
    }
}

/// Shared application state injected into every Axum handler.
pub struct AppState {
    /// `None` when the secret store is kept in memory.
    pub pool: Option<PgPool>,
    pub secrets: Arc<dyn SecretsManager>,
    pub settings: Settings,
    pub region: Arc<DeploymentRegion>,
    pub client_factory: Arc<dyn S3ClientFactory>,
    pub verifier: TokenVerifier,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl AppState {
    fn new(
        pool: Option<PgPool>,
        secrets: Arc<dyn SecretsManager>,
        settings: Settings,
        region: DeploymentRegion,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            pool,
            secrets,
            verifier: TokenVerifier::from_settings(&settings.token)?,
            settings,
            region: Arc::new(region),
            client_factory: Arc::new(DescriptorS3ClientFactory),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Connect to PostgreSQL when `DATABASE_URL` is set, otherwise keep
    /// secrets in memory.
    pub async fn connect(settings: Settings, region: DeploymentRegion) -> anyhow::Result<Self> {
        match settings.database_url.clone() {
            Some(url) => {
                let pool = PgPool::connect(&url).await?;
                tracing::info!("Secret store connected to PostgreSQL");
                let secrets = Arc::new(PgSecretsManager::new(pool.clone()));
                Self::new(Some(pool), secrets, settings, region)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, secrets are kept in memory and lost on restart");
                Self::in_memory(settings, region)
            }
        }
    }

    pub fn in_memory(settings: Settings, region: DeploymentRegion) -> anyhow::Result<Self> {
        Self::new(None, Arc::new(MemorySecretsManager::new()), settings, region)
    }

    pub async fn session(&self, identity: &Identity) -> Arc<Session> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(identity.user_id.clone())
            .or_insert_with(|| {
                tracing::debug!("Opening session for {}", identity.user_id);
                Arc::new(Session {
                    store: ProjectConfigStore::new(self.secrets.clone()),
                    s3: S3ProfilesManagement::new(self.region.clone(), self.client_factory.clone()),
                })
            })
            .clone()
    }

    /// The caller's session with a loaded project: the one to reload after a
    /// reset, or the personal project on first use.
    pub async fn ready_session(&self, identity: &Identity) -> Result<Arc<Session>> {
        let session = self.session(identity).await;
        if !session.store.is_ready().await {
            let project = session
                .store
                .current_project()
                .await
                .unwrap_or_else(|| identity.personal_project(&self.settings));
            session.change_project(project).await?;
        }
        Ok(session)
    }

    /// Like [`Self::ready_session`], with the region templates resolved.
    pub async fn s3_session(&self, identity: &Identity) -> Result<Arc<Session>> {
        let session = self.ready_session(identity).await?;
        if !session.s3.is_initialized().await {
            initialize_s3(&session, identity).await?;
        }
        Ok(session)
    }

    pub fn project_of(&self, identity: &Identity, project_id: &str) -> Result<Project> {
        identity
            .projects(&self.settings)?
            .into_iter()
            .find(|p| p.id == project_id)
            .ok_or_else(|| ConsoleError::UnknownProject(project_id.to_string()))
    }
}

pub async fn initialize_s3(session: &Session, identity: &Identity) -> Result<()> {
    let decoded = identity.decoded_id_token.clone();
    session
        .s3
        .initialize(&session.store, move || {
            let decoded = decoded.clone();
            async move { Ok(decoded) }
        })
        .await
}
