// SPDX-License-Identifier: EUPL-1.2

//! PostgreSQL-backed secret store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};

use super::secrets::{
    children_of, normalize_dir, GetSecretResult, ListResult, Secret, SecretMetadata,
    SecretsManager,
};
use crate::error::{ConsoleError, Result};

pub struct PgSecretsManager {
    pool: PgPool,
}

impl PgSecretsManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecretsManager for PgSecretsManager {
    async fn list(&self, path: &str) -> Result<ListResult> {
        let prefix = normalize_dir(path);
        let paths: Vec<String> = sqlx::query_scalar(
            "SELECT path FROM secrets WHERE left(path, length($1)) = $1 ORDER BY path",
        )
        .bind(&prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(children_of(&prefix, paths.iter().map(String::as_str)))
    }

    async fn get(&self, path: &str) -> Result<GetSecretResult> {
        let row = sqlx::query_as::<_, (Json<Secret>, i32, DateTime<Utc>, DateTime<Utc>)>(
            "SELECT secret, version, created_at, updated_at FROM secrets WHERE path = $1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ConsoleError::SecretNotFound(path.to_string()))?;

        let (Json(secret), version, created_time, updated_time) = row;

        Ok(GetSecretResult {
            secret,
            metadata: SecretMetadata {
                created_time,
                updated_time,
                version,
            },
        })
    }

    async fn put(&self, path: &str, secret: Secret) -> Result<()> {
        sqlx::query(
            "INSERT INTO secrets (path, secret, version)
             VALUES ($1, $2, 1)
             ON CONFLICT (path) DO UPDATE
             SET secret = EXCLUDED.secret, version = secrets.version + 1, updated_at = NOW()",
        )
        .bind(path)
        .bind(Json(&secret))
        .execute(&self.pool)
        .await?;

        tracing::debug!("Stored secret {path}");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM secrets WHERE path = $1")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
