//! Observability ingest keys. The raw token is shown once at creation
//! (`obsk_` prefix); only its SHA-256 hash is stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use wd_core::types::WorkspaceId;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKeyRecord {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
    pub key_prefix: String,
    pub key_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct ApiKeyStore {
    pool: PgPool
}

impl ApiKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a key and return the record plus the raw token. The token
    /// cannot be recovered later.
    pub async fn create(
        &self,
        workspace_id: WorkspaceId,
        name: &str
    ) -> Result<(ApiKeyRecord, String), sqlx::Error> {
        let token = format!("obsk_{}", Uuid::new_v4().simple());
        let prefix: String = token.chars().take(10).collect();

        let record: ApiKeyRecord = sqlx::query_as(
            "INSERT INTO obs_api_keys (workspace_id, name, key_prefix, key_hash)
             VALUES ($1, $2, $3, $4)
             RETURNING *"
        )
        .bind(workspace_id.as_i64())
        .bind(name)
        .bind(&prefix)
        .bind(hash_token(&token))
        .fetch_one(&self.pool)
        .await?;

        Ok((record, token))
    }

    pub async fn count_active(&self, workspace_id: WorkspaceId) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM obs_api_keys WHERE workspace_id = $1 AND is_active"
        )
        .bind(workspace_id.as_i64())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Resolve a bearer token to its workspace. Stamps `last_used_at` on
    /// a hit.
    pub async fn authenticate(&self, token: &str) -> Result<Option<WorkspaceId>, sqlx::Error> {
        if !token.starts_with("obsk_") {
            return Ok(None);
        }
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE obs_api_keys SET last_used_at = NOW()
             WHERE key_hash = $1 AND is_active
             RETURNING workspace_id"
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id,)| WorkspaceId::new(id)))
    }

    pub async fn deactivate(
        &self,
        workspace_id: WorkspaceId,
        key_id: i64
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE obs_api_keys SET is_active = FALSE WHERE id = $1 AND workspace_id = $2"
        )
        .bind(key_id)
        .bind(workspace_id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_hex() {
        let a = hash_token("obsk_abc");
        let b = hash_token("obsk_abc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_token("obsk_abd"));
    }
}
