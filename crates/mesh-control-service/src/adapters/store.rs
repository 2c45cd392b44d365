//! Synced object storage
//!
//! The pipeline only needs `create`; [`SqlObjectStore`] additionally exposes
//! read helpers for the query side.

use async_trait::async_trait;
use chrono::Utc;
use mesh_control_core::SyncedObject;
#[cfg(test)]
use mockall::automock;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from object storage
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Insert-only sink for synced objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create(&self, object: &SyncedObject) -> StoreResult<()>;
}

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS synced_objects (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    kind             TEXT NOT NULL,
    api_version      TEXT NOT NULL,
    cluster_id       TEXT NOT NULL,
    namespace        TEXT NOT NULL,
    name             TEXT NOT NULL,
    uid              TEXT NOT NULL,
    resource_version TEXT NOT NULL,
    object           TEXT NOT NULL,
    ingested_at      TEXT NOT NULL
)
"#;

/// SQLite-backed object store
#[derive(Debug, Clone)]
pub struct SqlObjectStore {
    pool: SqlitePool,
}

impl SqlObjectStore {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    #[instrument]
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database, kept on a single long-lived connection.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Number of stored records.
    pub async fn count(&self) -> StoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM synced_objects")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Stored objects in insertion order, optionally filtered by kind.
    pub async fn list(&self, kind: Option<&str>, limit: i64) -> StoreResult<Vec<SyncedObject>> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query("SELECT object FROM synced_objects WHERE kind = ? ORDER BY id LIMIT ?")
                    .bind(kind)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT object FROM synced_objects ORDER BY id LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter()
            .map(|row| -> StoreResult<SyncedObject> {
                let raw: String = row.try_get("object")?;
                Ok(serde_json::from_str(&raw)?)
            })
            .collect()
    }
}

#[async_trait]
impl ObjectStore for SqlObjectStore {
    async fn create(&self, object: &SyncedObject) -> StoreResult<()> {
        let document = serde_json::to_string(object)?;
        sqlx::query(
            "INSERT INTO synced_objects \
             (kind, api_version, cluster_id, namespace, name, uid, resource_version, object, ingested_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&object.kind)
        .bind(&object.api_version)
        .bind(&object.cluster_id)
        .bind(&object.metadata.namespace)
        .bind(&object.metadata.name)
        .bind(&object.metadata.uid)
        .bind(&object.metadata.resource_version)
        .bind(document)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(object = %object.display_key(), "Stored synced object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(kind: &str, name: &str) -> SyncedObject {
        SyncedObject::from_value(json!({
            "kind": kind,
            "apiVersion": "v1",
            "metadata": { "name": name, "namespace": "default" }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_in_order() {
        let store = SqlObjectStore::in_memory().await.unwrap();
        store.create(&object("Pod", "a")).await.unwrap();
        store.create(&object("Service", "b")).await.unwrap();
        store.create(&object("Pod", "c")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 3);

        let all = store.list(None, 10).await.unwrap();
        let names: Vec<_> = all.iter().map(|o| o.metadata.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);

        let pods = store.list(Some("Pod"), 10).await.unwrap();
        assert_eq!(pods.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_objects_are_appended() {
        let store = SqlObjectStore::in_memory().await.unwrap();
        let pod = object("Pod", "a");
        store.create(&pod).await.unwrap();
        store.create(&pod).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
