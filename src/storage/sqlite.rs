//! SQLite tuple store implementation

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::dsl::AuthorizationSchema;
use crate::error::{EmbedError, Result};
use crate::storage::TupleStore;
use crate::types::{Fact, ModelDescriptor, ReadinessReport, ReadyReason, StoreDescriptor};

/// SQLite tuple store with connection pooling.
///
/// Connecting does not migrate: a cold database reports
/// [`ReadyReason::SchemaMissing`] from [`TupleStore::is_ready`] until
/// [`run_migrations`] has been applied to the same URI.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a connection pool against `uri`.
    ///
    /// The URI is passed to sqlx verbatim, e.g.
    /// `sqlite:///var/lib/app/authz.db?mode=rwc` or `sqlite::memory:`.
    pub async fn connect(uri: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(3))
            .connect(uri)
            .await
            .map_err(|e| {
                EmbedError::DatastoreUnreachable(format!("failed to open datastore: {e}"))
            })?;

        Ok(Self { pool })
    }
}

/// Apply the schema migrations to the database at `uri`.
///
/// Idempotent: sqlx tracks applied versions in `_sqlx_migrations`, so
/// re-running against an already-migrated database is a no-op success.
/// Process restarts re-enter this path unconditionally.
pub async fn run_migrations(uri: &str) -> Result<()> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(uri)
        .await
        .map_err(|e| EmbedError::Storage(format!("failed to open datastore for migration: {e}")))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| EmbedError::Storage(format!("migration run failed: {e}")))?;

    pool.close().await;
    Ok(())
}

#[async_trait]
impl TupleStore for SqliteStore {
    async fn is_ready(&self) -> Result<ReadinessReport> {
        let row = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'tuples'",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EmbedError::ConnectionError(format!("readiness probe failed: {e}")))?;

        if row.is_none() {
            return Ok(ReadinessReport::not_ready(
                ReadyReason::SchemaMissing,
                "datastore requires migrations",
            ));
        }
        Ok(ReadinessReport::ready())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| EmbedError::ConnectionError(format!("ping failed: {e}")))?;
        Ok(())
    }

    async fn create_store(&self, name: &str) -> Result<StoreDescriptor> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO stores (id, name) VALUES (?, ?)")
            .bind(&id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| EmbedError::Storage(format!("failed to create store: {e}")))?;

        Ok(StoreDescriptor {
            name: name.to_string(),
            id,
        })
    }

    async fn list_stores(&self, name: Option<&str>) -> Result<Vec<StoreDescriptor>> {
        // Oldest first: "take the first" must be stable across boots.
        let rows = match name {
            Some(name) => {
                sqlx::query("SELECT id, name FROM stores WHERE name = ? ORDER BY rowid ASC")
                    .bind(name)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT id, name FROM stores ORDER BY rowid ASC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| EmbedError::Storage(format!("failed to list stores: {e}")))?;

        rows.into_iter()
            .map(|row| {
                Ok(StoreDescriptor {
                    id: row
                        .try_get("id")
                        .map_err(|e| EmbedError::Storage(format!("bad store row: {e}")))?,
                    name: row
                        .try_get("name")
                        .map_err(|e| EmbedError::Storage(format!("bad store row: {e}")))?,
                })
            })
            .collect()
    }

    async fn create_model(
        &self,
        store_id: &str,
        schema: &AuthorizationSchema,
    ) -> Result<ModelDescriptor> {
        let id = Uuid::new_v4().to_string();
        let schema_json = serde_json::to_string(schema)
            .map_err(|e| EmbedError::Storage(format!("failed to serialize schema: {e}")))?;

        sqlx::query("INSERT INTO models (id, store_id, schema_json) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(store_id)
            .bind(&schema_json)
            .execute(&self.pool)
            .await
            .map_err(|e| EmbedError::Storage(format!("failed to write model: {e}")))?;

        Ok(ModelDescriptor {
            id,
            store_id: store_id.to_string(),
            schema: schema.clone(),
        })
    }

    async fn list_models(&self, store_id: &str) -> Result<Vec<ModelDescriptor>> {
        // Newest first, matching the engine's model listing order.
        let rows = sqlx::query(
            "SELECT id, schema_json FROM models WHERE store_id = ? ORDER BY rowid DESC",
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EmbedError::Storage(format!("failed to list models: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let schema_json: String = row
                    .try_get("schema_json")
                    .map_err(|e| EmbedError::Storage(format!("bad model row: {e}")))?;
                let schema: AuthorizationSchema = serde_json::from_str(&schema_json)
                    .map_err(|e| EmbedError::Storage(format!("corrupt stored schema: {e}")))?;
                Ok(ModelDescriptor {
                    id: row
                        .try_get("id")
                        .map_err(|e| EmbedError::Storage(format!("bad model row: {e}")))?,
                    store_id: store_id.to_string(),
                    schema,
                })
            })
            .collect()
    }

    async fn write_tuples(&self, store_id: &str, facts: &[Fact]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EmbedError::Storage(format!("failed to begin transaction: {e}")))?;

        for fact in facts {
            let existing = sqlx::query(
                "SELECT 1 FROM tuples WHERE store_id = ? AND object = ? AND relation = ? AND subject = ?",
            )
            .bind(store_id)
            .bind(&fact.object)
            .bind(&fact.relation)
            .bind(&fact.subject)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| EmbedError::Storage(format!("failed to check tuple: {e}")))?;

            if existing.is_some() {
                // Dropping the transaction rolls back everything written so far.
                return Err(EmbedError::WriteConflict(format!(
                    "tuple {}#{}@{} already exists",
                    fact.object, fact.relation, fact.subject
                )));
            }

            sqlx::query(
                "INSERT INTO tuples (store_id, object, relation, subject) VALUES (?, ?, ?, ?)",
            )
            .bind(store_id)
            .bind(&fact.object)
            .bind(&fact.relation)
            .bind(&fact.subject)
            .execute(&mut *tx)
            .await
            .map_err(|e| EmbedError::Storage(format!("failed to write tuple: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| EmbedError::Storage(format!("failed to commit tuples: {e}")))?;

        debug!(count = facts.len(), "tuple batch written");
        Ok(())
    }

    async fn tuple_exists(&self, store_id: &str, fact: &Fact) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM tuples WHERE store_id = ? AND object = ? AND relation = ? AND subject = ?",
        )
        .bind(store_id)
        .bind(&fact.object)
        .bind(&fact.relation)
        .bind(&fact.subject)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EmbedError::Storage(format!("failed to read tuple: {e}")))?;

        Ok(row.is_some())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
