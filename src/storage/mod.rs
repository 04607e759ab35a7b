//! Tuple storage backends
//!
//! The engine talks to its backing store through the [`TupleStore`]
//! trait. [`SqliteStore`] is the production backend; [`MemoryStore`]
//! backs tests and ephemeral embedders that do not need persistence.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dsl::AuthorizationSchema;
use crate::error::{EmbedError, Result};
use crate::types::{Fact, ModelDescriptor, ReadinessReport, StoreDescriptor};

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Backing store for stores, models, and relationship tuples
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// Probe whether the store is usable, with a structured reason when not
    async fn is_ready(&self) -> Result<ReadinessReport>;

    /// Cheap liveness check used by the engine readiness probe
    async fn ping(&self) -> Result<()>;

    /// Create a store with an engine-assigned id
    async fn create_store(&self, name: &str) -> Result<StoreDescriptor>;

    /// List stores, optionally filtered by exact name, oldest first
    async fn list_stores(&self, name: Option<&str>) -> Result<Vec<StoreDescriptor>>;

    /// Write an authorization model for a store
    async fn create_model(
        &self,
        store_id: &str,
        schema: &AuthorizationSchema,
    ) -> Result<ModelDescriptor>;

    /// List models for a store, newest first
    async fn list_models(&self, store_id: &str) -> Result<Vec<ModelDescriptor>>;

    /// Write a batch of tuples in a single transaction.
    ///
    /// All-or-nothing: if any tuple in the batch already exists, the whole
    /// batch is rejected with [`EmbedError::WriteConflict`] and nothing is
    /// written.
    async fn write_tuples(&self, store_id: &str, facts: &[Fact]) -> Result<()>;

    /// Whether a tuple exists verbatim
    async fn tuple_exists(&self, store_id: &str, fact: &Fact) -> Result<bool>;

    /// Release the backing connection; idempotent
    async fn close(&self);
}

#[derive(Default)]
struct MemoryState {
    stores: Vec<StoreDescriptor>,
    models: Vec<ModelDescriptor>,
    tuples: HashSet<(String, Fact)>,
}

/// In-memory tuple store
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TupleStore for MemoryStore {
    async fn is_ready(&self) -> Result<ReadinessReport> {
        Ok(ReadinessReport::ready())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_store(&self, name: &str) -> Result<StoreDescriptor> {
        let descriptor = StoreDescriptor {
            name: name.to_string(),
            id: Uuid::new_v4().to_string(),
        };
        let mut state = self.state.write().await;
        state.stores.push(descriptor.clone());
        Ok(descriptor)
    }

    async fn list_stores(&self, name: Option<&str>) -> Result<Vec<StoreDescriptor>> {
        let state = self.state.read().await;
        Ok(state
            .stores
            .iter()
            .filter(|s| name.map_or(true, |n| s.name == n))
            .cloned()
            .collect())
    }

    async fn create_model(
        &self,
        store_id: &str,
        schema: &AuthorizationSchema,
    ) -> Result<ModelDescriptor> {
        let descriptor = ModelDescriptor {
            id: Uuid::new_v4().to_string(),
            store_id: store_id.to_string(),
            schema: schema.clone(),
        };
        let mut state = self.state.write().await;
        state.models.push(descriptor.clone());
        Ok(descriptor)
    }

    async fn list_models(&self, store_id: &str) -> Result<Vec<ModelDescriptor>> {
        let state = self.state.read().await;
        Ok(state
            .models
            .iter()
            .rev()
            .filter(|m| m.store_id == store_id)
            .cloned()
            .collect())
    }

    async fn write_tuples(&self, store_id: &str, facts: &[Fact]) -> Result<()> {
        let mut state = self.state.write().await;
        // Staged separately so a duplicate anywhere, including within the
        // batch itself, rejects the whole batch and writes nothing.
        let mut staged: HashSet<(String, Fact)> = HashSet::new();
        for fact in facts {
            let key = (store_id.to_string(), fact.clone());
            if state.tuples.contains(&key) || !staged.insert(key) {
                return Err(EmbedError::WriteConflict(format!(
                    "tuple {}#{}@{} already exists",
                    fact.object, fact.relation, fact.subject
                )));
            }
        }
        state.tuples.extend(staged);
        Ok(())
    }

    async fn tuple_exists(&self, store_id: &str, fact: &Fact) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.tuples.contains(&(store_id.to_string(), fact.clone())))
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_creation_and_lookup() {
        let store = MemoryStore::new();

        let created = store.create_store("acme").await.unwrap();
        assert!(!created.id.is_empty());

        let found = store.list_stores(Some("acme")).await.unwrap();
        assert_eq!(found, vec![created]);

        assert!(store.list_stores(Some("other")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        let sd = store.create_store("acme").await.unwrap();

        let existing = Fact::new("document:1", "editor", "user:alice");
        store.write_tuples(&sd.id, &[existing.clone()]).await.unwrap();

        let fresh = Fact::new("document:2", "editor", "user:bob");
        let err = store
            .write_tuples(&sd.id, &[fresh.clone(), existing])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::WriteConflict(_)));

        // The fresh fact must not have been written either.
        assert!(!store.tuple_exists(&sd.id, &fresh).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_within_batch_conflicts() {
        let store = MemoryStore::new();
        let sd = store.create_store("acme").await.unwrap();

        let fact = Fact::new("document:1", "editor", "user:alice");
        let err = store
            .write_tuples(&sd.id, &[fact.clone(), fact.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::WriteConflict(_)));

        assert!(!store.tuple_exists(&sd.id, &fact).await.unwrap());
    }
}
