//! Embedded relationship-based access-control engine
//!
//! Owns the tuple store and answers `check` / `write` against a
//! provisioned store and model. Relation evaluation is recursive userset
//! resolution over the model's union expressions with a bounded depth.

pub mod cache;

pub use cache::CheckCache;

use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::dsl::AuthorizationSchema;
use crate::error::{EmbedError, Result};
use crate::storage::TupleStore;
use crate::types::{Fact, ModelDescriptor, ReadinessReport, StoreDescriptor};

/// Engine construction options.
///
/// All evaluation-cost limits live here, passed once at construction
/// time; there is no process-wide mutable configuration.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Time-to-live for cached check results
    pub check_cache_ttl: Duration,

    /// Maximum number of cached check results
    pub check_cache_capacity: usize,

    /// Maximum userset-resolution depth before evaluation gives up
    pub max_resolution_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            check_cache_ttl: Duration::from_secs(300),
            check_cache_capacity: 10_000,
            max_resolution_depth: 25,
        }
    }
}

/// The authorization engine: PDP (`check`) and PAP (`write`) over a
/// tuple store
pub struct RebacEngine {
    store: Arc<dyn TupleStore>,
    check_cache: CheckCache,
    schemas: DashMap<String, Arc<AuthorizationSchema>>,
    options: EngineOptions,
}

impl RebacEngine {
    /// Create an engine over a tuple store
    pub fn new(store: Arc<dyn TupleStore>, options: EngineOptions) -> Self {
        info!(
            cache_ttl_secs = options.check_cache_ttl.as_secs(),
            max_resolution_depth = options.max_resolution_depth,
            "engine initialized"
        );
        Self {
            store,
            check_cache: CheckCache::new(options.check_cache_ttl, options.check_cache_capacity),
            schemas: DashMap::new(),
            options,
        }
    }

    /// Probe whether the engine can serve requests
    pub async fn is_ready(&self) -> Result<ReadinessReport> {
        self.store.ping().await?;
        Ok(ReadinessReport::ready())
    }

    /// List stores, optionally filtered by exact name, oldest first
    pub async fn list_stores(&self, name: Option<&str>) -> Result<Vec<StoreDescriptor>> {
        self.store.list_stores(name).await
    }

    /// Create a store with a fresh engine-assigned id
    pub async fn create_store(&self, name: &str) -> Result<StoreDescriptor> {
        self.store.create_store(name).await
    }

    /// List authorization models for a store, newest first
    pub async fn list_models(&self, store_id: &str) -> Result<Vec<ModelDescriptor>> {
        let models = self.store.list_models(store_id).await?;
        for model in &models {
            self.schemas
                .entry(model.id.clone())
                .or_insert_with(|| Arc::new(model.schema.clone()));
        }
        Ok(models)
    }

    /// Write an authorization model for a store
    pub async fn write_model(
        &self,
        store_id: &str,
        schema: &AuthorizationSchema,
    ) -> Result<ModelDescriptor> {
        let model = self.store.create_model(store_id, schema).await?;
        self.schemas
            .insert(model.id.clone(), Arc::new(schema.clone()));
        Ok(model)
    }

    /// Evaluate whether `fact` holds, directly or through a derived
    /// relation.
    pub async fn check(&self, store_id: &str, model_id: &str, fact: &Fact) -> Result<bool> {
        if let Some(allowed) = self.check_cache.get(store_id, model_id, fact) {
            debug!(object = %fact.object, relation = %fact.relation, "check cache hit");
            return Ok(allowed);
        }

        let schema = self.schema_for(store_id, model_id).await?;
        let allowed = self
            .resolve(
                store_id,
                schema,
                fact.clone(),
                self.options.max_resolution_depth,
            )
            .await?;

        self.check_cache.put(store_id, model_id, fact, allowed);
        debug!(
            object = %fact.object,
            relation = %fact.relation,
            subject = %fact.subject,
            allowed,
            "check evaluated"
        );
        Ok(allowed)
    }

    /// Write a batch of facts in a single all-or-nothing transaction.
    ///
    /// Every fact is validated against the model before anything is
    /// written. A duplicate anywhere in the batch rejects the whole batch
    /// with [`EmbedError::WriteConflict`].
    pub async fn write(&self, store_id: &str, model_id: &str, facts: &[Fact]) -> Result<()> {
        let schema = self.schema_for(store_id, model_id).await?;
        for fact in facts {
            validate_against_schema(&schema, fact)?;
        }

        self.store.write_tuples(store_id, facts).await?;

        // Cached denies may have been invalidated by this write.
        self.check_cache.clear();
        Ok(())
    }

    /// Release the engine's backing resources; idempotent
    pub async fn close(&self) {
        self.store.close().await;
    }

    async fn schema_for(&self, store_id: &str, model_id: &str) -> Result<Arc<AuthorizationSchema>> {
        if let Some(schema) = self.schemas.get(model_id) {
            return Ok(schema.clone());
        }

        let models = self.store.list_models(store_id).await?;
        for model in models {
            let schema = Arc::new(model.schema);
            self.schemas.insert(model.id.clone(), schema.clone());
            if model.id == model_id {
                return Ok(schema);
            }
        }
        Err(EmbedError::EvaluationError(format!(
            "model '{model_id}' not found in store '{store_id}'"
        )))
    }

    /// Recursive userset resolution: a fact holds if its tuple exists
    /// directly or if any relation the model derives it from holds.
    fn resolve<'a>(
        &'a self,
        store_id: &'a str,
        schema: Arc<AuthorizationSchema>,
        fact: Fact,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            if depth == 0 {
                debug!(object = %fact.object, relation = %fact.relation, "resolution depth exhausted");
                return Ok(false);
            }

            if self.store.tuple_exists(store_id, &fact).await? {
                return Ok(true);
            }

            let object_type = fact.object_type()?;
            let type_def = schema.type_definition(object_type).ok_or_else(|| {
                EmbedError::EvaluationError(format!("type '{object_type}' is not in the model"))
            })?;
            let relation = type_def.relations.get(&fact.relation).ok_or_else(|| {
                EmbedError::EvaluationError(format!(
                    "relation '{}' is not defined on type '{object_type}'",
                    fact.relation
                ))
            })?;

            for computed in relation.computed.clone() {
                let derived = Fact {
                    object: fact.object.clone(),
                    relation: computed,
                    subject: fact.subject.clone(),
                };
                if self
                    .resolve(store_id, schema.clone(), derived, depth - 1)
                    .await?
                {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }
}

/// A fact is writable only if its object type and relation exist in the
/// model and the subject's type may be directly assigned to the relation.
fn validate_against_schema(schema: &AuthorizationSchema, fact: &Fact) -> Result<()> {
    let object_type = fact.object_type()?;
    let subject_type = fact.subject_type()?;

    let type_def = schema.type_definition(object_type).ok_or_else(|| {
        EmbedError::EvaluationError(format!("type '{object_type}' is not in the model"))
    })?;
    let relation = type_def.relations.get(&fact.relation).ok_or_else(|| {
        EmbedError::EvaluationError(format!(
            "relation '{}' is not defined on type '{object_type}'",
            fact.relation
        ))
    })?;
    if !relation.direct_types.iter().any(|t| t == subject_type) {
        return Err(EmbedError::EvaluationError(format!(
            "subject type '{subject_type}' may not be assigned to '{}' on '{object_type}'",
            fact.relation
        )));
    }
    Ok(())
}
