//! Idempotent store and model provisioning
//!
//! Both operations are create-or-lookup: the first boot creates, every
//! later boot is a pure lookup with no writes. Neither takes a
//! cross-process lock, so two processes racing the very first creation
//! can produce duplicate names; "take the first by list order" then picks
//! a stable winner per store, but which one won the race is not
//! deterministic. Single-writer-at-a-time deployments are assumed.

use tracing::debug;

use crate::dsl;
use crate::engine::RebacEngine;
use crate::error::{EmbedError, Result};
use crate::types::{ModelDescriptor, StoreDescriptor};

/// Ensure a store named `name` exists, returning its stable descriptor.
///
/// Zero matches create a store; one or more matches reuse the first by
/// list order. Never creates a duplicate for an existing name, and never
/// reconciles stores that happen to share one.
pub async fn ensure_store(engine: &RebacEngine, name: &str) -> Result<StoreDescriptor> {
    let stores = engine
        .list_stores(Some(name))
        .await
        .map_err(|e| EmbedError::ProvisioningError(format!("failed to list stores: {e}")))?;

    match stores.into_iter().next() {
        Some(store) => {
            debug!(store_name = name, store_id = %store.id, "store found");
            Ok(store)
        }
        None => {
            let store = engine
                .create_store(name)
                .await
                .map_err(|e| EmbedError::ProvisioningError(format!("failed to create store: {e}")))?;
            debug!(store_name = name, store_id = %store.id, "store created");
            Ok(store)
        }
    }
}

/// Ensure the store has an authorization model, returning its descriptor.
///
/// The DSL is parsed first; malformed input fails with
/// [`EmbedError::ModelParseError`] and is never retried. A store with no
/// models gets the parsed schema written; otherwise the first existing
/// model is reused as-is, without comparing it against the freshly parsed
/// DSL. Schema drift between restarts is therefore silently ignored once
/// a model exists.
pub async fn ensure_model(
    engine: &RebacEngine,
    store_id: &str,
    dsl_text: &str,
) -> Result<ModelDescriptor> {
    let schema = dsl::parse(dsl_text)?;

    let models = engine
        .list_models(store_id)
        .await
        .map_err(|e| EmbedError::ProvisioningError(format!("failed to list models: {e}")))?;

    match models.into_iter().next() {
        Some(model) => {
            debug!(model_id = %model.id, "authorization model found");
            Ok(model)
        }
        None => {
            let model = engine.write_model(store_id, &schema).await.map_err(|e| {
                EmbedError::ProvisioningError(format!("failed to write the authorization model: {e}"))
            })?;
            debug!(model_id = %model.id, "authorization model created");
            Ok(model)
        }
    }
}
