//! The embedded service handle and its bootstrap state machine
//!
//! `EmbeddedAuthz` is the only thing surrounding application code talks
//! to. Construction validates configuration before any I/O; `bootstrap`
//! then runs the whole sequence on the caller's task:
//!
//! ```text
//! Connecting → AwaitingDatastoreReady → (Migrating) → StartingEngine
//!   → AwaitingEngineReady → Provisioning → Ready
//! ```
//!
//! Bootstrap either fully succeeds or fails with a classified error;
//! a handle that never reached `Ready` answers every call with
//! [`EmbedError::NotReady`].

use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::EmbedConfig;
use crate::engine::{EngineOptions, RebacEngine};
use crate::error::{EmbedError, Result};
use crate::provision;
use crate::readiness::{maybe_migrate, wait_until_ready};
use crate::storage::{self, SqliteStore, TupleStore};
use crate::types::{Fact, StoreDescriptor};

enum State {
    /// Constructed and validated; bootstrap has not run
    Idle,
    /// Bootstrap completed; `check` and `write_facts` are valid
    Ready(ReadyState),
    /// Closed; no operation is valid
    Closed,
}

struct ReadyState {
    engine: Arc<RebacEngine>,
    store: StoreDescriptor,
    model_id: String,
}

/// Embedded authorization service handle.
///
/// Owns the engine instance and the backing-store connection for its
/// lifetime. `check` and `write_facts` may be called concurrently once
/// ready; concurrency inside the engine is delegated to the connection
/// pool. `close` is idempotent.
pub struct EmbeddedAuthz {
    config: EmbedConfig,
    dsl_text: String,
    state: RwLock<State>,
}

impl EmbeddedAuthz {
    /// Create a handle from configuration without touching the network.
    ///
    /// Fails with [`EmbedError::ConfigInvalid`] when required fields are
    /// missing or malformed. Call [`bootstrap`](Self::bootstrap) next.
    pub fn new(config: EmbedConfig) -> Result<Self> {
        let dsl_text = config.validate()?;
        Ok(Self {
            config,
            dsl_text,
            state: RwLock::new(State::Idle),
        })
    }

    /// Create a handle and run bootstrap to completion
    pub async fn connect(config: EmbedConfig) -> Result<Self> {
        let handle = Self::new(config)?;
        handle.bootstrap().await?;
        Ok(handle)
    }

    /// Bring the handle from idle to ready.
    ///
    /// Connects the datastore driver, waits for datastore readiness
    /// (running the schema migration once if the probe reports the schema
    /// missing), constructs the engine, waits for engine readiness,
    /// provisions the store and model, and seeds the configured initial
    /// facts with existing facts ignored. Runs on the caller's task; the
    /// two readiness waits and the sleeps between probes are the only
    /// suspension points.
    ///
    /// Calling bootstrap on a ready handle is a no-op.
    pub async fn bootstrap(&self) -> Result<()> {
        let mut state = self.state.write().await;
        match &*state {
            State::Ready(_) => return Ok(()),
            State::Closed => return Err(EmbedError::AlreadyClosed),
            State::Idle => {}
        }

        info!(store_name = %self.config.store_name, "bootstrap started");

        // Connecting
        let store = Arc::new(SqliteStore::connect(&self.config.datastore_uri).await?);
        debug!("datastore driver opened");

        // AwaitingDatastoreReady, with the migration trigger folded into
        // the probe so a cold store gets migrated from inside the loop.
        let datastore_uri = self.config.datastore_uri.clone();
        let probe_store = store.clone();
        wait_until_ready(
            "datastore",
            move || {
                let store = probe_store.clone();
                let uri = datastore_uri.clone();
                async move {
                    let report = store.is_ready().await?;
                    if maybe_migrate(&report, || storage::sqlite::run_migrations(&uri)).await? {
                        return store.is_ready().await;
                    }
                    Ok(report)
                }
            },
            self.config.readiness_timeout(),
            self.config.poll_interval(),
        )
        .await?;

        // StartingEngine
        let engine = Arc::new(RebacEngine::new(
            store,
            EngineOptions {
                check_cache_ttl: self.config.check_cache_ttl(),
                ..EngineOptions::default()
            },
        ));

        // AwaitingEngineReady
        let probe_engine = engine.clone();
        wait_until_ready(
            "engine",
            move || {
                let engine = probe_engine.clone();
                async move { engine.is_ready().await }
            },
            self.config.readiness_timeout(),
            self.config.poll_interval(),
        )
        .await?;

        // Provisioning
        let store_desc = provision::ensure_store(&engine, &self.config.store_name).await?;
        let model = provision::ensure_model(&engine, &store_desc.id, &self.dsl_text).await?;

        if self.config.skip_seeding {
            debug!("fact seeding skipped");
        } else {
            write_batch(
                &engine,
                &store_desc.id,
                &model.id,
                &self.config.initial_facts,
                true,
            )
            .await?;
        }

        info!(
            store_name = %store_desc.name,
            store_id = %store_desc.id,
            model_id = %model.id,
            "bootstrap complete, handle ready"
        );

        *state = State::Ready(ReadyState {
            engine,
            store: store_desc,
            model_id: model.id,
        });
        Ok(())
    }

    /// PDP: is this access allowed?
    ///
    /// The provisioned store and model identifiers are supplied
    /// implicitly; the engine's allow/deny answer is returned verbatim.
    pub async fn check(&self, fact: &Fact) -> Result<bool> {
        let (engine, store_id, model_id) = self.ready_state().await?;
        engine.check(&store_id, &model_id, fact).await
    }

    /// PAP: add access-control facts as a single batch.
    ///
    /// The batch is all-or-nothing at the engine level: if any fact in it
    /// already exists, the engine rejects the entire batch. With
    /// `ignore_existing` that rejection is treated as success, which
    /// means a batch mixing new and already-existing facts writes
    /// nothing; callers needing the new facts must submit them without
    /// the existing ones.
    pub async fn write_facts(&self, facts: &[Fact], ignore_existing: bool) -> Result<()> {
        let (engine, store_id, model_id) = self.ready_state().await?;
        write_batch(&engine, &store_id, &model_id, facts, ignore_existing).await
    }

    /// The provisioned store descriptor
    pub async fn store(&self) -> Result<StoreDescriptor> {
        let state = self.state.read().await;
        match &*state {
            State::Ready(ready) => Ok(ready.store.clone()),
            State::Idle => Err(EmbedError::NotReady),
            State::Closed => Err(EmbedError::AlreadyClosed),
        }
    }

    /// The provisioned authorization model id
    pub async fn model_id(&self) -> Result<String> {
        let (_, _, model_id) = self.ready_state().await?;
        Ok(model_id)
    }

    /// Release the engine and its resources.
    ///
    /// Idempotent: closing twice is a no-op. In-flight calls racing a
    /// close observe [`EmbedError::AlreadyClosed`] or complete.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if let State::Ready(ready) = &*state {
            ready.engine.close().await;
            info!("handle closed");
        }
        *state = State::Closed;
        Ok(())
    }

    async fn ready_state(&self) -> Result<(Arc<RebacEngine>, String, String)> {
        let state = self.state.read().await;
        match &*state {
            State::Ready(ready) => Ok((
                ready.engine.clone(),
                ready.store.id.clone(),
                ready.model_id.clone(),
            )),
            State::Idle => Err(EmbedError::NotReady),
            State::Closed => Err(EmbedError::AlreadyClosed),
        }
    }
}

impl fmt::Debug for EmbeddedAuthz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Non-blocking: a handle mid-bootstrap or mid-close reports "busy".
        let state = match self.state.try_read() {
            Ok(guard) => match &*guard {
                State::Idle => "idle",
                State::Ready(_) => "ready",
                State::Closed => "closed",
            },
            Err(_) => "busy",
        };
        f.debug_struct("EmbeddedAuthz")
            .field("store_name", &self.config.store_name)
            .field("state", &state)
            .finish()
    }
}

/// Fact writer: convert and submit a batch, optionally tolerating
/// "already exists".
///
/// Fails fast with [`EmbedError::EmptyInput`] on an empty batch, before
/// any engine call. Only the [`EmbedError::WriteConflict`] class is
/// swallowed, and only when `ignore_existing` is set; every other error
/// is returned as-is.
async fn write_batch(
    engine: &RebacEngine,
    store_id: &str,
    model_id: &str,
    facts: &[Fact],
    ignore_existing: bool,
) -> Result<()> {
    if facts.is_empty() {
        return Err(EmbedError::EmptyInput);
    }

    match engine.write(store_id, model_id, facts).await {
        Ok(()) => Ok(()),
        Err(EmbedError::WriteConflict(message)) if ignore_existing => {
            debug!(%message, "facts already exist, ignoring");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
