//! Handle configuration loading and validation

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EmbedError, Result};
use crate::types::Fact;

/// Where the authorization-model DSL comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// DSL text supplied inline
    Inline(String),
    /// Path to a file containing the DSL text
    Path(PathBuf),
}

impl ModelSource {
    /// Resolve the DSL text, reading the file for the path variant
    pub fn resolve(&self) -> Result<String> {
        match self {
            ModelSource::Inline(text) => Ok(text.clone()),
            ModelSource::Path(path) => std::fs::read_to_string(path).map_err(|e| {
                EmbedError::ConfigInvalid(format!(
                    "failed to read model file {}: {}",
                    path.display(),
                    e
                ))
            }),
        }
    }
}

/// Configuration for an [`EmbeddedAuthz`](crate::EmbeddedAuthz) handle.
///
/// Validated in full before any network I/O happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Backing-store connection URI, e.g. `sqlite:///var/lib/app/authz.db?mode=rwc`
    pub datastore_uri: String,

    /// Human-chosen store name, looked up or created at bootstrap
    pub store_name: String,

    /// Authorization-model DSL source
    pub model: ModelSource,

    /// Facts seeded at bootstrap with existing facts ignored
    #[serde(default)]
    pub initial_facts: Vec<Fact>,

    /// Skip seeding entirely; only then may `initial_facts` be empty
    #[serde(default)]
    pub skip_seeding: bool,

    /// Deadline for each readiness wait (datastore, then engine)
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,

    /// Sleep between readiness probes
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Time-to-live for the engine's check-result cache
    #[serde(default = "default_check_cache_ttl_secs")]
    pub check_cache_ttl_secs: u64,
}

fn default_readiness_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_check_cache_ttl_secs() -> u64 {
    300
}

impl EmbedConfig {
    /// Create a configuration with defaults for the optional fields
    pub fn new(
        datastore_uri: impl Into<String>,
        store_name: impl Into<String>,
        model: ModelSource,
    ) -> Self {
        Self {
            datastore_uri: datastore_uri.into(),
            store_name: store_name.into(),
            model,
            initial_facts: Vec::new(),
            skip_seeding: false,
            readiness_timeout_secs: default_readiness_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            check_cache_ttl_secs: default_check_cache_ttl_secs(),
        }
    }

    /// Add facts to seed at bootstrap
    pub fn with_initial_facts(mut self, facts: Vec<Fact>) -> Self {
        self.initial_facts = facts;
        self
    }

    /// Skip fact seeding at bootstrap
    pub fn with_seeding_skipped(mut self) -> Self {
        self.skip_seeding = true;
        self
    }

    /// Validate the configuration and resolve the model DSL text.
    ///
    /// Runs before any I/O; every problem surfaces as
    /// [`EmbedError::ConfigInvalid`] naming the offending field.
    pub fn validate(&self) -> Result<String> {
        if self.datastore_uri.trim().is_empty() {
            return Err(EmbedError::ConfigInvalid(
                "datastore_uri must be non-empty".to_string(),
            ));
        }
        if self.store_name.trim().is_empty() {
            return Err(EmbedError::ConfigInvalid(
                "store_name must be non-empty".to_string(),
            ));
        }
        let dsl = self.model.resolve()?;
        if dsl.trim().is_empty() {
            return Err(EmbedError::ConfigInvalid(
                "model source must be non-empty".to_string(),
            ));
        }
        if !self.skip_seeding && self.initial_facts.is_empty() {
            return Err(EmbedError::ConfigInvalid(
                "initial_facts must be non-empty unless skip_seeding is set".to_string(),
            ));
        }
        for fact in &self.initial_facts {
            fact.validate()?;
        }
        if self.poll_interval_ms == 0 {
            return Err(EmbedError::ConfigInvalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(dsl)
    }

    /// Readiness deadline as a [`Duration`]
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check-cache TTL as a [`Duration`]
    pub fn check_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.check_cache_ttl_secs)
    }
}
