//! Error types for the embedded authorization service

use thiserror::Error;

/// Embedded authorization errors
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Bad or missing configuration, detected before any I/O
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Opening the datastore driver failed
    #[error("Datastore unreachable: {0}")]
    DatastoreUnreachable(String),

    /// Hard failure reaching the backing store or engine
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A readiness probe stayed not-ready past the deadline
    #[error("Timed out waiting for readiness: {message}")]
    ReadinessTimeout {
        /// Last message observed from the probe
        message: String,
    },

    /// Schema migration failed; never retried
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Malformed authorization-model DSL
    #[error("Failed to parse authorization model: {0}")]
    ModelParseError(String),

    /// Store or model create-or-lookup failure
    #[error("Provisioning failed: {0}")]
    ProvisioningError(String),

    /// The engine rejected a batch because a fact already exists
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    /// An empty fact batch was submitted
    #[error("Empty input: at least one fact is required")]
    EmptyInput,

    /// Relation evaluation failed
    #[error("Evaluation failed: {0}")]
    EvaluationError(String),

    /// Check or Write called before bootstrap completed
    #[error("Handle is not ready: bootstrap has not completed")]
    NotReady,

    /// Operation on a closed handle
    #[error("Handle is closed")]
    AlreadyClosed,

    /// Backend storage error outside the classified paths
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for embedded authorization operations
pub type Result<T> = std::result::Result<T, EmbedError>;
