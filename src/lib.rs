//! # Embedded ReBAC
//!
//! Relationship-based access control embedded in your application
//! process, with an idempotent bootstrap that takes a possibly cold,
//! possibly schema-less SQLite datastore to a handle ready to answer
//! Check/Write calls.
//!
//! ## Features
//!
//! - **In-process PDP/PAP** with no sidecar and no network hop
//! - **Idempotent provisioning**: the store and model are created on
//!   first boot and looked up by name on every boot after that
//! - **Bounded readiness polling** with automatic schema migration of a
//!   cold datastore
//! - **Async-first design** using the Tokio runtime
//! - **Check-result caching** with TTL expiration
//!
//! ## Example
//!
//! ```rust,no_run
//! use embedded_rebac::{EmbedConfig, EmbeddedAuthz, Fact, ModelSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = r#"
//! type user
//! type document
//!   relations
//!     define viewer: [user] or editor
//!     define editor: [user]
//! "#;
//!
//!     let config = EmbedConfig::new(
//!         "sqlite://authz.db?mode=rwc",
//!         "acme",
//!         ModelSource::Inline(model.to_string()),
//!     )
//!     .with_initial_facts(vec![Fact::new("document:1", "editor", "user:alice")]);
//!
//!     let authz = EmbeddedAuthz::connect(config).await?;
//!
//!     let allowed = authz
//!         .check(&Fact::new("document:1", "viewer", "user:alice"))
//!         .await?;
//!     if allowed {
//!         println!("Access granted!");
//!     }
//!
//!     authz.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod handle;
pub mod provision;
pub mod readiness;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::{EmbedConfig, ModelSource};
pub use dsl::AuthorizationSchema;
pub use engine::{EngineOptions, RebacEngine};
pub use error::{EmbedError, Result};
pub use handle::EmbeddedAuthz;
pub use storage::{MemoryStore, SqliteStore, TupleStore};
pub use types::{Fact, ModelDescriptor, ReadinessReport, ReadyReason, StoreDescriptor};
