//! End-to-end bootstrap and provisioning tests
//!
//! These run the full handle lifecycle against a file-backed SQLite
//! datastore: cold start with migration, restart idempotency, fact
//! seeding, and the Check/Write surface.

use anyhow::Result;
use embedded_rebac::{EmbedConfig, EmbedError, EmbeddedAuthz, Fact, ModelSource};
use std::sync::Arc;
use tempfile::TempDir;

/// Route bootstrap logs through RUST_LOG; once per process.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const MODEL: &str = r#"
model
  schema 1.1

type user
type document
  relations
    define viewer: [user] or editor
    define editor: [user]
"#;

fn temp_datastore() -> (TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let uri = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("authz.db").display()
    );
    (dir, uri)
}

fn acme_config(uri: &str) -> EmbedConfig {
    EmbedConfig::new(uri, "acme", ModelSource::Inline(MODEL.to_string()))
        .with_initial_facts(vec![Fact::new("document:1", "editor", "user:alice")])
}

#[tokio::test]
async fn test_cold_bootstrap_migrates_and_answers_checks() -> Result<()> {
    init_tracing();
    let (_dir, uri) = temp_datastore();
    let authz = EmbeddedAuthz::connect(acme_config(&uri)).await?;

    // Seeded directly
    assert!(
        authz
            .check(&Fact::new("document:1", "editor", "user:alice"))
            .await?
    );

    // Derived: viewer comes from editor
    assert!(
        authz
            .check(&Fact::new("document:1", "viewer", "user:alice"))
            .await?
    );

    // Unwritten fact on the same object/relation
    assert!(
        !authz
            .check(&Fact::new("document:1", "editor", "user:bob"))
            .await?
    );

    authz.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_restart_reuses_store_and_model_ids() -> Result<()> {
    init_tracing();
    let (_dir, uri) = temp_datastore();

    let first = EmbeddedAuthz::connect(acme_config(&uri)).await?;
    let store_id = first.store().await?.id;
    let model_id = first.model_id().await?;
    first.close().await?;

    // Same backing store, fresh process: pure lookup, no new resources.
    let second = EmbeddedAuthz::connect(acme_config(&uri)).await?;
    assert_eq!(second.store().await?.id, store_id);
    assert_eq!(second.model_id().await?, model_id);

    // Seeded facts still hold after the restart.
    assert!(
        second
            .check(&Fact::new("document:1", "editor", "user:alice"))
            .await?
    );
    second.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_empty_batch_fails_without_engine_call() {
    let (_dir, uri) = temp_datastore();
    let authz = EmbeddedAuthz::connect(acme_config(&uri)).await.unwrap();

    assert!(matches!(
        authz.write_facts(&[], false).await,
        Err(EmbedError::EmptyInput)
    ));
    assert!(matches!(
        authz.write_facts(&[], true).await,
        Err(EmbedError::EmptyInput)
    ));

    authz.close().await.unwrap();
}

#[tokio::test]
async fn test_fresh_batch_writes_and_checks() {
    let (_dir, uri) = temp_datastore();
    let authz = EmbeddedAuthz::connect(acme_config(&uri)).await.unwrap();

    let facts = vec![
        Fact::new("document:2", "editor", "user:bob"),
        Fact::new("document:3", "viewer", "user:carol"),
    ];
    authz.write_facts(&facts, false).await.unwrap();

    for fact in &facts {
        assert!(authz.check(fact).await.unwrap());
    }
    assert!(!authz
        .check(&Fact::new("document:2", "editor", "user:carol"))
        .await
        .unwrap());

    authz.close().await.unwrap();
}

#[tokio::test]
async fn test_conflicting_batch_swallowed_only_when_ignoring_existing() {
    let (_dir, uri) = temp_datastore();
    let authz = EmbeddedAuthz::connect(acme_config(&uri)).await.unwrap();

    // document:1 editor alice was seeded at bootstrap.
    let batch = vec![Fact::new("document:1", "editor", "user:alice")];

    assert!(matches!(
        authz.write_facts(&batch, false).await,
        Err(EmbedError::WriteConflict(_))
    ));
    authz.write_facts(&batch, true).await.unwrap();

    authz.close().await.unwrap();
}

#[tokio::test]
async fn test_mixed_batch_with_ignore_existing_writes_nothing() {
    // The engine batch is all-or-nothing: a conflict on the existing fact
    // rejects the whole batch, and ignore_existing turns that into
    // success. The new fact is therefore not written either.
    let (_dir, uri) = temp_datastore();
    let authz = EmbeddedAuthz::connect(acme_config(&uri)).await.unwrap();

    let new_fact = Fact::new("document:9", "editor", "user:dave");
    let batch = vec![
        new_fact.clone(),
        Fact::new("document:1", "editor", "user:alice"),
    ];
    authz.write_facts(&batch, true).await.unwrap();

    assert!(!authz.check(&new_fact).await.unwrap());

    authz.close().await.unwrap();
}

#[tokio::test]
async fn test_seeding_is_idempotent_across_restarts() {
    let (_dir, uri) = temp_datastore();

    // Two full bootstraps seed the same facts; the second seeding hits
    // the conflict path and is ignored.
    let first = EmbeddedAuthz::connect(acme_config(&uri)).await.unwrap();
    first.close().await.unwrap();
    let second = EmbeddedAuthz::connect(acme_config(&uri)).await.unwrap();

    assert!(second
        .check(&Fact::new("document:1", "editor", "user:alice"))
        .await
        .unwrap());
    second.close().await.unwrap();
}

#[tokio::test]
async fn test_skip_seeding_bootstraps_with_no_facts() {
    let (_dir, uri) = temp_datastore();
    let config = EmbedConfig::new(&uri, "acme", ModelSource::Inline(MODEL.to_string()))
        .with_seeding_skipped();

    let authz = EmbeddedAuthz::connect(config).await.unwrap();
    assert!(!authz
        .check(&Fact::new("document:1", "editor", "user:alice"))
        .await
        .unwrap());
    authz.close().await.unwrap();
}

#[tokio::test]
async fn test_malformed_dsl_fails_bootstrap() {
    let (_dir, uri) = temp_datastore();
    let config = EmbedConfig::new(&uri, "acme", ModelSource::Inline("garbage {".to_string()))
        .with_initial_facts(vec![Fact::new("document:1", "editor", "user:alice")]);

    let err = EmbeddedAuthz::connect(config).await.unwrap_err();
    assert!(matches!(err, EmbedError::ModelParseError(_)));
}

#[tokio::test]
async fn test_unreachable_datastore_fails_fast() {
    // No mode=rwc and no file: the driver cannot open the database.
    let config = EmbedConfig::new(
        "sqlite:///nonexistent/dir/authz.db",
        "acme",
        ModelSource::Inline(MODEL.to_string()),
    )
    .with_initial_facts(vec![Fact::new("document:1", "editor", "user:alice")]);

    let err = EmbeddedAuthz::connect(config).await.unwrap_err();
    assert!(matches!(err, EmbedError::DatastoreUnreachable(_)));
}

#[tokio::test]
async fn test_concurrent_checks_after_ready() {
    let (_dir, uri) = temp_datastore();
    let authz = Arc::new(EmbeddedAuthz::connect(acme_config(&uri)).await.unwrap());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let authz = authz.clone();
        handles.push(tokio::spawn(async move {
            authz
                .check(&Fact::new("document:1", "viewer", "user:alice"))
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    authz.close().await.unwrap();
}

#[tokio::test]
async fn test_close_races_inflight_calls_without_corruption() {
    let (_dir, uri) = temp_datastore();
    let authz = Arc::new(EmbeddedAuthz::connect(acme_config(&uri)).await.unwrap());

    let checker = {
        let authz = authz.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                match authz
                    .check(&Fact::new("document:1", "editor", "user:alice"))
                    .await
                {
                    Ok(allowed) => assert!(allowed),
                    // A call racing the close may observe AlreadyClosed, or
                    // a backend error if the pool shut down mid-query.
                    Err(_) => return,
                }
            }
        })
    };

    authz.close().await.unwrap();
    checker.await.unwrap();
}
