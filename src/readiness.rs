//! Readiness polling and the schema-migration trigger
//!
//! Bootstrap waits twice: once for the backing store, once for the fully
//! constructed engine. Both waits run through [`wait_until_ready`] with
//! their own deadline. The datastore probe additionally routes not-ready
//! reports through [`maybe_migrate`], so a cold store gets its schema
//! applied from inside the first wait loop.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::{EmbedError, Result};
use crate::types::{ReadinessReport, ReadyReason};

/// Poll `probe` until it reports ready, a hard error occurs, or `timeout`
/// elapses.
///
/// The probe is called immediately; a ready report returns with no delay.
/// A not-ready report sleeps `poll_interval` and retries. A probe error is
/// a hard failure and propagates immediately with no retry; only soft
/// not-ready reports are retried. On timeout the last observed probe
/// message is carried in [`EmbedError::ReadinessTimeout`].
pub async fn wait_until_ready<P, Fut>(
    target: &str,
    mut probe: P,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<ReadinessReport>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        let report = probe().await?;
        if report.ready {
            info!(component = target, "readiness probe succeeded");
            return Ok(());
        }

        debug!(
            component = target,
            reason = ?report.reason,
            message = %report.message,
            "not ready yet, retrying"
        );

        let now = Instant::now();
        if now >= deadline {
            return Err(EmbedError::ReadinessTimeout {
                message: report.message,
            });
        }
        // The last sleep is truncated so the final probe lands on the
        // deadline instead of giving up an interval early.
        sleep(poll_interval.min(deadline - now)).await;
    }
}

/// Run the schema migration when a not-ready report calls for it.
///
/// Fires only on [`ReadyReason::SchemaMissing`]; every other reason is
/// left to the poller. Returns whether a migration ran so the caller can
/// re-probe. A migration failure is fatal and never retried. The runner
/// itself must be idempotent: process restarts re-enter this path against
/// an already-migrated store, which must be a no-op success.
pub async fn maybe_migrate<M, Fut>(report: &ReadinessReport, run_migration: M) -> Result<bool>
where
    M: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if report.ready || report.reason != ReadyReason::SchemaMissing {
        return Ok(false);
    }

    warn!(
        message = %report.message,
        "datastore requires migrations, running them now"
    );
    run_migration()
        .await
        .map_err(|e| EmbedError::MigrationFailed(e.to_string()))?;
    info!("datastore migrations completed");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ready_on_first_probe_returns_immediately() {
        let started = std::time::Instant::now();
        wait_until_ready(
            "test",
            || async { Ok(ReadinessReport::ready()) },
            Duration::from_secs(5),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_becomes_ready_after_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let probe_attempts = attempts.clone();

        wait_until_ready(
            "test",
            move || {
                let attempts = probe_attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Ok(ReadinessReport::not_ready(ReadyReason::Unknown, "warming up"))
                    } else {
                        Ok(ReadinessReport::ready())
                    }
                }
            },
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .await
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_never_ready_times_out_with_last_message() {
        let started = std::time::Instant::now();
        let err = wait_until_ready(
            "test",
            || async {
                Ok(ReadinessReport::not_ready(
                    ReadyReason::Unknown,
                    "still warming up",
                ))
            },
            Duration::from_secs(2),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "overshot the deadline: {elapsed:?}");
        match err {
            EmbedError::ReadinessTimeout { message } => {
                assert_eq!(message, "still warming up");
            }
            other => panic!("expected ReadinessTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_not_early_when_interval_does_not_divide_deadline() {
        // 800ms polls against a 2s deadline: the last sleep must be
        // truncated to 400ms rather than the loop giving up at 1.6s.
        let started = std::time::Instant::now();
        let err = wait_until_ready(
            "test",
            || async {
                Ok(ReadinessReport::not_ready(
                    ReadyReason::Unknown,
                    "still warming up",
                ))
            },
            Duration::from_secs(2),
            Duration::from_millis(800),
        )
        .await
        .unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "overshot the deadline: {elapsed:?}");
        assert!(matches!(err, EmbedError::ReadinessTimeout { .. }));
    }

    #[tokio::test]
    async fn test_hard_error_propagates_without_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let probe_attempts = attempts.clone();

        let err = wait_until_ready(
            "test",
            move || {
                let attempts = probe_attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(EmbedError::ConnectionError("connection refused".to_string()))
                }
            },
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EmbedError::ConnectionError(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_migration_fires_only_on_schema_missing() {
        let report =
            ReadinessReport::not_ready(ReadyReason::SchemaMissing, "schema requires migration");
        let ran = maybe_migrate(&report, || async { Ok(()) }).await.unwrap();
        assert!(ran);

        let report = ReadinessReport::not_ready(ReadyReason::Unknown, "warming up");
        let ran = maybe_migrate(&report, || async { Ok(()) }).await.unwrap();
        assert!(!ran);

        let ran = maybe_migrate(&ReadinessReport::ready(), || async { Ok(()) })
            .await
            .unwrap();
        assert!(!ran);
    }

    #[tokio::test]
    async fn test_migration_failure_is_fatal() {
        let report =
            ReadinessReport::not_ready(ReadyReason::SchemaMissing, "schema requires migration");
        let err = maybe_migrate(&report, || async {
            Err(EmbedError::Storage("disk full".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, EmbedError::MigrationFailed(_)));
    }
}
