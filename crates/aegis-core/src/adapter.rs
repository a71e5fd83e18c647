//! Thin evented facade over the blocking engine.
//!
//! The core is blocking by design (locks plus CPU-bound scanning); async
//! callers get the same semantics (ordering, the fail-closed gate)
//! through a facade that offloads each call to the runtime's blocking
//! pool. The sanitize budget is enforced preemptively here with a
//! runtime timeout; the blocking core additionally checks it between
//! stages.

use std::sync::Arc;

use tokio::task;
use tracing::error;

use crate::engine::{Aegis, Health, SanitizeOutcome};
use crate::error::{AegisError, FailureKind};
use crate::policy::AegisPolicy;

/// Cloneable async handle to a shared [`Aegis`] engine.
#[derive(Clone)]
pub struct AsyncAegis {
    inner: Arc<Aegis>,
}

impl AsyncAegis {
    /// Wraps an engine for async use.
    #[must_use]
    pub fn new(engine: Arc<Aegis>) -> Self {
        Self { inner: engine }
    }

    /// Direct access to the underlying blocking engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<Aegis> {
        &self.inner
    }

    /// Async [`Aegis::sanitize`], with the wall-clock budget enforced by
    /// the runtime.
    ///
    /// On timeout the blocked call is abandoned to finish (and be
    /// discarded) on the blocking pool; no partial mappings become
    /// visible because the vault commit is all-or-nothing.
    ///
    /// # Errors
    ///
    /// As [`Aegis::sanitize`], plus the timeout gate event.
    pub async fn sanitize(
        &self,
        text: String,
        session_id: String,
        policy: Option<AegisPolicy>,
    ) -> Result<SanitizeOutcome, AegisError> {
        let engine = Arc::clone(&self.inner);
        let budget = engine.sanitize_budget();
        let gated_session = session_id.clone();

        let call = task::spawn_blocking(move || {
            engine.sanitize(&text, &session_id, policy.as_ref())
        });

        match tokio::time::timeout(budget, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                error!(session_id = %gated_session, error = %join_error, "sanitize task failed");
                Err(AegisError::SanitizationBlocked {
                    kind: FailureKind::Internal,
                })
            },
            Err(_elapsed) => {
                error!(session_id = %gated_session, "sanitize budget exceeded; blocking traffic");
                Err(AegisError::SanitizationBlocked {
                    kind: FailureKind::Timeout,
                })
            },
        }
    }

    /// Async [`Aegis::desanitize`].
    ///
    /// # Errors
    ///
    /// As [`Aegis::desanitize`]; an executor failure degrades to
    /// non-reveal (the text is returned unchanged).
    pub async fn desanitize(
        &self,
        text: String,
        session_id: String,
        authorized: bool,
    ) -> Result<String, AegisError> {
        let engine = Arc::clone(&self.inner);
        let fallback = text.clone();

        let call =
            task::spawn_blocking(move || engine.desanitize(&text, &session_id, authorized));
        match call.await {
            Ok(result) => result,
            Err(join_error) => {
                error!(error = %join_error, "desanitize task failed; returning tokens");
                Ok(fallback)
            },
        }
    }

    /// Async [`Aegis::purge`].
    pub async fn purge(&self, session_id: String) -> bool {
        let engine = Arc::clone(&self.inner);
        task::spawn_blocking(move || engine.purge(&session_id))
            .await
            .unwrap_or(false)
    }

    /// Engine health.
    #[must_use]
    pub fn health(&self) -> Health {
        self.inner.health()
    }

    /// Async [`Aegis::sweep_expired`].
    pub async fn sweep_expired(&self) -> usize {
        let engine = Arc::clone(&self.inner);
        task::spawn_blocking(move || engine.sweep_expired())
            .await
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn async_engine() -> AsyncAegis {
        AsyncAegis::new(Arc::new(Aegis::builder().build().unwrap()))
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let aegis = async_engine();

        let outcome = aegis
            .sanitize(
                "Patient John Doe has a rash.".to_string(),
                "s1".to_string(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.text, "Patient [PATIENT_A] has a rash.");

        let restored = aegis
            .desanitize(outcome.text, "s1".to_string(), true)
            .await
            .unwrap();
        assert_eq!(restored, "Patient John Doe has a rash.");
    }

    #[tokio::test]
    async fn test_async_purge() {
        let aegis = async_engine();
        aegis
            .sanitize("John Doe".to_string(), "s1".to_string(), None)
            .await
            .unwrap();
        assert!(aegis.purge("s1".to_string()).await);
        assert!(!aegis.purge("s1".to_string()).await);
    }

    #[tokio::test]
    async fn test_timeout_gates() {
        let engine = Aegis::builder()
            .sanitize_budget(Duration::from_nanos(1))
            .build()
            .unwrap();
        let aegis = AsyncAegis::new(Arc::new(engine));

        let result = aegis
            .sanitize("John Doe".to_string(), "s1".to_string(), None)
            .await;
        assert!(matches!(
            result,
            Err(AegisError::SanitizationBlocked {
                kind: FailureKind::Timeout
            })
        ));
    }
}
