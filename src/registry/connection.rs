//! Lazily opened, process-wide chain connection.

use super::retry::{with_backoff, BackoffConfig};
use crate::error::ProofResult;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Opens and closes connections to a chain endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    /// Shared handle given to every caller once connected
    type Handle: Clone + Send + Sync;

    /// Endpoint description used in logs
    fn endpoint(&self) -> &str;

    /// Open a connection and wait until the endpoint reports ready
    async fn open(&self) -> ProofResult<Self::Handle>;

    /// Release a handle that is no longer cached
    async fn close(&self, _handle: Self::Handle) {}
}

/// Connect-once wrapper around a [`Connector`]
///
/// The slot mutex is held for the whole connect, so concurrent first callers
/// queue behind the one in-flight attempt and all receive the same handle.
pub struct LazyConnection<C: Connector> {
    connector: C,
    backoff: BackoffConfig,
    slot: Mutex<Option<C::Handle>>,
}

impl<C: Connector> LazyConnection<C> {
    pub fn new(connector: C, backoff: BackoffConfig) -> Self {
        Self {
            connector,
            backoff,
            slot: Mutex::new(None),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Return the cached handle, opening it first if needed
    pub async fn ensure_connected(&self) -> ProofResult<C::Handle> {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        info!(endpoint = self.connector.endpoint(), "Opening chain connection");
        let handle = with_backoff(&self.backoff, "chain connect", || self.connector.open()).await?;
        info!(endpoint = self.connector.endpoint(), "Chain connection established");

        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Drop the cached handle; a no-op when not connected
    pub async fn disconnect(&self) {
        let handle = self.slot.lock().await.take();
        match handle {
            Some(handle) => {
                self.connector.close(handle).await;
                info!(endpoint = self.connector.endpoint(), "Disconnected from chain");
            }
            None => debug!("Disconnect requested while not connected"),
        }
    }

    /// Whether a handle is cached; false while a connect is still in flight
    pub fn is_connected(&self) -> bool {
        self.slot
            .try_lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProofError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Hands out sequential connection ids after a short delay
    struct CountingConnector {
        opened: AtomicUsize,
        closed: AtomicUsize,
        failures_left: AtomicUsize,
    }

    impl CountingConnector {
        fn new() -> Self {
            Self::failing(0)
        }

        fn failing(times: usize) -> Self {
            Self {
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(times),
            }
        }
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Handle = usize;

        fn endpoint(&self) -> &str {
            "ws://test"
        }

        async fn open(&self) -> ProofResult<usize> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ProofError::Connection("connection refused".to_string()));
            }
            Ok(self.opened.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn close(&self, _handle: usize) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_open_once() {
        let connection = Arc::new(LazyConnection::new(
            CountingConnector::new(),
            BackoffConfig::none(),
        ));

        let calls = (0..16).map(|_| {
            let connection = connection.clone();
            async move { connection.ensure_connected().await.unwrap() }
        });
        let handles = futures::future::join_all(calls).await;

        assert!(handles.iter().all(|&h| h == 1));
        assert_eq!(connection.connector().opened.load(Ordering::SeqCst), 1);
        assert!(connection.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_then_reconnect() {
        let connection = LazyConnection::new(CountingConnector::new(), BackoffConfig::none());

        assert_eq!(connection.ensure_connected().await.unwrap(), 1);
        connection.disconnect().await;
        assert!(!connection.is_connected());
        assert_eq!(connection.connector().closed.load(Ordering::SeqCst), 1);

        assert_eq!(connection.ensure_connected().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected_is_noop() {
        let connection = LazyConnection::new(CountingConnector::new(), BackoffConfig::none());
        connection.disconnect().await;
        connection.disconnect().await;
        assert_eq!(connection.connector().closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_connect_is_not_cached() {
        let connection = LazyConnection::new(CountingConnector::failing(1), BackoffConfig::none());

        let first = connection.ensure_connected().await;
        assert!(matches!(first, Err(ProofError::Connection(_))));
        assert!(!connection.is_connected());

        assert_eq!(connection.ensure_connected().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_connect_retries_with_backoff() {
        let connection = LazyConnection::new(
            CountingConnector::failing(2),
            BackoffConfig::none().with_max_retries(2),
        );

        assert_eq!(connection.ensure_connected().await.unwrap(), 1);
    }
}
