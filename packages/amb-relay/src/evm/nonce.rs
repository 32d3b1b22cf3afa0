//! Per-account nonce serialization
//!
//! One [`NonceCounter`] exists per (chain, account). The counter is loaded
//! lazily, held across the broadcast and advanced only when the node accepts
//! the transaction, so concurrent submissions from the same account never
//! reuse a nonce.

use eyre::Result;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
pub struct NonceCounter {
    next: Mutex<Option<u64>>,
}

impl NonceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known nonce instead of querying the node
    pub fn starting_at(nonce: u64) -> Self {
        Self {
            next: Mutex::new(Some(nonce)),
        }
    }

    /// Run `broadcast` with the next nonce while holding the counter
    ///
    /// `load` is called only when no nonce is cached yet. The counter advances
    /// only if `broadcast` succeeds; on error the cached value is kept so the
    /// same nonce is reused by the next submission.
    pub async fn with_next<L, LFut, B, BFut, T>(&self, load: L, broadcast: B) -> Result<T>
    where
        L: FnOnce() -> LFut,
        LFut: Future<Output = Result<u64>>,
        B: FnOnce(u64) -> BFut,
        BFut: Future<Output = Result<T>>,
    {
        let mut guard = self.next.lock().await;
        let nonce = match *guard {
            Some(nonce) => nonce,
            None => {
                let loaded = load().await?;
                debug!(nonce = loaded, "Loaded account nonce");
                loaded
            }
        };
        *guard = Some(nonce);

        let out = broadcast(nonce).await?;
        *guard = Some(nonce + 1);
        Ok(out)
    }

    /// Drop the cached value; the next submission reloads from the node
    pub async fn resync(&self) {
        *self.next.lock().await = None;
    }

    pub async fn peek(&self) -> Option<u64> {
        *self.next.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::eyre;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_loads_once_and_increments() {
        let counter = NonceCounter::new();
        let loads = AtomicU32::new(0);

        for expected in 7..10 {
            let got = counter
                .with_next(
                    || async {
                        loads.fetch_add(1, Ordering::SeqCst);
                        Ok(7)
                    },
                    |n| async move { Ok(n) },
                )
                .await
                .unwrap();
            assert_eq!(got, expected);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(counter.peek().await, Some(10));
    }

    #[tokio::test]
    async fn test_failed_broadcast_does_not_advance() {
        let counter = NonceCounter::starting_at(3);

        let err = counter
            .with_next(|| async { Ok(0) }, |_| async { Err::<(), _>(eyre!("rejected")) })
            .await;
        assert!(err.is_err());
        assert_eq!(counter.peek().await, Some(3));

        let used = counter
            .with_next(|| async { Ok(0) }, |n| async move { Ok(n) })
            .await
            .unwrap();
        assert_eq!(used, 3);
    }

    #[tokio::test]
    async fn test_resync_reloads() {
        let counter = NonceCounter::starting_at(5);
        counter.resync().await;
        let used = counter
            .with_next(|| async { Ok(42) }, |n| async move { Ok(n) })
            .await
            .unwrap();
        assert_eq!(used, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_get_distinct_nonces() {
        let counter = Arc::new(NonceCounter::starting_at(0));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let counter = counter.clone();
                tokio::spawn(async move {
                    counter
                        .with_next(
                            || async { Ok(0) },
                            |n| async move {
                                tokio::time::sleep(Duration::from_millis(1)).await;
                                Ok(n)
                            },
                        )
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()));
        }
        assert_eq!(seen.len(), 32);
        assert_eq!(counter.peek().await, Some(32));
    }
}
