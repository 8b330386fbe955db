//! Lazy, shared async initialization.
//!
//! A [`Memo`] runs its factory at most once. Callers arriving while the
//! factory is in flight wait for that same call, and every caller sees
//! the same value or the same error afterwards.
//!
//! The in-flight call belongs to the memo, not to the caller that started
//! it: a caller dropped mid-initialization leaves the call in place and
//! the next caller resumes it.
//!
//! ```ignore
//! let engine = Memo::new(|| async { Ok::<_, MyError>(Engine::warm_up()) });
//! let a = engine.get().await?; // runs the factory
//! let b = engine.get().await?; // cached
//! ```

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

type Outcome<T, E> = Result<Arc<T>, Arc<E>>;

/// Memoized result of an async factory.
pub struct Memo<T, E> {
    init: Shared<BoxFuture<'static, Outcome<T, E>>>,
    value: OnceLock<Outcome<T, E>>,
}

impl<T, E> Memo<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Wrap `factory` without calling it.
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let init = async move { factory().await.map(Arc::new).map_err(Arc::new) };
        Self {
            init: init.boxed().shared(),
            value: OnceLock::new(),
        }
    }

    /// Get the value, running the factory on first access.
    pub async fn get(&self) -> Result<&T, Arc<E>> {
        let outcome = match self.value.get() {
            Some(outcome) => outcome,
            None => {
                let outcome = self.init.clone().await;
                self.value.get_or_init(|| outcome)
            }
        };
        outcome.as_deref().map_err(Arc::clone)
    }

    /// Whether the factory has already completed.
    pub fn is_initialized(&self) -> bool {
        self.init.peek().is_some()
    }
}

impl<T, E> fmt::Debug for Memo<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("initialized", &self.init.peek().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting(calls: &Arc<AtomicUsize>, fail: bool) -> Memo<u32, String> {
        let calls = Arc::clone(calls);
        Memo::new(move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                if fail { Err("boom".to_string()) } else { Ok(42) }
            }
        })
    }

    #[tokio::test]
    async fn test_factory_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = counting(&calls, false);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!memo.is_initialized());

        assert_eq!(*memo.get().await.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(memo.is_initialized());
    }

    #[tokio::test]
    async fn test_sequential_calls_share_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = counting(&calls, false);

        for _ in 0..3 {
            assert_eq!(*memo.get().await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_coalesce() {
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = Arc::new(counting(&calls, false));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let memo = Arc::clone(&memo);
                tokio::spawn(async move { *memo.get().await.unwrap() })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_restart_factory() {
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = counting(&calls, false);

        let first = tokio::time::timeout(Duration::from_millis(5), memo.get()).await;
        assert!(first.is_err());
        assert!(!memo.is_initialized());

        assert_eq!(*memo.get().await.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_shared() {
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = counting(&calls, true);

        let first = memo.get().await.unwrap_err();
        let second = memo.get().await.unwrap_err();

        assert_eq!(*first, "boom");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
