// 🧊 Cache - Load-once dataset holder
// A `DatasetCache` keeps the outcome of a single load for the lifetime of the
// process. It is owned by the application state and handed to request
// handlers; there is no global.

use crate::error::LoadError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

/// Lifecycle of a cached dataset. `Loaded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

struct Outcome<T> {
    result: Result<Arc<T>, String>,
    finished_at: DateTime<Utc>,
}

/// Marks a load in flight; cleared on drop, so a cancelled load goes back
/// to `Unloaded` and the next caller starts over.
struct LoadingFlag<'a>(&'a AtomicBool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct DatasetCache<T> {
    name: &'static str,
    cell: OnceCell<Outcome<T>>,
    loading: AtomicBool,
}

impl<T> DatasetCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cell: OnceCell::new(),
            loading: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the cached dataset, running `loader` if nothing was loaded yet.
    ///
    /// Concurrent callers share a single load. A failed load is remembered
    /// too: every later call returns `None` without running `loader`.
    pub async fn get_or_load<F, Fut>(&self, loader: F) -> Option<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LoadError>>,
    {
        let outcome = self
            .cell
            .get_or_init(|| async {
                let _loading = LoadingFlag::raise(&self.loading);
                tracing::info!(dataset = self.name, "loading dataset");
                let started = Instant::now();

                let result = match loader().await {
                    Ok(data) => {
                        tracing::info!(
                            dataset = self.name,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "dataset loaded"
                        );
                        Ok(Arc::new(data))
                    }
                    Err(err) => {
                        tracing::error!(dataset = self.name, error = %err, "dataset load failed");
                        Err(err.to_string())
                    }
                };

                Outcome {
                    result,
                    finished_at: Utc::now(),
                }
            })
            .await;

        outcome.result.as_ref().ok().cloned()
    }

    /// The cached dataset, if a load already succeeded. Never loads.
    pub fn get(&self) -> Option<Arc<T>> {
        self.cell
            .get()
            .and_then(|outcome| outcome.result.as_ref().ok().cloned())
    }

    /// Error message of a failed load.
    pub fn failure(&self) -> Option<&str> {
        match self.cell.get().map(|outcome| &outcome.result) {
            Some(Err(message)) => Some(message),
            _ => None,
        }
    }

    /// When the load finished, successfully or not.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.cell.get().map(|outcome| outcome.finished_at)
    }

    pub fn status(&self) -> CacheStatus {
        match self.cell.get().map(|outcome| &outcome.result) {
            Some(Ok(_)) => CacheStatus::Loaded,
            Some(Err(_)) => CacheStatus::Failed,
            None if self.loading.load(Ordering::SeqCst) => CacheStatus::Loading,
            None => CacheStatus::Unloaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_loads_once() {
        let cache: DatasetCache<Vec<u32>> = DatasetCache::new("despesas");
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        assert_eq!(cache.status(), CacheStatus::Unloaded);
        assert!(cache.get().is_none());
        assert!(cache.finished_at().is_none());

        for _ in 0..3 {
            let data = cache
                .get_or_load(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await;
            assert_eq!(data.as_deref(), Some(&vec![1, 2, 3]));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.status(), CacheStatus::Loaded);
        assert!(cache.get().is_some());
        assert!(cache.finished_at().is_some());
    }

    #[tokio::test]
    async fn test_failure_is_terminal() {
        let cache: DatasetCache<Vec<u32>> = DatasetCache::new("cruzado");

        let first = cache
            .get_or_load(|| async { Err(LoadError::Dependency("warehouse down".to_string())) })
            .await;
        assert!(first.is_none());
        assert_eq!(cache.status(), CacheStatus::Failed);
        assert_eq!(cache.failure(), Some("dependency unavailable: warehouse down"));

        // No retry: a later successful loader is never invoked
        let second = cache.get_or_load(|| async { Ok(vec![42]) }).await;
        assert!(second.is_none());
        assert_eq!(cache.status(), CacheStatus::Failed);
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_share_one_load() {
        let cache: Arc<DatasetCache<u32>> = Arc::new(DatasetCache::new("despesas"));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(7)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().as_deref(), Some(&7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_while_loading() {
        let cache: Arc<DatasetCache<u32>> = Arc::new(DatasetCache::new("despesas"));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let background = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_load(|| async move {
                        let _ = rx.await;
                        Ok(1)
                    })
                    .await
            })
        };

        while cache.status() == CacheStatus::Unloaded {
            tokio::task::yield_now().await;
        }
        assert_eq!(cache.status(), CacheStatus::Loading);

        tx.send(()).unwrap();
        assert_eq!(background.await.unwrap().as_deref(), Some(&1));
        assert_eq!(cache.status(), CacheStatus::Loaded);
    }

    #[tokio::test]
    async fn test_cancelled_load_resets_status() {
        let cache: DatasetCache<u32> = DatasetCache::new("despesas");

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            cache.get_or_load(|| async {
                std::future::pending::<()>().await;
                Ok(0)
            }),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(cache.status(), CacheStatus::Unloaded);
        assert!(cache.finished_at().is_none());

        // The next caller runs its own load
        let data = cache.get_or_load(|| async { Ok(5) }).await;
        assert_eq!(data.as_deref(), Some(&5));
        assert_eq!(cache.status(), CacheStatus::Loaded);
    }
}
