//! Byte-budgeted model cache with LRU eviction and single-in-flight loads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::error::OcrError;
use crate::infer::{InferenceSession, LoadedModel, ModelLoader, ModelSpec};

/// Ratio of `max_bytes` eviction drains to after a load overflows the budget.
const EVICT_TARGET_RATIO: f64 = 0.8;
/// Ratio targeted by the emergency memory-pressure pass.
const PRESSURE_TARGET_RATIO: f64 = 0.5;

type SharedLoad = Shared<BoxFuture<'static, Result<LoadedModel, String>>>;

struct Entry {
    session: Arc<dyn InferenceSession>,
    byte_size: u64,
    /// Logical clock value of the last `get`; smallest is evicted first.
    last_used_at: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    loading: HashMap<String, SharedLoad>,
    clock: u64,
}

impl Inner {
    fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.byte_size).sum()
    }

    /// Evict ascending by `last_used_at` until the total fits `target`.
    /// Entries mid-load live in `loading`, not `entries`, so they are
    /// untouched by construction.
    fn evict_to(&mut self, target: u64) {
        while self.total_bytes() > target {
            let Some(name) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used_at)
                .map(|(name, _)| name.clone())
            else {
                return;
            };
            let entry = self.entries.remove(&name).expect("just found");
            release_session(&name, &entry.session);
            debug!(model = %name, bytes = entry.byte_size, "evicted model");
        }
    }
}

fn release_session(name: &str, session: &Arc<dyn InferenceSession>) {
    if let Err(e) = session.release() {
        warn!(model = %name, error = %e, "model release failed, dropping anyway");
    }
}

/// Summary returned by [`ModelCache::cache_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub count: usize,
}

/// Lazily loads named models and keeps them under a byte budget. All
/// mutation happens inside; callers only observe through `get`/`cache_info`.
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    max_bytes: u64,
    inner: Mutex<Inner>,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>, max_bytes: u64) -> Self {
        Self { loader, max_bytes, inner: Mutex::new(Inner::default()) }
    }

    /// Fetch a live session for `spec`, loading it on first use. Concurrent
    /// calls for the same name share one in-flight load.
    pub async fn get(&self, spec: &ModelSpec) -> Result<Arc<dyn InferenceSession>, OcrError> {
        let load = {
            let mut inner = self.inner.lock().expect("cache mutex");
            inner.clock += 1;
            let now = inner.clock;
            if let Some(entry) = inner.entries.get_mut(&spec.name) {
                entry.last_used_at = now;
                return Ok(Arc::clone(&entry.session));
            }
            if let Some(load) = inner.loading.get(&spec.name) {
                load.clone()
            } else {
                let loader = Arc::clone(&self.loader);
                let owned = spec.clone();
                let load = async move {
                    tokio::task::spawn_blocking(move || loader.load(&owned))
                        .await
                        .map_err(|e| e.to_string())?
                        .map_err(|e| e.to_string())
                }
                .boxed()
                .shared();
                inner.loading.insert(spec.name.clone(), load.clone());
                load
            }
        };

        let result = load.await;

        let mut inner = self.inner.lock().expect("cache mutex");
        inner.loading.remove(&spec.name);
        match result {
            Ok(model) => {
                info!(model = %spec.name, bytes = model.byte_size, "model loaded");
                inner.clock += 1;
                let now = inner.clock;
                // Another waiter on the same shared load may have inserted
                // it already; refreshing the stamp is enough then.
                let entry = inner.entries.entry(spec.name.clone()).or_insert(Entry {
                    session: Arc::clone(&model.session),
                    byte_size: model.byte_size,
                    last_used_at: now,
                });
                entry.last_used_at = now;
                let session = Arc::clone(&entry.session);
                if inner.total_bytes() > self.max_bytes {
                    let target = (self.max_bytes as f64 * EVICT_TARGET_RATIO) as u64;
                    inner.evict_to(target);
                }
                Ok(session)
            }
            Err(reason) => Err(OcrError::ModelLoad { name: spec.name.clone(), reason }),
        }
    }

    /// Load a set of models up front, sequentially.
    pub async fn preload(&self, specs: &[ModelSpec]) -> Result<(), OcrError> {
        for spec in specs {
            self.get(spec).await?;
        }
        Ok(())
    }

    /// Drop one model if present. No-op for unknown names.
    pub fn unload(&self, name: &str) {
        let mut inner = self.inner.lock().expect("cache mutex");
        if let Some(entry) = inner.entries.remove(name) {
            release_session(name, &entry.session);
        }
    }

    /// Drop everything resident. In-flight loads finish and re-insert.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache mutex");
        for (name, entry) in inner.entries.drain() {
            release_session(&name, &entry.session);
        }
    }

    /// Emergency eviction down to half the budget.
    pub fn handle_memory_pressure(&self) {
        let mut inner = self.inner.lock().expect("cache mutex");
        let target = (self.max_bytes as f64 * PRESSURE_TARGET_RATIO) as u64;
        inner.evict_to(target);
    }

    pub fn cache_info(&self) -> CacheInfo {
        let inner = self.inner.lock().expect("cache mutex");
        CacheInfo {
            total_bytes: inner.total_bytes(),
            max_bytes: self.max_bytes,
            count: inner.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::{MockLoader, MockSession};
    use std::time::Duration;

    fn spec(name: &str) -> ModelSpec {
        ModelSpec::new(name, format!("{name}.onnx"))
    }

    #[tokio::test]
    async fn loads_once_and_reuses() {
        let loader = Arc::new(MockLoader::new(10));
        let cache = ModelCache::new(loader.clone(), 1000);
        cache.get(&spec("detect")).await.unwrap();
        cache.get(&spec("detect")).await.unwrap();
        assert_eq!(loader.load_count("detect"), 1);
        assert_eq!(cache.cache_info().count, 1);
    }

    #[tokio::test]
    async fn concurrent_gets_share_one_load() {
        let loader = Arc::new(MockLoader::new(10).with_delay(Duration::from_millis(30)));
        let cache = Arc::new(ModelCache::new(loader.clone(), 1000));
        let first = spec("detect");
        let second = spec("detect");
        let (a, b) = tokio::join!(cache.get(&first), cache.get(&second));
        a.unwrap();
        b.unwrap();
        assert_eq!(loader.load_count("detect"), 1);
    }

    #[tokio::test]
    async fn evicts_least_recently_used_first() {
        let loader = Arc::new(MockLoader::new(40));
        let cache = ModelCache::new(loader.clone(), 100);
        cache.get(&spec("a")).await.unwrap();
        cache.get(&spec("b")).await.unwrap();
        // Touch a so b becomes the LRU entry.
        cache.get(&spec("a")).await.unwrap();
        cache.get(&spec("c")).await.unwrap();

        let info = cache.cache_info();
        assert_eq!(info.count, 2, "b should have been evicted");
        assert!(info.total_bytes <= 80);

        // An evicted model reloads exactly once on the next get.
        cache.get(&spec("b")).await.unwrap();
        assert_eq!(loader.load_count("b"), 2);
    }

    #[tokio::test]
    async fn memory_pressure_evicts_to_half_budget() {
        let loader = Arc::new(MockLoader::new(40));
        let cache = ModelCache::new(loader.clone(), 200);
        for name in ["a", "b", "c", "d"] {
            cache.get(&spec(name)).await.unwrap();
        }
        assert_eq!(cache.cache_info().total_bytes, 160);
        cache.handle_memory_pressure();
        assert!(cache.cache_info().total_bytes <= 100);
    }

    #[tokio::test]
    async fn failed_load_propagates_and_allows_retry() {
        let loader = Arc::new(MockLoader::new(10).failing_for("broken"));
        let cache = ModelCache::new(loader.clone(), 1000);
        assert!(matches!(
            cache.get(&spec("broken")).await,
            Err(OcrError::ModelLoad { .. })
        ));
        // The failed load is not stuck as in-flight.
        assert!(cache.get(&spec("broken")).await.is_err());
        assert_eq!(loader.load_count("broken"), 2);
    }

    #[tokio::test]
    async fn unload_and_clear_release_sessions() {
        let loader = Arc::new(MockLoader::new(25));
        let cache = ModelCache::new(loader, 1000);
        cache.get(&spec("a")).await.unwrap();
        cache.get(&spec("b")).await.unwrap();
        cache.unload("a");
        assert_eq!(cache.cache_info().count, 1);
        cache.clear();
        assert_eq!(cache.cache_info().count, 0);
        assert_eq!(cache.cache_info().total_bytes, 0);
    }

    #[test]
    fn release_failure_is_swallowed() {
        let mut inner = Inner::default();
        inner.entries.insert(
            "x".into(),
            Entry {
                session: Arc::new(MockSession::returning(vec![], 50).failing_release()),
                byte_size: 50,
                last_used_at: 1,
            },
        );
        inner.evict_to(0);
        assert!(inner.entries.is_empty());
    }
}
