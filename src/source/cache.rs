//! Window cache for sample sources
//!
//! Remembers the last window fetched per variable. A request that falls
//! inside a remembered window is answered from memory; anything else goes to
//! the wrapped source and replaces the remembered window.

use super::{window, FetchResult, Sample, SampleSource};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

#[derive(Debug)]
struct CachedWindow {
    t0: i64,
    t1: i64,
    samples: Vec<Sample>,
}

impl CachedWindow {
    fn covers(&self, t0: i64, t1: i64) -> bool {
        self.t0 <= t0 && t1 <= self.t1
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub variables: usize,
}

/// Sample source that caches one window per variable
pub struct CachedSource<S> {
    inner: S,
    windows: RefCell<HashMap<String, CachedWindow>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl<S: SampleSource> CachedSource<S> {
    /// Wrap a source
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            windows: RefCell::new(HashMap::new()),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    /// Wrapped source
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.get(),
            misses: self.misses.get(),
            variables: self.windows.borrow().len(),
        }
    }

    /// Forget every cached window
    pub fn clear(&self) {
        self.windows.borrow_mut().clear();
    }
}

impl<S: SampleSource> SampleSource for CachedSource<S> {
    fn fetch(&self, name: &str, t0: i64, t1: i64) -> FetchResult<Vec<Sample>> {
        if let Some(cached) = self.windows.borrow().get(name) {
            if cached.covers(t0, t1) {
                self.hits.set(self.hits.get() + 1);
                tracing::debug!(name, t0, t1, "Sample cache hit");
                return Ok(window(&cached.samples, t0, t1).to_vec());
            }
        }

        self.misses.set(self.misses.get() + 1);
        tracing::debug!(name, t0, t1, "Sample cache miss");

        let samples = self.inner.fetch(name, t0, t1)?;
        self.windows.borrow_mut().insert(
            name.to_string(),
            CachedWindow {
                t0,
                t1,
                samples: samples.clone(),
            },
        );
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FetchError, MemorySource};

    fn source() -> CachedSource<MemorySource> {
        CachedSource::new(
            MemorySource::new()
                .with_variable("A", [(0, 5.0), (10, 15.0), (20, 8.0)])
                .with_variable("B", [(0, 2.0), (15, 6.0)]),
        )
    }

    #[test]
    fn test_hit_inside_window() {
        let cache = source();
        let full = cache.fetch("A", 0, 30).unwrap();
        assert_eq!(full.len(), 3);

        let part = cache.fetch("A", 12, 18).unwrap();
        assert_eq!(part, vec![Sample::new(10, 15.0)]);
        assert_eq!(part, cache.inner().fetch("A", 12, 18).unwrap());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.variables, 1);
    }

    #[test]
    fn test_miss_outside_window() {
        let cache = source();
        cache.fetch("A", 10, 20).unwrap();
        let wider = cache.fetch("A", 0, 30).unwrap();
        assert_eq!(wider.len(), 3);
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_errors_not_cached() {
        let cache = source();
        assert!(matches!(
            cache.fetch("C", 0, 10),
            Err(FetchError::VariableNotFound(_))
        ));
        assert_eq!(cache.stats().variables, 0);
    }

    #[test]
    fn test_clear() {
        let cache = source();
        cache.fetch("B", 0, 30).unwrap();
        cache.clear();
        cache.fetch("B", 0, 30).unwrap();
        assert_eq!(cache.stats().misses, 2);
    }
}
