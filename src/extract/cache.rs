use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::metrics::Metrics;
use crate::report::Reporter;

use super::extractor::{Extract, ExtractError, MediaExtractor};
use super::source::SourceReference;
use super::AudioArtifact;

struct CacheEntry {
    artifact: Arc<AudioArtifact>,
    stored_at: Instant,
}

/// Expiring artifact map keyed by source identity. Expiry is lazy: an entry
/// past its TTL is dropped on the lookup that finds it, there is no sweeper.
struct TtlCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl TtlCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<Arc<AudioArtifact>> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.artifact.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&self, key: String, artifact: Arc<AudioArtifact>) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            CacheEntry {
                artifact,
                stored_at: Instant::now(),
            },
        );
    }
}

/// TTL-cached front of an [`Extract`] implementation.
///
/// Guarantees at most one extraction per source within the TTL window: a gate
/// mutex serializes the extract path, and the cache is re-checked after the
/// gate is acquired so callers queued behind an in-progress extraction reuse
/// its result instead of repeating it. Failures are never cached; the next
/// call for the same source extracts again.
pub struct ExtractionCache<E = MediaExtractor> {
    cache: TtlCache,
    extractor: E,
    gate: tokio::sync::Mutex<()>,
    metrics: Arc<Metrics>,
}

impl ExtractionCache<MediaExtractor> {
    /// Cache over the real ffmpeg extractor, sized from configuration:
    /// window from `EXTRACT_CACHE_TTL_SEC`, extractor limits per
    /// [`MediaExtractor::from_config`].
    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> Result<Self, ExtractError> {
        let extractor = MediaExtractor::from_config(config)?;
        Ok(Self::new(
            extractor,
            Duration::from_secs(config.extract_cache_ttl_sec),
            metrics,
        ))
    }
}

impl<E: Extract> ExtractionCache<E> {
    pub fn new(extractor: E, ttl: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            cache: TtlCache::new(ttl),
            extractor,
            gate: tokio::sync::Mutex::new(()),
            metrics,
        }
    }

    /// Returns the cached artifact for `source`, extracting it first if the
    /// cache has no fresh entry. Progress is reported only when an actual
    /// extraction runs; cache hits are silent and immediate.
    pub async fn get_or_extract(
        &self,
        source: &SourceReference,
        reporter: &Reporter,
    ) -> Result<Arc<AudioArtifact>, ExtractError> {
        let key = source.identity();

        if let Some(artifact) = self.cache.get(&key) {
            self.metrics.inc_cache_hits();
            tracing::debug!("♻️ Cache hit for {source}");
            return Ok(artifact);
        }

        let _gate = self.gate.lock().await;
        // A caller that held the gate may have populated the entry meanwhile.
        if let Some(artifact) = self.cache.get(&key) {
            self.metrics.inc_cache_hits();
            tracing::debug!("♻️ Cache hit for {source}");
            return Ok(artifact);
        }

        let artifact = Arc::new(self.extractor.extract(source, reporter).await?);
        self.metrics.inc_extractions();
        self.cache.insert(key, artifact.clone());
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;

    use super::*;

    fn artifact(name: &str) -> Arc<AudioArtifact> {
        Arc::new(AudioArtifact {
            filename: name.to_string(),
            wav: vec![0; 44],
            duration_secs: 1.0,
        })
    }

    /// Counts every real extraction; optionally fails the first call.
    struct CountingExtractor {
        calls: AtomicUsize,
        fail_next: AtomicBool,
    }

    impl CountingExtractor {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_next: AtomicBool::new(false),
            }
        }

        fn failing_once() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_next: AtomicBool::new(true),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Extract for CountingExtractor {
        fn extract<'a>(
            &'a self,
            source: &'a SourceReference,
            _reporter: &'a Reporter,
        ) -> BoxFuture<'a, Result<AudioArtifact, ExtractError>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                // Yield so a concurrent caller can reach the gate mid-run.
                tokio::time::sleep(Duration::from_millis(10)).await;
                if self.fail_next.swap(false, Ordering::SeqCst) {
                    return Err(ExtractError::EmptyOutput);
                }
                Ok(AudioArtifact {
                    filename: format!("{}.wav", source.artifact_stem()),
                    wav: vec![0; 44],
                    duration_secs: 1.0,
                })
            }
            .boxed()
        }
    }

    fn counting_cache(extractor: CountingExtractor, ttl: Duration) -> ExtractionCache<CountingExtractor> {
        ExtractionCache::new(extractor, ttl, Metrics::new())
    }

    #[tokio::test]
    async fn repeated_source_extracts_once_within_the_ttl() {
        let cache = counting_cache(CountingExtractor::new(), Duration::from_secs(60));
        let source = SourceReference::RemoteUrl("https://example.com/talk.mp4".into());

        let first = cache.get_or_extract(&source, &Reporter::noop()).await.unwrap();
        let second = cache.get_or_extract(&source, &Reporter::noop()).await.unwrap();

        assert_eq!(cache.extractor.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));

        let snapshot = cache.metrics.snapshot();
        assert_eq!(snapshot.extractions_performed, 1);
        assert_eq!(snapshot.extraction_cache_hits, 1);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_extraction() {
        let cache = counting_cache(CountingExtractor::new(), Duration::from_secs(60));
        let source = SourceReference::RemoteUrl("https://example.com/talk.mp4".into());

        // Both miss the cache, both reach the gate; the second one must pick
        // up the first one's result on the post-gate re-check.
        let reporter = Reporter::noop();
        let (a, b) = tokio::join!(
            cache.get_or_extract(&source, &reporter),
            cache.get_or_extract(&source, &reporter),
        );

        assert_eq!(cache.extractor.calls(), 1);
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[tokio::test]
    async fn distinct_sources_each_extract() {
        let cache = counting_cache(CountingExtractor::new(), Duration::from_secs(60));
        let a = SourceReference::RemoteUrl("https://example.com/a.mp4".into());
        let b = SourceReference::RemoteUrl("https://example.com/b.mp4".into());

        cache.get_or_extract(&a, &Reporter::noop()).await.unwrap();
        cache.get_or_extract(&b, &Reporter::noop()).await.unwrap();
        assert_eq!(cache.extractor.calls(), 2);
    }

    #[tokio::test]
    async fn expired_entry_triggers_a_fresh_extraction() {
        let cache = counting_cache(CountingExtractor::new(), Duration::from_millis(20));
        let source = SourceReference::RemoteUrl("https://example.com/talk.mp4".into());

        cache.get_or_extract(&source, &Reporter::noop()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.get_or_extract(&source, &Reporter::noop()).await.unwrap();

        assert_eq!(cache.extractor.calls(), 2);
    }

    #[tokio::test]
    async fn failures_are_never_cached() {
        let cache = counting_cache(CountingExtractor::failing_once(), Duration::from_secs(60));
        let source = SourceReference::RemoteUrl("https://example.com/talk.mp4".into());

        let err = cache.get_or_extract(&source, &Reporter::noop()).await;
        assert!(err.is_err());

        // The retry goes back to the extractor instead of a cached failure.
        let ok = cache.get_or_extract(&source, &Reporter::noop()).await;
        assert!(ok.is_ok());
        assert_eq!(cache.extractor.calls(), 2);
        assert_eq!(cache.metrics.snapshot().extraction_cache_hits, 0);
    }

    #[test]
    fn hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a".into(), artifact("a.wav"));

        let hit = cache.get("a").unwrap();
        assert_eq!(hit.filename, "a.wav");
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn entry_expires_after_ttl() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.insert("a".into(), artifact("a.wav"));
        assert!(cache.get("a").is_some());

        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("a").is_none());
        // The expired entry was dropped, not just hidden.
        assert!(cache
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty());
    }

    #[test]
    fn reinsert_refreshes_the_clock() {
        let cache = TtlCache::new(Duration::from_millis(40));
        cache.insert("a".into(), artifact("old.wav"));
        std::thread::sleep(Duration::from_millis(25));

        cache.insert("a".into(), artifact("new.wav"));
        std::thread::sleep(Duration::from_millis(25));

        // 50ms after the first insert but only 25ms after the second.
        let hit = cache.get("a").unwrap();
        assert_eq!(hit.filename, "new.wav");
    }
}
