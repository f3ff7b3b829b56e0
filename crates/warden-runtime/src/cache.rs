//! Review cache.
//!
//! Successful form reviews are cached in memory so an unchanged form is not
//! sent to the model twice. Fallbacks are never cached; the next request
//! gets a fresh attempt.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use moka::future::Cache;

use warden_core::FieldSuggestion;

use crate::adapters::{FormReviewAdapter, FormReviewRequest, Guarded};
use crate::config::CacheConfig;

/// Cache key: a hash of every field of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReviewKey(u64);

impl ReviewKey {
    pub fn new(request: &FormReviewRequest) -> Self {
        let mut hasher = DefaultHasher::new();
        request.document_type.hash(&mut hasher);
        // serde_json maps are ordered, so equal values print identically.
        request.schema.to_string().hash(&mut hasher);
        request.answers.to_string().hash(&mut hasher);
        request.language.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// In-memory cache of successful reviews.
#[derive(Clone)]
pub struct ReviewCache {
    cache: Cache<ReviewKey, Vec<FieldSuggestion>>,
}

impl ReviewCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl)
    }

    pub async fn get(&self, key: &ReviewKey) -> Option<Vec<FieldSuggestion>> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: ReviewKey, suggestions: Vec<FieldSuggestion>) {
        self.cache.insert(key, suggestions).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for ReviewCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl std::fmt::Debug for ReviewCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewCache")
            .field("entries", &self.entry_count())
            .finish()
    }
}

/// Form review with an optional cache in front of it.
#[derive(Debug, Clone)]
pub struct CachedFormReview {
    adapter: FormReviewAdapter,
    cache: Option<ReviewCache>,
}

impl CachedFormReview {
    pub fn new(adapter: FormReviewAdapter, cache: Option<ReviewCache>) -> Self {
        Self { adapter, cache }
    }

    pub fn adapter(&self) -> &FormReviewAdapter {
        &self.adapter
    }

    pub async fn review(&self, request: &FormReviewRequest) -> Vec<FieldSuggestion> {
        let Some(cache) = &self.cache else {
            return self.adapter.review(request).await;
        };

        let key = ReviewKey::new(request);
        if let Some(hit) = cache.get(&key).await {
            tracing::debug!(document_type = %request.document_type, "Review cache hit");
            return hit;
        }

        match self.adapter.review_guarded(request).await {
            Guarded::Parsed(suggestions) => {
                cache.insert(key, suggestions.clone()).await;
                suggestions
            }
            Guarded::Fallback(suggestions) => suggestions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::orchestrator::GuardedGenerator;
    use crate::providers::ProviderError;
    use crate::testing::{BackendStep, ScriptedBackend, ScriptedEvaluator};

    fn request(rent: &str) -> FormReviewRequest {
        serde_json::from_value(serde_json::json!({
            "documentType": "residential-lease",
            "schema": { "fields": [ { "id": "rent" } ] },
            "answers": { "rent": rent }
        }))
        .unwrap()
    }

    fn cached(backend: Arc<ScriptedBackend>) -> CachedFormReview {
        let generator = GuardedGenerator::builder()
            .evaluator(Arc::new(ScriptedEvaluator::allow_all()))
            .backend(backend)
            .build()
            .unwrap();
        CachedFormReview::new(
            FormReviewAdapter::new(Arc::new(generator)),
            Some(ReviewCache::new(100, Duration::from_secs(60))),
        )
    }

    #[test]
    fn test_key_is_stable() {
        assert_eq!(ReviewKey::new(&request("1200")), ReviewKey::new(&request("1200")));
        assert_ne!(ReviewKey::new(&request("1200")), ReviewKey::new(&request("1300")));
    }

    #[tokio::test]
    async fn test_success_is_cached() {
        let backend = Arc::new(ScriptedBackend::replying(
            r#"[{"fieldId": "rent", "importance": "info", "message": "Looks fine."}]"#,
        ));
        let review = cached(backend.clone());

        let first = review.review(&request("1200")).await;
        let second = review.review(&request("1200")).await;

        assert_eq!(first, second);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_is_not_cached() {
        let backend = Arc::new(ScriptedBackend::new([
            BackendStep::Fail(ProviderError::HttpError("connection refused".to_string())),
            BackendStep::Content("[]".to_string()),
        ]));
        let review = cached(backend.clone());

        let first = review.review(&request("1200")).await;
        assert!(first[0].is_general());

        let second = review.review(&request("1200")).await;
        assert!(second.is_empty());
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_without_cache() {
        let backend = Arc::new(ScriptedBackend::replying("[]"));
        let generator = GuardedGenerator::builder()
            .evaluator(Arc::new(ScriptedEvaluator::allow_all()))
            .backend(backend.clone())
            .build()
            .unwrap();
        let review = CachedFormReview::new(FormReviewAdapter::new(Arc::new(generator)), None);

        review.review(&request("1")).await;
        review.review(&request("1")).await;
        assert_eq!(backend.call_count(), 2);
    }
}
