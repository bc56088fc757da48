// Stream resolution pipeline.
//
// Given a catalog anime id (MAL-style numeric) and an episode id, produce a
// StreamResult for the player. Every external step is individually
// best-effort: a cache miss, a failed id normalization, or a missing title
// degrades the result instead of aborting. Only the complete absence of any
// usable source, including generated fallback links, is a hard failure.

use serde::Serialize;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use crate::cache::Cache;
use crate::services::anilist::IdNormalizer;
use crate::services::consumet::StreamingProvider;
use crate::models::StreamResult;

const STREAM_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Diagnostic context returned when resolution fails entirely
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDiagnostics {
    pub anime_id: String,
    pub episode_id: String,
    pub episode_number: u32,
    pub anilist_id: Option<i64>,
}

#[derive(Debug)]
pub struct ResolveFailure {
    pub message: String,
    pub diagnostics: StreamDiagnostics,
}

pub struct StreamResolver {
    streaming: Arc<dyn StreamingProvider>,
    normalizer: Arc<dyn IdNormalizer>,
    cache: Option<Arc<dyn Cache>>,
}

/// Episode number embedded as a `-ep-<n>` suffix; 1 for any other form
pub fn parse_episode_number(episode_id: &str) -> u32 {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = RE.get_or_init(|| regex::Regex::new(r"-ep-(\d+)$").unwrap());

    re.captures(episode_id)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1)
}

impl StreamResolver {
    pub fn new(
        streaming: Arc<dyn StreamingProvider>,
        normalizer: Arc<dyn IdNormalizer>,
        cache: Option<Arc<dyn Cache>>,
    ) -> Self {
        Self {
            streaming,
            normalizer,
            cache,
        }
    }

    pub async fn resolve(
        &self,
        anime_id: &str,
        episode_id: &str,
    ) -> Result<StreamResult, ResolveFailure> {
        let episode_number = parse_episode_number(episode_id);
        let cache_key = format!("stream:{}:{}", anime_id, episode_id);

        // Step 1: cache lookup. Corrupt or missing entries just fall through.
        if let Some(cache) = &self.cache {
            if let Some(raw) = cache.get(&cache_key).await {
                match serde_json::from_str::<StreamResult>(&raw) {
                    Ok(cached) => {
                        tracing::debug!("Stream cache hit for {}", cache_key);
                        return Ok(cached);
                    }
                    Err(e) => {
                        tracing::warn!("Discarding unreadable cache entry {}: {}", cache_key, e);
                    }
                }
            }
        }

        // Step 2: normalize the MAL-style id into the provider's id space.
        // Non-numeric ids and lookup failures keep the original id.
        let normalized = match anime_id.parse::<i64>() {
            Ok(mal_id) => match self.normalizer.normalize_id(mal_id).await {
                Ok(n) => {
                    tracing::debug!("Normalized MAL id {} -> AniList id {}", mal_id, n.anilist_id);
                    Some(n)
                }
                Err(e) => {
                    tracing::warn!("Id normalization failed for {}: {}", mal_id, e);
                    None
                }
            },
            Err(_) => None,
        };

        let anilist_id = normalized.as_ref().map(|n| n.anilist_id);
        // Step 3: title resolution rides along with normalization.
        let title = normalized
            .as_ref()
            .and_then(|n| n.preferred_title())
            .map(str::to_string);

        let effective_id = anilist_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| anime_id.to_string());

        // Step 4: primary resolution.
        match self
            .streaming
            .get_streaming_sources(&effective_id, episode_id, title.as_deref())
            .await
        {
            Ok(Some(result)) if result.is_usable() => {
                self.cache_result(&cache_key, &result).await;
                return Ok(result);
            }
            Ok(_) => {
                tracing::info!(
                    "No direct stream for anime {} episode {}, falling back",
                    anime_id,
                    episode_id
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Streaming provider failed for anime {} episode {}: {}",
                    anime_id,
                    episode_id,
                    e
                );
            }
        }

        // Step 5: external fallback links.
        match self
            .streaming
            .fallback_links(episode_id, title.as_deref())
            .await
        {
            Ok(links) => {
                let result = StreamResult::Fallback {
                    links,
                    provider: "fallback".to_string(),
                };
                self.cache_result(&cache_key, &result).await;
                Ok(result)
            }
            // Step 6: even fallback generation failed.
            Err(e) => Err(ResolveFailure {
                message: format!("No streaming sources found: {}", e),
                diagnostics: StreamDiagnostics {
                    anime_id: anime_id.to_string(),
                    episode_id: episode_id.to_string(),
                    episode_number,
                    anilist_id,
                },
            }),
        }
    }

    /// Best-effort cache write; serialization failure is logged only
    async fn cache_result(&self, key: &str, result: &StreamResult) {
        let Some(cache) = &self.cache else {
            return;
        };
        match serde_json::to_string(result) {
            Ok(raw) => cache.set_ex(key, raw, STREAM_CACHE_TTL).await,
            Err(e) => tracing::warn!("Failed to serialize stream result for {}: {}", key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::{FallbackLink, StreamSource};
    use crate::services::anilist::{NormalizeError, NormalizedId};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockStreaming {
        result: Option<StreamResult>,
        fail_sources: bool,
        fail_fallback: bool,
        fallback: Vec<FallbackLink>,
        source_calls: AtomicUsize,
    }

    impl MockStreaming {
        fn returning(result: Option<StreamResult>) -> Self {
            Self {
                result,
                fail_sources: false,
                fail_fallback: false,
                fallback: vec![FallbackLink {
                    name: "SiteA".to_string(),
                    url: "http://a".to_string(),
                    link_type: "external".to_string(),
                }],
                source_calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            let mut mock = Self::returning(None);
            mock.fail_sources = true;
            mock
        }
    }

    #[async_trait]
    impl StreamingProvider for MockStreaming {
        async fn get_streaming_sources(
            &self,
            _anime_id: &str,
            _episode_id: &str,
            _title: Option<&str>,
        ) -> Result<Option<StreamResult>> {
            self.source_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_sources {
                return Err(anyhow!("provider down"));
            }
            Ok(self.result.clone())
        }

        async fn fallback_links(
            &self,
            _episode_id: &str,
            _title: Option<&str>,
        ) -> Result<Vec<FallbackLink>> {
            if self.fail_fallback {
                return Err(anyhow!("fallback generator broken"));
            }
            Ok(self.fallback.clone())
        }
    }

    struct MockNormalizer {
        result: Option<NormalizedId>,
    }

    #[async_trait]
    impl IdNormalizer for MockNormalizer {
        async fn normalize_id(&self, mal_id: i64) -> Result<NormalizedId, NormalizeError> {
            self.result
                .clone()
                .ok_or(NormalizeError::NotFound(mal_id))
        }
    }

    fn one_piece_normalized() -> NormalizedId {
        NormalizedId {
            anilist_id: 21,
            title_english: Some("One Piece".to_string()),
            title_romaji: None,
            title_native: None,
        }
    }

    fn stream_result() -> StreamResult {
        StreamResult::Stream {
            sources: vec![StreamSource {
                url: "http://x/v.m3u8".to_string(),
                quality: "1080p".to_string(),
                is_m3u8: true,
            }],
            headers: None,
        }
    }

    #[test]
    fn episode_number_extracted_from_suffix() {
        assert_eq!(parse_episode_number("21-ep-5"), 5);
        assert_eq!(parse_episode_number("one-piece-ep-1071"), 1071);
        assert_eq!(parse_episode_number("ep-1"), 1);
        assert_eq!(parse_episode_number("21"), 1);
        assert_eq!(parse_episode_number("weird-ep-"), 1);
    }

    // End-to-end scenario: direct hit, then a cache hit without a second
    // provider call.
    #[tokio::test]
    async fn resolves_direct_stream_and_caches_it() {
        let streaming = Arc::new(MockStreaming::returning(Some(stream_result())));
        let resolver = StreamResolver::new(
            streaming.clone(),
            Arc::new(MockNormalizer {
                result: Some(one_piece_normalized()),
            }),
            Some(Arc::new(MemoryCache::new())),
        );

        let first = resolver.resolve("21", "21-ep-5").await.unwrap();
        match &first {
            StreamResult::Stream { sources, .. } => assert_eq!(sources.len(), 1),
            other => panic!("expected stream, got {:?}", other),
        }

        let second = resolver.resolve("21", "21-ep-5").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(streaming.source_calls.load(Ordering::SeqCst), 1);
    }

    // End-to-end scenario: provider throws, fallback links still come back.
    #[tokio::test]
    async fn provider_failure_degrades_to_fallback() {
        let resolver = StreamResolver::new(
            Arc::new(MockStreaming::failing()),
            Arc::new(MockNormalizer { result: None }),
            None,
        );

        let result = resolver.resolve("999", "ep-1").await.unwrap();
        match result {
            StreamResult::Fallback { links, provider } => {
                assert_eq!(provider, "fallback");
                assert_eq!(links.len(), 1);
                assert_eq!(links[0].name, "SiteA");
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_provider_result_is_not_usable() {
        let empty = StreamResult::Stream {
            sources: vec![],
            headers: None,
        };
        let resolver = StreamResolver::new(
            Arc::new(MockStreaming::returning(Some(empty))),
            Arc::new(MockNormalizer { result: None }),
            None,
        );

        let result = resolver.resolve("21", "21-ep-2").await.unwrap();
        assert!(matches!(result, StreamResult::Fallback { .. }));
    }

    #[tokio::test]
    async fn total_failure_carries_diagnostics() {
        let mut streaming = MockStreaming::failing();
        streaming.fail_fallback = true;

        let resolver = StreamResolver::new(
            Arc::new(streaming),
            Arc::new(MockNormalizer { result: None }),
            None,
        );

        let failure = resolver.resolve("21", "21-ep-7").await.unwrap_err();
        assert_eq!(failure.diagnostics.anime_id, "21");
        assert_eq!(failure.diagnostics.episode_id, "21-ep-7");
        assert_eq!(failure.diagnostics.episode_number, 7);
        assert_eq!(failure.diagnostics.anilist_id, None);
    }

    #[tokio::test]
    async fn fallback_results_are_cached_too() {
        let cache: Arc<MemoryCache> = Arc::new(MemoryCache::new());
        let resolver = StreamResolver::new(
            Arc::new(MockStreaming::returning(None)),
            Arc::new(MockNormalizer { result: None }),
            Some(cache.clone()),
        );

        resolver.resolve("42", "42-ep-3").await.unwrap();
        let raw = cache.get("stream:42:42-ep-3").await.unwrap();
        let cached: StreamResult = serde_json::from_str(&raw).unwrap();
        assert!(matches!(cached, StreamResult::Fallback { .. }));
    }

    #[tokio::test]
    async fn corrupt_cache_entry_falls_through_to_provider() {
        let cache: Arc<MemoryCache> = Arc::new(MemoryCache::new());
        cache
            .set_ex(
                "stream:21:21-ep-5",
                "not json".to_string(),
                Duration::from_secs(60),
            )
            .await;

        let streaming = Arc::new(MockStreaming::returning(Some(stream_result())));
        let resolver = StreamResolver::new(
            streaming.clone(),
            Arc::new(MockNormalizer { result: None }),
            Some(cache),
        );

        let result = resolver.resolve("21", "21-ep-5").await.unwrap();
        assert!(matches!(result, StreamResult::Stream { .. }));
        assert_eq!(streaming.source_calls.load(Ordering::SeqCst), 1);
    }
}
