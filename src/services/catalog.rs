// Multi-provider catalog aggregation.
//
// Providers implement a common capability interface and are dispatched
// through an enumerated identifier rather than string matching. Merged
// result sets are deduplicated by lower-cased title, keeping the entry
// from the earlier-registered (higher-priority) provider.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::models::MediaSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogProvider {
    Jikan,
    Kitsu,
}

impl std::fmt::Display for CatalogProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogProvider::Jikan => write!(f, "Jikan/MAL"),
            CatalogProvider::Kitsu => write!(f, "Kitsu"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Anime,
    Manga,
}

/// Common capability interface every catalog provider implements
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn provider(&self) -> CatalogProvider;
    async fn search(&self, query: &str, page: u32, kind: MediaKind) -> Result<Vec<MediaSummary>>;
    async fn get_by_id(&self, id: &str, kind: MediaKind) -> Result<Option<MediaSummary>>;
    async fn trending(&self, kind: MediaKind) -> Result<Vec<MediaSummary>>;
}

pub struct CatalogService {
    sources: Vec<Arc<dyn CatalogSource>>,
}

impl CatalogService {
    /// Registration order is priority order for dedupe
    pub fn new(sources: Vec<Arc<dyn CatalogSource>>) -> Self {
        Self { sources }
    }

    pub async fn search(&self, query: &str, page: u32, kind: MediaKind) -> Vec<MediaSummary> {
        let calls = self
            .sources
            .iter()
            .map(|s| s.search(query, page, kind));
        let results = futures::future::join_all(calls).await;
        self.merge(results)
    }

    pub async fn trending(&self, kind: MediaKind) -> Vec<MediaSummary> {
        let calls = self.sources.iter().map(|s| s.trending(kind));
        let results = futures::future::join_all(calls).await;
        self.merge(results)
    }

    /// Lookup against one specific provider
    pub async fn get_by_id(
        &self,
        provider: CatalogProvider,
        id: &str,
        kind: MediaKind,
    ) -> Result<Option<MediaSummary>> {
        for source in &self.sources {
            if source.provider() == provider {
                return source.get_by_id(id, kind).await;
            }
        }
        Ok(None)
    }

    /// One provider failing degrades the merged set, it never fails the call
    fn merge(&self, results: Vec<Result<Vec<MediaSummary>>>) -> Vec<MediaSummary> {
        let mut merged = Vec::new();
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(entries) => merged.extend(entries),
                Err(e) => {
                    tracing::warn!("Catalog provider {} failed: {}", source.provider(), e);
                }
            }
        }
        dedupe_by_title(merged)
    }
}

/// Drop later entries whose lower-cased title was already seen
pub fn dedupe_by_title(entries: Vec<MediaSummary>) -> Vec<MediaSummary> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.title.to_lowercase()))
        .collect()
}
