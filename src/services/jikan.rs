// Jikan API client - Unofficial MyAnimeList API
// API Documentation: https://docs.api.jikan.moe/
// Rate limit: 3 requests/second, 60 requests/minute

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::catalog::{CatalogProvider, CatalogSource, MediaKind};
use crate::models::MediaSummary;

const JIKAN_API_BASE: &str = "https://api.jikan.moe/v4";

/// Jikan API client with rate limiting
pub struct JikanClient {
    client: Client,
    base_url: String,
    last_request: Arc<Mutex<Instant>>,
}

// === API Response Types ===

#[derive(Debug, Deserialize)]
pub struct JikanResponse<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct JikanListResponse {
    pub data: Vec<JikanEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanEntry {
    pub mal_id: i64,
    pub title: String,
    pub title_english: Option<String>,
    pub images: Option<JikanImages>,
    pub score: Option<f64>,
    pub synopsis: Option<String>,
    pub episodes: Option<i32>,
    pub genres: Option<Vec<JikanGenre>>,
    pub themes: Option<Vec<JikanGenre>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanImages {
    pub jpg: Option<JikanImageSet>,
    pub webp: Option<JikanImageSet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanImageSet {
    pub image_url: Option<String>,
    pub large_image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanGenre {
    pub mal_id: i64,
    pub name: String,
}

impl JikanClient {
    pub fn new() -> Self {
        Self::with_base_url(JIKAN_API_BASE.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url,
            last_request: Arc::new(Mutex::new(Instant::now() - Duration::from_secs(1))),
        }
    }

    /// Enforce rate limiting (3 requests per second)
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        let min_interval = Duration::from_millis(350); // ~3 req/sec with buffer

        if elapsed < min_interval {
            let wait = min_interval - elapsed;
            tracing::debug!("Jikan rate limit: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        *last = Instant::now();
    }

    fn kind_path(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Anime => "anime",
            MediaKind::Manga => "manga",
        }
    }

    async fn fetch_list(&self, url: &str) -> Result<Vec<JikanEntry>> {
        self.rate_limit().await;

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to reach Jikan")?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!("Jikan request failed: {} ({})", status, url);
            return Ok(vec![]);
        }

        let result: JikanListResponse = response
            .json()
            .await
            .context("Failed to parse Jikan list response")?;
        Ok(result.data)
    }

    /// Current season, MAL-side
    pub async fn seasonal_anime(&self) -> Result<Vec<MediaSummary>> {
        let url = format!("{}/seasons/now?sfw=true&limit=20", self.base_url);
        let entries = self.fetch_list(&url).await?;
        Ok(entries.iter().map(entry_to_summary).collect())
    }

    /// Top-ranked anime, MAL-side
    pub async fn top_anime(&self) -> Result<Vec<MediaSummary>> {
        let url = format!("{}/top/anime?sfw=true&limit=20", self.base_url);
        let entries = self.fetch_list(&url).await?;
        Ok(entries.iter().map(entry_to_summary).collect())
    }
}

impl Default for JikanClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a Jikan entry to the normalized catalog shape
fn entry_to_summary(entry: &JikanEntry) -> MediaSummary {
    // Prefer large jpg, then any jpg, then webp
    let cover_image = entry.images.as_ref().and_then(|images| {
        images
            .jpg
            .as_ref()
            .and_then(|jpg| jpg.large_image_url.clone().or(jpg.image_url.clone()))
            .or_else(|| {
                images
                    .webp
                    .as_ref()
                    .and_then(|webp| webp.large_image_url.clone().or(webp.image_url.clone()))
            })
    });

    let genres: Vec<String> = entry
        .genres
        .iter()
        .flatten()
        .chain(entry.themes.iter().flatten())
        .map(|g| g.name.clone())
        .collect();

    MediaSummary {
        id: entry.mal_id.to_string(),
        provider: "jikan".to_string(),
        title: entry.title_english.clone().unwrap_or_else(|| entry.title.clone()),
        cover_image,
        rating: entry.score,
        genres,
        synopsis: entry.synopsis.clone(),
        episode_count: entry.episodes,
    }
}

#[async_trait]
impl CatalogSource for JikanClient {
    fn provider(&self) -> CatalogProvider {
        CatalogProvider::Jikan
    }

    async fn search(&self, query: &str, page: u32, kind: MediaKind) -> Result<Vec<MediaSummary>> {
        let url = format!(
            "{}/{}?q={}&page={}&sfw=true&limit=10",
            self.base_url,
            Self::kind_path(kind),
            urlencoding::encode(query),
            page.max(1)
        );
        let entries = self.fetch_list(&url).await?;
        Ok(entries.iter().map(entry_to_summary).collect())
    }

    async fn get_by_id(&self, id: &str, kind: MediaKind) -> Result<Option<MediaSummary>> {
        self.rate_limit().await;

        let url = format!("{}/{}/{}", self.base_url, Self::kind_path(kind), id);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to reach Jikan")?;

        if !response.status().is_success() {
            if response.status().as_u16() == 404 {
                return Ok(None);
            }
            tracing::warn!("Jikan request failed: {}", response.status());
            return Ok(None);
        }

        let result: JikanResponse<JikanEntry> = response
            .json()
            .await
            .context("Failed to parse Jikan response")?;
        Ok(Some(entry_to_summary(&result.data)))
    }

    async fn trending(&self, kind: MediaKind) -> Result<Vec<MediaSummary>> {
        // MAL has no "airing" filter for manga; publishing is the equivalent
        let filter = match kind {
            MediaKind::Anime => "airing",
            MediaKind::Manga => "publishing",
        };
        let url = format!(
            "{}/top/{}?filter={}&sfw=true&limit=20",
            self.base_url,
            Self::kind_path(kind),
            filter
        );
        let entries = self.fetch_list(&url).await?;
        Ok(entries.iter().map(entry_to_summary).collect())
    }
}
