// Manga chapter source (MangaDex-compatible API).
//
// The narration pipeline only needs page-level metadata; when the fetch
// fails the pipeline substitutes `ChapterInfo::placeholder`, which keeps
// narration degrading to a short opening/closing-only script.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const MANGADEX_API_BASE: &str = "https://api.mangadex.org";

/// Page-level chapter metadata used to derive a narration script
#[derive(Debug, Clone)]
pub struct ChapterInfo {
    pub id: String,
    pub title: String,
    pub chapter_number: u32,
    pub pages: Vec<String>,
}

impl ChapterInfo {
    /// Minimal stand-in used when the source provider is unavailable
    pub fn placeholder(manga_id: &str, chapter_number: u32) -> Self {
        Self {
            id: format!("{}-ch-{}", manga_id, chapter_number),
            title: format!("Chapter {}", chapter_number),
            chapter_number,
            pages: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ChapterSource: Send + Sync {
    async fn fetch_chapter(&self, manga_id: &str, chapter_number: u32) -> Result<ChapterInfo>;
}

pub struct MangaDexClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChapterListResponse {
    data: Vec<ChapterEntry>,
}

#[derive(Debug, Deserialize)]
struct ChapterEntry {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Debug, Deserialize)]
struct ChapterAttributes {
    title: Option<String>,
    chapter: Option<String>,
    #[serde(default)]
    pages: u32,
}

#[derive(Debug, Deserialize)]
struct AtHomeResponse {
    #[serde(rename = "baseUrl")]
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
struct AtHomeChapter {
    hash: String,
    data: Vec<String>,
}

impl MangaDexClient {
    pub fn new() -> Self {
        Self::with_base_url(MANGADEX_API_BASE.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url,
        }
    }

    async fn find_chapter(&self, manga_id: &str, chapter_number: u32) -> Result<ChapterEntry> {
        let url = format!(
            "{}/manga/{}/feed?translatedLanguage[]=en&chapter={}&limit=1",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(manga_id),
            chapter_number
        );

        let response: ChapterListResponse = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach chapter source")?
            .json()
            .await
            .context("Failed to parse chapter feed")?;

        response
            .data
            .into_iter()
            .next()
            .with_context(|| format!("Chapter {} not found for manga {}", chapter_number, manga_id))
    }

    async fn page_urls(&self, chapter_id: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/at-home/server/{}",
            self.base_url.trim_end_matches('/'),
            chapter_id
        );

        let response: AtHomeResponse = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach page server")?
            .json()
            .await
            .context("Failed to parse page server response")?;

        Ok(response
            .chapter
            .data
            .iter()
            .map(|file| format!("{}/data/{}/{}", response.base_url, response.chapter.hash, file))
            .collect())
    }
}

impl Default for MangaDexClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChapterSource for MangaDexClient {
    async fn fetch_chapter(&self, manga_id: &str, chapter_number: u32) -> Result<ChapterInfo> {
        let entry = self.find_chapter(manga_id, chapter_number).await?;

        let pages = match self.page_urls(&entry.id).await {
            Ok(pages) => pages,
            Err(e) => {
                // Page-server failure still leaves us with chapter metadata;
                // the declared page count drives a pageless content model.
                tracing::warn!("Page fetch failed for chapter {}: {}", entry.id, e);
                (0..entry.attributes.pages).map(|i| format!("page-{}", i + 1)).collect()
            }
        };

        let title = entry
            .attributes
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Chapter {}", chapter_number));

        let chapter_number = entry
            .attributes
            .chapter
            .and_then(|c| c.parse().ok())
            .unwrap_or(chapter_number);

        Ok(ChapterInfo {
            id: entry.id,
            title,
            chapter_number,
            pages,
        })
    }
}
