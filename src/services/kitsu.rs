// Kitsu API client (JSON:API attribute envelopes, no key required)

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::catalog::{CatalogProvider, CatalogSource, MediaKind};
use crate::models::MediaSummary;

const KITSU_API_BASE: &str = "https://kitsu.io/api/edge";

pub struct KitsuClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct KitsuListResponse {
    data: Vec<KitsuEntry>,
}

#[derive(Debug, Deserialize)]
struct KitsuItemResponse {
    data: KitsuEntry,
}

#[derive(Debug, Deserialize)]
struct KitsuEntry {
    id: String,
    attributes: KitsuAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KitsuAttributes {
    canonical_title: String,
    synopsis: Option<String>,
    /// 0-100 scale, serialized as a string
    average_rating: Option<String>,
    episode_count: Option<i32>,
    poster_image: Option<KitsuPoster>,
}

#[derive(Debug, Deserialize)]
struct KitsuPoster {
    original: Option<String>,
    large: Option<String>,
}

impl KitsuClient {
    pub fn new() -> Self {
        Self::with_base_url(KITSU_API_BASE.to_string())
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

    fn kind_path(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Anime => "anime",
            MediaKind::Manga => "manga",
        }
    }

    async fn fetch_list(&self, url: &str) -> Result<Vec<KitsuEntry>> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/vnd.api+json")
            .send()
            .await
            .context("Failed to reach Kitsu")?;

        if !response.status().is_success() {
            tracing::warn!("Kitsu request failed: {} ({})", response.status(), url);
            return Ok(vec![]);
        }

        let result: KitsuListResponse = response
            .json()
            .await
            .context("Failed to parse Kitsu list response")?;
        Ok(result.data)
    }
}

impl Default for KitsuClient {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_to_summary(entry: &KitsuEntry) -> MediaSummary {
    let attrs = &entry.attributes;

    // Kitsu ratings are 0-100, normalize to the shared 0-10 scale
    let rating = attrs
        .average_rating
        .as_deref()
        .and_then(|r| r.parse::<f64>().ok())
        .map(|r| r / 10.0);

    let cover_image = attrs
        .poster_image
        .as_ref()
        .and_then(|p| p.original.clone().or_else(|| p.large.clone()));

    MediaSummary {
        id: entry.id.clone(),
        provider: "kitsu".to_string(),
        title: attrs.canonical_title.clone(),
        cover_image,
        rating,
        genres: Vec::new(),
        synopsis: attrs.synopsis.clone(),
        episode_count: attrs.episode_count,
    }
}

#[async_trait]
impl CatalogSource for KitsuClient {
    fn provider(&self) -> CatalogProvider {
        CatalogProvider::Kitsu
    }

    async fn search(&self, query: &str, page: u32, kind: MediaKind) -> Result<Vec<MediaSummary>> {
        let offset = (page.max(1) - 1) * 10;
        let url = format!(
            "{}/{}?filter[text]={}&page[limit]=10&page[offset]={}",
            self.base_url,
            Self::kind_path(kind),
            urlencoding::encode(query),
            offset
        );
        let entries = self.fetch_list(&url).await?;
        Ok(entries.iter().map(entry_to_summary).collect())
    }

    async fn get_by_id(&self, id: &str, kind: MediaKind) -> Result<Option<MediaSummary>> {
        let url = format!("{}/{}/{}", self.base_url, Self::kind_path(kind), id);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.api+json")
            .send()
            .await
            .context("Failed to reach Kitsu")?;

        if !response.status().is_success() {
            if response.status().as_u16() == 404 {
                return Ok(None);
            }
            tracing::warn!("Kitsu request failed: {}", response.status());
            return Ok(None);
        }

        let result: KitsuItemResponse = response
            .json()
            .await
            .context("Failed to parse Kitsu response")?;
        Ok(Some(entry_to_summary(&result.data)))
    }

    async fn trending(&self, kind: MediaKind) -> Result<Vec<MediaSummary>> {
        let url = format!("{}/trending/{}", self.base_url, Self::kind_path(kind));
        let entries = self.fetch_list(&url).await?;
        Ok(entries.iter().map(entry_to_summary).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_parses_and_normalizes_rating() {
        let raw = r#"{
            "id": "12",
            "attributes": {
                "canonicalTitle": "One Piece",
                "synopsis": "Pirates.",
                "averageRating": "82.5",
                "episodeCount": 1000,
                "posterImage": {"original": "http://img/o.jpg", "large": "http://img/l.jpg"}
            }
        }"#;
        let entry: KitsuEntry = serde_json::from_str(raw).unwrap();
        let summary = entry_to_summary(&entry);

        assert_eq!(summary.provider, "kitsu");
        assert_eq!(summary.rating, Some(8.25));
        assert_eq!(summary.cover_image.as_deref(), Some("http://img/o.jpg"));
    }

    #[test]
    fn unparseable_rating_is_dropped() {
        let raw = r#"{"id": "9", "attributes": {"canonicalTitle": "X"}}"#;
        let entry: KitsuEntry = serde_json::from_str(raw).unwrap();
        let summary = entry_to_summary(&entry);
        assert_eq!(summary.rating, None);
        assert_eq!(summary.title, "X");
    }
}
