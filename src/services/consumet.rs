// Streaming-metadata provider client (Consumet-compatible API).
//
// Resolution never hard-fails here: non-2xx responses and empty payloads
// become Ok(None) so the resolver can move on to fallback links.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::models::{FallbackLink, StreamResult, StreamSource};

/// Resolves playable sources and fallback links for one episode
#[async_trait]
pub trait StreamingProvider: Send + Sync {
    /// Direct sources or an embeddable URL, None when nothing was found
    async fn get_streaming_sources(
        &self,
        anime_id: &str,
        episode_id: &str,
        title: Option<&str>,
    ) -> Result<Option<StreamResult>>;

    /// External-site links used when no direct stream exists
    async fn fallback_links(
        &self,
        episode_id: &str,
        title: Option<&str>,
    ) -> Result<Vec<FallbackLink>>;
}

pub struct ConsumetClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct WatchResponse {
    #[serde(default)]
    sources: Vec<WatchSource>,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
    #[serde(rename = "embedURL")]
    embed_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WatchSource {
    url: String,
    #[serde(default)]
    quality: Option<String>,
    #[serde(rename = "isM3U8", default)]
    is_m3u8: bool,
}

impl ConsumetClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url,
        }
    }
}

#[async_trait]
impl StreamingProvider for ConsumetClient {
    async fn get_streaming_sources(
        &self,
        anime_id: &str,
        episode_id: &str,
        title: Option<&str>,
    ) -> Result<Option<StreamResult>> {
        let url = format!(
            "{}/anime/gogoanime/watch/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(episode_id)
        );

        tracing::debug!(
            "Consumet watch: anime={} episode={} title={:?}",
            anime_id,
            episode_id,
            title
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach streaming provider")?;

        if !response.status().is_success() {
            tracing::warn!(
                "Streaming provider returned {} for episode {}",
                response.status(),
                episode_id
            );
            return Ok(None);
        }

        let watch: WatchResponse = response
            .json()
            .await
            .context("Failed to parse streaming provider response")?;

        if !watch.sources.is_empty() {
            let sources = watch
                .sources
                .into_iter()
                .map(|s| StreamSource {
                    url: s.url,
                    quality: s.quality.unwrap_or_else(|| "default".to_string()),
                    is_m3u8: s.is_m3u8,
                })
                .collect();
            return Ok(Some(StreamResult::Stream {
                sources,
                headers: watch.headers,
            }));
        }

        if let Some(embed_url) = watch.embed_url.filter(|u| !u.is_empty()) {
            return Ok(Some(StreamResult::Embed { url: embed_url }));
        }

        Ok(None)
    }

    async fn fallback_links(
        &self,
        episode_id: &str,
        title: Option<&str>,
    ) -> Result<Vec<FallbackLink>> {
        Ok(build_fallback_links(episode_id, title))
    }
}

/// Deterministic external-site search links for an episode. Uses the
/// resolved title when available, the opaque episode base otherwise.
pub fn build_fallback_links(episode_id: &str, title: Option<&str>) -> Vec<FallbackLink> {
    let query = title.unwrap_or_else(|| episode_base(episode_id));
    let encoded = urlencoding::encode(query);

    vec![
        FallbackLink {
            name: "HiAnime".to_string(),
            url: format!("https://hianime.to/search?keyword={}", encoded),
            link_type: "external".to_string(),
        },
        FallbackLink {
            name: "AnimePahe".to_string(),
            url: format!("https://animepahe.ru/anime?q={}", encoded),
            link_type: "external".to_string(),
        },
        FallbackLink {
            name: "Crunchyroll".to_string(),
            url: format!("https://www.crunchyroll.com/search?q={}", encoded),
            link_type: "external".to_string(),
        },
    ]
}

/// The opaque part of an episode id, before any `-ep-<n>` suffix
fn episode_base(episode_id: &str) -> &str {
    match episode_id.find("-ep-") {
        Some(idx) if idx > 0 => &episode_id[..idx],
        _ => episode_id,
    }
}
