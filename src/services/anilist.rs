use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ANILIST_API_URL: &str = "https://graphql.anilist.co";

/// Native AniList id plus title variants for a foreign (MAL) id
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedId {
    pub anilist_id: i64,
    pub title_english: Option<String>,
    pub title_romaji: Option<String>,
    pub title_native: Option<String>,
}

impl NormalizedId {
    /// Display title, preferring English, then romanized, then native-script
    pub fn preferred_title(&self) -> Option<&str> {
        self.title_english
            .as_deref()
            .or(self.title_romaji.as_deref())
            .or(self.title_native.as_deref())
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("no AniList entry for MAL id {0}")]
    NotFound(i64),
    #[error("AniList lookup failed: {0}")]
    Upstream(#[from] anyhow::Error),
}

/// Maps a foreign numeric id into the streaming provider's id space
#[async_trait]
pub trait IdNormalizer: Send + Sync {
    async fn normalize_id(&self, mal_id: i64) -> Result<NormalizedId, NormalizeError>;
}

/// AniList GraphQL client (no API key needed)
pub struct AniListClient {
    client: Client,
}

/// GraphQL request wrapper
#[derive(Debug, Serialize)]
struct GraphQLRequest {
    query: String,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    data: Option<LookupData>,
}

#[derive(Debug, Deserialize)]
struct LookupData {
    #[serde(rename = "Media")]
    media: Option<MediaNode>,
}

#[derive(Debug, Deserialize)]
struct MediaNode {
    id: i64,
    title: Option<TitleNode>,
}

#[derive(Debug, Deserialize)]
struct TitleNode {
    romaji: Option<String>,
    english: Option<String>,
    native: Option<String>,
}

impl AniListClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for AniListClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdNormalizer for AniListClient {
    async fn normalize_id(&self, mal_id: i64) -> Result<NormalizedId, NormalizeError> {
        let graphql_query = r#"
            query ($malId: Int) {
                Media(idMal: $malId, type: ANIME) {
                    id
                    title {
                        romaji
                        english
                        native
                    }
                }
            }
        "#;

        let request = GraphQLRequest {
            query: graphql_query.to_string(),
            variables: serde_json::json!({ "malId": mal_id }),
        };

        let response: LookupResponse = self
            .client
            .post(ANILIST_API_URL)
            .json(&request)
            .send()
            .await
            .context("Failed to query AniList")?
            .json()
            .await
            .context("Failed to parse AniList response")?;

        let media = response
            .data
            .and_then(|d| d.media)
            .ok_or(NormalizeError::NotFound(mal_id))?;

        let title = media.title;
        Ok(NormalizedId {
            anilist_id: media.id,
            title_english: title.as_ref().and_then(|t| t.english.clone()),
            title_romaji: title.as_ref().and_then(|t| t.romaji.clone()),
            title_native: title.and_then(|t| t.native),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_title_falls_back_in_order() {
        let mut normalized = NormalizedId {
            anilist_id: 1,
            title_english: Some("One Piece".to_string()),
            title_romaji: Some("Wan Pisu".to_string()),
            title_native: Some("ワンピース".to_string()),
        };
        assert_eq!(normalized.preferred_title(), Some("One Piece"));

        normalized.title_english = None;
        assert_eq!(normalized.preferred_title(), Some("Wan Pisu"));

        normalized.title_romaji = None;
        assert_eq!(normalized.preferred_title(), Some("ワンピース"));

        normalized.title_native = None;
        assert_eq!(normalized.preferred_title(), None);
    }

    #[test]
    fn missing_media_maps_to_not_found() {
        let response: LookupResponse =
            serde_json::from_str(r#"{"data":{"Media":null}}"#).unwrap();
        let media = response.data.and_then(|d| d.media);
        assert!(media.is_none());
    }

    #[test]
    fn lookup_response_parses_media_node() {
        let raw = r#"{
            "data": {
                "Media": {
                    "id": 21,
                    "title": {
                        "romaji": "One Piece",
                        "english": "One Piece",
                        "native": "ワンピース"
                    }
                }
            }
        }"#;
        let response: LookupResponse = serde_json::from_str(raw).unwrap();
        let media = response.data.and_then(|d| d.media).unwrap();
        assert_eq!(media.id, 21);
        assert_eq!(media.title.unwrap().english.as_deref(), Some("One Piece"));
    }
}
