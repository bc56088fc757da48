use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A single playable video source within a stream result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSource {
    pub url: String,
    pub quality: String,
    #[serde(rename = "isM3U8")]
    pub is_m3u8: bool,
}

/// External-site link offered when no direct stream can be resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackLink {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub link_type: String,
}

/// Outcome of resolving playable video for one episode.
///
/// Exactly one payload shape per tag: direct sources, an embeddable URL,
/// or external fallback links. Immutable once resolved; cached verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamResult {
    Stream {
        sources: Vec<StreamSource>,
        #[serde(skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
    },
    Embed {
        url: String,
    },
    Fallback {
        links: Vec<FallbackLink>,
        provider: String,
    },
}

impl StreamResult {
    /// A result is usable if its payload field is non-empty
    pub fn is_usable(&self) -> bool {
        match self {
            StreamResult::Stream { sources, .. } => !sources.is_empty(),
            StreamResult::Embed { url } => !url.is_empty(),
            StreamResult::Fallback { links, .. } => !links.is_empty(),
        }
    }
}

fn default_voice_type() -> String {
    "female".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_speed() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Caller preferences for a narration job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationOptions {
    pub manga_id: String,
    pub chapter_number: u32,
    #[serde(default = "default_voice_type")]
    pub voice_type: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default = "default_true")]
    pub include_dialogue: bool,
    #[serde(default = "default_true")]
    pub include_narration: bool,
}

/// One enqueued narration job. Re-requesting the same chapter always
/// creates a new request id; terminal statuses are never resurrected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationRequest {
    pub request_id: Uuid,
    pub user_id: String,
    #[serde(flatten)]
    pub options: NarrationOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrationState {
    Processing,
    Completed,
    Failed,
}

/// Status record persisted (best-effort) under `narration_status:{request_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationStatus {
    pub request_id: Uuid,
    pub user_id: String,
    pub manga_id: String,
    pub chapter_number: u32,
    pub status: NarrationState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(rename = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<NarrationOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Synthesis parameters derived purely from a segment's emotion.
/// Never stored on its own; always embedded in a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub speed: f64,
    pub stability: f64,
    pub clarity: f64,
    pub style: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Opening,
    Narration,
    Dialogue,
    Closing,
}

/// A speaking entity discovered in chapter content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCharacter {
    pub id: String,
    pub name: String,
    pub voice_profile: String,
    pub emotional_range: Vec<String>,
}

/// One speech segment of a narration script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSegment {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub text: String,
    pub speaker: String,
    pub emotion: String,
    pub voice: String,
    pub pause_after_ms: u64,
    pub audio_settings: AudioSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_context: Option<String>,
}

/// Ordered speech segments with voice metadata, derived from chapter
/// content. Drives audio synthesis; never persisted as a row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationScript {
    pub title: String,
    pub chapter_number: u32,
    pub characters: Vec<ScriptCharacter>,
    pub segments: Vec<ScriptSegment>,
    pub total_duration_ms: u64,
}

/// Normalized catalog entry merged across providers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSummary {
    pub id: String,
    pub provider: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub genres: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_count: Option<i32>,
}
