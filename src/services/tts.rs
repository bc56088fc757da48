// Text-to-speech provider client.
//
// The pipeline concatenates all segment texts into one synthesis request.
// When no credential is configured, or the provider errors, the pipeline
// falls back to `mock_audio`: a placeholder buffer the caller can still
// persist and link to.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io/v1";
const DEFAULT_MODEL: &str = "eleven_monolingual_v1";

/// Synthesizes one block of text into audio bytes (MP3)
#[async_trait]
pub trait TtsEngine: Send + Sync {
    async fn synthesize(&self, text: &str, voice_type: &str) -> Result<Vec<u8>>;
}

/// ElevenLabs REST client. Constructed only when a credential exists.
pub struct ElevenLabsTts {
    client: Client,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f64,
    similarity_boost: f64,
    style: f64,
}

/// Fixed voice-type to provider-voice-id table
fn provider_voice_id(voice_type: &str) -> &'static str {
    match voice_type {
        "male" => "pNInz6obpgDQGcFmaJgB",
        "female" => "EXAVITQu4vr4xnSDxMaL",
        _ => "EXAVITQu4vr4xnSDxMaL",
    }
}

impl ElevenLabsTts {
    /// Returns None when no API key is configured
    pub fn from_key(api_key: Option<String>) -> Option<Self> {
        let api_key = api_key.filter(|k| !k.is_empty())?;
        Some(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            api_key,
        })
    }
}

#[async_trait]
impl TtsEngine for ElevenLabsTts {
    async fn synthesize(&self, text: &str, voice_type: &str) -> Result<Vec<u8>> {
        let voice_id = provider_voice_id(voice_type);
        let url = format!("{}/text-to-speech/{}", ELEVENLABS_API_BASE, voice_id);

        let body = SynthesisRequest {
            text,
            model_id: DEFAULT_MODEL,
            voice_settings: VoiceSettings {
                stability: 0.75,
                similarity_boost: 0.75,
                style: 0.3,
            },
        };

        tracing::debug!(
            "TTS synthesis: {} chars, voice {} ({})",
            text.len(),
            voice_type,
            voice_id
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to reach TTS provider")?;

        if !response.status().is_success() {
            anyhow::bail!("TTS provider returned {}", response.status());
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read TTS audio body")?;
        Ok(bytes.to_vec())
    }
}

/// Deterministic placeholder audio: zero bytes, length proportional to the
/// text length over the requested speed, never below 1024.
pub fn mock_audio(total_text_len: usize, speed: f64) -> Vec<u8> {
    let speed = if speed > 0.0 { speed } else { 1.0 };
    let len = ((total_text_len * 100) as f64 / speed) as usize;
    vec![0u8; len.max(1024)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_audio_scales_with_text_and_speed() {
        assert_eq!(mock_audio(50, 1.0).len(), 5000);
        assert_eq!(mock_audio(50, 2.0).len(), 2500);
        assert_eq!(mock_audio(60, 1.5).len(), 4000);
    }

    #[test]
    fn mock_audio_has_floor_of_1024_zero_bytes() {
        let audio = mock_audio(3, 1.0);
        assert_eq!(audio.len(), 1024);
        assert!(audio.iter().all(|&b| b == 0));

        // Zero-length text still produces a persistable buffer
        assert_eq!(mock_audio(0, 1.0).len(), 1024);
    }

    #[test]
    fn mock_audio_guards_against_nonpositive_speed() {
        assert_eq!(mock_audio(50, 0.0).len(), 5000);
    }

    #[test]
    fn voice_table_has_default() {
        assert_eq!(provider_voice_id("male"), "pNInz6obpgDQGcFmaJgB");
        assert_eq!(provider_voice_id("female"), provider_voice_id("unknown"));
    }

    #[test]
    fn missing_key_yields_no_engine() {
        assert!(ElevenLabsTts::from_key(None).is_none());
        assert!(ElevenLabsTts::from_key(Some(String::new())).is_none());
        assert!(ElevenLabsTts::from_key(Some("sk-test".to_string())).is_some());
    }
}
