// Narration script generation.
//
// Turns page-level chapter metadata into an ordered list of speech
// segments: one opening segment, the per-panel segments that survive the
// caller's include flags, one closing segment. Emotion-to-audio-settings
// and speaker-to-voice are fixed lookup tables with required defaults.

use crate::models::{
    AudioSettings, NarrationOptions, NarrationScript, ScriptCharacter, ScriptSegment, SegmentKind,
};
use crate::services::mangadex::ChapterInfo;

/// Average narration pace used for duration estimation
const WORDS_PER_SECOND: f64 = 2.5;

const OPENING_PAUSE_MS: u64 = 800;
const CLOSING_PAUSE_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelKind {
    Narration,
    Dialogue,
}

/// One narratable unit within a scene
#[derive(Debug, Clone)]
pub struct Panel {
    pub kind: PanelKind,
    pub text: String,
    pub speaker: String,
    pub emotion: String,
    pub pause_after_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    pub panels: Vec<Panel>,
}

/// Structured content model extracted from a chapter
#[derive(Debug, Clone)]
pub struct ContentModel {
    pub characters: Vec<ScriptCharacter>,
    pub scenes: Vec<Scene>,
}

/// Audio settings for an emotion; unmapped emotions get the neutral row
pub fn audio_settings_for(emotion: &str) -> AudioSettings {
    match emotion {
        "peaceful" => AudioSettings {
            speed: 0.9,
            stability: 0.8,
            clarity: 0.75,
            style: 0.2,
        },
        "determined" => AudioSettings {
            speed: 1.05,
            stability: 0.6,
            clarity: 0.8,
            style: 0.55,
        },
        "tense" => AudioSettings {
            speed: 1.1,
            stability: 0.5,
            clarity: 0.85,
            style: 0.65,
        },
        _ => AudioSettings {
            speed: 1.0,
            stability: 0.75,
            clarity: 0.75,
            style: 0.3,
        },
    }
}

/// Speaker-to-voice lookup. The narrator voice follows the requested base
/// voice type; every other speaker gets a fixed character voice.
pub fn voice_for_speaker(speaker: &str, voice_type: &str) -> String {
    match speaker {
        "narrator" => {
            if voice_type == "male" {
                "male_narrator".to_string()
            } else {
                "female_narrator".to_string()
            }
        }
        _ => "young_male_character".to_string(),
    }
}

/// Estimated speech time in milliseconds at the fixed narration pace
pub fn estimate_speech_ms(text: &str) -> u64 {
    let words = text.split_whitespace().count() as f64;
    (words / WORDS_PER_SECOND * 1000.0) as u64
}

/// Derive the structured content model from chapter page metadata.
///
/// The source provider exposes pages, not transcripts, so the model is a
/// deterministic derivation: every page becomes a scene with a narration
/// panel, every other page adds a protagonist dialogue panel, and emotions
/// rotate through the supported set. A pageless placeholder chapter yields
/// an empty scene list.
pub fn extract_content(chapter: &ChapterInfo) -> ContentModel {
    const EMOTIONS: [&str; 3] = ["neutral", "peaceful", "determined"];

    let characters = vec![
        ScriptCharacter {
            id: "narrator".to_string(),
            name: "Narrator".to_string(),
            voice_profile: "narrator".to_string(),
            emotional_range: vec![
                "neutral".to_string(),
                "peaceful".to_string(),
                "determined".to_string(),
                "tense".to_string(),
            ],
        },
        ScriptCharacter {
            id: "protagonist".to_string(),
            name: "Protagonist".to_string(),
            voice_profile: "young_male".to_string(),
            emotional_range: vec!["neutral".to_string(), "determined".to_string()],
        },
    ];

    let scenes = chapter
        .pages
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let emotion = EMOTIONS[i % EMOTIONS.len()];
            let mut panels = vec![Panel {
                kind: PanelKind::Narration,
                text: format!(
                    "On page {} of {}, the story unfolds.",
                    i + 1,
                    chapter.title
                ),
                speaker: "narrator".to_string(),
                emotion: emotion.to_string(),
                pause_after_ms: 400,
            }];

            if i % 2 == 0 {
                panels.push(Panel {
                    kind: PanelKind::Dialogue,
                    text: format!("This is it... page {} already.", i + 1),
                    speaker: "protagonist".to_string(),
                    emotion: EMOTIONS[(i + 1) % EMOTIONS.len()].to_string(),
                    pause_after_ms: 300,
                });
            }

            Scene {
                id: format!("scene-{}", i + 1),
                panels,
            }
        })
        .collect();

    ContentModel { characters, scenes }
}

/// Assemble the full narration script for a chapter
pub fn build_script(
    title: &str,
    chapter_number: u32,
    content: &ContentModel,
    options: &NarrationOptions,
) -> NarrationScript {
    let mut segments = Vec::new();
    let mut next_id = 0u32;

    let mut push_segment = |segments: &mut Vec<ScriptSegment>,
                            kind: SegmentKind,
                            text: String,
                            speaker: &str,
                            emotion: &str,
                            pause_after_ms: u64,
                            scene_context: Option<String>| {
        next_id += 1;
        segments.push(ScriptSegment {
            id: next_id,
            kind,
            voice: voice_for_speaker(speaker, &options.voice_type),
            audio_settings: audio_settings_for(emotion),
            text,
            speaker: speaker.to_string(),
            emotion: emotion.to_string(),
            pause_after_ms,
            scene_context,
        });
    };

    push_segment(
        &mut segments,
        SegmentKind::Opening,
        format!("Chapter {}: {}.", chapter_number, title),
        "narrator",
        "neutral",
        OPENING_PAUSE_MS,
        None,
    );

    for scene in &content.scenes {
        for panel in &scene.panels {
            let (kind, wanted) = match panel.kind {
                PanelKind::Narration => (SegmentKind::Narration, options.include_narration),
                PanelKind::Dialogue => (SegmentKind::Dialogue, options.include_dialogue),
            };
            if !wanted {
                continue;
            }
            push_segment(
                &mut segments,
                kind,
                panel.text.clone(),
                &panel.speaker,
                &panel.emotion,
                panel.pause_after_ms,
                Some(scene.id.clone()),
            );
        }
    }

    push_segment(
        &mut segments,
        SegmentKind::Closing,
        format!("That concludes chapter {}.", chapter_number),
        "narrator",
        "peaceful",
        CLOSING_PAUSE_MS,
        None,
    );

    let total_duration_ms = segments
        .iter()
        .map(|s| estimate_speech_ms(&s.text) + s.pause_after_ms)
        .sum();

    NarrationScript {
        title: title.to_string(),
        chapter_number,
        characters: content.characters.clone(),
        segments,
        total_duration_ms,
    }
}
