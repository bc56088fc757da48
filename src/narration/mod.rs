// Narration pipeline: chapter reference + preferences in, persisted audio
// asset + status record out, with a push notification to the requester.
//
// Status state machine: processing -> completed | failed. Terminal states
// are never re-entered; a re-request creates a new request id. The status
// store and push channel are optional collaborators and their absence (or
// failure) never blocks pipeline progress.

pub mod script;

use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cache::Cache;
use crate::models::{NarrationRequest, NarrationState, NarrationStatus};
use crate::services::mangadex::{ChapterInfo, ChapterSource};
use crate::services::notify::{PushChannel, PushEvent};
use crate::services::storage::{persist_audio, ObjectStorage};
use crate::services::tts::{mock_audio, TtsEngine};

const STATUS_TTL: Duration = Duration::from_secs(3600);

fn status_key(request_id: Uuid) -> String {
    format!("narration_status:{}", request_id)
}

/// Result payload for the completed status and the push event
#[derive(Debug, Clone)]
pub struct NarrationOutcome {
    pub audio_url: String,
    pub duration_ms: u64,
}

pub struct NarrationPipeline {
    chapters: Arc<dyn ChapterSource>,
    tts: Option<Arc<dyn TtsEngine>>,
    storage: Option<Arc<dyn ObjectStorage>>,
    status_store: Option<Arc<dyn Cache>>,
    push: Option<Arc<dyn PushChannel>>,
    uploads_dir: PathBuf,
}

impl NarrationPipeline {
    pub fn new(
        chapters: Arc<dyn ChapterSource>,
        tts: Option<Arc<dyn TtsEngine>>,
        storage: Option<Arc<dyn ObjectStorage>>,
        status_store: Option<Arc<dyn Cache>>,
        push: Option<Arc<dyn PushChannel>>,
        uploads_dir: PathBuf,
    ) -> Self {
        Self {
            chapters,
            tts,
            storage,
            status_store,
            push,
            uploads_dir,
        }
    }

    /// Run the full pipeline for one request. A failure anywhere past
    /// acceptance records a failed status and is re-raised so the spawning
    /// layer's retry policy can see it.
    pub async fn run(&self, request: NarrationRequest) -> Result<NarrationOutcome> {
        let mut status = NarrationStatus {
            request_id: request.request_id,
            user_id: request.user_id.clone(),
            manga_id: request.options.manga_id.clone(),
            chapter_number: request.options.chapter_number,
            status: NarrationState::Processing,
            started_at: Utc::now(),
            audio_url: None,
            duration_ms: None,
            settings: None,
            error: None,
            failed_at: None,
            completed_at: None,
        };
        self.store_status(&status).await;

        match self.execute(&request).await {
            Ok(outcome) => {
                status.status = NarrationState::Completed;
                status.audio_url = Some(outcome.audio_url.clone());
                status.duration_ms = Some(outcome.duration_ms);
                status.settings = Some(request.options.clone());
                status.completed_at = Some(Utc::now());
                self.store_status(&status).await;
                self.notify_completed(&request, &outcome).await;
                Ok(outcome)
            }
            Err(e) => {
                status.status = NarrationState::Failed;
                status.error = Some(e.to_string());
                status.failed_at = Some(Utc::now());
                self.store_status(&status).await;
                Err(e)
            }
        }
    }

    async fn execute(&self, request: &NarrationRequest) -> Result<NarrationOutcome> {
        let opts = &request.options;

        // Chapter fetch degrades to a pageless placeholder so the job
        // still produces a (short) narration instead of failing outright.
        let chapter = match self
            .chapters
            .fetch_chapter(&opts.manga_id, opts.chapter_number)
            .await
        {
            Ok(chapter) => chapter,
            Err(e) => {
                tracing::warn!(
                    "Chapter fetch failed for {} ch {}, using placeholder: {}",
                    opts.manga_id,
                    opts.chapter_number,
                    e
                );
                ChapterInfo::placeholder(&opts.manga_id, opts.chapter_number)
            }
        };

        let content = script::extract_content(&chapter);
        let narration = script::build_script(&chapter.title, chapter.chapter_number, &content, opts);

        tracing::info!(
            "Narration script for {} ch {}: {} segments, {} ms",
            opts.manga_id,
            opts.chapter_number,
            narration.segments.len(),
            narration.total_duration_ms
        );

        let audio = self.synthesize(&narration, opts).await;
        let audio_url = persist_audio(
            self.storage.as_deref(),
            &self.uploads_dir,
            &request.request_id.to_string(),
            audio,
        )
        .await?;

        Ok(NarrationOutcome {
            audio_url,
            duration_ms: narration.total_duration_ms,
        })
    }

    /// Single provider request over the concatenated segment texts, with
    /// mock audio as the universal fallback.
    async fn synthesize(
        &self,
        narration: &crate::models::NarrationScript,
        opts: &crate::models::NarrationOptions,
    ) -> Vec<u8> {
        let combined: String = narration
            .segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        if let Some(tts) = &self.tts {
            match tts.synthesize(&combined, &opts.voice_type).await {
                Ok(audio) if !audio.is_empty() => return audio,
                Ok(_) => tracing::warn!("TTS provider returned empty audio, using mock"),
                Err(e) => tracing::warn!("TTS synthesis failed, using mock audio: {}", e),
            }
        }

        mock_audio(combined.len(), opts.speed)
    }

    /// Best-effort status write; absence of the store is a no-op
    async fn store_status(&self, status: &NarrationStatus) {
        let Some(store) = &self.status_store else {
            return;
        };
        match serde_json::to_string(status) {
            Ok(raw) => {
                store
                    .set_ex(&status_key(status.request_id), raw, STATUS_TTL)
                    .await
            }
            Err(e) => tracing::warn!(
                "Failed to serialize status for {}: {}",
                status.request_id,
                e
            ),
        }
    }

    async fn notify_completed(&self, request: &NarrationRequest, outcome: &NarrationOutcome) {
        let Some(push) = &self.push else {
            return;
        };
        push.send_to_user(
            &request.user_id,
            PushEvent {
                event: "narration_completed".to_string(),
                payload: serde_json::json!({
                    "requestId": request.request_id,
                    "mangaId": request.options.manga_id,
                    "chapterNumber": request.options.chapter_number,
                    "audioUrl": outcome.audio_url,
                    "duration": outcome.duration_ms,
                    "settings": request.options,
                }),
            },
        )
        .await;
    }
}

/// Read a status record back from the store, for the polling endpoint
pub async fn load_status(store: &dyn Cache, request_id: Uuid) -> Option<NarrationStatus> {
    let raw = store.get(&status_key(request_id)).await?;
    match serde_json::from_str(&raw) {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!("Unreadable status record for {}: {}", request_id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::NarrationOptions;
    use crate::services::notify::NotificationHub;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct MockChapters {
        fail: bool,
        pages: usize,
    }

    #[async_trait]
    impl ChapterSource for MockChapters {
        async fn fetch_chapter(&self, manga_id: &str, chapter_number: u32) -> Result<ChapterInfo> {
            if self.fail {
                return Err(anyhow!("source down"));
            }
            Ok(ChapterInfo {
                id: format!("{}-{}", manga_id, chapter_number),
                title: "The Voyage".to_string(),
                chapter_number,
                pages: (0..self.pages).map(|i| format!("p{}", i)).collect(),
            })
        }
    }

    struct RejectingStorage;

    #[async_trait]
    impl crate::services::storage::ObjectStorage for RejectingStorage {
        async fn upload(&self, _data: Vec<u8>, _public_id: &str, _format: &str) -> Result<String> {
            Err(anyhow!("upload rejected"))
        }
    }

    struct FailingTts;

    #[async_trait]
    impl TtsEngine for FailingTts {
        async fn synthesize(&self, _text: &str, _voice_type: &str) -> Result<Vec<u8>> {
            Err(anyhow!("quota exceeded"))
        }
    }

    struct FixedTts;

    #[async_trait]
    impl TtsEngine for FixedTts {
        async fn synthesize(&self, _text: &str, _voice_type: &str) -> Result<Vec<u8>> {
            Ok(vec![7u8; 2048])
        }
    }

    fn request(manga_id: &str) -> NarrationRequest {
        NarrationRequest {
            request_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            options: NarrationOptions {
                manga_id: manga_id.to_string(),
                chapter_number: 3,
                voice_type: "female".to_string(),
                language: "en".to_string(),
                speed: 1.0,
                include_dialogue: true,
                include_narration: true,
            },
        }
    }

    fn pipeline(
        chapters: MockChapters,
        tts: Option<Arc<dyn TtsEngine>>,
        store: Option<Arc<dyn Cache>>,
        push: Option<Arc<dyn PushChannel>>,
    ) -> NarrationPipeline {
        NarrationPipeline::new(
            Arc::new(chapters),
            tts,
            None,
            store,
            push,
            std::env::temp_dir().join("mangaverse-narration-test"),
        )
    }

    #[tokio::test]
    async fn completes_and_records_status() {
        let store: Arc<MemoryCache> = Arc::new(MemoryCache::new());
        let p = pipeline(
            MockChapters {
                fail: false,
                pages: 4,
            },
            None,
            Some(store.clone()),
            None,
        );

        let req = request("manga-1");
        let request_id = req.request_id;
        let outcome = p.run(req).await.unwrap();
        assert!(outcome.audio_url.ends_with(&format!("{}.mp3", request_id)));
        assert!(outcome.duration_ms > 0);

        let status = load_status(store.as_ref(), request_id).await.unwrap();
        assert_eq!(status.status, NarrationState::Completed);
        assert_eq!(status.audio_url.as_deref(), Some(outcome.audio_url.as_str()));
        assert_eq!(status.duration_ms, Some(outcome.duration_ms));
        assert!(status.completed_at.is_some());
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn chapter_failure_degrades_to_placeholder_narration() {
        let p = pipeline(
            MockChapters {
                fail: true,
                pages: 0,
            },
            None,
            None,
            None,
        );

        // Placeholder content still yields opening + closing audio
        let outcome = p.run(request("manga-x")).await.unwrap();
        assert!(outcome.duration_ms > 0);
    }

    #[tokio::test]
    async fn tts_failure_falls_back_to_mock_audio() {
        let p = pipeline(
            MockChapters {
                fail: false,
                pages: 2,
            },
            Some(Arc::new(FailingTts)),
            None,
            None,
        );

        let outcome = p.run(request("manga-2")).await.unwrap();
        assert!(outcome.audio_url.contains("/uploads/narration/"));
    }

    #[tokio::test]
    async fn configured_tts_audio_is_persisted() {
        let p = pipeline(
            MockChapters {
                fail: false,
                pages: 1,
            },
            Some(Arc::new(FixedTts)),
            None,
            None,
        );

        let req = request("manga-3");
        let request_id = req.request_id;
        p.run(req).await.unwrap();

        let path = std::env::temp_dir()
            .join("mangaverse-narration-test")
            .join("narration")
            .join(format!("{}.mp3", request_id));
        let written = tokio::fs::read(path).await.unwrap();
        assert_eq!(written, vec![7u8; 2048]);
    }

    #[tokio::test]
    async fn completion_event_reaches_subscriber() {
        let hub = Arc::new(NotificationHub::new());
        let mut rx = hub.subscribe("user-1").await;

        let p = pipeline(
            MockChapters {
                fail: false,
                pages: 2,
            },
            None,
            None,
            Some(hub.clone()),
        );

        let req = request("manga-4");
        let request_id = req.request_id;
        p.run(req).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "narration_completed");
        assert_eq!(event.payload["requestId"], request_id.to_string());
        assert_eq!(event.payload["mangaId"], "manga-4");
        assert!(event.payload["audioUrl"].as_str().is_some());
    }

    // Persistence is the only fatal stage: storage rejects the upload and
    // the disk fallback lands under a regular file, so create_dir_all fails.
    #[tokio::test]
    async fn persistence_failure_records_failed_status_and_reraises() {
        let blocker = std::env::temp_dir().join("mangaverse-narration-blocker");
        tokio::fs::write(&blocker, b"not a directory").await.unwrap();

        let store: Arc<MemoryCache> = Arc::new(MemoryCache::new());
        let p = NarrationPipeline::new(
            Arc::new(MockChapters {
                fail: false,
                pages: 2,
            }),
            None,
            Some(Arc::new(RejectingStorage)),
            Some(store.clone()),
            None,
            blocker.join("uploads"),
        );

        let req = request("manga-6");
        let request_id = req.request_id;
        assert!(p.run(req).await.is_err());

        let status = load_status(store.as_ref(), request_id).await.unwrap();
        assert_eq!(status.status, NarrationState::Failed);
        assert!(status.error.is_some());
        assert!(status.failed_at.is_some());
        assert!(status.completed_at.is_none());
        assert!(status.audio_url.is_none());
    }

    #[tokio::test]
    async fn tracked_jobs_reach_terminal_status_before_shutdown_wait() {
        let tracker = tokio_util::task::TaskTracker::new();
        let store: Arc<MemoryCache> = Arc::new(MemoryCache::new());
        let p = Arc::new(pipeline(
            MockChapters {
                fail: false,
                pages: 2,
            },
            None,
            Some(store.clone()),
            None,
        ));

        let req = request("manga-7");
        let request_id = req.request_id;
        tracker.spawn(async move {
            let _ = p.run(req).await;
        });

        tracker.close();
        tracker.wait().await;

        let status = load_status(store.as_ref(), request_id).await.unwrap();
        assert_eq!(status.status, NarrationState::Completed);
    }

    #[tokio::test]
    async fn missing_status_store_does_not_block_the_job() {
        let p = pipeline(
            MockChapters {
                fail: false,
                pages: 3,
            },
            None,
            None,
            None,
        );
        assert!(p.run(request("manga-5")).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_request_id_has_no_status() {
        let store = MemoryCache::new();
        assert!(load_status(&store, Uuid::new_v4()).await.is_none());
    }
}
