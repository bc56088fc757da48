use anyhow::Result;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cache;
mod config;
mod models;
mod narration;
mod services;
mod stream;

use cache::{Cache, MemoryCache};
use config::AppConfig;
use narration::NarrationPipeline;
use services::anilist::AniListClient;
use services::catalog::{CatalogService, CatalogSource};
use services::consumet::ConsumetClient;
use services::jikan::JikanClient;
use services::kitsu::KitsuClient;
use services::mangadex::MangaDexClient;
use services::notify::NotificationHub;
use services::storage::{CloudinaryStorage, ObjectStorage};
use services::tts::{ElevenLabsTts, TtsEngine};
use stream::StreamResolver;

/// Tracks all background task handles for graceful shutdown
struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    fn new() -> Self {
        Self {
            handles: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.handles.push((name, handle));
    }

    async fn shutdown(self) {
        tracing::info!("Initiating graceful shutdown...");

        self.shutdown.cancel();

        for (name, handle) in self.handles {
            tracing::debug!("Waiting for {} to finish...", name);
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(Ok(())) => tracing::debug!("{} finished cleanly", name),
                Ok(Err(e)) => tracing::warn!("{} panicked: {}", name, e),
                Err(_) => tracing::warn!("{} timed out during shutdown", name),
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub cache: Option<Arc<dyn Cache>>,
    pub jikan: Arc<JikanClient>,
    pub catalog: CatalogService,
    pub resolver: StreamResolver,
    pub pipeline: Arc<NarrationPipeline>,
    /// In-flight narration jobs, awaited at shutdown so no status record
    /// is left stuck at processing
    pub jobs: TaskTracker,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mangaverse_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load();
    config.ensure_dirs().await?;
    config.log_config();

    // Optional in-process cache shared by both pipelines
    let memory_cache = config.cache.enabled.then(|| Arc::new(MemoryCache::new()));
    let cache: Option<Arc<dyn Cache>> = memory_cache
        .clone()
        .map(|c| c as Arc<dyn Cache>);

    // Catalog providers, priority order
    let jikan = Arc::new(JikanClient::new());
    let mut sources: Vec<Arc<dyn CatalogSource>> = vec![jikan.clone()];
    if config.providers.enable_kitsu {
        sources.push(Arc::new(KitsuClient::new()));
    }
    let catalog = CatalogService::new(sources);

    let resolver = StreamResolver::new(
        Arc::new(ConsumetClient::new(
            config.providers.consumet_base_url.clone(),
        )),
        Arc::new(AniListClient::new()),
        cache.clone(),
    );

    let tts: Option<Arc<dyn TtsEngine>> =
        ElevenLabsTts::from_key(config.providers.elevenlabs_api_key.clone())
            .map(|e| Arc::new(e) as Arc<dyn TtsEngine>);
    let storage: Option<Arc<dyn ObjectStorage>> = CloudinaryStorage::from_config(
        config.providers.cloudinary_cloud_name.clone(),
        config.providers.cloudinary_upload_preset.clone(),
    )
    .map(|s| Arc::new(s) as Arc<dyn ObjectStorage>);

    let hub = Arc::new(NotificationHub::new());

    let pipeline = Arc::new(NarrationPipeline::new(
        Arc::new(MangaDexClient::new()),
        tts,
        storage,
        cache.clone(),
        Some(hub),
        config.uploads_dir.clone(),
    ));

    let mut bg_tasks = BackgroundTasks::new();
    let shutdown_token = bg_tasks.token();

    // Periodic sweep of expired cache entries
    if let Some(sweep_cache) = memory_cache {
        let interval = Duration::from_secs(config.cache.sweep_interval_secs.max(1));
        let cancel = shutdown_token.clone();
        bg_tasks.spawn("cache-sweeper", async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Cache sweeper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let removed = sweep_cache.sweep_expired().await;
                        if removed > 0 {
                            tracing::debug!("Swept {} expired cache entries", removed);
                        }
                    }
                }
            }
        });
    }

    let uploads_dir = config.uploads_dir.clone();
    let bind_address = config.bind_address.clone();
    let port = config.port;

    let state = Arc::new(AppState {
        config,
        cache,
        jikan,
        catalog,
        resolver,
        pipeline,
        jobs: TaskTracker::new(),
    });

    // Root handler
    async fn root_handler() -> &'static str {
        "MangaVerse Core"
    }

    // Build router
    let app = Router::new()
        .route("/", get(root_handler).head(root_handler))
        .route("/health", get(|| async { "OK" }))
        .merge(api::routes())
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind_address, port).parse()?;
    tracing::info!("Starting server on {}", addr);

    // Create shutdown signal listener
    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
        }
    };

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    // After server stops, let in-flight narration jobs reach a terminal
    // status, then stop the background tasks
    state.jobs.close();
    if tokio::time::timeout(Duration::from_secs(30), state.jobs.wait())
        .await
        .is_err()
    {
        tracing::warn!("Timed out waiting for narration jobs to finish");
    }

    bg_tasks.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
