// Configuration module for mangaverse-core
// Handles XDG-compliant directory paths and TOML configuration file

use serde::Deserialize;
use std::path::PathBuf;

const APP_NAME: &str = "mangaverse-core";
const CONFIG_FILENAME: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Server configuration
    pub server: ServerConfig,

    /// Directory paths (overrides XDG defaults)
    pub paths: PathsConfig,

    /// Content/TTS provider configuration
    pub providers: ProvidersConfig,

    /// Cache configuration
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server port (default: 8080)
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Override uploads directory (narration audio fallback destination)
    pub uploads_dir: Option<PathBuf>,

    /// Override config directory
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Base URL of the streaming-metadata (Consumet-compatible) API
    pub consumet_base_url: String,

    /// ElevenLabs API key (optional; mock audio is used without it)
    pub elevenlabs_api_key: Option<String>,

    /// Cloudinary cloud name (optional; disk persistence without it)
    pub cloudinary_cloud_name: Option<String>,

    /// Cloudinary unsigned upload preset
    pub cloudinary_upload_preset: Option<String>,

    /// Include Kitsu alongside Jikan in catalog aggregation
    pub enable_kitsu: bool,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            consumet_base_url: "https://api.consumet.org".to_string(),
            elevenlabs_api_key: None,
            cloudinary_cloud_name: None,
            cloudinary_upload_preset: None,
            enable_kitsu: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the in-process stream/status cache (default: true)
    pub enabled: bool,

    /// Sweep interval for expired entries, in seconds (default: 300)
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 300,
        }
    }
}

/// Resolved application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub bind_address: String,
    pub uploads_dir: PathBuf,
    pub providers: ProvidersConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Load configuration: TOML file first, then environment overrides
    pub fn load() -> Self {
        let config_dir = std::env::var("MANGAVERSE_CONFIG_DIR")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::config_dir().map(|d| d.join(APP_NAME)))
            .unwrap_or_else(|| PathBuf::from("."));

        let file = Self::read_config_file(&config_dir.join(CONFIG_FILENAME));

        let uploads_dir = std::env::var("MANGAVERSE_UPLOADS_DIR")
            .map(PathBuf::from)
            .ok()
            .or(file.paths.uploads_dir)
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_NAME).join("uploads")))
            .unwrap_or_else(|| PathBuf::from("uploads"));

        let mut providers = file.providers;
        if let Ok(url) = std::env::var("CONSUMET_API_URL") {
            if !url.is_empty() {
                providers.consumet_base_url = url;
            }
        }
        if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
            if !key.is_empty() {
                providers.elevenlabs_api_key = Some(key);
            }
        }
        if let Ok(name) = std::env::var("CLOUDINARY_CLOUD_NAME") {
            if !name.is_empty() {
                providers.cloudinary_cloud_name = Some(name);
            }
        }
        if let Ok(preset) = std::env::var("CLOUDINARY_UPLOAD_PRESET") {
            if !preset.is_empty() {
                providers.cloudinary_upload_preset = Some(preset);
            }
        }

        let port = std::env::var("MANGAVERSE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(file.server.port);

        Self {
            port,
            bind_address: file.server.bind_address,
            uploads_dir,
            providers,
            cache: file.cache,
        }
    }

    fn read_config_file(path: &std::path::Path) -> ConfigFile {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(file) => {
                    tracing::info!("Loaded config from {:?}", path);
                    file
                }
                Err(e) => {
                    tracing::warn!("Invalid config file {:?}: {}, using defaults", path, e);
                    ConfigFile::default()
                }
            },
            Err(_) => ConfigFile::default(),
        }
    }

    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        Ok(())
    }

    /// Log the effective configuration, omitting secrets
    pub fn log_config(&self) {
        tracing::info!("Listening on {}:{}", self.bind_address, self.port);
        tracing::info!("Uploads dir: {:?}", self.uploads_dir);
        tracing::info!("Streaming provider: {}", self.providers.consumet_base_url);
        tracing::info!(
            "TTS: {}",
            if self.providers.elevenlabs_api_key.is_some() {
                "ElevenLabs"
            } else {
                "mock audio"
            }
        );
        tracing::info!(
            "Object storage: {}",
            if self.providers.cloudinary_cloud_name.is_some() {
                "Cloudinary"
            } else {
                "local disk"
            }
        );
        tracing::info!(
            "Catalog providers: {}",
            if self.providers.enable_kitsu {
                "Jikan + Kitsu"
            } else {
                "Jikan"
            }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_defaults_apply() {
        let file: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(file.server.port, 8080);
        assert_eq!(file.server.bind_address, "0.0.0.0");
        assert!(file.cache.enabled);
        assert!(file.providers.enable_kitsu);
        assert!(file.providers.elevenlabs_api_key.is_none());
    }

    #[test]
    fn partial_config_file_parses() {
        let raw = r#"
            [server]
            port = 9090

            [providers]
            consumet_base_url = "http://localhost:3000"
            enable_kitsu = false

            [cache]
            enabled = false
        "#;
        let file: ConfigFile = toml::from_str(raw).unwrap();
        assert_eq!(file.server.port, 9090);
        assert_eq!(file.providers.consumet_base_url, "http://localhost:3000");
        assert!(!file.providers.enable_kitsu);
        assert!(!file.cache.enabled);
        // Untouched sections keep defaults
        assert_eq!(file.server.bind_address, "0.0.0.0");
    }
}
