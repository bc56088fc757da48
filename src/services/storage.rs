// Audio persistence: object storage when configured, local disk otherwise.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Uploads an audio asset and returns its public URL
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, data: Vec<u8>, public_id: &str, format: &str) -> Result<String>;
}

/// Cloudinary unsigned-upload client
pub struct CloudinaryStorage {
    client: Client,
    cloud_name: String,
    upload_preset: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl CloudinaryStorage {
    /// Returns None unless both cloud name and upload preset are configured
    pub fn from_config(cloud_name: Option<String>, upload_preset: Option<String>) -> Option<Self> {
        let cloud_name = cloud_name.filter(|v| !v.is_empty())?;
        let upload_preset = upload_preset.filter(|v| !v.is_empty())?;
        Some(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            cloud_name,
            upload_preset,
        })
    }
}

#[async_trait]
impl ObjectStorage for CloudinaryStorage {
    async fn upload(&self, data: Vec<u8>, public_id: &str, format: &str) -> Result<String> {
        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/raw/upload",
            self.cloud_name
        );

        let file_name = format!("{}.{}", public_id, format);
        let part = multipart::Part::bytes(data).file_name(file_name);
        let form = multipart::Form::new()
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", "narration")
            .text("public_id", public_id.to_string())
            .part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach object storage")?;

        if !response.status().is_success() {
            anyhow::bail!("Object storage returned {}", response.status());
        }

        let upload: UploadResponse = response
            .json()
            .await
            .context("Failed to parse object storage response")?;
        Ok(upload.secure_url)
    }
}

/// Persist an audio buffer: object storage first when available, local
/// disk under the uploads dir otherwise. Returns whichever URL succeeded;
/// an error only when both destinations fail.
pub async fn persist_audio(
    storage: Option<&dyn ObjectStorage>,
    uploads_dir: &Path,
    public_id: &str,
    data: Vec<u8>,
) -> Result<String> {
    if let Some(storage) = storage {
        match storage.upload(data.clone(), public_id, "mp3").await {
            Ok(url) => return Ok(url),
            Err(e) => {
                tracing::warn!("Object storage upload failed, writing to disk: {}", e);
            }
        }
    }

    write_to_disk(uploads_dir, public_id, &data).await
}

async fn write_to_disk(uploads_dir: &Path, public_id: &str, data: &[u8]) -> Result<String> {
    let dir = uploads_dir.join("narration");
    fs::create_dir_all(&dir)
        .await
        .context("Failed to create uploads directory")?;

    let file_name = format!("{}.mp3", public_id);
    let path: PathBuf = dir.join(&file_name);
    fs::write(&path, data)
        .await
        .with_context(|| format!("Failed to write audio to {:?}", path))?;

    tracing::info!("Wrote narration audio to {:?}", path);
    Ok(format!("/uploads/narration/{}", file_name))
}
