use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::video::error::StudioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AspectRatio {
    #[default]
    #[value(name = "16:9")]
    Landscape,
    #[value(name = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

/// Trade-off between generation speed and quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityMode {
    #[default]
    Fast,
    /// Slower, higher-quality generation for complex prompts.
    Thinking,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SeedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl fmt::Debug for SeedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedImage")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl SeedImage {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let mime_type = mime_type_for(path).with_context(|| {
            format!(
                "Unsupported seed image {}; use a PNG, JPEG or WebP file",
                path.display()
            )
        })?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read seed image {}", path.display()))?;
        Ok(Self {
            bytes,
            mime_type: mime_type.to_string(),
        })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub seed_image: Option<SeedImage>,
    pub aspect_ratio: AspectRatio,
    pub quality: QualityMode,
}

impl GenerationRequest {
    /// Both a prompt and a seed image are required before anything is sent.
    pub fn validate(&self) -> Result<(), StudioError> {
        if self.prompt.trim().is_empty() || self.seed_image.is_none() {
            return Err(StudioError::Validation(
                "Please provide both a prompt and an image.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Opaque reference to a long-running generation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle(pub String);

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperationStatus {
    pub done: bool,
    pub result_location: Option<String>,
    pub error: Option<String>,
}

impl OperationStatus {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn completed(location: impl Into<String>) -> Self {
        Self {
            done: true,
            result_location: Some(location.into()),
            error: None,
        }
    }
}

/// External clip generation service.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn submit(&self, request: &GenerationRequest) -> Result<OperationHandle>;

    async fn check_status(&self, operation: &OperationHandle) -> Result<OperationStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str, with_image: bool) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            seed_image: with_image.then(|| SeedImage {
                bytes: vec![1, 2, 3],
                mime_type: "image/png".into(),
            }),
            aspect_ratio: AspectRatio::Landscape,
            quality: QualityMode::Fast,
        }
    }

    #[test]
    fn prompt_and_image_are_required() {
        assert!(request("a fox in snow", true).validate().is_ok());
        assert!(request("  ", true).validate().is_err());
        assert!(request("a fox in snow", false).validate().is_err());
    }

    #[test]
    fn mime_type_follows_extension() {
        assert_eq!(mime_type_for(Path::new("a.PNG")), Some("image/png"));
        assert_eq!(mime_type_for(Path::new("a.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_type_for(Path::new("a.gif")), None);
    }

    #[test]
    fn seed_image_encodes_base64() {
        let image = SeedImage {
            bytes: b"hi".to_vec(),
            mime_type: "image/png".into(),
        };
        assert_eq!(image.to_base64(), "aGk=");
    }

    #[tokio::test]
    async fn seed_image_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.jpg");
        std::fs::write(&path, b"jpeg").unwrap();
        let image = SeedImage::from_path(&path).await.unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.bytes, b"jpeg");
    }
}
