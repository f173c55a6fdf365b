use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::video::error::StudioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum VideoCategory {
    Diy,
    Education,
    Entertainment,
    Finance,
    Fitness,
    Food,
    Gaming,
    News,
    #[default]
    Story,
    Technology,
    Travel,
    YoutubeTips,
    ScriptWriting,
}

impl VideoCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCategory::Diy => "DIY",
            VideoCategory::Education => "Education",
            VideoCategory::Entertainment => "Entertainment",
            VideoCategory::Finance => "Finance",
            VideoCategory::Fitness => "Fitness",
            VideoCategory::Food => "Food",
            VideoCategory::Gaming => "Gaming",
            VideoCategory::News => "News",
            VideoCategory::Story => "Story",
            VideoCategory::Technology => "Technology",
            VideoCategory::Travel => "Travel",
            VideoCategory::YoutubeTips => "YouTube Tips",
            VideoCategory::ScriptWriting => "Video Script Writing Tool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum VideoLanguage {
    #[default]
    Auto,
    English,
    Hindi,
    Hinglish,
}

impl VideoLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoLanguage::Auto => "Auto-detect",
            VideoLanguage::English => "English",
            VideoLanguage::Hindi => "Hindi",
            VideoLanguage::Hinglish => "Hinglish",
        }
    }
}

/// A video sent inline alongside the SEO request.
#[derive(Clone, PartialEq, Eq)]
pub struct VideoAttachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl fmt::Debug for VideoAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoAttachment")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl VideoAttachment {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let mime_type = video_mime_type_for(path).with_context(|| {
            format!(
                "Unsupported video {}; use an MP4, WebM or MOV file",
                path.display()
            )
        })?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read video {}", path.display()))?;
        Ok(Self {
            bytes,
            mime_type: mime_type.to_string(),
        })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

fn video_mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "mov" => Some("video/quicktime"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeoRequest {
    /// Story text or a short video idea.
    pub text: String,
    pub video: Option<VideoAttachment>,
    pub category: VideoCategory,
    pub language: VideoLanguage,
    /// Use the deeper reasoning model for text-only requests.
    pub thinking: bool,
}

impl SeoRequest {
    pub fn validate(&self) -> Result<(), StudioError> {
        if self.text.trim().is_empty() && self.video.is_none() {
            return Err(StudioError::Validation(
                "Please provide some text or a video.".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LanguageDetection {
    pub language: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeoDescription {
    pub short: String,
    pub long: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThumbnailIdea {
    pub idea: String,
    /// Where the generated image was written, if generation succeeded.
    #[serde(default, skip_deserializing)]
    pub image: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeoScore {
    pub score: u32,
    pub justification: String,
}

/// Everything needed to publish one video.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoPack {
    #[serde(default)]
    pub is_idea: bool,
    pub language_detection: LanguageDetection,
    #[serde(default)]
    pub generated_story: Option<String>,
    pub seo_titles: Vec<String>,
    pub seo_description: SeoDescription,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub thumbnail_ideas: Vec<ThumbnailIdea>,
    pub seo_score: SeoScore,
}

#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl GeneratedImage {
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Demand {
    High,
    Medium,
    Low,
}

impl FromStr for Demand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Demand::High),
            "medium" => Ok(Demand::Medium),
            "low" => Ok(Demand::Low),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Demand::High => "High",
            Demand::Medium => "Medium",
            Demand::Low => "Low",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordSuggestion {
    pub keyword: String,
    pub volume: Demand,
    pub competition: Demand,
}

/// A web page the keyword research was grounded on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLink {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct KeywordResearch {
    pub suggestions: Vec<KeywordSuggestion>,
    pub sources: Vec<SourceLink>,
}

/// External text and image generation service.
#[async_trait]
pub trait ContentService: Send + Sync {
    async fn generate_pack(&self, request: &SeoRequest) -> Result<SeoPack>;

    /// `Ok(None)` when the model answered without an image.
    async fn generate_image(&self, prompt: &str) -> Result<Option<GeneratedImage>>;

    /// Raw research text (a markdown table) and the pages it was grounded on.
    async fn research_keywords(&self, topic: &str) -> Result<(String, Vec<SourceLink>)>;
}
