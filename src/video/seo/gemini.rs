//! SEO text, keyword research and images through the Gemini `generateContent` API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::types::{ContentService, GeneratedImage, SeoPack, SeoRequest, SourceLink};
use crate::ui::prelude::{Level, emit};
use crate::video::generation::gemini::{API_KEY_HEADER, error_for_status};

const PRO_MODEL: &str = "gemini-2.5-pro";
const LITE_MODEL: &str = "gemini-2.5-flash-lite";
const SEARCH_MODEL: &str = "gemini-2.5-flash";
const IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const THINKING_BUDGET: u32 = 32768;

pub struct GeminiContentService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiContentService {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn generate(
        &self,
        model: &str,
        body: &GenerateContentRequest,
        action: &str,
    ) -> Result<GenerateContentResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        emit(
            Level::Debug,
            "video.seo.request",
            &format!("Calling {model} for {action}"),
            None,
        );

        let resp = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .context("Failed to connect to the generation API")?;
        let resp = error_for_status(resp, action).await?;

        resp.json()
            .await
            .context("Unexpected response format from the generation API")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: [Content; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

impl GenerateContentRequest {
    fn text(text: String) -> Self {
        Self {
            contents: [Content {
                parts: vec![Part {
                    text: Some(text),
                    inline_data: None,
                }],
            }],
            generation_config: None,
            tools: Vec::new(),
        }
    }

    fn seo_pack(request: &SeoRequest) -> (&'static str, Self) {
        let mut body = Self::text(seo_prompt(request));
        if let Some(video) = &request.video {
            body.contents[0].parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: video.mime_type.clone(),
                    data: video.to_base64(),
                }),
            });
        }

        let thinks = request.thinking && request.video.is_none();
        body.generation_config = Some(GenerationConfig {
            response_mime_type: Some("application/json"),
            response_schema: Some(seo_pack_schema()),
            thinking_config: thinks.then_some(ThinkingConfig {
                thinking_budget: THINKING_BUDGET,
            }),
            response_modalities: None,
        });

        let model = if request.video.is_some() || request.thinking {
            PRO_MODEL
        } else {
            LITE_MODEL
        };
        (model, body)
    }

    fn image(prompt: &str) -> Self {
        let mut body = Self::text(prompt.to_string());
        body.generation_config = Some(GenerationConfig {
            response_modalities: Some(vec!["IMAGE"]),
            ..GenerationConfig::default()
        });
        body
    }

    fn keyword_research(topic: &str) -> Self {
        let mut body = Self::text(format!(
            "Research YouTube keywords for the topic \"{topic}\" using current search data. \
             Answer with a markdown table with the columns Keyword, Search Volume and \
             Competition. Volume and competition must be High, Medium or Low."
        ));
        body.tools.push(json!({"googleSearch": {}}));
        body
    }
}

fn seo_prompt(request: &SeoRequest) -> String {
    let mut prompt = format!(
        "You are a YouTube SEO expert. Category: {}. Output language: {}.\n\
         If the input is a short idea rather than a full story, set isIdea and write the story first.\n\
         Produce titles, a short and a long description, tags, hashtags, thumbnail ideas and an SEO score.",
        request.category.as_str(),
        request.language.as_str(),
    );
    if !request.text.trim().is_empty() {
        prompt.push_str("\n\nInput:\n");
        prompt.push_str(request.text.trim());
    }
    prompt
}

fn seo_pack_schema() -> Value {
    let strings = json!({"type": "ARRAY", "items": {"type": "STRING"}});
    json!({
        "type": "OBJECT",
        "properties": {
            "isIdea": {"type": "BOOLEAN"},
            "languageDetection": {
                "type": "OBJECT",
                "properties": {
                    "language": {"type": "STRING"},
                    "confidence": {"type": "NUMBER"}
                },
                "required": ["language", "confidence"]
            },
            "generatedStory": {"type": "STRING"},
            "seoTitles": strings.clone(),
            "seoDescription": {
                "type": "OBJECT",
                "properties": {
                    "short": {"type": "STRING"},
                    "long": {"type": "STRING"}
                },
                "required": ["short", "long"]
            },
            "tags": strings.clone(),
            "hashtags": strings,
            "thumbnailIdeas": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {"idea": {"type": "STRING"}},
                    "required": ["idea"]
                }
            },
            "seoScore": {
                "type": "OBJECT",
                "properties": {
                    "score": {"type": "INTEGER"},
                    "justification": {"type": "STRING"}
                },
                "required": ["score", "justification"]
            }
        },
        "required": [
            "isIdea", "languageDetection", "seoTitles", "seoDescription",
            "tags", "hashtags", "thumbnailIdeas", "seoScore"
        ]
    })
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|content| content.parts.iter())
    }

    fn text(&self) -> String {
        self.parts().filter_map(|p| p.text.as_deref()).collect()
    }

    fn image(&self) -> Result<Option<GeneratedImage>> {
        let Some(data) = self.parts().find_map(|p| p.inline_data.as_ref()) else {
            return Ok(None);
        };
        let bytes = STANDARD
            .decode(data.data.as_bytes())
            .context("Unexpected response format: image data is not valid base64")?;
        Ok(Some(GeneratedImage {
            bytes,
            mime_type: data.mime_type.clone(),
        }))
    }

    /// Web sources the answer was grounded on, first occurrence of each URI.
    fn sources(&self) -> Vec<SourceLink> {
        let mut sources: Vec<SourceLink> = Vec::new();
        let chunks = self
            .candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|m| m.grounding_chunks.as_slice())
            .unwrap_or_default();

        for web in chunks.iter().filter_map(|chunk| chunk.web.as_ref()) {
            let Some(uri) = web.uri.as_deref().filter(|uri| !uri.is_empty()) else {
                continue;
            };
            if sources.iter().any(|s| s.uri == uri) {
                continue;
            }
            sources.push(SourceLink {
                uri: uri.to_string(),
                title: web.title.clone().unwrap_or_else(|| uri.to_string()),
            });
        }
        sources
    }
}

fn parse_pack(text: &str) -> Result<SeoPack> {
    let json = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```");
    serde_json::from_str(json.trim()).context("Unexpected response format for the SEO content")
}

#[async_trait]
impl ContentService for GeminiContentService {
    async fn generate_pack(&self, request: &SeoRequest) -> Result<SeoPack> {
        let (model, body) = GenerateContentRequest::seo_pack(request);
        let response = self.generate(model, &body, "generating SEO content").await?;
        parse_pack(&response.text())
    }

    async fn generate_image(&self, prompt: &str) -> Result<Option<GeneratedImage>> {
        let body = GenerateContentRequest::image(prompt);
        let response = self
            .generate(IMAGE_MODEL, &body, "generating a thumbnail")
            .await?;
        response.image()
    }

    async fn research_keywords(&self, topic: &str) -> Result<(String, Vec<SourceLink>)> {
        let body = GenerateContentRequest::keyword_research(topic);
        let response = self
            .generate(SEARCH_MODEL, &body, "researching keywords")
            .await?;
        Ok((response.text(), response.sources()))
    }
}
