//! Veo video generation through the Gemini long-running prediction API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::types::{
    GenerationRequest, GenerationService, OperationHandle, OperationStatus, QualityMode,
};
use crate::ui::prelude::{Level, emit};

const FAST_MODEL: &str = "veo-3.1-fast-generate-preview";
const THINKING_MODEL: &str = "veo-3.1-generate-preview";
pub(crate) const API_KEY_HEADER: &str = "x-goog-api-key";
const RESOLUTION: &str = "720p";

pub struct GeminiVideoService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiVideoService {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn model_for(quality: QualityMode) -> &'static str {
        match quality {
            QualityMode::Fast => FAST_MODEL,
            QualityMode::Thinking => THINKING_MODEL,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictRequest<'a> {
    instances: [Instance<'a>; 1],
    parameters: Parameters<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Instance<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<InlineImage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters<'a> {
    aspect_ratio: &'a str,
    resolution: &'a str,
    sample_count: u32,
}

impl<'a> PredictRequest<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        Self {
            instances: [Instance {
                prompt: &request.prompt,
                image: request.seed_image.as_ref().map(|image| InlineImage {
                    bytes_base64_encoded: image.to_base64(),
                    mime_type: image.mime_type.clone(),
                }),
            }],
            parameters: Parameters {
                aspect_ratio: request.aspect_ratio.as_str(),
                resolution: RESOLUTION,
                sample_count: 1,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    name: Option<String>,
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    response: Option<OperationResult>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResult {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    uri: Option<String>,
}

impl OperationResponse {
    fn into_status(self) -> OperationStatus {
        let result_location = self
            .response
            .and_then(|r| r.generate_video_response)
            .and_then(|r| r.generated_samples.into_iter().next())
            .and_then(|s| s.video)
            .and_then(|v| v.uri);

        OperationStatus {
            done: self.done,
            result_location,
            error: self
                .error
                .map(|e| e.message.unwrap_or_else(|| "unknown error".to_string())),
        }
    }
}

pub(crate) async fn error_for_status(resp: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    anyhow::bail!("Generation API error while {} ({}): {}", action, status, text)
}

#[async_trait]
impl GenerationService for GeminiVideoService {
    async fn submit(&self, request: &GenerationRequest) -> Result<OperationHandle> {
        let model = Self::model_for(request.quality);
        let url = format!("{}/models/{}:predictLongRunning", self.base_url, model);

        emit(
            Level::Debug,
            "video.gemini.submit",
            &format!("Submitting generation to {model}"),
            None,
        );

        let resp = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&PredictRequest::from_request(request))
            .send()
            .await
            .context("Failed to connect to the generation API")?;
        let resp = error_for_status(resp, "starting generation").await?;

        let operation: OperationResponse = resp
            .json()
            .await
            .context("Failed to parse generation response")?;

        operation
            .name
            .map(OperationHandle)
            .context("Generation response did not include an operation name")
    }

    async fn check_status(&self, operation: &OperationHandle) -> Result<OperationStatus> {
        let url = format!("{}/{}", self.base_url, operation.0.trim_start_matches('/'));

        let resp = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .context("Failed to connect to the generation API")?;
        let resp = error_for_status(resp, "checking generation status").await?;

        let operation: OperationResponse = resp
            .json()
            .await
            .context("Failed to parse operation status")?;

        Ok(operation.into_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::generation::types::{AspectRatio, SeedImage};

    #[test]
    fn request_body_matches_predict_schema() {
        let request = GenerationRequest {
            prompt: "sunrise over dunes".into(),
            seed_image: Some(SeedImage {
                bytes: b"hi".to_vec(),
                mime_type: "image/png".into(),
            }),
            aspect_ratio: AspectRatio::Portrait,
            quality: QualityMode::Fast,
        };

        let body = serde_json::to_value(PredictRequest::from_request(&request)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "instances": [{
                    "prompt": "sunrise over dunes",
                    "image": {"bytesBase64Encoded": "aGk=", "mimeType": "image/png"}
                }],
                "parameters": {"aspectRatio": "9:16", "resolution": "720p", "sampleCount": 1}
            })
        );
    }

    #[test]
    fn quality_selects_model() {
        assert_eq!(GeminiVideoService::model_for(QualityMode::Fast), FAST_MODEL);
        assert_eq!(
            GeminiVideoService::model_for(QualityMode::Thinking),
            THINKING_MODEL
        );
    }

    #[test]
    fn pending_operation_has_no_location() {
        let op: OperationResponse =
            serde_json::from_str(r#"{"name": "models/veo/operations/abc"}"#).unwrap();
        assert_eq!(op.into_status(), OperationStatus::pending());
    }

    #[test]
    fn finished_operation_exposes_first_sample() {
        let op: OperationResponse = serde_json::from_str(
            r#"{
                "name": "models/veo/operations/abc",
                "done": true,
                "response": {"generateVideoResponse": {"generatedSamples": [
                    {"video": {"uri": "https://files.test/v1?alt=media"}},
                    {"video": {"uri": "https://files.test/v2?alt=media"}}
                ]}}
            }"#,
        )
        .unwrap();
        assert_eq!(
            op.into_status(),
            OperationStatus::completed("https://files.test/v1?alt=media")
        );
    }

    #[test]
    fn failed_operation_carries_error_message() {
        let op: OperationResponse = serde_json::from_str(
            r#"{"done": true, "error": {"code": 3, "message": "prompt blocked by safety filters"}}"#,
        )
        .unwrap();
        let status = op.into_status();
        assert!(status.done);
        assert_eq!(status.result_location, None);
        assert_eq!(
            status.error.as_deref(),
            Some("prompt blocked by safety filters")
        );
    }
}
