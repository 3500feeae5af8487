//! Gemini (Google) image generation provider.

use super::{api_error_message, http_failure, ApiError};
use crate::error::{ImgxError, Result};
use crate::image::provider::{ImageEditor, ImageProvider};
use crate::image::types::{
    Capability, EditInput, GenerateInput, GeneratedImage, ImageResult, ProviderInfo,
};
use crate::storage::read_input_image;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Static metadata for the Gemini provider.
pub const GEMINI_PROVIDER_INFO: ProviderInfo = ProviderInfo {
    name: "gemini",
    models: &["gemini-3-pro-image-preview", "gemini-2.5-flash-image"],
    default_model: "gemini-3-pro-image-preview",
    capabilities: &[
        Capability::TextToImage,
        Capability::AspectRatio,
        Capability::ImageEditing,
        Capability::ResolutionControl,
        Capability::MultipleOutputs,
        Capability::ReferenceImages,
        Capability::PersonControl,
    ],
    aspect_ratios: &["1:1", "2:3", "3:2", "3:4", "4:3", "9:16", "16:9"],
    resolutions: Some(&["1K", "2K", "4K"]),
};

/// Maps a resolution label to Gemini's `imageSize`. Unknown labels map to `None`.
pub(crate) fn map_image_size(resolution: &str) -> Option<&'static str> {
    match resolution {
        "1K" => Some("1024"),
        "2K" => Some("2048"),
        "4K" => Some("4096"),
        _ => None,
    }
}

/// Builder for GeminiProvider.
#[derive(Debug, Clone, Default)]
pub struct GeminiProviderBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
}

impl GeminiProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the API base URL (e.g., for a proxy or a mock server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Builds the provider.
    pub fn build(self) -> Result<GeminiProvider> {
        let api_key = self
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ImgxError::Auth("no Gemini API key provided".into()))?;

        Ok(GeminiProvider {
            client: reqwest::Client::new(),
            api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// Gemini image generation provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    /// Creates a new `GeminiProviderBuilder`.
    pub fn builder() -> GeminiProviderBuilder {
        GeminiProviderBuilder::new()
    }

    async fn call(
        &self,
        parts: Vec<GeminiRequestPart>,
        input: &GenerateInput,
        model: Option<&str>,
    ) -> Result<ImageResult> {
        let model = model.unwrap_or(GEMINI_PROVIDER_INFO.default_model);
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let body = GeminiRequest::new(parts, input);

        tracing::debug!(model, "sending Gemini generateContent request");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Ok(http_failure(status, &text));
        }

        let gemini_response: GeminiResponse = serde_json::from_str(&text)?;
        gemini_response.into_result(status)
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    fn info(&self) -> &ProviderInfo {
        &GEMINI_PROVIDER_INFO
    }

    async fn generate(&self, input: &GenerateInput, model: Option<&str>) -> Result<ImageResult> {
        let parts = vec![GeminiRequestPart::Text {
            text: input.prompt.clone(),
        }];
        self.call(parts, input, model).await
    }

    fn editor(&self) -> Option<&dyn ImageEditor> {
        Some(self)
    }
}

#[async_trait]
impl ImageEditor for GeminiProvider {
    async fn edit(&self, input: &EditInput, model: Option<&str>) -> Result<ImageResult> {
        let image = read_input_image(&input.input_image).await?;
        let parts = vec![
            GeminiRequestPart::Text {
                text: input.input.prompt.clone(),
            },
            GeminiRequestPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: image.mime_type().to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(&image.data),
                },
            },
        ];
        self.call(parts, &input.input, model).await
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<GeminiImageConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidate_count: Option<u32>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_size: Option<&'static str>,
}

impl GeminiImageConfig {
    fn is_empty(&self) -> bool {
        self.aspect_ratio.is_none() && self.image_size.is_none()
    }
}

impl GeminiRequest {
    fn new(parts: Vec<GeminiRequestPart>, input: &GenerateInput) -> Self {
        let image_config = GeminiImageConfig {
            aspect_ratio: input.aspect_ratio.clone().filter(|r| !r.is_empty()),
            image_size: input.resolution.as_deref().and_then(map_image_size),
        };
        let count = GEMINI_PROVIDER_INFO.effective_count(input.count);

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
                image_config: (!image_config.is_empty()).then_some(image_config),
                candidate_count: (count > 1).then_some(count),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

impl GeminiResponse {
    /// Collects the inline images of every candidate, in order. An `error`
    /// object in the body is a failure even on a 2xx status.
    fn into_result(self, status: reqwest::StatusCode) -> Result<ImageResult> {
        if self.error.is_some() {
            return Ok(ImageResult::failure(api_error_message(self.error, status)));
        }

        let engine = base64::engine::general_purpose::STANDARD;
        let mut images = Vec::new();
        for part in self
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
        {
            let Some(inline) = part.inline_data else {
                continue;
            };
            let data = engine
                .decode(&inline.data)
                .map_err(|e| ImgxError::Decode(e.to_string()))?;
            let mime_type = inline
                .mime_type
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "image/png".to_string());
            images.push(GeneratedImage::new(data, mime_type));
        }

        if images.is_empty() {
            if let Some(feedback) = self.prompt_feedback {
                if let Some(reason) = feedback.block_reason {
                    let message = feedback
                        .block_reason_message
                        .unwrap_or_else(|| format!("Prompt blocked: {reason}"));
                    return Ok(ImageResult::failure(message));
                }
            }
        }
        Ok(ImageResult::from_images(images))
    }
}
