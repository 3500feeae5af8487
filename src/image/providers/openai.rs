//! OpenAI image generation provider (gpt-image-1).

use super::multipart::MultipartForm;
use super::{api_error_message, http_failure, ApiError};
use crate::error::{ImgxError, Result};
use crate::image::provider::{ImageEditor, ImageProvider};
use crate::image::types::{
    Capability, EditInput, GenerateInput, GeneratedImage, ImageFormat, ImageResult, ProviderInfo,
};
use crate::storage::read_input_image;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Static metadata for the OpenAI provider.
pub const OPENAI_PROVIDER_INFO: ProviderInfo = ProviderInfo {
    name: "openai",
    models: &["gpt-image-1"],
    default_model: "gpt-image-1",
    capabilities: &[
        Capability::TextToImage,
        Capability::AspectRatio,
        Capability::ImageEditing,
        Capability::MultipleOutputs,
        Capability::OutputFormat,
    ],
    aspect_ratios: &["1:1", "3:2", "2:3", "16:9", "9:16", "4:3", "3:4"],
    resolutions: Some(&["1K", "2K", "4K"]),
};

/// Maps an aspect ratio token to an OpenAI `size`. Unknown tokens map to "auto".
pub fn map_size(aspect_ratio: Option<&str>) -> &'static str {
    match aspect_ratio {
        Some("1:1") => "1024x1024",
        Some("3:2" | "16:9" | "4:3") => "1536x1024",
        Some("2:3" | "9:16" | "3:4") => "1024x1536",
        _ => "auto",
    }
}

/// Maps a resolution label to an OpenAI `quality`. Unknown labels map to "auto".
pub fn map_quality(resolution: Option<&str>) -> &'static str {
    match resolution {
        Some("1K") => "low",
        Some("4K") => "high",
        _ => "auto",
    }
}

/// Builder for OpenAiProvider.
#[derive(Debug, Clone, Default)]
pub struct OpenAiProviderBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
}

impl OpenAiProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the API base URL (e.g., for Azure-style proxies or a mock server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Builds the provider.
    pub fn build(self) -> Result<OpenAiProvider> {
        let api_key = self
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ImgxError::Auth("no OpenAI API key provided".into()))?;

        Ok(OpenAiProvider {
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

/// OpenAI image generation provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    /// Creates a new `OpenAiProviderBuilder`.
    pub fn builder() -> OpenAiProviderBuilder {
        OpenAiProviderBuilder::new()
    }

    async fn read_response(
        response: reqwest::Response,
        format: Option<ImageFormat>,
    ) -> Result<ImageResult> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Ok(http_failure(status, &text));
        }
        let parsed: OpenAiImageResponse = serde_json::from_str(&text)?;
        parsed.into_result(status, format)
    }
}

#[async_trait]
impl ImageProvider for OpenAiProvider {
    fn info(&self) -> &ProviderInfo {
        &OPENAI_PROVIDER_INFO
    }

    async fn generate(&self, input: &GenerateInput, model: Option<&str>) -> Result<ImageResult> {
        let model = model.unwrap_or(OPENAI_PROVIDER_INFO.default_model);
        let body = OpenAiImageRequest::new(model, input);

        tracing::debug!(model, n = body.n, size = body.size, "sending OpenAI generation request");
        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        Self::read_response(response, input.output_format).await
    }

    fn editor(&self) -> Option<&dyn ImageEditor> {
        Some(self)
    }
}

#[async_trait]
impl ImageEditor for OpenAiProvider {
    async fn edit(&self, input: &EditInput, model: Option<&str>) -> Result<ImageResult> {
        let model = model.unwrap_or(OPENAI_PROVIDER_INFO.default_model);
        let image = read_input_image(&input.input_image).await?;
        let params = OpenAiImageRequest::new(model, &input.input);

        let mut form = MultipartForm::new()
            .text("model", params.model)
            .text("prompt", params.prompt)
            .text("n", params.n.to_string())
            .text("size", params.size)
            .text("quality", params.quality);
        if let Some(format) = params.output_format {
            form = form.text("output_format", format);
        }
        let encoded = form
            .file("image", image.upload_name(), image.mime_type(), image.data)
            .encode();

        tracing::debug!(model, bytes = encoded.body.len(), "sending OpenAI edit request");
        let response = self
            .client
            .post(format!("{}/images/edits", self.base_url))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, encoded.content_type())
            .body(encoded.body)
            .send()
            .await?;

        Self::read_response(response, input.input.output_format).await
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
struct OpenAiImageRequest {
    model: String,
    prompt: String,
    n: u32,
    size: &'static str,
    quality: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_format: Option<&'static str>,
}

impl OpenAiImageRequest {
    fn new(model: &str, input: &GenerateInput) -> Self {
        Self {
            model: model.to_string(),
            prompt: input.prompt.clone(),
            n: OPENAI_PROVIDER_INFO.effective_count(input.count),
            size: map_size(input.aspect_ratio.as_deref()),
            quality: map_quality(input.resolution.as_deref()),
            output_format: input.output_format.map(|f| f.as_str()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiImageResponse {
    #[serde(default)]
    data: Vec<OpenAiImageData>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageData {
    #[serde(default)]
    b64_json: Option<String>,
}

impl OpenAiImageResponse {
    fn into_result(
        self,
        status: reqwest::StatusCode,
        format: Option<ImageFormat>,
    ) -> Result<ImageResult> {
        if self.error.is_some() {
            return Ok(ImageResult::failure(api_error_message(self.error, status)));
        }

        let mime_type = format.unwrap_or_default().mime_type();
        let engine = base64::engine::general_purpose::STANDARD;
        let images = self
            .data
            .into_iter()
            .filter_map(|item| item.b64_json)
            .map(|b64| {
                engine
                    .decode(b64)
                    .map(|data| GeneratedImage::new(data, mime_type))
                    .map_err(|e| ImgxError::Decode(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ImageResult::from_images(images))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use reqwest::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SUPPORTED: [&str; 7] = ["1:1", "3:2", "2:3", "16:9", "9:16", "4:3", "3:4"];

    fn provider(server: &MockServer) -> OpenAiProvider {
        OpenAiProviderBuilder::new()
            .api_key("sk-test")
            .base_url(server.uri())
            .build()
            .unwrap()
    }

    fn b64(data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    #[test]
    fn test_supported_ratios_map_to_concrete_sizes() {
        assert_eq!(&SUPPORTED[..], OPENAI_PROVIDER_INFO.aspect_ratios);
        for ratio in SUPPORTED {
            assert_ne!(map_size(Some(ratio)), "auto", "ratio {ratio}");
        }
        assert_eq!(map_size(Some("1:1")), "1024x1024");
        assert_eq!(map_size(Some("16:9")), "1536x1024");
        assert_eq!(map_size(Some("9:16")), "1024x1536");
    }

    #[test]
    fn test_unknown_ratio_maps_to_auto() {
        assert_eq!(map_size(Some("21:9")), "auto");
        assert_eq!(map_size(Some("")), "auto");
        assert_eq!(map_size(None), "auto");
    }

    #[test]
    fn test_map_quality() {
        assert_eq!(map_quality(Some("1K")), "low");
        assert_eq!(map_quality(Some("2K")), "auto");
        assert_eq!(map_quality(Some("4K")), "high");
        assert_eq!(map_quality(Some("8K")), "auto");
        assert_eq!(map_quality(None), "auto");
    }

    #[test]
    fn test_builder_requires_key() {
        assert!(matches!(
            OpenAiProviderBuilder::new().build(),
            Err(ImgxError::Auth(_))
        ));
    }

    #[test]
    fn test_response_error_object_is_failure() {
        let resp: OpenAiImageResponse =
            serde_json::from_str(r#"{ "error": { "message": "Billing hard limit reached" } }"#)
                .unwrap();
        let result = resp.into_result(StatusCode::OK, None).unwrap();
        assert_eq!(result.error(), Some("Billing hard limit reached"));
    }

    #[test]
    fn test_response_error_without_message_names_status() {
        let resp: OpenAiImageResponse =
            serde_json::from_str(r#"{ "error": { "code": "x" } }"#).unwrap();
        let result = resp.into_result(StatusCode::OK, None).unwrap();
        assert_eq!(result.error(), Some("HTTP 200"));

        let resp: OpenAiImageResponse =
            serde_json::from_str(r#"{ "error": { "message": "" } }"#).unwrap();
        let result = resp.into_result(StatusCode::OK, None).unwrap();
        assert_eq!(result.error(), Some("HTTP 200"));
    }

    #[test]
    fn test_response_mime_follows_output_format() {
        let resp: OpenAiImageResponse =
            serde_json::from_value(json!({ "data": [{ "b64_json": b64(b"a") }, { "url": "https://x" }] }))
                .unwrap();
        let result = resp.into_result(StatusCode::OK, Some(ImageFormat::WebP)).unwrap();
        assert_eq!(result.images().len(), 1);
        assert_eq!(result.images()[0].mime_type, "image/webp");
    }

    #[tokio::test]
    async fn test_generate_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "gpt-image-1",
                "prompt": "a fox",
                "n": 2,
                "size": "1536x1024",
                "quality": "high"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "b64_json": b64(b"fox-1") }, { "b64_json": b64(b"fox-2") }]
            })))
            .mount(&server)
            .await;

        let input = GenerateInput::new("a fox")
            .with_aspect_ratio("16:9")
            .with_resolution("4K")
            .with_count(2);
        let result = provider(&server).generate(&input, None).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.images().len(), 2);
        assert_eq!(result.images()[1].data, b"fox-2");
        assert_eq!(result.images()[0].mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_generate_http_error_without_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = provider(&server)
            .generate(&GenerateInput::new("x"), None)
            .await
            .unwrap();
        assert_eq!(result.error(), Some("HTTP 500"));
    }

    #[tokio::test]
    async fn test_generate_error_object_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "error": { "code": "x" } })),
            )
            .mount(&server)
            .await;

        let result = provider(&server)
            .generate(&GenerateInput::new("x"), None)
            .await
            .unwrap();
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("HTTP 200"));
    }

    #[tokio::test]
    async fn test_generate_zero_images_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let result = provider(&server)
            .generate(&GenerateInput::new("x"), None)
            .await
            .unwrap();
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("No image data in response"));
    }

    #[tokio::test]
    async fn test_edit_sends_multipart_form() {
        let dir = tempfile::tempdir().unwrap();
        let input_path = dir.path().join("source.webp");
        std::fs::write(&input_path, b"webp-bytes").unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/edits"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "b64_json": b64(b"edited") }]
            })))
            .mount(&server)
            .await;

        let input = GenerateInput::new("add a hat")
            .with_aspect_ratio("1:1")
            .with_output_format(ImageFormat::Jpeg)
            .into_edit(&input_path);
        let provider = provider(&server);
        let result = provider.editor().unwrap().edit(&input, None).await.unwrap();
        assert_eq!(result.images()[0].data, b"edited");
        assert_eq!(result.images()[0].mime_type, "image/jpeg");

        let requests = server.received_requests().await.unwrap();
        let request = &requests[0];
        let content_type = request.headers.get("content-type").unwrap().to_str().unwrap();
        let boundary = multer::parse_boundary(content_type).unwrap();

        let body = Bytes::from(request.body.clone());
        let stream =
            futures_util::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut fields = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap().to_string();
            if name == "image" {
                assert_eq!(field.file_name(), Some("image.webp"));
                assert_eq!(field.content_type().unwrap().essence_str(), "image/webp");
                assert_eq!(&field.bytes().await.unwrap()[..], &b"webp-bytes"[..]);
            } else {
                fields.push((name, field.text().await.unwrap()));
            }
        }
        assert_eq!(
            fields,
            vec![
                ("model".to_string(), "gpt-image-1".to_string()),
                ("prompt".to_string(), "add a hat".to_string()),
                ("n".to_string(), "1".to_string()),
                ("size".to_string(), "1024x1024".to_string()),
                ("quality".to_string(), "auto".to_string()),
                ("output_format".to_string(), "jpeg".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_edit_missing_input_is_io_error() {
        let server = MockServer::start().await;
        let provider = provider(&server);
        let err = provider
            .editor()
            .unwrap()
            .edit(&EditInput::new("x", "/no/such/file.png"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ImgxError::Io(_)));
    }
}
