//! Image generation providers.

#[cfg(feature = "gemini")]
mod gemini;
#[cfg(feature = "openai")]
pub mod multipart;
#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, GeminiProviderBuilder, GEMINI_PROVIDER_INFO};

#[cfg(feature = "openai")]
pub use openai::{
    map_quality, map_size, OpenAiProvider, OpenAiProviderBuilder, OPENAI_PROVIDER_INFO,
};

use crate::error::Result;
use crate::image::provider::ImageProvider;
#[cfg(any(feature = "gemini", feature = "openai"))]
use crate::image::types::ImageResult;
use std::sync::Arc;

/// Constructor for a built-in provider, given its API key.
#[derive(Clone, Copy)]
pub struct ProviderFactory {
    /// Provider name; also selects the API key to resolve.
    pub name: &'static str,
    /// Builds the provider.
    pub build: fn(String) -> Result<Arc<dyn ImageProvider>>,
}

impl std::fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("name", &self.name)
            .finish()
    }
}

/// Built-in providers, in registration order.
pub fn builtin_factories() -> Vec<ProviderFactory> {
    #[allow(unused_mut)]
    let mut factories = Vec::new();
    #[cfg(feature = "gemini")]
    factories.push(ProviderFactory {
        name: GEMINI_PROVIDER_INFO.name,
        build: build_gemini,
    });
    #[cfg(feature = "openai")]
    factories.push(ProviderFactory {
        name: OPENAI_PROVIDER_INFO.name,
        build: build_openai,
    });
    factories
}

#[cfg(feature = "gemini")]
fn build_gemini(api_key: String) -> Result<Arc<dyn ImageProvider>> {
    let provider = GeminiProvider::builder().api_key(api_key).build()?;
    Ok(Arc::new(provider))
}

#[cfg(feature = "openai")]
fn build_openai(api_key: String) -> Result<Arc<dyn ImageProvider>> {
    let provider = OpenAiProvider::builder().api_key(api_key).build()?;
    Ok(Arc::new(provider))
}

/// Error envelope shared by the Gemini and OpenAI APIs.
#[cfg(any(feature = "gemini", feature = "openai"))]
#[derive(Debug, Default, serde::Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<ApiError>,
}

#[cfg(any(feature = "gemini", feature = "openai"))]
#[derive(Debug, Default, serde::Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

/// The error object's message, or `HTTP <status>` when it has none.
#[cfg(any(feature = "gemini", feature = "openai"))]
fn api_error_message(error: Option<ApiError>, status: reqwest::StatusCode) -> String {
    error
        .and_then(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

/// Failed result for a non-2xx response, using the API's message when present.
#[cfg(any(feature = "gemini", feature = "openai"))]
fn http_failure(status: reqwest::StatusCode, body: &str) -> ImageResult {
    let error = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error);
    let message = api_error_message(error, status);
    tracing::debug!(status = status.as_u16(), "provider returned an error: {message}");
    ImageResult::failure(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_factory_order() {
        let names: Vec<_> = builtin_factories().iter().map(|f| f.name).collect();
        let mut expected = Vec::new();
        if cfg!(feature = "gemini") {
            expected.push("gemini");
        }
        if cfg!(feature = "openai") {
            expected.push("openai");
        }
        assert_eq!(names, expected);
    }

    #[cfg(any(feature = "gemini", feature = "openai"))]
    #[test]
    fn test_http_failure_message() {
        let status = reqwest::StatusCode::BAD_REQUEST;
        let with_message = http_failure(status, r#"{"error":{"message":"bad prompt"}}"#);
        assert_eq!(with_message.error(), Some("bad prompt"));

        let html = http_failure(reqwest::StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(html.error(), Some("HTTP 502"));
        assert!(!html.is_success());
    }
}
