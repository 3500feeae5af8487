//! Error types for image generation.

use crate::image::Capability;

/// Errors that can occur while resolving configuration or generating images.
#[derive(Debug, thiserror::Error)]
pub enum ImgxError {
    /// API key missing or invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Invalid user input (missing prompt, missing input image, unknown key).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Requested provider is not registered.
    #[error("Provider \"{name}\" not available.{}", available_hint(.available))]
    ProviderNotAvailable {
        /// Name that was requested.
        name: String,
        /// Names of the providers that are registered.
        available: Vec<String>,
    },

    /// Provider lacks the capability an operation requires.
    #[error("Provider \"{provider}\" does not support {capability}.{}", supported_hint(.supported))]
    UnsupportedCapability {
        /// Provider that was asked.
        provider: String,
        /// Capability that was required.
        capability: Capability,
        /// Registered providers that do have the capability.
        supported: Vec<String>,
    },

    /// The provider reported a failure, or the call to it failed.
    #[error("{0}")]
    Generation(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn available_hint(available: &[String]) -> String {
    if available.is_empty() {
        " No providers configured. Set GEMINI_API_KEY or OPENAI_API_KEY, or run `imgx config set api-key <key> --provider <name>`.".to_string()
    } else {
        format!(" Available: {}", available.join(", "))
    }
}

fn supported_hint(supported: &[String]) -> String {
    if supported.is_empty() {
        String::new()
    } else {
        format!(" Supported: {}", supported.join(", "))
    }
}

impl ImgxError {
    /// Returns true for failures raised while talking to a provider
    /// (network faults, undecodable responses) rather than by the provider itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Json(_) | Self::Decode(_))
    }

    /// Returns true if the error was caused by user input and can be fixed
    /// by the caller without any provider involvement.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_)
                | Self::ProviderNotAvailable { .. }
                | Self::UnsupportedCapability { .. }
        )
    }
}

/// Result type alias for imgx operations.
pub type Result<T> = std::result::Result<T, ImgxError>;
