#![warn(missing_docs)]
//! imgx - AI image generation and editing across providers.
//!
//! This crate provides a unified interface for generating and editing images
//! with different AI providers, plus the configuration layering and output
//! handling shared by the `imgx` CLI and its MCP server.
//!
//! # Quick Start
//!
//! ```no_run
//! use imgx::{ImageRequest, InputSource, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> imgx::Result<()> {
//!     // Reads GEMINI_API_KEY / OPENAI_API_KEY, IMGX_* and the config files.
//!     let orchestrator = Orchestrator::from_env()?;
//!
//!     let outcome = orchestrator
//!         .generate(&ImageRequest::new("A golden retriever puppy"))
//!         .await?;
//!     println!("wrote {:?}", outcome.file_paths);
//!
//!     // Chain an edit on the image just written.
//!     let edited = orchestrator
//!         .edit(&ImageRequest::new("Add a red collar"), InputSource::LastOutput)
//!         .await?;
//!     println!("wrote {:?}", edited.file_paths);
//!     Ok(())
//! }
//! ```
//!
//! # Using a provider directly
//!
//! ```no_run
//! use imgx::{GeminiProvider, GenerateInput, ImageProvider};
//!
//! #[tokio::main]
//! async fn main() -> imgx::Result<()> {
//!     let provider = GeminiProvider::builder().api_key("...").build()?;
//!     let input = GenerateInput::new("A lighthouse at dusk").with_aspect_ratio("16:9");
//!     let result = provider.generate(&input, None).await?;
//!     println!("{} image(s)", result.images().len());
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini`: Gemini (Google)
//! - `openai`: OpenAI (gpt-image-1)
//! - `cli`: Command-line interface and MCP server

mod error;

pub mod config;
pub mod image;
pub mod orchestrator;
pub mod storage;

#[cfg(feature = "cli")]
#[doc(hidden)]
pub mod mcp;

// Re-export error types at crate root
pub use error::{ImgxError, Result};

// Re-export commonly used image types
pub use image::{
    Capability, EditInput, GenerateInput, GeneratedImage, ImageEditor, ImageFormat, ImageProvider,
    ImageResult, ProviderInfo, ProviderRegistry,
};

pub use orchestrator::{ImageRequest, InputSource, Orchestrator, Outcome};

#[cfg(feature = "gemini")]
pub use image::providers::{GeminiProvider, GeminiProviderBuilder};

#[cfg(feature = "openai")]
pub use image::providers::{OpenAiProvider, OpenAiProviderBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{ImgxError, Result};
    pub use crate::image::{
        Capability, EditInput, GenerateInput, ImageEditor, ImageProvider, ImageResult,
    };
    pub use crate::orchestrator::{ImageRequest, InputSource, Orchestrator};

    #[cfg(feature = "gemini")]
    pub use crate::image::providers::GeminiProvider;

    #[cfg(feature = "openai")]
    pub use crate::image::providers::OpenAiProvider;
}
