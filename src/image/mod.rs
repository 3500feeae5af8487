//! Image generation module.

mod provider;
pub mod providers;
mod registry;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use provider::{ImageEditor, ImageProvider};
pub use registry::ProviderRegistry;
pub use types::{
    Capability, EditInput, GenerateInput, GeneratedImage, ImageFormat, ImageResult, ProviderInfo,
};
