//! Image provider traits.

use crate::error::Result;
use crate::image::types::{Capability, EditInput, GenerateInput, ImageResult, ProviderInfo};
use async_trait::async_trait;

/// Trait for image generation providers.
///
/// Expected provider failures (HTTP errors, refusals, empty payloads) are
/// returned as a failed [`ImageResult`]. `Err` is reserved for transport
/// faults such as network errors or undecodable responses.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Returns the provider's static metadata.
    fn info(&self) -> &ProviderInfo;

    /// Generates images from a text prompt.
    ///
    /// `model` overrides [`ProviderInfo::default_model`].
    async fn generate(&self, input: &GenerateInput, model: Option<&str>) -> Result<ImageResult>;

    /// Returns the edit operation if this provider can edit images.
    ///
    /// Only providers advertising [`Capability::ImageEditing`] return `Some`.
    fn editor(&self) -> Option<&dyn ImageEditor> {
        None
    }

    /// Returns the registry name of this provider.
    fn name(&self) -> &str {
        self.info().name
    }

    /// Returns true if the provider advertises the capability.
    fn supports(&self, capability: Capability) -> bool {
        self.info().supports(capability)
    }
}

/// Edit operation of an editing-capable provider.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Edits the input image according to the prompt.
    async fn edit(&self, input: &EditInput, model: Option<&str>) -> Result<ImageResult>;
}
