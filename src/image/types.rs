//! Core types for image generation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A feature a provider may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    /// Generate an image from a text prompt.
    TextToImage,
    /// Control the aspect ratio of the output.
    AspectRatio,
    /// Edit an existing image with text instructions.
    ImageEditing,
    /// Control the output resolution (1K/2K/4K).
    ResolutionControl,
    /// Return more than one image per request.
    MultipleOutputs,
    /// Accept reference images alongside the prompt.
    ReferenceImages,
    /// Control generation of people.
    PersonControl,
    /// Control the visual style.
    StyleControl,
    /// Choose the encoded output format.
    OutputFormat,
}

impl Capability {
    /// Returns the capability tag (e.g., "IMAGE_EDITING").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextToImage => "TEXT_TO_IMAGE",
            Self::AspectRatio => "ASPECT_RATIO",
            Self::ImageEditing => "IMAGE_EDITING",
            Self::ResolutionControl => "RESOLUTION_CONTROL",
            Self::MultipleOutputs => "MULTIPLE_OUTPUTS",
            Self::ReferenceImages => "REFERENCE_IMAGES",
            Self::PersonControl => "PERSON_CONTROL",
            Self::StyleControl => "STYLE_CONTROL",
            Self::OutputFormat => "OUTPUT_FORMAT",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static metadata a provider advertises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    /// Unique provider name, used as the registry key.
    pub name: &'static str,
    /// Model identifiers the provider accepts.
    pub models: &'static [&'static str],
    /// Model used when none is requested.
    pub default_model: &'static str,
    /// Supported capabilities.
    pub capabilities: &'static [Capability],
    /// Supported aspect-ratio tokens.
    pub aspect_ratios: &'static [&'static str],
    /// Supported resolution labels, if the provider has any.
    #[serde(serialize_with = "serialize_resolutions")]
    pub resolutions: Option<&'static [&'static str]>,
}

fn serialize_resolutions<S: serde::Serializer>(
    resolutions: &Option<&'static [&'static str]>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    resolutions.unwrap_or_default().serialize(serializer)
}

impl ProviderInfo {
    /// Returns true if the provider advertises the capability.
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Returns true if `model` is one of the provider's models.
    pub fn has_model(&self, model: &str) -> bool {
        self.models.contains(&model)
    }

    /// Number of images to request for a desired count.
    ///
    /// Providers without [`Capability::MultipleOutputs`] always get 1.
    pub fn effective_count(&self, requested: Option<u32>) -> u32 {
        let requested = requested.unwrap_or(1).max(1);
        if self.supports(Capability::MultipleOutputs) {
            requested
        } else {
            1
        }
    }
}

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Returns the token providers use for this format ("png", "jpeg", "webp").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::WebP => "webp",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Maps a MIME type to a format.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            other => Err(format!(
                "unknown output format '{other}' (expected png, jpeg or webp)"
            )),
        }
    }
}

/// Input for a text-to-image request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateInput {
    /// The text prompt describing the desired image.
    pub prompt: String,
    /// Aspect ratio token (e.g., "16:9").
    pub aspect_ratio: Option<String>,
    /// Number of images to generate.
    pub count: Option<u32>,
    /// Resolution label (e.g., "2K").
    pub resolution: Option<String>,
    /// Desired output format.
    pub output_format: Option<ImageFormat>,
}

impl GenerateInput {
    /// Creates a new input with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(ratio.into());
        self
    }

    /// Sets the number of images.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Sets the resolution label.
    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }

    /// Sets the desired output format.
    pub fn with_output_format(mut self, format: ImageFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Turns this input into an edit of the image at `input_image`.
    pub fn into_edit(self, input_image: impl Into<PathBuf>) -> EditInput {
        EditInput {
            input: self,
            input_image: input_image.into(),
        }
    }
}

/// Input for an image edit: a [`GenerateInput`] plus the image to edit.
///
/// The image is referenced by path and read by the provider when the
/// request is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditInput {
    /// Prompt and generation parameters.
    pub input: GenerateInput,
    /// Path of the image to edit.
    pub input_image: PathBuf,
}

impl EditInput {
    /// Creates a new edit input.
    pub fn new(prompt: impl Into<String>, input_image: impl Into<PathBuf>) -> Self {
        GenerateInput::new(prompt).into_edit(input_image)
    }
}

/// A generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// MIME type reported by the provider.
    pub mime_type: String,
}

impl GeneratedImage {
    /// Creates a new generated image.
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// File extension for this image's MIME type, defaulting to "png".
    pub fn extension(&self) -> &'static str {
        ImageFormat::from_mime_type(&self.mime_type)
            .unwrap_or_default()
            .extension()
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Uniform result every provider returns.
///
/// A successful result always carries at least one image; a failed one
/// carries no images and an error message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a failed result must be surfaced to the caller"]
pub struct ImageResult {
    success: bool,
    images: Vec<GeneratedImage>,
    error: Option<String>,
}

impl ImageResult {
    /// Builds a result from decoded images. An empty list becomes a failure.
    pub fn from_images(images: Vec<GeneratedImage>) -> Self {
        if images.is_empty() {
            return Self::failure("No image data in response");
        }
        Self {
            success: true,
            images,
            error: None,
        }
    }

    /// Builds a failed result.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            images: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Whether the provider produced images.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// The produced images (empty on failure).
    pub fn images(&self) -> &[GeneratedImage] {
        &self.images
    }

    /// The failure message, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Consumes the result, returning images or the error message.
    pub fn into_images(self) -> Result<Vec<GeneratedImage>, String> {
        if self.success {
            Ok(self.images)
        } else {
            Err(self.error.unwrap_or_else(|| "Generation failed".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
    const WEBP_MAGIC: [u8; 12] = *b"RIFF\x00\x00\x00\x00WEBP";

    const LIMITED: ProviderInfo = ProviderInfo {
        name: "limited",
        models: &["m1"],
        default_model: "m1",
        capabilities: &[Capability::TextToImage],
        aspect_ratios: &["1:1"],
        resolutions: None,
    };

    const MULTI: ProviderInfo = ProviderInfo {
        name: "multi",
        models: &["m1", "m2"],
        default_model: "m1",
        capabilities: &[Capability::TextToImage, Capability::MultipleOutputs],
        aspect_ratios: &["1:1"],
        resolutions: Some(&["1K"]),
    };

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&PNG_MAGIC),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&JPEG_MAGIC),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&WEBP_MAGIC),
            Some(ImageFormat::WebP)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"short"), None);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ImageFormat::from_extension("png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_extension("JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("webp"), Some(ImageFormat::WebP));
        assert_eq!(ImageFormat::from_extension("gif"), None);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("jpeg".parse::<ImageFormat>(), Ok(ImageFormat::Jpeg));
        assert_eq!("WEBP".parse::<ImageFormat>(), Ok(ImageFormat::WebP));
        assert!("bmp".parse::<ImageFormat>().is_err());
    }

    #[test]
    fn test_generated_image_extension_table() {
        assert_eq!(GeneratedImage::new(vec![], "image/png").extension(), "png");
        assert_eq!(GeneratedImage::new(vec![], "image/jpeg").extension(), "jpg");
        assert_eq!(GeneratedImage::new(vec![], "image/webp").extension(), "webp");
        assert_eq!(GeneratedImage::new(vec![], "image/gif").extension(), "png");
    }

    #[test]
    fn test_capability_serializes_as_tag() {
        let json = serde_json::to_value(Capability::ImageEditing).unwrap();
        assert_eq!(json, "IMAGE_EDITING");
        assert_eq!(Capability::MultipleOutputs.to_string(), "MULTIPLE_OUTPUTS");
    }

    #[test]
    fn test_provider_info_supports() {
        assert!(MULTI.supports(Capability::MultipleOutputs));
        assert!(!LIMITED.supports(Capability::ImageEditing));
        assert!(MULTI.has_model("m2"));
        assert!(!MULTI.has_model("m3"));
    }

    #[test]
    fn test_effective_count() {
        assert_eq!(MULTI.effective_count(Some(3)), 3);
        assert_eq!(MULTI.effective_count(None), 1);
        assert_eq!(MULTI.effective_count(Some(0)), 1);
        assert_eq!(LIMITED.effective_count(Some(3)), 1);
    }

    #[test]
    fn test_provider_info_serialization() {
        let json = serde_json::to_value(&MULTI).unwrap();
        assert_eq!(json["defaultModel"], "m1");
        assert_eq!(json["capabilities"][1], "MULTIPLE_OUTPUTS");
        assert_eq!(json["resolutions"][0], "1K");

        let limited = serde_json::to_value(&LIMITED).unwrap();
        assert_eq!(limited["resolutions"], serde_json::json!([]));
    }

    #[test]
    fn test_image_result_success_requires_images() {
        let ok = ImageResult::from_images(vec![GeneratedImage::new(vec![1], "image/png")]);
        assert!(ok.is_success());
        assert_eq!(ok.images().len(), 1);
        assert!(ok.error().is_none());

        let empty = ImageResult::from_images(vec![]);
        assert!(!empty.is_success());
        assert!(empty.images().is_empty());
        assert_eq!(empty.error(), Some("No image data in response"));
    }

    #[test]
    fn test_image_result_failure() {
        let failed = ImageResult::failure("HTTP 500");
        assert!(!failed.is_success());
        assert!(failed.images().is_empty());
        assert_eq!(failed.into_images(), Err("HTTP 500".to_string()));
    }

    #[test]
    fn test_into_edit_keeps_parameters() {
        let edit = GenerateInput::new("make it blue")
            .with_aspect_ratio("16:9")
            .with_resolution("2K")
            .into_edit("in.png");
        assert_eq!(edit.input.prompt, "make it blue");
        assert_eq!(edit.input.aspect_ratio.as_deref(), Some("16:9"));
        assert_eq!(edit.input_image, PathBuf::from("in.png"));
    }
}
