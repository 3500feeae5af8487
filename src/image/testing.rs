//! In-memory provider used by unit tests.

use crate::error::{ImgxError, Result};
use crate::image::provider::{ImageEditor, ImageProvider};
use crate::image::types::{
    Capability, EditInput, GenerateInput, GeneratedImage, ImageResult, ProviderInfo,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;

pub(crate) const EDIT_INFO: ProviderInfo = ProviderInfo {
    name: "stub-edit",
    models: &["stub-1", "stub-2"],
    default_model: "stub-1",
    capabilities: &[
        Capability::TextToImage,
        Capability::ImageEditing,
        Capability::MultipleOutputs,
    ],
    aspect_ratios: &["1:1", "16:9"],
    resolutions: Some(&["1K"]),
};

pub(crate) const TEXT_ONLY_INFO: ProviderInfo = ProviderInfo {
    name: "stub-text",
    models: &["text-1"],
    default_model: "text-1",
    capabilities: &[Capability::TextToImage],
    aspect_ratios: &["1:1"],
    resolutions: None,
};

/// What the stub answers with.
#[derive(Debug, Clone)]
pub(crate) enum StubOutcome {
    /// Succeeds with this many PNG images.
    Images(usize),
    /// Returns a failed result with this message.
    Failure(String),
    /// Fails as if the network call broke.
    Transport,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StubCall {
    pub prompt: String,
    pub model: Option<String>,
    pub count: Option<u32>,
    pub aspect_ratio: Option<String>,
    pub input_image: Option<PathBuf>,
}

pub(crate) struct StubProvider {
    info: &'static ProviderInfo,
    outcome: StubOutcome,
    with_editor: bool,
    calls: Mutex<Vec<StubCall>>,
}

impl StubProvider {
    pub fn new(info: &'static ProviderInfo) -> Self {
        Self {
            info,
            outcome: StubOutcome::Images(1),
            with_editor: info.supports(Capability::ImageEditing),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_outcome(mut self, outcome: StubOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn without_editor(mut self) -> Self {
        self.with_editor = false;
        self
    }

    pub fn calls(&self) -> Vec<StubCall> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, input: &GenerateInput, model: Option<&str>, image: Option<PathBuf>) -> Result<ImageResult> {
        self.calls.lock().unwrap().push(StubCall {
            prompt: input.prompt.clone(),
            model: model.map(str::to_string),
            count: input.count,
            aspect_ratio: input.aspect_ratio.clone(),
            input_image: image,
        });

        match &self.outcome {
            StubOutcome::Images(n) => Ok(ImageResult::from_images(
                (0..*n)
                    .map(|i| GeneratedImage::new(format!("image-{i}").into_bytes(), "image/png"))
                    .collect(),
            )),
            StubOutcome::Failure(msg) => Ok(ImageResult::failure(msg.clone())),
            StubOutcome::Transport => Err(ImgxError::Decode("connection reset".into())),
        }
    }
}

#[async_trait]
impl ImageProvider for StubProvider {
    fn info(&self) -> &ProviderInfo {
        self.info
    }

    async fn generate(&self, input: &GenerateInput, model: Option<&str>) -> Result<ImageResult> {
        self.respond(input, model, None)
    }

    fn editor(&self) -> Option<&dyn ImageEditor> {
        if self.with_editor {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl ImageEditor for StubProvider {
    async fn edit(&self, input: &EditInput, model: Option<&str>) -> Result<ImageResult> {
        self.respond(&input.input, model, Some(input.input_image.clone()))
    }
}
