//! Generate and edit orchestration shared by the CLI and the MCP server.
//!
//! Each invocation resolves configuration, picks the provider, calls it,
//! writes the images and records them as the last output.

use crate::config::{ConfigOverrides, ConfigResolver, LastOutputStore, ResolvedConfig, ValueSource};
use crate::error::{ImgxError, Result};
use crate::image::{
    Capability, GenerateInput, ImageFormat, ImageProvider, ImageResult, ProviderInfo,
    ProviderRegistry,
};
use crate::storage::{default_output_dir, ImageStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Provider used when none is configured.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Parameters of a generate or edit invocation.
///
/// Unset fields fall back to the resolved configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageRequest {
    /// Text prompt.
    pub prompt: String,
    /// Exact output path. Disambiguated when several images come back.
    pub output: Option<PathBuf>,
    /// Directory for images without an explicit path.
    pub output_dir: Option<PathBuf>,
    /// Aspect ratio token.
    pub aspect_ratio: Option<String>,
    /// Resolution label.
    pub resolution: Option<String>,
    /// Number of images.
    pub count: Option<u32>,
    /// Model identifier, passed to the provider as is.
    pub model: Option<String>,
    /// Provider name.
    pub provider: Option<String>,
    /// Output format.
    pub output_format: Option<ImageFormat>,
}

impl ImageRequest {
    /// Creates a request with only a prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            provider: self.provider.clone(),
            model: self.model.clone(),
            output_dir: self
                .output_dir
                .as_ref()
                .map(|d| d.to_string_lossy().into_owned()),
            aspect_ratio: self.aspect_ratio.clone(),
            resolution: self.resolution.clone(),
        }
    }
}

/// Where the image to edit comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// An explicit file.
    Path(PathBuf),
    /// The first file of the last recorded output.
    LastOutput,
}

/// Result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    /// Provider that produced the images.
    pub provider: String,
    /// Model that was requested.
    pub model: String,
    /// Written files, in order.
    pub file_paths: Vec<PathBuf>,
    /// Input image of an edit taken from the last output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_used: Option<PathBuf>,
}

/// Runs generate and edit invocations against a provider registry.
#[derive(Debug)]
pub struct Orchestrator {
    resolver: ConfigResolver,
    registry: ProviderRegistry,
    last_output: LastOutputStore,
}

impl Orchestrator {
    /// Creates an orchestrator. The last-output record lives in the resolver's config dir.
    pub fn new(resolver: ConfigResolver, registry: ProviderRegistry) -> Self {
        let last_output = LastOutputStore::new(resolver.paths().last_output_file());
        Self {
            resolver,
            registry,
            last_output,
        }
    }

    /// Builds the resolver from the process environment and registers every
    /// built-in provider that has an API key.
    pub fn from_env() -> Result<Self> {
        let resolver = ConfigResolver::from_env()?;
        let registry = ProviderRegistry::from_resolver(&resolver);
        Ok(Self::new(resolver, registry))
    }

    /// Returns the config resolver.
    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Returns the provider registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Returns the last-output store.
    pub fn last_output(&self) -> &LastOutputStore {
        &self.last_output
    }

    /// Resolves a provider: `requested`, then configuration, then [`DEFAULT_PROVIDER`].
    pub fn provider(&self, requested: Option<&str>) -> Result<Arc<dyn ImageProvider>> {
        let overrides = ConfigOverrides {
            provider: requested.map(str::to_string),
            ..ConfigOverrides::default()
        };
        let resolved = self.resolver.resolve_with(&overrides);
        self.lookup(&resolved)
    }

    fn lookup(&self, resolved: &ResolvedConfig) -> Result<Arc<dyn ImageProvider>> {
        let name = resolved.provider.as_deref().unwrap_or(DEFAULT_PROVIDER);
        self.registry
            .get(name)
            .ok_or_else(|| ImgxError::ProviderNotAvailable {
                name: name.to_string(),
                available: self.registry.names(),
            })
    }

    /// Generates images from a prompt.
    pub async fn generate(&self, request: &ImageRequest) -> Result<Outcome> {
        validate_prompt(&request.prompt)?;

        let resolved = self.resolver.resolve_with(&request.overrides());
        let provider = self.lookup(&resolved)?;
        let model = select_model(provider.info(), &resolved);
        let input = build_input(request, &resolved);

        tracing::debug!(provider = provider.name(), model = %model, "generating");
        let result = provider
            .generate(&input, Some(&model))
            .await
            .map_err(into_generation_error)?;

        let file_paths = self.persist(result, request, &resolved).await?;
        Ok(Outcome {
            provider: provider.name().to_string(),
            model,
            file_paths,
            input_used: None,
        })
    }

    /// Edits an image according to a prompt.
    pub async fn edit(&self, request: &ImageRequest, source: InputSource) -> Result<Outcome> {
        validate_prompt(&request.prompt)?;

        let (input_image, from_last) = match source {
            InputSource::Path(path) => (path, false),
            InputSource::LastOutput => {
                let path = self
                    .last_output
                    .load()
                    .and_then(|record| record.first().map(Path::to_path_buf))
                    .ok_or_else(|| {
                        ImgxError::InvalidRequest(
                            "No previous output found. Run generate or edit first.".into(),
                        )
                    })?;
                (path, true)
            }
        };
        if !input_image.is_file() {
            return Err(ImgxError::InvalidRequest(format!(
                "Input image not found: {}",
                input_image.display()
            )));
        }

        let resolved = self.resolver.resolve_with(&request.overrides());
        let provider = self.lookup(&resolved)?;
        let editor = provider
            .supports(Capability::ImageEditing)
            .then(|| provider.editor())
            .flatten()
            .ok_or_else(|| ImgxError::UnsupportedCapability {
                provider: provider.name().to_string(),
                capability: Capability::ImageEditing,
                supported: self
                    .registry
                    .find_with_capability(Capability::ImageEditing)
                    .iter()
                    .filter(|p| p.editor().is_some())
                    .map(|p| p.name().to_string())
                    .collect(),
            })?;
        let model = select_model(provider.info(), &resolved);
        let input = build_input(request, &resolved).into_edit(&input_image);

        tracing::debug!(provider = provider.name(), model = %model, input = %input_image.display(), "editing");
        let result = editor
            .edit(&input, Some(&model))
            .await
            .map_err(into_generation_error)?;

        let file_paths = self.persist(result, request, &resolved).await?;
        Ok(Outcome {
            provider: provider.name().to_string(),
            model,
            file_paths,
            input_used: from_last.then_some(input_image),
        })
    }

    async fn persist(
        &self,
        result: ImageResult,
        request: &ImageRequest,
        resolved: &ResolvedConfig,
    ) -> Result<Vec<PathBuf>> {
        let images = result.into_images().map_err(ImgxError::Generation)?;

        let output_dir = match &resolved.output_dir {
            Some(dir) => dir.clone(),
            None => default_output_dir()?,
        };
        let paths = ImageStore::new(output_dir)
            .save_all(&images, request.output.as_deref())
            .await?;
        self.last_output.save(&paths)?;
        Ok(paths)
    }
}

fn validate_prompt(prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(ImgxError::InvalidRequest("prompt is required".into()));
    }
    Ok(())
}

fn build_input(request: &ImageRequest, resolved: &ResolvedConfig) -> GenerateInput {
    GenerateInput {
        prompt: request.prompt.clone(),
        aspect_ratio: resolved.aspect_ratio.clone(),
        count: request.count,
        resolution: resolved.resolution.clone(),
        output_format: request.output_format,
    }
}

/// Picks the model to request.
///
/// Models from a flag, the environment or the project file are passed
/// through. A user-config model the provider does not list is left over
/// from another provider and gives way to the provider default.
fn select_model(info: &ProviderInfo, resolved: &ResolvedConfig) -> String {
    match (&resolved.model, resolved.model_source) {
        (Some(model), Some(ValueSource::User)) if !info.has_model(model) => {
            tracing::warn!(
                provider = info.name,
                model = %model,
                "user config model is not offered by the provider; using {}",
                info.default_model
            );
            info.default_model.to_string()
        }
        (Some(model), _) => model.clone(),
        (None, _) => info.default_model.to_string(),
    }
}

fn into_generation_error(err: ImgxError) -> ImgxError {
    if err.is_transport() {
        ImgxError::Generation(err.to_string())
    } else {
        err
    }
}
