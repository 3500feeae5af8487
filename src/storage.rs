//! Image files on disk: reading edit inputs and writing generated outputs.

use crate::error::{ImgxError, Result};
use crate::image::{GeneratedImage, ImageFormat};
use std::path::{Path, PathBuf};

/// An input image loaded for an edit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputImage {
    /// Raw file bytes.
    pub data: Vec<u8>,
    /// Detected format.
    pub format: ImageFormat,
}

impl InputImage {
    /// MIME type of the image.
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// File name used when uploading the image (e.g., "image.jpg").
    pub fn upload_name(&self) -> String {
        format!("image.{}", self.format.extension())
    }
}

/// Reads an input image.
///
/// The format comes from the file extension, then from the magic bytes,
/// and defaults to PNG.
pub async fn read_input_image(path: &Path) -> Result<InputImage> {
    let data = tokio::fs::read(path).await?;
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageFormat::from_extension)
        .or_else(|| ImageFormat::from_magic_bytes(&data))
        .unwrap_or_default();
    tracing::debug!(path = %path.display(), bytes = data.len(), format = format.as_str(), "read input image");
    Ok(InputImage { data, format })
}

/// Default directory for generated images: `~/Pictures/imgx`.
pub fn default_output_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join("Pictures").join("imgx"))
        .ok_or_else(|| ImgxError::InvalidRequest("could not determine home directory".into()))
}

/// Path for image `index` (zero-based) out of `total` written to `path`.
///
/// A single image keeps `path` as is. Otherwise a 1-based suffix goes
/// before the extension: `out.png` becomes `out-1.png`, `out-2.png`, ...
pub fn disambiguate_output_path(path: &Path, index: usize, total: usize) -> PathBuf {
    if total <= 1 {
        return path.to_path_buf();
    }
    let n = index + 1;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{n}"),
    };
    path.with_file_name(name)
}

/// Random file name for an image: `imgx-<8 hex>.<ext>`.
pub fn generated_file_name(image: &GeneratedImage) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("imgx-{}.{}", &id[..8], image.extension())
}

/// Writes generated images to disk.
#[derive(Debug, Clone)]
pub struct ImageStore {
    output_dir: PathBuf,
}

impl ImageStore {
    /// Creates a store writing unnamed images into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Directory used for images without an explicit path.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Saves every image and returns the absolute paths, in order.
    ///
    /// With `output`, images are written there (disambiguated when there is
    /// more than one); otherwise each gets a random name in the output dir.
    pub async fn save_all(
        &self,
        images: &[GeneratedImage],
        output: Option<&Path>,
    ) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let target = match output {
                Some(path) => disambiguate_output_path(path, i, images.len()),
                None => self.output_dir.join(generated_file_name(image)),
            };
            paths.push(self.save(image, &target).await?);
        }
        Ok(paths)
    }

    async fn save(&self, image: &GeneratedImage, target: &Path) -> Result<PathBuf> {
        let target = std::path::absolute(target)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &image.data).await?;
        tracing::debug!(path = %target.display(), bytes = image.size(), "saved image");
        Ok(target)
    }
}
