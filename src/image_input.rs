//! Image normalization: turn a path or an already-decoded image into the
//! canonical 8-bit RGB raster the scorers consume.

use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};

use crate::error::{EvalError, Result};

/// Either a file to decode or an image already in memory.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Path(PathBuf),
    Decoded(DynamicImage),
}

impl ImageInput {
    /// Interpret an untyped value: strings are paths, anything else is
    /// rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(path) => Ok(ImageInput::Path(PathBuf::from(path))),
            other => Err(EvalError::InvalidInput(format!(
                "expected an image path string, got {}",
                json_kind(other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

impl From<&str> for ImageInput {
    fn from(path: &str) -> Self {
        ImageInput::Path(PathBuf::from(path))
    }
}

impl From<String> for ImageInput {
    fn from(path: String) -> Self {
        ImageInput::Path(PathBuf::from(path))
    }
}

impl From<&Path> for ImageInput {
    fn from(path: &Path) -> Self {
        ImageInput::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        ImageInput::Path(path)
    }
}

impl From<DynamicImage> for ImageInput {
    fn from(img: DynamicImage) -> Self {
        ImageInput::Decoded(img)
    }
}

impl From<RgbImage> for ImageInput {
    fn from(img: RgbImage) -> Self {
        ImageInput::Decoded(DynamicImage::ImageRgb8(img))
    }
}

/// Canonical decoded image: 8-bit RGB, no alpha.
///
/// Never mutated once built, so both scorers may read it concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    rgb: RgbImage,
}

impl Image {
    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.rgb
    }

    pub fn into_rgb(self) -> RgbImage {
        self.rgb
    }
}

/// Normalize any supported input into an [`Image`].
pub fn normalize(input: impl Into<ImageInput>) -> Result<Image> {
    match input.into() {
        ImageInput::Path(path) => load_path(&path),
        ImageInput::Decoded(img) => from_decoded(img),
    }
}

fn load_path(path: &Path) -> Result<Image> {
    if path.as_os_str().is_empty() {
        return Err(EvalError::InvalidInput("image path is empty".to_string()));
    }

    let metadata = std::fs::metadata(path)
        .map_err(|e| EvalError::not_found(path, e.to_string()))?;
    if !metadata.is_file() {
        return Err(EvalError::not_found(path, "not a regular file"));
    }

    let img = image::ImageReader::open(path)
        .map_err(|e| EvalError::not_found(path, e.to_string()))?
        .with_guessed_format()
        .map_err(|e| EvalError::not_found(path, e.to_string()))?
        .decode()
        .map_err(|e| EvalError::not_found(path, format!("not a decodable image: {}", e)))?;

    tracing::debug!(path = ?path, width = img.width(), height = img.height(), "Decoded image");
    from_decoded(img)
}

fn from_decoded(img: DynamicImage) -> Result<Image> {
    if img.width() == 0 || img.height() == 0 {
        return Err(EvalError::InvalidInput(format!(
            "image has zero area ({}x{})",
            img.width(),
            img.height()
        )));
    }

    let rgb = match img {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    };

    Ok(Image { rgb })
}
