//! Core types for the conversion layer.

use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Supported output image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
    Gif,
    Bmp,
}

impl ImageFormat {
    /// Canonical short name, used in cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::WebP => "webp",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
        }
    }

    /// File extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            other => other.as_str(),
        }
    }

    /// Parses a format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "webp" => Some(ImageFormat::WebP),
            "gif" => Some(ImageFormat::Gif),
            "bmp" => Some(ImageFormat::Bmp),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-image output format selection.
///
/// `Keep` is the "use the image's current format" policy applied when a
/// bulk conversion mixes formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetFormat {
    /// Convert to the image's current format.
    Keep,
    /// Convert to a specific format.
    Format(ImageFormat),
}

impl TargetFormat {
    /// Resolves the concrete output format for an image currently in
    /// `current` format.
    pub fn resolve(&self, current: ImageFormat) -> ImageFormat {
        match self {
            TargetFormat::Keep => current,
            TargetFormat::Format(format) => *format,
        }
    }
}

/// Options for a single conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Output format.
    pub format: ImageFormat,
    /// Encoding quality, 0-100.
    pub quality: u8,
    /// Fit the output within `(width, height)` if set.
    pub max_dimensions: Option<(u32, u32)>,
}

impl ConvertOptions {
    pub fn new(format: ImageFormat) -> Self {
        Self {
            format,
            quality: DEFAULT_QUALITY,
            max_dimensions: None,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(100);
        self
    }

    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_dimensions = Some((width, height));
        self
    }
}

/// Default encoding quality.
pub const DEFAULT_QUALITY: u8 = 90;

/// A named file payload, as persisted in the stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Display filename.
    pub name: String,
    /// Image format of `bytes`.
    pub format: ImageFormat,
    /// Raw encoded image data.
    pub bytes: Vec<u8>,
}

/// Conversion-related errors.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The conversion worker failed; eligible for retry.
    #[error("conversion worker failed: {0}")]
    Worker(String),

    /// The input could not be decoded as an image.
    #[error("invalid input image: {0}")]
    InvalidInput(String),

    /// The operation was cancelled; never retried.
    #[error("conversion cancelled")]
    Cancelled,

    /// The image has not finished staging (preview or original missing).
    #[error("image {0} is not ready for conversion")]
    NotReady(String),

    /// No image with this id exists.
    #[error("unknown image id {0}")]
    UnknownImage(String),

    /// Invalid pipeline configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ConvertError {
    /// Whether this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConvertError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_extension_round_trip() {
        for format in [
            ImageFormat::Png,
            ImageFormat::Jpeg,
            ImageFormat::WebP,
            ImageFormat::Gif,
            ImageFormat::Bmp,
        ] {
            assert_eq!(ImageFormat::from_extension(format.extension()), Some(format));
        }
        assert_eq!(ImageFormat::from_extension("JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("tiff"), None);
    }

    #[test]
    fn target_format_resolution() {
        assert_eq!(TargetFormat::Keep.resolve(ImageFormat::Png), ImageFormat::Png);
        assert_eq!(
            TargetFormat::Format(ImageFormat::WebP).resolve(ImageFormat::Png),
            ImageFormat::WebP
        );
    }

    #[test]
    fn quality_is_clamped() {
        let options = ConvertOptions::new(ImageFormat::Jpeg).with_quality(200);
        assert_eq!(options.quality, 100);
    }

    #[test]
    fn cancelled_is_recognized() {
        assert!(ConvertError::Cancelled.is_cancelled());
        assert!(!ConvertError::Worker("x".to_string()).is_cancelled());
    }
}
