//! Reference conversion capability backed by the `image` crate.
//!
//! Decodes the input, optionally fits it within a bounding box, and
//! re-encodes in the requested format. The CPU-bound work runs on the
//! blocking thread pool so the async runtime's workers never stall; the
//! call races against the cancellation token and surfaces a fired token
//! as [`ConvertError::Cancelled`].

use super::types::{ConvertError, ConvertOptions, ImageFormat};
use super::worker::ImageConverter;
use bytes::Bytes;
use std::io::Cursor;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Converter that decodes and re-encodes with the `image` crate.
#[derive(Debug, Default)]
pub struct CodecConverter;

impl CodecConverter {
    pub fn new() -> Self {
        Self
    }
}

impl ImageConverter for CodecConverter {
    async fn convert(
        &self,
        input: Bytes,
        options: &ConvertOptions,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ConvertError> {
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        let options = options.clone();
        let handle = tokio::task::spawn_blocking(move || encode_image(&input, &options));

        tokio::select! {
            result = handle => match result {
                Ok(converted) => converted,
                Err(e) => Err(ConvertError::Worker(format!("conversion task panicked: {}", e))),
            },
            _ = cancel.cancelled() => Err(ConvertError::Cancelled),
        }
    }

    fn name(&self) -> &str {
        "codec"
    }
}

/// Decode, resize, re-encode. Runs on the blocking pool.
fn encode_image(input: &[u8], options: &ConvertOptions) -> Result<Bytes, ConvertError> {
    let decoded =
        image::load_from_memory(input).map_err(|e| ConvertError::InvalidInput(e.to_string()))?;

    let image = match options.max_dimensions {
        Some((width, height)) => decoded.thumbnail(width, height),
        None => decoded,
    };

    trace!(
        format = %options.format,
        quality = options.quality,
        width = image.width(),
        height = image.height(),
        "encoding image"
    );

    let mut output = Cursor::new(Vec::new());
    match options.format {
        ImageFormat::Jpeg => {
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                &mut output,
                options.quality.clamp(1, 100),
            );
            // JPEG has no alpha channel.
            image
                .to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|e| ConvertError::Worker(e.to_string()))?;
        }
        other => {
            image
                .write_to(&mut output, to_image_format(other))
                .map_err(|e| ConvertError::Worker(e.to_string()))?;
        }
    }

    Ok(Bytes::from(output.into_inner()))
}

fn to_image_format(format: ImageFormat) -> image::ImageFormat {
    match format {
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::WebP => image::ImageFormat::WebP,
        ImageFormat::Gif => image::ImageFormat::Gif,
        ImageFormat::Bmp => image::ImageFormat::Bmp,
    }
}
