//! Image transcoding under a byte ceiling
//!
//! Input images are decoded, flattened to opaque RGB and re-encoded as JPEG.
//! When the result is too large the quality is lowered step by step until it
//! fits or the floor is reached. Resolution is never changed.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::debug;

use crate::config::DeliveryConfig;
use crate::error::MediaError;
use crate::types::{EncodedImage, ImageMimeType};

/// Quality schedule for the JPEG encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeOptions {
    pub initial_quality: u8,
    pub quality_step: u8,
    pub min_quality: u8,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            initial_quality: 85,
            quality_step: 5,
            min_quality: 10,
        }
    }
}

impl From<&DeliveryConfig> for TranscodeOptions {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            initial_quality: config.initial_quality,
            quality_step: config.quality_step,
            min_quality: config.min_quality,
        }
    }
}

impl TranscodeOptions {
    /// Qualities to try, highest first, ending exactly at the floor
    fn qualities(&self) -> Vec<u8> {
        let floor = self.min_quality.max(1);
        let step = self.quality_step.max(1);
        let mut quality = self.initial_quality.clamp(floor, 100);

        let mut qualities = vec![quality];
        while quality > floor {
            quality = quality.saturating_sub(step).max(floor);
            qualities.push(quality);
        }
        qualities
    }
}

/// Re-encode `bytes` so the output is at most `size_limit` bytes
///
/// # Errors
///
/// `MediaError::Decode` when the input is not a readable image,
/// `MediaError::TooLarge` when even the lowest quality does not fit.
pub fn transcode(
    bytes: &[u8],
    size_limit: u64,
    options: &TranscodeOptions,
) -> Result<EncodedImage, MediaError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| MediaError::Decode(e.to_string()))?;
    let rgb = decoded.to_rgb8();

    let mut smallest = u64::MAX;
    for quality in options.qualities() {
        let encoded = encode_jpeg(&rgb, quality)?;
        let len = encoded.len() as u64;
        debug!(
            "Encoded {}x{} image at quality {}: {} bytes (limit {})",
            rgb.width(),
            rgb.height(),
            quality,
            len,
            size_limit
        );

        if len <= size_limit {
            return Ok(EncodedImage {
                bytes: encoded,
                mime_type: ImageMimeType::Jpeg,
                quality,
            });
        }
        smallest = smallest.min(len);
    }

    Err(MediaError::TooLarge {
        limit: size_limit,
        smallest,
    })
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, MediaError> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|e| MediaError::Encode(e.to_string()))?;
    Ok(buffer)
}
