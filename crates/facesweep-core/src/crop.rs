//! Face thumbnail cropping.
//!
//! Scales a relative bounding box to pixels, pads it by a fixed margin,
//! clamps to the image, crops and encodes JPEG under a byte ceiling.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

use crate::types::RelativeBox;

// --- Named constants ---
const CROP_MARGIN_PX: u32 = 25;
const MAX_THUMBNAIL_BYTES: usize = 5 * 1024 * 1024;
const FALLBACK_EDGE_PX: u32 = 1024;

pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Error, Debug)]
pub enum CropError {
    #[error("failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode thumbnail: {0}")]
    Encode(#[source] image::ImageError),
    #[error("crop region is empty ({rect:?} in {width}x{height} image)")]
    EmptyRegion { rect: CropRect, width: u32, height: u32 },
    #[error("thumbnail is {size} bytes after downsampling, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Padding and size policy for generated thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailLimits {
    /// Pixels added on every side of the detected box.
    pub margin: u32,
    /// Encoded size ceiling in bytes.
    pub max_bytes: usize,
    /// Bounding square used when the first encode exceeds `max_bytes`.
    pub fallback_edge: u32,
}

impl Default for ThumbnailLimits {
    fn default() -> Self {
        Self {
            margin: CROP_MARGIN_PX,
            max_bytes: MAX_THUMBNAIL_BYTES,
            fallback_edge: FALLBACK_EDGE_PX,
        }
    }
}

/// Absolute pixel rectangle, `left..right` x `top..bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRect {
    /// Scale `bbox` to a `width`x`height` image and pad by `margin`.
    ///
    /// Scaled edges truncate toward zero. The result always satisfies
    /// `0 <= left <= right <= width` and `0 <= top <= bottom <= height`,
    /// whatever the box holds (negative, oversized, NaN).
    pub fn expand(bbox: &RelativeBox, width: u32, height: u32, margin: u32) -> Self {
        let w = i64::from(width);
        let h = i64::from(height);
        let m = i64::from(margin);
        // `as` saturates and maps NaN to 0
        let scale = |fraction: f64, extent: i64| (fraction * extent as f64) as i64;

        let left = scale(bbox.left, w).saturating_sub(m).clamp(0, w);
        let top = scale(bbox.top, h).saturating_sub(m).clamp(0, h);
        let right = scale(bbox.left + bbox.width, w).saturating_add(m).clamp(left, w);
        let bottom = scale(bbox.top + bbox.height, h).saturating_add(m).clamp(top, h);

        // All four lie in [0, u32::MAX] after clamping.
        Self {
            left: left as u32,
            top: top as u32,
            right: right as u32,
            bottom: bottom as u32,
        }
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Crop the face described by `bbox` out of encoded `image` bytes and
/// return a JPEG under the default limits.
pub fn crop_face(image: &[u8], bbox: &RelativeBox) -> Result<Vec<u8>, CropError> {
    crop_face_with(image, bbox, &ThumbnailLimits::default())
}

/// [`crop_face`] with explicit limits.
pub fn crop_face_with(
    image: &[u8],
    bbox: &RelativeBox,
    limits: &ThumbnailLimits,
) -> Result<Vec<u8>, CropError> {
    let img = image::load_from_memory(image).map_err(CropError::Decode)?;
    let rect = CropRect::expand(bbox, img.width(), img.height(), limits.margin);
    if rect.is_empty() {
        return Err(CropError::EmptyRegion {
            rect,
            width: img.width(),
            height: img.height(),
        });
    }

    tracing::debug!(
        width = img.width(),
        height = img.height(),
        ?rect,
        "cropping thumbnail"
    );

    let cropped = img.crop_imm(rect.left, rect.top, rect.width(), rect.height());
    encode_within(&cropped, limits)
}

/// Encode as JPEG; if too large, downsample into the fallback square and retry once.
pub fn encode_within(img: &DynamicImage, limits: &ThumbnailLimits) -> Result<Vec<u8>, CropError> {
    let encoded = encode_jpeg(img)?;
    if encoded.len() <= limits.max_bytes {
        return Ok(encoded);
    }

    tracing::info!(
        size = encoded.len(),
        limit = limits.max_bytes,
        edge = limits.fallback_edge,
        "thumbnail over size limit, downsampling"
    );

    let encoded = encode_jpeg(&downsample(img, limits.fallback_edge))?;
    if encoded.len() > limits.max_bytes {
        return Err(CropError::TooLarge {
            size: encoded.len(),
            limit: limits.max_bytes,
        });
    }
    Ok(encoded)
}

/// Shrink to fit within `edge`x`edge`, keeping aspect ratio. Never enlarges.
fn downsample(img: &DynamicImage, edge: u32) -> DynamicImage {
    if img.width() <= edge && img.height() <= edge {
        return img.clone();
    }
    img.resize(edge, edge, FilterType::Lanczos3)
}

fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, CropError> {
    // JPEG has no alpha channel
    let rgb = match img {
        DynamicImage::ImageRgb8(_) => img.clone(),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };
    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(CropError::Encode)?;
    Ok(buf.into_inner())
}
