//! Viewport rasterization and device-pixel cropping
//!
//! A [`Rasterizer`] produces a PNG of the visible viewport; [`CaptureService`]
//! validates a [`CaptureRequest`] against it and crops to exactly the requested
//! size.

use crate::error::CaptureError;
use crate::geometry::CaptureRequest;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;

static DATA_URL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:image/[\w.+-]+;base64,").expect("valid regex"));

/// Source of full-viewport screenshots
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Capture the visible viewport as an encoded image (PNG)
    async fn capture_viewport(&self) -> Result<Vec<u8>, CaptureError>;
}

/// A PNG with its pixel dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    /// Render as `data:image/png;base64,...`
    pub fn to_data_url(&self) -> String {
        encode_data_url(&self.bytes)
    }

    /// Parse a data URL (or bare base64) into an image, reading its dimensions
    pub fn from_data_url(data_url: &str) -> Result<Self, CaptureError> {
        let bytes = decode_data_url(data_url)?;
        let image = image::load_from_memory(&bytes).map_err(|e| CaptureError::Decode(e.to_string()))?;
        let (width, height) = image.dimensions();
        Ok(Self { bytes, width, height })
    }
}

pub fn encode_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Strip an optional `data:image/...;base64,` prefix and decode the payload
pub fn decode_data_url(data: &str) -> Result<Vec<u8>, CaptureError> {
    let payload = DATA_URL_PREFIX.replace(data.trim(), "");
    STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| CaptureError::Decode(format!("invalid base64 image data: {}", e)))
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, CaptureError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Crop an encoded bitmap to `request`, which must lie entirely inside it
pub fn crop_png(bitmap: &[u8], request: &CaptureRequest) -> Result<EncodedImage, CaptureError> {
    let image = image::load_from_memory(bitmap).map_err(|e| CaptureError::Decode(e.to_string()))?;
    let (bitmap_width, bitmap_height) = image.dimensions();

    if !request.fits_within(bitmap_width, bitmap_height) {
        return Err(CaptureError::OutOfBounds {
            x: request.x,
            y: request.y,
            width: request.width,
            height: request.height,
            bitmap_width,
            bitmap_height,
        });
    }

    let cropped = image.crop_imm(request.x, request.y, request.width, request.height);
    let bytes = encode_png(&cropped)?;
    Ok(EncodedImage { bytes, width: request.width, height: request.height })
}

/// Rasterize and crop on behalf of the page
pub struct CaptureService<R: Rasterizer> {
    rasterizer: R,
    min_size: u32,
}

impl<R: Rasterizer> CaptureService<R> {
    pub fn new(rasterizer: R) -> Self {
        Self { rasterizer, min_size: 1 }
    }

    /// Reject requests with a side below `min_size` device pixels (at least 1)
    pub fn min_size(mut self, min_size: u32) -> Self {
        self.min_size = min_size.max(1);
        self
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    pub async fn capture(&self, request: CaptureRequest) -> Result<EncodedImage, CaptureError> {
        if request.width < self.min_size || request.height < self.min_size {
            return Err(CaptureError::TooSmall { width: request.width, height: request.height, min: self.min_size });
        }

        let bitmap = self.rasterizer.capture_viewport().await?;
        debug!("Rasterized viewport ({} bytes)", bitmap.len());

        let cropped = tokio::task::spawn_blocking(move || crop_png(&bitmap, &request))
            .await
            .map_err(|e| CaptureError::Encode(format!("crop task failed: {}", e)))??;

        info!(
            "Captured {}x{} region at ({}, {})",
            cropped.width, cropped.height, request.x, request.y
        );
        Ok(cropped)
    }
}
