//! Selection geometry and the CSS-pixel to device-pixel transform

use serde::{Deserialize, Serialize};

/// A pointer position in CSS pixels, relative to the viewport
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rectangle being dragged out by the user, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectionRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SelectionRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Build the rectangle spanned by two drag corners, in any drag direction
    pub fn from_corners(start: Point, current: Point) -> Self {
        Self {
            x: start.x.min(current.x),
            y: start.y.min(current.y),
            width: (current.x - start.x).abs(),
            height: (current.y - start.y).abs(),
        }
    }

    /// Zero-sized rectangle anchored at `at`
    pub fn empty_at(at: Point) -> Self {
        Self::from_corners(at, at)
    }

    /// Both sides reach `min` CSS pixels
    pub fn meets_minimum(&self, min: f64) -> bool {
        self.width >= min && self.height >= min
    }
}

/// Page scroll offset in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub x: f64,
    pub y: f64,
}

impl ScrollOffset {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// What the privileged side rasterizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureTarget {
    /// Only the visible viewport; its origin is the viewport origin
    #[default]
    Viewport,
    /// The whole document; its origin is the document origin
    Document,
}

impl CaptureTarget {
    /// Offset between the captured bitmap's origin and the viewport origin
    pub fn origin_offset(&self, page_scroll: ScrollOffset) -> ScrollOffset {
        match self {
            CaptureTarget::Viewport => ScrollOffset::default(),
            CaptureTarget::Document => page_scroll,
        }
    }
}

/// Viewport metrics reported by the page
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportMetrics {
    pub scroll: ScrollOffset,
    pub device_pixel_ratio: f64,
}

impl Default for ViewportMetrics {
    fn default() -> Self {
        Self { scroll: ScrollOffset::default(), device_pixel_ratio: 1.0 }
    }
}

/// Crop bounds in device pixels, as sent across the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRequest {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Whether the rectangle lies entirely inside a `width` x `height` bitmap
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }
}

/// Round-half-up on non-negative values, clamped into `u32`
fn round_device(value: f64) -> u32 {
    let rounded = (value.max(0.0) + 0.5).floor();
    if rounded >= u32::MAX as f64 { u32::MAX } else { rounded as u32 }
}

/// Convert a CSS-pixel selection into device-pixel capture bounds.
///
/// `scroll` is the offset between the capture bitmap's origin and the viewport
/// origin (see [`CaptureTarget::origin_offset`]); `scale` is the device pixel ratio.
pub fn to_device_pixels(rect: &SelectionRect, scroll: ScrollOffset, scale: f64) -> CaptureRequest {
    CaptureRequest {
        x: round_device((rect.x + scroll.x) * scale),
        y: round_device((rect.y + scroll.y) * scale),
        width: round_device(rect.width * scale),
        height: round_device(rect.height * scale),
    }
}
