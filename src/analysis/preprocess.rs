use crate::capture::encode_png;
use crate::error::CaptureError;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use log::{debug, warn};

/// Longest side handed to OCR
pub const MAX_OCR_DIMENSION: u32 = 2000;

// roughly +10% of the 8-bit range
const BRIGHTEN: i32 = 12;
const CONTRAST: f32 = 30.0;
const UNSHARP_SIGMA: f32 = 1.2;
const UNSHARP_THRESHOLD: i32 = 3;

/// Normalize a screenshot for text detection: fit within [`MAX_OCR_DIMENSION`]
/// without enlarging, grayscale, equalize, brighten, boost contrast and sharpen.
pub fn preprocess(bytes: &[u8]) -> Result<Vec<u8>, CaptureError> {
    let mut image = image::load_from_memory(bytes).map_err(|e| CaptureError::Decode(e.to_string()))?;

    let (width, height) = image.dimensions();
    if width > MAX_OCR_DIMENSION || height > MAX_OCR_DIMENSION {
        image = image.resize(MAX_OCR_DIMENSION, MAX_OCR_DIMENSION, FilterType::Lanczos3);
        debug!("Resized {}x{} to {}x{} for OCR", width, height, image.width(), image.height());
    }

    let gray = image.to_luma8();
    let equalized = imageproc::contrast::equalize_histogram(&gray);
    let brightened = imageops::brighten(&equalized, BRIGHTEN);
    let contrasted = imageops::contrast(&brightened, CONTRAST);
    let sharpened = imageops::unsharpen(&contrasted, UNSHARP_SIGMA, UNSHARP_THRESHOLD);

    encode_png(&DynamicImage::ImageLuma8(sharpened))
}

/// [`preprocess`], falling back to the untouched bytes when the image cannot be processed
pub fn prepare_for_ocr(bytes: &[u8]) -> Vec<u8> {
    match preprocess(bytes) {
        Ok(processed) => processed,
        Err(e) => {
            warn!("Image preprocessing failed, using original image: {}", e);
            bytes.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        encode_png(&DynamicImage::ImageRgb8(image)).unwrap()
    }

    #[test]
    fn test_large_images_are_shrunk_to_fit() {
        let processed = preprocess(&gradient(3000, 1000)).unwrap();
        let image = image::load_from_memory(&processed).unwrap();
        assert_eq!(image.width(), 2000);
        assert!(image.height() <= 667 && image.height() >= 666);
    }

    #[test]
    fn test_small_images_keep_their_size() {
        let processed = preprocess(&gradient(120, 80)).unwrap();
        let image = image::load_from_memory(&processed).unwrap();
        assert_eq!(image.dimensions(), (120, 80));
        assert_eq!(image.color(), ColorType::L8);
    }

    #[test]
    fn test_unreadable_input_falls_back_to_original() {
        let garbage = b"definitely not an image".to_vec();
        assert!(preprocess(&garbage).is_err());
        assert_eq!(prepare_for_ocr(&garbage), garbage);
    }
}
