//! Image normalization applied before a blob is written

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ExtendedColorType;

use crate::Result;

/// Size and quality bounds for stored images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOptions {
    /// Longest edge after resizing
    pub max_dimension: u32,
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            max_dimension: 2048,
            jpeg_quality: 70,
        }
    }
}

/// Decode any supported image, shrink it to fit `max_dimension` keeping the
/// aspect ratio, and re-encode as JPEG.
pub fn normalize(bytes: &[u8], options: &ImageOptions) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;

    let max = options.max_dimension.max(1);
    let img = if img.width() > max || img.height() > max {
        img.resize(max, max, FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, options.jpeg_quality.clamp(1, 100));
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;

    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_large_image_is_shrunk_keeping_aspect() {
        let options = ImageOptions {
            max_dimension: 100,
            jpeg_quality: 70,
        };
        let out = normalize(&png(400, 200), &options).unwrap();

        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.width(), 100);
        assert_eq!(decoded.height(), 50);
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_small_image_keeps_size() {
        let out = normalize(&png(30, 20), &ImageOptions::default()).unwrap();

        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 20));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(normalize(b"definitely not an image", &ImageOptions::default()).is_err());
    }
}
