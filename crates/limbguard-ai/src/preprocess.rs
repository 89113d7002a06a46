//! Image decoding and ViT input preparation.
//!
//! Mirrors the training transform: RGB, bilinear resize to 224×224, scale to
//! `[0, 1]`, normalize with ImageNet statistics, CHW layout.

use image::DynamicImage;
use image::imageops::FilterType;

use crate::ClassifyError;

pub const IMAGE_SIZE: u32 = 224;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalized image tensor in `[3, size, size]` channel-major order.
#[derive(Debug, Clone)]
pub struct PixelTensor {
    pub data: Vec<f32>,
    pub size: u32,
}

impl PixelTensor {
    /// Batched ONNX input shape `[1, 3, size, size]`.
    pub fn shape(&self) -> [i64; 4] {
        [1, 3, self.size as i64, self.size as i64]
    }
}

/// Decode uploaded bytes, rejecting anything that is not a supported image.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ClassifyError> {
    if bytes.is_empty() {
        return Err(ClassifyError::InvalidInput("empty upload".into()));
    }
    image::load_from_memory(bytes).map_err(|e| ClassifyError::InvalidInput(e.to_string()))
}

/// Resize and normalize a decoded image.
pub fn to_pixel_tensor(image: &DynamicImage, size: u32) -> PixelTensor {
    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(&rgb, size, size, FilterType::Triangle);

    let plane = (size * size) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            let v = pixel.0[c] as f32 / 255.0;
            data[c * plane + i] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    PixelTensor { data, size }
}

/// Decode and prepare an upload for the classifier.
pub fn preprocess(bytes: &[u8], size: u32) -> Result<PixelTensor, ClassifyError> {
    let image = decode(bytes)?;
    Ok(to_pixel_tensor(&image, size))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Encode a solid-color PNG.
    pub(crate) fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn tensor_has_chw_shape() {
        let tensor = preprocess(&png(64, 48, [10, 20, 30]), IMAGE_SIZE).unwrap();
        assert_eq!(tensor.data.len(), 3 * 224 * 224);
        assert_eq!(tensor.shape(), [1, 3, 224, 224]);
    }

    #[test]
    fn solid_color_normalizes_per_channel() {
        let tensor = preprocess(&png(8, 8, [255, 0, 128]), 4).unwrap();
        let plane = 16;
        let red = tensor.data[0];
        let green = tensor.data[plane];
        let blue = tensor.data[2 * plane];
        assert!((red - (1.0 - 0.485) / 0.229).abs() < 0.02);
        assert!((green - (0.0 - 0.456) / 0.224).abs() < 0.02);
        assert!((blue - (128.0 / 255.0 - 0.406) / 0.225).abs() < 0.02);
    }

    #[test]
    fn garbage_bytes_are_invalid_input() {
        let err = preprocess(b"definitely not an image", IMAGE_SIZE).unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidInput(_)));
    }

    #[test]
    fn empty_upload_is_invalid_input() {
        assert!(matches!(decode(&[]), Err(ClassifyError::InvalidInput(_))));
    }
}
