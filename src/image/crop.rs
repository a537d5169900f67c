//! Cropping images to network-friendly dimensions.

use image::{DynamicImage, GenericImageView};

use crate::error::{Error, Result};

/// Centre-crop an image so both dimensions are divisible by `d`.
///
/// Encoder/decoder networks halve the resolution several times, so inputs
/// must be multiples of `2^levels`. Odd leftovers are dropped from the right
/// and bottom edges.
///
/// # Errors
///
/// Returns an error if `d` is zero or larger than either dimension.
pub fn crop_image(img: &DynamicImage, d: u32) -> Result<DynamicImage> {
    if d == 0 {
        return Err(Error::invalid("d", "crop multiple must be greater than 0"));
    }

    let (width, height) = img.dimensions();
    let new_width = width - width % d;
    let new_height = height - height % d;

    if new_width == 0 || new_height == 0 {
        return Err(Error::UnsupportedDimensions {
            width,
            height,
            reason: format!("smaller than the crop multiple {d}"),
        });
    }

    let left = (width - new_width) / 2;
    let top = (height - new_height) / 2;

    tracing::debug!("Cropping {width}x{height} to {new_width}x{new_height} at ({left}, {top})");

    Ok(img.crop_imm(left, top, new_width, new_height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_crop_to_multiple() {
        let img = DynamicImage::new_rgb8(100, 70);
        let cropped = crop_image(&img, 32).unwrap();
        assert_eq!(cropped.dimensions(), (96, 64));
    }

    #[test]
    fn test_crop_is_centered() {
        // Mark the pixel that should become the new top-left corner
        let mut buf = RgbImage::new(37, 35);
        buf.put_pixel(2, 1, Rgb([255, 0, 0]));
        let cropped = crop_image(&DynamicImage::ImageRgb8(buf), 32).unwrap();

        assert_eq!(cropped.dimensions(), (32, 32));
        assert_eq!(cropped.to_rgb8().get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_crop_noop_when_divisible() {
        let img = DynamicImage::new_luma8(64, 32);
        assert_eq!(crop_image(&img, 32).unwrap().dimensions(), (64, 32));
    }

    #[test]
    fn test_crop_rejects_zero() {
        let img = DynamicImage::new_rgb8(10, 10);
        assert!(crop_image(&img, 0).is_err());
    }

    #[test]
    fn test_crop_rejects_too_small() {
        let img = DynamicImage::new_rgb8(10, 10);
        assert!(matches!(
            crop_image(&img, 32),
            Err(Error::UnsupportedDimensions { .. })
        ));
    }
}
