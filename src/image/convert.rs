//! Conversions between decoded images and normalized arrays.

use image::{ColorType, DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use ndarray::{Array3, Axis};

use crate::error::{Error, Result};

use super::{ImageArray, ImageBatch};

/// Convert a decoded image to a CHW array with values in [0, 1].
///
/// Grayscale images produce one channel, grayscale with alpha two, RGB three
/// and RGBA four. Images with more than 8 bits per sample are reduced to
/// their 8-bit counterpart first.
#[must_use]
pub fn image_to_array(img: &DynamicImage) -> ImageArray {
    let (channels, raw, width, height) = match img.color() {
        ColorType::L8 | ColorType::L16 => {
            let buf = img.to_luma8();
            (1, buf.as_raw().clone(), buf.width(), buf.height())
        }
        ColorType::La8 | ColorType::La16 => {
            let buf = img.to_luma_alpha8();
            (2, buf.as_raw().clone(), buf.width(), buf.height())
        }
        color if color.has_alpha() => {
            let buf = img.to_rgba8();
            (4, buf.as_raw().clone(), buf.width(), buf.height())
        }
        _ => {
            let buf = img.to_rgb8();
            (3, buf.as_raw().clone(), buf.width(), buf.height())
        }
    };

    let (height, width) = (height as usize, width as usize);

    // Interleaved HWC samples; index math transposes to CHW.
    Array3::from_shape_fn((channels, height, width), |(c, y, x)| {
        f32::from(raw[(y * width + x) * channels + c]) / 255.0
    })
}

/// Convert a CHW array with values in [0, 1] back into an image.
///
/// Values are scaled by 255, clamped, and truncated to `u8`.
///
/// # Errors
///
/// Returns an error if the channel count is not 1, 2, 3 or 4, or if the
/// spatial dimensions do not fit in `u32`.
pub fn array_to_image(arr: &ImageArray) -> Result<DynamicImage> {
    let (channels, height, width) = arr.dim();

    let w = u32::try_from(width).map_err(|_| Error::ShapeMismatch {
        expected: "width fitting in u32".to_string(),
        actual: width.to_string(),
    })?;
    let h = u32::try_from(height).map_err(|_| Error::ShapeMismatch {
        expected: "height fitting in u32".to_string(),
        actual: height.to_string(),
    })?;

    // HWC ordering expected by the image buffers
    let raw: Vec<u8> = arr
        .view()
        .permuted_axes([1, 2, 0])
        .iter()
        .map(|&v| to_u8(v))
        .collect();

    let too_small = || Error::ShapeMismatch {
        expected: format!("{channels}x{height}x{width} buffer"),
        actual: "buffer of different length".to_string(),
    };

    let img = match channels {
        1 => DynamicImage::ImageLuma8(GrayImage::from_raw(w, h, raw).ok_or_else(too_small)?),
        2 => DynamicImage::ImageLumaA8(
            GrayAlphaImage::from_raw(w, h, raw).ok_or_else(too_small)?,
        ),
        3 => DynamicImage::ImageRgb8(RgbImage::from_raw(w, h, raw).ok_or_else(too_small)?),
        4 => DynamicImage::ImageRgba8(RgbaImage::from_raw(w, h, raw).ok_or_else(too_small)?),
        _ => {
            return Err(Error::UnsupportedChannels {
                channels,
                reason: "images need 1, 2, 3 or 4 channels".to_string(),
            })
        }
    };

    Ok(img)
}

/// Add a leading batch axis: CHW to 1xCxHxW.
#[must_use]
pub fn array_to_batch(arr: ImageArray) -> ImageBatch {
    arr.insert_axis(Axis(0))
}

/// Take the first element of a batch: NxCxHxW to CxHxW.
///
/// # Errors
///
/// Returns an error if the batch is empty.
pub fn batch_to_array(batch: &ImageBatch) -> Result<ImageArray> {
    if batch.len_of(Axis(0)) == 0 {
        return Err(Error::ShapeMismatch {
            expected: "batch with at least one element".to_string(),
            actual: format!("{:?}", batch.shape()),
        });
    }
    Ok(batch.index_axis(Axis(0), 0).to_owned())
}

/// Scale a [0, 1] value to [0, 255] with clamping and truncation.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(value: f32) -> u8 {
    // Safe: clamped to [0, 255] range before casting
    (value * 255.0).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, Rgba};

    #[test]
    fn test_rgb_to_chw() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, Rgb([255, 0, 51]));
        let arr = image_to_array(&DynamicImage::ImageRgb8(img));

        assert_eq!(arr.shape(), &[3, 2, 3]);
        assert!((arr[[0, 1, 2]] - 1.0).abs() < 1e-6);
        assert!(arr[[1, 1, 2]].abs() < 1e-6);
        assert!((arr[[2, 1, 2]] - 0.2).abs() < 1e-6);
        assert!(arr[[0, 0, 0]].abs() < 1e-6);
    }

    #[test]
    fn test_gray_has_single_channel() {
        let img = GrayImage::from_pixel(4, 5, Luma([255]));
        let arr = image_to_array(&DynamicImage::ImageLuma8(img));

        assert_eq!(arr.shape(), &[1, 5, 4]);
        assert!(arr.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_rgba_keeps_alpha() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 128]));
        let arr = image_to_array(&DynamicImage::ImageRgba8(img));

        assert_eq!(arr.shape(), &[4, 2, 2]);
        assert!((arr[[3, 0, 0]] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_array_to_image_clamps() {
        let mut arr = Array3::<f32>::zeros((3, 1, 2));
        arr[[0, 0, 0]] = 2.0;
        arr[[1, 0, 1]] = -1.0;
        arr[[2, 0, 1]] = 0.5;

        let img = array_to_image(&arr).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(img.get_pixel(1, 0), &Rgb([0, 0, 127]));
    }

    #[test]
    fn test_array_to_image_single_channel_is_gray() {
        let arr = Array3::<f32>::from_elem((1, 2, 2), 1.0);
        let img = array_to_image(&arr).unwrap();
        assert_eq!(img.color(), ColorType::L8);
    }

    #[test]
    fn test_array_to_image_rejects_five_channels() {
        let arr = Array3::<f32>::zeros((5, 2, 2));
        assert!(matches!(
            array_to_image(&arr),
            Err(Error::UnsupportedChannels { channels: 5, .. })
        ));
    }

    #[test]
    fn test_batch_axis() {
        let arr = Array3::<f32>::from_elem((3, 4, 5), 0.25);
        let batch = array_to_batch(arr.clone());
        assert_eq!(batch.shape(), &[1, 3, 4, 5]);
        assert_eq!(batch_to_array(&batch).unwrap(), arr);
    }

    #[test]
    fn test_empty_batch_is_error() {
        let batch = ImageBatch::zeros((0, 3, 2, 2));
        assert!(batch_to_array(&batch).is_err());
    }
}
