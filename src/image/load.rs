//! Image loading utilities.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView};

use crate::error::{Error, Result};

use super::{image_to_array, ImageArray};

/// Target size for [`get_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSize {
    /// Keep the decoded size.
    #[default]
    Original,
    /// Resize to a square of this side length.
    Square(u32),
    /// Resize to exactly this width and height.
    Exact { width: u32, height: u32 },
}

impl ImageSize {
    /// Requested `(width, height)`, or `None` for [`ImageSize::Original`].
    #[must_use]
    pub const fn dimensions(self) -> Option<(u32, u32)> {
        match self {
            Self::Original => None,
            Self::Square(side) => Some((side, side)),
            Self::Exact { width, height } => Some((width, height)),
        }
    }
}

/// Load an image from disk.
///
/// DICOM files (`.dcm`) are converted to an 8-bit grayscale PNG written next
/// to the source file, which is then loaded. DICOM support requires the
/// `dicom` feature.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded.
pub fn load<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path = path.as_ref();

    let is_dicom = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "dcm");

    let path = if is_dicom {
        let png_path = path.with_extension("png");
        dicom::convert_to_png(path, &png_path)?;
        png_path
    } else {
        path.to_path_buf()
    };

    image::open(&path).map_err(|source| Error::ImageLoad { path, source })
}

/// Load an image and resize it to a specific size.
///
/// Upscaling uses a bicubic filter, downscaling an antialiasing Lanczos
/// filter. Returns the (possibly resized) image alongside its CHW array.
///
/// # Errors
///
/// Returns an error if the image cannot be loaded.
pub fn get_image<P: AsRef<Path>>(path: P, size: ImageSize) -> Result<(DynamicImage, ImageArray)> {
    let mut img = load(path)?;

    if let Some((width, height)) = size.dimensions() {
        if width == 0 || height == 0 {
            return Err(Error::UnsupportedDimensions {
                width,
                height,
                reason: "requested size must be non-zero".to_string(),
            });
        }

        let current = img.dimensions();
        if current != (width, height) {
            let filter = if width > current.0 {
                FilterType::CatmullRom
            } else {
                FilterType::Lanczos3
            };
            tracing::debug!(
                "Resizing {}x{} to {width}x{height} with {filter:?}",
                current.0,
                current.1
            );
            img = img.resize_exact(width, height, filter);
        }
    }

    let arr = image_to_array(&img);
    Ok((img, arr))
}

/// Map raw DICOM sample values to 8-bit gray levels.
///
/// Each value becomes `(v - min) / max * 255`, offset by the frame minimum
/// and scaled by the raw maximum. A frame whose maximum is zero is black.
/// Results outside `0..=255`, which occur when the minimum is negative,
/// saturate rather than wrap.
#[cfg_attr(not(feature = "dicom"), allow(dead_code))]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::float_cmp
)]
fn normalize_frame(frame: &[f32]) -> Vec<u8> {
    let min = frame.iter().copied().fold(f32::INFINITY, f32::min);
    let max = frame.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    if max == 0.0 {
        return vec![0; frame.len()];
    }

    frame
        .iter()
        .map(|&v| ((v - min) / max * 255.0).clamp(0.0, 255.0) as u8)
        .collect()
}

#[cfg(feature = "dicom")]
mod dicom {
    use std::path::Path;

    use dicom_pixeldata::PixelDecoder;
    use image::GrayImage;

    use crate::error::{Error, Result};

    /// Write the first frame of a DICOM file as an 8-bit grayscale PNG.
    pub(super) fn convert_to_png(path: &Path, png_path: &Path) -> Result<()> {
        let dicom_err = |message: String| Error::Dicom {
            path: path.to_path_buf(),
            message,
        };

        let object = dicom_object::open_file(path).map_err(|e| dicom_err(e.to_string()))?;
        let decoded = object
            .decode_pixel_data()
            .map_err(|e| dicom_err(e.to_string()))?;

        if decoded.samples_per_pixel() != 1 {
            return Err(Error::UnsupportedChannels {
                channels: usize::from(decoded.samples_per_pixel()),
                reason: "only single-sample DICOM images are supported".to_string(),
            });
        }

        let (rows, cols) = (decoded.rows(), decoded.columns());
        let values: Vec<f32> = decoded.to_vec().map_err(|e| dicom_err(e.to_string()))?;
        let frame_len = rows as usize * cols as usize;
        let frame = values.get(..frame_len).ok_or_else(|| Error::ShapeMismatch {
            expected: format!("{frame_len} pixel values"),
            actual: values.len().to_string(),
        })?;

        let pixels = super::normalize_frame(frame);

        let img = GrayImage::from_raw(cols, rows, pixels).ok_or_else(
            || Error::ShapeMismatch {
                expected: format!("{rows}x{cols} frame"),
                actual: "short pixel buffer".to_string(),
            },
        )?;

        tracing::info!("Converted DICOM {} -> {}", path.display(), png_path.display());

        img.save(png_path).map_err(|source| Error::ImageSave {
            path: png_path.to_path_buf(),
            source,
        })
    }
}

#[cfg(not(feature = "dicom"))]
mod dicom {
    use std::path::Path;

    use crate::error::{Error, Result};

    pub(super) fn convert_to_png(path: &Path, _png_path: &Path) -> Result<()> {
        Err(Error::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "DICOM support requires the `dicom` feature".to_string(),
        })
    }
}
