//! Image saving utilities.

use std::path::Path;

use crate::error::{Error, Result};

use super::{array_to_image, ImageArray};

/// Save a CHW array as an image file.
///
/// The format is inferred from the extension; PNG is used when there is
/// none. JPEG output is encoded with `quality` (1-100) and loses any alpha
/// channel.
///
/// # Errors
///
/// Returns an error if the array cannot be converted or the file cannot be
/// written.
pub fn save_image<P: AsRef<Path>>(arr: &ImageArray, path: P, quality: u8) -> Result<()> {
    let path = path.as_ref();

    if !(1..=100).contains(&quality) {
        return Err(Error::invalid("quality", "must be between 1 and 100"));
    }

    let img = array_to_image(arr)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("jpg" | "jpeg") => {
            let mut output = std::fs::File::create(path)?;
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality);
            // JPEG has no alpha channel
            let img = if img.color().has_alpha() {
                if img.color().has_color() {
                    image::DynamicImage::ImageRgb8(img.to_rgb8())
                } else {
                    image::DynamicImage::ImageLuma8(img.to_luma8())
                }
            } else {
                img
            };
            img.write_with_encoder(encoder)
                .map_err(|source| Error::ImageSave {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        Some("png" | "bmp" | "tif" | "tiff" | "gif" | "webp" | "ppm" | "pgm" | "tga") => {
            img.save(path).map_err(|source| Error::ImageSave {
                path: path.to_path_buf(),
                source,
            })?;
        }
        _ => {
            img.save_with_format(path, image::ImageFormat::Png)
                .map_err(|source| Error::ImageSave {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
    }

    tracing::debug!("Saved {:?} image to {}", arr.dim(), path.display());

    Ok(())
}
