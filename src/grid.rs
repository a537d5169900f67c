//! Image grids for visualizing several images at once.

use std::path::Path;

use ndarray::{concatenate, s, Array3, Axis};

use crate::error::{Error, Result};
use crate::image::{array_to_image, image_to_array, save_image, ImageArray, Interpolation};

/// Options for laying out and rendering an image grid.
#[derive(Debug, Clone)]
pub struct GridOptions {
    /// Number of images per row.
    pub nrow: usize,

    /// Padding in pixels between and around images.
    pub padding: usize,

    /// Integer upscaling factor applied when the grid is written out.
    pub factor: u32,

    /// Filter used for upscaling.
    pub interpolation: Interpolation,

    /// Output JPEG quality (1-100).
    pub quality: u8,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            nrow: 8,
            padding: 2,
            factor: 1,
            interpolation: Interpolation::Lanczos,
            quality: 95,
        }
    }
}

impl GridOptions {
    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns an error if any option is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.nrow == 0 {
            return Err(Error::invalid("nrow", "must be greater than 0"));
        }
        if self.factor == 0 {
            return Err(Error::invalid("factor", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Tile equally-shaped images into one CHW array.
///
/// Single-channel images are replicated to three channels. A single image is
/// returned unpadded.
///
/// # Errors
///
/// Returns an error if the list is empty, `nrow` is zero, or the images do
/// not share a shape.
pub fn make_grid(images: &[ImageArray], nrow: usize, padding: usize) -> Result<ImageArray> {
    let first = images.first().ok_or(Error::EmptyGrid)?;
    if nrow == 0 {
        return Err(Error::invalid("nrow", "must be greater than 0"));
    }

    if let Some(other) = images.iter().find(|img| img.shape() != first.shape()) {
        return Err(Error::ShapeMismatch {
            expected: format!("{:?}", first.shape()),
            actual: format!("{:?}", other.shape()),
        });
    }

    let images = images
        .iter()
        .map(|img| {
            if img.dim().0 == 1 {
                to_three_channels(img)
            } else {
                Ok(img.clone())
            }
        })
        .collect::<Result<Vec<_>>>()?;

    if let [only] = images.as_slice() {
        return Ok(only.clone());
    }

    let (channels, height, width) = images[0].dim();
    let nmaps = images.len();
    let xmaps = nrow.min(nmaps);
    let ymaps = nmaps.div_ceil(xmaps);
    let (cell_h, cell_w) = (height + padding, width + padding);

    let mut grid = Array3::<f32>::zeros((channels, ymaps * cell_h + padding, xmaps * cell_w + padding));

    for (k, img) in images.iter().enumerate() {
        let (row, col) = (k / xmaps, k % xmaps);
        let top = row * cell_h + padding;
        let left = col * cell_w + padding;
        grid.slice_mut(s![.., top..top + height, left..left + width])
            .assign(img);
    }

    Ok(grid)
}

/// Lay out images for display.
///
/// All images must have one or three channels; single-channel images are
/// promoted when mixed with color images. When the first image is
/// single-channel the result is a one-channel grid.
///
/// # Errors
///
/// Returns an error if the channel counts are unsupported or the grid cannot
/// be built.
pub fn render_image_grid(images: &[ImageArray], options: &GridOptions) -> Result<ImageArray> {
    options.validate()?;

    let n_channels = images
        .iter()
        .map(|img| img.dim().0)
        .max()
        .ok_or(Error::EmptyGrid)?;

    if n_channels != 1 && n_channels != 3 {
        return Err(Error::UnsupportedChannels {
            channels: n_channels,
            reason: "images should have 1 or 3 channels".to_string(),
        });
    }

    let images = images
        .iter()
        .map(|img| {
            if img.dim().0 == n_channels {
                Ok(img.clone())
            } else {
                to_three_channels(img)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let grid = make_grid(&images, options.nrow, options.padding)?;

    if images[0].dim().0 == 1 {
        Ok(grid.slice(s![0..1, .., ..]).to_owned())
    } else {
        Ok(grid)
    }
}

/// Render a grid and write it to `path`, upscaled by `options.factor`.
///
/// Returns the unscaled grid.
///
/// # Errors
///
/// Returns an error if the grid cannot be rendered or written.
pub fn save_image_grid<P: AsRef<Path>>(
    images: &[ImageArray],
    options: &GridOptions,
    path: P,
) -> Result<ImageArray> {
    let grid = render_image_grid(images, options)?;

    let output = if options.factor > 1 {
        let img = array_to_image(&grid)?;
        let upscaled = img.resize_exact(
            img.width() * options.factor,
            img.height() * options.factor,
            options.interpolation.filter(),
        );
        image_to_array(&upscaled)
    } else {
        grid.clone()
    };

    tracing::info!(
        "Writing {}-image grid ({}x{}) to {}",
        images.len(),
        output.dim().2,
        output.dim().1,
        path.as_ref().display()
    );

    save_image(&output, path, options.quality)?;
    Ok(grid)
}

fn to_three_channels(img: &ImageArray) -> Result<ImageArray> {
    let channels = img.dim().0;
    if channels != 1 {
        return Err(Error::UnsupportedChannels {
            channels,
            reason: "only single-channel images can be replicated to three channels".to_string(),
        });
    }

    let view = img.view();
    concatenate(Axis(0), &[view, view, view]).map_err(|e| Error::ShapeMismatch {
        expected: "three stacked channels".to_string(),
        actual: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(channels: usize, value: f32) -> ImageArray {
        Array3::from_elem((channels, 4, 6), value)
    }

    #[test]
    fn test_grid_layout() {
        let images: Vec<_> = (1..=5).map(|i| filled(3, i as f32 / 10.0)).collect();
        let grid = make_grid(&images, 2, 2).unwrap();

        // 2 columns, 3 rows
        assert_eq!(grid.shape(), &[3, 3 * 6 + 2, 2 * 8 + 2]);
        // Padding stays zero
        assert!(grid[[0, 0, 0]].abs() < 1e-6);
        // Third image starts on the second row, first column
        assert!((grid[[0, 6 + 2, 2]] - 0.3).abs() < 1e-6);
        // Second image on the first row, second column
        assert!((grid[[1, 2, 8 + 2]] - 0.2).abs() < 1e-6);
        // Unused last cell is empty
        assert!(grid[[0, 12 + 2, 8 + 2]].abs() < 1e-6);
    }

    #[test]
    fn test_grid_single_image_unpadded() {
        let grid = make_grid(&[filled(3, 0.5)], 8, 2).unwrap();
        assert_eq!(grid.shape(), &[3, 4, 6]);
    }

    #[test]
    fn test_grid_promotes_gray() {
        let grid = make_grid(&[filled(1, 0.5), filled(1, 0.5)], 8, 0).unwrap();
        assert_eq!(grid.shape(), &[3, 4, 12]);
    }

    #[test]
    fn test_grid_shape_mismatch() {
        let other = Array3::<f32>::zeros((3, 5, 6));
        assert!(matches!(
            make_grid(&[filled(3, 0.0), other], 8, 2),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(make_grid(&[], 8, 2), Err(Error::EmptyGrid)));
    }

    #[test]
    fn test_render_gray_stays_gray() {
        let grid = render_image_grid(&[filled(1, 0.2), filled(1, 0.4)], &GridOptions::default())
            .unwrap();
        assert_eq!(grid.dim().0, 1);
    }

    #[test]
    fn test_render_mixed_channels() {
        let grid = render_image_grid(&[filled(3, 0.2), filled(1, 0.4)], &GridOptions::default())
            .unwrap();
        assert_eq!(grid.dim().0, 3);
        // The gray image was replicated into every channel
        assert!((grid[[2, 2, 8 + 2]] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_render_rejects_rgba() {
        let result = render_image_grid(&[filled(4, 0.2)], &GridOptions::default());
        assert!(matches!(
            result,
            Err(Error::UnsupportedChannels { channels: 4, .. })
        ));
    }

    #[test]
    fn test_render_rejects_two_channel_with_color() {
        let result = render_image_grid(&[filled(3, 0.2), filled(2, 0.4)], &GridOptions::default());
        assert!(matches!(
            result,
            Err(Error::UnsupportedChannels { channels: 2, .. })
        ));
    }

    #[test]
    fn test_three_channel_replication() {
        let gray = filled(1, 0.7);
        let color = to_three_channels(&gray).unwrap();
        assert_eq!(color.shape(), &[3, 4, 6]);
        assert!(color.iter().all(|&v| (v - 0.7).abs() < 1e-6));

        assert!(to_three_channels(&filled(3, 0.7)).is_err());
    }

    #[test]
    fn test_save_grid_upscales() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.png");
        let options = GridOptions {
            factor: 2,
            ..GridOptions::default()
        };

        let grid = save_image_grid(&[filled(3, 0.2), filled(3, 0.8)], &options, &path).unwrap();
        let written = image::open(&path).unwrap();

        assert_eq!(written.width() as usize, grid.dim().2 * 2);
        assert_eq!(written.height() as usize, grid.dim().1 * 2);
    }
}
