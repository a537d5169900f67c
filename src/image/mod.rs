//! Image loading, cropping, conversion, and saving utilities.

mod convert;
mod crop;
mod load;
mod save;

pub use convert::{array_to_batch, array_to_image, batch_to_array, image_to_array};
pub use crop::crop_image;
pub use load::{get_image, load, ImageSize};
pub use save::save_image;

use std::str::FromStr;

use image::imageops::FilterType;
use ndarray::{Array3, Array4};

use crate::error::{Error, Result};

/// Image array in CHW format (channels, height, width).
/// Values are normalized to [0, 1].
pub type ImageArray = Array3<f32>;

/// Image batch in NCHW format with a batch size of one.
pub type ImageBatch = Array4<f32>;

/// Default divisor used when cropping images for the network.
pub const DEFAULT_CROP_MULTIPLE: u32 = 32;

/// Resampling filter used when resizing images for display or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
    Gaussian,
    #[default]
    Lanczos,
}

impl Interpolation {
    /// The `image` crate filter implementing this interpolation.
    #[must_use]
    pub const fn filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::Bicubic => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos => FilterType::Lanczos3,
        }
    }
}

impl FromStr for Interpolation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" | "none" => Ok(Self::Nearest),
            "bilinear" | "triangle" => Ok(Self::Bilinear),
            "bicubic" | "catmullrom" => Ok(Self::Bicubic),
            "gaussian" => Ok(Self::Gaussian),
            "lanczos" | "lanczos3" => Ok(Self::Lanczos),
            other => Err(Error::invalid(
                "interpolation",
                format!("unknown filter {other:?}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolation_parse() {
        assert_eq!("lanczos".parse::<Interpolation>().unwrap(), Interpolation::Lanczos);
        assert_eq!("Bicubic".parse::<Interpolation>().unwrap(), Interpolation::Bicubic);
        assert!("sinc".parse::<Interpolation>().is_err());
    }
}
