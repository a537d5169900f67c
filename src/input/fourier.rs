//! Coordinate grids and Fourier feature maps.

use std::str::FromStr;

use ndarray::{Array1, Array3, Array4};

use crate::error::{Error, Result};

use super::SpatialSize;

/// How frequencies for Fourier features are spaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreqMethod {
    /// `base^k` for `k = 0..n_freqs`.
    #[default]
    Log,
}

impl FromStr for FreqMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "log" => Ok(Self::Log),
            other => Err(Error::invalid(
                "freq_method",
                format!("unsupported frequency spacing {other:?}"),
            )),
        }
    }
}

/// Frequency set for Fourier feature inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreqSpec {
    pub method: FreqMethod,
    pub base: f32,
    pub n_freqs: usize,
    pub cosine_only: bool,
}

impl Default for FreqSpec {
    fn default() -> Self {
        Self {
            method: FreqMethod::Log,
            base: 2.0,
            n_freqs: 8,
            cosine_only: false,
        }
    }
}

impl FreqSpec {
    /// Validate the frequency set.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no frequencies or the base is not
    /// positive.
    pub fn validate(&self) -> Result<()> {
        if self.n_freqs == 0 {
            return Err(Error::invalid("n_freqs", "must be greater than 0"));
        }
        if !(self.base > 0.0 && self.base.is_finite()) {
            return Err(Error::invalid("base", "must be a positive finite number"));
        }
        Ok(())
    }

    /// Number of channels a feature map built from this set has.
    #[must_use]
    pub const fn channels(&self) -> usize {
        let per_coord = if self.cosine_only { 1 } else { 2 };
        2 * per_coord * self.n_freqs
    }
}

/// Frequencies `base^k` for `k` in `0..n_freqs`.
///
/// # Errors
///
/// Returns an error if the frequency settings are invalid.
#[allow(clippy::cast_precision_loss)]
pub fn log_frequencies(spec: &FreqSpec) -> Result<Array1<f32>> {
    spec.validate()?;
    match spec.method {
        FreqMethod::Log => Ok(Array1::from_shape_fn(spec.n_freqs, |k| {
            spec.base.powf(k as f32)
        })),
    }
}

/// Normalized pixel coordinates as a `(2, H, W)` array.
///
/// Channel 0 holds the column position `x / (W - 1)` and channel 1 the row
/// position `y / (H - 1)`, both in [0, 1]. A dimension of length one maps
/// to zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn meshgrid(size: SpatialSize) -> Array3<f32> {
    let SpatialSize { height, width } = size;
    let x_den = width.saturating_sub(1).max(1) as f32;
    let y_den = height.saturating_sub(1).max(1) as f32;

    Array3::from_shape_fn((2, height, width), |(c, y, x)| {
        if c == 0 {
            x as f32 / x_den
        } else {
            y as f32 / y_den
        }
    })
}

/// Encode pixel coordinates with cosines (and sines) of `freqs`.
///
/// For every coordinate (x then y) the output holds `cos(f * p)` for each
/// frequency, followed by `sin(f * p)` unless `cosine_only` is set. The
/// result has shape `(1, channels, H, W)`.
#[must_use]
pub fn fourier_feature_maps(freqs: &Array1<f32>, size: SpatialSize, cosine_only: bool) -> Array4<f32> {
    let grid = meshgrid(size);
    let n_freqs = freqs.len();
    let per_coord = if cosine_only { n_freqs } else { 2 * n_freqs };

    Array4::from_shape_fn((1, 2 * per_coord, size.height, size.width), |(_, ch, y, x)| {
        let coord = ch / per_coord;
        let rest = ch % per_coord;
        let (is_sin, f) = (rest >= n_freqs, rest % n_freqs);
        let v = freqs[f] * grid[[coord, y, x]];
        if is_sin {
            v.sin()
        } else {
            v.cos()
        }
    })
}
