//! Network inputs: noise, coordinate grids, and Fourier features.

mod fourier;
mod noise;

pub use fourier::{fourier_feature_maps, log_frequencies, meshgrid, FreqMethod, FreqSpec};
pub use noise::{fill_noise, NoiseKind};

use ndarray::{concatenate, Array1, Array4, Axis};
use rand::Rng;

use crate::error::{Error, Result};

/// Spatial size of an input map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialSize {
    pub height: usize,
    pub width: usize,
}

impl SpatialSize {
    #[must_use]
    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    #[must_use]
    pub const fn square(side: usize) -> Self {
        Self::new(side, side)
    }
}

impl From<usize> for SpatialSize {
    fn from(side: usize) -> Self {
        Self::square(side)
    }
}

impl From<(usize, usize)> for SpatialSize {
    fn from((height, width): (usize, usize)) -> Self {
        Self::new(height, width)
    }
}

/// How to initialize a network input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMethod {
    /// Random noise scaled by `var`.
    Noise { kind: NoiseKind, var: f32 },
    /// Normalized pixel coordinates, repeated `depth / 2` times.
    MeshGrid,
    /// Fourier features of the pixel coordinates.
    Fourier(FreqSpec),
    /// Only the frequency vector; the caller builds features itself.
    InferFreqs(FreqSpec),
}

impl Default for InputMethod {
    fn default() -> Self {
        Self::Noise {
            kind: NoiseKind::Uniform,
            var: 0.1,
        }
    }
}

/// A generated network input.
#[derive(Debug, Clone, PartialEq)]
pub enum NetInput {
    /// A `(1, channels, H, W)` input map.
    Map(Array4<f32>),
    /// A frequency vector.
    Frequencies(Array1<f32>),
}

impl NetInput {
    /// The input map, if this is one.
    #[must_use]
    pub fn into_map(self) -> Option<Array4<f32>> {
        match self {
            Self::Map(map) => Some(map),
            Self::Frequencies(_) => None,
        }
    }

    /// The frequency vector, if this is one.
    #[must_use]
    pub fn into_frequencies(self) -> Option<Array1<f32>> {
        match self {
            Self::Frequencies(freqs) => Some(freqs),
            Self::Map(_) => None,
        }
    }
}

/// Build a network input of `input_depth` channels at `spatial_size`.
///
/// `input_depth` is ignored by the Fourier methods, whose channel count
/// follows from the frequency set.
///
/// # Errors
///
/// Returns an error if the size is empty, the depth is too small for the
/// mesh grid, or the frequency set is invalid.
pub fn get_input<R: Rng + ?Sized>(
    input_depth: usize,
    method: &InputMethod,
    spatial_size: impl Into<SpatialSize>,
    rng: &mut R,
) -> Result<NetInput> {
    let size = spatial_size.into();
    if size.height == 0 || size.width == 0 {
        return Err(Error::invalid("spatial_size", "must be non-zero"));
    }

    let input = match method {
        InputMethod::Noise { kind, var } => {
            let mut net_input = Array4::<f32>::zeros((1, input_depth, size.height, size.width));
            fill_noise(&mut net_input, *kind, rng);
            net_input *= *var;
            NetInput::Map(net_input)
        }
        InputMethod::MeshGrid => {
            let copies = input_depth / 2;
            if copies == 0 {
                return Err(Error::invalid(
                    "input_depth",
                    "mesh grid inputs need a depth of at least 2",
                ));
            }
            let grid = meshgrid(size).insert_axis(Axis(0));
            let views = vec![grid.view(); copies];
            let net_input = concatenate(Axis(1), &views).map_err(|e| Error::ShapeMismatch {
                expected: format!("{copies} stacked mesh grids"),
                actual: e.to_string(),
            })?;
            NetInput::Map(net_input)
        }
        InputMethod::Fourier(spec) => {
            let freqs = log_frequencies(spec)?;
            NetInput::Map(fourier_feature_maps(&freqs, size, spec.cosine_only))
        }
        InputMethod::InferFreqs(spec) => NetInput::Frequencies(log_frequencies(spec)?),
    };

    tracing::debug!(
        "Built {:?} input: {:?}",
        method,
        match &input {
            NetInput::Map(map) => map.shape().to_vec(),
            NetInput::Frequencies(freqs) => freqs.shape().to_vec(),
        }
    );

    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_noise_input_scaled() {
        let mut rng = StdRng::seed_from_u64(0);
        let method = InputMethod::Noise {
            kind: NoiseKind::Uniform,
            var: 0.1,
        };
        let input = get_input(32, &method, SpatialSize::new(8, 12), &mut rng)
            .unwrap()
            .into_map()
            .unwrap();

        assert_eq!(input.shape(), &[1, 32, 8, 12]);
        assert!(input.iter().all(|&v| (0.0..=0.1).contains(&v)));
    }

    #[test]
    fn test_meshgrid_input_repeats() {
        let mut rng = StdRng::seed_from_u64(0);
        let input = get_input(5, &InputMethod::MeshGrid, SpatialSize::square(4), &mut rng)
            .unwrap()
            .into_map()
            .unwrap();

        // depth 5 gives two copies of the 2-channel grid
        assert_eq!(input.shape(), &[1, 4, 4, 4]);
        assert_eq!(
            input.slice(ndarray::s![0, 0..2, .., ..]),
            input.slice(ndarray::s![0, 2..4, .., ..])
        );
    }

    #[test]
    fn test_meshgrid_input_needs_depth() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(get_input(1, &InputMethod::MeshGrid, SpatialSize::square(4), &mut rng).is_err());
    }

    #[test]
    fn test_fourier_input_ignores_depth() {
        let mut rng = StdRng::seed_from_u64(0);
        let spec = FreqSpec {
            n_freqs: 3,
            ..FreqSpec::default()
        };
        let input = get_input(999, &InputMethod::Fourier(spec), SpatialSize::new(4, 6), &mut rng)
            .unwrap()
            .into_map()
            .unwrap();
        assert_eq!(input.shape(), &[1, 12, 4, 6]);
    }

    #[test]
    fn test_infer_freqs_returns_vector() {
        let mut rng = StdRng::seed_from_u64(0);
        let spec = FreqSpec {
            base: 3.0,
            n_freqs: 3,
            ..FreqSpec::default()
        };
        let freqs = get_input(0, &InputMethod::InferFreqs(spec), SpatialSize::square(4), &mut rng)
            .unwrap()
            .into_frequencies()
            .unwrap();
        assert_eq!(freqs, ndarray::array![1.0, 3.0, 9.0]);
    }

    #[test]
    fn test_empty_size_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(get_input(2, &InputMethod::MeshGrid, SpatialSize::new(0, 4), &mut rng).is_err());
    }
}
