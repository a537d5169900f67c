//! Random fills for network inputs.

use std::str::FromStr;

use ndarray::{ArrayBase, DataMut, Dimension};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{Error, Result};

/// Distribution used to fill noise inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoiseKind {
    /// Uniform on [0, 1).
    #[default]
    Uniform,
    /// Standard normal.
    Normal,
}

impl FromStr for NoiseKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "u" | "uniform" => Ok(Self::Uniform),
            "n" | "normal" => Ok(Self::Normal),
            other => Err(Error::invalid(
                "noise_type",
                format!("expected `u` or `n`, got {other:?}"),
            )),
        }
    }
}

/// Fill `x` in place with noise of the given kind.
pub fn fill_noise<S, D, R>(x: &mut ArrayBase<S, D>, kind: NoiseKind, rng: &mut R)
where
    S: DataMut<Elem = f32>,
    D: Dimension,
    R: Rng + ?Sized,
{
    match kind {
        NoiseKind::Uniform => x.mapv_inplace(|_| rng.random::<f32>()),
        NoiseKind::Normal => x.mapv_inplace(|_| rng.sample(StandardNormal)),
    }
}
