//! 1x1 convolution.

use ndarray::{Array1, Array2, Array3, ArrayView3, Axis, Ix1, Ix2};
use rand::Rng;

use crate::error::{Error, Result};
use crate::params::{Module, Param};

/// Per-pixel linear projection from `in_channels` to `out_channels`.
#[derive(Debug, Clone)]
pub struct Pointwise {
    weight: Param,
    bias: Param,
    in_channels: usize,
    out_channels: usize,
}

impl Pointwise {
    /// Create a layer with weights and bias drawn from
    /// `U(-1/sqrt(in), 1/sqrt(in))`.
    #[allow(clippy::cast_precision_loss)]
    pub fn new<R: Rng + ?Sized>(in_channels: usize, out_channels: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (in_channels.max(1) as f32).sqrt();
        let weight = Array2::from_shape_fn((out_channels, in_channels), |_| {
            rng.random_range(-bound..=bound)
        });
        let bias = Array1::from_shape_fn(out_channels, |_| rng.random_range(-bound..=bound));

        Self {
            weight: Param::new(weight),
            bias: Param::new(bias),
            in_channels,
            out_channels,
        }
    }

    #[must_use]
    pub const fn in_channels(&self) -> usize {
        self.in_channels
    }

    #[must_use]
    pub const fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Apply the projection to a CHW input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input channel count is wrong.
    pub fn forward(&self, input: &ArrayView3<'_, f32>) -> Result<Array3<f32>> {
        let (_, height, width) = self.check_input(input)?;

        let weight = self.weight.data();
        let weight = weight.view().into_dimensionality::<Ix2>().map_err(shape_err)?;
        let bias = self.bias.data();
        let bias = bias.view().into_dimensionality::<Ix1>().map_err(shape_err)?;

        let x = input
            .to_shape((self.in_channels, height * width))
            .map_err(shape_err)?;
        let mut out = weight.dot(&x);
        out += &bias.insert_axis(Axis(1));

        out.into_shape_with_order((self.out_channels, height, width))
            .map_err(shape_err)
    }

    /// Accumulate weight and bias gradients for `grad_output` and return the
    /// gradient with respect to `input`.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes do not match the layer.
    pub fn backward(
        &self,
        input: &ArrayView3<'_, f32>,
        grad_output: &Array3<f32>,
    ) -> Result<Array3<f32>> {
        let (_, height, width) = self.check_input(input)?;
        if grad_output.dim() != (self.out_channels, height, width) {
            return Err(Error::ShapeMismatch {
                expected: format!("({}, {height}, {width})", self.out_channels),
                actual: format!("{:?}", grad_output.shape()),
            });
        }

        let x = input
            .to_shape((self.in_channels, height * width))
            .map_err(shape_err)?;
        let g = grad_output
            .to_shape((self.out_channels, height * width))
            .map_err(shape_err)?;

        self.weight.accumulate_grad(&g.dot(&x.t()))?;
        self.bias.accumulate_grad(&g.sum_axis(Axis(1)))?;

        let weight = self.weight.data();
        let weight = weight.view().into_dimensionality::<Ix2>().map_err(shape_err)?;
        weight
            .t()
            .dot(&g)
            .into_shape_with_order((self.in_channels, height, width))
            .map_err(shape_err)
    }

    fn check_input(&self, input: &ArrayView3<'_, f32>) -> Result<(usize, usize, usize)> {
        let dim = input.dim();
        if dim.0 != self.in_channels {
            return Err(Error::ShapeMismatch {
                expected: format!("{} input channels", self.in_channels),
                actual: format!("{} channels", dim.0),
            });
        }
        Ok(dim)
    }
}

impl Module for Pointwise {
    fn parameters(&self) -> Vec<Param> {
        vec![self.weight.clone(), self.bias.clone()]
    }
}

fn shape_err(e: ndarray::ShapeError) -> Error {
    Error::ShapeMismatch {
        expected: "compatible layer shape".to_string(),
        actual: e.to_string(),
    }
}
