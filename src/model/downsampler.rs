//! Learnable strided downsampling.

use ndarray::{Array2, Array3, ArrayView3, Ix2};

use crate::error::{Error, Result};
use crate::params::{Module, Param};

/// Reduces resolution by `factor` with a shared `factor x factor` kernel.
///
/// Every output pixel is the kernel-weighted sum of one non-overlapping
/// block of the input, applied to each channel independently. The kernel
/// starts as a box filter.
#[derive(Debug, Clone)]
pub struct Downsampler {
    kernel: Param,
    factor: usize,
}

impl Downsampler {
    /// # Errors
    ///
    /// Returns an error if `factor` is zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(Error::invalid("factor", "must be greater than 0"));
        }
        let weight = 1.0 / (factor * factor) as f32;
        Ok(Self {
            kernel: Param::new(Array2::from_elem((factor, factor), weight)),
            factor,
        })
    }

    #[must_use]
    pub const fn factor(&self) -> usize {
        self.factor
    }

    /// Downsample a CHW input.
    ///
    /// # Errors
    ///
    /// Returns an error if the spatial size is not divisible by the factor.
    pub fn forward(&self, input: &ArrayView3<'_, f32>) -> Result<Array3<f32>> {
        let (channels, out_h, out_w) = self.output_dim(input)?;
        let f = self.factor;
        let kernel = self.kernel.data();
        let kernel = kernel
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|e| Error::ShapeMismatch {
                expected: format!("({f}, {f}) kernel"),
                actual: e.to_string(),
            })?;

        Ok(Array3::from_shape_fn((channels, out_h, out_w), |(c, i, j)| {
            let mut acc = 0.0;
            for a in 0..f {
                for b in 0..f {
                    acc += kernel[[a, b]] * input[[c, i * f + a, j * f + b]];
                }
            }
            acc
        }))
    }

    /// Accumulate the kernel gradient and return the input gradient.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes are inconsistent.
    pub fn backward(
        &self,
        input: &ArrayView3<'_, f32>,
        grad_output: &Array3<f32>,
    ) -> Result<Array3<f32>> {
        let out_dim = self.output_dim(input)?;
        if grad_output.dim() != out_dim {
            return Err(Error::ShapeMismatch {
                expected: format!("{out_dim:?}"),
                actual: format!("{:?}", grad_output.shape()),
            });
        }

        let f = self.factor;
        let mut kernel_grad = Array2::<f32>::zeros((f, f));
        let mut grad_input = Array3::<f32>::zeros(input.raw_dim());
        {
            let kernel = self.kernel.data();
            for ((c, i, j), &g) in grad_output.indexed_iter() {
                for a in 0..f {
                    for b in 0..f {
                        let (y, x) = (i * f + a, j * f + b);
                        kernel_grad[[a, b]] += g * input[[c, y, x]];
                        grad_input[[c, y, x]] += g * kernel[[a, b]];
                    }
                }
            }
        }

        self.kernel.accumulate_grad(&kernel_grad)?;
        Ok(grad_input)
    }

    fn output_dim(&self, input: &ArrayView3<'_, f32>) -> Result<(usize, usize, usize)> {
        let (channels, height, width) = input.dim();
        let f = self.factor;
        if height % f != 0 || width % f != 0 {
            return Err(Error::ShapeMismatch {
                expected: format!("spatial size divisible by {f}"),
                actual: format!("{height}x{width}"),
            });
        }
        Ok((channels, height / f, width / f))
    }
}

impl Module for Downsampler {
    fn parameters(&self) -> Vec<Param> {
        vec![self.kernel.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Array3<f32> {
        Array3::from_shape_vec((1, 2, 4), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).unwrap()
    }

    #[test]
    fn test_box_average() {
        let down = Downsampler::new(2).unwrap();
        let out = down.forward(&ramp().view()).unwrap();

        assert_eq!(out.shape(), &[1, 1, 2]);
        assert!((out[[0, 0, 0]] - 2.5).abs() < 1e-6);
        assert!((out[[0, 0, 1]] - 4.5).abs() < 1e-6);
    }

    #[test]
    fn test_factor_one_is_identity() {
        let down = Downsampler::new(1).unwrap();
        let input = ramp();
        assert_eq!(down.forward(&input.view()).unwrap(), input);
    }

    #[test]
    fn test_backward() {
        let down = Downsampler::new(2).unwrap();
        let input = ramp();
        let grad_out = Array3::from_shape_vec((1, 1, 2), vec![1.0, 2.0]).unwrap();

        let grad_in = down.backward(&input.view(), &grad_out).unwrap();
        assert!((grad_in[[0, 0, 0]] - 0.25).abs() < 1e-6);
        assert!((grad_in[[0, 1, 3]] - 0.5).abs() < 1e-6);

        // Kernel tap (0, 0) sees inputs 0 and 2 with gradients 1 and 2
        let kernel_grad = down.kernel.grad();
        assert!((kernel_grad[[0, 0]] - 4.0).abs() < 1e-6);
        assert!((kernel_grad[[1, 1]] - (5.0 + 2.0 * 7.0)).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_indivisible() {
        let down = Downsampler::new(3).unwrap();
        assert!(down.forward(&ramp().view()).is_err());
        assert!(Downsampler::new(0).is_err());
    }
}
