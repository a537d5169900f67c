//! Small differentiable building blocks for image fitting.

mod downsampler;
mod pointwise;

pub use downsampler::Downsampler;
pub use pointwise::Pointwise;

use ndarray::{Array3, ArrayView3, Zip};

use crate::error::{Error, Result};

/// Mean squared error and its gradient with respect to `pred`.
///
/// # Errors
///
/// Returns an error if the shapes differ or the arrays are empty.
#[allow(clippy::cast_precision_loss)]
pub fn mse_loss(pred: &Array3<f32>, target: &ArrayView3<'_, f32>) -> Result<(f32, Array3<f32>)> {
    if pred.shape() != target.shape() {
        return Err(Error::ShapeMismatch {
            expected: format!("{:?}", target.shape()),
            actual: format!("{:?}", pred.shape()),
        });
    }
    if pred.is_empty() {
        return Err(Error::ShapeMismatch {
            expected: "non-empty prediction".to_string(),
            actual: "empty array".to_string(),
        });
    }

    let n = pred.len() as f32;
    let mut grad = Array3::<f32>::zeros(pred.raw_dim());
    let mut sum = 0.0_f32;

    Zip::from(&mut grad)
        .and(pred)
        .and(target)
        .for_each(|g, &p, &t| {
            let diff = p - t;
            sum += diff * diff;
            *g = 2.0 * diff / n;
        });

    Ok((sum / n, grad))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mse() {
        let pred = Array3::from_shape_vec((1, 1, 2), vec![1.0, 3.0]).unwrap();
        let target = Array3::from_shape_vec((1, 1, 2), vec![0.0, 1.0]).unwrap();

        let (loss, grad) = mse_loss(&pred, &target.view()).unwrap();
        assert!((loss - 2.5).abs() < 1e-6);
        assert!((grad[[0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((grad[[0, 0, 1]] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_mse_shape_mismatch() {
        let pred = Array3::<f32>::zeros((1, 2, 2));
        let target = Array3::<f32>::zeros((3, 2, 2));
        assert!(mse_loss(&pred, &target.view()).is_err());
    }
}
