//! Limited-memory BFGS without line search.

use std::collections::VecDeque;

use ndarray::{s, Array1};

use crate::error::{Error, Result};
use crate::params::Param;

/// L-BFGS settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LbfgsConfig {
    /// Learning rate (fixed step length).
    pub lr: f32,
    /// Maximum iterations per call to [`Lbfgs::step`].
    pub max_iter: usize,
    /// Maximum closure evaluations per step; defaults to `max_iter * 5 / 4`.
    pub max_eval: Option<usize>,
    /// Stop when the largest gradient entry is at or below this value.
    pub tolerance_grad: f32,
    /// Stop when steps or loss changes fall below this value.
    pub tolerance_change: f32,
    /// Number of curvature pairs kept.
    pub history_size: usize,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            lr: 1.0,
            max_iter: 20,
            max_eval: None,
            tolerance_grad: 1e-7,
            tolerance_change: 1e-9,
            history_size: 100,
        }
    }
}

/// L-BFGS optimizer with a fixed step length.
///
/// Each call to [`Lbfgs::step`] runs up to `max_iter` iterations, calling the
/// closure to re-evaluate the loss and gradients after every update.
/// Curvature history persists across calls.
#[derive(Debug)]
pub struct Lbfgs {
    params: Vec<Param>,
    config: LbfgsConfig,
    direction: Option<Array1<f32>>,
    step_len: f32,
    old_dirs: VecDeque<Array1<f32>>,
    old_steps: VecDeque<Array1<f32>>,
    ro: VecDeque<f32>,
    h_diag: f32,
    prev_flat_grad: Option<Array1<f32>>,
    prev_loss: f32,
    n_iter: usize,
    func_evals: usize,
}

impl Lbfgs {
    /// Create an optimizer over `params`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(params: Vec<Param>, config: LbfgsConfig) -> Result<Self> {
        if config.history_size == 0 {
            return Err(Error::invalid("history_size", "must be greater than 0"));
        }
        if config.lr.is_nan() || config.lr <= 0.0 {
            return Err(Error::invalid("lr", "must be positive"));
        }
        Ok(Self {
            params,
            config,
            direction: None,
            step_len: 0.0,
            old_dirs: VecDeque::new(),
            old_steps: VecDeque::new(),
            ro: VecDeque::new(),
            h_diag: 1.0,
            prev_flat_grad: None,
            prev_loss: 0.0,
            n_iter: 0,
            func_evals: 0,
        })
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Total iterations across all steps.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.n_iter
    }

    /// Total closure evaluations across all steps.
    #[must_use]
    pub const fn evaluations(&self) -> usize {
        self.func_evals
    }

    fn max_eval(&self) -> usize {
        self.config
            .max_eval
            .unwrap_or(self.config.max_iter * 5 / 4)
    }

    fn gather_flat_grad(&self) -> Array1<f32> {
        let mut flat = Vec::with_capacity(self.params.iter().map(Param::len).sum());
        for param in &self.params {
            flat.extend(param.grad().iter().copied());
        }
        Array1::from_vec(flat)
    }

    fn add_grad(&self, step_len: f32, direction: &Array1<f32>) {
        let mut offset = 0;
        for param in &self.params {
            let mut data = param.data_mut();
            let n = data.len();
            let update = direction.slice(s![offset..offset + n]);
            for (p, &d) in data.iter_mut().zip(update.iter()) {
                *p += step_len * d;
            }
            offset += n;
        }
    }

    /// Run one optimization step.
    ///
    /// `closure` must recompute the loss and leave fresh gradients in the
    /// parameters (zeroing them first). Returns the loss from the first
    /// evaluation.
    ///
    /// # Errors
    ///
    /// Propagates errors from the closure.
    #[allow(clippy::too_many_lines)]
    pub fn step<F>(&mut self, mut closure: F) -> Result<f32>
    where
        F: FnMut() -> Result<f32>,
    {
        let LbfgsConfig {
            lr,
            max_iter,
            tolerance_grad,
            tolerance_change,
            history_size,
            ..
        } = self.config;
        let max_eval = self.max_eval();

        let orig_loss = closure()?;
        let mut loss = orig_loss;
        let mut current_evals = 1;
        self.func_evals += 1;

        let mut flat_grad = self.gather_flat_grad();
        let mut opt_cond = max_abs(&flat_grad) <= tolerance_grad;

        if opt_cond {
            return Ok(orig_loss);
        }

        let mut n_iter = 0;
        while n_iter < max_iter {
            n_iter += 1;
            self.n_iter += 1;

            let direction = if self.n_iter == 1 {
                self.old_dirs.clear();
                self.old_steps.clear();
                self.ro.clear();
                self.h_diag = 1.0;
                -&flat_grad
            } else {
                self.update_history(&flat_grad, history_size);
                self.two_loop(&flat_grad)
            };

            self.prev_flat_grad = Some(flat_grad.clone());
            self.prev_loss = loss;

            self.step_len = if self.n_iter == 1 {
                let l1: f32 = flat_grad.iter().map(|g| g.abs()).sum();
                (1.0 / l1).min(1.0) * lr
            } else {
                lr
            };

            let gtd = flat_grad.dot(&direction);
            if gtd > -tolerance_change {
                self.direction = Some(direction);
                break;
            }

            self.add_grad(self.step_len, &direction);

            let mut ls_func_evals = 0;
            if n_iter != max_iter {
                loss = closure()?;
                flat_grad = self.gather_flat_grad();
                opt_cond = max_abs(&flat_grad) <= tolerance_grad;
                ls_func_evals = 1;
            }

            current_evals += ls_func_evals;
            self.func_evals += ls_func_evals;

            let max_step = direction.iter().fold(0.0_f32, |m, d| m.max((d * self.step_len).abs()));
            self.direction = Some(direction);

            if n_iter == max_iter || current_evals >= max_eval || opt_cond {
                break;
            }
            if max_step <= tolerance_change {
                break;
            }
            if (loss - self.prev_loss).abs() < tolerance_change {
                break;
            }
        }

        tracing::debug!(
            "L-BFGS step: {n_iter} iterations, {current_evals} evaluations, loss {loss:.6}"
        );

        Ok(orig_loss)
    }

    /// Record the latest curvature pair if it keeps the Hessian estimate
    /// positive definite.
    fn update_history(&mut self, flat_grad: &Array1<f32>, history_size: usize) {
        let (Some(prev_grad), Some(direction)) = (&self.prev_flat_grad, &self.direction) else {
            return;
        };

        let y = flat_grad - prev_grad;
        let s = direction * self.step_len;
        let ys = y.dot(&s);

        if ys > 1e-10 {
            if self.old_dirs.len() == history_size {
                self.old_dirs.pop_front();
                self.old_steps.pop_front();
                self.ro.pop_front();
            }
            self.h_diag = ys / y.dot(&y);
            self.old_dirs.push_back(y);
            self.old_steps.push_back(s);
            self.ro.push_back(1.0 / ys);
        }
    }

    /// Two-loop recursion: approximate `-H * g`.
    fn two_loop(&self, flat_grad: &Array1<f32>) -> Array1<f32> {
        let num_old = self.old_dirs.len();
        let mut al = vec![0.0_f32; num_old];

        let mut q = -flat_grad;
        for i in (0..num_old).rev() {
            al[i] = self.old_steps[i].dot(&q) * self.ro[i];
            q.scaled_add(-al[i], &self.old_dirs[i]);
        }

        let mut r = q * self.h_diag;
        for i in 0..num_old {
            let be_i = self.old_dirs[i].dot(&r) * self.ro[i];
            r.scaled_add(al[i] - be_i, &self.old_steps[i]);
        }
        r
    }
}

fn max_abs(values: &Array1<f32>) -> f32 {
    values.iter().fold(0.0_f32, |m, v| m.max(v.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    /// Loss `sum(a_i * (x_i - c_i)^2)` with gradients written to `p`.
    fn quadratic(p: &Param) -> f32 {
        let weights = [1.0_f32, 10.0];
        let centers = [2.0_f32, -1.0];
        p.zero_grad();
        let data = p.data().clone();
        let mut grad = Array1::<f32>::zeros(2);
        let mut loss = 0.0;
        for i in 0..2 {
            let diff = data[[i]] - centers[i];
            loss += weights[i] * diff * diff;
            grad[i] = 2.0 * weights[i] * diff;
        }
        p.accumulate_grad(&grad).unwrap();
        loss
    }

    #[test]
    fn test_converges_on_quadratic() {
        let p = Param::new(Array1::<f32>::zeros(2));
        let mut lbfgs = Lbfgs::new(
            vec![p.clone()],
            LbfgsConfig {
                lr: 1.0,
                max_iter: 50,
                ..LbfgsConfig::default()
            },
        )
        .unwrap();

        let first = lbfgs.step(|| Ok(quadratic(&p))).unwrap();
        assert!((first - 15.0).abs() < 1e-5);

        let data = p.data();
        assert!((data[[0]] - 2.0).abs() < 1e-2, "x0 = {}", data[[0]]);
        assert!((data[[1]] + 1.0).abs() < 1e-2, "x1 = {}", data[[1]]);
    }

    #[test]
    fn test_stops_at_max_iter() {
        let p = Param::new(Array1::<f32>::zeros(2));
        let mut lbfgs = Lbfgs::new(
            vec![p.clone()],
            LbfgsConfig {
                lr: 0.01,
                max_iter: 5,
                tolerance_grad: -1.0,
                tolerance_change: -1.0,
                ..LbfgsConfig::default()
            },
        )
        .unwrap();

        let mut calls = 0;
        lbfgs
            .step(|| {
                calls += 1;
                Ok(quadratic(&p))
            })
            .unwrap();

        assert_eq!(lbfgs.iterations(), 5);
        assert_eq!(calls, 5);
        assert_eq!(lbfgs.evaluations(), 5);
    }

    #[test]
    fn test_returns_early_at_optimum() {
        let p = Param::new(Array1::from_vec(vec![2.0_f32, -1.0]));
        let mut lbfgs = Lbfgs::new(vec![p.clone()], LbfgsConfig::default()).unwrap();
        let loss = lbfgs.step(|| Ok(quadratic(&p))).unwrap();

        assert!(loss.abs() < 1e-9);
        assert_eq!(lbfgs.iterations(), 0);
    }

    #[test]
    fn test_closure_error_propagates() {
        let p = Param::new(Array1::<f32>::zeros(2));
        let mut lbfgs = Lbfgs::new(vec![p], LbfgsConfig::default()).unwrap();
        let result = lbfgs.step(|| Err(Error::invalid("loss", "diverged")));
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_empty_history() {
        let config = LbfgsConfig {
            history_size: 0,
            ..LbfgsConfig::default()
        };
        assert!(Lbfgs::new(Vec::new(), config).is_err());
    }
}
