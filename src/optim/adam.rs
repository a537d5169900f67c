//! Adam with bias correction.

use ndarray::{ArrayD, Zip};

use crate::error::Result;
use crate::params::Param;

use super::Optimizer;

/// Adam optimizer (Kingma & Ba) with PyTorch's default hyperparameters.
#[derive(Debug)]
pub struct Adam {
    params: Vec<Param>,
    lr: f32,
    betas: (f32, f32),
    eps: f32,
    step: i32,
    exp_avg: Vec<ArrayD<f32>>,
    exp_avg_sq: Vec<ArrayD<f32>>,
}

impl Adam {
    pub const DEFAULT_BETAS: (f32, f32) = (0.9, 0.999);
    pub const DEFAULT_EPS: f32 = 1e-8;

    #[must_use]
    pub fn new(params: Vec<Param>, lr: f32) -> Self {
        Self::with_betas(params, lr, Self::DEFAULT_BETAS, Self::DEFAULT_EPS)
    }

    #[must_use]
    pub fn with_betas(params: Vec<Param>, lr: f32, betas: (f32, f32), eps: f32) -> Self {
        let exp_avg = params
            .iter()
            .map(|p| ArrayD::zeros(p.shape()))
            .collect();
        let exp_avg_sq = params
            .iter()
            .map(|p| ArrayD::zeros(p.shape()))
            .collect();
        Self {
            params,
            lr,
            betas,
            eps,
            step: 0,
            exp_avg,
            exp_avg_sq,
        }
    }

    /// Number of steps taken so far.
    #[must_use]
    pub const fn steps(&self) -> i32 {
        self.step
    }
}

impl Optimizer for Adam {
    fn params(&self) -> &[Param] {
        &self.params
    }

    fn step(&mut self) -> Result<()> {
        self.step = self.step.saturating_add(1);
        let (beta1, beta2) = self.betas;
        let bias_correction1 = 1.0 - beta1.powi(self.step);
        let bias_correction2 = 1.0 - beta2.powi(self.step);
        let step_size = self.lr / bias_correction1;
        let bias_correction2_sqrt = bias_correction2.sqrt();
        let eps = self.eps;

        for ((param, m), v) in self
            .params
            .iter()
            .zip(self.exp_avg.iter_mut())
            .zip(self.exp_avg_sq.iter_mut())
        {
            if !param.requires_grad() {
                continue;
            }
            let grad = param.grad();
            let mut data = param.data_mut();

            Zip::from(&mut *data)
                .and(m)
                .and(v)
                .and(&*grad)
                .for_each(|p, m, v, &g| {
                    *m = beta1.mul_add(*m, (1.0 - beta1) * g);
                    *v = beta2.mul_add(*v, (1.0 - beta2) * g * g);
                    let denom = v.sqrt() / bias_correction2_sqrt + eps;
                    *p -= step_size * *m / denom;
                });
        }

        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }
}
