//! Optimizers and the optimization loop.

mod adam;
mod lbfgs;
mod scheduler;

pub use adam::Adam;
pub use lbfgs::{Lbfgs, LbfgsConfig};
pub use scheduler::StepLr;

use std::fmt;
use std::str::FromStr;

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result};
use crate::params::Param;

/// Adam steps run before L-BFGS takes over.
pub const LBFGS_WARMUP_STEPS: usize = 100;

/// Adam learning rate used during the L-BFGS warm-up.
pub const LBFGS_WARMUP_LR: f32 = 0.001;

/// Learning-rate decay applied by the step scheduler.
pub const SCHEDULER_GAMMA: f32 = 0.5;

/// A first-order optimizer over a fixed set of parameters.
pub trait Optimizer {
    /// Parameters updated by [`Optimizer::step`].
    fn params(&self) -> &[Param];

    /// Apply one update from the accumulated gradients.
    ///
    /// # Errors
    ///
    /// Returns an error if the update cannot be applied.
    fn step(&mut self) -> Result<()>;

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32);

    /// Clear the gradients of every parameter.
    fn zero_grad(&self) {
        for param in self.params() {
            param.zero_grad();
        }
    }
}

/// Optimization strategy for [`optimize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizerKind {
    /// Adam for every iteration.
    #[default]
    Adam,
    /// Adam warm-up followed by a single L-BFGS run.
    Lbfgs,
}

impl FromStr for OptimizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "lbfgs" | "l-bfgs" => Ok(Self::Lbfgs),
            other => Err(Error::invalid(
                "optimizer",
                format!("expected `adam` or `LBFGS`, got {other:?}"),
            )),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adam => f.write_str("ADAM"),
            Self::Lbfgs => f.write_str("LBFGS"),
        }
    }
}

/// Run an optimization loop over `parameters`.
///
/// `closure` computes the loss and accumulates gradients into the
/// parameters; gradients are zeroed before every call. With
/// `scheduler_step` set, Adam's learning rate is halved every
/// `scheduler_step` iterations.
///
/// Returns the last loss evaluated, or `None` if the closure never ran.
///
/// # Errors
///
/// Returns an error if the settings are invalid or the closure fails.
pub fn optimize<F>(
    kind: OptimizerKind,
    parameters: &[Param],
    mut closure: F,
    lr: f32,
    num_iter: usize,
    scheduler_step: Option<usize>,
) -> Result<Option<f32>>
where
    F: FnMut() -> Result<f32>,
{
    if lr.is_nan() || lr <= 0.0 {
        return Err(Error::invalid("lr", "must be positive"));
    }
    if scheduler_step == Some(0) {
        return Err(Error::invalid("scheduler_step", "must be greater than 0"));
    }

    match kind {
        OptimizerKind::Lbfgs => {
            let mut adam = Adam::new(parameters.to_vec(), LBFGS_WARMUP_LR);
            let mut last = None;
            for _ in 0..LBFGS_WARMUP_STEPS {
                adam.zero_grad();
                last = Some(closure()?);
                adam.step()?;
            }

            tracing::info!("Starting optimization with {kind}");

            let mut lbfgs = Lbfgs::new(
                parameters.to_vec(),
                LbfgsConfig {
                    lr,
                    max_iter: num_iter,
                    tolerance_grad: -1.0,
                    tolerance_change: -1.0,
                    ..LbfgsConfig::default()
                },
            )?;

            let params = parameters.to_vec();
            lbfgs.step(|| {
                for param in &params {
                    param.zero_grad();
                }
                let loss = closure()?;
                last = Some(loss);
                Ok(loss)
            })?;

            Ok(last)
        }
        OptimizerKind::Adam => {
            tracing::info!("Starting optimization with {kind}");

            let mut adam = Adam::new(parameters.to_vec(), lr);
            let mut scheduler = scheduler_step
                .map(|step| StepLr::new(step, SCHEDULER_GAMMA))
                .transpose()?;

            let pb = ProgressBar::new(num_iter as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} Optimizing [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .expect("valid template")
                    .progress_chars("#>-"),
            );

            let mut last = None;
            for _ in 0..num_iter {
                adam.zero_grad();
                let loss = closure()?;
                adam.step()?;
                if let Some(scheduler) = scheduler.as_mut() {
                    scheduler.step(&mut adam);
                }

                pb.set_message(format!("loss {loss:.6}"));
                pb.inc(1);
                last = Some(loss);
            }

            pb.finish_with_message(last.map_or_else(String::new, |l| format!("loss {l:.6}")));
            Ok(last)
        }
    }
}
