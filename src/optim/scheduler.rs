//! Step learning-rate decay.

use super::Optimizer;
use crate::error::{Error, Result};

/// Multiplies the learning rate by `gamma` every `step_size` epochs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLr {
    step_size: usize,
    gamma: f32,
    last_epoch: usize,
}

impl StepLr {
    /// # Errors
    ///
    /// Returns an error if `step_size` is zero or `gamma` is not positive.
    pub fn new(step_size: usize, gamma: f32) -> Result<Self> {
        if step_size == 0 {
            return Err(Error::invalid("step_size", "must be greater than 0"));
        }
        if gamma.is_nan() || gamma <= 0.0 {
            return Err(Error::invalid("gamma", "must be positive"));
        }
        Ok(Self {
            step_size,
            gamma,
            last_epoch: 0,
        })
    }

    /// Advance one epoch, decaying the optimizer's learning rate when a
    /// boundary is crossed.
    pub fn step<O: Optimizer + ?Sized>(&mut self, optimizer: &mut O) {
        self.last_epoch += 1;
        if self.last_epoch % self.step_size == 0 {
            let lr = optimizer.learning_rate() * self.gamma;
            tracing::debug!("Epoch {}: learning rate -> {lr:e}", self.last_epoch);
            optimizer.set_learning_rate(lr);
        }
    }

    #[must_use]
    pub const fn last_epoch(&self) -> usize {
        self.last_epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::Adam;

    #[test]
    fn test_halves_every_step_size() {
        let mut adam = Adam::new(Vec::new(), 0.8);
        let mut scheduler = StepLr::new(3, 0.5).unwrap();

        let mut rates = Vec::new();
        for _ in 0..7 {
            scheduler.step(&mut adam);
            rates.push(adam.learning_rate());
        }

        assert_eq!(rates, vec![0.8, 0.8, 0.4, 0.4, 0.4, 0.2, 0.2]);
        assert_eq!(scheduler.last_epoch(), 7);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        assert!(matches!(
            StepLr::new(0, 0.5),
            Err(Error::InvalidParameter { name, .. }) if name == "step_size"
        ));
        assert!(StepLr::new(3, 0.0).is_err());
        assert!(StepLr::new(3, f32::NAN).is_err());
    }
}
