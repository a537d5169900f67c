//! Image fitting pipeline built on the input, model and optimizer modules.

mod fit;

pub use fit::{Config, FitProblem, FitReport, Pipeline};
