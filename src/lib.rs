//! # dipkit
//!
//! Building blocks for deep-image-prior style image fitting: image loading and
//! conversion, network-input synthesis (noise, coordinate grids, Fourier
//! features), parameter selection, optimization loops, and image grids.
//!
//! ## Example
//!
//! ```no_run
//! use dipkit::{Config, Pipeline};
//!
//! # fn main() -> dipkit::Result<()> {
//! let config = Config::default();
//! let mut pipeline = Pipeline::new(config)?;
//!
//! pipeline.process("target.png", "fit.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! Inputs can also be generated directly:
//!
//! ```
//! use dipkit::input::{get_input, FreqSpec, InputMethod, SpatialSize};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! # fn main() -> dipkit::Result<()> {
//! let mut rng = StdRng::seed_from_u64(0);
//! let spec = FreqSpec { n_freqs: 4, ..FreqSpec::default() };
//! let input = get_input(0, &InputMethod::Fourier(spec), SpatialSize::new(32, 48), &mut rng)?;
//! assert_eq!(input.into_map().unwrap().shape(), &[1, 16, 32, 48]);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod grid;
pub mod image;
pub mod input;
pub mod model;
pub mod optim;
pub mod params;
pub mod pipeline;

pub use error::{Error, Result};
pub use pipeline::{Config, Pipeline};
