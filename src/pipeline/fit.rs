//! Fitting an image from a coordinate or noise input.

use std::path::Path;

use ndarray::{Array4, ArrayView3, Axis, Ix4};
use rand::{rngs::StdRng, SeedableRng};

use crate::error::{Error, Result};
use crate::image::{self, ImageArray, ImageSize, DEFAULT_CROP_MULTIPLE};
use crate::input::{get_input, FreqSpec, InputMethod, NetInput, SpatialSize};
use crate::model::{mse_loss, Downsampler, Pointwise};
use crate::optim::{optimize, OptimizerKind};
use crate::params::{get_params, Module, Param};

/// Configuration for the fitting pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// How the network input is built.
    pub input_method: InputMethod,

    /// Channels of noise or mesh-grid inputs; ignored for Fourier inputs.
    pub input_depth: usize,

    /// Comma separated parameter groups to optimize (`net`, `down`, `input`).
    pub opt_over: String,

    /// Optimizer to run.
    pub optimizer: OptimizerKind,

    /// Learning rate.
    pub learning_rate: f32,

    /// Number of optimization iterations.
    pub num_iter: usize,

    /// Halve the learning rate every this many Adam iterations.
    pub scheduler_step: Option<usize>,

    /// Crop the target so its sides are multiples of this value.
    pub crop_multiple: u32,

    /// Output resolution relative to the target. Values above 1 fit the
    /// target through a learnable downsampler.
    pub factor: usize,

    /// Output JPEG quality (1-100).
    pub output_quality: u8,

    /// Random seed for reproducibility. None for random.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_method: InputMethod::Fourier(FreqSpec::default()),
            input_depth: 32,
            opt_over: "net".to_string(),
            optimizer: OptimizerKind::Adam,
            learning_rate: 0.01,
            num_iter: 2000,
            scheduler_step: None,
            crop_multiple: DEFAULT_CROP_MULTIPLE,
            factor: 1,
            output_quality: 95,
            seed: None,
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        match self.input_method {
            InputMethod::InferFreqs(_) => {
                return Err(Error::invalid(
                    "input_method",
                    "fitting needs an input map, not a frequency vector",
                ));
            }
            InputMethod::Fourier(spec) => spec.validate()?,
            InputMethod::MeshGrid if self.input_depth < 2 => {
                return Err(Error::invalid(
                    "input_depth",
                    "mesh grid inputs need a depth of at least 2",
                ));
            }
            InputMethod::Noise { .. } | InputMethod::MeshGrid => {}
        }

        if self.input_depth == 0 {
            return Err(Error::invalid("input_depth", "must be greater than 0"));
        }

        crate::params::parse_opt_over(&self.opt_over)?;

        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(Error::invalid("learning_rate", "must be positive"));
        }

        if self.num_iter == 0 {
            return Err(Error::invalid("num_iter", "must be greater than 0"));
        }

        if self.scheduler_step == Some(0) {
            return Err(Error::invalid("scheduler_step", "must be greater than 0"));
        }

        if self.crop_multiple == 0 {
            return Err(Error::invalid("crop_multiple", "must be greater than 0"));
        }

        if self.factor == 0 {
            return Err(Error::invalid("factor", "must be greater than 0"));
        }

        if !(1..=100).contains(&self.output_quality) {
            return Err(Error::invalid("output_quality", "must be between 1 and 100"));
        }

        Ok(())
    }
}

/// Outcome of a fitting run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitReport {
    /// Loss at the last evaluation.
    pub final_loss: Option<f32>,
    /// Width of the written image.
    pub width: usize,
    /// Height of the written image.
    pub height: usize,
}

/// Network, input and target for one fit.
pub struct FitProblem {
    net: Pointwise,
    downsampler: Option<Downsampler>,
    input: Param,
    target: ImageArray,
}

impl FitProblem {
    /// Build a problem that fits `target` from `input`.
    ///
    /// `input` is a `(1, C, H, W)` map at `factor` times the target
    /// resolution.
    ///
    /// # Errors
    ///
    /// Returns an error if the input and target sizes are inconsistent.
    pub fn new(
        input: Array4<f32>,
        target: ImageArray,
        factor: usize,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let (_, in_channels, height, width) = input.dim();
        let (channels, target_h, target_w) = target.dim();

        if height != target_h * factor || width != target_w * factor {
            return Err(Error::ShapeMismatch {
                expected: format!("{}x{} input", target_h * factor, target_w * factor),
                actual: format!("{height}x{width}"),
            });
        }

        let downsampler = if factor > 1 {
            Some(Downsampler::new(factor)?)
        } else {
            None
        };

        Ok(Self {
            net: Pointwise::new(in_channels, channels, rng),
            downsampler,
            input: Param::frozen(input),
            target,
        })
    }

    #[must_use]
    pub const fn net(&self) -> &Pointwise {
        &self.net
    }

    #[must_use]
    pub fn downsampler(&self) -> Option<&dyn Module> {
        self.downsampler.as_ref().map(|d| d as &dyn Module)
    }

    #[must_use]
    pub const fn input(&self) -> &Param {
        &self.input
    }

    /// Compute the loss and accumulate gradients into every tracked
    /// parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes are inconsistent.
    pub fn loss_and_grad(&self) -> Result<f32> {
        let input = self.input.data();
        let x = batch_view(&input)?;

        let out = self.net.forward(&x)?;
        let pred = match &self.downsampler {
            Some(down) => down.forward(&out.view())?,
            None => out.clone(),
        };

        let (loss, grad) = mse_loss(&pred, &self.target.view())?;

        let grad_out = match &self.downsampler {
            Some(down) => down.backward(&out.view(), &grad)?,
            None => grad,
        };

        let grad_in = self.net.backward(&x, &grad_out)?;
        self.input.accumulate_grad(&grad_in.insert_axis(Axis(0)))?;

        Ok(loss)
    }

    /// Full-resolution network output.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes are inconsistent.
    pub fn render(&self) -> Result<ImageArray> {
        let input = self.input.data();
        let x = batch_view(&input)?;
        self.net.forward(&x)
    }
}

fn batch_view(input: &ndarray::ArrayD<f32>) -> Result<ArrayView3<'_, f32>> {
    let batch = input
        .view()
        .into_dimensionality::<Ix4>()
        .map_err(|e| Error::ShapeMismatch {
            expected: "(1, C, H, W) input".to_string(),
            actual: e.to_string(),
        })?;
    if batch.len_of(Axis(0)) == 0 {
        return Err(Error::ShapeMismatch {
            expected: "batch of one".to_string(),
            actual: "empty batch".to_string(),
        });
    }
    Ok(batch.index_axis_move(Axis(0), 0))
}

/// Fits images by optimizing a network that maps an input map to pixels.
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        tracing::info!("Initializing pipeline with config: {config:?}");
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Fit the image at `target_path` and write the result to `output_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, optimization or saving fails.
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        target_path: P,
        output_path: Q,
    ) -> Result<FitReport> {
        let target_path = target_path.as_ref();
        let output_path = output_path.as_ref();

        tracing::info!("Processing image: {}", target_path.display());

        let (img, _) = image::get_image(target_path, ImageSize::Original)?;
        let img = image::crop_image(&img, self.config.crop_multiple)?;
        let target = image::image_to_array(&img);

        let mut rng = self
            .config
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

        let (_, height, width) = target.dim();
        let size = SpatialSize::new(height * self.config.factor, width * self.config.factor);

        tracing::info!(
            "Building {:?} input at {}x{}",
            self.config.input_method,
            size.width,
            size.height
        );
        let net_input = match get_input(
            self.config.input_depth,
            &self.config.input_method,
            size,
            &mut rng,
        )? {
            NetInput::Map(map) => map,
            NetInput::Frequencies(_) => {
                return Err(Error::invalid(
                    "input_method",
                    "fitting needs an input map, not a frequency vector",
                ))
            }
        };

        let problem = FitProblem::new(net_input, target, self.config.factor, &mut rng)?;
        let params = get_params(
            &self.config.opt_over,
            problem.net(),
            problem.input(),
            problem.downsampler(),
        )?;

        let final_loss = optimize(
            self.config.optimizer,
            &params,
            || problem.loss_and_grad(),
            self.config.learning_rate,
            self.config.num_iter,
            self.config.scheduler_step,
        )?;

        if let Some(loss) = final_loss {
            tracing::info!("Final loss: {loss:.6}");
        }

        let output = problem.render()?;
        tracing::info!("Saving output to: {}", output_path.display());
        image::save_image(&output, output_path, self.config.output_quality)?;

        tracing::info!("Processing complete");
        Ok(FitReport {
            final_loss,
            width: size.width,
            height: size.height,
        })
    }
}
