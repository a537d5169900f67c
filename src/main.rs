//! dipkit CLI - crop images, render network inputs and grids, and fit images.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use ndarray::Axis;
use rand::{rngs::StdRng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dipkit::grid::{save_image_grid, GridOptions};
use dipkit::image::{self, ImageArray, ImageSize, Interpolation};
use dipkit::input::{get_input, FreqMethod, FreqSpec, InputMethod, NetInput, NoiseKind, SpatialSize};
use dipkit::optim::OptimizerKind;
use dipkit::{Config, Pipeline};

/// Image-prior toolkit: network inputs, image grids, and image fitting.
#[derive(Parser, Debug)]
#[command(name = "dipkit")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Centre-crop an image so its sides are multiples of a divisor.
    Crop {
        /// Input image path.
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output image path.
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Divisor for both sides.
        #[arg(short, long, default_value = "32", value_name = "INT")]
        multiple: u32,
    },

    /// Render the channels of a network input as an image grid.
    Input {
        /// Output image path.
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Input height.
        #[arg(long, default_value = "64", value_name = "INT")]
        height: usize,

        /// Input width.
        #[arg(long, default_value = "64", value_name = "INT")]
        width: usize,

        #[command(flatten)]
        input: InputArgs,

        /// Images per grid row.
        #[arg(long, default_value = "8", value_name = "INT")]
        nrow: usize,

        /// Random seed for reproducibility.
        #[arg(long, value_name = "INT")]
        seed: Option<u64>,
    },

    /// Arrange images into a single grid image.
    Grid {
        /// Images to arrange.
        #[arg(value_name = "IMAGES", required = true)]
        images: Vec<PathBuf>,

        /// Output image path.
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,

        /// Images per row.
        #[arg(long, default_value = "8", value_name = "INT")]
        nrow: usize,

        /// Padding between images in pixels.
        #[arg(long, default_value = "2", value_name = "INT")]
        padding: usize,

        /// Integer upscaling factor for the written grid.
        #[arg(long, default_value = "1", value_name = "INT")]
        factor: u32,

        /// Upscaling filter (nearest, bilinear, bicubic, gaussian, lanczos).
        #[arg(long, default_value = "lanczos", value_name = "FILTER")]
        interpolation: String,

        /// Resize every image to a square of this side before arranging.
        #[arg(long, value_name = "INT")]
        size: Option<u32>,
    },

    /// Fit an image by optimizing a network over a generated input.
    Fit {
        /// Target image path.
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        /// Output image path.
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        #[command(flatten)]
        input: InputArgs,

        /// Parameter groups to optimize: net, down, input (comma separated; down drops groups listed before it).
        #[arg(long, default_value = "net", value_name = "LIST")]
        opt_over: String,

        /// Optimizer: adam or LBFGS.
        #[arg(long, default_value = "adam", value_name = "NAME")]
        optimizer: String,

        /// Learning rate.
        #[arg(long, default_value = "0.01", value_name = "FLOAT")]
        lr: f32,

        /// Number of iterations.
        #[arg(long, default_value = "2000", value_name = "INT")]
        iters: usize,

        /// Halve the learning rate every this many iterations.
        #[arg(long, value_name = "INT")]
        scheduler_step: Option<usize>,

        /// Crop the target to multiples of this value.
        #[arg(long, default_value = "32", value_name = "INT")]
        crop: u32,

        /// Output upscaling factor relative to the target.
        #[arg(long, default_value = "1", value_name = "INT")]
        factor: usize,

        /// Output JPEG quality (1-100).
        #[arg(short, long, default_value = "95", value_name = "INT")]
        quality: u8,

        /// Random seed for reproducibility.
        #[arg(long, value_name = "INT")]
        seed: Option<u64>,
    },
}

/// Options shared by commands that build a network input.
#[derive(ClapArgs, Debug)]
struct InputArgs {
    /// Input kind: noise, meshgrid or fourier.
    #[arg(long, default_value = "fourier", value_name = "METHOD")]
    method: String,

    /// Channels for noise and meshgrid inputs.
    #[arg(long, default_value = "32", value_name = "INT")]
    depth: usize,

    /// Noise distribution: u (uniform) or n (normal).
    #[arg(long, default_value = "u", value_name = "KIND")]
    noise_type: String,

    /// Noise scale.
    #[arg(long, default_value = "0.1", value_name = "FLOAT")]
    var: f32,

    /// Frequency spacing for Fourier inputs.
    #[arg(long, default_value = "log", value_name = "METHOD")]
    freq_method: String,

    /// Frequency base for Fourier inputs.
    #[arg(long, default_value = "2.0", value_name = "FLOAT")]
    base: f32,

    /// Number of frequencies for Fourier inputs.
    #[arg(long, default_value = "8", value_name = "INT")]
    n_freqs: usize,

    /// Use only cosine features.
    #[arg(long)]
    cosine_only: bool,
}

impl InputArgs {
    fn method(&self) -> Result<InputMethod> {
        let method = match self.method.as_str() {
            "noise" => InputMethod::Noise {
                kind: self.noise_type.parse::<NoiseKind>()?,
                var: self.var,
            },
            "meshgrid" => InputMethod::MeshGrid,
            "fourier" => InputMethod::Fourier(FreqSpec {
                method: self.freq_method.parse::<FreqMethod>()?,
                base: self.base,
                n_freqs: self.n_freqs,
                cosine_only: self.cosine_only,
            }),
            other => anyhow::bail!("Unknown input method {other:?} (expected noise, meshgrid or fourier)"),
        };
        Ok(method)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("dipkit={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    match &args.command {
        Command::Crop {
            input,
            output,
            multiple,
        } => {
            let img = image::load(input)
                .with_context(|| format!("Failed to load {}", input.display()))?;
            let cropped = image::crop_image(&img, *multiple).context("Failed to crop image")?;
            let arr = image::image_to_array(&cropped);
            image::save_image(&arr, output, 95).context("Failed to save image")?;

            println!(
                "Cropped {}x{} -> {}x{}: {}",
                img.width(),
                img.height(),
                cropped.width(),
                cropped.height(),
                output.display()
            );
        }
        Command::Input {
            output,
            height,
            width,
            input,
            nrow,
            seed,
        } => {
            let method = input.method()?;
            let mut rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

            let map = match get_input(input.depth, &method, SpatialSize::new(*height, *width), &mut rng)
                .context("Failed to build network input")?
            {
                NetInput::Map(map) => map,
                NetInput::Frequencies(_) => anyhow::bail!("Input method produced no map"),
            };

            let channels: Vec<ImageArray> = map
                .index_axis(Axis(0), 0)
                .axis_iter(Axis(0))
                .map(|channel| normalize(&channel.insert_axis(Axis(0)).to_owned()))
                .collect();

            let options = GridOptions {
                nrow: *nrow,
                ..GridOptions::default()
            };
            save_image_grid(&channels, &options, output).context("Failed to write input grid")?;

            println!("Wrote {} input channels to {}", channels.len(), output.display());
        }
        Command::Grid {
            images,
            output,
            nrow,
            padding,
            factor,
            interpolation,
            size,
        } => {
            let size = size.map_or(ImageSize::Original, ImageSize::Square);
            let arrays = images
                .iter()
                .map(|path| {
                    image::get_image(path, size)
                        .map(|(_, arr)| arr)
                        .with_context(|| format!("Failed to load {}", path.display()))
                })
                .collect::<Result<Vec<_>>>()?;

            let options = GridOptions {
                nrow: *nrow,
                padding: *padding,
                factor: *factor,
                interpolation: interpolation.parse::<Interpolation>()?,
                ..GridOptions::default()
            };
            save_image_grid(&arrays, &options, output).context("Failed to write grid")?;

            println!("Wrote {}-image grid to {}", arrays.len(), output.display());
        }
        Command::Fit {
            target,
            output,
            input,
            opt_over,
            optimizer,
            lr,
            iters,
            scheduler_step,
            crop,
            factor,
            quality,
            seed,
        } => {
            // Validate input file exists
            if !target.exists() {
                anyhow::bail!("Input file does not exist: {}", target.display());
            }

            // Build configuration
            let config = Config {
                input_method: input.method()?,
                input_depth: input.depth,
                opt_over: opt_over.clone(),
                optimizer: optimizer.parse::<OptimizerKind>()?,
                learning_rate: *lr,
                num_iter: *iters,
                scheduler_step: *scheduler_step,
                crop_multiple: *crop,
                factor: *factor,
                output_quality: *quality,
                seed: *seed,
            };

            let mut pipeline = Pipeline::new(config).context("Failed to initialize pipeline")?;

            let report = pipeline
                .process(target, output)
                .context("Failed to fit image")?;

            println!(
                "Successfully fitted {} -> {} ({}x{}, final loss {})",
                target.display(),
                output.display(),
                report.width,
                report.height,
                report
                    .final_loss
                    .map_or_else(|| "n/a".to_string(), |l| format!("{l:.6}"))
            );
        }
    }

    Ok(())
}

/// Stretch a single-channel map to [0, 1] for display.
fn normalize(channel: &ImageArray) -> ImageArray {
    let min = channel.iter().copied().fold(f32::INFINITY, f32::min);
    let max = channel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range > f32::EPSILON {
        channel.mapv(|v| (v - min) / range)
    } else {
        channel.mapv(|_| 0.5)
    }
}
