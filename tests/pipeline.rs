use dipkit::grid::{save_image_grid, GridOptions};
use dipkit::image::{get_image, ImageSize};
use dipkit::input::{FreqSpec, InputMethod};
use dipkit::optim::OptimizerKind;
use dipkit::{Config, Pipeline};
use ndarray::Array3;

fn write_gradient_png(path: &std::path::Path, width: u32, height: u32) {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        let r = (x * 255 / width) as u8;
        #[allow(clippy::cast_possible_truncation)]
        let g = (y * 255 / height) as u8;
        image::Rgb([r, g, 128])
    });
    img.save(path).unwrap();
}

#[test]
fn fit_writes_cropped_output() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target.png");
    let output = dir.path().join("fit.png");
    write_gradient_png(&target, 40, 36);

    let config = Config {
        input_method: InputMethod::Fourier(FreqSpec {
            n_freqs: 2,
            ..FreqSpec::default()
        }),
        optimizer: OptimizerKind::Adam,
        learning_rate: 0.05,
        num_iter: 50,
        crop_multiple: 16,
        seed: Some(7),
        ..Config::default()
    };
    let mut pipeline = Pipeline::new(config).unwrap();
    let report = pipeline.process(&target, &output).unwrap();

    assert_eq!((report.width, report.height), (32, 32));
    assert!(report.final_loss.is_some_and(f32::is_finite));

    let (img, arr) = get_image(&output, ImageSize::Original).unwrap();
    assert_eq!((img.width(), img.height()), (32, 32));
    assert_eq!(arr.shape(), &[3, 32, 32]);
}

#[test]
fn fit_with_downsampler_writes_upscaled_output() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target.png");
    let output = dir.path().join("fit.png");
    write_gradient_png(&target, 16, 16);

    let config = Config {
        input_method: InputMethod::MeshGrid,
        input_depth: 4,
        opt_over: "down,net".to_string(),
        num_iter: 10,
        crop_multiple: 8,
        factor: 2,
        seed: Some(1),
        ..Config::default()
    };
    let report = Pipeline::new(config)
        .unwrap()
        .process(&target, &output)
        .unwrap();

    assert_eq!((report.width, report.height), (32, 32));
    let (img, _) = get_image(&output, ImageSize::Original).unwrap();
    assert_eq!((img.width(), img.height()), (32, 32));
}

#[test]
fn grid_file_is_upscaled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.png");
    let images = vec![Array3::from_elem((3, 8, 8), 0.5), Array3::from_elem((3, 8, 8), 1.0)];

    let options = GridOptions {
        factor: 2,
        ..GridOptions::default()
    };
    let grid = save_image_grid(&images, &options, &path).unwrap();
    assert_eq!(grid.shape(), &[3, 12, 22]);

    let written = image::open(&path).unwrap();
    assert_eq!((written.width(), written.height()), (44, 24));
}
