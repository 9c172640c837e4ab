use anyhow::Context;
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use burn::prelude::*;
use burn::tensor::Distribution;
use clap::Parser;

use yolov3_fpn::{FpnConfig, FpnYolov3, UnitKind, WeightInit};

type BackendType = NdArray;

/// Build the YOLOv3 FPN neck and run it once on random feature maps.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML file with `in_channels` and `out_channels`
    #[arg(short, long)]
    config: Option<String>,

    /// Backbone channels (large,medium,small), used without --config
    #[arg(long, value_delimiter = ',', default_value = "256,384,192")]
    in_channels: Vec<usize>,

    /// Head channels (large,medium,small), used without --config
    #[arg(long, value_delimiter = ',', default_value = "21,21,21")]
    out_channels: Vec<usize>,

    /// Spatial size of the large-scale map; medium and small are 2x and 4x
    #[arg(short, long, default_value_t = 13)]
    size: usize,

    /// Batch size
    #[arg(short, long, default_value_t = 1)]
    batch: usize,

    /// Seed for weight init and inputs
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Standard deviation of the initial conv kernels
    #[arg(long, default_value_t = 0.01)]
    init_std: f64,

    /// Weights saved by an earlier --save
    #[arg(short, long)]
    weights: Option<String>,

    /// Save weights to this path (".bin" is appended)
    #[arg(long)]
    save: Option<String>,

    /// Log every initialized unit
    #[arg(long)]
    trace_init: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => FpnConfig::from_yaml(path).with_context(|| format!("loading {}", path))?,
        None => FpnConfig::new(args.in_channels.clone(), args.out_channels.clone()),
    };
    let (fi, _) = config.triples()?;

    let device = NdArrayDevice::default();
    BackendType::seed(&device, args.seed);

    let neck = match &args.weights {
        Some(path) => FpnYolov3::<BackendType>::load(&device, &config, path)
            .with_context(|| format!("loading weights from {}", path))?,
        None => {
            let trace_init = args.trace_init;
            let mut init = WeightInit::new().with_std(args.init_std).with_trace(move |path, kind| {
                if trace_init {
                    log::info!("  init {:<32} {:?}", path, kind);
                }
            });
            let neck = FpnYolov3::<BackendType>::with_init(&device, &config, &mut init)?;
            log::info!(
                "Initialized {} units ({} conv, {} norm)",
                init.total(),
                init.count(UnitKind::ConvKernel),
                init.count(UnitKind::NormScale)
            );
            neck
        }
    };

    println!("YOLOv3 FPN neck");
    println!("  in_channels  : {:?}", config.in_channels);
    println!("  out_channels : {:?}", config.out_channels);
    println!("  parameters   : {}", neck.num_params());
    println!();

    let s = args.size;
    let b = args.batch;
    let x_large = Tensor::<BackendType, 4>::random([b, fi[0], s, s], Distribution::Default, &device);
    let x_medium =
        Tensor::<BackendType, 4>::random([b, fi[1], s * 2, s * 2], Distribution::Default, &device);
    let x_small =
        Tensor::<BackendType, 4>::random([b, fi[2], s * 4, s * 4], Distribution::Default, &device);

    let (small, medium, large) = neck.forward(x_large, x_medium, x_small)?;

    println!("Outputs (small, medium, large):");
    println!("  small  : {:?}", small.dims());
    println!("  medium : {:?}", medium.dims());
    println!("  large  : {:?}", large.dims());

    if let Some(path) = &args.save {
        neck.save(path)
            .with_context(|| format!("saving weights to {}", path))?;
        println!();
        println!("Weights saved: {}.bin", path);
    }

    Ok(())
}
