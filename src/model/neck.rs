use std::path::PathBuf;

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};

use crate::config::FpnConfig;
use crate::error::{FpnError, Result};
use crate::model::blocks::{conv_set, route, SeparableConv, Upsample2d, UpsampleMode};
use crate::model::init::{UnitKind, WeightInit};

/// Five-block conv set plus the detection path hanging off its route tensor.
#[derive(Module, Debug)]
pub struct ScaleStage<B: Backend> {
    conv_set: Vec<SeparableConv<B>>,
    expand: SeparableConv<B>,
    project: Conv2d<B>,
}

impl<B: Backend> ScaleStage<B> {
    fn new(
        device: &B::Device,
        in_channels: usize,
        narrow: usize,
        out_channels: usize,
    ) -> Self {
        let wide = narrow * 2;
        Self {
            conv_set: conv_set(device, in_channels, narrow, wide),
            expand: SeparableConv::new(device, narrow, wide, 1),
            project: Conv2dConfig::new([wide, out_channels], [1, 1]).init(device),
        }
    }

    /// Returns (route, detection output).
    fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let route = self
            .conv_set
            .iter()
            .fold(x, |x, block| block.forward(x));
        let out = self.project.forward(self.expand.forward(route.clone()));
        (route, out)
    }

    /// Input channels of the first block and output channels of the
    /// projection, read from the parameters.
    fn widths(&self) -> (Option<usize>, usize) {
        let input = self
            .conv_set
            .first()
            .map(|block| block.dw.conv.weight.val().dims()[0]);
        (input, self.project.weight.val().dims()[0])
    }

    fn init_weights(self, init: &mut WeightInit, path: &str) -> Self {
        let conv_set = self
            .conv_set
            .into_iter()
            .enumerate()
            .map(|(i, block)| block.init_weights(init, &format!("{path}.conv_set.{i}")))
            .collect();
        Self {
            conv_set,
            expand: self.expand.init_weights(init, &format!("{path}.expand")),
            project: init.conv(&format!("{path}.project"), self.project),
        }
    }
}

fn check_channels<B: Backend>(scale: &'static str, x: &Tensor<B, 4>, expected: usize) -> Result<()> {
    let actual = x.dims()[1];
    if actual != expected {
        return Err(FpnError::ChannelMismatch {
            scale,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Lowest resolution, widest input. Route at 512 channels, bridge at 256.
#[derive(Module, Debug)]
pub struct LargeBranch<B: Backend> {
    stage: ScaleStage<B>,
    bridge: SeparableConv<B>,
    in_channels: usize,
}

impl<B: Backend> LargeBranch<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Self {
            stage: ScaleStage::new(device, in_channels, 512, out_channels),
            bridge: SeparableConv::new(device, 512, 256, 1),
            in_channels,
        }
    }

    /// Returns (detection output, bridge).
    pub fn forward(&self, x: Tensor<B, 4>) -> Result<(Tensor<B, 4>, Tensor<B, 4>)> {
        check_channels("large", &x, self.in_channels)?;
        let (route, out) = self.stage.forward(x);
        let bridge = self.bridge.forward(route);
        log::debug!("large branch: out={:?} bridge={:?}", out.dims(), bridge.dims());
        Ok((out, bridge))
    }

    fn init_weights(self, init: &mut WeightInit) -> Self {
        Self {
            stage: self.stage.init_weights(init, "large"),
            bridge: self.bridge.init_weights(init, "large.bridge"),
            in_channels: self.in_channels,
        }
    }
}

/// Fuses the upsampled large bridge with the medium input. Route at 256
/// channels, bridge at 128.
#[derive(Module, Debug)]
pub struct MediumBranch<B: Backend> {
    upsample: Upsample2d,
    stage: ScaleStage<B>,
    bridge: SeparableConv<B>,
    in_channels: usize,
}

impl<B: Backend> MediumBranch<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Result<Self> {
        Ok(Self {
            upsample: Upsample2d::new(2, UpsampleMode::Nearest)?,
            stage: ScaleStage::new(device, in_channels + 256, 256, out_channels),
            bridge: SeparableConv::new(device, 256, 128, 1),
            in_channels,
        })
    }

    /// Upsamples `bridge` and places it after the medium input's channels.
    pub fn fuse(&self, x: Tensor<B, 4>, bridge: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        check_channels("medium", &x, self.in_channels)?;
        route(x, self.upsample.forward(bridge))
    }

    /// Returns (detection output, bridge).
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        bridge: Tensor<B, 4>,
    ) -> Result<(Tensor<B, 4>, Tensor<B, 4>)> {
        let fused = self.fuse(x, bridge)?;
        let (route, out) = self.stage.forward(fused);
        let bridge = self.bridge.forward(route);
        log::debug!("medium branch: out={:?} bridge={:?}", out.dims(), bridge.dims());
        Ok((out, bridge))
    }

    fn init_weights(self, init: &mut WeightInit) -> Self {
        Self {
            upsample: self.upsample,
            stage: self.stage.init_weights(init, "medium"),
            bridge: self.bridge.init_weights(init, "medium.bridge"),
            in_channels: self.in_channels,
        }
    }
}

/// Highest resolution. Fuses the upsampled medium bridge; route at 128
/// channels, no bridge.
#[derive(Module, Debug)]
pub struct SmallBranch<B: Backend> {
    upsample: Upsample2d,
    stage: ScaleStage<B>,
    in_channels: usize,
}

impl<B: Backend> SmallBranch<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Result<Self> {
        Ok(Self {
            upsample: Upsample2d::new(2, UpsampleMode::Nearest)?,
            stage: ScaleStage::new(device, in_channels + 128, 128, out_channels),
            in_channels,
        })
    }

    pub fn fuse(&self, x: Tensor<B, 4>, bridge: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        check_channels("small", &x, self.in_channels)?;
        route(x, self.upsample.forward(bridge))
    }

    pub fn forward(&self, x: Tensor<B, 4>, bridge: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let fused = self.fuse(x, bridge)?;
        let (_, out) = self.stage.forward(fused);
        log::debug!("small branch: out={:?}", out.dims());
        Ok(out)
    }

    fn init_weights(self, init: &mut WeightInit) -> Self {
        Self {
            upsample: self.upsample,
            stage: self.stage.init_weights(init, "small"),
            in_channels: self.in_channels,
        }
    }
}

/// YOLOv3 feature pyramid neck.
///
/// Takes backbone features in (large, medium, small) order, where large is
/// the coarsest map, and returns detection-ready maps in (small, medium,
/// large) order.
#[derive(Module, Debug)]
pub struct FpnYolov3<B: Backend> {
    pub large: LargeBranch<B>,
    pub medium: MediumBranch<B>,
    pub small: SmallBranch<B>,
}

impl<B: Backend> FpnYolov3<B> {
    /// Builds the neck and runs the default weight initialization.
    pub fn new(device: &B::Device, config: &FpnConfig) -> Result<Self> {
        Self::with_init(device, config, &mut WeightInit::new())
    }

    /// Builds the neck and initializes it with `init`.
    pub fn with_init(device: &B::Device, config: &FpnConfig, init: &mut WeightInit) -> Result<Self> {
        Ok(Self::build(device, config)?.init_weights(init))
    }

    /// Module tree for `config` with the framework's default parameters.
    fn build(device: &B::Device, config: &FpnConfig) -> Result<Self> {
        let ([fi_0, fi_1, fi_2], [fo_0, fo_1, fo_2]) = config.triples()?;

        Ok(Self {
            large: LargeBranch::new(device, fi_0, fo_0),
            medium: MediumBranch::new(device, fi_1, fo_1)?,
            small: SmallBranch::new(device, fi_2, fo_2)?,
        })
    }

    /// Applies `init` to every convolution and batch norm in the tree.
    pub fn init_weights(self, init: &mut WeightInit) -> Self {
        log::info!("Initializing FPN_YOLOV3 weights");

        let neck = Self {
            large: self.large.init_weights(init),
            medium: self.medium.init_weights(init),
            small: self.small.init_weights(init),
        };

        log::info!(
            "Initialized {} conv kernels, {} norm layers",
            init.count(UnitKind::ConvKernel),
            init.count(UnitKind::NormScale)
        );
        neck
    }

    /// Returns (small, medium, large) outputs.
    pub fn forward(
        &self,
        x_large: Tensor<B, 4>,
        x_medium: Tensor<B, 4>,
        x_small: Tensor<B, 4>,
    ) -> Result<(Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>)> {
        // Fail before any convolution runs
        check_channels("medium", &x_medium, self.medium.in_channels)?;
        check_channels("small", &x_small, self.small.in_channels)?;

        let (out_large, bridge) = self.large.forward(x_large)?;
        let (out_medium, bridge) = self.medium.forward(x_medium, bridge)?;
        let out_small = self.small.forward(x_small, bridge)?;

        Ok((out_small, out_medium, out_large))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(self.clone().into_record(), PathBuf::from(path))
            .map_err(|e| FpnError::Record(format!("Failed to save weights: {:?}", e)))
    }

    /// Builds a neck for `config` and loads weights saved by [`Self::save`].
    pub fn load(device: &B::Device, config: &FpnConfig, path: &str) -> Result<Self> {
        let neck = Self::build(device, config)?;
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(PathBuf::from(path), device)
            .map_err(|e| FpnError::Record(format!("Failed to load weights: {:?}", e)))?;
        let neck = neck.load_record(record);
        neck.check_widths(config)?;
        Ok(neck)
    }

    /// Loaded records are not shape-checked; compare the first fused conv and
    /// the projection of every branch against `config`.
    fn check_widths(&self, config: &FpnConfig) -> Result<()> {
        let ([fi_0, fi_1, fi_2], [fo_0, fo_1, fo_2]) = config.triples()?;
        let stages = [
            ("large", &self.large.stage, fi_0, fo_0),
            ("medium", &self.medium.stage, fi_1 + 256, fo_1),
            ("small", &self.small.stage, fi_2 + 128, fo_2),
        ];

        for (scale, stage, expected_in, expected_out) in stages {
            let (actual_in, actual_out) = stage.widths();
            if (actual_in, actual_out) != (Some(expected_in), expected_out) {
                return Err(FpnError::Record(format!(
                    "{} weights are {:?} -> {} channels, config expects {} -> {}",
                    scale, actual_in, actual_out, expected_in, expected_out
                )));
            }
        }
        Ok(())
    }
}
