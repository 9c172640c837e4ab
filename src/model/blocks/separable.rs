use burn::prelude::*;

use super::Conv;
use crate::model::init::WeightInit;

/// Depthwise 3x3 followed by pointwise 1x1, each with batch norm and ReLU6.
#[derive(Module, Debug)]
pub struct SeparableConv<B: Backend> {
    pub(crate) dw: Conv<B>,
    pub(crate) pw: Conv<B>,
}

impl<B: Backend> SeparableConv<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize, stride: usize) -> Self {
        Self {
            dw: Conv::new(device, in_channels, in_channels, 3, stride, in_channels),
            pw: Conv::new(device, in_channels, out_channels, 1, 1, 1),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.pw.forward(self.dw.forward(x))
    }

    pub fn init_weights(self, init: &mut WeightInit, path: &str) -> Self {
        Self {
            dw: self.dw.init_weights(init, &format!("{path}.dw")),
            pw: self.pw.init_weights(init, &format!("{path}.pw")),
        }
    }
}

/// Five stride-1 separable blocks alternating between `narrow` and `wide`
/// channels, ending on `narrow`.
pub fn conv_set<B: Backend>(
    device: &B::Device,
    in_channels: usize,
    narrow: usize,
    wide: usize,
) -> Vec<SeparableConv<B>> {
    let widths = [narrow, wide, narrow, wide, narrow];
    let mut blocks = Vec::with_capacity(widths.len());
    let mut channels = in_channels;
    for width in widths {
        blocks.push(SeparableConv::new(device, channels, width, 1));
        channels = width;
    }
    blocks
}
