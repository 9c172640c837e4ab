use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation;

use crate::model::init::WeightInit;

/// Convolution + batch norm + ReLU6.
#[derive(Module, Debug)]
pub struct Conv<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    pub(crate) bn: BatchNorm<B>,
}

impl<B: Backend> Conv<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
    ) -> Self {
        let padding = (kernel_size - 1) / 2;

        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_groups(groups)
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        activation::relu(x).clamp_max(6.0)
    }

    pub fn init_weights(self, init: &mut WeightInit, path: &str) -> Self {
        Self {
            conv: init.conv(&format!("{path}.conv"), self.conv),
            bn: init.norm(&format!("{path}.bn"), self.bn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, NdArray};
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_same_padding_keeps_spatial_dims() {
        let device = NdArrayDevice::default();
        let conv = Conv::<B>::new(&device, 8, 16, 3, 1, 1);
        let x = Tensor::<B, 4>::random([2, 8, 7, 5], Distribution::Default, &device);

        assert_eq!(conv.forward(x).dims(), [2, 16, 7, 5]);
    }

    #[test]
    fn test_output_is_clamped_to_relu6_range() {
        let device = NdArrayDevice::default();
        let conv = Conv::<B>::new(&device, 4, 4, 1, 1, 1);
        let x = Tensor::<B, 4>::random([1, 4, 6, 6], Distribution::Uniform(-50.0, 50.0), &device);

        let y: Vec<f32> = conv.forward(x).into_data().to_vec().unwrap();
        assert!(y.iter().all(|&v| (0.0..=6.0).contains(&v)));
    }
}
