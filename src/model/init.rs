use burn::nn::conv::Conv2d;
use burn::nn::{BatchNorm, Linear};
use burn::prelude::*;
use burn::tensor::Distribution;

/// Kind tag of a parameterised unit, used to pick its initialization rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Convolution kernels (depthwise, pointwise and 1x1 projections).
    ConvKernel,
    /// Batch-norm scale and shift.
    NormScale,
    /// Fully-connected layers.
    Projection,
}

/// Weight-initialization pass.
///
/// Convolution kernels and fully-connected weights are drawn from
/// `N(0, std)`, their biases zeroed; norm scales are set to one and shifts to
/// zero. Modules walk their children and hand each unit to the matching
/// method. Running it again draws fresh weights.
pub struct WeightInit<'a> {
    std: f64,
    trace: Option<Box<dyn FnMut(&str, UnitKind) + 'a>>,
    counts: [usize; 3],
}

impl Default for WeightInit<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> WeightInit<'a> {
    pub fn new() -> Self {
        Self {
            std: 0.01,
            trace: None,
            counts: [0; 3],
        }
    }

    pub fn with_std(mut self, std: f64) -> Self {
        self.std = std;
        self
    }

    /// Called once per initialized unit with its path in the module tree.
    pub fn with_trace(mut self, trace: impl FnMut(&str, UnitKind) + 'a) -> Self {
        self.trace = Some(Box::new(trace));
        self
    }

    pub fn count(&self, kind: UnitKind) -> usize {
        self.counts[kind as usize]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn conv<B: Backend>(&mut self, path: &str, mut conv: Conv2d<B>) -> Conv2d<B> {
        let std = self.std;
        conv.weight = conv.weight.map(|w| normal_like(w, std));
        conv.bias = conv.bias.map(|bias| bias.map(zeros_like));
        self.visit(path, UnitKind::ConvKernel);
        conv
    }

    pub fn norm<B: Backend>(&mut self, path: &str, mut bn: BatchNorm<B>) -> BatchNorm<B> {
        bn.gamma = bn.gamma.map(ones_like);
        bn.beta = bn.beta.map(zeros_like);
        self.visit(path, UnitKind::NormScale);
        bn
    }

    pub fn linear<B: Backend>(&mut self, path: &str, mut linear: Linear<B>) -> Linear<B> {
        let std = self.std;
        linear.weight = linear.weight.map(|w| normal_like(w, std));
        linear.bias = linear.bias.map(|bias| bias.map(zeros_like));
        self.visit(path, UnitKind::Projection);
        linear
    }

    fn visit(&mut self, path: &str, kind: UnitKind) {
        self.counts[kind as usize] += 1;
        if let Some(trace) = self.trace.as_mut() {
            trace(path, kind);
        }
    }
}

// Fresh tensors are created untracked; keep the parameter's grad flag.
fn normal_like<B: Backend, const D: usize>(t: Tensor<B, D>, std: f64) -> Tensor<B, D> {
    let grad = t.is_require_grad();
    t.random_like(Distribution::Normal(0.0, std)).set_require_grad(grad)
}

fn zeros_like<B: Backend, const D: usize>(t: Tensor<B, D>) -> Tensor<B, D> {
    let grad = t.is_require_grad();
    t.zeros_like().set_require_grad(grad)
}

fn ones_like<B: Backend, const D: usize>(t: Tensor<B, D>) -> Tensor<B, D> {
    let grad = t.is_require_grad();
    t.ones_like().set_require_grad(grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
    use burn::nn::conv::Conv2dConfig;
    use burn::nn::{BatchNormConfig, LinearConfig};

    type B = NdArray<f32>;

    fn mean_and_std(values: &[f32]) -> (f32, f32) {
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        (mean, var.sqrt())
    }

    #[test]
    fn test_conv_weights_are_small_normal_and_bias_zero() {
        let device = NdArrayDevice::default();
        let conv: Conv2d<B> = Conv2dConfig::new([64, 64], [3, 3]).init(&device);

        let mut init = WeightInit::new();
        let conv = init.conv("conv", conv);

        let weights: Vec<f32> = conv.weight.val().into_data().to_vec().unwrap();
        let (mean, std) = mean_and_std(&weights);
        assert!(mean.abs() < 0.002, "mean {}", mean);
        assert!((std - 0.01).abs() < 0.002, "std {}", std);

        let bias: Vec<f32> = conv.bias.unwrap().val().into_data().to_vec().unwrap();
        assert!(bias.iter().all(|&b| b == 0.0));
        assert_eq!(init.count(UnitKind::ConvKernel), 1);
    }

    #[test]
    fn test_custom_std() {
        let device = NdArrayDevice::default();
        let conv: Conv2d<B> = Conv2dConfig::new([64, 64], [3, 3]).init(&device);

        let conv = WeightInit::new().with_std(0.1).conv("conv", conv);

        let weights: Vec<f32> = conv.weight.val().into_data().to_vec().unwrap();
        let (_, std) = mean_and_std(&weights);
        assert!((std - 0.1).abs() < 0.02, "std {}", std);
    }

    #[test]
    fn test_init_keeps_params_trainable() {
        type AB = Autodiff<NdArray<f32>>;
        let device = NdArrayDevice::default();
        let conv: Conv2d<AB> = Conv2dConfig::new([4, 4], [1, 1]).init(&device);
        let bn: BatchNorm<AB> = BatchNormConfig::new(4).init(&device);
        let linear: Linear<AB> = LinearConfig::new(4, 4).init(&device);

        let mut init = WeightInit::new();
        let conv = init.conv("conv", conv);
        let bn = init.norm("bn", bn);
        let linear = init.linear("fc", linear);

        assert!(conv.weight.val().is_require_grad());
        assert!(conv.bias.unwrap().val().is_require_grad());
        assert!(bn.gamma.val().is_require_grad());
        assert!(bn.beta.val().is_require_grad());
        assert!(linear.weight.val().is_require_grad());
        assert!(linear.bias.unwrap().val().is_require_grad());
    }

    #[test]
    fn test_norm_scale_one_shift_zero() {
        let device = NdArrayDevice::default();
        let mut bn: BatchNorm<B> = BatchNormConfig::new(8).init(&device);
        bn.gamma = bn.gamma.map(|g| g.add_scalar(3.0));
        bn.beta = bn.beta.map(|b| b.add_scalar(-2.0));

        let mut init = WeightInit::new();
        let bn = init.norm("bn", bn);

        let gamma: Vec<f32> = bn.gamma.val().into_data().to_vec().unwrap();
        let beta: Vec<f32> = bn.beta.val().into_data().to_vec().unwrap();
        assert_eq!(gamma, vec![1.0; 8]);
        assert_eq!(beta, vec![0.0; 8]);
    }

    #[test]
    fn test_linear_follows_projection_rule() {
        let device = NdArrayDevice::default();
        let linear: Linear<B> = LinearConfig::new(128, 64).init(&device);

        let mut init = WeightInit::new();
        let linear = init.linear("fc", linear);

        let weights: Vec<f32> = linear.weight.val().into_data().to_vec().unwrap();
        let (_, std) = mean_and_std(&weights);
        assert!((std - 0.01).abs() < 0.002, "std {}", std);
        let bias: Vec<f32> = linear.bias.unwrap().val().into_data().to_vec().unwrap();
        assert!(bias.iter().all(|&b| b == 0.0));
        assert_eq!(init.count(UnitKind::Projection), 1);
    }

    #[test]
    fn test_trace_sees_every_unit() {
        let device = NdArrayDevice::default();
        let conv: Conv2d<B> = Conv2dConfig::new([4, 4], [1, 1]).init(&device);
        let bn: BatchNorm<B> = BatchNormConfig::new(4).init(&device);

        let mut seen = Vec::new();
        {
            let mut init = WeightInit::new().with_trace(|path, kind| seen.push((path.to_string(), kind)));
            let _ = init.conv("block.conv", conv);
            let _ = init.norm("block.bn", bn);
            assert_eq!(init.total(), 2);
        }

        assert_eq!(
            seen,
            vec![
                ("block.conv".to_string(), UnitKind::ConvKernel),
                ("block.bn".to_string(), UnitKind::NormScale),
            ]
        );
    }
}
