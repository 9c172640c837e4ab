use burn::prelude::*;

use crate::error::{FpnError, Result};

/// Interpolation used by [`Upsample2d`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsampleMode {
    #[default]
    Nearest,
}

#[derive(Module, Debug, Clone)]
pub struct Upsample2d {
    scale_factor: usize,
}

impl Upsample2d {
    /// Nearest neighbour is the only mode, so it is not stored.
    pub fn new(scale_factor: usize, mode: UpsampleMode) -> Result<Self> {
        if scale_factor == 0 {
            return Err(FpnError::ShapeMismatch {
                op: "upsample",
                detail: "scale factor must be positive".to_string(),
            });
        }
        match mode {
            UpsampleMode::Nearest => Ok(Self { scale_factor }),
        }
    }

    /// Nearest-neighbor upsample using reshape and repeat
    /// [B, C, H, W] -> [B, C, H*scale, W*scale]
    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();
        let s = self.scale_factor;

        // [B, C, H, 1, W, 1] -> [B, C, H, s, W, s]
        let x = x.reshape([batch, channels, height, 1, width, 1]);
        let x = x.repeat_dim(3, s);
        let x = x.repeat_dim(5, s);

        x.reshape([batch, channels, height * s, width * s])
    }
}
