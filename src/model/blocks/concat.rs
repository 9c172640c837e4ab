use burn::prelude::*;

use crate::error::{FpnError, Result};

/// Concatenates `current` and `previous` on the channel dim, `current` first.
///
/// The resulting channel layout is what the following convolution weights are
/// trained against, so the argument order is part of the contract.
pub fn route<B: Backend>(current: Tensor<B, 4>, previous: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
    let [cb, _, ch, cw] = current.dims();
    let [pb, _, ph, pw] = previous.dims();

    if cb != pb {
        return Err(FpnError::ShapeMismatch {
            op: "route",
            detail: format!("batch {} vs {}", cb, pb),
        });
    }
    if (ch, cw) != (ph, pw) {
        return Err(FpnError::ShapeMismatch {
            op: "route",
            detail: format!("spatial {}x{} vs {}x{}", ch, cw, ph, pw),
        });
    }

    Ok(Tensor::cat(vec![current, previous], 1))
}
