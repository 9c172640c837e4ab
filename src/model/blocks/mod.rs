pub mod concat;
pub mod conv;
pub mod separable;
pub mod upsample;

pub use concat::route;
pub use conv::Conv;
pub use separable::{conv_set, SeparableConv};
pub use upsample::{Upsample2d, UpsampleMode};
