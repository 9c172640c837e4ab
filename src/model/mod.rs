pub mod blocks;
pub mod init;
pub mod neck;

pub use init::{UnitKind, WeightInit};
pub use neck::{FpnYolov3, LargeBranch, MediumBranch, SmallBranch};
