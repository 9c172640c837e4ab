pub mod config;
pub mod error;
pub mod model;

// Re-exports for convenience
pub use config::FpnConfig;
pub use error::{FpnError, Result};
pub use model::{FpnYolov3, UnitKind, WeightInit};
