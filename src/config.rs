use serde::{Deserialize, Serialize};

use crate::error::{FpnError, Result};

/// Scale names in configuration order.
pub const SCALES: [&str; 3] = ["large", "medium", "small"];

/// Channel widths of the neck, one entry per scale in (large, medium, small)
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpnConfig {
    /// Channels of the backbone feature maps.
    pub in_channels: Vec<usize>,
    /// Channels expected by the detection heads.
    pub out_channels: Vec<usize>,
}

impl Default for FpnConfig {
    fn default() -> Self {
        // Darknet-53 widths, 3 anchors x (20 VOC classes + 5)
        Self {
            in_channels: vec![1024, 512, 256],
            out_channels: vec![75, 75, 75],
        }
    }
}

impl FpnConfig {
    pub fn new(in_channels: Vec<usize>, out_channels: Vec<usize>) -> Self {
        Self {
            in_channels,
            out_channels,
        }
    }

    /// Output widths set to `anchors_per_scale * (num_classes + 5)` for every
    /// scale.
    pub fn detection(in_channels: Vec<usize>, anchors_per_scale: usize, num_classes: usize) -> Self {
        let per_scale = anchors_per_scale * (num_classes + 5);
        Self {
            in_channels,
            out_channels: vec![per_scale; 3],
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_triple("in_channels", &self.in_channels)?;
        check_triple("out_channels", &self.out_channels)
    }

    /// Validated view of the widths as fixed arrays.
    pub fn triples(&self) -> Result<([usize; 3], [usize; 3])> {
        self.validate()?;
        let fi = [self.in_channels[0], self.in_channels[1], self.in_channels[2]];
        let fo = [self.out_channels[0], self.out_channels[1], self.out_channels[2]];
        Ok((fi, fo))
    }

    pub fn from_yaml(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FpnConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

fn check_triple(name: &str, values: &[usize]) -> Result<()> {
    if values.len() != 3 {
        return Err(FpnError::Config(format!(
            "{} must have exactly 3 entries (large, medium, small), got {}",
            name,
            values.len()
        )));
    }
    if let Some(pos) = values.iter().position(|&v| v == 0) {
        return Err(FpnError::Config(format!(
            "{}[{}] ({} scale) must be positive",
            name, pos, SCALES[pos]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = FpnConfig::default();
        assert!(config.validate().is_ok());
        let (fi, fo) = config.triples().unwrap();
        assert_eq!(fi, [1024, 512, 256]);
        assert_eq!(fo, [75, 75, 75]);
    }

    #[test]
    fn test_detection_widths() {
        let config = FpnConfig::detection(vec![256, 384, 192], 3, 2);
        assert_eq!(config.out_channels, vec![21, 21, 21]);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let short = FpnConfig::new(vec![256, 384], vec![21, 21, 21]);
        assert!(matches!(short.validate(), Err(FpnError::Config(_))));

        let long = FpnConfig::new(vec![256, 384, 192], vec![21, 21, 21, 21]);
        assert!(matches!(long.validate(), Err(FpnError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_entry() {
        let config = FpnConfig::new(vec![256, 0, 192], vec![21, 21, 21]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("medium"));

        let config = FpnConfig::new(vec![256, 384, 192], vec![21, 21, 0]);
        assert!(matches!(config.triples(), Err(FpnError::Config(_))));
    }

    #[test]
    fn test_yaml_round_trip_on_disk() {
        let path = std::env::temp_dir().join(format!("fpn_config_{}.yaml", std::process::id()));
        let path = path.to_str().unwrap().to_string();

        let config = FpnConfig::new(vec![256, 384, 192], vec![21, 24, 27]);
        config.save(&path).unwrap();
        let loaded = FpnConfig::from_yaml(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_yaml_validates() {
        let path = std::env::temp_dir().join(format!("fpn_bad_{}.yaml", std::process::id()));
        std::fs::write(&path, "in_channels: [256, 384]\nout_channels: [21, 21, 21]\n").unwrap();
        let result = FpnConfig::from_yaml(path.to_str().unwrap());
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(FpnError::Config(_))));
    }
}
