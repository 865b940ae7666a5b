use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{error::FlowError, video::VideoFormat};

/// Runtime parameters of the flow analyzer.
///
/// Deserialized from a JSON object with camelCase keys. Missing keys take
/// their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlowConfig {
    /// Upper bound on tracked points per field.
    pub max_points: usize,
    /// Keep every Nth luminance sample horizontally. `0` disables analysis.
    pub decimate: usize,
    /// Coverage grid cell size for discovery, in decimated pixels.
    pub discovery_grid_spacing: usize,
    /// Uniform jitter applied to discovered candidates, in pixels per axis.
    pub discovery_jitter: f32,
    /// Fields a new point is kept without contributing to the flow.
    pub point_trial_period: u32,
    /// Fields after which a point is always evicted.
    pub max_point_age: u32,
    /// Average speed below which a point past its trial period is evicted.
    pub min_point_speed: f32,
    /// Minimum normalized eigenvalue of the tracking window.
    pub min_eig_threshold: f32,
    /// Probability of each successive random eviction per field.
    pub delete_point_probability: f32,
    /// Enable verbose logging and diagnostic image dumps.
    pub debug: bool,
    /// Write a diagnostic image every this many completed fields.
    pub debug_frame_interval: u32,
    /// Directory receiving diagnostic images, the working directory if unset.
    pub debug_path: Option<PathBuf>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_points: 50,
            decimate: 3,
            discovery_grid_spacing: 6,
            discovery_jitter: 0.0,
            point_trial_period: 15,
            max_point_age: 300,
            min_point_speed: 0.1,
            min_eig_threshold: 0.007,
            delete_point_probability: 0.0,
            debug: false,
            debug_frame_interval: 1,
            debug_path: None,
        }
    }
}

impl FlowConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build a configuration from an already parsed JSON value, such as the
    /// `flow` member of a larger document.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, FlowError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Read and parse a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|source| FlowError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json_str(&contents)
    }

    /// Directory diagnostic images go to, `None` when debugging is off.
    pub fn debug_dir(&self) -> Option<&Path> {
        if !self.debug {
            return None;
        }
        Some(self.debug_path.as_deref().unwrap_or(Path::new(".")))
    }

    /// Whether the analyzer should do any work with this configuration.
    pub fn is_enabled(&self) -> bool {
        self.decimate > 0
    }

    /// Check the configuration against the video format it will run on.
    pub fn validate(&self, format: &VideoFormat) -> Result<(), FlowError> {
        if self.decimate > format.pixels_per_line {
            return Err(FlowError::InvalidConfig(format!(
                "decimate {} exceeds {} pixels per line",
                self.decimate, format.pixels_per_line
            )));
        }
        if self.discovery_grid_spacing == 0 {
            return Err(FlowError::InvalidConfig(
                "discoveryGridSpacing must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.delete_point_probability) {
            return Err(FlowError::InvalidConfig(format!(
                "deletePointProbability {} is not in [0, 1]",
                self.delete_point_probability
            )));
        }
        if !self.discovery_jitter.is_finite() || self.discovery_jitter < 0.0 {
            return Err(FlowError::InvalidConfig(format!(
                "discoveryJitter {} must be finite and non negative",
                self.discovery_jitter
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_partial_json_keeps_defaults() -> Result<(), FlowError> {
        let config = FlowConfig::from_json_str(r#"{ "maxPoints": 12, "minPointSpeed": 0.5 }"#)?;

        assert_eq!(config.max_points, 12);
        assert_relative_eq!(config.min_point_speed, 0.5);
        assert_eq!(config.decimate, 3);
        assert_eq!(config.point_trial_period, 15);
        assert_eq!(config.debug_path, None);

        Ok(())
    }

    #[test]
    fn test_from_json_value() -> Result<(), FlowError> {
        let doc: serde_json::Value = serde_json::from_str(
            r#"{
                "effects": [],
                "flow": {
                    "decimate": 2,
                    "discoveryGridSpacing": 8,
                    "deletePointProbability": 0.01,
                    "debug": true,
                    "debugFrameInterval": 30,
                    "debugPath": "/tmp/flow"
                }
            }"#,
        )?;

        let config = FlowConfig::from_json_value(doc["flow"].clone())?;

        assert_eq!(config.decimate, 2);
        assert_eq!(config.discovery_grid_spacing, 8);
        assert!(config.debug);
        assert_eq!(config.debug_frame_interval, 30);
        assert_eq!(config.debug_path, Some(PathBuf::from("/tmp/flow")));

        Ok(())
    }

    #[test]
    fn test_from_json_file() -> Result<(), FlowError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("flow.json");
        std::fs::write(&path, r#"{ "maxPointAge": 120 }"#)?;

        let config = FlowConfig::from_json_file(&path)?;
        assert_eq!(config.max_point_age, 120);

        assert!(matches!(
            FlowConfig::from_json_file(dir.path().join("missing.json")),
            Err(FlowError::ConfigRead { .. })
        ));

        Ok(())
    }

    #[test]
    fn test_debug_dir() {
        let mut config = FlowConfig {
            debug_path: Some(PathBuf::from("/tmp/flow")),
            ..Default::default()
        };
        assert_eq!(config.debug_dir(), None);

        config.debug = true;
        assert_eq!(config.debug_dir(), Some(Path::new("/tmp/flow")));

        config.debug_path = None;
        assert_eq!(config.debug_dir(), Some(Path::new(".")));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            FlowConfig::from_json_str(r#"{ "maxPoints": "many" }"#),
            Err(FlowError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_validate() {
        let format = VideoFormat::default();
        assert!(FlowConfig::default().validate(&format).is_ok());

        let zero = FlowConfig {
            decimate: 0,
            ..Default::default()
        };
        assert!(zero.validate(&format).is_ok());
        assert!(!zero.is_enabled());

        for bad in [
            FlowConfig {
                decimate: 641,
                ..Default::default()
            },
            FlowConfig {
                discovery_grid_spacing: 0,
                ..Default::default()
            },
            FlowConfig {
                delete_point_probability: 1.5,
                ..Default::default()
            },
            FlowConfig {
                discovery_jitter: -1.0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                bad.validate(&format),
                Err(FlowError::InvalidConfig(_))
            ));
        }
    }
}
