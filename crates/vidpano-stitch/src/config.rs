use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// An error type for configuration loading and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read the configuration. {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for this schema.
    #[error("Failed to parse the configuration. {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value outside of its domain.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// What is expected.
        reason: String,
    },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Parameters of the key-frame selector.
///
/// # Example
///
/// ```
/// use vidpano_stitch::config::SelectorConfig;
///
/// let config = SelectorConfig::default();
/// assert_eq!(config.step_interval, 40);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Only every `step_interval`-th frame is evaluated.
    pub step_interval: usize,
    /// Width of the compared edge strips as a fraction of the frame width, in `(0, 1]`.
    pub overlap_width_fraction: f64,
    /// Exclusive lower bound of the inlier window.
    pub min_match_count: usize,
    /// Exclusive upper bound of the inlier window.
    pub max_match_count: usize,
    /// Frames since the last capture after which an evaluated frame is always captured.
    pub force_capture_interval: usize,
    /// Nearest to second nearest distance ratio, in `(0, 1)`.
    pub match_ratio_threshold: f32,
    /// Reprojection tolerance of the homography fit in pixels.
    pub ransac_reprojection_tolerance: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            step_interval: 40,
            overlap_width_fraction: 2.0 / 3.0,
            min_match_count: 100,
            max_match_count: 1000,
            force_capture_interval: 100,
            match_ratio_threshold: 0.8,
            ransac_reprojection_tolerance: 5.0,
        }
    }
}

impl SelectorConfig {
    /// Check every field against its domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_interval == 0 {
            return Err(invalid("step_interval", "must be greater than 0"));
        }
        if !(self.overlap_width_fraction > 0.0 && self.overlap_width_fraction <= 1.0) {
            return Err(invalid("overlap_width_fraction", "must be in (0, 1]"));
        }
        if self.max_match_count <= self.min_match_count {
            return Err(invalid(
                "max_match_count",
                format!("must be greater than min_match_count ({})", self.min_match_count),
            ));
        }
        if self.force_capture_interval == 0 {
            return Err(invalid("force_capture_interval", "must be greater than 0"));
        }
        if !(self.match_ratio_threshold > 0.0 && self.match_ratio_threshold < 1.0) {
            return Err(invalid("match_ratio_threshold", "must be in (0, 1)"));
        }
        if !(self.ransac_reprojection_tolerance > 0.0) {
            return Err(invalid("ransac_reprojection_tolerance", "must be positive"));
        }
        Ok(())
    }

    /// Whether `inliers` falls strictly inside `(min_match_count, max_match_count)`.
    pub fn in_match_window(&self, inliers: usize) -> bool {
        self.min_match_count < inliers && inliers < self.max_match_count
    }
}

/// Parameters of the homography-chain compositor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Minimum RANSAC inliers to register a pair of consecutive frames.
    pub min_pair_inliers: usize,
    /// Nearest to second nearest distance ratio used for pair matching.
    pub match_ratio_threshold: f32,
    /// Reprojection tolerance of the pairwise fit in pixels.
    pub ransac_reprojection_tolerance: f64,
    /// Upper bound on the output canvas area.
    pub max_canvas_pixels: usize,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            min_pair_inliers: 12,
            match_ratio_threshold: 0.8,
            ransac_reprojection_tolerance: 5.0,
            max_canvas_pixels: 64_000_000,
        }
    }
}

impl CompositorConfig {
    /// Check every field against its domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_pair_inliers < 4 {
            return Err(invalid("min_pair_inliers", "must be at least 4"));
        }
        if !(self.match_ratio_threshold > 0.0 && self.match_ratio_threshold < 1.0) {
            return Err(invalid("match_ratio_threshold", "must be in (0, 1)"));
        }
        if !(self.ransac_reprojection_tolerance > 0.0) {
            return Err(invalid("ransac_reprojection_tolerance", "must be positive"));
        }
        if self.max_canvas_pixels == 0 {
            return Err(invalid("max_canvas_pixels", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Configuration of a full panorama run.
///
/// Every field has a default, so a configuration file only needs to list
/// the values it overrides.
///
/// # Example
///
/// ```
/// use vidpano_stitch::config::PipelineConfig;
///
/// let config = PipelineConfig::from_json_str(r#"{ "selector": { "step_interval": 10 } }"#).unwrap();
///
/// assert_eq!(config.selector.step_interval, 10);
/// assert_eq!(config.selector.min_match_count, 100);
/// assert!(!config.keep_frames);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Key-frame selection parameters.
    pub selector: SelectorConfig,
    /// Compositing parameters.
    pub compositor: CompositorConfig,
    /// Directory where key frames are written as they are captured.
    pub temp_dir: PathBuf,
    /// Keep the key frames after a successful run.
    pub keep_frames: bool,
    /// JPEG quality of the key frames and of a JPEG panorama, in `[1, 100]`.
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            selector: SelectorConfig::default(),
            compositor: CompositorConfig::default(),
            temp_dir: PathBuf::from("key_frames"),
            keep_frames: false,
            jpeg_quality: 95,
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.selector.validate()?;
        self.compositor.validate()?;
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(invalid("jpeg_quality", "must be in [1, 100]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() -> Result<(), ConfigError> {
        PipelineConfig::default().validate()
    }

    #[test]
    fn match_window_is_exclusive() {
        let config = SelectorConfig::default();
        assert!(!config.in_match_window(100));
        assert!(config.in_match_window(101));
        assert!(config.in_match_window(999));
        assert!(!config.in_match_window(1000));
    }

    #[test]
    fn invalid_values() {
        let cases = [
            SelectorConfig {
                step_interval: 0,
                ..Default::default()
            },
            SelectorConfig {
                overlap_width_fraction: 0.0,
                ..Default::default()
            },
            SelectorConfig {
                overlap_width_fraction: 1.5,
                ..Default::default()
            },
            SelectorConfig {
                min_match_count: 10,
                max_match_count: 10,
                ..Default::default()
            },
            SelectorConfig {
                force_capture_interval: 0,
                ..Default::default()
            },
            SelectorConfig {
                match_ratio_threshold: 1.0,
                ..Default::default()
            },
        ];
        for config in cases.iter() {
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidValue { .. })),
                "{config:?}"
            );
        }
    }

    #[test]
    fn json_file_round_trip() -> Result<(), ConfigError> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("config.json");

        let config = PipelineConfig {
            keep_frames: true,
            jpeg_quality: 80,
            ..Default::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;

        assert_eq!(PipelineConfig::from_json_file(&path)?, config);
        Ok(())
    }

    #[test]
    fn json_parse_error() {
        let res = PipelineConfig::from_json_str(r#"{ "selector": { "step_interval": -1 } }"#);
        assert!(matches!(res, Err(ConfigError::Parse(_))));
    }
}
