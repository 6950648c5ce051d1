//! Configuration and serialization module.
//!
//! Every constant the planner, sequencer and arm client need is injected
//! from here. Files are XML (`.xml`, default) or JSON (`.json`).

mod file;

pub use file::{default_config_path, load_config, resolve_config, save_config};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::{CalibrationPoint, CALIBRATION_POINTS};

/// Largest pyramid the planner can build.
pub const MAX_STACK_CANS: usize = 6;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename = "CanStackerConfig", rename_all = "camelCase", default)]
pub struct StackerConfig {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub calibration: CalibrationConfig,
    pub stack: StackConfig,
    pub gripper: GripperConfig,
    pub robot: RobotConfig,
    pub timing: SettleTimes,
    pub approach: ApproachConfig,
}

/// Camera settings shared with the external detector. The frame size and
/// radius range also gate the detections it reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraConfig {
    /// Device index or stream URL.
    pub source: String,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Expected can radius range in pixels.
    pub radius_min: f64,
    pub radius_max: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: "0".to_string(),
            frame_width: 960,
            frame_height: 540,
            radius_min: 39.0,
            radius_max: 44.0,
        }
    }
}

/// Detection file handoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionConfig {
    pub file: String,
    pub poll_interval_ms: u64,
    /// Give up waiting after this long; wait forever when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_timeout_ms: Option<u64>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            file: "detected_coords.txt".to_string(),
            poll_interval_ms: 100,
            poll_timeout_ms: None,
        }
    }
}

/// The four pixel/robot correspondences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalibrationConfig {
    #[serde(rename = "point")]
    pub points: Vec<CalibrationPoint>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            points: vec![
                CalibrationPoint::new(420.6, 263.4, 0.0, -400.0),
                CalibrationPoint::new(281.4, 256.2, 100.0, -400.0),
                CalibrationPoint::new(412.2, 397.8, 0.0, -300.0),
                CalibrationPoint::new(275.4, 391.8, 100.0, -300.0),
            ],
        }
    }
}

/// Stack geometry and heights (mm).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StackConfig {
    /// Left-most bottom slot.
    pub origin_x: f64,
    pub origin_y: f64,
    /// Distance between neighbouring bottom slots.
    pub spacing: f64,
    pub can_height: f64,
    /// Gripper height for picking a can standing on the table.
    pub z_pick: f64,
    /// Travel height; must clear the top layer.
    pub z_lift: f64,
    /// Fewer detections than this abort the run.
    pub min_cans: usize,
    /// More detections than this are ignored.
    pub max_cans: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            origin_x: 0.0,
            origin_y: -400.0,
            spacing: 70.0,
            can_height: 72.0,
            z_pick: 200.0,
            z_lift: 400.0,
            min_cans: 1,
            max_cans: MAX_STACK_CANS,
        }
    }
}

impl StackConfig {
    /// Placement height for a layer.
    pub fn layer_height(&self, layer: u32) -> f64 {
        self.z_pick + layer as f64 * self.can_height
    }
}

/// Gripper actuator values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GripperConfig {
    pub open: i64,
    pub close: i64,
}

impl Default for GripperConfig {
    fn default() -> Self {
        Self {
            open: 800,
            close: 630,
        }
    }
}

/// Remote arm API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RobotConfig {
    pub base_url: String,
    pub bot_name: String,
    pub operator_name: String,
    pub operator_email: String,
    /// Speed sent with every pose target.
    pub speed: u32,
    /// Tool orientation for all moves (degrees).
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    /// Fixed wait after every API call.
    pub post_call_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.interactions.ics.unisg.ch".to_string(),
            bot_name: "cherrybot".to_string(),
            operator_name: "Can Stacker".to_string(),
            operator_email: "can.stacker@student.unisg.ch".to_string(),
            speed: 200,
            roll: 180.0,
            pitch: 0.0,
            yaw: 180.0,
            post_call_delay_ms: 1000,
            request_timeout_ms: 10_000,
        }
    }
}

/// Settle delays (ms) after each kind of step. The arm reports no
/// completion, so these are the only pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettleTimes {
    pub above_source_ms: u64,
    pub descend_source_ms: u64,
    pub grip_ms: u64,
    pub lift_source_ms: u64,
    pub above_target_ms: u64,
    pub descend_target_ms: u64,
    pub release_ms: u64,
    pub retreat_ms: u64,
    pub rotate_ms: u64,
    pub staging_ms: u64,
    pub gripper_prepare_ms: u64,
    pub teach_grip_ms: u64,
    pub teach_release_ms: u64,
}

impl Default for SettleTimes {
    fn default() -> Self {
        Self {
            above_source_ms: 5000,
            descend_source_ms: 5000,
            grip_ms: 1000,
            lift_source_ms: 10_000,
            above_target_ms: 10_000,
            descend_target_ms: 10_000,
            release_ms: 1000,
            retreat_ms: 6000,
            rotate_ms: 6000,
            staging_ms: 10_000,
            gripper_prepare_ms: 1000,
            teach_grip_ms: 4000,
            teach_release_ms: 3000,
        }
    }
}

impl SettleTimes {
    /// All delays zero (dry runs).
    pub fn zero() -> Self {
        Self {
            above_source_ms: 0,
            descend_source_ms: 0,
            grip_ms: 0,
            lift_source_ms: 0,
            above_target_ms: 0,
            descend_target_ms: 0,
            release_ms: 0,
            retreat_ms: 0,
            rotate_ms: 0,
            staging_ms: 0,
            gripper_prepare_ms: 0,
            teach_grip_ms: 0,
            teach_release_ms: 0,
        }
    }
}

/// One-time approach before the first pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApproachConfig {
    /// Base rotations applied in order (degrees).
    #[serde(rename = "rotation")]
    pub rotations_deg: Vec<f64>,
    pub staging_x: f64,
    pub staging_y: f64,
    pub staging_z: f64,
}

impl Default for ApproachConfig {
    fn default() -> Self {
        Self {
            rotations_deg: vec![45.0, 45.0],
            staging_x: 0.0,
            staging_y: -450.0,
            staging_z: 300.0,
        }
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::SeError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl StackerConfig {
    /// Reject values the planner or sequencer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stack = &self.stack;
        if !(stack.spacing > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "stack spacing must be positive, got {}",
                stack.spacing
            )));
        }
        if !(stack.can_height > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "can height must be positive, got {}",
                stack.can_height
            )));
        }
        if stack.max_cans == 0 || stack.max_cans > MAX_STACK_CANS {
            return Err(ConfigError::Invalid(format!(
                "maxCans must be within 1..={}, got {}",
                MAX_STACK_CANS, stack.max_cans
            )));
        }
        if stack.min_cans > stack.max_cans {
            return Err(ConfigError::Invalid(format!(
                "minCans ({}) exceeds maxCans ({})",
                stack.min_cans, stack.max_cans
            )));
        }
        if stack.z_lift < stack.layer_height(2) {
            tracing::warn!(
                z_lift = stack.z_lift,
                top_layer = stack.layer_height(2),
                "travel height is below the top layer"
            );
        }
        if self.calibration.points.len() != CALIBRATION_POINTS {
            return Err(ConfigError::Invalid(format!(
                "calibration needs exactly {} points, got {}",
                CALIBRATION_POINTS,
                self.calibration.points.len()
            )));
        }
        let camera = &self.camera;
        if camera.frame_width == 0 || camera.frame_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "camera frame must be non-empty, got {}x{}",
                camera.frame_width, camera.frame_height
            )));
        }
        if !(camera.radius_min <= camera.radius_max) {
            return Err(ConfigError::Invalid(format!(
                "radiusMin ({}) exceeds radiusMax ({})",
                camera.radius_min, camera.radius_max
            )));
        }
        if self.detection.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "detection poll interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StackerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.stack.layer_height(0), 200.0);
        assert_eq!(config.stack.layer_height(1), 272.0);
        assert_eq!(config.stack.layer_height(2), 344.0);
        assert_eq!(config.gripper.open, 800);
        assert_eq!(config.gripper.close, 630);
    }

    #[test]
    fn test_max_cans_bounds() {
        let mut config = StackerConfig::default();
        config.stack.max_cans = 7;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.stack.max_cans = 3;
        config.stack.min_cans = 4;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_calibration_point_count() {
        let mut config = StackerConfig::default();
        config.calibration.points.pop();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_camera_ranges() {
        let mut config = StackerConfig::default();
        config.camera.radius_min = 50.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = StackerConfig::default();
        config.camera.frame_height = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_non_positive_spacing() {
        let mut config = StackerConfig::default();
        config.stack.spacing = 0.0;
        assert!(config.validate().is_err());
        config.stack.spacing = f64::NAN;
        assert!(config.validate().is_err());
    }
}
