//! Camera-to-robot calibration.
//!
//! Four pixel/robot correspondences define a planar homography that maps
//! camera detections onto the robot's working plane.

mod homography;
mod mapper;

pub use homography::{CalibrationReport, Homography};
pub use mapper::{map_detections, map_indexed, MappedDetection};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of correspondences that define a calibration.
pub const CALIBRATION_POINTS: usize = 4;

/// A point in camera image space (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub u: f64,
    pub v: f64,
}

impl PixelPoint {
    pub fn new(u: f64, v: f64) -> Self {
        Self { u, v }
    }
}

/// A point on the robot's working plane (millimeters, robot base frame).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotPoint {
    pub x: f64,
    pub y: f64,
}

impl RobotPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &RobotPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One pixel/robot correspondence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub pixel: PixelPoint,
    pub robot: RobotPoint,
}

impl CalibrationPoint {
    pub fn new(u: f64, v: f64, x: f64, y: f64) -> Self {
        Self {
            pixel: PixelPoint::new(u, v),
            robot: RobotPoint::new(x, y),
        }
    }
}

/// Errors raised while fitting a calibration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("expected {expected} calibration points, got {got}")]
    WrongPointCount { expected: usize, got: usize },
    /// Collinear or duplicated points; calibration must be redone.
    #[error("degenerate calibration: {0}")]
    Degenerate(String),
}

/// Errors raised while mapping a pixel through the homography.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("pixel ({u:.2}, {v:.2}) maps to infinity")]
    PointAtInfinity { u: f64, v: f64 },
    #[error("detection {index} could not be mapped: {source}")]
    Detection {
        index: usize,
        #[source]
        source: Box<MappingError>,
    },
}
