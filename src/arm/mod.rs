//! Robot arm control surface.
//!
//! `ArmController` is what the motion executor drives. `RemoteArm` talks to
//! the arm's REST service; `SimulatedArm` records commands for dry runs and
//! tests.

mod remote;
mod simulated;

pub use remote::RemoteArm;
pub use simulated::{ArmCall, SimulatedArm};

use thiserror::Error;

/// Tool center point pose: position in mm, orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        }
    }

    /// Rotate the pose about the robot base's vertical axis.
    ///
    /// A positive angle turns the position clockwise seen from above and
    /// reduces yaw by the same amount, so the gripper keeps its heading
    /// relative to the arm.
    pub fn rotated_about_base(&self, degrees: f64) -> Self {
        let theta = (-degrees).to_radians();
        let (sin, cos) = theta.sin_cos();
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
            yaw: self.yaw - degrees,
            ..*self
        }
    }
}

impl std::fmt::Display for Pose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "x={:.1} y={:.1} z={:.1} roll={:.1} pitch={:.1} yaw={:.1}",
            self.x, self.y, self.z, self.roll, self.pitch, self.yaw
        )
    }
}

/// Errors reported by an arm controller.
#[derive(Error, Debug)]
pub enum ArmError {
    #[error("HTTP request failed during {operation}: {source}")]
    Http {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The arm answered with a non-success status.
    #[error("{operation} rejected with status {status}")]
    Remote { operation: &'static str, status: u16 },
    #[error("operator registration returned no token")]
    MissingToken,
    #[error("session already ended")]
    SessionClosed,
    #[error("unexpected response to {operation}: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

/// Session-scoped arm commands. Calls are synchronous; one is in flight at
/// a time.
pub trait ArmController {
    /// Absolute move of the tool center point.
    fn move_to(&mut self, pose: &Pose) -> Result<(), ArmError>;

    /// Current tool center point.
    fn tcp_pose(&mut self) -> Result<Pose, ArmError>;

    /// Current gripper actuator value.
    fn gripper(&mut self) -> Result<i64, ArmError>;

    fn set_gripper(&mut self, value: i64) -> Result<(), ArmError>;

    /// Release the operator session. Further commands fail.
    fn end_session(&mut self) -> Result<(), ArmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_about_base() {
        let pose = Pose::new(0.0, -400.0, 300.0, 180.0, 0.0, 180.0);
        let rotated = pose.rotated_about_base(90.0);

        assert!((rotated.x + 400.0).abs() < 1e-9);
        assert!(rotated.y.abs() < 1e-9);
        assert_eq!(rotated.z, 300.0);
        assert_eq!(rotated.yaw, 90.0);
        assert_eq!(rotated.roll, 180.0);
    }

    #[test]
    fn test_two_half_turns_compose() {
        let pose = Pose::new(120.0, -350.0, 250.0, 180.0, 0.0, 180.0);
        let twice = pose.rotated_about_base(45.0).rotated_about_base(45.0);
        let once = pose.rotated_about_base(90.0);

        assert!((twice.x - once.x).abs() < 1e-9);
        assert!((twice.y - once.y).abs() < 1e-9);
        assert!((twice.yaw - once.yaw).abs() < 1e-9);
    }
}
