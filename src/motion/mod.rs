//! Motion sequencing and execution.
//!
//! Plans become a flat list of `MotionStep`s, each an arm command followed
//! by a fixed settle delay. The arm gives no completion feedback, so the
//! delays are the schedule.

mod executor;
mod sequencer;

pub use executor::{ExecutionReport, MotionExecutor, Pacer, ThreadPacer};
pub use sequencer::MotionSequencer;

#[cfg(test)]
pub(crate) use executor::RecordingPacer;

use std::time::Duration;

use crate::arm::Pose;

/// Gripper actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperAction {
    Open,
    Close,
    /// Read the current value and switch to the other position.
    Toggle,
}

/// One arm command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionCommand {
    MoveTo(Pose),
    /// Rotate the current pose about the robot base (degrees).
    RotateBase { degrees: f64 },
    Gripper(GripperAction),
    EndSession,
}

impl std::fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MotionCommand::MoveTo(pose) => write!(f, "move to {}", pose),
            MotionCommand::RotateBase { degrees } => write!(f, "rotate {} deg", degrees),
            MotionCommand::Gripper(GripperAction::Open) => write!(f, "open gripper"),
            MotionCommand::Gripper(GripperAction::Close) => write!(f, "close gripper"),
            MotionCommand::Gripper(GripperAction::Toggle) => write!(f, "toggle gripper"),
            MotionCommand::EndSession => write!(f, "end session"),
        }
    }
}

/// A command and the time to wait after it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionStep {
    pub command: MotionCommand,
    pub settle: Duration,
    /// Short description for logs.
    pub label: &'static str,
}

impl MotionStep {
    pub fn new(command: MotionCommand, settle_ms: u64, label: &'static str) -> Self {
        Self {
            command,
            settle: Duration::from_millis(settle_ms),
            label,
        }
    }
}
