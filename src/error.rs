//! Crate-wide error type.

use thiserror::Error;

use crate::arm::ArmError;
use crate::calibration::{CalibrationError, MappingError};
use crate::config::ConfigError;
use crate::detection::DetectionError;
use crate::planner::PlanError;

/// Errors that abort a calibration, planning or stacking run.
#[derive(Error, Debug)]
pub enum StackerError {
    #[error("calibration failed: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("coordinate mapping failed: {0}")]
    Mapping(#[from] MappingError),
    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),
    #[error("detection handoff failed: {0}")]
    Detection(#[from] DetectionError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("arm error: {0}")]
    Arm(#[from] ArmError),
    /// A motion step was rejected; nothing after `step` was sent.
    #[error("motion step {step} ({command}) failed: {source}")]
    Motion {
        step: usize,
        command: String,
        #[source]
        source: ArmError,
    },
}

pub type Result<T> = std::result::Result<T, StackerError>;
