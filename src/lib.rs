//! Can Stacker
//!
//! Picks cans located by a camera and stacks them into a pyramid with a
//! remotely controlled robot arm:
//! - 4-point homography calibration from camera pixels to robot millimeters
//! - Pyramid layout planning for up to six cans
//! - Open-loop, time-paced motion sequencing over the arm's REST API

pub mod arm;
pub mod calibration;
pub mod config;
pub mod detection;
pub mod error;
pub mod motion;
pub mod planner;
pub mod runner;
pub mod telemetry;

pub use error::{Result, StackerError};
