//! Executes motion steps against an arm, strictly in order.

use std::thread;
use std::time::Duration;

use super::{GripperAction, MotionCommand, MotionStep};
use crate::arm::{ArmController, ArmError};
use crate::config::GripperConfig;
use crate::error::StackerError;

/// Waits out a step's settle time.
pub trait Pacer {
    fn settle(&mut self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn settle(&mut self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionReport {
    pub completed: usize,
    pub settled: Duration,
}

/// Sends steps to the arm one at a time. The first rejected step stops the
/// run; nothing is retried or undone.
pub struct MotionExecutor<'a, A: ArmController + ?Sized, P: Pacer> {
    arm: &'a mut A,
    pacer: P,
    gripper: GripperConfig,
}

impl<'a, A: ArmController + ?Sized, P: Pacer> MotionExecutor<'a, A, P> {
    pub fn new(arm: &'a mut A, pacer: P, gripper: GripperConfig) -> Self {
        Self { arm, pacer, gripper }
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    pub fn execute(&mut self, steps: &[MotionStep]) -> Result<ExecutionReport, StackerError> {
        let mut report = ExecutionReport::default();

        for (index, step) in steps.iter().enumerate() {
            tracing::info!(
                step = index + 1,
                total = steps.len(),
                label = step.label,
                "{}",
                step.command
            );

            if let Err(source) = self.run(&step.command) {
                tracing::error!(step = index + 1, "{} failed: {}", step.command, source);
                return Err(StackerError::Motion {
                    step: index,
                    command: step.command.to_string(),
                    source,
                });
            }

            self.pacer.settle(step.settle);
            report.completed += 1;
            report.settled += step.settle;
        }

        Ok(report)
    }

    fn run(&mut self, command: &MotionCommand) -> Result<(), ArmError> {
        match command {
            MotionCommand::MoveTo(pose) => self.arm.move_to(pose),
            MotionCommand::RotateBase { degrees } => {
                let current = self.arm.tcp_pose()?;
                let rotated = current.rotated_about_base(*degrees);
                self.arm.move_to(&rotated)
            }
            MotionCommand::Gripper(GripperAction::Open) => self.arm.set_gripper(self.gripper.open),
            MotionCommand::Gripper(GripperAction::Close) => {
                self.arm.set_gripper(self.gripper.close)
            }
            MotionCommand::Gripper(GripperAction::Toggle) => {
                let value = if self.arm.gripper()? == self.gripper.close {
                    self.gripper.open
                } else {
                    self.gripper.close
                };
                self.arm.set_gripper(value)
            }
            MotionCommand::EndSession => self.arm.end_session(),
        }
    }
}

/// Records settle requests instead of sleeping.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingPacer {
    pub waits: Vec<Duration>,
}

#[cfg(test)]
impl Pacer for RecordingPacer {
    fn settle(&mut self, duration: Duration) {
        self.waits.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::{ArmCall, Pose, SimulatedArm};
    use crate::calibration::RobotPoint;
    use crate::config::StackerConfig;
    use crate::motion::MotionSequencer;
    use crate::planner::{PickPlaceTask, StackSlot};

    fn one_task() -> Vec<MotionStep> {
        let sequencer = MotionSequencer::new(&StackerConfig::default());
        sequencer.pick_and_place(&PickPlaceTask {
            detection: 0,
            source: RobotPoint::new(50.0, -300.0),
            destination: StackSlot {
                x: 0.0,
                y: -400.0,
                z: 200.0,
                layer: 0,
            },
        })
    }

    #[test]
    fn test_executes_every_step_and_settles() {
        let steps = one_task();
        let mut arm = SimulatedArm::default();
        let mut executor =
            MotionExecutor::new(&mut arm, RecordingPacer::default(), GripperConfig::default());

        let report = executor.execute(&steps).unwrap();
        assert_eq!(report.completed, 8);
        assert_eq!(report.settled, Duration::from_millis(48_000));
        assert_eq!(executor.pacer().waits.len(), 8);

        assert_eq!(arm.calls().len(), 8);
        assert_eq!(arm.calls()[2], ArmCall::SetGripper(630));
        assert_eq!(arm.calls()[6], ArmCall::SetGripper(800));
    }

    #[test]
    fn test_failure_on_fourth_command_halts_after_three() {
        let steps = one_task();
        let mut arm = SimulatedArm::default().failing_at(4);
        let mut executor =
            MotionExecutor::new(&mut arm, RecordingPacer::default(), GripperConfig::default());

        match executor.execute(&steps) {
            Err(StackerError::Motion { step, source, .. }) => {
                assert_eq!(step, 3);
                assert!(matches!(source, ArmError::Remote { status: 500, .. }));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // No settle after the failed command.
        assert_eq!(executor.pacer().waits.len(), 3);
        assert_eq!(arm.calls().len(), 3);
    }

    #[test]
    fn test_rotate_uses_current_pose() {
        let start = Pose::new(0.0, -400.0, 300.0, 180.0, 0.0, 180.0);
        let mut arm = SimulatedArm::new(start, 800);
        let steps = [MotionStep::new(MotionCommand::RotateBase { degrees: 90.0 }, 0, "rotate")];
        MotionExecutor::new(&mut arm, ThreadPacer, GripperConfig::default())
            .execute(&steps)
            .unwrap();

        let pose = arm.pose();
        assert!((pose.x + 400.0).abs() < 1e-9);
        assert!(pose.y.abs() < 1e-9);
        assert_eq!(pose.yaw, 90.0);
    }

    #[test]
    fn test_toggle_flips_gripper() {
        let mut arm = SimulatedArm::new(Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0), 630);
        let toggle = [MotionStep::new(MotionCommand::Gripper(GripperAction::Toggle), 0, "toggle")];

        let mut executor = MotionExecutor::new(&mut arm, ThreadPacer, GripperConfig::default());
        executor.execute(&toggle).unwrap();
        executor.execute(&toggle).unwrap();

        assert_eq!(
            arm.calls(),
            &[ArmCall::SetGripper(800), ArmCall::SetGripper(630)]
        );
    }
}
