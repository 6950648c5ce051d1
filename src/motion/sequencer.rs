//! Turns pick-and-place tasks into a paced command list.

use super::{GripperAction, MotionCommand, MotionStep};
use crate::arm::Pose;
use crate::calibration::{CalibrationPoint, RobotPoint};
use crate::config::{ApproachConfig, SettleTimes, StackerConfig};
use crate::planner::PickPlaceTask;

/// Builds motion steps from tasks; holds no arm state.
#[derive(Debug, Clone)]
pub struct MotionSequencer {
    z_pick: f64,
    z_lift: f64,
    roll: f64,
    pitch: f64,
    yaw: f64,
    timing: SettleTimes,
    approach: ApproachConfig,
}

impl MotionSequencer {
    pub fn new(config: &StackerConfig) -> Self {
        Self {
            z_pick: config.stack.z_pick,
            z_lift: config.stack.z_lift,
            roll: config.robot.roll,
            pitch: config.robot.pitch,
            yaw: config.robot.yaw,
            timing: config.timing.clone(),
            approach: config.approach.clone(),
        }
    }

    fn pose(&self, x: f64, y: f64, z: f64) -> Pose {
        Pose::new(x, y, z, self.roll, self.pitch, self.yaw)
    }

    fn move_to(&self, x: f64, y: f64, z: f64, settle_ms: u64, label: &'static str) -> MotionStep {
        MotionStep::new(MotionCommand::MoveTo(self.pose(x, y, z)), settle_ms, label)
    }

    /// Height that clears both the travel height and the staging pose.
    fn safe_z(&self) -> f64 {
        self.z_lift.max(self.approach.staging_z)
    }

    /// One-time preparation: open the gripper, turn the arm, go to staging.
    pub fn approach(&self) -> Vec<MotionStep> {
        let t = &self.timing;
        let mut steps = vec![MotionStep::new(
            MotionCommand::Gripper(GripperAction::Open),
            t.gripper_prepare_ms,
            "open gripper",
        )];

        for &degrees in &self.approach.rotations_deg {
            steps.push(MotionStep::new(
                MotionCommand::RotateBase { degrees },
                t.rotate_ms,
                "orient gripper",
            ));
        }

        steps.push(self.move_to(
            self.approach.staging_x,
            self.approach.staging_y,
            self.approach.staging_z,
            t.staging_ms,
            "staging pose",
        ));
        steps
    }

    /// The eight steps of one pick-and-place.
    pub fn pick_and_place(&self, task: &PickPlaceTask) -> Vec<MotionStep> {
        let t = &self.timing;
        let src = task.source;
        let dst = task.destination;

        vec![
            self.move_to(src.x, src.y, self.z_lift, t.above_source_ms, "above can"),
            self.move_to(src.x, src.y, self.z_pick, t.descend_source_ms, "descend to can"),
            MotionStep::new(
                MotionCommand::Gripper(GripperAction::Close),
                t.grip_ms,
                "grip",
            ),
            self.move_to(src.x, src.y, self.z_lift, t.lift_source_ms, "lift can"),
            self.move_to(dst.x, dst.y, self.z_lift, t.above_target_ms, "above slot"),
            self.move_to(dst.x, dst.y, dst.z, t.descend_target_ms, "descend to slot"),
            MotionStep::new(
                MotionCommand::Gripper(GripperAction::Open),
                t.release_ms,
                "release",
            ),
            self.move_to(dst.x, dst.y, self.z_lift, t.retreat_ms, "retreat"),
        ]
    }

    /// Lift clear above `last`, then end the session.
    pub fn finish(&self, last: RobotPoint) -> Vec<MotionStep> {
        vec![
            self.move_to(last.x, last.y, self.safe_z(), self.timing.retreat_ms, "safe height"),
            MotionStep::new(MotionCommand::EndSession, 0, "end session"),
        ]
    }

    /// Full stacking run. No tasks means no motion at all.
    pub fn sequence(&self, tasks: &[PickPlaceTask]) -> Vec<MotionStep> {
        let Some(last) = tasks.last() else {
            return Vec::new();
        };

        let mut steps = self.approach();
        for task in tasks {
            steps.extend(self.pick_and_place(task));
        }
        steps.extend(self.finish(RobotPoint::new(last.destination.x, last.destination.y)));

        tracing::debug!(tasks = tasks.len(), steps = steps.len(), "motion sequenced");
        steps
    }

    /// Calibration teach-in: set a can down at each calibration robot point
    /// so the detector can measure where it appears in the image.
    pub fn teach_in(&self, points: &[CalibrationPoint]) -> Vec<MotionStep> {
        let Some(last) = points.last() else {
            return Vec::new();
        };
        let t = &self.timing;

        let mut steps = self.approach();
        for point in points {
            let RobotPoint { x, y } = point.robot;
            steps.push(self.move_to(x, y, self.z_lift, t.above_source_ms, "above teach point"));
            steps.push(self.move_to(x, y, self.z_pick, t.descend_source_ms, "descend to teach point"));
            steps.push(MotionStep::new(
                MotionCommand::Gripper(GripperAction::Close),
                t.teach_grip_ms,
                "grip inserted can",
            ));
            steps.push(MotionStep::new(
                MotionCommand::Gripper(GripperAction::Open),
                t.teach_release_ms,
                "set can down",
            ));
            steps.push(self.move_to(x, y, self.z_lift, t.above_source_ms, "leave teach point"));
        }
        steps.extend(self.finish(last.robot));
        steps
    }

    /// A single command followed by the end of the session.
    pub fn single(&self, command: MotionCommand) -> Vec<MotionStep> {
        let settle_ms = match command {
            MotionCommand::MoveTo(_) => self.timing.staging_ms,
            MotionCommand::RotateBase { .. } => self.timing.rotate_ms,
            MotionCommand::Gripper(_) => self.timing.grip_ms,
            MotionCommand::EndSession => 0,
        };
        let mut steps = vec![MotionStep::new(command, settle_ms, "manual command")];
        if command != MotionCommand::EndSession {
            steps.push(MotionStep::new(MotionCommand::EndSession, 0, "end session"));
        }
        steps
    }

    /// Absolute move using the configured tool orientation.
    pub fn move_command(&self, x: f64, y: f64, z: f64) -> MotionCommand {
        MotionCommand::MoveTo(self.pose(x, y, z))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::planner::StackSlot;

    fn task(sx: f64, sy: f64, dx: f64, dz: f64, layer: u32) -> PickPlaceTask {
        PickPlaceTask {
            detection: 0,
            source: RobotPoint::new(sx, sy),
            destination: StackSlot {
                x: dx,
                y: -400.0,
                z: dz,
                layer,
            },
        }
    }

    fn target(step: &MotionStep) -> (f64, f64, f64) {
        match step.command {
            MotionCommand::MoveTo(p) => (p.x, p.y, p.z),
            other => panic!("expected a move, got {}", other),
        }
    }

    #[test]
    fn test_pick_and_place_order() {
        let sequencer = MotionSequencer::new(&StackerConfig::default());
        let steps = sequencer.pick_and_place(&task(120.0, -300.0, 70.0, 272.0, 1));

        assert_eq!(steps.len(), 8);
        assert_eq!(target(&steps[0]), (120.0, -300.0, 400.0));
        assert_eq!(target(&steps[1]), (120.0, -300.0, 200.0));
        assert_eq!(steps[2].command, MotionCommand::Gripper(GripperAction::Close));
        assert_eq!(target(&steps[3]), (120.0, -300.0, 400.0));
        assert_eq!(target(&steps[4]), (70.0, -400.0, 400.0));
        assert_eq!(target(&steps[5]), (70.0, -400.0, 272.0));
        assert_eq!(steps[6].command, MotionCommand::Gripper(GripperAction::Open));
        assert_eq!(target(&steps[7]), (70.0, -400.0, 400.0));
    }

    #[test]
    fn test_settle_times_follow_configuration() {
        let sequencer = MotionSequencer::new(&StackerConfig::default());
        let settles: Vec<u64> = sequencer
            .pick_and_place(&task(0.0, 0.0, 0.0, 200.0, 0))
            .iter()
            .map(|s| s.settle.as_millis() as u64)
            .collect();
        assert_eq!(settles, vec![5000, 5000, 1000, 10_000, 10_000, 10_000, 1000, 6000]);
    }

    #[test]
    fn test_approach_runs_once_and_session_ends_last() {
        let sequencer = MotionSequencer::new(&StackerConfig::default());
        let tasks = vec![task(1.0, 1.0, 0.0, 200.0, 0), task(2.0, 2.0, 70.0, 200.0, 0)];
        let steps = sequencer.sequence(&tasks);

        let approach = sequencer.approach().len();
        assert_eq!(approach, 4);
        assert_eq!(steps.len(), approach + 2 * 8 + 2);

        let rotations = steps
            .iter()
            .filter(|s| matches!(s.command, MotionCommand::RotateBase { .. }))
            .count();
        assert_eq!(rotations, 2);
        assert_eq!(steps.last().unwrap().command, MotionCommand::EndSession);
        assert_eq!(target(&steps[steps.len() - 2]), (70.0, -400.0, 400.0));
    }

    #[test]
    fn test_no_tasks_no_motion() {
        let sequencer = MotionSequencer::new(&StackerConfig::default());
        assert!(sequencer.sequence(&[]).is_empty());
    }

    #[test]
    fn test_teach_in_visits_every_calibration_point() {
        let config = StackerConfig::default();
        let sequencer = MotionSequencer::new(&config);
        let steps = sequencer.teach_in(&config.calibration.points);

        let descents: Vec<(f64, f64, f64)> = steps
            .iter()
            .filter(|s| s.label == "descend to teach point")
            .map(target)
            .collect();
        assert_eq!(
            descents,
            vec![
                (0.0, -400.0, 200.0),
                (100.0, -400.0, 200.0),
                (0.0, -300.0, 200.0),
                (100.0, -300.0, 200.0),
            ]
        );
        assert_eq!(steps.last().unwrap().command, MotionCommand::EndSession);
    }

    #[test]
    fn test_single_command_ends_session() {
        let sequencer = MotionSequencer::new(&StackerConfig::default());
        let steps = sequencer.single(MotionCommand::Gripper(GripperAction::Toggle));
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].settle, Duration::from_millis(1000));
        assert_eq!(steps[1].command, MotionCommand::EndSession);
    }
}
