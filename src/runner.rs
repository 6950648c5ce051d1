//! One stacking run: detections -> robot points -> plan -> paced motion.

use crate::arm::ArmController;
use crate::calibration::{map_indexed, Homography, MappedDetection};
use crate::config::StackerConfig;
use crate::detection::{Detection, DetectionFile, DetectionGate};
use crate::error::Result;
use crate::motion::{ExecutionReport, MotionCommand, MotionExecutor, MotionSequencer, MotionStep, Pacer};
use crate::planner::{StackPlan, StackPlanner};

/// Everything decided before the arm moves.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub mapped: Vec<MappedDetection>,
    pub plan: StackPlan,
    pub steps: Vec<MotionStep>,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub plan: StackPlan,
    pub report: ExecutionReport,
}

/// Calibration, planner and sequencer for one workspace setup. Reusable
/// across runs; holds no per-run state.
#[derive(Debug, Clone)]
pub struct StackRunner {
    config: StackerConfig,
    homography: Homography,
    gate: DetectionGate,
    planner: StackPlanner,
    sequencer: MotionSequencer,
}

impl StackRunner {
    /// Fit the calibration; a degenerate calibration is fatal.
    pub fn new(config: StackerConfig) -> Result<Self> {
        let homography = Homography::fit(&config.calibration.points)?;
        let gate = DetectionGate::from_config(&config.camera);
        let planner = StackPlanner::new(&config.stack);
        let sequencer = MotionSequencer::new(&config);
        Ok(Self {
            config,
            homography,
            gate,
            planner,
            sequencer,
        })
    }

    pub fn config(&self) -> &StackerConfig {
        &self.config
    }

    pub fn homography(&self) -> &Homography {
        &self.homography
    }

    pub fn sequencer(&self) -> &MotionSequencer {
        &self.sequencer
    }

    /// Filter, map, plan and sequence without touching the arm.
    pub fn prepare(&self, detections: &[Detection]) -> Result<RunPlan> {
        let mapped = map_indexed(&self.homography, self.gate.filter(detections))?;
        for d in &mapped {
            tracing::info!(
                index = d.index,
                u = d.pixel.u,
                v = d.pixel.v,
                x = d.robot.x,
                y = d.robot.y,
                "detection"
            );
        }

        let plan = self.planner.plan(&mapped)?;
        let steps = self.sequencer.sequence(&plan.tasks);
        Ok(RunPlan {
            mapped,
            plan,
            steps,
        })
    }

    /// Execute prepared steps; stops at the first rejected command.
    pub fn execute<A, P>(&self, arm: &mut A, pacer: P, steps: &[MotionStep]) -> Result<ExecutionReport>
    where
        A: ArmController + ?Sized,
        P: Pacer,
    {
        MotionExecutor::new(arm, pacer, self.config.gripper).execute(steps)
    }

    /// Stack the cans in `detections`. Planning failures issue no motion.
    pub fn run<A, P>(&self, arm: &mut A, pacer: P, detections: &[Detection]) -> Result<RunOutcome>
    where
        A: ArmController + ?Sized,
        P: Pacer,
    {
        let RunPlan { plan, steps, .. } = self.prepare(detections)?;
        tracing::info!(cans = plan.len(), steps = steps.len(), "starting auto stacking");

        let report = self.execute(arm, pacer, &steps)?;
        tracing::info!(cans = plan.len(), "stacking complete");
        Ok(RunOutcome { plan, report })
    }

    /// Wait for the detector's file, then stack.
    pub fn run_from_file<A, P>(&self, arm: &mut A, pacer: P, file: &DetectionFile) -> Result<RunOutcome>
    where
        A: ArmController + ?Sized,
        P: Pacer,
    {
        let detections = file.wait_for_detections()?;
        self.run(arm, pacer, &detections)
    }

    /// Calibration teach-in over the configured robot points.
    pub fn teach_in<A, P>(&self, arm: &mut A, pacer: P) -> Result<ExecutionReport>
    where
        A: ArmController + ?Sized,
        P: Pacer,
    {
        tracing::info!("entering teach-in; insert a can into the gripper at each point");
        let steps = self.sequencer.teach_in(&self.config.calibration.points);
        let report = self.execute(arm, pacer, &steps)?;
        tracing::info!(
            "teach-in complete; run the detector and record the pixel positions in the calibration"
        );
        Ok(report)
    }

    /// One manual command, then end the session.
    pub fn manual<A, P>(&self, arm: &mut A, pacer: P, command: MotionCommand) -> Result<ExecutionReport>
    where
        A: ArmController + ?Sized,
        P: Pacer,
    {
        let steps = self.sequencer.single(command);
        self.execute(arm, pacer, &steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::{ArmCall, SimulatedArm};
    use crate::calibration::CalibrationError;
    use crate::detection::DetectionError;
    use crate::error::StackerError;
    use crate::motion::RecordingPacer;
    use crate::planner::PlanError;

    fn runner() -> StackRunner {
        StackRunner::new(StackerConfig::default()).unwrap()
    }

    /// Pixels of the calibration cans plus points between them.
    fn scene(count: usize) -> Vec<Detection> {
        [
            (420.6, 263.4),
            (281.4, 256.2),
            (412.2, 397.8),
            (275.4, 391.8),
            (350.0, 320.0),
            (300.0, 300.0),
            (390.0, 280.0),
            (330.0, 380.0),
        ]
        .iter()
        .take(count)
        .map(|&(u, v)| Detection::new(u, v))
        .collect()
    }

    #[test]
    fn test_degenerate_calibration_is_fatal() {
        let mut config = StackerConfig::default();
        config.calibration.points[2].pixel = config.calibration.points[0].pixel;
        assert!(matches!(
            StackRunner::new(config),
            Err(StackerError::Calibration(CalibrationError::Degenerate(_)))
        ));
    }

    #[test]
    fn test_no_detections_issue_no_motion() {
        let mut arm = SimulatedArm::default();
        let result = runner().run(&mut arm, RecordingPacer::default(), &[]);

        assert!(matches!(
            result,
            Err(StackerError::Plan(PlanError::NoDetections))
        ));
        assert!(arm.calls().is_empty());
        assert!(arm.session_open());
    }

    #[test]
    fn test_three_cans_stack_on_bottom_row() {
        let mut arm = SimulatedArm::default();
        let outcome = runner()
            .run(&mut arm, RecordingPacer::default(), &scene(3))
            .unwrap();

        assert_eq!(outcome.plan.layer_counts(), vec![3]);
        assert!(outcome.plan.slots.iter().all(|s| s.z == 200.0));
        assert_eq!(arm.calls().last(), Some(&ArmCall::EndSession));
        assert!(!arm.session_open());

        // Left-most pixel (281.4) is picked first.
        let first_pick = outcome.plan.tasks[0].source;
        assert!((first_pick.x - 100.0).abs() < 0.5);
        assert!((first_pick.y + 400.0).abs() < 0.5);
    }

    #[test]
    fn test_six_cans_build_full_pyramid() {
        let mut arm = SimulatedArm::default();
        let outcome = runner()
            .run(&mut arm, RecordingPacer::default(), &scene(6))
            .unwrap();

        assert_eq!(outcome.plan.layer_counts(), vec![3, 2, 1]);
        // approach (4) + 6 * 8 + finish (2)
        assert_eq!(outcome.report.completed, 54);
    }

    #[test]
    fn test_eight_cans_ignore_two() {
        let prepared = runner().prepare(&scene(8)).unwrap();
        assert_eq!(prepared.mapped.len(), 8);
        assert_eq!(prepared.plan.len(), 6);
        assert_eq!(prepared.plan.ignored.len(), 2);
        // The two right-most pixels (412.2, 420.6) are dropped.
        let mut ignored: Vec<usize> = prepared.plan.ignored.iter().map(|d| d.index).collect();
        ignored.sort();
        assert_eq!(ignored, vec![0, 2]);
    }

    #[test]
    fn test_remote_failure_halts_the_run() {
        let mut arm = SimulatedArm::default().failing_at(4);
        let result = runner().run(&mut arm, RecordingPacer::default(), &scene(3));

        assert!(matches!(result, Err(StackerError::Motion { step: 3, .. })));
        assert_eq!(arm.calls().len(), 3);
        assert!(arm.session_open());
    }

    #[test]
    fn test_implausible_detections_are_not_planned() {
        let mut detections = scene(3);
        detections.push(Detection::new(300.0, 300.0).with_radius(80.0));
        detections.push(Detection::new(-5.0, 300.0));

        let prepared = runner().prepare(&detections).unwrap();
        assert_eq!(prepared.mapped.len(), 3);
        assert_eq!(prepared.plan.layer_counts(), vec![3]);
        let mut used: Vec<usize> = prepared.plan.tasks.iter().map(|t| t.detection).collect();
        used.sort();
        assert_eq!(used, vec![0, 1, 2]);
    }

    #[test]
    fn test_second_run_waits_for_fresh_detections() {
        let path = std::env::temp_dir().join(format!("can_stacker_rerun_{}.txt", std::process::id()));
        let file = DetectionFile::new(&path)
            .with_poll_interval(std::time::Duration::from_millis(5))
            .with_timeout(Some(std::time::Duration::from_millis(100)));
        file.write_detections(&scene(3)).unwrap();

        let runner = runner();
        let mut arm = SimulatedArm::default();
        runner.run_from_file(&mut arm, RecordingPacer::default(), &file).unwrap();
        let first_run = arm.calls().len();

        let mut arm = SimulatedArm::default();
        let result = runner.run_from_file(&mut arm, RecordingPacer::default(), &file);
        assert!(first_run > 0);
        assert!(matches!(
            result,
            Err(StackerError::Detection(DetectionError::Timeout { .. }))
        ));
        assert!(arm.calls().is_empty());
    }

    #[test]
    fn test_teach_in_closes_session() {
        let mut arm = SimulatedArm::default();
        runner().teach_in(&mut arm, RecordingPacer::default()).unwrap();
        assert!(!arm.session_open());
        let grips = arm
            .calls()
            .iter()
            .filter(|c| **c == ArmCall::SetGripper(630))
            .count();
        assert_eq!(grips, 4);
    }
}
