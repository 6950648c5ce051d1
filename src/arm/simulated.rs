//! In-memory arm used for dry runs and tests.

use super::{ArmController, ArmError, Pose};

/// A command the simulated arm accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum ArmCall {
    Move(Pose),
    SetGripper(i64),
    EndSession,
}

/// Records every accepted command and can be told to reject one.
#[derive(Debug, Clone)]
pub struct SimulatedArm {
    pose: Pose,
    gripper: i64,
    calls: Vec<ArmCall>,
    /// 1-based index of the command to reject.
    fail_at: Option<usize>,
    attempts: usize,
    session_open: bool,
}

impl Default for SimulatedArm {
    fn default() -> Self {
        Self::new(Pose::new(0.0, -400.0, 300.0, 180.0, 0.0, 180.0), 800)
    }
}

impl SimulatedArm {
    pub fn new(pose: Pose, gripper: i64) -> Self {
        Self {
            pose,
            gripper,
            calls: Vec::new(),
            fail_at: None,
            attempts: 0,
            session_open: true,
        }
    }

    /// Reject the `n`th command (1-based) with a server error.
    pub fn failing_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Commands accepted so far.
    pub fn calls(&self) -> &[ArmCall] {
        &self.calls
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn session_open(&self) -> bool {
        self.session_open
    }

    fn accept(&mut self, operation: &'static str) -> Result<(), ArmError> {
        if !self.session_open {
            return Err(ArmError::SessionClosed);
        }
        self.attempts += 1;
        if self.fail_at == Some(self.attempts) {
            tracing::debug!(operation, attempt = self.attempts, "simulated failure");
            return Err(ArmError::Remote {
                operation,
                status: 500,
            });
        }
        Ok(())
    }
}

impl ArmController for SimulatedArm {
    fn move_to(&mut self, pose: &Pose) -> Result<(), ArmError> {
        self.accept("move")?;
        tracing::info!(%pose, "simulated move");
        self.pose = *pose;
        self.calls.push(ArmCall::Move(*pose));
        Ok(())
    }

    fn tcp_pose(&mut self) -> Result<Pose, ArmError> {
        if !self.session_open {
            return Err(ArmError::SessionClosed);
        }
        Ok(self.pose)
    }

    fn gripper(&mut self) -> Result<i64, ArmError> {
        if !self.session_open {
            return Err(ArmError::SessionClosed);
        }
        Ok(self.gripper)
    }

    fn set_gripper(&mut self, value: i64) -> Result<(), ArmError> {
        self.accept("set gripper")?;
        tracing::info!(value, "simulated gripper");
        self.gripper = value;
        self.calls.push(ArmCall::SetGripper(value));
        Ok(())
    }

    fn end_session(&mut self) -> Result<(), ArmError> {
        self.accept("end session")?;
        self.session_open = false;
        self.calls.push(ArmCall::EndSession);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_requested_command_only() {
        let mut arm = SimulatedArm::default().failing_at(2);
        let pose = Pose::new(1.0, 2.0, 3.0, 180.0, 0.0, 180.0);

        assert!(arm.move_to(&pose).is_ok());
        assert!(matches!(
            arm.set_gripper(630),
            Err(ArmError::Remote { status: 500, .. })
        ));
        assert!(arm.set_gripper(630).is_ok());
        assert_eq!(arm.calls(), &[ArmCall::Move(pose), ArmCall::SetGripper(630)]);
    }

    #[test]
    fn test_closed_session_refuses_commands() {
        let mut arm = SimulatedArm::default();
        arm.end_session().unwrap();
        assert!(!arm.session_open());
        assert!(matches!(arm.gripper(), Err(ArmError::SessionClosed)));
    }
}
