//! Stack planning: which detected can goes to which pyramid slot, in which
//! order, at which height.

mod layout;

pub use layout::StackLayout;

use thiserror::Error;

use crate::calibration::{MappedDetection, RobotPoint};
use crate::config::StackConfig;

/// A placement target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackSlot {
    pub x: f64,
    pub y: f64,
    /// Gripper height when releasing the can.
    pub z: f64,
    /// 0 = on the table.
    pub layer: u32,
}

/// One pick-and-place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickPlaceTask {
    /// Index of the detection in the detection file.
    pub detection: usize,
    pub source: RobotPoint,
    pub destination: StackSlot,
}

/// Slots and tasks for one run. Tasks must run in order.
#[derive(Debug, Clone, PartialEq)]
pub struct StackPlan {
    pub slots: Vec<StackSlot>,
    pub tasks: Vec<PickPlaceTask>,
    /// Detections beyond capacity, in sorted order.
    pub ignored: Vec<MappedDetection>,
}

impl StackPlan {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of slots on each layer, bottom first.
    pub fn layer_counts(&self) -> Vec<usize> {
        let top = self.slots.iter().map(|s| s.layer).max();
        let Some(top) = top else {
            return Vec::new();
        };
        (0..=top)
            .map(|layer| self.slots.iter().filter(|s| s.layer == layer).count())
            .collect()
    }
}

impl std::fmt::Display for StackPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Stack plan: {} can(s)", self.tasks.len())?;
        for (i, task) in self.tasks.iter().enumerate() {
            writeln!(
                f,
                "  {}. detection {} at ({:.1}, {:.1}) -> slot ({:.1}, {:.1}) z={:.1} layer {}",
                i + 1,
                task.detection,
                task.source.x,
                task.source.y,
                task.destination.x,
                task.destination.y,
                task.destination.z,
                task.destination.layer
            )?;
        }
        if !self.ignored.is_empty() {
            write!(f, "  ignored detections:")?;
            for d in &self.ignored {
                write!(f, " {}", d.index)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Planning errors; both abort the run before any motion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("no cans detected")]
    NoDetections,
    #[error("found {found} can(s), at least {required} required")]
    InsufficientDetections { found: usize, required: usize },
}

/// Assigns detections to pyramid slots.
#[derive(Debug, Clone)]
pub struct StackPlanner {
    layout: StackLayout,
    min_cans: usize,
    max_cans: usize,
}

impl StackPlanner {
    pub fn new(config: &StackConfig) -> Self {
        Self {
            layout: StackLayout::new(config),
            min_cans: config.min_cans.max(1),
            max_cans: config.max_cans.clamp(1, crate::config::MAX_STACK_CANS),
        }
    }

    /// Sort detections left to right in the image, keep at most `max_cans`,
    /// and assign the i-th to the i-th slot.
    pub fn plan(&self, detections: &[MappedDetection]) -> Result<StackPlan, PlanError> {
        let found = detections.len();
        if found == 0 {
            return Err(PlanError::NoDetections);
        }
        if found < self.min_cans {
            return Err(PlanError::InsufficientDetections {
                found,
                required: self.min_cans,
            });
        }

        let mut sorted = detections.to_vec();
        sorted.sort_by(|a, b| {
            a.pixel
                .u
                .total_cmp(&b.pixel.u)
                .then(a.pixel.v.total_cmp(&b.pixel.v))
        });

        let ignored = if sorted.len() > self.max_cans {
            let ignored = sorted.split_off(self.max_cans);
            tracing::warn!(
                found,
                used = self.max_cans,
                ignored = ignored.len(),
                "more cans detected than the stack holds, ignoring the right-most"
            );
            ignored
        } else {
            Vec::new()
        };

        let slots = self.layout.slots_for(sorted.len());
        let tasks: Vec<PickPlaceTask> = sorted
            .iter()
            .zip(&slots)
            .map(|(detection, slot)| PickPlaceTask {
                detection: detection.index,
                source: detection.robot,
                destination: *slot,
            })
            .collect();

        tracing::info!(cans = tasks.len(), "stack planned");
        Ok(StackPlan {
            slots,
            tasks,
            ignored,
        })
    }
}
