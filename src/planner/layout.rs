//! Pyramid slot geometry.

use super::StackSlot;
use crate::config::{StackConfig, MAX_STACK_CANS};

/// Row anchors of a three-two-one pyramid laid out along robot x.
#[derive(Debug, Clone, PartialEq)]
pub struct StackLayout {
    bottom: [f64; 3],
    middle: [f64; 2],
    top: f64,
    y: f64,
    z_pick: f64,
    can_height: f64,
}

impl StackLayout {
    pub fn new(config: &StackConfig) -> Self {
        let x0 = config.origin_x;
        let s = config.spacing;
        Self {
            bottom: [x0, x0 + s, x0 + 2.0 * s],
            middle: [x0 + 0.5 * s, x0 + 1.5 * s],
            top: x0 + s,
            y: config.origin_y,
            z_pick: config.z_pick,
            can_height: config.can_height,
        }
    }

    fn slot(&self, x: f64, layer: u32) -> StackSlot {
        StackSlot {
            x,
            y: self.y,
            z: self.z_pick + layer as f64 * self.can_height,
            layer,
        }
    }

    fn bottom_row(&self) -> impl Iterator<Item = StackSlot> + '_ {
        self.bottom.iter().map(move |&x| self.slot(x, 0))
    }

    fn middle_row(&self, count: usize) -> impl Iterator<Item = StackSlot> + '_ {
        self.middle.iter().take(count).map(move |&x| self.slot(x, 1))
    }

    /// Slots for `count` cans in placement order (lower layers first).
    /// Counts above six are clamped; zero yields no slots.
    pub fn slots_for(&self, count: usize) -> Vec<StackSlot> {
        match count.min(MAX_STACK_CANS) {
            0 => Vec::new(),
            1 => vec![self.slot(self.top, 2)],
            2 => self.middle_row(2).collect(),
            3 => self.bottom_row().collect(),
            n @ 4..=5 => self.bottom_row().chain(self.middle_row(n - 3)).collect(),
            _ => self
                .bottom_row()
                .chain(self.middle_row(2))
                .chain(std::iter::once(self.slot(self.top, 2)))
                .collect(),
        }
    }
}
