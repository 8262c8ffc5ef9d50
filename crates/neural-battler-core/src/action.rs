use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;

pub const ACTION_COUNT: usize = 10;

/// Discrete actions available to the steered cell, in network output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Up,
    Right,
    Down,
    Left,
    UpRight,
    DownRight,
    DownLeft,
    UpLeft,
    Stay,
    /// Stay in place and fire the area burst if the mana pool is full.
    Special,
}

impl Action {
    pub const ALL: [Action; ACTION_COUNT] = [
        Action::Up,
        Action::Right,
        Action::Down,
        Action::Left,
        Action::UpRight,
        Action::DownRight,
        Action::DownLeft,
        Action::UpLeft,
        Action::Stay,
        Action::Special,
    ];

    /// Panics when `index >= ACTION_COUNT`.
    pub fn from_index(index: usize) -> Self {
        match Self::ALL.get(index) {
            Some(action) => *action,
            None => panic!("action index {index} out of range (0..{ACTION_COUNT})"),
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Unit direction; the y axis points down as in screen coordinates.
    pub fn direction(self) -> (f64, f64) {
        match self {
            Action::Up => (0.0, -1.0),
            Action::Right => (1.0, 0.0),
            Action::Down => (0.0, 1.0),
            Action::Left => (-1.0, 0.0),
            Action::UpRight => (FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
            Action::DownRight => (FRAC_1_SQRT_2, FRAC_1_SQRT_2),
            Action::DownLeft => (-FRAC_1_SQRT_2, FRAC_1_SQRT_2),
            Action::UpLeft => (-FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
            Action::Stay | Action::Special => (0.0, 0.0),
        }
    }

    pub fn is_special(self) -> bool {
        matches!(self, Action::Special)
    }
}

/// Movement `(dx, dy)` for an action index scaled by `speed`.
/// Out-of-range indices are a programming error and panic.
pub fn action_to_movement(action: usize, speed: f64) -> (f64, f64) {
    let (dx, dy) = Action::from_index(action).direction();
    (dx * speed, dy * speed)
}
