//! Protocol module - Elan sensor protocol definitions.

pub mod constants;
pub mod info;
pub mod steps;

pub use constants::*;
pub use info::{DRIVER_INFO, DriverInfo, ScanType};
pub use steps::{Action, CYCLE_START, Direction, FramePart, STEPS, Step, Transfer};
