//! State machine module.

pub mod machine;
pub mod sequencer;

pub use machine::{SessionControl, StepCursor, Transition};
pub use sequencer::{EIO, ENOMEM, Sequencer, SessionError, SessionOutcome};
