//! Sequencer state: step cursor and stop handshake.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::protocol::steps::{CYCLE_START, STEP_COUNT, STEPS, Step};

/// What the sequencer does after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Advance to the next ordinal.
    Next,
    /// Go back to the start of the capture cycle.
    Restart,
    /// Stop: deactivation was requested at a cycle boundary.
    Complete,
}

#[derive(Debug)]
struct Flags {
    deactivating: bool,
    running: bool,
}

/// Stop handshake shared between the lifecycle controller and a running
/// sequencer. Both flags sit behind one lock so a deactivation request can
/// never slip between the sequencer stopping and it checking for one.
#[derive(Debug)]
pub struct SessionControl {
    flags: Mutex<Flags>,
}

impl SessionControl {
    /// Fresh control block for a sequencer that is about to start.
    pub fn new() -> Self {
        Self {
            flags: Mutex::new(Flags {
                deactivating: false,
                running: true,
            }),
        }
    }

    fn flags(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the sequencer to stop at the next cycle boundary.
    ///
    /// Returns `false` if the sequencer has already stopped, in which case
    /// nobody else will report deactivation.
    pub fn request_deactivate(&self) -> bool {
        let mut flags = self.flags();
        if flags.running {
            flags.deactivating = true;
        }
        flags.running
    }

    pub fn is_deactivating(&self) -> bool {
        self.flags().deactivating
    }

    pub fn is_running(&self) -> bool {
        self.flags().running
    }

    /// Mark the sequencer stopped. Returns whether deactivation was requested.
    pub(crate) fn finish(&self) -> bool {
        let mut flags = self.flags();
        flags.running = false;
        flags.deactivating
    }
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over [`STEPS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepCursor {
    index: usize,
}

impl StepCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn step(&self) -> &'static Step {
        &STEPS[self.index]
    }

    /// True when the cursor sits on the scan command that opens a cycle.
    pub fn at_cycle_start(&self) -> bool {
        self.index == CYCLE_START
    }

    /// Apply a transition. `Complete` leaves the cursor where it is.
    pub fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Next => {
                debug_assert!(self.index + 1 < STEP_COUNT, "ran off the step table");
                self.index += 1;
            }
            Transition::Restart => self.index = CYCLE_START,
            Transition::Complete => {}
        }
    }
}

impl fmt::Display for StepCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.step().name, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_walks_and_restarts() {
        let mut cursor = StepCursor::new();
        assert_eq!(cursor.step().name, "INIT_001");
        for _ in 0..CYCLE_START {
            cursor.apply(Transition::Next);
        }
        assert!(cursor.at_cycle_start());
        cursor.apply(Transition::Next);
        cursor.apply(Transition::Next);
        cursor.apply(Transition::Next);
        assert_eq!(cursor.step().name, "LOOP_CAPTURE_DONE");
        cursor.apply(Transition::Restart);
        assert!(cursor.at_cycle_start());
        cursor.apply(Transition::Complete);
        assert!(cursor.at_cycle_start());
    }

    #[test]
    fn test_control_handshake() {
        let control = SessionControl::new();
        assert!(control.is_running());
        assert!(!control.is_deactivating());
        assert!(control.request_deactivate());
        assert!(control.is_deactivating());
        assert!(control.finish());
        assert!(!control.is_running());
    }

    #[test]
    fn test_request_after_stop_is_refused() {
        let control = SessionControl::new();
        assert!(!control.finish());
        assert!(!control.request_deactivate());
        assert!(!control.is_deactivating());
    }
}
