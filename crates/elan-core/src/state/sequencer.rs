//! Protocol sequencer - runs the step table against one sensor.
//!
//! The sequencer owns the scratch buffer and the in-flight capture image.
//! It issues exactly one transfer per step and never starts the next one
//! before the previous one has returned. After `LOOP_CAPTURE_DONE` it jumps
//! back to `LOOP_CMD_SCAN`; a deactivation request is honored only there.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, instrument};

use super::machine::{SessionControl, StepCursor, Transition};
use crate::detect::finger_is_present;
use crate::events::{ElanEvent, ElanObserver, LogLevel};
use crate::frame::{CaptureImage, assemble_half};
use crate::protocol::constants::{BUFFER_TRANSMIT, ENLARGE_FACTOR};
use crate::protocol::steps::{Action, FramePart, Step};
use crate::transport::{Dispatcher, TransportError, UsbTransport};

/// errno reported for any failed transfer.
pub const EIO: i32 = 5;
/// errno reported when a transfer could not be allocated.
pub const ENOMEM: i32 = 12;

/// A transfer failed and the capture loop aborted.
#[derive(Error, Debug)]
#[error("step {step} failed: {source}")]
pub struct SessionError {
    /// Name of the step that issued the failing transfer.
    pub step: &'static str,
    #[source]
    pub source: TransportError,
}

impl SessionError {
    /// Negative errno surfaced to the host.
    pub fn code(&self) -> i32 {
        if self.source.is_allocation() {
            -ENOMEM
        } else {
            -EIO
        }
    }
}

/// What a finished sequencer hands back.
pub struct SessionOutcome<T> {
    pub transport: T,
    pub error: Option<SessionError>,
}

pub struct Sequencer<T: UsbTransport, O: ElanObserver> {
    dispatcher: Dispatcher<T, O>,
    observer: Arc<O>,
    control: Arc<SessionControl>,
    scratch: Box<[u8]>,
    capture: Option<CaptureImage>,
    cursor: StepCursor,
    error: Option<SessionError>,
}

impl<T: UsbTransport, O: ElanObserver> Sequencer<T, O> {
    /// Create a sequencer positioned on the first init step.
    ///
    /// `transport` must already be claimed.
    pub fn new(transport: T, observer: Arc<O>, control: Arc<SessionControl>) -> Self {
        Self {
            dispatcher: Dispatcher::new(transport, Arc::clone(&observer)),
            observer,
            control,
            scratch: vec![0u8; BUFFER_TRANSMIT].into_boxed_slice(),
            capture: None,
            cursor: StepCursor::new(),
            error: None,
        }
    }

    /// The error that aborted the loop, if any.
    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    /// Run until deactivated or aborted, report completion, and hand the
    /// transport back.
    #[instrument(skip(self))]
    pub fn run(mut self) -> SessionOutcome<T> {
        let result = self.drive();
        self.finish(result);
        SessionOutcome {
            error: self.error.take(),
            transport: self.dispatcher.into_transport(),
        }
    }

    fn drive(&mut self) -> Result<(), SessionError> {
        self.log(LogLevel::Info, "Capture loop started");
        loop {
            match self.run_step()? {
                Transition::Complete => return Ok(()),
                transition => self.cursor.apply(transition),
            }
        }
    }

    /// Release the capture image, clear the running flag and report.
    fn finish(&mut self, result: Result<(), SessionError>) {
        if self.capture.take().is_some() {
            debug!("Discarding partial capture image");
        }

        let deactivating = self.control.finish();

        if let Err(e) = result {
            error!(step = e.step, error = %e.source, "Capture loop aborted");
            self.observer.on_event(&ElanEvent::SessionError {
                code: e.code(),
                message: e.to_string(),
            });
            self.error = Some(e);
        } else {
            self.log(LogLevel::Info, "Capture loop completed");
        }

        if deactivating {
            self.observer.on_event(&ElanEvent::DeactivateComplete);
        }
    }

    fn run_step(&mut self) -> Result<Transition, SessionError> {
        let step = self.cursor.step();

        if self.cursor.at_cycle_start() && self.control.is_deactivating() {
            debug!("Deactivating, marking completed");
            return Ok(Transition::Complete);
        }

        self.observer.on_event(&ElanEvent::StepEntered {
            index: self.cursor.index(),
            name: step.name,
        });
        debug!(step = %self.cursor, "Running step");

        match step.action {
            Action::SendCommand(bytes) => {
                self.scratch[..bytes.len()].copy_from_slice(bytes);
                self.issue(step)?;
            }
            Action::ProbeRead | Action::FrameRead(FramePart::Discard) => {
                self.issue(step)?;
            }
            Action::FrameRead(FramePart::FirstHalf) => {
                self.capture = Some(CaptureImage::new_frame());
                self.issue(step)?;
            }
            Action::FrameRead(FramePart::SecondHalf) => {
                // Scratch still holds the first half; consume it before
                // the next read overwrites it.
                match self.capture.as_mut() {
                    Some(img) => assemble_half(&self.scratch, img.halves_mut().0),
                    None => self.log(LogLevel::Warn, "No capture image for first half"),
                }
                self.issue(step)?;
            }
            Action::AssembleAndReport => {
                self.assemble_and_report();
                return Ok(Transition::Restart);
            }
        }

        Ok(Transition::Next)
    }

    fn issue(&mut self, step: &'static Step) -> Result<usize, SessionError> {
        let Some(transfer) = step.action.transfer() else {
            return Ok(0);
        };
        self.dispatcher
            .submit(transfer, &mut self.scratch)
            .map_err(|source| SessionError {
                step: step.name,
                source,
            })
    }

    fn assemble_and_report(&mut self) {
        let Some(mut img) = self.capture.take() else {
            self.log(LogLevel::Warn, "No capture image to report");
            return;
        };
        assemble_half(&self.scratch, img.halves_mut().1);

        let present = finger_is_present(img.data());
        self.observer.on_event(&ElanEvent::FingerStatus { present });

        let enlarged = img.enlarge(ENLARGE_FACTOR);
        self.observer.on_event(&ElanEvent::ImageCaptured { image: enlarged });
        self.log(
            LogLevel::Trace,
            format!("Frame delivered (finger present: {})", present),
        );
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.observer.on_event(&ElanEvent::Log {
            level,
            message: message.into(),
        });
    }
}
