//! Event system for host decoupling.
//!
//! Every outbound call the driver makes to its host (open/close/activate/
//! deactivate completions, finger status, captured images, session errors)
//! is an [`ElanEvent`] delivered to an [`ElanObserver`].

use std::fmt;

use crate::frame::CaptureImage;
use crate::protocol::steps::Direction;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Info,
    Warn,
}

/// Events emitted by the driver.
#[derive(Debug, Clone)]
pub enum ElanEvent {
    /// `open` finished. `error` is set when the interface could not be claimed.
    OpenComplete { error: Option<String> },
    /// `close` finished.
    CloseComplete,
    /// `activate` accepted (capture runs on in the background).
    ActivateComplete { error: Option<String> },
    /// The capture loop stopped after a deactivation request.
    DeactivateComplete,
    /// Verdict for the frame that is about to be delivered.
    FingerStatus { present: bool },
    /// A finished, enlarged frame.
    ImageCaptured { image: CaptureImage },
    /// The capture loop aborted. `code` is a negative errno.
    SessionError { code: i32, message: String },
    /// The sequencer is about to run a step.
    StepEntered { index: usize, name: &'static str },
    /// A bulk transfer completed.
    Packet {
        direction: Direction,
        endpoint: u8,
        length: usize,
        data: Vec<u8>,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
}

impl fmt::Display for ElanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElanEvent::OpenComplete { error: None } => write!(f, "open complete"),
            ElanEvent::OpenComplete { error: Some(e) } => write!(f, "open failed: {}", e),
            ElanEvent::CloseComplete => write!(f, "close complete"),
            ElanEvent::ActivateComplete { error: None } => write!(f, "activate complete"),
            ElanEvent::ActivateComplete { error: Some(e) } => {
                write!(f, "activate failed: {}", e)
            }
            ElanEvent::DeactivateComplete => write!(f, "deactivate complete"),
            ElanEvent::FingerStatus { present } => write!(f, "finger present: {}", present),
            ElanEvent::ImageCaptured { image } => {
                write!(f, "image captured ({}x{})", image.width(), image.height())
            }
            ElanEvent::SessionError { code, message } => {
                write!(f, "session error {}: {}", code, message)
            }
            ElanEvent::StepEntered { index, name } => write!(f, "step {} {}", index, name),
            ElanEvent::Packet {
                direction,
                endpoint,
                length,
                ..
            } => write!(f, "{} 0x{:02X} {} bytes", direction, endpoint, length),
            ElanEvent::Log { message, .. } => write!(f, "{}", message),
        }
    }
}

/// Observer trait for receiving driver events.
///
/// Implement this in the host layer. Events are delivered from the capture
/// thread while a session is active, so implementations must be `Send + Sync`.
pub trait ElanObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &ElanEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl ElanObserver for NullObserver {
    fn on_event(&self, _event: &ElanEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl ElanObserver for TracingObserver {
    fn on_event(&self, event: &ElanEvent) {
        match event {
            ElanEvent::OpenComplete { error: None } => tracing::info!("Device opened"),
            ElanEvent::OpenComplete { error: Some(e) } => {
                tracing::error!(error = %e, "Device open failed")
            }
            ElanEvent::CloseComplete => tracing::info!("Device closed"),
            ElanEvent::ActivateComplete { error: None } => tracing::info!("Capture activated"),
            ElanEvent::ActivateComplete { error: Some(e) } => {
                tracing::error!(error = %e, "Activation failed")
            }
            ElanEvent::DeactivateComplete => tracing::info!("Capture deactivated"),
            ElanEvent::FingerStatus { present } => {
                tracing::debug!(present = present, "Finger status")
            }
            ElanEvent::ImageCaptured { image } => {
                tracing::info!(
                    width = image.width(),
                    height = image.height(),
                    inverted = image.colors_inverted(),
                    "Image captured"
                );
            }
            ElanEvent::SessionError { code, message } => {
                tracing::error!(code = code, "Session error: {}", message);
            }
            ElanEvent::StepEntered { index, name } => {
                tracing::trace!(index = index, step = name, "Step");
            }
            ElanEvent::Packet {
                direction,
                endpoint,
                length,
                ..
            } => {
                tracing::trace!(
                    dir = %direction,
                    ep = %format!("0x{:02X}", endpoint),
                    len = length,
                    "USB Packet"
                );
            }
            ElanEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
            },
        }
    }
}
