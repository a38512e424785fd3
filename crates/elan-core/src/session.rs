//! Device session - maps open/close/activate/deactivate onto the sequencer.
//!
//! Each activation runs a fresh [`Sequencer`] on its own thread. The
//! transport moves into that thread and comes back through the join handle
//! once the sequencer stops.

use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::events::{ElanEvent, ElanObserver, TracingObserver};
use crate::protocol::constants::{ELAN_PRODUCT_ID, ELAN_VENDOR_ID};
use crate::state::{Sequencer, SessionControl, SessionError, SessionOutcome};
use crate::transport::{TransportError, UsbTransport};

/// Configuration for a capture session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// USB vendor ID of the sensor.
    pub vendor_id: u16,
    /// USB product ID of the sensor.
    pub product_id: u16,
    /// Stop after this many frames. `None` runs until interrupted.
    pub frames: Option<u64>,
    /// Directory to save captured frames to.
    pub output_dir: Option<String>,
    /// Only save frames with a finger on the sensor.
    pub finger_only: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            vendor_id: ELAN_VENDOR_ID,
            product_id: ELAN_PRODUCT_ID,
            frames: None,
            output_dir: None,
            finger_only: false,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device is not open")]
    NotOpen,

    #[error("Device is already open")]
    AlreadyOpen,

    #[error("Capture is already active")]
    AlreadyActive,

    #[error("Failed to open device: {0}")]
    Open(#[source] TransportError),

    #[error("Failed to start capture thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Capture thread died; transport lost")]
    Lost,
}

enum DeviceState<T> {
    /// Interface not claimed.
    Closed(T),
    /// Interface claimed, no capture running.
    Open(T),
    /// A sequencer owns the transport.
    Active {
        control: Arc<SessionControl>,
        handle: JoinHandle<SessionOutcome<T>>,
    },
    /// The capture thread took the transport with it.
    Lost,
}

/// One Elan sensor and its session lifecycle.
pub struct ElanDevice<T: UsbTransport + 'static, O: ElanObserver + 'static> {
    state: DeviceState<T>,
    observer: Arc<O>,
    last_error: Option<SessionError>,
}

impl<T: UsbTransport + 'static> ElanDevice<T, TracingObserver> {
    /// Create a device with the default tracing observer.
    pub fn new(transport: T) -> Self {
        Self::with_observer(transport, Arc::new(TracingObserver))
    }
}

impl<T: UsbTransport + 'static, O: ElanObserver + 'static> ElanDevice<T, O> {
    /// Create a device with a custom observer.
    pub fn with_observer(transport: T, observer: Arc<O>) -> Self {
        Self {
            state: DeviceState::Closed(transport),
            observer,
            last_error: None,
        }
    }

    fn emit(&self, event: ElanEvent) {
        self.observer.on_event(&event);
    }

    /// Claim the command interface.
    #[instrument(skip(self))]
    pub fn open(&mut self) -> Result<(), DeviceError> {
        let claimed = match &mut self.state {
            DeviceState::Closed(transport) => transport.claim(),
            DeviceState::Lost => return Err(DeviceError::Lost),
            _ => return Err(DeviceError::AlreadyOpen),
        };

        match claimed {
            Ok(()) => {
                if let DeviceState::Closed(t) = mem::replace(&mut self.state, DeviceState::Lost) {
                    self.state = DeviceState::Open(t);
                }
                self.emit(ElanEvent::OpenComplete { error: None });
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Could not claim interface");
                self.emit(ElanEvent::OpenComplete {
                    error: Some(e.to_string()),
                });
                Err(DeviceError::Open(e))
            }
        }
    }

    /// Start a fresh capture loop. Returns once the loop is running; frames
    /// arrive through the observer.
    #[instrument(skip(self))]
    pub fn activate(&mut self) -> Result<(), DeviceError> {
        self.reap(false);

        let transport = match mem::replace(&mut self.state, DeviceState::Lost) {
            DeviceState::Open(t) => t,
            DeviceState::Closed(t) => {
                self.state = DeviceState::Closed(t);
                return Err(DeviceError::NotOpen);
            }
            active @ DeviceState::Active { .. } => {
                self.state = active;
                return Err(DeviceError::AlreadyActive);
            }
            DeviceState::Lost => return Err(DeviceError::Lost),
        };

        self.last_error = None;
        let control = Arc::new(SessionControl::new());
        let observer = Arc::clone(&self.observer);
        let thread_control = Arc::clone(&control);

        let spawned = thread::Builder::new()
            .name("elan-capture".into())
            .spawn(move || {
                let _running = RunningGuard(Arc::clone(&thread_control));
                Sequencer::new(transport, observer, thread_control).run()
            });

        match spawned {
            Ok(handle) => {
                self.state = DeviceState::Active { control, handle };
                info!("Capture loop spawned");
                self.emit(ElanEvent::ActivateComplete { error: None });
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Could not spawn capture thread");
                self.emit(ElanEvent::ActivateComplete {
                    error: Some(e.to_string()),
                });
                Err(DeviceError::Spawn(e))
            }
        }
    }

    /// Ask the capture loop to stop.
    ///
    /// If it is running, this returns at once and `DeactivateComplete` follows
    /// from the capture thread at the next cycle boundary. Otherwise
    /// `DeactivateComplete` is reported before returning.
    #[instrument(skip(self))]
    pub fn deactivate(&mut self) {
        if let DeviceState::Active { control, .. } = &self.state
            && control.request_deactivate()
        {
            info!("Deactivation requested");
            return;
        }

        self.reap(false);
        self.emit(ElanEvent::DeactivateComplete);
    }

    /// Release the command interface. A running capture loop is stopped first.
    #[instrument(skip(self))]
    pub fn close(&mut self) -> Result<(), DeviceError> {
        if let DeviceState::Active { control, .. } = &self.state
            && control.request_deactivate()
        {
            warn!("Closing while capture is active, waiting for cycle end");
        }
        self.reap(true);

        match mem::replace(&mut self.state, DeviceState::Lost) {
            DeviceState::Open(mut t) => {
                t.release();
                self.state = DeviceState::Closed(t);
                self.emit(ElanEvent::CloseComplete);
                Ok(())
            }
            DeviceState::Closed(t) => {
                self.state = DeviceState::Closed(t);
                Err(DeviceError::NotOpen)
            }
            other => {
                self.state = other;
                Err(DeviceError::Lost)
            }
        }
    }

    /// Block until the capture loop has stopped on its own.
    pub fn wait(&mut self) {
        self.reap(true);
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.state,
            DeviceState::Open(_) | DeviceState::Active { .. }
        )
    }

    /// Whether a capture loop is currently running.
    pub fn is_active(&self) -> bool {
        matches!(&self.state, DeviceState::Active { control, .. } if control.is_running())
    }

    /// The error that ended the last capture loop, if it aborted.
    pub fn take_session_error(&mut self) -> Option<SessionError> {
        self.last_error.take()
    }

    /// Join a finished capture thread and take the transport back.
    /// With `block`, join even if the loop is still running.
    fn reap(&mut self, block: bool) {
        match &self.state {
            DeviceState::Active { control, .. } if block || !control.is_running() => {}
            _ => return,
        }

        match mem::replace(&mut self.state, DeviceState::Lost) {
            DeviceState::Active { handle, .. } => match handle.join() {
                Ok(outcome) => {
                    self.last_error = outcome.error;
                    self.state = DeviceState::Open(outcome.transport);
                }
                Err(_) => error!("Capture thread panicked, transport lost"),
            },
            other => self.state = other,
        }
    }
}

/// Clears the running flag when the capture thread exits, including by unwinding.
struct RunningGuard(Arc<SessionControl>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if self.0.finish() && thread::panicking() {
            warn!("Capture thread unwound with a deactivation pending");
        }
    }
}

impl<T: UsbTransport + 'static, O: ElanObserver + 'static> Drop for ElanDevice<T, O> {
    fn drop(&mut self) {
        if let DeviceState::Active { control, .. } = &self.state {
            control.request_deactivate();
        }
        self.reap(true);
        if let DeviceState::Open(t) = &mut self.state {
            t.release();
        }
    }
}
