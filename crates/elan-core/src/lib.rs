//! Elan-Core: driver for the Elan 04f3:0c03 fingerprint sensor in Rust.
//!
//! This crate drives the sensor over three bulk endpoints, rebuilds a
//! grayscale image from its raw 16-bit samples and decides whether a finger
//! is present, in a continuous capture loop.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, command bytes, the fixed step table
//! - **Transport**: USB bulk abstraction (nusb, mock) and the transfer dispatcher
//! - **Frame**: Capture images and half-frame assembly
//! - **Detect**: Finger presence classifier
//! - **State**: Step cursor, stop handshake and the protocol sequencer
//! - **Events**: Observer pattern for host decoupling
//! - **Session**: open/close/activate/deactivate lifecycle
//!
//! # Example
//!
//! ```no_run
//! use elan_core::session::ElanDevice;
//! use elan_core::transport::NusbTransport;
//!
//! let transport = NusbTransport::open().expect("no sensor");
//! let mut device = ElanDevice::new(transport);
//! device.open().expect("claim failed");
//! device.activate().expect("activate failed");
//! // ... frames arrive through the observer ...
//! device.deactivate();
//! device.wait();
//! device.close().expect("close failed");
//! ```

pub mod detect;
pub mod events;
pub mod frame;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use detect::{FrameStats, finger_is_present};
pub use events::{ElanEvent, ElanObserver, LogLevel, NullObserver, TracingObserver};
pub use frame::{CaptureImage, ImageFlags, assemble_half, tone};
pub use protocol::{DRIVER_INFO, DriverInfo, ScanType};
pub use session::{DeviceError, ElanDevice, SessionConfig};
pub use state::{Sequencer, SessionControl, SessionError};
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
