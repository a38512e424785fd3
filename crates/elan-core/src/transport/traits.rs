//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for bulk communication with the sensor,
//! allowing different implementations (nusb, mock).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Interface not claimed")]
    NotClaimed,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Could not allocate {len}-byte transfer")]
    Allocation { len: usize },

    #[error("Transfer length {len} exceeds buffer of {capacity} bytes")]
    InvalidLength { len: usize, capacity: usize },
}

impl TransportError {
    /// Whether the operation context itself could not be set up.
    pub fn is_allocation(&self) -> bool {
        matches!(self, TransportError::Allocation { .. })
    }
}

/// Abstract bulk transport to one sensor.
///
/// Every call blocks until the operation completes, fails or times out, so a
/// caller holding `&mut self` can never have two operations in flight.
pub trait UsbTransport: Send {
    /// Acquire exclusive access to the command interface.
    fn claim(&mut self) -> Result<(), TransportError>;

    /// Give the interface back. Safe to call when not claimed.
    fn release(&mut self);

    /// Write `data` to an OUT endpoint.
    fn bulk_out(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Read up to `buf.len()` bytes from an IN endpoint. Short reads succeed.
    fn bulk_in(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}
