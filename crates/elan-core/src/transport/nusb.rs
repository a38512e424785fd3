//! nusb-based USB transport implementation.

use std::time::Duration;

use nusb::transfer::{Buffer, Bulk, Completion, In, Out, TransferError};
use nusb::{Device, Endpoint, Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, warn};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{
    EP_COMMAND_OUT, EP_DATA_IN, EP_STATUS_IN, INTERFACE_NUMBER, SUPPORTED_IDS,
};

/// Endpoints held while the interface is claimed.
struct Claimed {
    command: Endpoint<Bulk, Out>,
    data: Endpoint<Bulk, In>,
    status: Endpoint<Bulk, In>,
    // Dropped last so the endpoints go first.
    _interface: Interface,
}

/// nusb-based USB transport.
pub struct NusbTransport {
    device: Device,
    claimed: Option<Claimed>,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open the first supported Elan sensor.
    #[instrument(level = "info")]
    pub fn open() -> Result<Self, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        for device_info in devices {
            let ids = (device_info.vendor_id(), device_info.product_id());
            if SUPPORTED_IDS.contains(&ids) {
                return Self::open_device_info(device_info);
            }
        }

        let (vid, pid) = SUPPORTED_IDS[0];
        Err(TransportError::DeviceNotFound { vid, pid })
    }

    /// Open a device with specific VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open_device_info(device_info)
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        Ok(Self {
            device,
            claimed: None,
            vid,
            pid,
        })
    }

    fn claimed(&mut self) -> Result<&mut Claimed, TransportError> {
        self.claimed.as_mut().ok_or(TransportError::NotClaimed)
    }
}

/// Reserve the transfer buffer up front so exhaustion is reported, not aborted on.
fn allocate(len: usize) -> Result<Vec<u8>, TransportError> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(len)
        .map_err(|_| TransportError::Allocation { len })?;
    Ok(vec)
}

/// The part of an endpoint's completion queue the timeout path needs.
trait CompletionQueue {
    type Completion;

    fn pending(&self) -> usize;
    fn cancel_all(&mut self);
    fn wait_next(&mut self, timeout: Duration) -> Option<Self::Completion>;
}

impl<D: nusb::transfer::EndpointDirection> CompletionQueue for Endpoint<Bulk, D> {
    type Completion = Completion;

    fn pending(&self) -> usize {
        Endpoint::pending(self)
    }

    fn cancel_all(&mut self) {
        Endpoint::cancel_all(self)
    }

    fn wait_next(&mut self, timeout: Duration) -> Option<Completion> {
        self.wait_next_complete(timeout)
    }
}

/// Cancel and reap everything still in flight. Returns how many transfers
/// are still pending afterwards.
fn drain<Q: CompletionQueue>(queue: &mut Q, timeout: Duration) -> usize {
    if queue.pending() == 0 {
        return 0;
    }
    queue.cancel_all();
    while queue.pending() > 0 {
        if queue.wait_next(timeout).is_none() {
            let left = queue.pending();
            warn!(pending = left, "Cancelled transfer was not reaped");
            return left;
        }
    }
    0
}

/// Submit one transfer and wait for it. On timeout the transfer is cancelled
/// and drained before returning. Anything left over from an earlier timeout
/// is drained before submitting, so a stale completion is never taken for
/// this transfer's.
fn run_transfer<D: nusb::transfer::EndpointDirection>(
    ep: &mut Endpoint<Bulk, D>,
    buffer: Buffer,
    timeout: Duration,
) -> Result<Completion, TransportError> {
    if drain(&mut *ep, timeout) > 0 {
        return Err(TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        });
    }

    ep.submit(buffer);

    match ep.wait_next_complete(timeout) {
        Some(completion) => Ok(completion),
        None => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Transfer timed out, cancelling");
            drain(&mut *ep, timeout);
            Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

fn map_status(e: TransferError, on_other: fn(String) -> TransportError) -> TransportError {
    match e {
        TransferError::Disconnected => TransportError::Disconnected,
        other => on_other(other.to_string()),
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self), fields(interface = INTERFACE_NUMBER))]
    fn claim(&mut self) -> Result<(), TransportError> {
        if self.claimed.is_some() {
            return Ok(());
        }

        let interface = self
            .device
            .claim_interface(INTERFACE_NUMBER)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: INTERFACE_NUMBER,
                message: e.to_string(),
            })?;

        let endpoint_err = |e: nusb::Error| TransportError::ClaimInterfaceFailed {
            interface: INTERFACE_NUMBER,
            message: e.to_string(),
        };
        let command = interface
            .endpoint::<Bulk, Out>(EP_COMMAND_OUT)
            .map_err(endpoint_err)?;
        let data = interface
            .endpoint::<Bulk, In>(EP_DATA_IN)
            .map_err(endpoint_err)?;
        let status = interface
            .endpoint::<Bulk, In>(EP_STATUS_IN)
            .map_err(endpoint_err)?;

        info!(
            cmd_ep = %format!("0x{:02X}", EP_COMMAND_OUT),
            data_ep = %format!("0x{:02X}", EP_DATA_IN),
            status_ep = %format!("0x{:02X}", EP_STATUS_IN),
            "Interface claimed"
        );

        self.claimed = Some(Claimed {
            command,
            data,
            status,
            _interface: interface,
        });
        Ok(())
    }

    fn release(&mut self) {
        if self.claimed.take().is_some() {
            info!(interface = INTERFACE_NUMBER, "Interface released");
        }
    }

    #[instrument(skip(self, data), fields(ep = %format!("0x{:02X}", endpoint), len = data.len()))]
    fn bulk_out(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut vec = allocate(data.len())?;
        vec.extend_from_slice(data);

        let claimed = self.claimed()?;
        if endpoint != EP_COMMAND_OUT {
            return Err(TransportError::WriteFailed(format!(
                "no OUT endpoint 0x{:02X}",
                endpoint
            )));
        }

        let completion = run_transfer(&mut claimed.command, Buffer::from(vec), timeout)?;
        completion
            .status
            .map_err(|e| map_status(e, TransportError::WriteFailed))?;

        debug!(bytes_written = completion.actual_len, "Write complete");
        Ok(completion.actual_len)
    }

    #[instrument(skip(self, buf), fields(ep = %format!("0x{:02X}", endpoint), max_len = buf.len()))]
    fn bulk_in(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let len = buf.len();
        let vec = allocate(len)?;

        let claimed = self.claimed()?;
        let ep = match endpoint {
            EP_DATA_IN => &mut claimed.data,
            EP_STATUS_IN => &mut claimed.status,
            other => {
                return Err(TransportError::ReadFailed(format!(
                    "no IN endpoint 0x{:02X}",
                    other
                )));
            }
        };

        let mut buffer = Buffer::from(vec);
        buffer.set_requested_len(len);

        let completion = run_transfer(ep, buffer, timeout)?;
        completion
            .status
            .map_err(|e| map_status(e, TransportError::ReadFailed))?;

        let n = completion.actual_len.min(len).min(completion.buffer.len());
        buf[..n].copy_from_slice(&completion.buffer[..n]);

        debug!(bytes_read = n, "Read complete");
        Ok(n)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
