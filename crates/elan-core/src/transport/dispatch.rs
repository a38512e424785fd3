//! Transfer dispatcher.
//!
//! Issues one bulk operation against the scratch buffer and reports exactly
//! one outcome. Serialization is the caller's job: the dispatcher is only
//! reachable through `&mut`, and the transport blocks until completion.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::traits::{TransportError, UsbTransport};
use crate::events::{ElanEvent, ElanObserver};
use crate::protocol::constants::BULK_TIMEOUT_MS;
use crate::protocol::steps::{Direction, Transfer};

/// Bytes of each packet copied into `ElanEvent::Packet`.
const PACKET_PREVIEW: usize = 16;

pub struct Dispatcher<T: UsbTransport, O: ElanObserver> {
    transport: T,
    observer: Arc<O>,
    timeout: Duration,
}

impl<T: UsbTransport, O: ElanObserver> Dispatcher<T, O> {
    pub fn new(transport: T, observer: Arc<O>) -> Self {
        Self {
            transport,
            observer,
            timeout: Duration::from_millis(BULK_TIMEOUT_MS),
        }
    }

    /// Perform `transfer` using the first `transfer.len` bytes of `buffer`.
    ///
    /// OUT transfers send those bytes; IN transfers overwrite them. Returns the
    /// number of bytes actually moved. A short IN transfer is not an error.
    pub fn submit(&mut self, transfer: Transfer, buffer: &mut [u8]) -> Result<usize, TransportError> {
        let capacity = buffer.len();
        let window = buffer
            .get_mut(..transfer.len)
            .ok_or(TransportError::InvalidLength {
                len: transfer.len,
                capacity,
            })?;

        let n = match transfer.direction {
            Direction::Out => self
                .transport
                .bulk_out(transfer.endpoint, window, self.timeout)?,
            Direction::In => self
                .transport
                .bulk_in(transfer.endpoint, window, self.timeout)?,
        };

        if transfer.direction == Direction::In && n < transfer.len {
            debug!(
                ep = %format!("0x{:02X}", transfer.endpoint),
                requested = transfer.len,
                actual = n,
                "Short read"
            );
        }

        self.observer.on_event(&ElanEvent::Packet {
            direction: transfer.direction,
            endpoint: transfer.endpoint,
            length: n,
            data: window[..n].iter().take(PACKET_PREVIEW).copied().collect(),
        });

        Ok(n)
    }

    /// Hand the transport back once the session is over.
    pub fn into_transport(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::protocol::constants::*;
    use crate::transport::mock::{MockFailure, MockTransport};

    fn dispatcher(mock: &MockTransport) -> Dispatcher<MockTransport, NullObserver> {
        let mut t = mock.clone();
        t.claim().unwrap();
        Dispatcher::new(t, Arc::new(NullObserver))
    }

    #[test]
    fn test_write_uses_buffer_prefix() {
        let mock = MockTransport::new();
        let mut d = dispatcher(&mock);
        let mut buffer = vec![0u8; BUFFER_TRANSMIT];
        buffer[..3].copy_from_slice(&[0x40, 0xa8, 0x78]);

        let transfer = Transfer {
            endpoint: EP_COMMAND_OUT,
            direction: Direction::Out,
            len: 3,
        };
        assert_eq!(d.submit(transfer, &mut buffer).unwrap(), 3);
        assert_eq!(mock.writes(), vec![vec![0x40, 0xa8, 0x78]]);
    }

    #[test]
    fn test_read_fills_buffer() {
        let mock = MockTransport::new();
        mock.queue_read(EP_STATUS_IN, &[0xAA; PROBE_LEN]);
        let mut d = dispatcher(&mock);
        let mut buffer = vec![0u8; BUFFER_TRANSMIT];

        let transfer = Transfer {
            endpoint: EP_STATUS_IN,
            direction: Direction::In,
            len: PROBE_LEN,
        };
        assert_eq!(d.submit(transfer, &mut buffer).unwrap(), PROBE_LEN);
        assert!(buffer[..PROBE_LEN].iter().all(|&b| b == 0xAA));
        assert_eq!(buffer[PROBE_LEN], 0);
    }

    #[test]
    fn test_oversized_transfer_rejected() {
        let mock = MockTransport::new();
        let mut d = dispatcher(&mock);
        let mut buffer = vec![0u8; 4];
        let transfer = Transfer {
            endpoint: EP_DATA_IN,
            direction: Direction::In,
            len: BUFFER_TRANSMIT,
        };
        assert!(matches!(
            d.submit(transfer, &mut buffer),
            Err(TransportError::InvalidLength { .. })
        ));
        assert_eq!(mock.op_count(), 0);
    }

    #[test]
    fn test_timeout_reported_as_failure() {
        let mock = MockTransport::new();
        mock.fail_at(0, MockFailure::Timeout);
        let mut d = dispatcher(&mock);
        let mut buffer = vec![0u8; BUFFER_TRANSMIT];
        let transfer = Transfer {
            endpoint: EP_DATA_IN,
            direction: Direction::In,
            len: BUFFER_TRANSMIT,
        };
        match d.submit(transfer, &mut buffer) {
            Err(TransportError::Timeout { timeout_ms }) => assert_eq!(timeout_ms, 1000),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
