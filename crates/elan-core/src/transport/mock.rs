//! Mock USB transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{ELAN_PRODUCT_ID, ELAN_VENDOR_ID};
use crate::protocol::steps::Direction;

/// One operation seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockOp {
    pub endpoint: u8,
    pub direction: Direction,
    /// Bytes written (OUT) or requested length worth of zeros (IN).
    pub data: Vec<u8>,
}

/// Which kind of failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Allocation,
    Disconnect,
}

#[derive(Debug, Default)]
struct MockState {
    /// Queued IN payloads per endpoint.
    reads: Vec<(u8, VecDeque<Vec<u8>>)>,
    /// Payload returned when an endpoint queue is empty.
    fallback: Vec<(u8, Vec<u8>)>,
    /// Every operation attempted, in order.
    ops: Vec<MockOp>,
    /// Fail the operation with this zero-based index.
    fail_at: Option<(usize, MockFailure)>,
    claimed: bool,
    claim_fails: bool,
}

/// Mock transport for unit testing sequencer and lifecycle logic.
///
/// Clones share state, so a test can keep a handle while the transport
/// itself moves into a session thread.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    vid: u16,
    pid: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            vid: ELAN_VENDOR_ID,
            pid: ELAN_PRODUCT_ID,
        }
    }

    /// Queue a payload to be returned by the next read on `endpoint`.
    pub fn queue_read(&self, endpoint: u8, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        match state.reads.iter_mut().find(|(ep, _)| *ep == endpoint) {
            Some((_, queue)) => queue.push_back(data.to_vec()),
            None => state
                .reads
                .push((endpoint, VecDeque::from(vec![data.to_vec()]))),
        }
    }

    /// Payload returned by reads on `endpoint` once its queue is empty.
    /// Without one, reads return zeros.
    pub fn set_fallback(&self, endpoint: u8, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.fallback.retain(|(ep, _)| *ep != endpoint);
        state.fallback.push((endpoint, data.to_vec()));
    }

    /// Fail the `index`-th operation (zero-based) with `failure`.
    pub fn fail_at(&self, index: usize, failure: MockFailure) {
        self.state.lock().unwrap().fail_at = Some((index, failure));
    }

    /// Make the next `claim` fail.
    pub fn fail_claim(&self) {
        self.state.lock().unwrap().claim_fails = true;
    }

    /// All operations attempted so far.
    pub fn ops(&self) -> Vec<MockOp> {
        self.state.lock().unwrap().ops.clone()
    }

    /// Only the OUT payloads.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.ops()
            .into_iter()
            .filter(|op| op.direction == Direction::Out)
            .map(|op| op.data)
            .collect()
    }

    pub fn op_count(&self) -> usize {
        self.state.lock().unwrap().ops.len()
    }

    pub fn is_claimed(&self) -> bool {
        self.state.lock().unwrap().claimed
    }

    /// Record the op and decide whether it fails.
    fn record(&self, op: MockOp, timeout: Duration) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if !state.claimed {
            return Err(TransportError::NotClaimed);
        }
        let index = state.ops.len();
        let len = op.data.len();
        state.ops.push(op);

        match state.fail_at {
            Some((at, failure)) if at == index => Err(match failure {
                MockFailure::Timeout => TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                },
                MockFailure::Allocation => TransportError::Allocation { len },
                MockFailure::Disconnect => TransportError::Disconnected,
            }),
            _ => Ok(()),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn claim(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.claim_fails {
            state.claim_fails = false;
            return Err(TransportError::ClaimInterfaceFailed {
                interface: 0,
                message: "busy".into(),
            });
        }
        state.claimed = true;
        Ok(())
    }

    fn release(&mut self) {
        self.state.lock().unwrap().claimed = false;
    }

    fn bulk_out(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.record(
            MockOp {
                endpoint,
                direction: Direction::Out,
                data: data.to_vec(),
            },
            timeout,
        )?;
        Ok(data.len())
    }

    fn bulk_in(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.record(
            MockOp {
                endpoint,
                direction: Direction::In,
                data: vec![0; buf.len()],
            },
            timeout,
        )?;

        let mut state = self.state.lock().unwrap();
        let queued = state
            .reads
            .iter_mut()
            .find(|(ep, _)| *ep == endpoint)
            .and_then(|(_, queue)| queue.pop_front());
        let payload = match queued {
            Some(p) => p,
            None => state
                .fallback
                .iter()
                .find(|(ep, _)| *ep == endpoint)
                .map(|(_, p)| p.clone())
                .unwrap_or_else(|| vec![0; buf.len()]),
        };

        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Ok(n)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(1000);

    #[test]
    fn test_mock_read_queue() {
        let mut mock = MockTransport::new();
        mock.claim().unwrap();
        mock.queue_read(0x83, &[1, 2, 3]);
        mock.set_fallback(0x83, &[9]);

        let mut buf = [0u8; 4];
        assert_eq!(mock.bulk_in(0x83, &mut buf, T).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);

        assert_eq!(mock.bulk_in(0x83, &mut buf, T).unwrap(), 1);
        assert_eq!(buf[0], 9);

        // No fallback on EP2: zeros fill the whole buffer.
        let mut buf = [7u8; 8];
        assert_eq!(mock.bulk_in(0x82, &mut buf, T).unwrap(), 8);
        assert_eq!(buf, [0u8; 8]);
    }

    #[test]
    fn test_mock_write_capture() {
        let mut mock = MockTransport::new();
        mock.claim().unwrap();
        mock.bulk_out(0x01, &[0x00, 0x0c], T).unwrap();
        mock.bulk_out(0x01, &[0x40, 0xbd, 0x12], T).unwrap();

        let writes = mock.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], vec![0x00, 0x0c]);
        assert_eq!(writes[1], vec![0x40, 0xbd, 0x12]);
    }

    #[test]
    fn test_mock_failure_injection() {
        let mut mock = MockTransport::new();
        mock.claim().unwrap();
        mock.fail_at(1, MockFailure::Allocation);

        assert!(mock.bulk_out(0x01, &[0, 9], T).is_ok());
        let err = mock.bulk_out(0x01, &[0, 9], T).unwrap_err();
        assert!(err.is_allocation());
        assert_eq!(mock.op_count(), 2);
    }

    #[test]
    fn test_mock_requires_claim() {
        let mut mock = MockTransport::new();
        assert!(matches!(
            mock.bulk_out(0x01, &[0, 9], T),
            Err(TransportError::NotClaimed)
        ));

        mock.fail_claim();
        assert!(mock.claim().is_err());
        assert!(mock.claim().is_ok());
        assert!(mock.is_claimed());
        mock.release();
        assert!(!mock.is_claimed());
    }
}
