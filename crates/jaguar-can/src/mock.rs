//! Channel-backed in-memory adapter.
//!
//! [`MockSerialAdapter::pair`] returns the adapter plus a [`MockSerialHost`]
//! representing the far end of the cable: tests inject inbound bytes
//! through the host and collect everything the code under test wrote.

use std::collections::VecDeque;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::{CanError, RxAdapter, SerialAdapter, SplittableAdapter, TxAdapter};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// In-memory serial adapter for tests.
pub struct MockSerialAdapter {
    rx: MockRx,
    tx: MockTx,
}

/// The far end of the mock cable.
pub struct MockSerialHost {
    inbound: Sender<Vec<u8>>,
    outbound: Receiver<Vec<u8>>,
}

impl MockSerialAdapter {
    /// Create a connected adapter/host pair.
    pub fn pair() -> (Self, MockSerialHost) {
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let adapter = Self {
            rx: MockRx {
                inbound: in_rx,
                pending: VecDeque::new(),
                timeout: DEFAULT_READ_TIMEOUT,
            },
            tx: MockTx { outbound: out_tx },
        };
        let host = MockSerialHost {
            inbound: in_tx,
            outbound: out_rx,
        };
        (adapter, host)
    }
}

impl MockSerialHost {
    /// Push bytes toward the adapter, as if the device wrote them.
    pub fn inject(&self, bytes: &[u8]) {
        // Send fails only once the adapter is gone; tests that already
        // dropped the adapter do not care about late injections.
        let _ = self.inbound.send(bytes.to_vec());
    }

    /// Wait for the next chunk the adapter wrote.
    pub fn recv_written(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.outbound.recv_timeout(timeout).ok()
    }

    /// Drain everything written so far without blocking.
    pub fn drain_written(&self) -> Vec<u8> {
        let mut all = Vec::new();
        while let Ok(chunk) = self.outbound.try_recv() {
            all.extend_from_slice(&chunk);
        }
        all
    }
}

/// Receive half.
pub struct MockRx {
    inbound: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    timeout: Duration,
}

/// Transmit half.
#[derive(Clone)]
pub struct MockTx {
    outbound: Sender<Vec<u8>>,
}

impl RxAdapter for MockRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CanError> {
        if self.pending.is_empty() {
            match self.inbound.recv_timeout(self.timeout) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => return Err(CanError::ReceiveTimeout),
                Err(RecvTimeoutError::Disconnected) => return Err(CanError::Disconnected),
            }
        }
        let mut n = 0;
        while n < buf.len() {
            match self.pending.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

impl TxAdapter for MockTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), CanError> {
        self.outbound
            .send(bytes.to_vec())
            .map_err(|_| CanError::Disconnected)
    }
}

impl SerialAdapter for MockSerialAdapter {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CanError> {
        self.rx.read(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), CanError> {
        self.tx.write_all(bytes)
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        self.rx.set_read_timeout(timeout);
    }
}

impl SplittableAdapter for MockSerialAdapter {
    type Rx = MockRx;
    type Tx = MockTx;

    fn split(self) -> Result<(Self::Rx, Self::Tx), CanError> {
        Ok((self.rx, self.tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_bytes_come_back_out() {
        let (mut adapter, host) = MockSerialAdapter::pair();
        host.inject(&[1, 2, 3]);
        let mut buf = [0u8; 8];
        let n = adapter.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
    }

    #[test]
    fn read_times_out_when_idle() {
        let (mut adapter, _host) = MockSerialAdapter::pair();
        adapter.set_read_timeout(Duration::from_millis(5));
        let mut buf = [0u8; 8];
        assert!(matches!(adapter.read(&mut buf), Err(CanError::ReceiveTimeout)));
    }

    #[test]
    fn read_reports_disconnect_when_host_dropped() {
        let (mut adapter, host) = MockSerialAdapter::pair();
        drop(host);
        let mut buf = [0u8; 8];
        assert!(matches!(adapter.read(&mut buf), Err(CanError::Disconnected)));
    }

    #[test]
    fn writes_show_up_at_the_host() {
        let (mut adapter, host) = MockSerialAdapter::pair();
        adapter.write_all(&[0xAA, 0xBB]).unwrap();
        assert_eq!(host.drain_written(), vec![0xAA, 0xBB]);
    }

    #[test]
    fn small_read_buffer_keeps_remainder() {
        let (mut adapter, host) = MockSerialAdapter::pair();
        host.inject(&[1, 2, 3, 4, 5]);
        let mut buf = [0u8; 2];
        assert_eq!(adapter.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(adapter.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [3, 4]);
        assert_eq!(adapter.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 5);
    }

    #[test]
    fn split_halves_keep_working() {
        let (adapter, host) = MockSerialAdapter::pair();
        let (mut rx, mut tx) = adapter.split().unwrap();
        host.inject(&[7]);
        let mut buf = [0u8; 1];
        assert_eq!(rx.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 7);
        tx.write_all(&[8]).unwrap();
        assert_eq!(host.drain_written(), vec![8]);
    }
}
