//! The bridge dispatch core.
//!
//! [`JaguarBridge`] mediates between outbound commands and the inbound
//! byte stream. A dedicated receive thread frames bytes into messages
//! and routes each one:
//!
//! 1. to the pending [`RecvToken`] registered for its identifier, if any
//!    (first-writer-wins; an uncollected previous value is overwritten
//!    with a warning), then
//! 2. to every subscriber registered for the identifier, in registration
//!    order, plus any wildcard taps.
//!
//! Messages matching neither are dropped and counted. The pending-token
//! and subscriber tables are the only shared mutable state; each is
//! guarded by its own lock held only for the table operation itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use jaguar_can::{RxAdapter, SplittableAdapter, TxAdapter};
use jaguar_protocol::CanMessage;
use jaguar_protocol::framing::{Decoded, FrameDecoder, encode_frame};
use tracing::{error, trace, warn};

use crate::error::DriverError;
use crate::metrics::{BridgeMetrics, MetricsSnapshot};
use crate::token::{RecvToken, TokenInner};

/// Read chunk size for the receive thread.
const RECEIVE_BUFFER_LEN: usize = 256;
/// How long one transport read may block; bounds shutdown latency.
const RX_POLL_TIMEOUT: Duration = Duration::from_millis(10);
/// How long `Drop` waits for the receive thread.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

type Subscriber = Arc<dyn Fn(&CanMessage) + Send + Sync + 'static>;

fn recover<'a, T>(guard: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>) -> MutexGuard<'a, T> {
    guard.unwrap_or_else(PoisonError::into_inner)
}

/// Extension trait for timeout-capable thread joins.
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);

        // Watchdog thread performs the join; if it outlives the timeout
        // the OS reaps it at process exit.
        thread::spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(Box::new(
                std::io::Error::new(std::io::ErrorKind::TimedOut, "thread join timeout"),
            )),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(Box::new(
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "join watchdog died"),
            )),
        }
    }
}

/// State shared between the bridge handle and its receive thread.
struct BridgeShared {
    tokens: Mutex<HashMap<u32, Arc<TokenInner>>>,
    subscribers: Mutex<HashMap<u32, Vec<Subscriber>>>,
    taps: Mutex<Vec<Subscriber>>,
    metrics: BridgeMetrics,
}

impl BridgeShared {
    fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            taps: Mutex::new(Vec::new()),
            metrics: BridgeMetrics::new(),
        }
    }

    /// Route one decoded message. Runs on the receive thread.
    fn dispatch(&self, msg: &CanMessage) {
        self.metrics.frames_decoded.fetch_add(1, Ordering::Relaxed);

        let token = recover(self.tokens.lock()).get(&msg.id).cloned();
        let token_matched = token.is_some();
        if let Some(token) = token {
            let outcome = token.fulfill(msg.payload());
            if outcome.overwrote {
                self.metrics.token_overwrites.fetch_add(1, Ordering::Relaxed);
                warn!(id = msg.id, "reply overwrote an uncollected value");
            }
            if outcome.clipped {
                self.metrics.payloads_clipped.fetch_add(1, Ordering::Relaxed);
                warn!(id = msg.id, len = msg.len, "reply clipped to expected length");
            }
        }

        // Clone the callback lists out of the tables so no lock is held
        // while user code runs.
        let taps: Vec<Subscriber> = recover(self.taps.lock()).clone();
        let subs: Vec<Subscriber> = recover(self.subscribers.lock())
            .get(&msg.id)
            .cloned()
            .unwrap_or_default();

        for tap in &taps {
            tap(msg);
        }
        for sub in &subs {
            sub(msg);
        }

        if !token_matched && subs.is_empty() && taps.is_empty() {
            self.metrics.unmatched_dropped.fetch_add(1, Ordering::Relaxed);
            trace!(id = msg.id, "no token or subscriber; message dropped");
        }
    }
}

/// Point-to-point bridge to a chain of Jaguar controllers.
pub struct JaguarBridge {
    tx: Mutex<Box<dyn TxAdapter>>,
    shared: Arc<BridgeShared>,
    running: Arc<AtomicBool>,
    rx_thread: Option<JoinHandle<()>>,
}

impl JaguarBridge {
    /// Split the adapter and start the receive thread.
    pub fn new<A>(adapter: A) -> Result<Self, DriverError>
    where
        A: SplittableAdapter,
    {
        let (mut rx, tx) = adapter.split()?;
        rx.set_read_timeout(RX_POLL_TIMEOUT);

        let shared = Arc::new(BridgeShared::new());
        let running = Arc::new(AtomicBool::new(true));

        let shared_rx = Arc::clone(&shared);
        let running_rx = Arc::clone(&running);
        let rx_thread = thread::Builder::new()
            .name("jaguar-rx".into())
            .spawn(move || rx_loop(rx, shared_rx, running_rx))
            .map_err(jaguar_can::CanError::Io)?;

        Ok(Self {
            tx: Mutex::new(Box::new(tx)),
            shared,
            running,
            rx_thread: Some(rx_thread),
        })
    }

    /// Encode and transmit one message. Exactly one transport write per
    /// message; transport failures surface to the caller.
    pub fn send(&self, msg: &CanMessage) -> Result<(), DriverError> {
        let frame = encode_frame(msg);
        let mut tx = self.tx.lock().map_err(|_| DriverError::PoisonedLock)?;
        tx.write_all(&frame)?;
        Ok(())
    }

    /// Register the expectation of the next message with identifier `id`.
    ///
    /// `expected_len` sizes the destination: longer replies are clipped
    /// (with a warning), shorter ones surface as
    /// [`DriverError::LengthMismatch`] when collected. Zero means any
    /// length is accepted. At most one live token per identifier:
    /// registering while an unconsumed token's handle is still alive is
    /// a contract violation.
    pub fn recv(&self, id: u32, expected_len: usize) -> Result<RecvToken, DriverError> {
        let mut tokens = self.shared.tokens.lock().map_err(|_| DriverError::PoisonedLock)?;
        if let Some(existing) = tokens.get(&id)
            && existing.is_registration_pending()
        {
            return Err(DriverError::TokenPending { id });
        }
        let inner = Arc::new(TokenInner::new(id, expected_len));
        tokens.insert(id, Arc::clone(&inner));
        Ok(RecvToken::new(inner))
    }

    /// Register a callback for every message with identifier `id`.
    ///
    /// Callbacks for one identifier run in registration order on the
    /// receive thread and are never removed.
    pub fn subscribe<F>(&self, id: u32, callback: F)
    where
        F: Fn(&CanMessage) + Send + Sync + 'static,
    {
        recover(self.shared.subscribers.lock())
            .entry(id)
            .or_default()
            .push(Arc::new(callback));
    }

    /// Register a wildcard tap observing every decoded message, ahead of
    /// the per-identifier subscribers. Intended for diagnostics tools.
    pub fn subscribe_all<F>(&self, callback: F)
    where
        F: Fn(&CanMessage) + Send + Sync + 'static,
    {
        recover(self.shared.taps.lock()).push(Arc::new(callback));
    }

    /// Receive-path health counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl Drop for JaguarBridge {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.rx_thread.take()
            && handle.join_timeout(JOIN_TIMEOUT).is_err()
        {
            error!("receive thread failed to shut down within {JOIN_TIMEOUT:?}");
        }
    }
}

#[cfg(feature = "realtime")]
fn raise_rx_priority() {
    use thread_priority::{ThreadPriority, set_current_thread_priority};
    if let Err(e) = set_current_thread_priority(ThreadPriority::Max) {
        warn!("could not raise receive thread priority: {e:?}");
    }
}

/// Receive loop: pull bytes, drive the frame decoder, dispatch messages.
/// Parser state is owned here exclusively and dies with the loop.
fn rx_loop(mut rx: impl RxAdapter, shared: Arc<BridgeShared>, running: Arc<AtomicBool>) {
    #[cfg(feature = "realtime")]
    raise_rx_priority();

    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; RECEIVE_BUFFER_LEN];

    while running.load(Ordering::Acquire) {
        let n = match rx.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.is_transient() => continue,
            Err(e) => {
                error!("receive path terminated: {e}");
                break;
            }
        };
        for &byte in &buf[..n] {
            match decoder.push_byte(byte) {
                Decoded::Pending => {}
                Decoded::Message(msg) => shared.dispatch(&msg),
                Decoded::Fault(fault) => {
                    shared.metrics.framing_faults.fetch_add(1, Ordering::Relaxed);
                    warn!(?fault, "dropped malformed frame, resynchronizing");
                }
            }
        }
    }
}
