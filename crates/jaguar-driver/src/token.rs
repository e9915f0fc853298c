//! Completion tokens.
//!
//! A [`RecvToken`] represents "the next message matching identifier X".
//! The bridge's receive thread is the only fulfiller; any number of
//! waiters may block on the token. Fulfillment is a one-shot
//! `Pending → Done` transition guarded by a mutex/condvar pair. A
//! bounded wait that elapses leaves the token pending so the caller can
//! retry (poll/retry command handshakes depend on this).

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::DriverError;

/// Shared token state: the destination buffer and completion flags.
#[derive(Debug, Default)]
struct TokenState {
    done: bool,
    consumed: bool,
    abandoned: bool,
    payload: Vec<u8>,
    /// Actual reply length when it fell short of the expectation.
    short: Option<usize>,
}

/// What a fulfillment did, for the dispatcher's accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Fulfillment {
    /// A previously delivered value was never collected and got replaced.
    pub overwrote: bool,
    /// The reply was longer than the destination and was truncated.
    pub clipped: bool,
}

/// Interior of a token, shared between the handle and the bridge's
/// pending table.
#[derive(Debug)]
pub(crate) struct TokenInner {
    id: u32,
    expected_len: usize,
    state: Mutex<TokenState>,
    cond: Condvar,
}

impl TokenInner {
    pub(crate) fn new(id: u32, expected_len: usize) -> Self {
        Self {
            id,
            expected_len,
            state: Mutex::new(TokenState::default()),
            cond: Condvar::new(),
        }
    }

    /// Deliver a payload and wake every waiter. Called from the receive
    /// thread only.
    pub(crate) fn fulfill(&self, payload: &[u8]) -> Fulfillment {
        let mut st = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let outcome = Fulfillment {
            overwrote: st.done && !st.consumed,
            clipped: self.expected_len > 0 && payload.len() > self.expected_len,
        };
        st.short = (self.expected_len > 0 && payload.len() < self.expected_len)
            .then_some(payload.len());
        let take = if self.expected_len > 0 {
            payload.len().min(self.expected_len)
        } else {
            payload.len()
        };
        st.payload.clear();
        st.payload.extend_from_slice(&payload[..take]);
        st.done = true;
        st.consumed = false;
        drop(st);
        self.cond.notify_all();
        outcome
    }

    /// Whether a registration for this identifier is still outstanding:
    /// the handle is alive and nobody has collected a value.
    pub(crate) fn is_registration_pending(&self) -> bool {
        let st = self.state.lock().unwrap_or_else(|p| p.into_inner());
        !st.consumed && !st.abandoned
    }
}

/// Handle to one outstanding receive expectation.
///
/// Dropping the handle without waiting is safe: the bridge's entry is
/// simply left behind to be replaced by a later registration.
#[derive(Debug)]
pub struct RecvToken {
    inner: std::sync::Arc<TokenInner>,
}

impl RecvToken {
    pub(crate) fn new(inner: std::sync::Arc<TokenInner>) -> Self {
        Self { inner }
    }

    /// The identifier this token is waiting for.
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// Non-blocking completion check.
    pub fn ready(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|st| st.done)
            .unwrap_or(false)
    }

    /// Block until the message arrives; returns its payload.
    pub fn block(&self) -> Result<Vec<u8>, DriverError> {
        let mut st = self.inner.state.lock().map_err(|_| DriverError::PoisonedLock)?;
        while !st.done {
            st = self.inner.cond.wait(st).map_err(|_| DriverError::PoisonedLock)?;
        }
        self.consume(st)
    }

    /// Block until the message arrives or `timeout` elapses. On
    /// [`DriverError::Timeout`] the token is still pending and this call
    /// may be repeated.
    pub fn block_for(&self, timeout: Duration) -> Result<Vec<u8>, DriverError> {
        let st = self.inner.state.lock().map_err(|_| DriverError::PoisonedLock)?;
        let (st, wait) = self
            .inner
            .cond
            .wait_timeout_while(st, timeout, |st| !st.done)
            .map_err(|_| DriverError::PoisonedLock)?;
        if wait.timed_out() && !st.done {
            return Err(DriverError::Timeout);
        }
        self.consume(st)
    }

    fn consume(&self, mut st: MutexGuard<'_, TokenState>) -> Result<Vec<u8>, DriverError> {
        st.consumed = true;
        if let Some(actual) = st.short {
            return Err(DriverError::LengthMismatch {
                id: self.inner.id,
                expected: self.inner.expected_len,
                actual,
            });
        }
        Ok(st.payload.clone())
    }
}

impl Drop for RecvToken {
    fn drop(&mut self) {
        let mut st = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
        st.abandoned = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn token(id: u32, expected_len: usize) -> (RecvToken, Arc<TokenInner>) {
        let inner = Arc::new(TokenInner::new(id, expected_len));
        (RecvToken::new(inner.clone()), inner)
    }

    #[test]
    fn fulfill_then_block_returns_payload() {
        let (tok, inner) = token(0x10, 0);
        assert!(!tok.ready());
        inner.fulfill(&[1, 2, 3]);
        assert!(tok.ready());
        assert_eq!(tok.block().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn block_wakes_when_fulfilled_from_another_thread() {
        let (tok, inner) = token(0x10, 0);
        let fulfiller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            inner.fulfill(&[0xAB]);
        });
        assert_eq!(tok.block().unwrap(), vec![0xAB]);
        fulfiller.join().unwrap();
    }

    #[test]
    fn timeout_leaves_token_retryable() {
        let (tok, inner) = token(0x10, 0);
        let start = Instant::now();
        let err = tok.block_for(Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, DriverError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(30));
        // Still pending: a later fulfillment satisfies a retried wait.
        assert!(inner.is_registration_pending());
        inner.fulfill(&[7]);
        assert_eq!(tok.block_for(Duration::from_millis(30)).unwrap(), vec![7]);
    }

    #[test]
    fn consume_clears_registration() {
        let (tok, inner) = token(0x10, 0);
        inner.fulfill(&[]);
        tok.block().unwrap();
        assert!(!inner.is_registration_pending());
    }

    #[test]
    fn drop_abandons_registration() {
        let (tok, inner) = token(0x10, 0);
        assert!(inner.is_registration_pending());
        drop(tok);
        assert!(!inner.is_registration_pending());
    }

    #[test]
    fn short_reply_is_a_contract_violation() {
        let (tok, inner) = token(0x10, 4);
        inner.fulfill(&[1, 2]);
        match tok.block().unwrap_err() {
            DriverError::LengthMismatch { expected, actual, .. } => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn long_reply_is_clipped() {
        let (tok, inner) = token(0x10, 2);
        let outcome = inner.fulfill(&[1, 2, 3, 4]);
        assert!(outcome.clipped);
        assert_eq!(tok.block().unwrap(), vec![1, 2]);
    }

    #[test]
    fn refulfillment_before_collection_overwrites() {
        let (tok, inner) = token(0x10, 0);
        assert!(!inner.fulfill(&[1]).overwrote);
        assert!(inner.fulfill(&[2]).overwrote);
        // Freshness wins: the waiter sees the latest value.
        assert_eq!(tok.block().unwrap(), vec![2]);
        // After collection a new value is not an overwrite.
        assert!(!inner.fulfill(&[3]).overwrote);
    }

    #[test]
    fn many_waiters_all_observe_fulfillment() {
        let inner = Arc::new(TokenInner::new(0x10, 0));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let tok = RecvToken::new(inner.clone());
                thread::spawn(move || tok.block().unwrap())
            })
            .collect();
        thread::sleep(Duration::from_millis(10));
        inner.fulfill(&[9]);
        for w in waiters {
            assert_eq!(w.join().unwrap(), vec![9]);
        }
    }
}
