//! Background keep-alive broadcast.
//!
//! The controllers safety-stop if the bus-wide heartbeat lapses, so it
//! is sent from its own thread on a fixed period, independent of command
//! traffic. The send is fire-and-forget: no reply is ever expected, and
//! a failed send is logged and retried on the next period.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use jaguar_driver::JaguarBridge;
use tracing::warn;

use crate::device::Broadcast;

/// Owns the heartbeat thread; stops and joins it on drop.
pub struct HeartbeatManager {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl HeartbeatManager {
    /// Start broadcasting every `period`.
    pub fn start(bridge: Arc<JaguarBridge>, period: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);

        let handle = thread::spawn(move || {
            let broadcast = Broadcast::new(bridge);
            while !shutdown_flag.load(Ordering::Relaxed) {
                if let Err(e) = broadcast.heartbeat() {
                    warn!("heartbeat send failed: {e}");
                }
                spin_sleep::sleep(period);
            }
        });

        Self {
            handle: Some(handle),
            shutdown,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jaguar_can::mock::MockSerialAdapter;
    use jaguar_protocol::framing::{Decoded, FrameDecoder};
    use jaguar_protocol::ids::{DeviceType, Manufacturer, pack_id, system_control};
    use std::time::Instant;

    #[test]
    fn heartbeats_keep_arriving_until_shutdown() {
        let (adapter, host) = MockSerialAdapter::pair();
        let bridge = Arc::new(JaguarBridge::new(adapter).unwrap());
        let manager = HeartbeatManager::start(Arc::clone(&bridge), Duration::from_millis(10));
        assert!(manager.is_running());

        let heartbeat_id = pack_id(
            0,
            Manufacturer::Broadcast,
            DeviceType::Broadcast,
            system_control::HEARTBEAT,
        );

        // Collect a few periods' worth of traffic.
        let mut decoder = FrameDecoder::new();
        let mut count = 0;
        let deadline = Instant::now() + Duration::from_millis(200);
        while count < 3 && Instant::now() < deadline {
            if let Some(chunk) = host.recv_written(Duration::from_millis(50)) {
                for &b in &chunk {
                    if let Decoded::Message(msg) = decoder.push_byte(b) {
                        assert_eq!(msg.id, heartbeat_id);
                        count += 1;
                    }
                }
            }
        }
        assert!(count >= 3, "expected at least 3 heartbeats, saw {count}");

        manager.shutdown();
    }

    #[test]
    fn drop_stops_the_thread() {
        let (adapter, host) = MockSerialAdapter::pair();
        let bridge = Arc::new(JaguarBridge::new(adapter).unwrap());
        let manager = HeartbeatManager::start(bridge, Duration::from_millis(5));
        drop(manager);

        // After the drop settles, no further heartbeats appear.
        let _ = host.drain_written();
        std::thread::sleep(Duration::from_millis(30));
        assert!(host.drain_written().is_empty());
    }
}
