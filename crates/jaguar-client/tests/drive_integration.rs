//! End-to-end drive test against a simulated controller pair.
//!
//! A background thread plays the role of the two wheel controllers: it
//! decodes every frame the client transmits and acknowledges it on the
//! same identifier, the way the hardware does. Telemetry is injected by
//! the test body.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use jaguar_can::mock::{MockSerialAdapter, MockSerialHost};
use jaguar_client::{ClientError, DiffDriveRobot, DriveSettings, mps_to_rpm};
use jaguar_driver::JaguarBridge;
use jaguar_protocol::CanMessage;
use jaguar_protocol::fixed_point::{f64_to_s8p8, f64_to_s16p16};
use jaguar_protocol::framing::{Decoded, FrameDecoder, encode_frame};
use jaguar_protocol::ids::{
    ApiClass, DeviceType, Manufacturer, pack_api, pack_id, periodic_status, system_control,
};

struct DeviceSim {
    handle: Option<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    seen_ids: Arc<Mutex<Vec<u32>>>,
}

impl DeviceSim {
    /// Ack every received command on its own identifier.
    fn spawn(host: Arc<MockSerialHost>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let seen_ids = Arc::new(Mutex::new(Vec::new()));
        let stop_flag = Arc::clone(&stop);
        let seen = Arc::clone(&seen_ids);

        let handle = thread::spawn(move || {
            let mut decoder = FrameDecoder::new();
            while !stop_flag.load(Ordering::Relaxed) {
                let Some(chunk) = host.recv_written(Duration::from_millis(5)) else {
                    continue;
                };
                for &byte in &chunk {
                    if let Decoded::Message(msg) = decoder.push_byte(byte) {
                        seen.lock().unwrap().push(msg.id);
                        host.inject(&encode_frame(&CanMessage::new(msg.id, &[])));
                    }
                }
            }
        });

        Self {
            handle: Some(handle),
            stop,
            seen_ids,
        }
    }

    fn seen(&self) -> Vec<u32> {
        self.seen_ids.lock().unwrap().clone()
    }
}

impl Drop for DeviceSim {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn telemetry_id(device: u8, slot: u8) -> u32 {
    pack_id(
        device,
        Manufacturer::TexasInstruments,
        DeviceType::MotorController,
        pack_api(ApiClass::PeriodicStatus, periodic_status::STATUS_BASE + slot),
    )
}

fn odometry_payload(position_revs: f64, speed_rpm: f64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    payload.extend_from_slice(&f64_to_s16p16(position_revs).to_le_bytes());
    payload.extend_from_slice(&f64_to_s16p16(speed_rpm).to_le_bytes());
    payload
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn bring_up_drive_and_fuse_odometry() {
    let (adapter, host) = MockSerialAdapter::pair();
    let host = Arc::new(host);
    let bridge = Arc::new(JaguarBridge::new(adapter).unwrap());
    let sim = DeviceSim::spawn(Arc::clone(&host));

    let settings = DriveSettings::default();
    let circum = settings.wheel_circumference();
    let mut robot = DiffDriveRobot::new(Arc::clone(&bridge), settings.clone()).unwrap();

    // Straight-ahead command; a long tick lets the ramp reach the target.
    robot.drive(0.72, 0.0);
    robot.drive_spin(10.0).unwrap();
    let (left_rpm, right_rpm) = robot.commanded_rpm();
    let expected = mps_to_rpm(0.72, circum);
    assert!((left_rpm - expected).abs() < 1e-9);
    assert!((right_rpm - expected).abs() < 1e-9);

    // One revolution on each wheel fuses into one circumference forward.
    host.inject(&encode_frame(&CanMessage::new(
        telemetry_id(settings.left_id, 0),
        &odometry_payload(1.0, 60.0),
    )));
    host.inject(&encode_frame(&CanMessage::new(
        telemetry_id(settings.right_id, 0),
        &odometry_payload(1.0, 60.0),
    )));
    assert!(wait_until(Duration::from_secs(2), || {
        robot.latest_odometry().pose.x > 0.0
    }));
    let report = robot.latest_odometry();
    assert!((report.pose.x - circum).abs() < 1e-9);
    assert!(report.pose.y.abs() < 1e-12);
    assert!(report.pose.theta.abs() < 1e-12);
    assert!((report.linear - circum).abs() < 1e-9);

    // Diagnostics telemetry lands in the per-wheel snapshot.
    let mut diag_payload = vec![0x03, 0x00];
    diag_payload.extend_from_slice(&f64_to_s8p8(12.5).to_le_bytes());
    diag_payload.extend_from_slice(&f64_to_s8p8(30.25).to_le_bytes());
    host.inject(&encode_frame(&CanMessage::new(
        telemetry_id(settings.left_id, 1),
        &diag_payload,
    )));
    assert!(wait_until(Duration::from_secs(2), || {
        robot.diagnostics().0.bus_voltage == 12.5
    }));
    let (left_diag, _) = robot.diagnostics();
    assert!(!left_diag.stopped);
    assert_eq!(left_diag.temperature, 30.25);

    // The keep-alive broadcast flows on its own schedule.
    let heartbeat_id = pack_id(
        0,
        Manufacturer::Broadcast,
        DeviceType::Broadcast,
        system_control::HEARTBEAT,
    );
    assert!(wait_until(Duration::from_secs(2), || {
        sim.seen().contains(&heartbeat_id)
    }));
}

#[test]
fn bring_up_without_device_reports_first_failing_step() {
    // Nobody acknowledges: construction must fail on the first step.
    let (adapter, _host) = MockSerialAdapter::pair();
    let bridge = Arc::new(JaguarBridge::new(adapter).unwrap());

    match DiffDriveRobot::new(bridge, DriveSettings::default()) {
        Err(ClientError::Ack { step, .. }) => assert_eq!(step, "brake-config"),
        other => panic!("expected init failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn turn_in_place_has_opposite_wheel_speeds() {
    let (adapter, host) = MockSerialAdapter::pair();
    let host = Arc::new(host);
    let bridge = Arc::new(JaguarBridge::new(adapter).unwrap());
    let _sim = DeviceSim::spawn(Arc::clone(&host));

    let settings = DriveSettings::default();
    let mut robot = DiffDriveRobot::new(bridge, settings.clone()).unwrap();

    robot.drive(0.0, 1.0);
    robot.drive_spin(10.0).unwrap();
    let (left_rpm, right_rpm) = robot.commanded_rpm();
    let expected = mps_to_rpm(settings.robot_radius_m, settings.wheel_circumference());
    assert!((right_rpm - expected).abs() < 1e-9);
    assert!((left_rpm + expected).abs() < 1e-9);
}

#[test]
fn acceleration_ramp_limits_each_tick() {
    let (adapter, host) = MockSerialAdapter::pair();
    let host = Arc::new(host);
    let bridge = Arc::new(JaguarBridge::new(adapter).unwrap());
    let _sim = DeviceSim::spawn(Arc::clone(&host));

    let settings = DriveSettings::default();
    let circum = settings.wheel_circumference();
    let mut robot = DiffDriveRobot::new(bridge, settings.clone()).unwrap();

    // A step command far beyond what one tick's acceleration bound allows.
    robot.drive(10.0, 0.0);
    let dt = 0.02;
    robot.drive_spin(dt).unwrap();
    let bound = mps_to_rpm(settings.accel_max_mps2, circum) * dt;
    let (left_rpm, _) = robot.commanded_rpm();
    assert!((left_rpm - bound).abs() < 1e-9, "first tick must clamp to the bound");

    // Repeated ticks converge on the target.
    let target = mps_to_rpm(10.0, circum);
    for _ in 0..10_000 {
        robot.drive_spin(dt).unwrap();
        if (robot.commanded_rpm().0 - target).abs() < 1e-9 {
            break;
        }
    }
    assert!((robot.commanded_rpm().0 - target).abs() < 1e-9);
}
