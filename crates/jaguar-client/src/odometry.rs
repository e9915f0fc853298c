//! Wheel-odometry fusion.
//!
//! Each wheel reports its absolute position as revolutions since boot in
//! s16.16 fixed point. The integer part is a bounded signed 16-bit
//! counter, so the delta between consecutive samples must be corrected
//! for wraparound before it is trusted.
//!
//! Samples from the two wheels arrive independently. The estimator only
//! fuses once *both* sides have produced a fresh sample since the last
//! fusion; a side that reports twice in a row loses its earlier sample
//! (logged, counted, non-fatal).

use std::f64::consts::{PI, TAU};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use tracing::warn;

/// Span of the 16-bit revolution counter, in revolutions.
pub const COUNTER_RANGE_REVS: f64 = 65536.0;

/// Which wheel a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

/// Planar pose. `theta` stays normalized to `(-pi, pi]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// One fused odometry update: pose plus the body velocity estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OdometryReport {
    pub pose: Pose,
    /// Forward velocity, m/s.
    pub linear: f64,
    /// Turn rate, rad/s.
    pub angular: f64,
}

/// Difference between consecutive counter samples, corrected for
/// wraparound: a raw delta beyond half the counter range is reinterpreted
/// as a wrap in the opposite direction.
pub fn wrap_corrected_delta(current_revs: f64, last_revs: f64) -> f64 {
    let raw = current_revs - last_revs;
    if raw > COUNTER_RANGE_REVS / 2.0 {
        raw - COUNTER_RANGE_REVS
    } else if raw < -COUNTER_RANGE_REVS / 2.0 {
        raw + COUNTER_RANGE_REVS
    } else {
        raw
    }
}

/// Normalize an angle to `(-pi, pi]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % TAU;
    if a <= -PI {
        a += TAU;
    } else if a > PI {
        a -= TAU;
    }
    a
}

#[derive(Debug, Default)]
struct FusionState {
    last: [f64; 2],
    current: [f64; 2],
    velocity_rpm: [f64; 2],
    /// The side that has updated since the last fusion, if any.
    fresh: Option<Side>,
    pose: Pose,
}

type Observer = Box<dyn Fn(&OdometryReport) + Send + 'static>;

fn recover<'a, T>(guard: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>) -> MutexGuard<'a, T> {
    guard.unwrap_or_else(PoisonError::into_inner)
}

/// Fuses asynchronous per-wheel telemetry into pose and velocity.
pub struct OdometryEstimator {
    wheel_circum: f64,
    robot_radius: f64,
    state: Mutex<FusionState>,
    latest: ArcSwap<OdometryReport>,
    observers: Mutex<Vec<Observer>>,
    dropped: AtomicU64,
}

impl OdometryEstimator {
    pub fn new(wheel_circum: f64, robot_radius: f64) -> Self {
        Self {
            wheel_circum,
            robot_radius,
            state: Mutex::new(FusionState::default()),
            latest: ArcSwap::from_pointee(OdometryReport::default()),
            observers: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register an observer invoked after every fusion, in registration
    /// order.
    pub fn attach<F>(&self, observer: F)
    where
        F: Fn(&OdometryReport) + Send + 'static,
    {
        recover(self.observers.lock()).push(Box::new(observer));
    }

    /// Wait-free read of the most recent fused report.
    pub fn latest(&self) -> OdometryReport {
        **self.latest.load()
    }

    pub fn pose(&self) -> Pose {
        self.latest().pose
    }

    /// Telemetry samples lost to one side reporting twice in a row.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record one wheel sample: absolute position in revolutions and
    /// speed in RPM. Fuses and publishes once both sides are fresh.
    pub fn update(&self, side: Side, position_revs: f64, velocity_rpm: f64) {
        let mut st = recover(self.state.lock());
        let i = side.index();
        st.last[i] = st.current[i];
        st.current[i] = position_revs;
        st.velocity_rpm[i] = velocity_rpm;

        match st.fresh {
            None => {
                st.fresh = Some(side);
                return;
            }
            Some(pending) if pending == side => {
                // The other wheel never caught up; its pair is lost.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(?side, "periodic odometry sample dropped before fusion");
                return;
            }
            Some(_) => st.fresh = None,
        }

        let revs_left = wrap_corrected_delta(st.current[0], st.last[0]);
        let revs_right = wrap_corrected_delta(st.current[1], st.last[1]);
        let meters_left = revs_left * self.wheel_circum;
        let meters_right = revs_right * self.wheel_circum;

        let linear = (meters_left + meters_right) / 2.0;
        let angular = (meters_left - meters_right) / (2.0 * self.robot_radius);

        let mut pose = st.pose;
        pose.x += linear * pose.theta.cos();
        pose.y += linear * pose.theta.sin();
        pose.theta = normalize_angle(pose.theta + angular);
        st.pose = pose;

        let v_left = st.velocity_rpm[0] * self.wheel_circum / 60.0;
        let v_right = st.velocity_rpm[1] * self.wheel_circum / 60.0;
        let report = OdometryReport {
            pose,
            linear: (v_left + v_right) / 2.0,
            angular: (v_left - v_right) / (2.0 * self.robot_radius),
        };
        drop(st);

        self.latest.store(Arc::new(report));
        for observer in recover(self.observers.lock()).iter() {
            observer(&report);
        }
    }
}
