use crate::hal::{SENSOR_MAX, SPEED_MAX};
use serde::Serialize;
use std::time::Duration;

/// Run-time configuration owned by the dispatcher. Reset on every boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    /// Nominal speed magnitude, 0..=400. Direction is applied per call.
    pub current_speed: i16,
    pub home_limit: Option<u16>,
    pub max_limit: Option<u16>,
    pub relay_on: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            current_speed: 200,
            home_limit: None,
            max_limit: None,
            relay_on: false,
        }
    }
}

impl RunConfig {
    pub fn set_speed(&mut self, speed: i64) {
        self.current_speed = speed.clamp(0, i64::from(SPEED_MAX)) as i16;
    }

    pub fn set_home_limit(&mut self, limit: i64) {
        self.home_limit = Some(clamp_sample(limit));
    }

    pub fn set_max_limit(&mut self, limit: i64) {
        self.max_limit = Some(clamp_sample(limit));
    }

    /// Both soft limits, when both have been configured.
    pub fn soft_limits(&self) -> Option<(u16, u16)> {
        match (self.home_limit, self.max_limit) {
            (Some(home), Some(max)) => Some((home, max)),
            _ => None,
        }
    }
}

pub fn clamp_sample(value: i64) -> u16 {
    value.clamp(0, i64::from(SENSOR_MAX)) as u16
}

/// Fixed constants of the motion loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionTuning {
    /// Sleep between position checks during the coarse approach.
    pub check_interval: Duration,
    /// Safety poll and status cadence, in checks or iterations.
    pub poll_every: u32,
    /// Wait after stopping before the sensor is trusted.
    pub settle: Duration,
    pub slow_speed: i16,
    pub correction_pulse: Duration,
    /// Wait after each correction pulse before re-sampling.
    pub pulse_settle: Duration,
    pub correction_attempts: u32,
    /// Largest accepted |sample - target| once positioned.
    pub tolerance: u16,
    pub backlash_pulse_limit: u32,
    pub limit_margin: u16,
    pub stability_tolerance: u16,
    pub stability_polls: u32,
    /// Clock time without any sample change before the coarse approach
    /// gives up. Must exceed the time one sensor unit takes at the lowest
    /// usable speed.
    pub coarse_stall_window: Duration,
    pub free_run_poll: Duration,
    pub reverse_start_delay: Duration,
    pub calibration_start_delay: Duration,
    pub nudge_pulse: Duration,
}

impl Default for MotionTuning {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(10),
            poll_every: 5,
            settle: Duration::from_millis(100),
            slow_speed: 100,
            correction_pulse: Duration::from_millis(20),
            pulse_settle: Duration::from_millis(30),
            correction_attempts: 10,
            tolerance: 1,
            backlash_pulse_limit: 50,
            limit_margin: 2,
            stability_tolerance: 2,
            stability_polls: 5,
            coarse_stall_window: Duration::from_secs(3),
            free_run_poll: Duration::from_millis(100),
            reverse_start_delay: Duration::from_millis(200),
            calibration_start_delay: Duration::from_millis(100),
            nudge_pulse: Duration::from_millis(50),
        }
    }
}

/// Optional autonomous frames. Both are off by default because the host only
/// expects `Status:` frames between a command and its reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportConfig {
    pub debug_frames: bool,
    pub limit_frames: bool,
}
