use crate::config::{MotionTuning, ReportConfig, RunConfig};
use crate::hal::{Direction, MachineIO};
use crate::link::{Link, Reply};
use crate::safety::{LimitMode, SafetyMonitor};
use log::{debug, warn};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Terminal result of every motion operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionOutcome {
    Completed,
    Aborted,
    Faulted,
}

impl MotionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionOutcome::Completed => "completed",
            MotionOutcome::Aborted => "aborted",
            MotionOutcome::Faulted => "faulted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MotionError {
    #[error("motor driver fault at speed {speed}")]
    DriverFault { speed: i16 },
}

/// Counters from the most recent `move_to`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MoveStats {
    pub coarse_checks: u32,
    pub stalled: bool,
    pub backlash_pulses: u32,
    pub corrections: u32,
    pub final_diff: u16,
}

/// One motion operation in progress: borrows the hardware, the command
/// channel and the configuration for exactly as long as the move runs.
pub struct Motion<'a, IO: MachineIO, L: Link + ?Sized> {
    pub(crate) io: &'a mut IO,
    pub(crate) link: &'a mut L,
    pub(crate) config: &'a RunConfig,
    pub(crate) tuning: &'a MotionTuning,
    report: ReportConfig,
    dropped: u32,
    pub(crate) move_stats: MoveStats,
}

impl<'a, IO: MachineIO, L: Link + ?Sized> Motion<'a, IO, L> {
    pub fn new(
        io: &'a mut IO,
        link: &'a mut L,
        config: &'a RunConfig,
        tuning: &'a MotionTuning,
        report: ReportConfig,
    ) -> Self {
        Self {
            io,
            link,
            config,
            tuning,
            report,
            dropped: 0,
            move_stats: MoveStats::default(),
        }
    }

    /// Apply the first speed of an operation. A driver fault stops the motor.
    pub(crate) fn start(&mut self, speed: i16) -> Result<(), MotionError> {
        self.io.set_speed(speed);
        if self.io.is_faulted() {
            self.io.set_speed(0);
            warn!("motor driver fault applying speed {}", speed);
            return Err(MotionError::DriverFault { speed });
        }
        Ok(())
    }

    pub(crate) fn stop(&mut self) {
        self.io.set_speed(0);
    }

    /// Drive for a fixed time, stop, and let the sensor settle.
    pub(crate) fn pulse(&mut self, direction: Direction, magnitude: i16, length: Duration) {
        self.io.set_speed(direction.signed(magnitude));
        self.io.sleep(length);
        self.io.set_speed(0);
        self.io.sleep(self.tuning.pulse_settle);
    }

    pub(crate) fn monitor(&self, mode: LimitMode) -> SafetyMonitor {
        SafetyMonitor::new(mode, self.config, self.tuning)
    }

    /// Fold a finished monitor's drop count into this operation.
    pub(crate) fn retire(&mut self, monitor: &SafetyMonitor) {
        self.dropped += monitor.dropped();
    }

    pub(crate) fn due(&self, count: u32) -> bool {
        count % self.tuning.poll_every.max(1) == 0
    }

    pub(crate) fn status(&mut self, position: u16) {
        self.link.send(Reply::Status(position));
    }

    pub(crate) fn limit_hit(&mut self, position: u16) {
        debug!("travel limit reached at {}", position);
        if self.report.limit_frames {
            self.link.send(Reply::Limit(position));
        }
    }

    pub(crate) fn trace(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!("{}", text);
        if self.report.debug_frames {
            self.link.send(Reply::Debug(text));
        }
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn move_stats(&self) -> MoveStats {
        self.move_stats
    }
}
