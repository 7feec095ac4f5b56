use crate::free_run::DrivePlan;
use crate::hal::{Direction, MachineIO};
use crate::link::Link;
use crate::motion::{Motion, MotionOutcome};
use crate::safety::LimitMode;
use serde::Serialize;

/// Physical end of travel a calibration run seeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Extreme {
    Home,
    Max,
}

impl Extreme {
    pub fn direction(self) -> Direction {
        match self {
            Extreme::Home => Direction::Reverse,
            Extreme::Max => Direction::Forward,
        }
    }
}

impl<IO: MachineIO, L: Link + ?Sized> Motion<'_, IO, L> {
    /// Drive to an end-stop and stop once the sensor stops changing.
    ///
    /// Soft limits are not consulted: calibration is how they get found.
    pub fn run_to_extreme(&mut self, which: Extreme) -> MotionOutcome {
        self.drive(DrivePlan {
            direction: which.direction(),
            mode: LimitMode::Stability,
            start_delay: self.tuning.calibration_start_delay,
            run_for: None,
            on_stop: MotionOutcome::Aborted,
        })
    }
}
