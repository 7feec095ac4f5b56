pub mod calibration;
pub mod config;
pub mod dispatcher;
pub mod free_run;
pub mod hal;
#[cfg(any(test, feature = "simulation"))]
pub mod hal_sim;
pub mod link;
pub mod motion;
pub mod positioner;
pub mod safety;
pub mod tags;
pub mod timebase;

pub use calibration::Extreme;
pub use config::{MotionTuning, ReportConfig, RunConfig};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use hal::{Clock, Direction, MachineIO, MotorDriver, PositionSensor, Relay};
#[cfg(any(test, feature = "simulation"))]
pub use hal_sim::SimulatedActuator;
pub use link::{Command, Link, Reply};
#[cfg(any(test, feature = "simulation"))]
pub use link::ScriptedLink;
pub use motion::{Motion, MotionError, MotionOutcome, MoveStats};
pub use safety::{LimitMode, SafetyMonitor, SafetySignal, StabilityDetector};
pub use timebase::TimeBase;
