use std::time::Duration;

/// Highest raw sample the position sensor can report.
pub const SENSOR_MAX: u16 = 1023;

/// Largest speed magnitude the H-bridge accepts.
pub const SPEED_MAX: i16 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Apply this direction's sign to a speed magnitude.
    pub fn signed(self, magnitude: i16) -> i16 {
        let magnitude = magnitude.clamp(0, SPEED_MAX);
        match self {
            Direction::Forward => magnitude,
            Direction::Reverse => -magnitude,
        }
    }

    /// Direction that moves `from` towards `to`. Equal values pick reverse.
    pub fn toward(from: u16, to: u16) -> Self {
        if to > from {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }
}

pub trait PositionSensor {
    fn read_position(&mut self) -> u16;
}

pub trait MotorDriver {
    /// Command a signed speed. Values outside +/-400 are clamped.
    fn set_speed(&mut self, speed: i16);
    fn speed(&self) -> i16;
    fn is_faulted(&self) -> bool;
}

pub trait Relay {
    fn set_relay(&mut self, on: bool);
    fn relay(&self) -> bool;
}

/// Source of time and the only place a motion loop is allowed to block.
pub trait Clock {
    fn sleep(&mut self, duration: Duration);
    fn now_us(&self) -> u64;
}

pub trait MachineIO: PositionSensor + MotorDriver + Relay + Clock {}

impl<T: PositionSensor + MotorDriver + Relay + Clock> MachineIO for T {}
