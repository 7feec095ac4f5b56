use crate::hal::{Clock, MotorDriver, PositionSensor, Relay, SENSOR_MAX, SPEED_MAX};
use crate::timebase::ManualClock;
use std::time::Duration;

/// Simulated loop-tuner actuator: a DC motor driving a lead screw through a
/// gearbox with slack, read back by a potentiometer.
///
/// Time only passes when the actuator is slept on, so the same plant serves
/// unit tests (instant) and the binary (`realtime` also blocks the thread).
#[derive(Debug, Clone)]
pub struct SimulatedActuator {
    motor_pos: f64,
    output_pos: f64,

    units_per_sec_at_full: f64,
    backlash: f64,

    speed: i16,
    faulted: bool,
    fault_armed: bool,
    relay_on: bool,

    clock: ManualClock,
    realtime: bool,
    speed_history: Vec<i16>,
}

impl SimulatedActuator {
    pub fn new(start: u16) -> Self {
        let start = f64::from(start.min(SENSOR_MAX));
        Self {
            motor_pos: start,
            output_pos: start,
            units_per_sec_at_full: 200.0,
            backlash: 0.0,
            speed: 0,
            faulted: false,
            fault_armed: false,
            relay_on: false,
            clock: ManualClock::new(),
            realtime: false,
            speed_history: Vec::new(),
        }
    }

    /// Travel rate in sensor units per second at |speed| = 400.
    pub fn with_rate(mut self, units_per_sec_at_full: f64) -> Self {
        self.units_per_sec_at_full = units_per_sec_at_full.max(0.0);
        self
    }

    /// Gear slack in sensor units, taken up whenever the motor reverses.
    pub fn with_backlash(mut self, units: f64) -> Self {
        self.backlash = units.max(0.0);
        self
    }

    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// The next non-zero speed command reports a driver fault.
    pub fn inject_fault(&mut self) {
        self.fault_armed = true;
    }

    /// Exact output position, before sensor quantisation.
    pub fn true_position(&self) -> f64 {
        self.output_pos
    }

    /// Every speed command issued so far, oldest first.
    pub fn speed_history(&self) -> &[i16] {
        &self.speed_history
    }

    fn step(&mut self, dt_s: f64) {
        if self.faulted || self.speed == 0 {
            return;
        }
        let half_slack = self.backlash / 2.0;
        let velocity = f64::from(self.speed) / f64::from(SPEED_MAX) * self.units_per_sec_at_full;
        self.motor_pos = (self.motor_pos + velocity * dt_s)
            .clamp(-half_slack, f64::from(SENSOR_MAX) + half_slack);

        // Output only moves once the motor has pushed through the slack.
        if self.motor_pos > self.output_pos + half_slack {
            self.output_pos = self.motor_pos - half_slack;
        } else if self.motor_pos < self.output_pos - half_slack {
            self.output_pos = self.motor_pos + half_slack;
        }
        self.output_pos = self.output_pos.clamp(0.0, f64::from(SENSOR_MAX));
    }
}

impl Default for SimulatedActuator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl PositionSensor for SimulatedActuator {
    fn read_position(&mut self) -> u16 {
        self.output_pos.round().clamp(0.0, f64::from(SENSOR_MAX)) as u16
    }
}

impl MotorDriver for SimulatedActuator {
    fn set_speed(&mut self, speed: i16) {
        let speed = speed.clamp(-SPEED_MAX, SPEED_MAX);
        self.speed = speed;
        self.speed_history.push(speed);
        if speed == 0 {
            self.faulted = false;
        } else if self.fault_armed {
            self.fault_armed = false;
            self.faulted = true;
        }
    }

    fn speed(&self) -> i16 {
        self.speed
    }

    fn is_faulted(&self) -> bool {
        self.faulted
    }
}

impl Relay for SimulatedActuator {
    fn set_relay(&mut self, on: bool) {
        self.relay_on = on;
    }

    fn relay(&self) -> bool {
        self.relay_on
    }
}

impl Clock for SimulatedActuator {
    fn sleep(&mut self, duration: Duration) {
        self.step(duration.as_secs_f64());
        self.clock.advance(duration);
        if self.realtime {
            std::thread::sleep(duration);
        }
    }

    fn now_us(&self) -> u64 {
        self.clock.now_us()
    }
}
