//! Closed-loop positioning: a full-speed coarse approach followed by a slow,
//! bounded correction that always finishes from the same side of the target.

use crate::hal::{Direction, MachineIO, SENSOR_MAX};
use crate::link::Link;
use crate::motion::{Motion, MotionOutcome};
use crate::safety::{LimitMode, SafetyMonitor, SafetySignal};
use log::{debug, info, warn};
use std::time::Duration;

fn crossed(direction: Direction, sample: u16, target: u16) -> bool {
    match direction {
        Direction::Forward => sample >= target,
        Direction::Reverse => sample <= target,
    }
}

/// Clock time since the sensor sample last changed.
struct IdleTimer {
    sample: u16,
    since_us: u64,
}

impl IdleTimer {
    fn new(sample: u16, now_us: u64) -> Self {
        Self {
            sample,
            since_us: now_us,
        }
    }

    fn expired(&mut self, sample: u16, now_us: u64, window: Duration) -> bool {
        if sample != self.sample {
            self.sample = sample;
            self.since_us = now_us;
            return false;
        }
        let window_us = u64::try_from(window.as_micros()).unwrap_or(u64::MAX);
        now_us.saturating_sub(self.since_us) >= window_us
    }
}

impl<IO: MachineIO, L: Link + ?Sized> Motion<'_, IO, L> {
    /// Drive the actuator until the sensor reads `target` within tolerance.
    pub fn move_to(&mut self, target: u16) -> MotionOutcome {
        let target = target.min(SENSOR_MAX);
        self.move_stats = Default::default();

        let mut position = self.io.read_position();
        let direction = Direction::toward(position, target);
        debug!("move {} -> {} ({:?})", position, target, direction);

        if self
            .start(direction.signed(self.config.current_speed))
            .is_err()
        {
            return MotionOutcome::Faulted;
        }

        let mut monitor = self.monitor(LimitMode::SoftLimits);
        let mut idle = IdleTimer::new(position, self.io.now_us());
        let mut checks = 0u32;

        while !crossed(direction, position, target) {
            checks += 1;
            if self.due(checks) {
                self.status(position);
                let signal = monitor.poll(self.link, position);
                if signal != SafetySignal::None {
                    self.stop();
                    if signal == SafetySignal::LimitReached {
                        self.limit_hit(position);
                    }
                    self.retire(&monitor);
                    self.move_stats.coarse_checks = checks;
                    info!("move to {} aborted at {} ({:?})", target, position, signal);
                    return MotionOutcome::Aborted;
                }
            }
            self.io.sleep(self.tuning.check_interval);
            position = self.io.read_position();
            if idle.expired(position, self.io.now_us(), self.tuning.coarse_stall_window) {
                warn!("actuator stalled at {} short of {}", position, target);
                self.move_stats.stalled = true;
                break;
            }
        }
        self.move_stats.coarse_checks = checks;

        self.stop();
        self.io.sleep(self.tuning.settle);
        position = self.io.read_position();
        let diff = position.abs_diff(target);
        self.trace(format!("coarse {} diff {}", position, diff));

        if diff > self.tuning.tolerance {
            if let Err(signal) = self.correct(target, &mut monitor) {
                self.stop();
                self.retire(&monitor);
                info!("move to {} aborted during correction ({:?})", target, signal);
                return MotionOutcome::Aborted;
            }
        }

        self.stop();
        position = self.io.read_position();
        self.move_stats.final_diff = position.abs_diff(target);
        if self.move_stats.stalled && self.move_stats.final_diff > self.tuning.tolerance {
            self.retire(&monitor);
            warn!("move to {} gave up at {} after stalling", target, position);
            return MotionOutcome::Aborted;
        }
        self.status(position);
        self.retire(&monitor);
        info!(
            "move to {} complete at {} after {} corrections",
            target, position, self.move_stats.corrections
        );
        MotionOutcome::Completed
    }

    /// Backlash take-up then fine correction, both at the slow speed. The
    /// configured speed is never modified.
    fn correct(&mut self, target: u16, monitor: &mut SafetyMonitor) -> Result<(), SafetySignal> {
        let slow = self.tuning.slow_speed;
        let pulse = self.tuning.correction_pulse;
        let mut position = self.io.read_position();

        // Finish every move travelling forward so gear slack sits on one side.
        while position > target {
            if self.move_stats.backlash_pulses >= self.tuning.backlash_pulse_limit {
                warn!("backlash take-up gave up at {} above {}", position, target);
                break;
            }
            self.cancelled(monitor, position)?;
            self.pulse(Direction::Reverse, slow, pulse);
            self.move_stats.backlash_pulses += 1;
            position = self.io.read_position();
        }

        for _ in 0..self.tuning.correction_attempts {
            if position.abs_diff(target) <= self.tuning.tolerance {
                break;
            }
            self.cancelled(monitor, position)?;
            self.pulse(Direction::toward(position, target), slow, pulse);
            self.move_stats.corrections += 1;
            position = self.io.read_position();
        }
        self.trace(format!(
            "corrected {} after {}+{} pulses",
            position, self.move_stats.backlash_pulses, self.move_stats.corrections
        ));
        Ok(())
    }

    /// Only explicit abort or stop requests interrupt the correction pulses.
    fn cancelled(
        &mut self,
        monitor: &mut SafetyMonitor,
        position: u16,
    ) -> Result<(), SafetySignal> {
        match monitor.poll(self.link, position) {
            signal @ (SafetySignal::AbortRequested | SafetySignal::StopRequested) => Err(signal),
            SafetySignal::None | SafetySignal::LimitReached => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{MotionTuning, ReportConfig, RunConfig};
    use crate::hal::MotorDriver;
    use crate::hal::PositionSensor;
    use crate::hal_sim::SimulatedActuator;
    use crate::link::{Command, Reply, ScriptedLink};
    use crate::motion::{Motion, MotionOutcome, MoveStats};

    fn run_move(
        sim: &mut SimulatedActuator,
        link: &mut ScriptedLink,
        config: &RunConfig,
        tuning: &MotionTuning,
        target: u16,
    ) -> (MotionOutcome, MoveStats) {
        let mut motion = Motion::new(sim, link, config, tuning, ReportConfig::default());
        let outcome = motion.move_to(target);
        (outcome, motion.move_stats())
    }

    #[test]
    fn reaches_target_from_rest_with_status_frames() {
        let mut sim = SimulatedActuator::new(0);
        let mut link = ScriptedLink::new();
        let config = RunConfig::default();
        let (outcome, stats) =
            run_move(&mut sim, &mut link, &config, &MotionTuning::default(), 512);

        assert_eq!(outcome, MotionOutcome::Completed);
        assert!(sim.read_position().abs_diff(512) <= 1);
        assert!(stats.final_diff <= 1);
        assert_eq!(sim.speed(), 0);
        let statuses = link
            .sent()
            .iter()
            .filter(|r| matches!(r, Reply::Status(_)))
            .count();
        assert!(statuses >= 2);
        assert!(matches!(link.sent().last(), Some(Reply::Status(_))));
    }

    #[test]
    fn overshoot_is_taken_up_in_reverse_before_correcting() {
        let mut sim = SimulatedActuator::new(0).with_rate(1000.0);
        let mut link = ScriptedLink::new();
        let mut config = RunConfig::default();
        config.set_speed(400);
        let tuning = MotionTuning {
            slow_speed: 40,
            ..MotionTuning::default()
        };
        let (outcome, stats) = run_move(&mut sim, &mut link, &config, &tuning, 505);

        assert_eq!(outcome, MotionOutcome::Completed);
        assert_eq!(stats.backlash_pulses, 3);
        assert!(sim.read_position().abs_diff(505) <= 1);

        let history = sim.speed_history();
        let first_reverse = history.iter().position(|s| *s < 0);
        assert_eq!(history.first(), Some(&400));
        assert_eq!(first_reverse.map(|i| history[i]), Some(-40));
        assert_eq!(config.current_speed, 400);
    }

    #[test]
    fn abort_stops_the_motor_mid_approach() {
        let mut sim = SimulatedActuator::new(0);
        let mut link = ScriptedLink::new();
        link.queue_after(3, Command::Abort);
        let (outcome, _) = run_move(
            &mut sim,
            &mut link,
            &RunConfig::default(),
            &MotionTuning::default(),
            800,
        );

        assert_eq!(outcome, MotionOutcome::Aborted);
        assert_eq!(sim.speed(), 0);
        assert!(sim.read_position() < 100);
    }

    #[test]
    fn soft_limit_aborts_the_approach() {
        let mut sim = SimulatedActuator::new(500);
        let mut link = ScriptedLink::new();
        let mut config = RunConfig::default();
        config.set_home_limit(100);
        config.set_max_limit(900);
        let (outcome, _) = run_move(&mut sim, &mut link, &config, &MotionTuning::default(), 1000);

        assert_eq!(outcome, MotionOutcome::Aborted);
        let stopped_at = sim.read_position();
        assert!((898..=905).contains(&stopped_at), "stopped at {stopped_at}");
    }

    #[test]
    fn fault_on_start_never_moves() {
        let mut sim = SimulatedActuator::new(200);
        sim.inject_fault();
        let mut link = ScriptedLink::new();
        let (outcome, _) = run_move(
            &mut sim,
            &mut link,
            &RunConfig::default(),
            &MotionTuning::default(),
            600,
        );

        assert_eq!(outcome, MotionOutcome::Faulted);
        assert_eq!(sim.speed(), 0);
        assert_eq!(sim.read_position(), 200);
        assert!(link.sent().is_empty());
    }

    #[test]
    fn zero_speed_move_gives_up_instead_of_spinning() {
        let mut sim = SimulatedActuator::new(100);
        let mut link = ScriptedLink::new();
        let mut config = RunConfig::default();
        config.set_speed(0);
        let (outcome, stats) =
            run_move(&mut sim, &mut link, &config, &MotionTuning::default(), 900);

        assert_eq!(outcome, MotionOutcome::Aborted);
        assert!(stats.stalled);
        assert_eq!(stats.corrections, 10);
        assert!(stats.final_diff > 1);
        assert_eq!(sim.speed(), 0);
    }

    #[test]
    fn slow_speeds_keep_driving_until_the_target() {
        for speed in [1, 3, 5, 7] {
            let mut sim = SimulatedActuator::new(0);
            let mut link = ScriptedLink::new();
            let mut config = RunConfig::default();
            config.set_speed(speed);
            let (outcome, stats) =
                run_move(&mut sim, &mut link, &config, &MotionTuning::default(), 512);

            assert_eq!(outcome, MotionOutcome::Completed, "speed {speed}");
            assert!(!stats.stalled, "speed {speed}");
            assert!(sim.read_position().abs_diff(512) <= 1, "speed {speed}");
        }
    }

    #[test]
    fn mid_move_queries_are_dropped() {
        let mut sim = SimulatedActuator::new(0);
        let mut link = ScriptedLink::new();
        link.queue(Command::QueryPosition);
        let config = RunConfig::default();
        let tuning = MotionTuning::default();
        let mut motion =
            Motion::new(&mut sim, &mut link, &config, &tuning, ReportConfig::default());
        assert_eq!(motion.move_to(300), MotionOutcome::Completed);
        assert_eq!(motion.dropped(), 1);
        assert!(!link
            .sent()
            .iter()
            .any(|r| matches!(r, Reply::Position(_))));
    }
}
