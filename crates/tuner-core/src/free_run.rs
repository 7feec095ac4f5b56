use crate::hal::{Direction, MachineIO};
use crate::link::Link;
use crate::motion::{Motion, MotionOutcome};
use crate::safety::{LimitMode, SafetySignal};
use log::{debug, info};
use std::time::Duration;

/// Parameters of an open-ended drive. Free runs, timed runs and calibration
/// only differ in these.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DrivePlan {
    pub direction: Direction,
    pub mode: LimitMode,
    pub start_delay: Duration,
    /// Stop after this much clock time. `None` runs until a signal.
    pub run_for: Option<Duration>,
    /// Outcome reported when a stop frame ends the drive.
    pub on_stop: MotionOutcome,
}

impl<IO: MachineIO, L: Link + ?Sized> Motion<'_, IO, L> {
    /// Drive until stopped, aborted, or limited.
    pub fn run_free(&mut self, direction: Direction) -> MotionOutcome {
        let start_delay = match direction {
            Direction::Forward => Duration::ZERO,
            Direction::Reverse => self.tuning.reverse_start_delay,
        };
        self.drive(DrivePlan {
            direction,
            mode: LimitMode::SoftOrStability,
            start_delay,
            run_for: None,
            on_stop: MotionOutcome::Completed,
        })
    }

    /// Drive for `run_for` of clock time, honouring soft limits.
    pub fn timed_run(&mut self, direction: Direction, run_for: Duration) -> MotionOutcome {
        self.drive(DrivePlan {
            direction,
            mode: LimitMode::SoftLimits,
            start_delay: Duration::ZERO,
            run_for: Some(run_for),
            on_stop: MotionOutcome::Completed,
        })
    }

    /// One short pulse at the configured speed. Not monitored.
    pub fn nudge(&mut self, direction: Direction) -> MotionOutcome {
        if self
            .start(direction.signed(self.config.current_speed))
            .is_err()
        {
            return MotionOutcome::Faulted;
        }
        self.io.sleep(self.tuning.nudge_pulse);
        self.stop();
        debug!("nudge {:?} done", direction);
        MotionOutcome::Completed
    }

    pub(crate) fn drive(&mut self, plan: DrivePlan) -> MotionOutcome {
        if !plan.start_delay.is_zero() {
            self.io.sleep(plan.start_delay);
        }
        if self
            .start(plan.direction.signed(self.config.current_speed))
            .is_err()
        {
            return MotionOutcome::Faulted;
        }

        let mut monitor = self.monitor(plan.mode);
        let started_us = self.io.now_us();
        let mut iterations = 0u32;

        let outcome = loop {
            let step = match plan.run_for {
                Some(total) => {
                    let elapsed =
                        Duration::from_micros(self.io.now_us().saturating_sub(started_us));
                    if elapsed >= total {
                        break MotionOutcome::Completed;
                    }
                    (total - elapsed).min(self.tuning.free_run_poll)
                }
                None => self.tuning.free_run_poll,
            };
            self.io.sleep(step);
            let position = self.io.read_position();

            iterations += 1;
            if self.due(iterations) {
                self.status(position);
            }

            match monitor.poll(self.link, position) {
                SafetySignal::None => {}
                SafetySignal::AbortRequested => break MotionOutcome::Aborted,
                SafetySignal::StopRequested => break plan.on_stop,
                SafetySignal::LimitReached => {
                    self.limit_hit(position);
                    break MotionOutcome::Completed;
                }
            }
        };

        self.stop();
        self.retire(&monitor);
        info!(
            "{:?} drive ended {} after {} polls",
            plan.direction,
            outcome.as_str(),
            iterations
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{MotionTuning, ReportConfig, RunConfig};
    use crate::hal::{Clock, Direction, MotorDriver, PositionSensor};
    use crate::hal_sim::SimulatedActuator;
    use crate::link::{Command, Reply, ScriptedLink};
    use crate::motion::{Motion, MotionOutcome};
    use std::time::Duration;

    fn limited(home: i64, max: i64) -> RunConfig {
        let mut config = RunConfig::default();
        config.set_home_limit(home);
        config.set_max_limit(max);
        config
    }

    #[test]
    fn forward_run_halts_at_max_limit() {
        let mut sim = SimulatedActuator::new(850);
        let mut link = ScriptedLink::new();
        let config = limited(100, 900);
        let tuning = MotionTuning::default();
        let report = ReportConfig {
            limit_frames: true,
            ..ReportConfig::default()
        };
        let mut motion = Motion::new(&mut sim, &mut link, &config, &tuning, report);

        assert_eq!(motion.run_free(Direction::Forward), MotionOutcome::Completed);
        let stopped = sim.read_position();
        assert!((898..=910).contains(&stopped), "stopped at {stopped}");
        assert_eq!(sim.speed(), 0);
        assert!(matches!(link.sent().last(), Some(Reply::Limit(_))));
    }

    #[test]
    fn run_without_limits_stops_on_stall() {
        let mut sim = SimulatedActuator::new(950);
        let mut link = ScriptedLink::new();
        let config = RunConfig::default();
        let tuning = MotionTuning::default();
        let mut motion =
            Motion::new(&mut sim, &mut link, &config, &tuning, ReportConfig::default());

        assert_eq!(motion.run_free(Direction::Forward), MotionOutcome::Completed);
        assert_eq!(sim.read_position(), 1023);
    }

    #[test]
    fn stop_frame_ends_a_run() {
        let mut sim = SimulatedActuator::new(500);
        let mut link = ScriptedLink::new();
        link.queue_after(2, Command::StopRun);
        let config = RunConfig::default();
        let tuning = MotionTuning::default();
        let mut motion =
            Motion::new(&mut sim, &mut link, &config, &tuning, ReportConfig::default());

        assert_eq!(motion.run_free(Direction::Reverse), MotionOutcome::Completed);
        assert_eq!(sim.read_position(), 470);
    }

    #[test]
    fn abort_frame_aborts_a_run() {
        let mut sim = SimulatedActuator::new(500);
        let mut link = ScriptedLink::new();
        link.queue_after(4, Command::Abort);
        let config = RunConfig::default();
        let tuning = MotionTuning::default();
        let mut motion =
            Motion::new(&mut sim, &mut link, &config, &tuning, ReportConfig::default());

        assert_eq!(motion.run_free(Direction::Forward), MotionOutcome::Aborted);
        assert_eq!(sim.speed(), 0);
    }

    #[test]
    fn reverse_run_waits_before_driving() {
        let mut sim = SimulatedActuator::new(500);
        let mut link = ScriptedLink::new();
        link.queue(Command::StopRun);
        let config = RunConfig::default();
        let tuning = MotionTuning::default();
        let mut motion =
            Motion::new(&mut sim, &mut link, &config, &tuning, ReportConfig::default());
        motion.run_free(Direction::Reverse);

        let history = sim.speed_history();
        assert_eq!(history, &[-200, 0]);
        assert_eq!(sim.now_us(), 300_000);
    }

    #[test]
    fn timed_run_lasts_the_requested_time() {
        let mut sim = SimulatedActuator::new(100);
        let mut link = ScriptedLink::new();
        let config = RunConfig::default();
        let tuning = MotionTuning::default();
        let mut motion =
            Motion::new(&mut sim, &mut link, &config, &tuning, ReportConfig::default());

        let outcome = motion.timed_run(Direction::Forward, Duration::from_millis(250));
        assert_eq!(outcome, MotionOutcome::Completed);
        assert_eq!(sim.now_us(), 250_000);
        assert_eq!(sim.read_position(), 125);
    }

    #[test]
    fn nudge_is_a_single_pulse() {
        let mut sim = SimulatedActuator::new(100);
        let mut link = ScriptedLink::new();
        let config = RunConfig::default();
        let tuning = MotionTuning::default();
        let mut motion =
            Motion::new(&mut sim, &mut link, &config, &tuning, ReportConfig::default());

        assert_eq!(motion.nudge(Direction::Reverse), MotionOutcome::Completed);
        assert_eq!(sim.read_position(), 95);
        assert_eq!(sim.speed_history(), &[-200, 0]);
    }

    #[test]
    fn faulted_start_skips_the_loop() {
        let mut sim = SimulatedActuator::new(100);
        sim.inject_fault();
        let mut link = ScriptedLink::new();
        let config = RunConfig::default();
        let tuning = MotionTuning::default();
        let mut motion =
            Motion::new(&mut sim, &mut link, &config, &tuning, ReportConfig::default());

        assert_eq!(motion.run_free(Direction::Forward), MotionOutcome::Faulted);
        assert_eq!(link.polls(), 0);
    }
}
