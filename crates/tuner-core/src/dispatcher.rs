use crate::calibration::Extreme;
use crate::config::{clamp_sample, MotionTuning, ReportConfig, RunConfig};
use crate::hal::{Direction, MachineIO};
use crate::link::{Command, Link, Reply};
use crate::motion::{Motion, MotionOutcome};
use crate::tags::{self, Tag};
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Duration;

#[derive(Clone, Copy, Default, Debug, Serialize)]
pub struct DispatchStats {
    pub commands: u64,
    pub motions_completed: u64,
    pub motions_aborted: u64,
    pub motions_faulted: u64,
    pub bad_commands: u64,
    pub dropped_frames: u64,
}

impl DispatchStats {
    fn record(&mut self, outcome: MotionOutcome, dropped: u32) {
        match outcome {
            MotionOutcome::Completed => self.motions_completed += 1,
            MotionOutcome::Aborted => self.motions_aborted += 1,
            MotionOutcome::Faulted => self.motions_faulted += 1,
        }
        self.dropped_frames += u64::from(dropped);
    }
}

/// How much a faulted command says about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultReply {
    /// `Motor fault;` only.
    FaultOnly,
    /// `Motor fault;` followed by the command's own tag.
    FaultThenTag,
}

/// Maps each command to one operation and answers it before the next
/// command is read.
pub struct Dispatcher<IO: MachineIO> {
    io: IO,
    config: RunConfig,
    tuning: MotionTuning,
    report: ReportConfig,
    stats: DispatchStats,
}

impl<IO: MachineIO> Dispatcher<IO> {
    pub fn new(io: IO, config: RunConfig, tuning: MotionTuning, report: ReportConfig) -> Self {
        Self {
            io,
            config,
            tuning,
            report,
            stats: DispatchStats::default(),
        }
    }

    pub fn with_defaults(io: IO) -> Self {
        Self::new(
            io,
            RunConfig::default(),
            MotionTuning::default(),
            ReportConfig::default(),
        )
    }

    /// Run one command to completion. Returns the motion outcome when the
    /// command started a motion.
    pub fn handle<L: Link + ?Sized>(
        &mut self,
        command: Command,
        link: &mut L,
    ) -> Option<MotionOutcome> {
        self.stats.commands += 1;
        debug!("handling {}", command.key());

        match command {
            Command::RelayOn => {
                self.set_relay(true);
                link.send(Reply::Done(tags::RELAY_ON));
                None
            }
            Command::RelayOff => {
                self.set_relay(false);
                link.send(Reply::Done(tags::RELAY_OFF));
                None
            }
            Command::RunForward => Some(self.motion_command(
                link,
                tags::RUN_FORWARD,
                FaultReply::FaultOnly,
                |m| m.run_free(Direction::Forward),
            )),
            Command::RunReverse => Some(self.motion_command(
                link,
                tags::RUN_REVERSE,
                FaultReply::FaultOnly,
                |m| m.run_free(Direction::Reverse),
            )),
            Command::StopRun => {
                // Nothing is running between commands.
                link.send(Reply::Done(tags::STOP_RUN));
                None
            }
            Command::NudgeForward => Some(self.motion_command(
                link,
                tags::NUDGE_FORWARD,
                FaultReply::FaultOnly,
                |m| m.nudge(Direction::Forward),
            )),
            Command::NudgeReverse => Some(self.motion_command(
                link,
                tags::NUDGE_REVERSE,
                FaultReply::FaultOnly,
                |m| m.nudge(Direction::Reverse),
            )),
            Command::CalibrateHome => Some(self.motion_command(
                link,
                tags::CALIBRATE_HOME,
                FaultReply::FaultThenTag,
                |m| m.run_to_extreme(Extreme::Home),
            )),
            Command::CalibrateMax => Some(self.motion_command(
                link,
                tags::CALIBRATE_MAX,
                FaultReply::FaultThenTag,
                |m| m.run_to_extreme(Extreme::Max),
            )),
            Command::SetHomeLimit(value) => {
                self.config.set_home_limit(value);
                info!("home limit set to {:?}", self.config.home_limit);
                link.send(Reply::Done(tags::HOME_LIMIT));
                None
            }
            Command::SetMaxLimit(value) => {
                self.config.set_max_limit(value);
                info!("max limit set to {:?}", self.config.max_limit);
                link.send(Reply::Done(tags::MAX_LIMIT));
                None
            }
            Command::MoveTo(value) => {
                let target = clamp_sample(value);
                let outcome = self.run_motion(link, |m| m.move_to(target));
                match outcome {
                    MotionOutcome::Completed => {
                        let position = self.io.read_position();
                        link.send(Reply::MoveTo(position));
                    }
                    MotionOutcome::Aborted => link.send(Reply::Done(tags::MOVE_TO)),
                    MotionOutcome::Faulted => link.send(Reply::MotorFault),
                }
                Some(outcome)
            }
            Command::QueryPosition => {
                link.send(Reply::Position(self.io.read_position()));
                None
            }
            Command::SetSpeed(value) => {
                self.config.set_speed(value);
                info!("speed set to {}", self.config.current_speed);
                link.send(Reply::Done(tags::SPEED));
                None
            }
            Command::TimedReverse(ms) => Some(self.motion_command(
                link,
                tags::TIMED_REVERSE,
                FaultReply::FaultOnly,
                |m| m.timed_run(Direction::Reverse, run_time(ms)),
            )),
            Command::TimedForward(ms) => Some(self.motion_command(
                link,
                tags::TIMED_FORWARD,
                FaultReply::FaultOnly,
                |m| m.timed_run(Direction::Forward, run_time(ms)),
            )),
            Command::Heartbeat => {
                link.send(Reply::Heartbeat);
                None
            }
            Command::Abort => {
                debug!("abort with no motion active ignored");
                None
            }
            Command::Unknown(raw) => {
                self.stats.bad_commands += 1;
                warn!("unknown command frame {:?}", raw);
                link.send(Reply::BadCommand);
                None
            }
        }
    }

    fn set_relay(&mut self, on: bool) {
        self.io.set_relay(on);
        self.config.relay_on = on;
        info!("relay {}", if on { "on" } else { "off" });
    }

    fn run_motion<L, F>(&mut self, link: &mut L, op: F) -> MotionOutcome
    where
        L: Link + ?Sized,
        F: FnOnce(&mut Motion<'_, IO, L>) -> MotionOutcome,
    {
        let mut motion = Motion::new(&mut self.io, link, &self.config, &self.tuning, self.report);
        let outcome = op(&mut motion);
        let dropped = motion.dropped();
        self.stats.record(outcome, dropped);
        outcome
    }

    /// Run a motion whose reply is its bare tag.
    fn motion_command<L, F>(
        &mut self,
        link: &mut L,
        tag: Tag,
        fault: FaultReply,
        op: F,
    ) -> MotionOutcome
    where
        L: Link + ?Sized,
        F: FnOnce(&mut Motion<'_, IO, L>) -> MotionOutcome,
    {
        let outcome = self.run_motion(link, op);
        if outcome == MotionOutcome::Faulted {
            link.send(Reply::MotorFault);
            if fault == FaultReply::FaultOnly {
                return outcome;
            }
        }
        link.send(Reply::Done(tag));
        outcome
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    /// Current sensor reading, for callers outside a command.
    pub fn position(&mut self) -> u16 {
        self.io.read_position()
    }
}

fn run_time(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}
