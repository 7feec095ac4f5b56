use crate::tags::{self, Tag};
#[cfg(any(test, feature = "simulation"))]
use std::collections::VecDeque;

/// A decoded inbound frame.
///
/// Numeric arguments stay as parsed (`i64`) so range handling lives with the
/// code that owns the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    RelayOn,
    RelayOff,
    RunForward,
    RunReverse,
    StopRun,
    NudgeForward,
    NudgeReverse,
    CalibrateHome,
    CalibrateMax,
    SetHomeLimit(i64),
    SetMaxLimit(i64),
    MoveTo(i64),
    QueryPosition,
    SetSpeed(i64),
    TimedReverse(i64),
    TimedForward(i64),
    Heartbeat,
    Abort,
    /// Raw text of a frame whose command letter is not recognised.
    Unknown(String),
}

impl Command {
    /// Map a command letter and its arguments. Missing arguments read as 0.
    pub fn from_parts(code: char, args: &[i64]) -> Self {
        let arg = args.first().copied().unwrap_or(0);
        match code {
            'a' => Command::RelayOn,
            'b' => Command::RelayOff,
            'c' => Command::RunForward,
            'd' => Command::RunReverse,
            'e' => Command::StopRun,
            'f' => Command::NudgeForward,
            'h' => Command::CalibrateHome,
            'j' => Command::SetHomeLimit(arg),
            'k' => Command::SetMaxLimit(arg),
            'm' => Command::MoveTo(arg),
            'p' => Command::QueryPosition,
            'r' => Command::NudgeReverse,
            's' => Command::SetSpeed(arg),
            'v' => Command::TimedReverse(arg),
            'w' => Command::TimedForward(arg),
            'x' => Command::CalibrateMax,
            'y' => Command::Heartbeat,
            'z' => Command::Abort,
            other => Command::Unknown(other.to_string()),
        }
    }

    pub fn tag(&self) -> Option<Tag> {
        let tag = match self {
            Command::RelayOn => tags::RELAY_ON,
            Command::RelayOff => tags::RELAY_OFF,
            Command::RunForward => tags::RUN_FORWARD,
            Command::RunReverse => tags::RUN_REVERSE,
            Command::StopRun => tags::STOP_RUN,
            Command::NudgeForward => tags::NUDGE_FORWARD,
            Command::NudgeReverse => tags::NUDGE_REVERSE,
            Command::CalibrateHome => tags::CALIBRATE_HOME,
            Command::CalibrateMax => tags::CALIBRATE_MAX,
            Command::SetHomeLimit(_) => tags::HOME_LIMIT,
            Command::SetMaxLimit(_) => tags::MAX_LIMIT,
            Command::MoveTo(_) => tags::MOVE_TO,
            Command::QueryPosition => tags::POSITION,
            Command::SetSpeed(_) => tags::SPEED,
            Command::TimedReverse(_) => tags::TIMED_REVERSE,
            Command::TimedForward(_) => tags::TIMED_FORWARD,
            Command::Heartbeat => tags::HEARTBEAT,
            Command::Abort => tags::ABORT,
            Command::Unknown(_) => return None,
        };
        Some(tag)
    }

    pub fn key(&self) -> &'static str {
        self.tag().map_or("unknown", |tag| tag.key)
    }
}

/// An outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Bare acknowledgement, e.g. `RlyOn;`.
    Done(Tag),
    MoveTo(u16),
    Position(u16),
    Heartbeat,
    MotorFault,
    BadCommand,
    Status(u16),
    Limit(u16),
    Debug(String),
}

impl Reply {
    /// Frames emitted during an operation rather than in answer to it.
    pub fn is_autonomous(&self) -> bool {
        matches!(self, Reply::Status(_) | Reply::Limit(_) | Reply::Debug(_))
    }
}

/// The command channel as seen from inside the controller.
pub trait Link {
    /// Next complete inbound command, without blocking.
    fn poll_command(&mut self) -> Option<Command>;
    fn send(&mut self, reply: Reply);
}

/// In-memory link that releases queued commands after a number of polls and
/// records every reply.
#[cfg(any(test, feature = "simulation"))]
#[derive(Debug, Default)]
pub struct ScriptedLink {
    script: VecDeque<(u32, Command)>,
    polls: u32,
    sent: Vec<Reply>,
}

#[cfg(any(test, feature = "simulation"))]
impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `command` on the next poll.
    pub fn queue(&mut self, command: Command) {
        self.queue_after(0, command);
    }

    /// Deliver `command` once `polls` polls have passed.
    pub fn queue_after(&mut self, polls: u32, command: Command) {
        self.script.push_back((self.polls + polls, command));
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn sent(&self) -> &[Reply] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<Reply> {
        std::mem::take(&mut self.sent)
    }

    pub fn pending(&self) -> usize {
        self.script.len()
    }
}

#[cfg(any(test, feature = "simulation"))]
impl Link for ScriptedLink {
    fn poll_command(&mut self) -> Option<Command> {
        self.polls += 1;
        match self.script.front() {
            Some((due, _)) if *due < self.polls => self.script.pop_front().map(|(_, cmd)| cmd),
            _ => None,
        }
    }

    fn send(&mut self, reply: Reply) {
        self.sent.push(reply);
    }
}
