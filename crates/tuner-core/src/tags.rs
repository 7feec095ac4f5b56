/// Wire names for one command: its frame letter, the tag of its reply frame,
/// and the key used in logs, metrics and audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub command: char,
    pub reply: &'static str,
    pub key: &'static str,
}

pub const RELAY_ON: Tag = Tag {
    command: 'a',
    reply: "RlyOn",
    key: "relay_on",
};

pub const RELAY_OFF: Tag = Tag {
    command: 'b',
    reply: "RlyOff",
    key: "relay_off",
};

pub const RUN_FORWARD: Tag = Tag {
    command: 'c',
    reply: "RunFwd",
    key: "run_forward",
};

pub const RUN_REVERSE: Tag = Tag {
    command: 'd',
    reply: "RunRev",
    key: "run_reverse",
};

pub const STOP_RUN: Tag = Tag {
    command: 'e',
    reply: "StopRun",
    key: "stop_run",
};

pub const NUDGE_FORWARD: Tag = Tag {
    command: 'f',
    reply: "NudgeFwd",
    key: "nudge_forward",
};

pub const CALIBRATE_HOME: Tag = Tag {
    command: 'h',
    reply: "Home",
    key: "calibrate_home",
};

pub const HOME_LIMIT: Tag = Tag {
    command: 'j',
    reply: "HomeLimit",
    key: "home_limit",
};

pub const MAX_LIMIT: Tag = Tag {
    command: 'k',
    reply: "MaxLimit",
    key: "max_limit",
};

pub const MOVE_TO: Tag = Tag {
    command: 'm',
    reply: "MoveTo",
    key: "move_to",
};

pub const POSITION: Tag = Tag {
    command: 'p',
    reply: "Pos",
    key: "position",
};

pub const NUDGE_REVERSE: Tag = Tag {
    command: 'r',
    reply: "NudgeRev",
    key: "nudge_reverse",
};

pub const SPEED: Tag = Tag {
    command: 's',
    reply: "Speed",
    key: "speed",
};

pub const TIMED_REVERSE: Tag = Tag {
    command: 'v',
    reply: "msRev",
    key: "timed_reverse",
};

pub const TIMED_FORWARD: Tag = Tag {
    command: 'w',
    reply: "msFwd",
    key: "timed_forward",
};

pub const CALIBRATE_MAX: Tag = Tag {
    command: 'x',
    reply: "Max",
    key: "calibrate_max",
};

pub const HEARTBEAT: Tag = Tag {
    command: 'y',
    reply: "y",
    key: "heartbeat",
};

pub const ABORT: Tag = Tag {
    command: 'z',
    reply: "",
    key: "abort",
};

// Frames that do not answer a specific command.
pub const STATUS: &str = "Status";
pub const LIMIT: &str = "Limit";
pub const DEBUG: &str = "Dbg";
pub const MOTOR_FAULT: &str = "Motor fault";
pub const BAD_COMMAND: &str = "Bad cmd!";
