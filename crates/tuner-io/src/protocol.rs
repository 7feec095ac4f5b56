//! ASCII frame codec for the tuner command channel.
//!
//! Inbound frames look like `<cmd>[,<arg1>[.<arg2>...]];`. Outbound frames
//! are a reply tag, optionally followed by `: <value>`, and always end in `;`.

use thiserror::Error;
use tracing::{debug, warn};
use tuner_core::link::{Command, Reply};
use tuner_core::tags;

pub const TERMINATOR: u8 = b';';
pub const ARG_START: char = ',';
pub const ARG_SEPARATOR: char = '.';

/// Longest frame body accepted before the terminator.
pub const MAX_FRAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedCommand {
    #[error("empty frame")]
    Empty,
    #[error("frame is not ASCII")]
    NotAscii,
    #[error("frame exceeds {MAX_FRAME_LEN} bytes")]
    Overlong,
    #[error("unknown command letter {0:?}")]
    UnknownCode(char),
}

const KNOWN_CODES: &str = "abcdefhjkmprsvwxyz";

/// Decode one frame body (without its terminator).
///
/// Numeric arguments that fail to parse read as 0; only the command letter
/// can make a frame malformed.
pub fn parse_frame(text: &str) -> Result<Command, MalformedCommand> {
    if !text.is_ascii() {
        return Err(MalformedCommand::NotAscii);
    }
    let text = text.trim();
    let mut chars = text.chars();
    let code = chars.next().ok_or(MalformedCommand::Empty)?;
    if !KNOWN_CODES.contains(code) {
        return Err(MalformedCommand::UnknownCode(code));
    }

    let rest = chars.as_str().trim_start();
    let rest = rest.strip_prefix(ARG_START).unwrap_or(rest);
    let args: Vec<i64> = rest
        .split(ARG_SEPARATOR)
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(|piece| piece.parse::<i64>().unwrap_or(0))
        .collect();

    Ok(Command::from_parts(code, &args))
}

/// Incremental decoder over an unframed byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    discarding: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes held that do not yet form a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete command in arrival order, if one has been received.
    pub fn next_command(&mut self) -> Option<Command> {
        loop {
            let start = self
                .buf
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .unwrap_or(self.buf.len());
            self.buf.drain(..start);

            let Some(end) = self.buf.iter().position(|b| *b == TERMINATOR) else {
                if self.buf.len() > MAX_FRAME_LEN {
                    warn!(len = self.buf.len(), "discarding over-long frame");
                    self.buf.clear();
                    self.discarding = true;
                }
                return None;
            };

            let frame: Vec<u8> = self.buf.drain(..=end).collect();
            let body = &frame[..end];
            let result = if std::mem::take(&mut self.discarding) || body.len() > MAX_FRAME_LEN {
                Err(MalformedCommand::Overlong)
            } else {
                std::str::from_utf8(body)
                    .map_err(|_| MalformedCommand::NotAscii)
                    .and_then(parse_frame)
            };

            match result {
                Ok(command) => {
                    debug!(command = command.key(), "frame decoded");
                    return Some(command);
                }
                Err(MalformedCommand::Empty) => continue,
                Err(err) => {
                    let raw = String::from_utf8_lossy(body).into_owned();
                    warn!(error = %err, frame = %raw, "malformed frame");
                    return Some(Command::Unknown(raw));
                }
            }
        }
    }
}

/// Render a reply as the exact bytes sent on the wire.
pub fn encode_reply(reply: &Reply) -> String {
    match reply {
        Reply::Done(tag) => format!("{};", tag.reply),
        Reply::MoveTo(pos) => format!("{}: {};", tags::MOVE_TO.reply, pos),
        Reply::Position(pos) => format!("{}: {};", tags::POSITION.reply, pos),
        Reply::Heartbeat => format!("{};", tags::HEARTBEAT.reply),
        Reply::MotorFault => format!("{};", tags::MOTOR_FAULT),
        Reply::BadCommand => format!("{};", tags::BAD_COMMAND),
        Reply::Status(pos) => format!("{}: {};", tags::STATUS, pos),
        Reply::Limit(pos) => format!("{}: {};", tags::LIMIT, pos),
        // A terminator inside the text would split the frame.
        Reply::Debug(text) => format!("{}: {};", tags::DEBUG, text.replace(';', ",")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<Command> {
        let mut decoder = FrameDecoder::new();
        decoder.push(input);
        std::iter::from_fn(|| decoder.next_command()).collect()
    }

    #[test]
    fn parses_arguments_after_comma() {
        assert_eq!(parse_frame("m,512."), Ok(Command::MoveTo(512)));
        assert_eq!(parse_frame("m,300"), Ok(Command::MoveTo(300)));
        assert_eq!(parse_frame("w,1500.7."), Ok(Command::TimedForward(1500)));
        assert_eq!(parse_frame("s"), Ok(Command::SetSpeed(0)));
    }

    #[test]
    fn bad_numbers_read_as_zero() {
        assert_eq!(parse_frame("m,abc."), Ok(Command::MoveTo(0)));
        assert_eq!(parse_frame("j,-5."), Ok(Command::SetHomeLimit(-5)));
    }

    #[test]
    fn unknown_letters_are_malformed() {
        assert_eq!(parse_frame("q"), Err(MalformedCommand::UnknownCode('q')));
        assert_eq!(parse_frame("  "), Err(MalformedCommand::Empty));
    }

    #[test]
    fn decoder_splits_a_stream() {
        let cmds = decode_all(b"y;\r\np;  m,10.;");
        assert_eq!(
            cmds,
            vec![Command::Heartbeat, Command::QueryPosition, Command::MoveTo(10)]
        );
    }

    #[test]
    fn decoder_waits_for_terminator() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"m,5");
        assert_eq!(decoder.next_command(), None);
        decoder.push(b"12.;");
        assert_eq!(decoder.next_command(), Some(Command::MoveTo(512)));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn empty_frames_are_skipped() {
        assert_eq!(decode_all(b";;y;"), vec![Command::Heartbeat]);
    }

    #[test]
    fn overlong_frame_becomes_unknown() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[b'm'; 100]);
        assert_eq!(decoder.next_command(), None);
        decoder.push(b"1;y;");
        assert!(matches!(decoder.next_command(), Some(Command::Unknown(_))));
        assert_eq!(decoder.next_command(), Some(Command::Heartbeat));
    }

    #[test]
    fn replies_render_exact_frames() {
        assert_eq!(encode_reply(&Reply::Done(tags::RELAY_ON)), "RlyOn;");
        assert_eq!(encode_reply(&Reply::MoveTo(512)), "MoveTo: 512;");
        assert_eq!(encode_reply(&Reply::Position(7)), "Pos: 7;");
        assert_eq!(encode_reply(&Reply::Heartbeat), "y;");
        assert_eq!(encode_reply(&Reply::MotorFault), "Motor fault;");
        assert_eq!(encode_reply(&Reply::BadCommand), "Bad cmd!;");
        assert_eq!(encode_reply(&Reply::Status(900)), "Status: 900;");
        assert_eq!(encode_reply(&Reply::Debug("a;b".into())), "Dbg: a,b;");
    }
}
