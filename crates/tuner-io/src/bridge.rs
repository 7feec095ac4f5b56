use crate::metrics::{
    ACTUATOR_POSITION, BAD_COMMANDS, COMMANDS, DROPPED_FRAMES, FRAMES_SENT, LINK_CONNECTED,
    MOTIONS,
};
use crate::protocol::{encode_reply, FrameDecoder};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use tuner_core::dispatcher::{DispatchStats, Dispatcher};
use tuner_core::hal::MachineIO;
use tuner_core::link::{Command, Link, Reply};
use tuner_core::motion::MotionOutcome;

const READ_CHUNK: usize = 256;
const IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Byte-stream command link.
///
/// A reader thread moves raw bytes into a channel so `poll_command` never
/// blocks; replies are written and flushed one frame at a time.
pub struct StreamLink {
    rx: Receiver<Vec<u8>>,
    decoder: FrameDecoder,
    writer: Box<dyn Write + Send>,
    input_closed: bool,
    output_failed: bool,
}

impl StreamLink {
    pub fn spawn<R>(reader: R, writer: Box<dyn Write + Send>) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("link-reader".into())
            .spawn(move || read_loop(reader, tx))?;
        Ok(Self {
            rx,
            decoder: FrameDecoder::new(),
            writer,
            input_closed: false,
            output_failed: false,
        })
    }

    /// True once the input reached EOF (and every buffered frame has been
    /// consumed) or the output can no longer be written.
    pub fn closed(&self) -> bool {
        self.output_failed || self.input_closed
    }

    fn fill(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => self.decoder.push(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.input_closed {
                        debug!("link input closed");
                    }
                    self.input_closed = true;
                    break;
                }
            }
        }
    }
}

fn read_loop<R: Read>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            // Serial ports report an idle line as a read timeout.
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
                ) => {}
            Err(err) => {
                warn!(error = %err, "link read error");
                break;
            }
        }
    }
}

impl Link for StreamLink {
    fn poll_command(&mut self) -> Option<Command> {
        if let Some(command) = self.decoder.next_command() {
            return Some(command);
        }
        self.fill();
        self.decoder.next_command()
    }

    fn send(&mut self, reply: Reply) {
        if self.output_failed {
            return;
        }
        if let Reply::Status(pos) | Reply::MoveTo(pos) | Reply::Position(pos) = reply {
            ACTUATOR_POSITION.set(f64::from(pos));
        }
        let frame = encode_reply(&reply);
        let written = self
            .writer
            .write_all(frame.as_bytes())
            .and_then(|_| self.writer.flush());
        match written {
            Ok(()) => FRAMES_SENT.inc(),
            Err(err) => {
                warn!(error = %err, frame = %frame, "link write failed");
                self.output_failed = true;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkExit {
    /// The stop flag was raised.
    Stopped,
    /// The host closed the stream.
    Closed,
}

/// Serve commands from `link` one at a time until stopped or closed.
///
/// `observer` sees every command after it has been answered, together with
/// the motion outcome when the command moved the actuator.
#[instrument(skip_all)]
pub fn run_link<IO, F>(
    dispatcher: &mut Dispatcher<IO>,
    link: &mut StreamLink,
    stop: &AtomicBool,
    mut observer: F,
) -> LinkExit
where
    IO: MachineIO,
    F: FnMut(&Command, Option<MotionOutcome>, &mut Dispatcher<IO>),
{
    LINK_CONNECTED.set(1.0);
    ACTUATOR_POSITION.set(f64::from(dispatcher.position()));
    info!("serving command link");

    let exit = loop {
        if stop.load(Ordering::Relaxed) {
            break LinkExit::Stopped;
        }
        let Some(command) = link.poll_command() else {
            if link.closed() {
                break LinkExit::Closed;
            }
            thread::sleep(IDLE_SLEEP);
            continue;
        };

        let before = *dispatcher.stats();
        let outcome = dispatcher.handle(command.clone(), link);
        record(&command, outcome, &before, dispatcher.stats());
        observer(&command, outcome, &mut *dispatcher);
    };

    LINK_CONNECTED.set(0.0);
    info!(exit = ?exit, commands = dispatcher.stats().commands, "command link finished");
    exit
}

fn record(
    command: &Command,
    outcome: Option<MotionOutcome>,
    before: &DispatchStats,
    after: &DispatchStats,
) {
    COMMANDS.with_label_values(&[command.key()]).inc();
    if let Some(outcome) = outcome {
        MOTIONS.with_label_values(&[outcome.as_str()]).inc();
        debug!(command = command.key(), outcome = outcome.as_str(), "motion finished");
    }
    BAD_COMMANDS.inc_by(after.bad_commands.saturating_sub(before.bad_commands));
    DROPPED_FRAMES.inc_by(after.dropped_frames.saturating_sub(before.dropped_frames));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use tuner_core::hal_sim::SimulatedActuator;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn serve(input: &str, start: u16) -> (String, LinkExit, Vec<String>) {
        let out = SharedBuf::default();
        let input = Cursor::new(input.as_bytes().to_vec());
        let mut link = StreamLink::spawn(input, Box::new(out.clone())).unwrap();
        let mut dispatcher = Dispatcher::with_defaults(SimulatedActuator::new(start));
        let stop = AtomicBool::new(false);
        let mut seen = Vec::new();
        let exit = run_link(&mut dispatcher, &mut link, &stop, |cmd, _, _| {
            seen.push(cmd.key().to_string());
        });
        (out.text(), exit, seen)
    }

    #[test]
    fn answers_each_frame_until_eof() {
        let (out, exit, seen) = serve("y;p;q;", 321);
        assert_eq!(exit, LinkExit::Closed);
        assert_eq!(out, "y;Pos: 321;Bad cmd!;");
        assert_eq!(seen, vec!["heartbeat", "position", "unknown"]);
    }

    #[test]
    fn move_streams_status_before_reply() {
        let (out, _, _) = serve("m,520.;", 500);
        assert!(out.starts_with("Status: "), "{out}");
        let (_, last) = out.trim_end_matches(';').rsplit_once(';').unwrap();
        let pos: u16 = last.strip_prefix("MoveTo: ").unwrap().parse().unwrap();
        assert!(pos.abs_diff(520) <= 1, "{out}");
    }

    /// Reader that times out between chunks, like an idle serial line.
    struct IdleLine(Vec<Option<&'static [u8]>>);

    impl Read for IdleLine {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.0.is_empty() {
                return Ok(0);
            }
            match self.0.remove(0) {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                None => Err(ErrorKind::TimedOut.into()),
            }
        }
    }

    #[test]
    fn read_timeouts_keep_the_link_open() {
        let out = SharedBuf::default();
        let line = IdleLine(vec![None, Some(b"y;"), None, None, Some(b"p;")]);
        let mut link = StreamLink::spawn(line, Box::new(out.clone())).unwrap();
        let mut dispatcher = Dispatcher::with_defaults(SimulatedActuator::new(77));
        let stop = AtomicBool::new(false);

        assert_eq!(
            run_link(&mut dispatcher, &mut link, &stop, |_, _, _| {}),
            LinkExit::Closed
        );
        assert_eq!(out.text(), "y;Pos: 77;");
    }

    #[test]
    fn stop_flag_ends_the_loop() {
        let out = SharedBuf::default();
        let mut link = StreamLink::spawn(std::io::empty(), Box::new(out)).unwrap();
        let mut dispatcher = Dispatcher::with_defaults(SimulatedActuator::new(0));
        let stop = AtomicBool::new(true);
        assert_eq!(
            run_link(&mut dispatcher, &mut link, &stop, |_, _, _| {}),
            LinkExit::Stopped
        );
    }
}
