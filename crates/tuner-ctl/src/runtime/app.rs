use crate::infra::audit::{AuditEventType, AuditLogger, ConfigChangeDetails, MotionDetails};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use tuner_core::config::MotionTuning;
use tuner_core::dispatcher::Dispatcher;
use tuner_core::hal::MachineIO;
use tuner_core::hal_sim::SimulatedActuator;
use tuner_core::link::Command;
use tuner_core::motion::MotionOutcome;
use tuner_core::timebase::TimeBase;
use tuner_io::bridge::{run_link, StreamLink};
use tuner_io::metrics::{init_metrics, serve_metrics};

/// Bounds each serial read so the reader thread notices a closed port.
const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("cannot open serial port {path}: {source}")]
    OpenPort {
        path: String,
        source: serialport::Error,
    },
    #[error("cannot start link reader: {0}")]
    Link(io::Error),
    #[error("cannot open audit log {path}: {source}")]
    Audit { path: PathBuf, source: io::Error },
}

pub fn run_from_args() -> Result<(), AppError> {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return Ok(());
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> Result<(), AppError> {
    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());

    init_metrics();
    let _metrics_handle = config.metrics_addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    });

    let timebase = TimeBase::new();
    let audit = config
        .audit_path
        .as_deref()
        .map(open_audit_logger)
        .transpose()?;

    let actuator = SimulatedActuator::new(config.sim_start)
        .with_rate(config.sim_rate)
        .with_backlash(config.sim_backlash)
        .with_realtime(true);
    let mut dispatcher = Dispatcher::new(
        actuator,
        config.run_config(),
        MotionTuning::default(),
        config.report(),
    );
    let mut link = open_link(config.port.as_deref(), config.baud)?;

    let stop = Arc::new(AtomicBool::new(false));
    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        let stop_timer = Arc::clone(&stop);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(seconds));
            stop_timer.store(true, Ordering::Relaxed);
        });
    }

    info!(
        port = config.port.as_deref().unwrap_or("stdio"),
        baud = config.baud,
        start = config.sim_start,
        speed = dispatcher.config().current_speed,
        limits = ?dispatcher.config().soft_limits(),
        "tuner controller ready"
    );
    if let Some(logger) = &audit {
        let details = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "port": config.port,
            "position": dispatcher.position(),
            "config": dispatcher.config(),
        });
        audit_event(logger, &timebase, AuditEventType::SystemStart, details);
    }

    let exit = run_link(&mut dispatcher, &mut link, &stop, |command, outcome, d| {
        if let Some(logger) = &audit {
            audit_command(logger, &timebase, command, outcome, d);
        }
    });

    let stats = *dispatcher.stats();
    info!(
        exit = ?exit,
        commands = stats.commands,
        completed = stats.motions_completed,
        aborted = stats.motions_aborted,
        faulted = stats.motions_faulted,
        dropped = stats.dropped_frames,
        "Run complete"
    );
    if let Some(logger) = &audit {
        let details = serde_json::json!({
            "exit": format!("{exit:?}"),
            "position": dispatcher.position(),
            "stats": stats,
        });
        audit_event(logger, &timebase, AuditEventType::SystemShutdown, details);
    }
    Ok(())
}

fn open_link(port: Option<&str>, baud: u32) -> Result<StreamLink, AppError> {
    let (reader, writer): (Box<dyn Read + Send>, Box<dyn Write + Send>) = match port {
        None => (Box::new(io::stdin()), Box::new(io::stdout())),
        Some(path) => {
            let open_err = |source| AppError::OpenPort {
                path: path.to_string(),
                source,
            };
            let serial = serialport::new(path, baud)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .timeout(SERIAL_READ_TIMEOUT)
                .open()
                .map_err(open_err)?;
            let reader = serial.try_clone().map_err(open_err)?;
            info!(port = path, baud, "serial port open");
            (Box::new(reader), Box::new(serial))
        }
    };
    StreamLink::spawn(reader, writer).map_err(AppError::Link)
}

fn open_audit_logger(path: &Path) -> Result<AuditLogger, AppError> {
    let logger = AuditLogger::new(path).map_err(|source| AppError::Audit {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Audit logging enabled");
    Ok(logger)
}

fn audit_command<IO: MachineIO>(
    logger: &AuditLogger,
    timebase: &TimeBase,
    command: &Command,
    outcome: Option<MotionOutcome>,
    dispatcher: &mut Dispatcher<IO>,
) {
    let (event, details) = match (outcome, command) {
        (Some(outcome), _) => {
            let details = MotionDetails {
                command: command.key(),
                outcome,
                position: dispatcher.position(),
            };
            (AuditEventType::for_outcome(outcome), serde_json::to_value(details))
        }
        (
            None,
            Command::SetSpeed(_)
            | Command::SetHomeLimit(_)
            | Command::SetMaxLimit(_)
            | Command::RelayOn
            | Command::RelayOff,
        ) => {
            let details = ConfigChangeDetails {
                command: command.key(),
                config: *dispatcher.config(),
            };
            (AuditEventType::ConfigChange, serde_json::to_value(details))
        }
        (None, Command::Unknown(raw)) => (
            AuditEventType::BadCommand,
            Ok(serde_json::json!({ "frame": raw })),
        ),
        (None, _) => return,
    };

    match details {
        Ok(details) => audit_event(logger, timebase, event, details),
        Err(e) => warn!(error = %e, "Failed to encode audit details"),
    }
}

fn audit_event(
    logger: &AuditLogger,
    timebase: &TimeBase,
    event: AuditEventType,
    details: serde_json::Value,
) {
    if let Err(e) = logger.log_event(timebase.now_us(), timebase.unix_us(), event, details) {
        warn!(error = %e, event = ?event, "Failed to write audit entry");
    }
}
