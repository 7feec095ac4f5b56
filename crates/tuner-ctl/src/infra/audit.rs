//! Audit trail of actuator activity.
//!
//! One JSON object per line: start and shutdown, every motion outcome,
//! driver faults, rejected frames and configuration changes.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tuner_core::config::RunConfig;
use tuner_core::motion::MotionOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SystemStart,
    SystemShutdown,
    MotionCompleted,
    MotionAborted,
    /// Motor driver reported a fault when a motion started
    DriverFault,
    /// Speed, soft limit or relay state changed
    ConfigChange,
    /// Frame answered with `Bad cmd!`
    BadCommand,
}

impl AuditEventType {
    pub fn for_outcome(outcome: MotionOutcome) -> Self {
        match outcome {
            MotionOutcome::Completed => AuditEventType::MotionCompleted,
            MotionOutcome::Aborted => AuditEventType::MotionAborted,
            MotionOutcome::Faulted => AuditEventType::DriverFault,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic timestamp in microseconds
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    pub fn log(&self, entry: AuditEntry) -> io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| io::Error::other("audit writer poisoned"))?;
        serde_json::to_writer(&mut *writer, &entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn log_event(
        &self,
        timestamp_us: u64,
        unix_us: u64,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> io::Result<()> {
        self.log(AuditEntry {
            timestamp_us,
            unix_us,
            event_type,
            details,
        })
    }
}

/// Details for a finished motion
#[derive(Debug, Clone, Serialize)]
pub struct MotionDetails {
    pub command: &'static str,
    pub outcome: MotionOutcome,
    pub position: u16,
}

/// Details for a configuration change
#[derive(Debug, Clone, Serialize)]
pub struct ConfigChangeDetails {
    pub command: &'static str,
    pub config: RunConfig,
}
