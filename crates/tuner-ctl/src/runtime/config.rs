use std::path::PathBuf;
use tuner_core::config::{ReportConfig, RunConfig};

/// Line rate the stock host software opens the port at.
pub const DEFAULT_BAUD: u32 = 9600;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    /// Serial device name. `None` (or `-`) serves stdin/stdout.
    pub port: Option<String>,
    pub baud: u32,
    pub run_seconds: Option<u64>,
    pub speed: Option<i64>,
    pub home_limit: Option<i64>,
    pub max_limit: Option<i64>,
    pub sim_start: u16,
    pub sim_rate: f64,
    pub sim_backlash: f64,
    pub debug_frames: bool,
    pub limit_frames: bool,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            port: None,
            baud: DEFAULT_BAUD,
            run_seconds: None,
            speed: None,
            home_limit: None,
            max_limit: None,
            sim_start: 0,
            sim_rate: 200.0,
            sim_backlash: 0.0,
            debug_frames: false,
            limit_frames: false,
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
            audit_path: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match args[i].as_str() {
                "--port" => {
                    if let Some(v) = value {
                        cfg.port = (v != "-").then(|| v.clone());
                        i += 1;
                    }
                }
                "--baud" => {
                    if let Some(v) = value {
                        cfg.baud = v.parse().unwrap_or(DEFAULT_BAUD);
                        i += 1;
                    }
                }
                "--run-seconds" => {
                    if let Some(v) = value {
                        cfg.run_seconds = v.parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--speed" => {
                    if let Some(v) = value {
                        cfg.speed = v.parse().ok();
                        i += 1;
                    }
                }
                "--home-limit" => {
                    if let Some(v) = value {
                        cfg.home_limit = v.parse().ok();
                        i += 1;
                    }
                }
                "--max-limit" => {
                    if let Some(v) = value {
                        cfg.max_limit = v.parse().ok();
                        i += 1;
                    }
                }
                "--sim-start" => {
                    if let Some(v) = value {
                        cfg.sim_start = v.parse().unwrap_or(0);
                        i += 1;
                    }
                }
                "--sim-rate" => {
                    if let Some(v) = value {
                        cfg.sim_rate = v.parse().unwrap_or(200.0);
                        i += 1;
                    }
                }
                "--sim-backlash" => {
                    if let Some(v) = value {
                        cfg.sim_backlash = v.parse().unwrap_or(0.0);
                        i += 1;
                    }
                }
                "--debug-frames" => {
                    cfg.debug_frames = true;
                }
                "--limit-frames" => {
                    cfg.limit_frames = true;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    if let Some(v) = value {
                        cfg.log_dir = Some(PathBuf::from(v));
                        i += 1;
                    }
                }
                "--metrics-addr" => {
                    if let Some(v) = value {
                        cfg.metrics_addr = Some(v.clone());
                        i += 1;
                    }
                }
                "--audit-log" => {
                    if let Some(v) = value {
                        cfg.audit_path = Some(PathBuf::from(v));
                        i += 1;
                    }
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    /// Boot-time run configuration with any command-line overrides applied.
    pub fn run_config(&self) -> RunConfig {
        let mut run = RunConfig::default();
        if let Some(speed) = self.speed {
            run.set_speed(speed);
        }
        if let Some(limit) = self.home_limit {
            run.set_home_limit(limit);
        }
        if let Some(limit) = self.max_limit {
            run.set_max_limit(limit);
        }
        run
    }

    pub fn report(&self) -> ReportConfig {
        ReportConfig {
            debug_frames: self.debug_frames,
            limit_frames: self.limit_frames,
        }
    }

    pub fn print_help() {
        println!(
            r#"tuner-ctl - Loop tuner actuator controller

USAGE:
    tuner-ctl [OPTIONS]

OPTIONS:
    --port <NAME|->         Serial port for commands; '-' serves stdin/stdout [default: -]
    --baud <RATE>           Serial line rate, 8N1 [default: 9600]
    --speed <N>             Initial speed magnitude 0-400 [default: 200]
    --home-limit <N>        Initial home soft limit 0-1023
    --max-limit <N>         Initial max soft limit 0-1023
    --sim-start <POS>       Simulated actuator start position [default: 0]
    --sim-rate <UNITS/S>    Simulated travel rate at full speed [default: 200]
    --sim-backlash <UNITS>  Simulated gear backlash [default: 0]
    --debug-frames          Emit 'Dbg:' frames during moves
    --limit-frames          Emit 'Limit:' frames when a limit stops motion
    --run-seconds <SECS>    Stop serving after a fixed duration
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-dir <DIR>         Also write JSON logs to a daily rolling file in DIR
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>      Enable audit logging to specified JSONL file
    -h, --help              Print this help message

Logs are written to stderr; stdout carries command replies when serving stdio.

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,tuner_core=trace)

EXAMPLES:
    # Serve a host on a serial adapter
    tuner-ctl --port /dev/ttyUSB0 --baud 9600 --metrics-addr 0.0.0.0:9090

    # Interactive session against the simulator
    tuner-ctl --sim-start 500 --debug-frames
"#
        );
    }
}
