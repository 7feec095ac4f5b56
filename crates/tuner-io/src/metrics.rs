//! Prometheus metrics for the tuner controller.
//!
//! Counters are driven from the link loop; nothing here is on the motion
//! path.

use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Command Metrics
// ============================================================================

/// Commands handled, by command key
pub static COMMANDS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("tuner_commands_total", "Commands handled by the dispatcher"),
        &["command"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Motions finished, by outcome
pub static MOTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("tuner_motions_total", "Motion operations finished, by outcome"),
        &["outcome"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static BAD_COMMANDS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "tuner_bad_commands_total",
        "Frames answered with Bad cmd!",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Frames discarded because they arrived while a motion was running
pub static DROPPED_FRAMES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "tuner_dropped_frames_total",
        "Frames other than abort or stop received during a motion",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static FRAMES_SENT: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("tuner_frames_sent_total", "Frames written to the host").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Actuator State Metrics
// ============================================================================

/// Last sensor sample reported to the host
pub static ACTUATOR_POSITION: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "tuner_actuator_position",
        "Last reported actuator position (0-1023)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Command link status (1 = serving, 0 = closed)
pub static LINK_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "tuner_link_connected",
        "Command link status (1=serving, 0=closed)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let mut buffer = Vec::new();
                    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                        continue;
                    }

                    let mut response = Response::from_data(buffer);
                    if let Ok(header) = tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"text/plain; version=0.0.4"[..],
                    ) {
                        response = response.with_header(header);
                    }
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    if LINK_CONNECTED.get() > 0.0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = COMMANDS.with_label_values(&["heartbeat"]).get();
    for outcome in ["completed", "aborted", "faulted"] {
        let _ = MOTIONS.with_label_values(&[outcome]).get();
    }
    let _ = BAD_COMMANDS.get();
    let _ = DROPPED_FRAMES.get();
    let _ = FRAMES_SENT.get();
    let _ = ACTUATOR_POSITION.get();
    let _ = LINK_CONNECTED.get();
}
