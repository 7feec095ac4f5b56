pub mod bridge;
pub mod metrics;
pub mod protocol;

pub use bridge::{run_link, LinkExit, StreamLink};
pub use metrics::{init_metrics, serve_metrics};
pub use protocol::{encode_reply, parse_frame, FrameDecoder, MalformedCommand};
