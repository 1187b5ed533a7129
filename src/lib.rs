//! Library crate for sockprobe: bulk TCP probing with banner, TLS and socket metadata capture.
pub mod config;
pub mod error;
pub mod hosts;
pub mod ports;
pub mod probe;
pub mod scanner;
pub mod services;
pub mod sink;
pub mod targets;
mod tls;
pub mod types;

pub use config::{OutputOrder, ScanConfig};
pub use error::ScanError;
pub use probe::probe_target;
pub use scanner::{scan_targets, scan_targets_with_sink, Progress};
pub use sink::{OutputFormat, ResultSink};
pub use targets::TargetSet;
pub use types::{FailureReason, ProbeResult, ScanReport, Target, TlsInfo};
