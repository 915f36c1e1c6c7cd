//! Telemetry: structured logging, spans and metrics.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    describe_metrics, record_event_discarded, record_hop_accepted, record_identity_snapshot,
    record_malformed_line, record_poll, record_trace_resolved, record_traces_building,
};
pub use spans::{ScrapeSpan, SpanExt};
