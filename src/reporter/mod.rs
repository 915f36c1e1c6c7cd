//! Fan-out of resolved traces to sinks, plus read access to traces that
//! are still in progress.

mod record;
mod sink;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::correlator::{HopCorrelator, RequestTrace, TraceView};

pub use record::TraceRecord;
pub use sink::{ChannelSink, JsonLinesSink, SinkError, StdoutSink, TraceSink};

/// Emits each resolved trace to every configured sink.
pub struct TraceReporter {
    sinks: Vec<Box<dyn TraceSink>>,
    correlator: Arc<HopCorrelator>,
    emitted: AtomicU64,
    sink_failures: AtomicU64,
}

impl TraceReporter {
    pub fn new(correlator: Arc<HopCorrelator>) -> Self {
        Self {
            sinks: Vec::new(),
            correlator,
            emitted: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
        }
    }

    pub fn with_sink(mut self, sink: impl TraceSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.sinks.push(sink);
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Hand a just-resolved trace to every sink.
    ///
    /// A failing sink is logged and skipped; the others still receive the
    /// record. Building traces are ignored.
    pub fn emit(&self, trace: &RequestTrace) -> Option<TraceRecord> {
        let record = TraceRecord::from_trace(trace)?;
        tracing::info!(
            correlation_id = %record.correlation_id,
            outcome = record.outcome.as_str(),
            hops = record.nodes.len(),
            route = %record.route(),
            "trace resolved"
        );

        for sink in &self.sinks {
            if let Err(e) = sink.emit(&record) {
                self.sink_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(sink = sink.name(), error = %e, "sink rejected trace");
            }
        }
        self.emitted.fetch_add(1, Ordering::Relaxed);
        Some(record)
    }

    /// Traces not yet resolved.
    pub fn building(&self) -> Vec<TraceView> {
        self.correlator.building()
    }

    /// Building traces older than `age`: likely lost hops or a missing
    /// timeout line.
    pub fn stalled(&self, age: Duration) -> Vec<TraceView> {
        self.correlator.building_longer_than(age)
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }
}
