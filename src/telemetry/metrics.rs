//! Metrics facade wrappers.
//!
//! Names are registered once with descriptions; recording goes through the
//! `metrics` macros and is a no-op until an exporter is installed.

use ::metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

pub const HOPS_ACCEPTED: &str = "hoptrace_hops_accepted_total";
pub const EVENTS_DISCARDED: &str = "hoptrace_events_discarded_total";
pub const LINES_MALFORMED: &str = "hoptrace_lines_malformed_total";
pub const TRACES_RESOLVED: &str = "hoptrace_traces_resolved_total";
pub const TRACES_BUILDING: &str = "hoptrace_traces_building";
pub const POLL_FAILURES: &str = "hoptrace_poll_failures_total";
pub const POLL_LATENCY: &str = "hoptrace_poll_latency_ms";
pub const IDENTITY_SNAPSHOT_SIZE: &str = "hoptrace_identity_snapshot_size";

/// Register descriptions for every metric this crate emits.
pub fn describe_metrics() {
    describe_counter!(HOPS_ACCEPTED, "Hop events appended to or resolving a trace");
    describe_counter!(EVENTS_DISCARDED, "Hop events dropped, labelled by reason");
    describe_counter!(LINES_MALFORMED, "Log lines without the expected token shape");
    describe_counter!(TRACES_RESOLVED, "Traces reaching a terminal state, by outcome");
    describe_gauge!(TRACES_BUILDING, "Traces still being built");
    describe_counter!(POLL_FAILURES, "Polls that found a log source unavailable");
    describe_histogram!(POLL_LATENCY, Unit::Milliseconds, "Per-pod poll latency");
    describe_gauge!(IDENTITY_SNAPSHOT_SIZE, "Running pods in the identity snapshot");
}

pub fn record_hop_accepted() {
    counter!(HOPS_ACCEPTED).increment(1);
}

pub fn record_event_discarded(reason: &'static str) {
    counter!(EVENTS_DISCARDED, "reason" => reason).increment(1);
}

pub fn record_malformed_line(view: &'static str) {
    counter!(LINES_MALFORMED, "view" => view).increment(1);
}

pub fn record_trace_resolved(outcome: &'static str) {
    counter!(TRACES_RESOLVED, "outcome" => outcome).increment(1);
}

pub fn record_traces_building(count: usize) {
    gauge!(TRACES_BUILDING).set(count as f64);
}

/// Failures are labelled by node name.
pub fn record_poll(node: &str, latency_ms: f64, ok: bool) {
    histogram!(POLL_LATENCY).record(latency_ms);
    if !ok {
        counter!(POLL_FAILURES, "node" => node.to_string()).increment(1);
    }
}

pub fn record_identity_snapshot(size: usize) {
    gauge!(IDENTITY_SNAPSHOT_SIZE).set(size as f64);
}
