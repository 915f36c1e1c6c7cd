//! Span helpers for the scrape loop.

use tracing::{debug_span, Span};

/// Extension trait for recording an outcome into a span.
pub trait SpanExt {
    /// Record `status` and, on error, `error.message`.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "unavailable");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for per-pod scrape spans.
pub struct ScrapeSpan;

impl ScrapeSpan {
    /// Fields filled in later: `status`, `error.message`, `lines`,
    /// `resolved`, `latency_ms`.
    pub fn new(pod: &str, node: &str) -> Span {
        debug_span!(
            "scrape_pod",
            pod = %pod,
            node = %node,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            lines = tracing::field::Empty,
            resolved = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
