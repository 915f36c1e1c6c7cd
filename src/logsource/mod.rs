//! Log source adapters.
//!
//! A log source answers one question: "what are the most recent lines on
//! pod P that match view V?". It returns a bounded tail, not the history,
//! so the same lines come back on consecutive polls. The correlator is
//! written against [`LogSource`] only.

mod kubectl;
mod memory;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

use crate::identity::PodHandle;

pub use kubectl::KubectlLogSource;
pub use memory::MemoryLogSource;

/// The two independently filtered views read from each pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogView {
    /// Forwarding records: `... <correlation_id> <jump> <target>`.
    Hops,
    /// Expiry records: `... <correlation_id>`.
    Timeouts,
}

impl LogView {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogView::Hops => "hops",
            LogView::Timeouts => "timeouts",
        }
    }
}

#[derive(Error, Debug)]
pub enum PollError {
    /// The pod's log store could not be read this pass. Retried next pass.
    #[error("Log source for {pod} unavailable: {reason}")]
    Unavailable { pod: String, reason: String },

    #[error("Invalid line pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Bounded-tail reader of per-pod logs.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Most recent window of lines on `pod` matching `view`, oldest first.
    ///
    /// Must return within a bounded time.
    async fn poll(&self, pod: &PodHandle, view: LogView) -> Result<Vec<String>, PollError>;
}

/// Per-view line patterns plus the tail window size.
#[derive(Debug, Clone)]
pub struct LineFilter {
    hops: Regex,
    timeouts: Regex,
    window: usize,
}

impl LineFilter {
    pub fn new(hop_pattern: &str, timeout_pattern: &str, window: usize) -> Result<Self, PollError> {
        Ok(Self {
            hops: Regex::new(hop_pattern)?,
            timeouts: Regex::new(timeout_pattern)?,
            window: window.max(1),
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    fn pattern(&self, view: LogView) -> &Regex {
        match view {
            LogView::Hops => &self.hops,
            LogView::Timeouts => &self.timeouts,
        }
    }

    /// Keep the last `window` lines of `text` matching `view`.
    pub fn tail<'a, I>(&self, lines: I, view: LogView) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let pattern = self.pattern(view);
        let matching: Vec<&str> = lines.into_iter().filter(|l| pattern.is_match(l)).collect();
        let skip = matching.len().saturating_sub(self.window);
        matching[skip..].iter().map(|l| l.to_string()).collect()
    }
}
