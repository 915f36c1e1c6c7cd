//! In-process log store for tests, demos and replaying captured logs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{LineFilter, LogSource, LogView, PollError};
use crate::identity::PodHandle;

#[derive(Default)]
struct PodLog {
    lines: Vec<String>,
    unreachable: bool,
}

/// Append-only per-pod logs with the same bounded-tail semantics as a real
/// backend.
pub struct MemoryLogSource {
    logs: Mutex<HashMap<String, PodLog>>,
    filter: LineFilter,
    delay: Mutex<Duration>,
    polls: AtomicU64,
}

impl MemoryLogSource {
    pub fn new(filter: LineFilter) -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
            filter,
            delay: Mutex::new(Duration::ZERO),
            polls: AtomicU64::new(0),
        }
    }

    /// Append one line to `pod`'s log.
    pub fn push(&self, pod: &str, line: impl Into<String>) {
        self.logs
            .lock()
            .entry(pod.to_string())
            .or_default()
            .lines
            .push(line.into());
    }

    pub fn set_unreachable(&self, pod: &str, unreachable: bool) {
        self.logs.lock().entry(pod.to_string()).or_default().unreachable = unreachable;
    }

    /// Artificial latency added to every poll.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Number of completed poll calls.
    pub fn poll_count(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LogSource for MemoryLogSource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn poll(&self, pod: &PodHandle, view: LogView) -> Result<Vec<String>, PollError> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let logs = self.logs.lock();
        let result = match logs.get(&pod.pod_name) {
            Some(log) if log.unreachable => Err(PollError::Unavailable {
                pod: pod.pod_name.clone(),
                reason: "marked unreachable".into(),
            }),
            Some(log) => Ok(self.filter.tail(log.lines.iter().map(String::as_str), view)),
            None => Ok(Vec::new()),
        };
        drop(logs);

        self.polls.fetch_add(1, Ordering::Relaxed);
        result
    }
}
