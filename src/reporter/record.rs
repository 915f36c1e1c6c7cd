use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::correlator::{Outcome, RequestTrace};
use crate::ids::CorrelationId;

/// A resolved trace as handed to sinks. One record per correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub correlation_id: CorrelationId,
    pub nodes: Vec<String>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub resolved_at: DateTime<Utc>,
}

impl TraceRecord {
    /// `None` for a trace that is still being built.
    pub fn from_trace(trace: &RequestTrace) -> Option<Self> {
        let outcome = trace.state.outcome()?;
        Some(Self {
            correlation_id: trace.correlation_id,
            nodes: trace.hops.iter().map(|n| n.as_str().to_string()).collect(),
            outcome,
            model: trace.model.clone(),
            resolved_at: Utc::now(),
        })
    }

    pub fn route(&self) -> String {
        self.nodes.join(" -> ")
    }

    /// Human-readable line: `1b4e28ba: node-a -> node-b [model m]`, with a
    /// `(TIMEOUT)` or `(LOCAL)` marker for requests that never reached a model.
    pub fn display_line(&self) -> String {
        let id = self.correlation_id.short();
        match self.outcome {
            Outcome::Timeout => format!("{} (TIMEOUT): {}", id, self.route()),
            Outcome::Model => match &self.model {
                Some(model) => format!("{}: {} [model {}]", id, self.route(), model),
                None => format!("{}: {}", id, self.route()),
            },
            Outcome::Local => format!("{} (LOCAL): {}", id, self.route()),
        }
    }
}
