//! Per-request route being reconstructed.

use serde::{Deserialize, Serialize};

use crate::ids::{CorrelationId, NodeRef};

/// Lifecycle of a reconstructed route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceState {
    Building,
    CompletedAtModel,
    CompletedLocally,
    TimedOut,
}

impl TraceState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TraceState::Building)
    }

    /// Outcome tag for emitted records. `None` while building.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            TraceState::Building => None,
            TraceState::CompletedAtModel => Some(Outcome::Model),
            TraceState::CompletedLocally => Some(Outcome::Local),
            TraceState::TimedOut => Some(Outcome::Timeout),
        }
    }
}

/// How a finished request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Model,
    Local,
    Timeout,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Model => "model",
            Outcome::Local => "local",
            Outcome::Timeout => "timeout",
        }
    }
}

/// Ordered nodes a request visited, plus where it stands.
///
/// `hops` is append-only and never empty: the first entry is the node that
/// logged jump 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTrace {
    pub correlation_id: CorrelationId,
    pub hops: Vec<NodeRef>,
    pub state: TraceState,
    /// Model that served the request, when it ended at one.
    pub model: Option<String>,
}

impl RequestTrace {
    pub(crate) fn start(correlation_id: CorrelationId, origin: NodeRef) -> Self {
        Self {
            correlation_id,
            hops: vec![origin],
            state: TraceState::Building,
            model: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Jump index the next accepted hop line must carry.
    pub fn expected_jump(&self) -> usize {
        self.hops.len() - 1
    }

    pub(crate) fn append(&mut self, node: NodeRef) {
        debug_assert!(!self.is_terminal());
        self.hops.push(node);
    }

    pub(crate) fn finish_at_model(&mut self, model: String) {
        self.state = TraceState::CompletedAtModel;
        self.model = Some(model);
    }

    pub(crate) fn finish(&mut self, state: TraceState) {
        debug_assert!(state.is_terminal());
        self.state = state;
    }

    /// `a -> b -> c`
    pub fn route(&self) -> String {
        self.hops
            .iter()
            .map(NodeRef::as_str)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
