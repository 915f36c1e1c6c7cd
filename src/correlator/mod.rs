//! Hop correlation: turning scattered proxy log lines into ordered routes.

mod engine;
mod event;
mod trace;

pub use engine::{
    Applied, CorrelatorConfig, CorrelatorStats, DiscardReason, HopCorrelator, TraceView,
};
pub use event::{
    HopEvent, HopTarget, LogEvent, MalformedLogLine, TimeoutEvent, LOCAL_TARGET,
    MODEL_TARGET_PREFIX,
};
pub use trace::{Outcome, RequestTrace, TraceState};
