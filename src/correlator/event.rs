//! Parsed log events and the hop target union.
//!
//! Only token positions matter: a hop line ends with
//! `<correlation_id> <jump_index> <target>`, a timeout line ends with
//! `<correlation_id>`. Whatever precedes them (timestamps, level, module
//! path, marker) is ignored.

use thiserror::Error;

use crate::ids::{ContainerId, CorrelationId, NodeRef};

/// Raw target token naming the local pipeline instead of a peer.
pub const LOCAL_TARGET: &str = "localhost";

/// Prefix that marks a model-serving terminal target.
pub const MODEL_TARGET_PREFIX: &str = "model";

/// A line that does not have the expected trailing token shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed log line ({reason}): {line}")]
pub struct MalformedLogLine {
    pub reason: &'static str,
    pub line: String,
}

impl MalformedLogLine {
    fn new(reason: &'static str, line: &str) -> Self {
        const MAX_EXCERPT: usize = 160;
        let line = match line.char_indices().nth(MAX_EXCERPT) {
            Some((idx, _)) => format!("{}...", &line[..idx]),
            None => line.to_string(),
        };
        Self { reason, line }
    }
}

/// Where a proxy said it sent a request, before identity translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopTarget {
    /// A peer proxy, named by its ephemeral id.
    Container(ContainerId),
    /// Handled by the emitting node's own pipeline.
    LocalSink,
    /// Handed to a model server. Terminal, never a routable node.
    ModelSink(String),
}

impl HopTarget {
    pub fn parse(token: &str) -> Self {
        if token == LOCAL_TARGET {
            return HopTarget::LocalSink;
        }
        if token.starts_with(MODEL_TARGET_PREFIX) {
            let name = token
                .strip_prefix("model:")
                .filter(|n| !n.is_empty())
                .unwrap_or(token);
            return HopTarget::ModelSink(name.to_string());
        }
        HopTarget::Container(ContainerId::new(token))
    }
}

/// "I forwarded (or terminated) this request at step `jump_index`."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopEvent {
    pub correlation_id: CorrelationId,
    pub jump_index: u32,
    pub raw_target: HopTarget,
    /// Node whose log carried the line.
    pub origin: NodeRef,
}

impl HopEvent {
    pub fn parse_line(line: &str, origin: &NodeRef) -> Result<Self, MalformedLogLine> {
        let mut tokens = line.split_whitespace().rev();
        let (Some(target), Some(jump), Some(id)) = (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(MalformedLogLine::new("fewer than three tokens", line));
        };

        let correlation_id = id
            .parse::<CorrelationId>()
            .map_err(|_| MalformedLogLine::new("bad correlation id", line))?;
        let jump_index = jump
            .parse::<u32>()
            .map_err(|_| MalformedLogLine::new("bad jump index", line))?;

        Ok(Self {
            correlation_id,
            jump_index,
            raw_target: HopTarget::parse(target),
            origin: origin.clone(),
        })
    }
}

/// "This request expired while waiting for a downstream hop."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutEvent {
    pub correlation_id: CorrelationId,
    pub origin: NodeRef,
}

impl TimeoutEvent {
    pub fn parse_line(line: &str, origin: &NodeRef) -> Result<Self, MalformedLogLine> {
        let id = line
            .split_whitespace()
            .next_back()
            .ok_or_else(|| MalformedLogLine::new("empty line", line))?;
        let correlation_id = id
            .parse::<CorrelationId>()
            .map_err(|_| MalformedLogLine::new("bad correlation id", line))?;
        Ok(Self {
            correlation_id,
            origin: origin.clone(),
        })
    }
}

/// Either kind of event, as fed to the correlator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Hop(HopEvent),
    Timeout(TimeoutEvent),
}

impl From<HopEvent> for LogEvent {
    fn from(value: HopEvent) -> Self {
        LogEvent::Hop(value)
    }
}

impl From<TimeoutEvent> for LogEvent {
    fn from(value: TimeoutEvent) -> Self {
        LogEvent::Timeout(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "6f1c2a3b-4d5e-4f60-8a7b-9c0d1e2f3a4b";

    fn origin() -> NodeRef {
        NodeRef::new("edge-a")
    }

    #[test]
    fn parses_hop_line_with_prefix_noise() {
        let line = format!("[2024-05-01T10:00:00Z INFO triton_proxy::server] TRITON_PROXY_DEBUG {ID} 2 0f8e-uid");
        let event = HopEvent::parse_line(&line, &origin()).unwrap();
        assert_eq!(event.correlation_id.to_string(), ID);
        assert_eq!(event.jump_index, 2);
        assert_eq!(event.raw_target, HopTarget::Container("0f8e-uid".into()));
        assert_eq!(event.origin, origin());
    }

    #[test]
    fn target_union_is_closed() {
        assert_eq!(HopTarget::parse("localhost"), HopTarget::LocalSink);
        assert_eq!(HopTarget::parse("model:seg-v2"), HopTarget::ModelSink("seg-v2".into()));
        assert_eq!(
            HopTarget::parse("model-seg-v2"),
            HopTarget::ModelSink("model-seg-v2".into())
        );
        assert_eq!(HopTarget::parse("model:"), HopTarget::ModelSink("model:".into()));
    }

    #[test]
    fn rejects_short_hop_line() {
        let err = HopEvent::parse_line("PROXY_DEBUG 1", &origin()).unwrap_err();
        assert_eq!(err.reason, "fewer than three tokens");
    }

    #[test]
    fn rejects_negative_jump() {
        let line = format!("PROXY_DEBUG {ID} -1 localhost");
        let err = HopEvent::parse_line(&line, &origin()).unwrap_err();
        assert_eq!(err.reason, "bad jump index");
    }

    #[test]
    fn parses_timeout_line() {
        let line = format!("ERROR Proxy connection failed: Timeout expired for request {ID}");
        let event = TimeoutEvent::parse_line(&line, &origin()).unwrap();
        assert_eq!(event.correlation_id.to_string(), ID);
    }

    #[test]
    fn rejects_timeout_line_without_id() {
        assert!(TimeoutEvent::parse_line("Timeout expired for request", &origin()).is_err());
        assert!(TimeoutEvent::parse_line("   ", &origin()).is_err());
    }

    #[test]
    fn malformed_excerpt_is_bounded() {
        let long = "x".repeat(1000);
        let err = TimeoutEvent::parse_line(&long, &origin()).unwrap_err();
        assert!(err.line.len() < 200);
    }
}
