//! Incremental route reconstruction from unordered, repeated log events.
//!
//! State is one sharded map entry per correlation id. Every mutation of a
//! trace happens while holding that entry's shard lock, so two events for
//! the same id from concurrent polls are serialized while events for other
//! ids proceed on other shards.
//!
//! Ordering policy: there is no reordering buffer. A hop line is accepted
//! only when its jump index is exactly the next one expected; anything else
//! is discarded and counted under a [`DiscardReason`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use super::event::{HopEvent, HopTarget, LogEvent, TimeoutEvent};
use super::trace::{RequestTrace, TraceState};
use crate::identity::IdentityResolver;
use crate::ids::{CorrelationId, NodeRef};
use crate::telemetry;

/// Configuration for the correlator.
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// How long a terminal trace is kept after its last re-delivered line.
    pub terminal_retention: Duration,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            terminal_retention: Duration::from_secs(600),
        }
    }
}

/// Why an event was dropped without changing any trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiscardReason {
    /// Target container not in the membership snapshot.
    UnknownIdentity,
    /// Jump index ahead of the next expected one (or non-zero with no trace).
    OutOfOrder,
    /// Jump index already accepted; a re-delivered line.
    Stale,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::UnknownIdentity => "unknown_identity",
            DiscardReason::OutOfOrder => "out_of_order",
            DiscardReason::Stale => "stale",
        }
    }
}

/// Effect of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A Building trace gained a hop (or was created with two).
    Extended,
    /// The trace just became terminal. Reported exactly once per id.
    Resolved(RequestTrace),
    Discarded(DiscardReason),
    /// No-op: the trace is already terminal, or a timeout names an
    /// unknown id.
    Ignored,
}

/// Counters readable in-process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorrelatorStats {
    pub hops_accepted: u64,
    pub resolved_model: u64,
    pub resolved_local: u64,
    pub timed_out: u64,
    pub discarded_unknown_identity: u64,
    pub discarded_out_of_order: u64,
    pub discarded_stale: u64,
    pub ignored: u64,
    pub evicted: u64,
}

#[derive(Default)]
struct Counters {
    hops_accepted: AtomicU64,
    resolved_model: AtomicU64,
    resolved_local: AtomicU64,
    timed_out: AtomicU64,
    discarded_unknown_identity: AtomicU64,
    discarded_out_of_order: AtomicU64,
    discarded_stale: AtomicU64,
    ignored: AtomicU64,
    evicted: AtomicU64,
}

/// A trace together with its bookkeeping times.
#[derive(Debug, Clone)]
pub struct TraceView {
    pub trace: RequestTrace,
    /// Time since the trace was created.
    pub age: Duration,
    /// Time since the last accepted hop.
    pub idle: Duration,
}

struct TraceEntry {
    trace: RequestTrace,
    created_at: Instant,
    progressed_at: Instant,
    /// Last time any line for this id was applied, accepted or not.
    last_seen: Instant,
    /// Pass number of `last_seen`.
    seen_pass: u64,
}

impl TraceEntry {
    fn new(trace: RequestTrace, now: Instant, pass: u64) -> Self {
        Self {
            trace,
            created_at: now,
            progressed_at: now,
            last_seen: now,
            seen_pass: pass,
        }
    }

    fn touch(&mut self, now: Instant, pass: u64) {
        self.last_seen = now;
        self.seen_pass = pass;
    }

    /// Terminal, absent from the current pass, and quiet for `retention`.
    fn evictable(&self, now: Instant, pass: u64, retention: Duration) -> bool {
        self.trace.is_terminal()
            && self.seen_pass != pass
            && now.saturating_duration_since(self.last_seen) >= retention
    }

    fn view(&self, now: Instant) -> TraceView {
        TraceView {
            trace: self.trace.clone(),
            age: now.saturating_duration_since(self.created_at),
            idle: now.saturating_duration_since(self.progressed_at),
        }
    }
}

/// Translated hop target.
enum Target {
    Node(NodeRef),
    Local,
    Model(String),
}

/// Shared correlator state. Cheap to share behind an `Arc`.
pub struct HopCorrelator {
    traces: DashMap<CorrelationId, TraceEntry>,
    resolver: Arc<IdentityResolver>,
    config: CorrelatorConfig,
    counters: Counters,
    pass: AtomicU64,
}

impl HopCorrelator {
    pub fn new(resolver: Arc<IdentityResolver>, config: CorrelatorConfig) -> Self {
        Self {
            traces: DashMap::new(),
            resolver,
            config,
            counters: Counters::default(),
            pass: AtomicU64::new(0),
        }
    }

    /// Mark the start of a polling pass. Traces re-delivered during the
    /// latest pass are never evicted.
    pub fn begin_pass(&self) -> u64 {
        self.pass.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn apply(&self, event: &LogEvent) -> Applied {
        match event {
            LogEvent::Hop(hop) => self.apply_hop(hop),
            LogEvent::Timeout(timeout) => self.apply_timeout(timeout),
        }
    }

    /// Apply one hop line.
    ///
    /// The target is only resolved when the jump would be accepted, so a
    /// re-delivered line whose target pod has since left is still counted
    /// as stale or ignored.
    pub fn apply_hop(&self, event: &HopEvent) -> Applied {
        let now = Instant::now();
        let pass = self.pass.load(Ordering::Acquire);
        let jump = event.jump_index as usize;

        let applied = match self.traces.entry(event.correlation_id) {
            Entry::Vacant(slot) => {
                if jump != 0 {
                    Applied::Discarded(DiscardReason::OutOfOrder)
                } else {
                    match self.translate(&event.raw_target) {
                        Some(target) => {
                            let mut trace =
                                RequestTrace::start(event.correlation_id, event.origin.clone());
                            let applied = advance(&mut trace, target);
                            slot.insert(TraceEntry::new(trace, now, pass));
                            applied
                        }
                        None => Applied::Discarded(DiscardReason::UnknownIdentity),
                    }
                }
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                entry.touch(now, pass);
                if entry.trace.is_terminal() {
                    Applied::Ignored
                } else {
                    let expected = entry.trace.expected_jump();
                    if jump < expected {
                        Applied::Discarded(DiscardReason::Stale)
                    } else if jump > expected {
                        Applied::Discarded(DiscardReason::OutOfOrder)
                    } else {
                        match self.translate(&event.raw_target) {
                            Some(target) => {
                                entry.progressed_at = now;
                                advance(&mut entry.trace, target)
                            }
                            None => Applied::Discarded(DiscardReason::UnknownIdentity),
                        }
                    }
                }
            }
        };

        self.observe(event.correlation_id, event.jump_index, &applied);
        applied
    }

    pub fn apply_timeout(&self, event: &TimeoutEvent) -> Applied {
        let now = Instant::now();
        let pass = self.pass.load(Ordering::Acquire);
        let applied = match self.traces.get_mut(&event.correlation_id) {
            Some(mut entry) => {
                entry.touch(now, pass);
                if entry.trace.is_terminal() {
                    Applied::Ignored
                } else {
                    entry.trace.finish(TraceState::TimedOut);
                    Applied::Resolved(entry.trace.clone())
                }
            }
            None => Applied::Ignored,
        };

        if let Applied::Resolved(_) = applied {
            self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
            telemetry::record_trace_resolved("timeout");
        } else {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
        }
        applied
    }

    /// Current trace for `id`, terminal or not.
    pub fn get(&self, id: &CorrelationId) -> Option<RequestTrace> {
        self.traces.get(id).map(|e| e.trace.clone())
    }

    /// All traces still being built.
    pub fn building(&self) -> Vec<TraceView> {
        let now = Instant::now();
        self.traces
            .iter()
            .filter(|e| !e.trace.is_terminal())
            .map(|e| e.view(now))
            .collect()
    }

    /// Building traces created more than `age` ago.
    pub fn building_longer_than(&self, age: Duration) -> Vec<TraceView> {
        let now = Instant::now();
        self.traces
            .iter()
            .filter(|e| !e.trace.is_terminal() && now.saturating_duration_since(e.created_at) > age)
            .map(|e| e.view(now))
            .collect()
    }

    pub fn building_count(&self) -> usize {
        self.traces.iter().filter(|e| !e.trace.is_terminal()).count()
    }

    /// Number of traces held, terminal ones included.
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Drop terminal traces whose lines have left every polled tail.
    ///
    /// A trace re-delivered during the current pass is kept no matter how
    /// long ago it resolved. An idle mesh keeps its last lines in the tail
    /// indefinitely.
    pub fn evict_terminal(&self, now: Instant) -> usize {
        let retention = self.config.terminal_retention;
        let pass = self.pass.load(Ordering::Acquire);
        let before = self.traces.len();
        self.traces
            .retain(|_, entry| !entry.evictable(now, pass, retention));
        let evicted = before.saturating_sub(self.traces.len());
        if evicted > 0 {
            self.counters
                .evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(evicted, "evicted terminal traces");
        }
        evicted
    }

    pub fn stats(&self) -> CorrelatorStats {
        let c = &self.counters;
        CorrelatorStats {
            hops_accepted: c.hops_accepted.load(Ordering::Relaxed),
            resolved_model: c.resolved_model.load(Ordering::Relaxed),
            resolved_local: c.resolved_local.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            discarded_unknown_identity: c.discarded_unknown_identity.load(Ordering::Relaxed),
            discarded_out_of_order: c.discarded_out_of_order.load(Ordering::Relaxed),
            discarded_stale: c.discarded_stale.load(Ordering::Relaxed),
            ignored: c.ignored.load(Ordering::Relaxed),
            evicted: c.evicted.load(Ordering::Relaxed),
        }
    }

    fn translate(&self, raw: &HopTarget) -> Option<Target> {
        match raw {
            HopTarget::LocalSink => Some(Target::Local),
            HopTarget::ModelSink(name) => Some(Target::Model(name.clone())),
            HopTarget::Container(id) => self.resolver.resolve(id).ok().map(Target::Node),
        }
    }

    fn observe(&self, id: CorrelationId, jump: u32, applied: &Applied) {
        let c = &self.counters;
        match applied {
            Applied::Extended => {
                c.hops_accepted.fetch_add(1, Ordering::Relaxed);
                telemetry::record_hop_accepted();
            }
            Applied::Resolved(trace) => {
                c.hops_accepted.fetch_add(1, Ordering::Relaxed);
                telemetry::record_hop_accepted();
                match trace.state {
                    TraceState::CompletedAtModel => {
                        c.resolved_model.fetch_add(1, Ordering::Relaxed);
                    }
                    TraceState::CompletedLocally => {
                        c.resolved_local.fetch_add(1, Ordering::Relaxed);
                    }
                    TraceState::TimedOut | TraceState::Building => {}
                }
                if let Some(outcome) = trace.state.outcome() {
                    telemetry::record_trace_resolved(outcome.as_str());
                }
            }
            Applied::Discarded(reason) => {
                let counter = match reason {
                    DiscardReason::UnknownIdentity => &c.discarded_unknown_identity,
                    DiscardReason::OutOfOrder => &c.discarded_out_of_order,
                    DiscardReason::Stale => &c.discarded_stale,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                telemetry::record_event_discarded(reason.as_str());
                // stale re-delivery is the normal case under tail polling
                if *reason != DiscardReason::Stale {
                    tracing::debug!(
                        correlation_id = %id,
                        jump,
                        reason = reason.as_str(),
                        "hop event discarded"
                    );
                }
            }
            Applied::Ignored => {
                c.ignored.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Apply the next expected hop to a Building trace.
fn advance(trace: &mut RequestTrace, target: Target) -> Applied {
    match target {
        Target::Node(node) => {
            trace.append(node);
            Applied::Extended
        }
        Target::Local => {
            trace.finish(TraceState::CompletedLocally);
            Applied::Resolved(trace.clone())
        }
        Target::Model(name) => {
            trace.finish_at_model(name);
            Applied::Resolved(trace.clone())
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
