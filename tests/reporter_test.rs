//! Tests for trace sinks.

use std::sync::Arc;

use hoptrace::correlator::{Applied, CorrelatorConfig, HopCorrelator, HopEvent, Outcome, TimeoutEvent};
use hoptrace::identity::{IdentityResolver, MembershipRow, StaticMembership};
use hoptrace::ids::{CorrelationId, NodeRef};
use hoptrace::reporter::{JsonLinesSink, SinkError, TraceRecord, TraceReporter, TraceSink};

async fn correlator() -> Arc<HopCorrelator> {
    let source = StaticMembership::new(vec![
        MembershipRow::running("proxy-a", "node-a", "uid-a"),
        MembershipRow::running("proxy-b", "node-b", "uid-b"),
    ]);
    let resolver = Arc::new(IdentityResolver::new(Arc::new(source)));
    resolver.refresh().await.unwrap();
    Arc::new(HopCorrelator::new(resolver, CorrelatorConfig::default()))
}

fn hop(id: CorrelationId, jump: u32, origin: &str, target: &str) -> HopEvent {
    let line = format!("PROXY_DEBUG {} {} {}", id, jump, target);
    HopEvent::parse_line(&line, &NodeRef::new(origin)).unwrap()
}

#[tokio::test]
async fn test_jsonl_sink_appends_one_record_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traces.jsonl");
    let correlator = correlator().await;
    let reporter = TraceReporter::new(correlator.clone()).with_sink(JsonLinesSink::open(&path).unwrap());

    let model_id = CorrelationId::new_v4();
    correlator.apply_hop(&hop(model_id, 0, "node-a", "uid-b"));
    match correlator.apply_hop(&hop(model_id, 1, "node-b", "model:yolo")) {
        Applied::Resolved(trace) => {
            reporter.emit(&trace);
        }
        other => panic!("expected resolution, got {:?}", other),
    }

    let timeout_id = CorrelationId::new_v4();
    correlator.apply_hop(&hop(timeout_id, 0, "node-b", "uid-a"));
    let line = format!("Timeout expired for request {}", timeout_id);
    let event = TimeoutEvent::parse_line(&line, &NodeRef::new("node-a")).unwrap();
    match correlator.apply_timeout(&event) {
        Applied::Resolved(trace) => {
            reporter.emit(&trace);
        }
        other => panic!("expected resolution, got {:?}", other),
    }

    let text = std::fs::read_to_string(&path).unwrap();
    let records: Vec<TraceRecord> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 2);

    assert_eq!(records[0].correlation_id, model_id);
    assert_eq!(records[0].outcome, Outcome::Model);
    assert_eq!(records[0].model.as_deref(), Some("yolo"));
    assert_eq!(records[0].nodes, vec!["node-a", "node-b"]);

    assert_eq!(records[1].correlation_id, timeout_id);
    assert_eq!(records[1].outcome, Outcome::Timeout);
    assert_eq!(records[1].nodes, vec!["node-b", "node-a"]);
    assert!(records[1].model.is_none());
}

#[tokio::test]
async fn test_jsonl_record_shape() {
    let correlator = correlator().await;
    let id = CorrelationId::new_v4();
    let trace = match correlator.apply_hop(&hop(id, 0, "node-a", "localhost")) {
        Applied::Resolved(trace) => trace,
        other => panic!("expected resolution, got {:?}", other),
    };
    let record = TraceRecord::from_trace(&trace).unwrap();
    let value = serde_json::to_value(&record).unwrap();

    assert_eq!(value["correlation_id"], id.to_string());
    assert_eq!(value["outcome"], "local");
    assert_eq!(value["nodes"], serde_json::json!(["node-a"]));
    assert!(value.get("model").is_none());
    assert!(value["resolved_at"].is_string());
}

#[test]
fn test_jsonl_sink_reports_unwritable_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("traces.jsonl");
    assert!(matches!(JsonLinesSink::open(&path), Err(SinkError::Open { .. })));
}

#[tokio::test]
async fn test_building_trace_is_not_emitted() {
    let correlator = correlator().await;
    let reporter = TraceReporter::new(correlator.clone());
    let id = CorrelationId::new_v4();
    correlator.apply_hop(&hop(id, 0, "node-a", "uid-b"));

    let trace = correlator.get(&id).unwrap();
    assert!(reporter.emit(&trace).is_none());
    assert_eq!(reporter.emitted(), 0);
    assert_eq!(reporter.building().len(), 1);
}

#[test]
fn test_sink_names() {
    struct Null;
    impl TraceSink for Null {
        fn name(&self) -> &'static str {
            "null"
        }
        fn emit(&self, _record: &TraceRecord) -> Result<(), SinkError> {
            Ok(())
        }
    }

    let correlator = tokio_test::block_on(correlator());
    let reporter = TraceReporter::new(correlator).with_sink(Null);
    assert_eq!(reporter.sink_names(), vec!["null"]);
}
