//! End-to-end tests: in-memory logs through the scrape loop to a sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hoptrace::correlator::{CorrelatorConfig, Outcome};
use hoptrace::identity::{MembershipRow, StaticMembership};
use hoptrace::ids::CorrelationId;
use hoptrace::logsource::{LineFilter, MemoryLogSource};
use hoptrace::reporter::{ChannelSink, TraceRecord, TraceSink};
use hoptrace::scrape::ScrapeConfig;
use hoptrace::shutdown::ShutdownResult;
use hoptrace::Tracer;
use tokio::sync::mpsc::UnboundedReceiver;

struct Mesh {
    tracer: Arc<Tracer>,
    logs: Arc<MemoryLogSource>,
    membership: Arc<StaticMembership>,
    records: UnboundedReceiver<TraceRecord>,
}

fn mesh() -> Mesh {
    let membership = Arc::new(StaticMembership::new(vec![
        MembershipRow::running("proxy-a", "node-a", "uid-a"),
        MembershipRow::running("proxy-b", "node-b", "uid-b"),
        MembershipRow::running("proxy-c", "node-c", "uid-c"),
    ]));
    let filter = LineFilter::new("PROXY_DEBUG", "Timeout expired", 10).unwrap();
    let logs = Arc::new(MemoryLogSource::new(filter));
    let (sink, records) = ChannelSink::new();
    let sinks: Vec<Box<dyn TraceSink>> = vec![Box::new(sink)];

    let tracer = Tracer::new(
        membership.clone(),
        logs.clone(),
        sinks,
        CorrelatorConfig::default(),
        ScrapeConfig {
            poll_interval: Duration::from_millis(20),
            refresh_interval: Duration::from_secs(60),
        },
    );
    Mesh {
        tracer: Arc::new(tracer),
        logs,
        membership,
        records,
    }
}

fn hop_line(id: CorrelationId, jump: u32, target: &str) -> String {
    format!("2024-05-01T10:00:00Z DEBUG PROXY_DEBUG forwarding {} {} {}", id, jump, target)
}

fn timeout_line(id: CorrelationId) -> String {
    format!("2024-05-01T10:00:05Z WARN Timeout expired for request {}", id)
}

fn drain(records: &mut UnboundedReceiver<TraceRecord>) -> Vec<TraceRecord> {
    let mut out = Vec::new();
    while let Ok(record) = records.try_recv() {
        out.push(record);
    }
    out
}

#[tokio::test]
async fn test_route_resolves_once_across_repeated_passes() {
    let mut m = mesh();
    let id = CorrelationId::new_v4();
    m.logs.push("proxy-a", hop_line(id, 0, "uid-b"));
    m.logs.push("proxy-b", hop_line(id, 1, "model:resnet50"));

    // Pods are polled in parallel, so jump 1 may be seen before jump 0 in
    // the first pass. The tail re-delivers it on the next one.
    for _ in 0..3 {
        m.tracer.run_once().await.unwrap();
    }

    let records = drain(&mut m.records);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].correlation_id, id);
    assert_eq!(records[0].nodes, vec!["node-a", "node-b"]);
    assert_eq!(records[0].outcome, Outcome::Model);
    assert_eq!(records[0].model.as_deref(), Some("resnet50"));
}

#[tokio::test]
async fn test_timeout_closes_route_with_accumulated_hops() {
    let mut m = mesh();
    let id = CorrelationId::new_v4();
    m.logs.push("proxy-a", hop_line(id, 0, "uid-c"));
    m.logs.push("proxy-c", timeout_line(id));

    for _ in 0..2 {
        m.tracer.run_once().await.unwrap();
    }

    let records = drain(&mut m.records);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Timeout);
    assert_eq!(records[0].nodes, vec!["node-a", "node-c"]);
}

#[tokio::test]
async fn test_unreachable_pod_does_not_stop_the_pass() {
    let mut m = mesh();
    let id = CorrelationId::new_v4();
    m.logs.push("proxy-a", hop_line(id, 0, "localhost"));
    m.logs.set_unreachable("proxy-b", true);

    let summary = m.tracer.run_once().await.unwrap();
    assert_eq!(summary.pods, 3);
    assert_eq!(summary.unreachable, 1);
    assert_eq!(summary.resolved, 1);
    assert_eq!(m.tracer.unreachable_pods(), vec!["proxy-b".to_string()]);

    m.logs.set_unreachable("proxy-b", false);
    let summary = m.tracer.run_once().await.unwrap();
    assert_eq!(summary.unreachable, 0);
    assert!(m.tracer.unreachable_pods().is_empty());

    let records = drain(&mut m.records);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Local);
    assert_eq!(records[0].nodes, vec!["node-a"]);
}

#[tokio::test]
async fn test_malformed_lines_are_counted_and_skipped() {
    let mut m = mesh();
    let id = CorrelationId::new_v4();
    m.logs.push("proxy-a", "PROXY_DEBUG startup banner");
    m.logs.push("proxy-a", hop_line(id, 0, "localhost"));

    let summary = m.tracer.run_once().await.unwrap();
    assert_eq!(summary.malformed, 1);
    assert_eq!(drain(&mut m.records).len(), 1);
}

#[tokio::test]
async fn test_pending_pods_are_not_polled() {
    let m = mesh();
    m.membership.set_rows(vec![
        MembershipRow::running("proxy-a", "node-a", "uid-a"),
        MembershipRow {
            phase: hoptrace::identity::PodPhase::Pending,
            ..MembershipRow::running("proxy-b", "node-b", "uid-b")
        },
    ]);

    let summary = m.tracer.run_once().await.unwrap();
    assert_eq!(summary.pods, 1);
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_snapshot() {
    let mut m = mesh();
    m.tracer.run_once().await.unwrap();
    m.membership.set_unavailable();

    assert!(m.tracer.run_once().await.is_err());

    // The loop keeps working on the last good snapshot.
    let id = CorrelationId::new_v4();
    m.logs.push("proxy-a", hop_line(id, 0, "uid-b"));
    m.logs.push("proxy-b", hop_line(id, 1, "localhost"));
    let loop_handle = {
        let tracer = m.tracer.clone();
        tokio::spawn(async move { tracer.run().await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(m.tracer.shutdown(Duration::from_secs(2)).await, ShutdownResult::Complete);
    assert!(loop_handle.await.unwrap() >= 1);

    let records = drain(&mut m.records);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].nodes, vec!["node-a", "node-b"]);
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_polls() {
    let mut m = mesh();
    let id = CorrelationId::new_v4();
    m.logs.push("proxy-a", hop_line(id, 0, "localhost"));
    m.logs.set_delay(Duration::from_millis(150));

    let loop_handle = {
        let tracer = m.tracer.clone();
        tokio::spawn(async move { tracer.run().await })
    };

    // First pass is now inside its slow polls.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(m.tracer.shutdown.in_flight_count() > 0);

    let result = m.tracer.shutdown(Duration::from_secs(2)).await;
    assert_eq!(result, ShutdownResult::Complete);
    assert_eq!(loop_handle.await.unwrap(), 1);

    // Lines returned by the drained polls were still correlated.
    let records = drain(&mut m.records);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].correlation_id, id);
}

#[tokio::test]
async fn test_stalled_query_sees_building_traces() {
    let m = mesh();
    let id = CorrelationId::new_v4();
    m.logs.push("proxy-a", hop_line(id, 0, "uid-b"));
    m.tracer.run_once().await.unwrap();

    assert_eq!(m.tracer.reporter.building().len(), 1);
    assert!(m.tracer.reporter.stalled(Duration::from_secs(3600)).is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let stalled = m.tracer.reporter.stalled(Duration::from_millis(5));
    assert_eq!(stalled.len(), 1);
    assert_eq!(stalled[0].trace.correlation_id, id);
}

#[tokio::test]
async fn test_idle_tail_is_not_reported_again_after_retention() {
    let mut m = mesh();
    let id = CorrelationId::new_v4();
    m.logs.push("proxy-a", hop_line(id, 0, "localhost"));
    m.tracer.run_once().await.unwrap();

    // No new traffic: the same line stays in the tail well past retention.
    let retention = CorrelatorConfig::default().terminal_retention;
    for _ in 0..3 {
        m.tracer
            .correlator
            .evict_terminal(Instant::now() + retention + Duration::from_secs(1));
        m.tracer.run_once().await.unwrap();
    }

    let records = drain(&mut m.records);
    assert_eq!(records.len(), 1, "request reported more than once");
    assert_eq!(m.tracer.correlator.stats().evicted, 0);
}

#[tokio::test]
async fn test_departed_pod_leaves_unreachable_set() {
    let m = mesh();
    m.logs.set_unreachable("proxy-b", true);
    m.tracer.run_once().await.unwrap();
    assert_eq!(m.tracer.unreachable_pods(), vec!["proxy-b".to_string()]);

    m.membership.set_rows(vec![
        MembershipRow::running("proxy-a", "node-a", "uid-a"),
        MembershipRow::running("proxy-c", "node-c", "uid-c"),
    ]);
    let summary = m.tracer.run_once().await.unwrap();
    assert_eq!(summary.pods, 2);
    assert!(m.tracer.unreachable_pods().is_empty());
}

#[tokio::test]
async fn test_no_polls_after_shutdown() {
    let m = mesh();
    m.tracer.run_once().await.unwrap();
    let polls = m.logs.poll_count();
    assert_eq!(polls, 6);

    assert_eq!(m.tracer.shutdown(Duration::from_secs(1)).await, ShutdownResult::Complete);
    let summary = m.tracer.run_once().await.unwrap();
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.pods, 0);
    assert_eq!(m.logs.poll_count(), polls);
}
