//! The poll-and-correlate loop.
//!
//! Each pass polls every known pod in its own task, so one slow pod does
//! not hold up the others. Lines come back as bounded tails and are fed to
//! the shared correlator, which discards the re-deliveries. Membership is
//! refreshed on its own interval between passes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::Instrument;

use crate::correlator::{Applied, HopCorrelator, HopEvent, LogEvent, TimeoutEvent};
use crate::identity::{IdentityResolver, PodHandle};
use crate::logsource::{LogSource, LogView, PollError};
use crate::reporter::TraceReporter;
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry::{self, ScrapeSpan, SpanExt};

/// Timing for the scrape loop.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Delay between the end of one pass and the start of the next.
    pub poll_interval: Duration,
    /// How often the membership snapshot is re-fetched.
    pub refresh_interval: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            refresh_interval: Duration::from_secs(30),
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub pods: usize,
    pub unreachable: usize,
    pub lines: usize,
    pub malformed: usize,
    pub resolved: usize,
    /// Pods skipped because shutdown had already started.
    pub skipped: usize,
}

impl PassSummary {
    fn absorb(&mut self, pod: PodSummary) {
        self.pods += 1;
        self.lines += pod.lines;
        self.malformed += pod.malformed;
        self.resolved += pod.resolved;
        if !pod.reachable {
            self.unreachable += 1;
        }
    }
}

#[derive(Debug, Default)]
struct PodSummary {
    reachable: bool,
    lines: usize,
    malformed: usize,
    resolved: usize,
}

/// Drives passes until shutdown.
pub struct ScrapeLoop {
    resolver: Arc<IdentityResolver>,
    source: Arc<dyn LogSource>,
    correlator: Arc<HopCorrelator>,
    reporter: Arc<TraceReporter>,
    shutdown: Arc<ShutdownCoordinator>,
    config: ScrapeConfig,
    /// Pods that failed their last poll.
    unreachable: Mutex<HashSet<String>>,
}

impl ScrapeLoop {
    pub fn new(
        resolver: Arc<IdentityResolver>,
        source: Arc<dyn LogSource>,
        correlator: Arc<HopCorrelator>,
        reporter: Arc<TraceReporter>,
        shutdown: Arc<ShutdownCoordinator>,
        config: ScrapeConfig,
    ) -> Self {
        Self {
            resolver,
            source,
            correlator,
            reporter,
            shutdown,
            config,
            unreachable: Mutex::new(HashSet::new()),
        }
    }

    /// Run passes until the shutdown token is cancelled.
    ///
    /// Returns the number of completed passes. A failed membership refresh
    /// keeps the previous snapshot and never ends the loop.
    pub async fn run(self: Arc<Self>) -> u64 {
        let token = self.shutdown.token();
        let mut passes = 0u64;
        let mut last_refresh: Option<Instant> = None;

        tracing::info!(
            backend = self.source.name(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "scrape loop started"
        );

        while !token.is_cancelled() {
            let due = last_refresh.map_or(true, |at| at.elapsed() >= self.config.refresh_interval);
            if due {
                self.refresh().await;
                last_refresh = Some(Instant::now());
            }

            let summary = self.clone().run_pass().await;
            passes += 1;
            tracing::debug!(
                pass = passes,
                pods = summary.pods,
                unreachable = summary.unreachable,
                lines = summary.lines,
                resolved = summary.resolved,
                "pass complete"
            );

            self.correlator.evict_terminal(Instant::now());
            telemetry::record_traces_building(self.correlator.building_count());

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!(passes, "scrape loop stopped");
        passes
    }

    async fn refresh(&self) {
        match self.resolver.refresh().await {
            Ok(pods) if pods == 0 => tracing::warn!("membership listing has no running pods"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "membership refresh failed; keeping previous snapshot"),
        }
        self.forget_departed();
    }

    /// Drop reachability state for pods no longer in the snapshot.
    pub fn forget_departed(&self) {
        let current: HashSet<String> = self
            .resolver
            .pods()
            .into_iter()
            .map(|pod| pod.pod_name)
            .collect();
        self.unreachable.lock().retain(|pod| current.contains(pod));
    }

    /// Poll every pod in the current snapshot once, in parallel.
    pub async fn run_pass(self: Arc<Self>) -> PassSummary {
        self.correlator.begin_pass();
        let pods = self.resolver.pods();
        let mut summary = PassSummary::default();
        let mut tasks = Vec::with_capacity(pods.len());

        for pod in pods {
            let Some(guard) = self.shutdown.track() else {
                summary.skipped += 1;
                continue;
            };
            let this = Arc::clone(&self);
            let span = ScrapeSpan::new(&pod.pod_name, pod.node.as_str());
            tasks.push(tokio::spawn(
                async move {
                    let result = this.scrape_pod(&pod).await;
                    drop(guard);
                    result
                }
                .instrument(span),
            ));
        }

        for joined in futures::future::join_all(tasks).await {
            match joined {
                Ok(pod) => summary.absorb(pod),
                Err(e) => tracing::error!(error = %e, "scrape task panicked"),
            }
        }
        summary
    }

    async fn scrape_pod(&self, pod: &PodHandle) -> PodSummary {
        let started = Instant::now();
        let (hops, timeouts) = tokio::join!(
            self.source.poll(pod, LogView::Hops),
            self.source.poll(pod, LogView::Timeouts),
        );
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let span = tracing::Span::current();
        span.record("latency_ms", latency_ms);

        // Either view failing marks the pod unreachable for this pass, but
        // lines from the view that did answer are still used.
        let failure: Option<&PollError> = hops.as_ref().err().or(timeouts.as_ref().err());
        let reachable = failure.is_none();
        telemetry::record_poll(pod.node.as_str(), latency_ms, reachable);
        let status: Result<(), &PollError> = failure.map_or(Ok(()), Err);
        span.record_result(&status);
        self.note_reachability(pod, failure);

        let mut summary = PodSummary {
            reachable,
            ..PodSummary::default()
        };

        // Hops first so a request whose timeout and last hop land in the
        // same pass keeps that hop.
        if let Ok(lines) = hops {
            summary.lines += lines.len();
            for line in &lines {
                match HopEvent::parse_line(line, &pod.node) {
                    Ok(event) => self.apply(LogEvent::Hop(event), &mut summary),
                    Err(e) => self.malformed(LogView::Hops, &e, &mut summary),
                }
            }
        }
        if let Ok(lines) = timeouts {
            summary.lines += lines.len();
            for line in &lines {
                match TimeoutEvent::parse_line(line, &pod.node) {
                    Ok(event) => self.apply(LogEvent::Timeout(event), &mut summary),
                    Err(e) => self.malformed(LogView::Timeouts, &e, &mut summary),
                }
            }
        }

        span.record("lines", summary.lines);
        span.record("resolved", summary.resolved);
        summary
    }

    fn apply(&self, event: LogEvent, summary: &mut PodSummary) {
        if let Applied::Resolved(trace) = self.correlator.apply(&event) {
            self.reporter.emit(&trace);
            summary.resolved += 1;
        }
    }

    fn malformed(&self, view: LogView, error: &impl std::fmt::Display, summary: &mut PodSummary) {
        summary.malformed += 1;
        telemetry::record_malformed_line(view.as_str());
        tracing::debug!(view = view.as_str(), error = %error, "dropping malformed line");
    }

    /// Log only on transitions so a dead pod does not flood the log.
    fn note_reachability(&self, pod: &PodHandle, failure: Option<&PollError>) {
        let mut unreachable = self.unreachable.lock();
        match failure {
            Some(e) => {
                if unreachable.insert(pod.pod_name.clone()) {
                    tracing::warn!(pod = %pod.pod_name, node = %pod.node, error = %e, "log source unreachable");
                }
            }
            None => {
                if unreachable.remove(&pod.pod_name) {
                    tracing::info!(pod = %pod.pod_name, node = %pod.node, "log source reachable again");
                }
            }
        }
    }

    /// Pods whose most recent poll failed.
    pub fn unreachable_pods(&self) -> Vec<String> {
        let mut pods: Vec<String> = self.unreachable.lock().iter().cloned().collect();
        pods.sort();
        pods
    }
}
