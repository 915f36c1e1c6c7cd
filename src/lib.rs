//! hoptrace
//!
//! Reconstructs the path each inference request took through an edge proxy
//! mesh, using nothing but the proxies' own log lines.
//!
//! # Pieces
//!
//! - **Framing**: the entry-node wire format that carries a 16-byte
//!   correlation id plus routing hints ([`wire`]).
//! - **Identity**: ephemeral container id to stable node name, from a
//!   membership listing refreshed in the background ([`identity`]).
//! - **Log sources**: bounded tails of hop and timeout lines per pod
//!   ([`logsource`]).
//! - **Correlation**: unordered, repeated lines folded into one ordered route
//!   per request, resolved once ([`correlator`]).
//! - **Reporting**: resolved routes fanned out to sinks ([`reporter`]).
//!
//! # Boundaries
//!
//! - Read-only: the mesh is observed, never steered.
//! - Stdout carries route lines; diagnostics go to stderr.
//! - No single bad line, pod or refresh stops the loop.

pub mod cli;
pub mod config;
pub mod correlator;
pub mod error;
pub mod identity;
pub mod ids;
pub mod logsource;
pub mod reporter;
pub mod scrape;
pub mod shutdown;
pub mod telemetry;
pub mod wire;

use std::sync::Arc;
use std::time::Duration;

use config::TracerConfig;
use correlator::{CorrelatorConfig, HopCorrelator};
use identity::{IdentityResolver, KubectlMembership, MembershipSource};
use logsource::{KubectlLogSource, LogSource};
use reporter::{JsonLinesSink, StdoutSink, TraceReporter, TraceSink};
use scrape::{PassSummary, ScrapeConfig, ScrapeLoop};
use shutdown::{ShutdownCoordinator, ShutdownResult};

pub use error::TraceError;

/// A wired-up tracer: resolver, correlator, reporter and scrape loop
/// sharing one shutdown coordinator.
pub struct Tracer {
    pub resolver: Arc<IdentityResolver>,
    pub correlator: Arc<HopCorrelator>,
    pub reporter: Arc<TraceReporter>,
    pub shutdown: Arc<ShutdownCoordinator>,
    scrape: Arc<ScrapeLoop>,
}

impl Tracer {
    /// Wire the pipeline over the given backends.
    pub fn new(
        membership: Arc<dyn MembershipSource>,
        source: Arc<dyn LogSource>,
        sinks: Vec<Box<dyn TraceSink>>,
        correlator_config: CorrelatorConfig,
        scrape_config: ScrapeConfig,
    ) -> Self {
        let resolver = Arc::new(IdentityResolver::new(membership));
        let correlator = Arc::new(HopCorrelator::new(resolver.clone(), correlator_config));

        let mut reporter = TraceReporter::new(correlator.clone());
        for sink in sinks {
            reporter.add_sink(sink);
        }
        let reporter = Arc::new(reporter);
        let shutdown = Arc::new(ShutdownCoordinator::new());

        let scrape = Arc::new(ScrapeLoop::new(
            resolver.clone(),
            source,
            correlator.clone(),
            reporter.clone(),
            shutdown.clone(),
            scrape_config,
        ));

        Self {
            resolver,
            correlator,
            reporter,
            shutdown,
            scrape,
        }
    }

    /// Kubernetes-backed tracer printing to stdout, plus a JSON-lines file
    /// when `config.output` is set.
    pub fn from_config(config: &TracerConfig) -> Result<Self, TraceError> {
        let filter = config.line_filter()?;
        let membership = Arc::new(KubectlMembership::new(
            config.kubectl.clone(),
            config.namespace.clone(),
            config.poll_timeout,
        ));
        let source = Arc::new(KubectlLogSource::new(
            config.kubectl.clone(),
            config.namespace.clone(),
            config.container.clone(),
            filter,
            config.poll_timeout,
        ));

        let mut sinks: Vec<Box<dyn TraceSink>> = vec![Box::new(StdoutSink)];
        if let Some(path) = &config.output {
            sinks.push(Box::new(JsonLinesSink::open(path)?));
        }

        Ok(Self::new(
            membership,
            source,
            sinks,
            config.correlator.clone(),
            config.scrape.clone(),
        ))
    }

    /// Run passes until [`shutdown`](Self::shutdown) is called. Returns the
    /// number of completed passes.
    pub async fn run(&self) -> u64 {
        self.scrape.clone().run().await
    }

    /// Refresh membership once, then run a single pass.
    pub async fn run_once(&self) -> Result<PassSummary, TraceError> {
        self.resolver.refresh().await?;
        self.scrape.forget_departed();
        Ok(self.scrape.clone().run_pass().await)
    }

    /// Stop issuing polls and wait for in-flight ones to drain.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownResult {
        self.shutdown.initiate(timeout).await
    }

    pub fn unreachable_pods(&self) -> Vec<String> {
        self.scrape.unreachable_pods()
    }
}
