// Copyright 2025-2026 hoptrace Contributors
// SPDX-License-Identifier: Apache-2.0

//! `hoptrace watch`: scrape proxy logs and print each resolved route.

use std::time::Duration;

use crate::config;
use crate::shutdown::ShutdownResult;
use crate::telemetry::{self, LogConfig};
use crate::Tracer;

use super::{flag_value, parse_flag, EXIT_CONFIG, EXIT_FAILURE, EXIT_OK};

/// Parsed `watch` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchArgs {
    /// Run a single pass and exit.
    pub once: bool,
    /// On exit, list traces still building after this long.
    pub stalled_after: Option<Duration>,
}

impl WatchArgs {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut parsed = Self::default();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--once" => {
                    parsed.once = true;
                    i += 1;
                }
                "--stalled" => {
                    let secs: u64 = parse_flag(flag_value(args, i, flag)?, flag)?;
                    parsed.stalled_after = Some(Duration::from_secs(secs));
                    i += 2;
                }
                other => return Err(format!("Unknown argument: {}", other)),
            }
        }
        Ok(parsed)
    }
}

/// Run the watch command. `args` starts after the subcommand name.
pub async fn run_watch(args: &[String]) -> i32 {
    let parsed = match WatchArgs::parse(args) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("{}", msg);
            return EXIT_FAILURE;
        }
    };

    if let Err(e) = telemetry::init_logging(&LogConfig::from_env()) {
        eprintln!("Logging setup failed: {}", e);
        return EXIT_CONFIG;
    }
    telemetry::describe_metrics();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_CONFIG;
        }
    };

    let tracer = match Tracer::from_config(&cfg) {
        Ok(tracer) => tracer,
        Err(e) => {
            eprintln!("Startup failed: {}", e);
            return e.exit_code() as i32;
        }
    };

    if parsed.once {
        return match tracer.run_once().await {
            Ok(summary) => {
                tracing::info!(
                    pods = summary.pods,
                    unreachable = summary.unreachable,
                    lines = summary.lines,
                    resolved = summary.resolved,
                    "single pass complete"
                );
                report_stalled(&tracer, parsed.stalled_after);
                EXIT_OK
            }
            Err(e) => {
                eprintln!("Pass failed: {}", e);
                EXIT_FAILURE
            }
        };
    }

    let code = tokio::select! {
        passes = tracer.run() => {
            tracing::warn!(passes, "scrape loop ended without a shutdown signal");
            EXIT_FAILURE
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "cannot listen for Ctrl+C");
            }
            eprintln!("Shutdown signal received, draining...");
            EXIT_OK
        }
    };

    let code = match tracer.shutdown(cfg.shutdown_timeout).await {
        ShutdownResult::Complete => code,
        ShutdownResult::Timeout { remaining } => {
            eprintln!("Shutdown timeout, {} polls still running", remaining);
            EXIT_FAILURE
        }
    };

    report_stalled(&tracer, parsed.stalled_after);
    let stats = tracer.correlator.stats();
    tracing::info!(
        hops_accepted = stats.hops_accepted,
        resolved_model = stats.resolved_model,
        resolved_local = stats.resolved_local,
        timed_out = stats.timed_out,
        emitted = tracer.reporter.emitted(),
        "tracer stopped"
    );
    code
}

fn report_stalled(tracer: &Tracer, age: Option<Duration>) {
    let Some(age) = age else { return };
    for view in tracer.reporter.stalled(age) {
        eprintln!(
            "{} still building after {}s: {}",
            view.trace.correlation_id.short(),
            view.age.as_secs(),
            view.trace.route()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_to_continuous() {
        assert_eq!(WatchArgs::parse(&[]).unwrap(), WatchArgs::default());
    }

    #[test]
    fn parses_once_and_stalled() {
        let parsed = WatchArgs::parse(&args(&["--once", "--stalled", "120"])).unwrap();
        assert!(parsed.once);
        assert_eq!(parsed.stalled_after, Some(Duration::from_secs(120)));
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(WatchArgs::parse(&args(&["--follow"])).is_err());
    }
}
