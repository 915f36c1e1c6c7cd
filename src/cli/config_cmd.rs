// Copyright 2025-2026 hoptrace Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These read configuration directly and never contact the cluster.

use crate::config::{self, EffectiveConfig, TracerConfig};

use super::{EXIT_CONFIG, EXIT_FAILURE, EXIT_OK};

/// Print effective config as key-value pairs to stdout.
pub fn run_show(json: bool) -> i32 {
    match config::load() {
        Ok(cfg) => {
            print_config(&cfg.effective_config(), json);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            EXIT_CONFIG
        }
    }
}

/// Print default config values (no env or file overrides) to stdout.
pub fn run_defaults() -> i32 {
    print_config(&TracerConfig::default().effective_config(), false);
    EXIT_OK
}

/// Validate configuration for misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if the
/// configuration cannot be loaded at all.
pub fn run_validate() -> i32 {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_CONFIG;
        }
    };
    let warnings = validate(&cfg);
    for w in &warnings {
        eprintln!("WARNING: {}", w);
    }

    if warnings.is_empty() {
        println!("Configuration is valid.");
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}

/// Problems that load cleanly but would make tracing misbehave.
pub fn validate(cfg: &TracerConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Err(e) = cfg.line_filter() {
        warnings.push(e.to_string());
    }

    if cfg.poll_timeout > cfg.scrape.poll_interval * 10 {
        warnings.push(format!(
            "HOPTRACE_POLL_TIMEOUT_MS ({}) is more than ten poll intervals ({}); a dead pod stalls its slot for that long",
            cfg.poll_timeout.as_millis(),
            cfg.scrape.poll_interval.as_millis()
        ));
    }

    // Retention must cover a pod that misses one pass.
    let grace = cfg.scrape.poll_interval * 2 + cfg.poll_timeout;
    if cfg.correlator.terminal_retention < grace {
        warnings.push(format!(
            "HOPTRACE_TERMINAL_RETENTION_SECS ({}) is shorter than one missed poll ({}ms)",
            cfg.correlator.terminal_retention.as_secs(),
            grace.as_millis()
        ));
    }

    if cfg.hop_pattern == cfg.timeout_pattern {
        warnings.push("HOPTRACE_HOP_PATTERN and HOPTRACE_TIMEOUT_PATTERN are identical".to_string());
    }

    warnings
}

fn print_config(cfg: &EffectiveConfig, json: bool) {
    if json {
        match serde_json::to_string_pretty(cfg) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize configuration: {}", e),
        }
        return;
    }
    println!("HOPTRACE_NAMESPACE={}", cfg.namespace);
    println!("HOPTRACE_CONTAINER={}", cfg.container);
    println!("HOPTRACE_KUBECTL={}", cfg.kubectl);
    println!("HOPTRACE_POLL_INTERVAL_MS={}", cfg.poll_interval_ms);
    println!("HOPTRACE_POLL_TIMEOUT_MS={}", cfg.poll_timeout_ms);
    println!("HOPTRACE_REFRESH_INTERVAL_SECS={}", cfg.refresh_interval_secs);
    println!("HOPTRACE_TAIL_WINDOW={}", cfg.tail_window);
    println!("HOPTRACE_HOP_PATTERN={}", cfg.hop_pattern);
    println!("HOPTRACE_TIMEOUT_PATTERN={}", cfg.timeout_pattern);
    println!("HOPTRACE_TERMINAL_RETENTION_SECS={}", cfg.terminal_retention_secs);
    println!("HOPTRACE_SHUTDOWN_TIMEOUT={}", cfg.shutdown_timeout_secs);
    match &cfg.output {
        Some(path) => println!("HOPTRACE_OUTPUT={}", path.display()),
        None => println!("HOPTRACE_OUTPUT="),
    }
    println!("HOPTRACE_MAX_PAYLOAD={}", cfg.max_payload);
    println!("HOPTRACE_MAX_HINT_LEN={}", cfg.max_hint_len);
}
