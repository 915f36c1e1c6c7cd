// Copyright 2025-2026 hoptrace Contributors
// SPDX-License-Identifier: Apache-2.0

//! `hoptrace submit`: frame one request and send it to a mesh entry node.

use std::path::PathBuf;
use std::time::Duration;

use crate::config;
use crate::ids::CorrelationId;
use crate::wire::{self, RequestFrame};

use super::{flag_value, parse_flag, EXIT_CONFIG, EXIT_FAILURE, EXIT_OK};

/// Parsed `submit` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitArgs {
    pub addr: String,
    pub payload: PathBuf,
    pub priority: u32,
    pub accuracy: u32,
    pub precision: Option<String>,
    pub timeout: Duration,
}

impl SubmitArgs {
    /// Parse everything after `hoptrace submit`.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut addr = None;
        let mut payload = None;
        let mut priority = 0u32;
        let mut accuracy = 0u32;
        let mut precision = None;
        let mut timeout_secs = 30u64;

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--addr" => addr = Some(flag_value(args, i, flag)?.to_string()),
                "--payload" => payload = Some(PathBuf::from(flag_value(args, i, flag)?)),
                "--priority" => priority = parse_flag(flag_value(args, i, flag)?, flag)?,
                "--accuracy" => accuracy = parse_flag(flag_value(args, i, flag)?, flag)?,
                "--precision" => precision = Some(flag_value(args, i, flag)?.to_string()),
                "--timeout" => timeout_secs = parse_flag(flag_value(args, i, flag)?, flag)?,
                other => return Err(format!("Unknown argument: {}", other)),
            }
            i += 2;
        }

        let usage = "Usage: hoptrace submit --addr HOST:PORT --payload FILE [--priority N] [--accuracy N] [--precision HINT] [--timeout SECS]";
        Ok(Self {
            addr: addr.ok_or(usage)?,
            payload: payload.ok_or(usage)?,
            priority,
            accuracy,
            precision,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        })
    }

    /// Build the frame for `payload` bytes under a fresh correlation id.
    pub fn frame(&self, payload: Vec<u8>) -> RequestFrame {
        let frame = RequestFrame::new(CorrelationId::new_v4(), payload)
            .with_priority(self.priority)
            .with_accuracy_target(self.accuracy);
        match &self.precision {
            Some(hint) => frame.with_precision_hint(hint.clone()),
            None => frame,
        }
    }
}

/// Run the submit command. `args` starts after the subcommand name.
pub async fn run_submit(args: &[String]) -> i32 {
    let parsed = match SubmitArgs::parse(args) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("{}", msg);
            return EXIT_FAILURE;
        }
    };

    let limits = match config::load() {
        Ok(cfg) => cfg.frame_limits,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_CONFIG;
        }
    };

    let payload = match tokio::fs::read(&parsed.payload).await {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Cannot read {}: {}", parsed.payload.display(), e);
            return EXIT_FAILURE;
        }
    };

    let frame = parsed.frame(payload);
    // Same bounds the entry node enforces.
    if let Err(e) = frame.check_limits(&limits) {
        eprintln!("Request not sent: {}", e);
        return EXIT_FAILURE;
    }
    let id = frame.correlation_id;
    eprintln!("Request ID: {}", id);

    match wire::submit(&parsed.addr, &frame, parsed.timeout).await {
        Ok(response) => {
            println!("{}", response.body_text());
            eprintln!("Elapsed: {} ms", response.elapsed.as_millis());
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Request {} failed: {}", id, e);
            EXIT_FAILURE
        }
    }
}
