// Copyright 2025-2026 hoptrace Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommands.
//!
//! ## Usage
//!
//! ```bash
//! hoptrace watch               # Trace requests until Ctrl+C
//! hoptrace watch --once        # One pass, then exit
//! hoptrace submit --addr entry:8000 --payload input.bin
//! hoptrace config show         # Effective configuration
//! ```

pub mod config_cmd;
pub mod submit_cmd;
pub mod watch_cmd;

pub use submit_cmd::{run_submit, SubmitArgs};
pub use watch_cmd::{run_watch, WatchArgs};

/// Exit code for success.
pub const EXIT_OK: i32 = 0;
/// Exit code for a runtime failure.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for a configuration error.
pub const EXIT_CONFIG: i32 = 2;

/// Value following `flag` at `args[i]`, or an error naming the flag.
pub(crate) fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value for {}", flag))
}

/// Parse a numeric flag value, naming the flag on failure.
pub(crate) fn parse_flag<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flag_value_reports_missing() {
        let a = args(&["hoptrace", "submit", "--addr"]);
        assert_eq!(flag_value(&a, 2, "--addr").unwrap_err(), "Missing value for --addr");
    }

    #[test]
    fn parse_flag_names_the_flag() {
        let err = parse_flag::<u32>("high", "--priority").unwrap_err();
        assert!(err.contains("--priority"));
        assert_eq!(parse_flag::<u32>("7", "--priority").unwrap(), 7);
    }
}
