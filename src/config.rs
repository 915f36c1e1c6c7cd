//! Configuration loading from environment variables and an optional file.
//!
//! Values come from `HOPTRACE_*` environment variables with defaults. A TOML
//! file named by `HOPTRACE_CONFIG` may supply a base layer; an environment
//! variable always wins over the same key in the file. Invalid values fall
//! back to defaults without failing, and numeric values are floored.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `HOPTRACE_CONFIG` | unset | Optional TOML file |
//! | `HOPTRACE_NAMESPACE` | kube-triton | Namespace of the proxy pods |
//! | `HOPTRACE_CONTAINER` | triton-proxy | Proxy container whose log is read |
//! | `HOPTRACE_KUBECTL` | kubectl | kubectl binary |
//! | `HOPTRACE_POLL_INTERVAL_MS` | 1000 | Delay between passes |
//! | `HOPTRACE_POLL_TIMEOUT_MS` | 5000 | Bound on one poll |
//! | `HOPTRACE_REFRESH_INTERVAL_SECS` | 30 | Membership refresh interval |
//! | `HOPTRACE_TAIL_WINDOW` | 10 | Lines kept per view per poll |
//! | `HOPTRACE_HOP_PATTERN` | PROXY_DEBUG | Regex selecting hop lines |
//! | `HOPTRACE_TIMEOUT_PATTERN` | Timeout expired | Regex selecting timeout lines |
//! | `HOPTRACE_TERMINAL_RETENTION_SECS` | 600 | How long resolved traces are kept |
//! | `HOPTRACE_SHUTDOWN_TIMEOUT` | 10 | Drain timeout (secs) |
//! | `HOPTRACE_OUTPUT` | unset | JSON-lines file for resolved traces |
//! | `HOPTRACE_MAX_PAYLOAD` | 67108864 | Largest accepted frame payload |
//! | `HOPTRACE_MAX_HINT_LEN` | 256 | Longest accepted precision hint |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::correlator::CorrelatorConfig;
use crate::logsource::{LineFilter, PollError};
use crate::scrape::ScrapeConfig;
use crate::wire::FrameLimits;

pub const CONFIG_FILE_VAR: &str = "HOPTRACE_CONFIG";

/// Every variable this module reads, in documentation order.
pub const ENV_KEYS: &[&str] = &[
    "HOPTRACE_NAMESPACE",
    "HOPTRACE_CONTAINER",
    "HOPTRACE_KUBECTL",
    "HOPTRACE_POLL_INTERVAL_MS",
    "HOPTRACE_POLL_TIMEOUT_MS",
    "HOPTRACE_REFRESH_INTERVAL_SECS",
    "HOPTRACE_TAIL_WINDOW",
    "HOPTRACE_HOP_PATTERN",
    "HOPTRACE_TIMEOUT_PATTERN",
    "HOPTRACE_TERMINAL_RETENTION_SECS",
    "HOPTRACE_SHUTDOWN_TIMEOUT",
    "HOPTRACE_OUTPUT",
    "HOPTRACE_MAX_PAYLOAD",
    "HOPTRACE_MAX_HINT_LEN",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid line pattern: {0}")]
    Pattern(#[from] PollError),
}

/// Optional base layer read from TOML. Keys mirror the environment
/// variables without the prefix, lower-cased.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub namespace: Option<String>,
    pub container: Option<String>,
    pub kubectl: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub poll_timeout_ms: Option<u64>,
    pub refresh_interval_secs: Option<u64>,
    pub tail_window: Option<usize>,
    pub hop_pattern: Option<String>,
    pub timeout_pattern: Option<String>,
    pub terminal_retention_secs: Option<u64>,
    pub shutdown_timeout: Option<u64>,
    pub output: Option<PathBuf>,
    pub max_payload: Option<u64>,
    pub max_hint_len: Option<u32>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    pub namespace: String,
    pub container: String,
    pub kubectl: String,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub refresh_interval_secs: u64,
    pub tail_window: usize,
    pub hop_pattern: String,
    pub timeout_pattern: String,
    pub terminal_retention_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub output: Option<PathBuf>,
    pub max_payload: u64,
    pub max_hint_len: u32,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct TracerConfig {
    pub namespace: String,
    pub container: String,
    pub kubectl: String,
    pub scrape: ScrapeConfig,
    pub poll_timeout: Duration,
    pub tail_window: usize,
    pub hop_pattern: String,
    pub timeout_pattern: String,
    pub correlator: CorrelatorConfig,
    pub shutdown_timeout: Duration,
    pub output: Option<PathBuf>,
    pub frame_limits: FrameLimits,
}

impl Default for TracerConfig {
    fn default() -> Self {
        resolve(&FileConfig::default(), |_| None)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Environment value if it parses, else the file value, else `default`.
fn pick<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    file: Option<T>,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.parse::<T>().ok())
        .or(file)
        .unwrap_or(default)
}

fn pick_string(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    file: &Option<String>,
    default: &str,
) -> String {
    lookup(key)
        .or_else(|| file.clone())
        .unwrap_or_else(|| default.to_string())
}

fn resolve(file: &FileConfig, lookup: impl Fn(&str) -> Option<String>) -> TracerConfig {
    let poll_interval_ms = pick(&lookup, "HOPTRACE_POLL_INTERVAL_MS", file.poll_interval_ms, 1000);
    let poll_timeout_ms = pick(&lookup, "HOPTRACE_POLL_TIMEOUT_MS", file.poll_timeout_ms, 5000);
    let refresh_secs = pick(
        &lookup,
        "HOPTRACE_REFRESH_INTERVAL_SECS",
        file.refresh_interval_secs,
        30,
    );
    let tail_window = pick(&lookup, "HOPTRACE_TAIL_WINDOW", file.tail_window, 10);
    let retention_secs = pick(
        &lookup,
        "HOPTRACE_TERMINAL_RETENTION_SECS",
        file.terminal_retention_secs,
        600,
    );
    let shutdown_secs = pick(&lookup, "HOPTRACE_SHUTDOWN_TIMEOUT", file.shutdown_timeout, 10);
    let max_payload = pick(&lookup, "HOPTRACE_MAX_PAYLOAD", file.max_payload, 64 * 1024 * 1024);
    let max_hint_len = pick(&lookup, "HOPTRACE_MAX_HINT_LEN", file.max_hint_len, 256);

    let poll_interval_ms = poll_interval_ms.max(50);
    let poll_timeout_ms = poll_timeout_ms.max(100);
    let refresh_secs = refresh_secs.max(1);
    let tail_window = tail_window.max(1);
    let retention_secs = retention_secs.max(1);
    let shutdown_secs = shutdown_secs.max(1);
    let max_payload = max_payload.max(4096); // floor: 4 KiB
    let max_hint_len = max_hint_len.max(1);

    let output = lookup("HOPTRACE_OUTPUT")
        .map(PathBuf::from)
        .or_else(|| file.output.clone());

    TracerConfig {
        namespace: pick_string(&lookup, "HOPTRACE_NAMESPACE", &file.namespace, "kube-triton"),
        container: pick_string(&lookup, "HOPTRACE_CONTAINER", &file.container, "triton-proxy"),
        kubectl: pick_string(&lookup, "HOPTRACE_KUBECTL", &file.kubectl, "kubectl"),
        scrape: ScrapeConfig {
            poll_interval: Duration::from_millis(poll_interval_ms),
            refresh_interval: Duration::from_secs(refresh_secs),
        },
        poll_timeout: Duration::from_millis(poll_timeout_ms),
        tail_window,
        hop_pattern: pick_string(&lookup, "HOPTRACE_HOP_PATTERN", &file.hop_pattern, "PROXY_DEBUG"),
        timeout_pattern: pick_string(
            &lookup,
            "HOPTRACE_TIMEOUT_PATTERN",
            &file.timeout_pattern,
            "Timeout expired",
        ),
        correlator: CorrelatorConfig {
            terminal_retention: Duration::from_secs(retention_secs),
        },
        shutdown_timeout: Duration::from_secs(shutdown_secs),
        output,
        frame_limits: FrameLimits {
            max_hint_len,
            max_payload,
        },
    }
}

/// Load configuration from the environment, reading `HOPTRACE_CONFIG`
/// first when it is set.
pub fn load() -> Result<TracerConfig, ConfigError> {
    let file = match env_var(CONFIG_FILE_VAR) {
        Some(path) => FileConfig::from_path(Path::new(&path))?,
        None => FileConfig::default(),
    };
    Ok(resolve(&file, env_var))
}

impl TracerConfig {
    /// Compile the hop and timeout patterns.
    pub fn line_filter(&self) -> Result<LineFilter, ConfigError> {
        Ok(LineFilter::new(
            &self.hop_pattern,
            &self.timeout_pattern,
            self.tail_window,
        )?)
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            namespace: self.namespace.clone(),
            container: self.container.clone(),
            kubectl: self.kubectl.clone(),
            poll_interval_ms: self.scrape.poll_interval.as_millis() as u64,
            poll_timeout_ms: self.poll_timeout.as_millis() as u64,
            refresh_interval_secs: self.scrape.refresh_interval.as_secs(),
            tail_window: self.tail_window,
            hop_pattern: self.hop_pattern.clone(),
            timeout_pattern: self.timeout_pattern.clone(),
            terminal_retention_secs: self.correlator.terminal_retention.as_secs(),
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            output: self.output.clone(),
            max_payload: self.frame_limits.max_payload,
            max_hint_len: self.frame_limits.max_hint_len,
        }
    }
}

/// Serializes tests that mutate process environment.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
pub(crate) fn clear_env_vars() {
    for k in ENV_KEYS {
        std::env::remove_var(k);
    }
    std::env::remove_var(CONFIG_FILE_VAR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = lock();
        clear_env_vars();
        let cfg = load().unwrap();
        assert_eq!(cfg.namespace, "kube-triton");
        assert_eq!(cfg.container, "triton-proxy");
        assert_eq!(cfg.kubectl, "kubectl");
        assert_eq!(cfg.scrape.poll_interval, Duration::from_millis(1000));
        assert_eq!(cfg.poll_timeout, Duration::from_millis(5000));
        assert_eq!(cfg.scrape.refresh_interval, Duration::from_secs(30));
        assert_eq!(cfg.tail_window, 10);
        assert_eq!(cfg.hop_pattern, "PROXY_DEBUG");
        assert_eq!(cfg.timeout_pattern, "Timeout expired");
        assert_eq!(cfg.correlator.terminal_retention, Duration::from_secs(600));
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(10));
        assert!(cfg.output.is_none());
        assert_eq!(cfg.frame_limits.max_payload, 64 * 1024 * 1024);
        assert_eq!(cfg.frame_limits.max_hint_len, 256);
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = lock();
        clear_env_vars();
        std::env::set_var("HOPTRACE_NAMESPACE", "edge");
        std::env::set_var("HOPTRACE_POLL_INTERVAL_MS", "250");
        std::env::set_var("HOPTRACE_TAIL_WINDOW", "50");
        std::env::set_var("HOPTRACE_OUTPUT", "/tmp/traces.jsonl");
        let cfg = load().unwrap();
        assert_eq!(cfg.namespace, "edge");
        assert_eq!(cfg.scrape.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.tail_window, 50);
        assert_eq!(cfg.output, Some(PathBuf::from("/tmp/traces.jsonl")));
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = lock();
        clear_env_vars();
        std::env::set_var("HOPTRACE_POLL_INTERVAL_MS", "soon");
        std::env::set_var("HOPTRACE_TAIL_WINDOW", "-3");
        let cfg = load().unwrap();
        assert_eq!(cfg.scrape.poll_interval, Duration::from_millis(1000));
        assert_eq!(cfg.tail_window, 10);
        clear_env_vars();
    }

    #[test]
    fn test_floors_apply() {
        let _lock = lock();
        clear_env_vars();
        std::env::set_var("HOPTRACE_POLL_INTERVAL_MS", "0");
        std::env::set_var("HOPTRACE_TAIL_WINDOW", "0");
        std::env::set_var("HOPTRACE_MAX_PAYLOAD", "1");
        let cfg = load().unwrap();
        assert_eq!(cfg.scrape.poll_interval, Duration::from_millis(50));
        assert_eq!(cfg.tail_window, 1);
        assert_eq!(cfg.frame_limits.max_payload, 4096);
        clear_env_vars();
    }

    #[test]
    fn test_file_layer_under_env() {
        let _lock = lock();
        clear_env_vars();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "namespace = \"from-file\"\ncontainer = \"proxy\"\ntail_window = 20").unwrap();
        std::env::set_var(CONFIG_FILE_VAR, file.path());
        std::env::set_var("HOPTRACE_TAIL_WINDOW", "30");

        let cfg = load().unwrap();
        assert_eq!(cfg.namespace, "from-file");
        assert_eq!(cfg.container, "proxy");
        assert_eq!(cfg.tail_window, 30);
        clear_env_vars();
    }

    #[test]
    fn test_unknown_file_key_is_rejected() {
        let _lock = lock();
        clear_env_vars();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "namepsace = \"typo\"").unwrap();
        std::env::set_var(CONFIG_FILE_VAR, file.path());
        assert!(matches!(load(), Err(ConfigError::Parse { .. })));
        clear_env_vars();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let _lock = lock();
        clear_env_vars();
        std::env::set_var(CONFIG_FILE_VAR, "/nonexistent/hoptrace.toml");
        assert!(matches!(load(), Err(ConfigError::Read { .. })));
        clear_env_vars();
    }

    #[test]
    fn test_bad_pattern_surfaces_on_line_filter() {
        let cfg = TracerConfig {
            hop_pattern: "(".to_string(),
            ..TracerConfig::default()
        };
        assert!(matches!(cfg.line_filter(), Err(ConfigError::Pattern(_))));
    }

    #[test]
    fn test_effective_config_round_trips_values() {
        let cfg = TracerConfig::default();
        let eff = cfg.effective_config();
        assert_eq!(eff.poll_interval_ms, 1000);
        assert_eq!(eff.tail_window, 10);
        assert_eq!(eff.max_hint_len, 256);
        assert!(eff.output.is_none());
    }
}
