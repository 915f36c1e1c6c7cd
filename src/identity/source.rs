//! Membership sources: where pod → node naming comes from.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;

use super::IdentityError;
use crate::ids::{ContainerId, NodeRef};

/// Pod lifecycle phase as reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodPhase {
    Running,
    Pending,
    Succeeded,
    Failed,
    Unknown(String),
}

impl PodPhase {
    pub fn parse(text: &str) -> Self {
        match text {
            "Running" => Self::Running,
            "Pending" => Self::Pending,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// One row of the membership listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRow {
    /// Pod name, used as the handle for reading its logs.
    pub pod_name: String,
    pub node_name: NodeRef,
    pub container_id: ContainerId,
    pub phase: PodPhase,
}

impl MembershipRow {
    pub fn running(pod_name: &str, node_name: &str, container_id: &str) -> Self {
        Self {
            pod_name: pod_name.to_string(),
            node_name: NodeRef::new(node_name),
            container_id: ContainerId::new(container_id),
            phase: PodPhase::Running,
        }
    }
}

/// Source of the full membership listing.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    /// Fetch every row, regardless of phase. Filtering happens in the resolver.
    async fn fetch(&self) -> Result<Vec<MembershipRow>, IdentityError>;
}

/// Parse `NAME NODE UID STATUS` columns, one pod per line.
///
/// Header lines and rows with the wrong column count are skipped.
pub fn parse_rows(text: &str) -> Vec<MembershipRow> {
    text.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() != 4 || cols[0] == "NAME" {
                return None;
            }
            Some(MembershipRow {
                pod_name: cols[0].to_string(),
                node_name: NodeRef::new(cols[1]),
                container_id: ContainerId::new(cols[2]),
                phase: PodPhase::parse(cols[3]),
            })
        })
        .collect()
}

/// Lists pods through `kubectl get pods` with custom columns.
#[derive(Debug, Clone)]
pub struct KubectlMembership {
    kubectl: String,
    namespace: String,
    timeout: Duration,
}

impl KubectlMembership {
    pub fn new(kubectl: impl Into<String>, namespace: impl Into<String>, timeout: Duration) -> Self {
        Self {
            kubectl: kubectl.into(),
            namespace: namespace.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MembershipSource for KubectlMembership {
    async fn fetch(&self) -> Result<Vec<MembershipRow>, IdentityError> {
        let output = Command::new(&self.kubectl)
            .arg(format!("--namespace={}", self.namespace))
            .args(["get", "pods", "--no-headers", "-o"])
            .arg("custom-columns=NAME:.metadata.name,NODE:.spec.nodeName,PodUID:.metadata.uid,STATUS:.status.phase")
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| IdentityError::SourceUnavailable("membership listing timed out".into()))?
            .map_err(|e| IdentityError::SourceUnavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IdentityError::SourceUnavailable(format!(
                "kubectl exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_rows(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Fixed, replaceable listing for tests and offline replays.
#[derive(Default)]
pub struct StaticMembership {
    rows: Mutex<Option<Vec<MembershipRow>>>,
}

impl StaticMembership {
    pub fn new(rows: Vec<MembershipRow>) -> Self {
        Self {
            rows: Mutex::new(Some(rows)),
        }
    }

    /// Replace the listing returned by the next fetch.
    pub fn set_rows(&self, rows: Vec<MembershipRow>) {
        *self.rows.lock() = Some(rows);
    }

    /// Make every subsequent fetch fail until rows are set again.
    pub fn set_unavailable(&self) {
        *self.rows.lock() = None;
    }
}

#[async_trait]
impl MembershipSource for StaticMembership {
    async fn fetch(&self) -> Result<Vec<MembershipRow>, IdentityError> {
        self.rows
            .lock()
            .clone()
            .ok_or_else(|| IdentityError::SourceUnavailable("static source disabled".into()))
    }
}
