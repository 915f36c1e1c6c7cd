//! `kubectl logs` backend.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{LineFilter, LogSource, LogView, PollError};
use crate::identity::PodHandle;

/// Reads a pod's proxy container log through `kubectl logs` and keeps the
/// last matching lines.
#[derive(Debug, Clone)]
pub struct KubectlLogSource {
    kubectl: String,
    namespace: String,
    container: String,
    filter: LineFilter,
    timeout: Duration,
}

impl KubectlLogSource {
    pub fn new(
        kubectl: impl Into<String>,
        namespace: impl Into<String>,
        container: impl Into<String>,
        filter: LineFilter,
        timeout: Duration,
    ) -> Self {
        Self {
            kubectl: kubectl.into(),
            namespace: namespace.into(),
            container: container.into(),
            filter,
            timeout,
        }
    }

    fn unavailable(pod: &PodHandle, reason: impl Into<String>) -> PollError {
        PollError::Unavailable {
            pod: pod.pod_name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LogSource for KubectlLogSource {
    fn name(&self) -> &str {
        "kubectl"
    }

    async fn poll(&self, pod: &PodHandle, view: LogView) -> Result<Vec<String>, PollError> {
        let output = Command::new(&self.kubectl)
            .arg(format!("--namespace={}", self.namespace))
            .arg("logs")
            .arg(format!("pod/{}", pod.pod_name))
            .arg(&self.container)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| Self::unavailable(pod, format!("no answer within {:?}", self.timeout)))?
            .map_err(|e| Self::unavailable(pod, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::unavailable(
                pod,
                format!("kubectl exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(self.filter.tail(text.lines(), view))
    }
}
