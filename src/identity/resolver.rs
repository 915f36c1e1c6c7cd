//! Container id → node name translation over an atomically swapped snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::source::{MembershipRow, MembershipSource, PodPhase};
use super::IdentityError;
use crate::ids::{ContainerId, NodeRef};
use crate::telemetry;

/// A pod whose logs are polled, and the node it runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodHandle {
    pub pod_name: String,
    pub node: NodeRef,
}

/// Immutable membership view. Replaced wholesale on refresh.
#[derive(Debug)]
pub struct MembershipSnapshot {
    by_container: HashMap<ContainerId, NodeRef>,
    pods: Vec<PodHandle>,
}

impl MembershipSnapshot {
    fn empty() -> Self {
        Self {
            by_container: HashMap::new(),
            pods: Vec::new(),
        }
    }

    /// Build from raw rows, keeping only running pods.
    pub fn from_rows(rows: Vec<MembershipRow>) -> Self {
        let mut by_container = HashMap::with_capacity(rows.len());
        let mut pods = Vec::with_capacity(rows.len());
        for row in rows.into_iter().filter(|r| r.phase == PodPhase::Running) {
            pods.push(PodHandle {
                pod_name: row.pod_name,
                node: row.node_name.clone(),
            });
            by_container.insert(row.container_id, row.node_name);
        }
        Self {
            by_container,
            pods,
        }
    }

    pub fn len(&self) -> usize {
        self.by_container.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_container.is_empty()
    }

    pub fn pods(&self) -> &[PodHandle] {
        &self.pods
    }
}

/// Read-mostly resolver. Readers clone an `Arc` and never block a refresh.
pub struct IdentityResolver {
    snapshot: RwLock<Arc<MembershipSnapshot>>,
    source: Arc<dyn MembershipSource>,
}

impl IdentityResolver {
    /// Start with an empty snapshot; call [`refresh`](Self::refresh) to seed it.
    pub fn new(source: Arc<dyn MembershipSource>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(MembershipSnapshot::empty())),
            source,
        }
    }

    pub fn resolve(&self, container: &ContainerId) -> Result<NodeRef, IdentityError> {
        self.snapshot
            .read()
            .by_container
            .get(container)
            .cloned()
            .ok_or_else(|| IdentityError::UnknownIdentity(container.clone()))
    }

    /// Current snapshot. Stays valid even if a refresh swaps in a newer one.
    pub fn snapshot(&self) -> Arc<MembershipSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Pods to poll in the current snapshot.
    pub fn pods(&self) -> Vec<PodHandle> {
        self.snapshot().pods().to_vec()
    }

    /// Re-fetch the listing and swap it in. On failure the old snapshot stays.
    ///
    /// Returns the number of running pods now loaded.
    pub async fn refresh(&self) -> Result<usize, IdentityError> {
        let rows = self.source.fetch().await?;
        let next = Arc::new(MembershipSnapshot::from_rows(rows));
        let loaded = next.len();
        *self.snapshot.write() = next;

        telemetry::record_identity_snapshot(loaded);
        tracing::debug!(pods = loaded, "identity snapshot refreshed");
        Ok(loaded)
    }
}
