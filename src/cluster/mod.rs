//! Cluster control-plane access.
//!
//! [`ClusterApi`] is the one seam between this crate and a live cluster.
//! [`Kubectl`] drives the `kubectl` binary; [`InMemoryCluster`] keeps
//! resources in a map and serves dry runs and tests.

pub mod kubectl;
pub mod memory;

use serde::Serialize;
use serde_json::Value;

use crate::error::{ClusterError, ClusterResult};
use crate::kind::ChaosKind;

pub use kubectl::Kubectl;
pub use memory::InMemoryCluster;

/// Name, phase and readiness of a pod, as needed by capability checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodSummary {
    pub name: String,
    /// `status.phase` (e.g. `Running`, `Pending`).
    pub phase: String,
    /// Every container reports ready.
    pub ready: bool,
}

impl PodSummary {
    pub fn new(name: impl Into<String>, phase: impl Into<String>, ready: bool) -> Self {
        Self {
            name: name.into(),
            phase: phase.into(),
            ready,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == "Running"
    }

    /// Running with every container ready.
    pub fn is_serving(&self) -> bool {
        self.is_running() && self.ready
    }

    /// Parse one item of a pod list.
    pub fn from_document(doc: &Value) -> Option<Self> {
        let name = doc.pointer("/metadata/name")?.as_str()?.to_string();
        let phase = doc
            .pointer("/status/phase")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        let ready = doc
            .pointer("/status/containerStatuses")
            .and_then(Value::as_array)
            .is_some_and(|cs| {
                !cs.is_empty()
                    && cs
                        .iter()
                        .all(|c| c.get("ready").and_then(Value::as_bool) == Some(true))
            });
        Some(Self { name, phase, ready })
    }
}

/// Operations this crate needs from the cluster.
///
/// Every call is one bounded request, including those that span several
/// chaos kinds. Implementations report failures as typed
/// [`ClusterError`]s and never retry.
pub trait ClusterApi: Send + Sync {
    /// Check that the API server answers.
    fn ping(&self) -> ClusterResult<()>;

    /// Create a resource from its document; returns the created name.
    ///
    /// Creation is not an upsert: an existing name is a conflict.
    fn create(&self, document: &Value) -> ClusterResult<String>;

    /// The resource called `name` under any of `kinds`.
    ///
    /// No match is `NotFound`; a match under more than one kind is `Ambiguous`.
    fn get(&self, kinds: &[ChaosKind], name: &str, namespace: &str) -> ClusterResult<Value>;

    /// Resources of every kind in `kinds`; `None` lists across all namespaces.
    fn list(&self, kinds: &[ChaosKind], namespace: Option<&str>) -> ClusterResult<Vec<Value>>;

    /// Delete `name` under any of `kinds`; returns the kinds it was deleted from.
    fn delete(
        &self,
        kinds: &[ChaosKind],
        name: &str,
        namespace: &str,
    ) -> ClusterResult<Vec<ChaosKind>>;

    /// Set (`Some`) or remove (`None`) an annotation on `name` under any of
    /// `kinds`; returns the kinds it was changed on.
    fn annotate(
        &self,
        kinds: &[ChaosKind],
        name: &str,
        namespace: &str,
        key: &str,
        value: Option<&str>,
    ) -> ClusterResult<Vec<ChaosKind>>;

    /// Events whose involved object has the given name.
    fn list_events(&self, involved_name: &str, namespace: &str) -> ClusterResult<Vec<Value>>;

    /// Names of installed custom resource definitions.
    fn list_crds(&self) -> ClusterResult<Vec<String>>;

    fn list_pods(&self, namespace: &str) -> ClusterResult<Vec<PodSummary>>;
}

/// What a lookup over `kinds` was looking for, as reported in `NotFound`.
pub(crate) fn lookup_label(kinds: &[ChaosKind]) -> &'static str {
    match kinds {
        [one] => one.resource_kind(),
        _ => "chaos experiment",
    }
}

pub(crate) fn not_found(kinds: &[ChaosKind], name: &str, namespace: &str) -> ClusterError {
    ClusterError::NotFound {
        kind: lookup_label(kinds).to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
    }
}

/// The single document of a by-name lookup.
pub(crate) fn single(
    mut docs: Vec<Value>,
    kinds: &[ChaosKind],
    name: &str,
    namespace: &str,
) -> ClusterResult<Value> {
    match docs.len() {
        0 => Err(not_found(kinds, name, namespace)),
        1 => Ok(docs.remove(0)),
        _ => Err(ClusterError::Ambiguous {
            name: name.to_string(),
            namespace: namespace.to_string(),
            kinds: docs
                .iter()
                .filter_map(|d| d.get("kind").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}
