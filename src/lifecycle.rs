//! Experiment lifecycle: submit, inspect, list, delete, pause, resume.
//!
//! A thin layer over [`ClusterApi`]. The controller owns every experiment
//! once submitted; this module only issues correctly-shaped requests and maps
//! the controller's status vocabulary onto [`Phase`]. Each operation is one
//! cluster request, searching every kind at once when the kind is not given.
//! Nothing here retries.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::cluster::ClusterApi;
use crate::error::{ClusterError, ClusterResult, TargetResult};
use crate::kind::ChaosKind;
use crate::render::ExperimentManifest;
use crate::target;

/// The annotation that pauses an experiment while set to `"true"`.
///
/// Tied to the controller version; Chaos Mesh 2.x uses
/// [`CHAOS_MESH_2X_KEY`](Self::CHAOS_MESH_2X_KEY).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseAnnotation {
    key: String,
}

impl PauseAnnotation {
    pub const CHAOS_MESH_2X_KEY: &'static str = "experiment.chaos-mesh.org/pause";

    pub fn new(key: &str) -> TargetResult<Self> {
        target::check_label_key(key)?;
        Ok(Self {
            key: key.to_string(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Default for PauseAnnotation {
    fn default() -> Self {
        Self {
            key: Self::CHAOS_MESH_2X_KEY.to_string(),
        }
    }
}

/// Lifecycle phase of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Running,
    Paused,
    Finished,
    Failed,
    Unknown,
}

impl Phase {
    /// Phases of an experiment that has not ended. `Unknown` counts, since a
    /// freshly created experiment has no status yet.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Unknown)
    }

    /// Fixed mapping from the controller's phase words.
    pub fn from_native(native: &str) -> Self {
        match native {
            "Running" | "Run" | "Injected" | "Injecting" => Self::Running,
            "Paused" | "Pause" => Self::Paused,
            "Finished" | "Stop" | "Stopped" | "Recovered" => Self::Finished,
            "Failed" | "Error" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One cluster event about an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub reason: String,
    pub message: String,
    pub timestamp: Option<String>,
    pub count: u64,
}

impl ExperimentEvent {
    pub fn from_document(doc: &Value) -> Self {
        let s = |key: &str| doc.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            event_type: s("type").unwrap_or_default(),
            reason: s("reason").unwrap_or_default(),
            message: s("message").unwrap_or_default(),
            timestamp: s("lastTimestamp")
                .or_else(|| s("eventTime"))
                .or_else(|| s("firstTimestamp")),
            count: doc.get("count").and_then(Value::as_u64).unwrap_or(1),
        }
    }
}

/// Read-only view of an experiment's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentStatus {
    pub name: String,
    pub namespace: String,
    pub kind: &'static str,
    pub phase: Phase,
    /// The controller's own word for the phase, when it gave one.
    pub native_phase: Option<String>,
    pub started_at: Option<String>,
    pub message: Option<String>,
    /// Targets the fault is currently injected into, when the controller reports them.
    pub injected_pods: Option<u64>,
    /// Filled only when events were asked for.
    pub events: Vec<ExperimentEvent>,
}

/// One row of an experiment listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentSummary {
    pub name: String,
    pub namespace: String,
    pub kind: &'static str,
    pub phase: Phase,
    pub created_at: Option<String>,
    pub action: Option<String>,
    pub duration: Option<String>,
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submitted {
    pub name: String,
    pub namespace: String,
    pub kind: &'static str,
}

/// Experiment operations against one cluster.
pub struct ExperimentManager {
    cluster: Arc<dyn ClusterApi>,
    pause: PauseAnnotation,
}

impl ExperimentManager {
    pub fn new(cluster: Arc<dyn ClusterApi>, pause: PauseAnnotation) -> Self {
        Self { cluster, pause }
    }

    pub fn pause_annotation(&self) -> &PauseAnnotation {
        &self.pause
    }

    /// Create the experiment. A taken name is a conflict, not an update.
    pub fn submit(&self, manifest: &ExperimentManifest) -> ClusterResult<Submitted> {
        let name = self.cluster.create(&manifest.document())?;
        tracing::info!(
            kind = manifest.kind().resource_kind(),
            action = %manifest.action(),
            namespace = manifest.namespace(),
            name = %name,
            "experiment submitted"
        );
        Ok(Submitted {
            name,
            namespace: manifest.namespace().to_string(),
            kind: manifest.kind().resource_kind(),
        })
    }

    /// Find an experiment by name, under `hint` or else under every kind.
    ///
    /// The kind is read from the document's own `kind` field.
    pub fn locate(
        &self,
        name: &str,
        namespace: &str,
        hint: Option<ChaosKind>,
    ) -> ClusterResult<(ChaosKind, Value)> {
        let doc = self.cluster.get(&candidates(hint), name, namespace)?;
        let kind = doc
            .get("kind")
            .and_then(Value::as_str)
            .and_then(ChaosKind::from_resource_kind)
            .or(hint)
            .ok_or_else(|| ClusterError::MalformedOutput {
                command: format!("get {name}"),
                message: "resource has no chaos kind".into(),
            })?;
        Ok((kind, doc))
    }

    /// Status of one experiment. Events cost a second request, so they are
    /// only fetched when `with_events` is set.
    pub fn status(
        &self,
        name: &str,
        namespace: &str,
        hint: Option<ChaosKind>,
        with_events: bool,
    ) -> ClusterResult<ExperimentStatus> {
        let (kind, doc) = self.locate(name, namespace, hint)?;
        let events = if with_events {
            self.events(name, namespace)?
        } else {
            Vec::new()
        };
        let native = native_phase(&doc, &self.pause);
        Ok(ExperimentStatus {
            name: name.to_string(),
            namespace: namespace.to_string(),
            kind: kind.resource_kind(),
            phase: native.as_deref().map_or(Phase::Unknown, Phase::from_native),
            native_phase: native,
            started_at: doc
                .pointer("/metadata/creationTimestamp")
                .and_then(Value::as_str)
                .map(str::to_string),
            message: status_message(&doc),
            injected_pods: injected_pods(&doc),
            events,
        })
    }

    /// List experiments in `namespace` (all namespaces if `None`), optionally
    /// only those still active.
    ///
    /// A single kind whose CRD is absent lists as empty.
    pub fn list(
        &self,
        namespace: Option<&str>,
        kind: Option<ChaosKind>,
        active_only: bool,
    ) -> ClusterResult<Vec<ExperimentSummary>> {
        let docs = match self.cluster.list(&candidates(kind), namespace) {
            Ok(docs) => docs,
            Err(ClusterError::NotFound { .. }) if kind.is_some() => Vec::new(),
            Err(e) => return Err(e),
        };
        let mut out = Vec::new();
        for doc in docs {
            let Some(kind) = doc
                .get("kind")
                .and_then(Value::as_str)
                .and_then(ChaosKind::from_resource_kind)
                .or(kind)
            else {
                continue;
            };
            let text = |pointer: &str| {
                doc.pointer(pointer)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            let native = native_phase(&doc, &self.pause);
            let phase = native.as_deref().map_or(Phase::Unknown, Phase::from_native);
            if active_only && !phase.is_active() {
                continue;
            }
            out.push(ExperimentSummary {
                name: text("/metadata/name").unwrap_or_default(),
                namespace: text("/metadata/namespace").unwrap_or_default(),
                kind: kind.resource_kind(),
                phase,
                created_at: text("/metadata/creationTimestamp"),
                action: text("/spec/action"),
                duration: text("/spec/duration"),
            });
        }
        Ok(out)
    }

    /// Delete the experiment; returns the kinds it was deleted from.
    pub fn delete(
        &self,
        name: &str,
        namespace: &str,
        hint: Option<ChaosKind>,
    ) -> ClusterResult<Vec<ChaosKind>> {
        let kinds = self.cluster.delete(&candidates(hint), name, namespace)?;
        tracing::info!(kinds = %kind_names(&kinds), namespace, name, "experiment deleted");
        Ok(kinds)
    }

    pub fn pause(
        &self,
        name: &str,
        namespace: &str,
        hint: Option<ChaosKind>,
    ) -> ClusterResult<Vec<ChaosKind>> {
        let kinds = self.cluster.annotate(
            &candidates(hint),
            name,
            namespace,
            self.pause.key(),
            Some("true"),
        )?;
        tracing::info!(kinds = %kind_names(&kinds), namespace, name, "experiment paused");
        Ok(kinds)
    }

    pub fn resume(
        &self,
        name: &str,
        namespace: &str,
        hint: Option<ChaosKind>,
    ) -> ClusterResult<Vec<ChaosKind>> {
        let kinds = self
            .cluster
            .annotate(&candidates(hint), name, namespace, self.pause.key(), None)?;
        tracing::info!(kinds = %kind_names(&kinds), namespace, name, "experiment resumed");
        Ok(kinds)
    }

    /// Events about `name`, oldest first.
    pub fn events(&self, name: &str, namespace: &str) -> ClusterResult<Vec<ExperimentEvent>> {
        let mut events: Vec<ExperimentEvent> = self
            .cluster
            .list_events(name, namespace)?
            .iter()
            .map(ExperimentEvent::from_document)
            .collect();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(events)
    }
}

fn candidates(hint: Option<ChaosKind>) -> Vec<ChaosKind> {
    match hint {
        Some(k) => vec![k],
        None => ChaosKind::ALL.to_vec(),
    }
}

fn kind_names(kinds: &[ChaosKind]) -> String {
    kinds
        .iter()
        .map(|k| k.resource_kind())
        .collect::<Vec<_>>()
        .join(", ")
}

fn condition_true(doc: &Value, condition: &str) -> bool {
    doc.pointer("/status/conditions")
        .and_then(Value::as_array)
        .is_some_and(|cs| {
            cs.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some(condition)
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
}

/// The controller's phase word for a resource document.
///
/// Legacy 1.x resources report `status.experiment.phase` directly; 2.x
/// resources are read from the pause annotation, failed record events,
/// `desiredPhase`, and the `Paused`/`AllInjected`/`AllRecovered` conditions.
fn native_phase(doc: &Value, pause: &PauseAnnotation) -> Option<String> {
    if let Some(phase) = doc
        .pointer("/status/experiment/phase")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
    {
        return Some(phase.to_string());
    }

    let paused_annotation = doc
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(pause.key()))
        .and_then(Value::as_str)
        == Some("true");
    if paused_annotation || condition_true(doc, "Paused") {
        return Some("Paused".into());
    }

    let failed = doc
        .pointer("/status/experiment/containerRecords")
        .and_then(Value::as_array)
        .is_some_and(|records| {
            records.iter().any(|r| {
                r.get("events").and_then(Value::as_array).is_some_and(|es| {
                    es.iter()
                        .any(|e| e.get("type").and_then(Value::as_str) == Some("Failed"))
                })
            })
        });
    if failed {
        return Some("Failed".into());
    }

    match doc
        .pointer("/status/experiment/desiredPhase")
        .and_then(Value::as_str)
    {
        Some("Stop") if condition_true(doc, "AllRecovered") => Some("Recovered".into()),
        Some("Run") if condition_true(doc, "AllInjected") => Some("Injected".into()),
        Some(p) => Some(p.to_string()),
        None if condition_true(doc, "AllInjected") => Some("Injected".into()),
        None => None,
    }
}

/// Injected targets: records in phase `Injected`, else the count the
/// `Selected` condition carries in its reason.
fn injected_pods(doc: &Value) -> Option<u64> {
    if let Some(records) = doc
        .pointer("/status/experiment/containerRecords")
        .and_then(Value::as_array)
    {
        let injected = records
            .iter()
            .filter(|r| r.get("phase").and_then(Value::as_str) == Some("Injected"))
            .count();
        return Some(injected as u64);
    }
    doc.pointer("/status/conditions")
        .and_then(Value::as_array)?
        .iter()
        .find(|c| {
            c.get("type").and_then(Value::as_str) == Some("Selected")
                && c.get("status").and_then(Value::as_str) == Some("True")
        })
        .and_then(|c| c.get("reason").and_then(Value::as_str))
        .and_then(|r| r.parse().ok())
}

fn status_message(doc: &Value) -> Option<String> {
    doc.pointer("/status/conditions")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|c| c.get("reason").and_then(Value::as_str))
        .find(|r| !r.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InMemoryCluster;
    use serde_json::json;

    fn doc(kind: &str, name: &str, status: Value) -> Value {
        json!({
            "apiVersion": "chaos-mesh.org/v1alpha1",
            "kind": kind,
            "metadata": {"name": name, "namespace": "default", "creationTimestamp": "2026-10-16T09:00:00Z"},
            "spec": {},
            "status": status,
        })
    }

    fn manager() -> (Arc<InMemoryCluster>, ExperimentManager) {
        let cluster = Arc::new(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
        let mgr = ExperimentManager::new(cluster.clone(), PauseAnnotation::default());
        (cluster, mgr)
    }

    #[test]
    fn phase_table() {
        assert_eq!(Phase::from_native("Running"), Phase::Running);
        assert_eq!(Phase::from_native("Run"), Phase::Running);
        assert_eq!(Phase::from_native("Pause"), Phase::Paused);
        assert_eq!(Phase::from_native("Stop"), Phase::Finished);
        assert_eq!(Phase::from_native("Recovered"), Phase::Finished);
        assert_eq!(Phase::from_native("Failed"), Phase::Failed);
        assert_eq!(Phase::from_native("Waiting"), Phase::Unknown);
    }

    #[test]
    fn native_phase_sources() {
        let pause = PauseAnnotation::default();
        let legacy = doc("PodChaos", "a", json!({"experiment": {"phase": "Finished"}}));
        assert_eq!(native_phase(&legacy, &pause).as_deref(), Some("Finished"));

        let running = doc("PodChaos", "a", json!({"experiment": {"desiredPhase": "Run"}}));
        assert_eq!(native_phase(&running, &pause).as_deref(), Some("Run"));

        let recovered = doc(
            "PodChaos",
            "a",
            json!({"experiment": {"desiredPhase": "Stop"},
                   "conditions": [{"type": "AllRecovered", "status": "True"}]}),
        );
        assert_eq!(native_phase(&recovered, &pause).as_deref(), Some("Recovered"));

        let failed = doc(
            "PodChaos",
            "a",
            json!({"experiment": {"desiredPhase": "Run",
                   "containerRecords": [{"events": [{"type": "Failed", "operation": "Apply"}]}]}}),
        );
        assert_eq!(native_phase(&failed, &pause).as_deref(), Some("Failed"));

        let mut paused = running.clone();
        paused["metadata"]["annotations"] = json!({"experiment.chaos-mesh.org/pause": "true"});
        assert_eq!(native_phase(&paused, &pause).as_deref(), Some("Paused"));

        assert_eq!(native_phase(&doc("PodChaos", "a", json!({})), &pause), None);
    }

    #[test]
    fn all_injected_reads_as_running() {
        let pause = PauseAnnotation::default();
        let injected = doc(
            "NetworkChaos",
            "a",
            json!({"conditions": [{"type": "AllInjected", "status": "True"}]}),
        );
        assert_eq!(native_phase(&injected, &pause).as_deref(), Some("Injected"));
        assert_eq!(Phase::from_native("Injected"), Phase::Running);

        let running = doc(
            "NetworkChaos",
            "a",
            json!({"experiment": {"desiredPhase": "Run"},
                   "conditions": [{"type": "AllInjected", "status": "True"}]}),
        );
        assert_eq!(native_phase(&running, &pause).as_deref(), Some("Injected"));

        let pending = doc(
            "NetworkChaos",
            "a",
            json!({"conditions": [{"type": "AllInjected", "status": "False"}]}),
        );
        assert_eq!(native_phase(&pending, &pause), None);
    }

    #[test]
    fn injected_pods_from_records_or_selected_condition() {
        let records = doc(
            "PodChaos",
            "a",
            json!({"experiment": {"containerRecords": [
                {"id": "default/web-1", "phase": "Injected"},
                {"id": "default/web-2", "phase": "Injected"},
                {"id": "default/web-3", "phase": "Not Injected"}
            ]}}),
        );
        assert_eq!(injected_pods(&records), Some(2));

        let selected = doc(
            "PodChaos",
            "a",
            json!({"conditions": [{"type": "Selected", "status": "True", "reason": "3"}]}),
        );
        assert_eq!(injected_pods(&selected), Some(3));
        assert_eq!(injected_pods(&doc("PodChaos", "a", json!({}))), None);
    }

    #[test]
    fn status_is_one_request() {
        let (cluster, mgr) = manager();
        cluster.insert(doc(
            "DNSChaos",
            "dns-err",
            json!({"experiment": {"desiredPhase": "Run", "containerRecords": [{"phase": "Injected"}]}}),
        ));
        let status = mgr.status("dns-err", "default", None, false).unwrap();
        assert_eq!(status.kind, "DNSChaos");
        assert_eq!(status.phase, Phase::Running);
        assert_eq!(status.injected_pods, Some(1));
        assert!(status.events.is_empty());
        assert_eq!(cluster.calls(), vec!["get"]);

        mgr.status("dns-err", "default", None, true).unwrap();
        assert_eq!(cluster.calls(), vec!["get", "get", "list_events"]);
    }

    #[test]
    fn locate_reads_kind_from_document() {
        let (cluster, mgr) = manager();
        cluster.insert(doc("DNSChaos", "dns-err", json!({})));
        let (kind, _) = mgr.locate("dns-err", "default", None).unwrap();
        assert_eq!(kind, ChaosKind::DNS);

        let err = mgr.locate("nope", "default", None).unwrap_err();
        assert!(matches!(err, ClusterError::NotFound { ref kind, .. } if kind == "chaos experiment"));

        let err = mgr.locate("dns-err", "default", Some(ChaosKind::Pod)).unwrap_err();
        assert!(matches!(err, ClusterError::NotFound { ref kind, .. } if kind == "PodChaos"));
    }

    #[test]
    fn locate_surfaces_non_not_found_errors() {
        let (cluster, mgr) = manager();
        cluster.fail_on(
            "get",
            ClusterError::PermissionDenied {
                cause: "forbidden".into(),
            },
        );
        assert!(matches!(
            mgr.locate("x", "default", None),
            Err(ClusterError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn pause_and_resume_toggle_annotation() {
        let (cluster, mgr) = manager();
        cluster.insert(doc("NetworkChaos", "net", json!({"experiment": {"desiredPhase": "Run"}})));
        assert_eq!(mgr.status("net", "default", None, false).unwrap().phase, Phase::Running);

        assert_eq!(mgr.pause("net", "default", None).unwrap(), vec![ChaosKind::Network]);
        let stored = cluster.resource(ChaosKind::Network, "net", "default").unwrap();
        assert_eq!(stored["metadata"]["annotations"]["experiment.chaos-mesh.org/pause"], "true");
        assert_eq!(mgr.status("net", "default", None, false).unwrap().phase, Phase::Paused);

        mgr.resume("net", "default", None).unwrap();
        assert_eq!(mgr.status("net", "default", None, false).unwrap().phase, Phase::Running);
        assert_eq!(
            cluster.calls(),
            vec!["get", "annotate", "get", "annotate", "get"]
        );
    }

    #[test]
    fn delete_missing_is_not_found() {
        let (cluster, mgr) = manager();
        assert!(matches!(
            mgr.delete("ghost", "default", None),
            Err(ClusterError::NotFound { .. })
        ));
        assert_eq!(cluster.calls(), vec!["delete"]);
    }

    #[test]
    fn events_are_mapped_and_ordered() {
        let (cluster, mgr) = manager();
        cluster.add_event(
            "default",
            "pk",
            json!({"type": "Normal", "reason": "Applied", "message": "injected", "lastTimestamp": "2026-10-16T09:01:00Z", "count": 2}),
        );
        cluster.add_event(
            "default",
            "pk",
            json!({"type": "Normal", "reason": "Started", "message": "started", "firstTimestamp": "2026-10-16T09:00:00Z"}),
        );
        cluster.add_event("default", "other", json!({"type": "Warning", "reason": "X"}));
        let events = mgr.events("pk", "default").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reason, "Started");
        assert_eq!(events[0].count, 1);
        assert_eq!(events[1].count, 2);
    }

    #[test]
    fn list_filters_by_namespace_and_kind() {
        let (cluster, mgr) = manager();
        cluster.insert(doc("PodChaos", "a", json!({})));
        cluster.insert(doc("NetworkChaos", "b", json!({})));
        let mut other = doc("PodChaos", "c", json!({}));
        other["metadata"]["namespace"] = json!("staging");
        cluster.insert(other);

        assert_eq!(mgr.list(Some("default"), None, false).unwrap().len(), 2);
        assert_eq!(mgr.list(None, Some(ChaosKind::Pod), false).unwrap().len(), 2);
        assert_eq!(mgr.list(None, None, false).unwrap().len(), 3);
        assert_eq!(cluster.calls(), vec!["list", "list", "list"]);
    }

    #[test]
    fn list_active_skips_ended_experiments() {
        let (cluster, mgr) = manager();
        cluster.insert(doc("PodChaos", "running", json!({"experiment": {"desiredPhase": "Run"}})));
        cluster.insert(doc("PodChaos", "new", json!({})));
        cluster.insert(doc("PodChaos", "done", json!({"experiment": {"phase": "Finished"}})));
        cluster.insert(doc(
            "StressChaos",
            "broken",
            json!({"experiment": {"desiredPhase": "Run",
                   "containerRecords": [{"events": [{"type": "Failed"}]}]}}),
        ));

        let mut active: Vec<String> = mgr
            .list(None, None, true)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        active.sort();
        assert_eq!(active, vec!["new", "running"]);
        assert_eq!(mgr.list(None, None, false).unwrap().len(), 4);
    }

    #[test]
    fn list_of_one_kind_without_crd_is_empty() {
        let (cluster, mgr) = manager();
        cluster.fail_on(
            "list",
            ClusterError::NotFound {
                kind: "DNSChaos".into(),
                name: String::new(),
                namespace: "default".into(),
            },
        );
        assert!(mgr.list(Some("default"), Some(ChaosKind::DNS), true).unwrap().is_empty());
        assert!(matches!(
            mgr.list(Some("default"), None, true),
            Err(ClusterError::NotFound { .. })
        ));
    }

    #[test]
    fn pause_annotation_key_is_checked() {
        assert!(PauseAnnotation::new("experiment.chaos-mesh.org/pause").is_ok());
        assert!(PauseAnnotation::new("not a key").is_err());
    }
}
