//! In-memory [`ClusterApi`] for dry runs and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use serde_json::{Value, json};

use super::{ClusterApi, PodSummary, not_found, single};
use crate::error::{ClusterError, ClusterResult};
use crate::kind::ChaosKind;

/// Operation names accepted by [`InMemoryCluster::fail_on`].
pub const OPERATIONS: [&str; 9] = [
    "ping",
    "create",
    "get",
    "list",
    "delete",
    "annotate",
    "list_events",
    "list_crds",
    "list_pods",
];

#[derive(Debug, Default)]
struct State {
    unreachable: Option<String>,
    failures: HashMap<String, ClusterError>,
    crds: Vec<String>,
    pods: BTreeMap<String, Vec<PodSummary>>,
    /// Keyed by (resource kind, namespace, name).
    resources: BTreeMap<(String, String, String), Value>,
    /// (namespace, involved object name, event).
    events: Vec<(String, String, Value)>,
    calls: Vec<String>,
}

/// A cluster held entirely in memory.
///
/// Resources created through [`ClusterApi::create`] are stored as-is and can
/// be read back, annotated and deleted. Any operation can be made to fail
/// with a chosen error, and the whole cluster can be made unreachable.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl InMemoryCluster {
    /// An empty, reachable cluster with nothing installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cluster with every chaos CRD and the core components running in
    /// `chaos_namespace`.
    pub fn with_chaos_mesh(chaos_namespace: &str) -> Self {
        let cluster = Self::new();
        {
            let mut st = cluster.lock();
            st.crds = ChaosKind::ALL.iter().map(|k| k.crd_name()).collect();
            st.pods.insert(
                chaos_namespace.to_string(),
                vec![
                    PodSummary::new("chaos-controller-manager-5d8f9c7b6-abcde", "Running", true),
                    PodSummary::new("chaos-daemon-x7k2p", "Running", true),
                    PodSummary::new("chaos-dns-server-6b7c8d9e0-fghij", "Running", true),
                    PodSummary::new("chaos-dashboard-7f6e5d4c3-klmno", "Running", true),
                ],
            );
        }
        cluster
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-call; the map is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every call fail as if the API server were down.
    pub fn set_unreachable(&self, cause: impl Into<String>) {
        self.lock().unreachable = Some(cause.into());
    }

    /// Make one operation (see [`OPERATIONS`]) fail with `error`.
    pub fn fail_on(&self, operation: &str, error: ClusterError) {
        self.lock().failures.insert(operation.to_string(), error);
    }

    pub fn set_crds(&self, crds: impl IntoIterator<Item = String>) {
        self.lock().crds = crds.into_iter().collect();
    }

    pub fn set_pods(&self, namespace: &str, pods: Vec<PodSummary>) {
        self.lock().pods.insert(namespace.to_string(), pods);
    }

    /// Store a resource document directly, bypassing create.
    pub fn insert(&self, document: Value) {
        if let Some(key) = key_of(&document) {
            self.lock().resources.insert(key, document);
        }
    }

    pub fn add_event(&self, namespace: &str, involved_name: &str, event: Value) {
        self.lock()
            .events
            .push((namespace.to_string(), involved_name.to_string(), event));
    }

    /// Stored document of a resource, if present.
    pub fn resource(&self, kind: ChaosKind, name: &str, namespace: &str) -> Option<Value> {
        self.lock()
            .resources
            .get(&resource_key(kind, name, namespace))
            .cloned()
    }

    pub fn resource_count(&self) -> usize {
        self.lock().resources.len()
    }

    /// Operations called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Record the call and return the configured failure, if any.
    fn enter(&self, operation: &str) -> ClusterResult<MutexGuard<'_, State>> {
        let mut st = self.lock();
        st.calls.push(operation.to_string());
        if let Some(cause) = &st.unreachable {
            return Err(ClusterError::Unreachable {
                cause: cause.clone(),
            });
        }
        if let Some(err) = st.failures.get(operation) {
            return Err(err.clone());
        }
        Ok(st)
    }
}

fn key_of(doc: &Value) -> Option<(String, String, String)> {
    let kind = doc.get("kind")?.as_str()?;
    let ns = doc
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or("default");
    let name = doc.pointer("/metadata/name")?.as_str()?;
    Some((kind.to_string(), ns.to_string(), name.to_string()))
}

fn resource_key(kind: ChaosKind, name: &str, namespace: &str) -> (String, String, String) {
    (kind.resource_kind().to_string(), namespace.to_string(), name.to_string())
}

impl ClusterApi for InMemoryCluster {
    fn ping(&self) -> ClusterResult<()> {
        self.enter("ping").map(|_| ())
    }

    fn create(&self, document: &Value) -> ClusterResult<String> {
        let mut st = self.enter("create")?;
        let key = key_of(document).ok_or_else(|| ClusterError::Command {
            command: "create".into(),
            stderr: "document has no kind or metadata.name".into(),
        })?;
        let kind_known = ChaosKind::from_resource_kind(&key.0)
            .is_some_and(|k| st.crds.contains(&k.crd_name()));
        if !kind_known {
            return Err(ClusterError::Command {
                command: "create".into(),
                stderr: format!("no matches for kind \"{}\" in version \"chaos-mesh.org/v1alpha1\"", key.0),
            });
        }
        if st.resources.contains_key(&key) {
            return Err(ClusterError::Conflict {
                cause: format!("{} \"{}\" already exists", key.0, key.2),
            });
        }
        let name = key.2.clone();
        let mut stored = document.clone();
        stored["status"] = json!({});
        st.resources.insert(key, stored);
        Ok(name)
    }

    fn get(&self, kinds: &[ChaosKind], name: &str, namespace: &str) -> ClusterResult<Value> {
        let st = self.enter("get")?;
        let found = kinds
            .iter()
            .filter_map(|k| st.resources.get(&resource_key(*k, name, namespace)))
            .cloned()
            .collect();
        single(found, kinds, name, namespace)
    }

    fn list(&self, kinds: &[ChaosKind], namespace: Option<&str>) -> ClusterResult<Vec<Value>> {
        let st = self.enter("list")?;
        Ok(st
            .resources
            .iter()
            .filter(|((k, ns, _), _)| {
                kinds.iter().any(|kind| kind.resource_kind() == k)
                    && namespace.is_none_or(|want| want == ns)
            })
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    fn delete(&self, kinds: &[ChaosKind], name: &str, namespace: &str) -> ClusterResult<Vec<ChaosKind>> {
        let mut st = self.enter("delete")?;
        let deleted: Vec<ChaosKind> = kinds
            .iter()
            .copied()
            .filter(|k| st.resources.remove(&resource_key(*k, name, namespace)).is_some())
            .collect();
        if deleted.is_empty() {
            return Err(not_found(kinds, name, namespace));
        }
        Ok(deleted)
    }

    fn annotate(
        &self,
        kinds: &[ChaosKind],
        name: &str,
        namespace: &str,
        key: &str,
        value: Option<&str>,
    ) -> ClusterResult<Vec<ChaosKind>> {
        let mut st = self.enter("annotate")?;
        let mut changed = Vec::new();
        for kind in kinds {
            let Some(doc) = st.resources.get_mut(&resource_key(*kind, name, namespace)) else {
                continue;
            };
            let meta = &mut doc["metadata"];
            if !meta["annotations"].is_object() {
                meta["annotations"] = json!({});
            }
            if let Some(annotations) = meta["annotations"].as_object_mut() {
                match value {
                    Some(v) => {
                        annotations.insert(key.to_string(), json!(v));
                    }
                    None => {
                        annotations.remove(key);
                    }
                }
            }
            changed.push(*kind);
        }
        if changed.is_empty() {
            return Err(not_found(kinds, name, namespace));
        }
        Ok(changed)
    }

    fn list_events(&self, involved_name: &str, namespace: &str) -> ClusterResult<Vec<Value>> {
        let st = self.enter("list_events")?;
        Ok(st
            .events
            .iter()
            .filter(|(ns, name, _)| ns == namespace && name == involved_name)
            .map(|(_, _, e)| e.clone())
            .collect())
    }

    fn list_crds(&self) -> ClusterResult<Vec<String>> {
        let st = self.enter("list_crds")?;
        Ok(st.crds.clone())
    }

    fn list_pods(&self, namespace: &str) -> ClusterResult<Vec<PodSummary>> {
        let st = self.enter("list_pods")?;
        Ok(st.pods.get(namespace).cloned().unwrap_or_default())
    }
}
