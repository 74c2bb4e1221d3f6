//! Environment capability checks: can this cluster run a chaos kind right now?
//!
//! Every check is tri-state plus one: [`Readiness::Ready`],
//! [`Readiness::Missing`], [`Readiness::Unknown`] when the cluster could not
//! be asked, and [`Readiness::Unverifiable`] for prerequisites that live
//! outside the cluster. "Not installed" and "cannot tell" are never conflated.
//!
//! Reports are computed fresh on every call.

use std::sync::Arc;

use serde::Serialize;

use crate::cluster::{ClusterApi, PodSummary};
use crate::kind::ChaosKind;

pub const CONTROLLER_MANAGER: &str = "chaos-controller-manager";
pub const DAEMON: &str = "chaos-daemon";
pub const DNS_SERVER: &str = "chaos-dns-server";
pub const DASHBOARD: &str = "chaos-dashboard";

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Missing { detail: String },
    Unknown { cause: String },
    Unverifiable { reason: String },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Combine checks: any unknown makes the whole unknown, then any missing.
    fn all(parts: &[&Readiness]) -> Readiness {
        let unknown: Vec<&str> = parts
            .iter()
            .filter_map(|r| match r {
                Readiness::Unknown { cause } => Some(cause.as_str()),
                _ => None,
            })
            .collect();
        if let Some(first) = unknown.first() {
            return Readiness::Unknown {
                cause: (*first).to_string(),
            };
        }
        let missing: Vec<&str> = parts
            .iter()
            .filter_map(|r| match r {
                Readiness::Missing { detail } => Some(detail.as_str()),
                _ => None,
            })
            .collect();
        if missing.is_empty() {
            Readiness::Ready
        } else {
            Readiness::Missing {
                detail: missing.join("; "),
            }
        }
    }
}

/// Summary judgement for a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Ready,
    NotReady,
    Unknown,
    /// In-cluster prerequisites are met; the external agent must be confirmed separately.
    NeedsExternalConfirmation,
}

/// One in-cluster component and whether it is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub required: bool,
    pub readiness: Readiness,
}

/// Static prerequisites of a kind, independent of any cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirements {
    pub crd: String,
    pub required_components: Vec<&'static str>,
    pub optional_components: Vec<&'static str>,
    pub external_requirements: Vec<&'static str>,
    pub notes: Vec<&'static str>,
}

/// The capability of the cluster for one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindCapability {
    pub kind: &'static str,
    pub crd_installed: Readiness,
    pub required_components_ready: Readiness,
    pub optional_components_ready: Readiness,
    /// Only for kinds that depend on an agent outside the cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_agent: Option<Readiness>,
    pub components: Vec<ComponentStatus>,
    pub external_requirements_note: String,
    pub requirements: Requirements,
    pub verdict: Verdict,
}

/// Capability of every kind, plus cluster reachability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityReport {
    pub cluster_reachable: Readiness,
    pub chaos_namespace: String,
    pub kinds: Vec<KindCapability>,
}

impl CapabilityReport {
    pub fn kind(&self, kind: ChaosKind) -> Option<&KindCapability> {
        self.kinds.iter().find(|k| k.kind == kind.resource_kind())
    }
}

/// Static requirements for `kind`.
pub fn requirements(kind: ChaosKind) -> Requirements {
    let mut required_components = vec![CONTROLLER_MANAGER, DAEMON];
    let mut external_requirements = Vec::new();
    let notes = match kind {
        ChaosKind::Network => vec!["Supports delay, loss, partition and corrupt actions"],
        ChaosKind::Stress => vec!["Runs stress-ng inside the target containers"],
        ChaosKind::Pod => vec!["Supports pod-kill, pod-failure and container-kill actions"],
        ChaosKind::IO => vec![
            "Supports latency, fault, attrOverride and mistake actions",
            "Needs the volume mount path and a file path pattern",
        ],
        ChaosKind::HTTP => vec![
            "Supports abort, delay, replace and patch actions",
            "Needs the port of the target service",
        ],
        ChaosKind::DNS => {
            required_components.push(DNS_SERVER);
            vec![
                "chaos-dns-server must be running in the Chaos Mesh namespace",
                "Only A and AAAA records are affected",
                "Wildcards are allowed only as a '*.' prefix or a '*' suffix",
            ]
        }
        ChaosKind::PhysicalMachine => {
            external_requirements = vec![
                "Chaosd agent must be running on every target machine",
                "Chaosd must be reachable from the Chaos Mesh controller",
                "Target machines are addressed as host:port without a scheme",
            ];
            vec!["Faults run on the machines, outside the cluster"]
        }
    };
    Requirements {
        crd: kind.crd_name(),
        required_components,
        optional_components: vec![DASHBOARD],
        external_requirements,
        notes,
    }
}

/// What the cluster told us, queried once per check.
struct Snapshot {
    crds: Result<Vec<String>, String>,
    pods: Result<Vec<PodSummary>, String>,
}

/// Runs capability checks against a cluster.
pub struct CapabilityChecker {
    cluster: Arc<dyn ClusterApi>,
    chaos_namespace: String,
}

impl CapabilityChecker {
    pub fn new(cluster: Arc<dyn ClusterApi>, chaos_namespace: impl Into<String>) -> Self {
        Self {
            cluster,
            chaos_namespace: chaos_namespace.into(),
        }
    }

    /// Check every kind. Never fails; problems become `Unknown` entries.
    pub fn check_all(&self) -> CapabilityReport {
        let (reachable, snapshot) = self.snapshot();
        CapabilityReport {
            cluster_reachable: reachable,
            chaos_namespace: self.chaos_namespace.clone(),
            kinds: ChaosKind::ALL
                .iter()
                .map(|k| self.assess(*k, &snapshot))
                .collect(),
        }
    }

    /// Check a single kind.
    pub fn check_one(&self, kind: ChaosKind) -> KindCapability {
        let (_, snapshot) = self.snapshot();
        self.assess(kind, &snapshot)
    }

    fn snapshot(&self) -> (Readiness, Snapshot) {
        if let Err(e) = self.cluster.ping() {
            tracing::warn!(error = %e, "cluster unreachable, capability unknown");
            let cause = e.to_string();
            return (
                Readiness::Unknown {
                    cause: cause.clone(),
                },
                Snapshot {
                    crds: Err(cause.clone()),
                    pods: Err(cause),
                },
            );
        }
        let crds = self.cluster.list_crds().map_err(|e| {
            tracing::warn!(error = %e, "listing CRDs failed");
            e.to_string()
        });
        let pods = self.cluster.list_pods(&self.chaos_namespace).map_err(|e| {
            tracing::warn!(error = %e, namespace = %self.chaos_namespace, "listing pods failed");
            e.to_string()
        });
        (Readiness::Ready, Snapshot { crds, pods })
    }

    fn component(
        &self,
        name: &'static str,
        required: bool,
        pods: &Result<Vec<PodSummary>, String>,
    ) -> ComponentStatus {
        let readiness = match pods {
            Err(cause) => Readiness::Unknown {
                cause: cause.clone(),
            },
            Ok(pods) => {
                let mut matching = pods.iter().filter(|p| p.name.contains(name)).peekable();
                if matching.peek().is_none() {
                    Readiness::Missing {
                        detail: format!("no {name} pod in namespace {}", self.chaos_namespace),
                    }
                } else if matching.any(PodSummary::is_serving) {
                    Readiness::Ready
                } else {
                    Readiness::Missing {
                        detail: format!(
                            "no running and ready {name} pod in namespace {}",
                            self.chaos_namespace
                        ),
                    }
                }
            }
        };
        ComponentStatus {
            name,
            required,
            readiness,
        }
    }

    fn assess(&self, kind: ChaosKind, snap: &Snapshot) -> KindCapability {
        let reqs = requirements(kind);

        let crd_installed = match &snap.crds {
            Err(cause) => Readiness::Unknown {
                cause: cause.clone(),
            },
            Ok(crds) if crds.iter().any(|c| *c == reqs.crd) => Readiness::Ready,
            Ok(_) => Readiness::Missing {
                detail: format!("CRD {} is not installed", reqs.crd),
            },
        };

        let components: Vec<ComponentStatus> = reqs
            .required_components
            .iter()
            .map(|c| self.component(*c, true, &snap.pods))
            .chain(
                reqs.optional_components
                    .iter()
                    .map(|c| self.component(*c, false, &snap.pods)),
            )
            .collect();
        let required: Vec<&Readiness> = components
            .iter()
            .filter(|c| c.required)
            .map(|c| &c.readiness)
            .collect();
        let optional: Vec<&Readiness> = components
            .iter()
            .filter(|c| !c.required)
            .map(|c| &c.readiness)
            .collect();
        let required_components_ready = Readiness::all(&required);
        let optional_components_ready = Readiness::all(&optional);

        let external_agent = (!reqs.external_requirements.is_empty()).then(|| Readiness::Unverifiable {
            reason: "Chaosd agent liveness cannot be observed from the cluster; \
                     confirm each target machine is running chaosd"
                .into(),
        });

        let verdict = match (&crd_installed, &required_components_ready) {
            (Readiness::Unknown { .. }, _) | (_, Readiness::Unknown { .. }) => Verdict::Unknown,
            (Readiness::Missing { .. }, _) | (_, Readiness::Missing { .. }) => Verdict::NotReady,
            _ if external_agent.is_some() => Verdict::NeedsExternalConfirmation,
            _ => Verdict::Ready,
        };

        let external_requirements_note = if reqs.external_requirements.is_empty() {
            String::new()
        } else {
            reqs.external_requirements.join(". ")
        };

        KindCapability {
            kind: kind.resource_kind(),
            crd_installed,
            required_components_ready,
            optional_components_ready,
            external_agent,
            components,
            external_requirements_note,
            requirements: reqs,
            verdict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InMemoryCluster;
    use crate::error::ClusterError;

    fn checker(cluster: InMemoryCluster) -> (Arc<InMemoryCluster>, CapabilityChecker) {
        let cluster = Arc::new(cluster);
        let checker = CapabilityChecker::new(cluster.clone(), "chaos-mesh");
        (cluster, checker)
    }

    #[test]
    fn installed_cluster_is_ready() {
        let (_, c) = checker(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
        let report = c.check_all();
        assert!(report.cluster_reachable.is_ready());
        for k in &report.kinds {
            assert!(k.crd_installed.is_ready(), "{}", k.kind);
            assert!(k.required_components_ready.is_ready(), "{}", k.kind);
        }
        assert_eq!(report.kind(ChaosKind::Network).unwrap().verdict, Verdict::Ready);
    }

    #[test]
    fn physical_is_never_claimed_ready() {
        let (_, c) = checker(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
        let cap = c.check_one(ChaosKind::PhysicalMachine);
        assert_eq!(cap.verdict, Verdict::NeedsExternalConfirmation);
        assert!(matches!(cap.external_agent, Some(Readiness::Unverifiable { .. })));
        assert!(!cap.external_requirements_note.is_empty());
    }

    #[test]
    fn dns_needs_dns_server() {
        let (cluster, c) = checker(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
        cluster.set_pods(
            "chaos-mesh",
            vec![
                PodSummary::new("chaos-controller-manager-1", "Running", true),
                PodSummary::new("chaos-daemon-1", "Running", true),
            ],
        );
        let dns = c.check_one(ChaosKind::DNS);
        assert!(matches!(dns.required_components_ready, Readiness::Missing { .. }));
        assert_eq!(dns.verdict, Verdict::NotReady);
        assert!(matches!(dns.optional_components_ready, Readiness::Missing { .. }));

        let net = c.check_one(ChaosKind::Network);
        assert_eq!(net.verdict, Verdict::Ready);
    }

    #[test]
    fn running_pod_must_also_be_ready() {
        let (cluster, c) = checker(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
        cluster.set_pods(
            "chaos-mesh",
            vec![
                PodSummary::new("chaos-controller-manager-1", "Running", true),
                PodSummary::new("chaos-daemon-1", "Running", false),
            ],
        );
        let net = c.check_one(ChaosKind::Network);
        match &net.required_components_ready {
            Readiness::Missing { detail } => {
                assert!(detail.contains("running and ready chaos-daemon"), "{detail}")
            }
            other => panic!("expected missing, got {other:?}"),
        }
        assert_eq!(net.verdict, Verdict::NotReady);

        cluster.set_pods(
            "chaos-mesh",
            vec![
                PodSummary::new("chaos-controller-manager-1", "Running", true),
                PodSummary::new("chaos-daemon-1", "Running", false),
                PodSummary::new("chaos-daemon-2", "Running", true),
            ],
        );
        assert_eq!(c.check_one(ChaosKind::Network).verdict, Verdict::Ready);
    }

    #[test]
    fn unreachable_is_unknown_everywhere() {
        let (cluster, c) = checker(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
        cluster.set_unreachable("dial tcp 10.0.0.1:6443: connect: connection refused");
        let report = c.check_all();
        assert!(matches!(report.cluster_reachable, Readiness::Unknown { .. }));
        for k in &report.kinds {
            assert!(matches!(k.crd_installed, Readiness::Unknown { .. }));
            assert!(matches!(k.required_components_ready, Readiness::Unknown { .. }));
            assert_eq!(k.verdict, Verdict::Unknown);
        }
    }

    #[test]
    fn failing_query_degrades_only_its_checks() {
        let (cluster, c) = checker(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
        cluster.fail_on(
            "list_pods",
            ClusterError::PermissionDenied {
                cause: "pods is forbidden".into(),
            },
        );
        let net = c.check_one(ChaosKind::Network);
        assert!(net.crd_installed.is_ready());
        match &net.required_components_ready {
            Readiness::Unknown { cause } => assert!(cause.contains("forbidden")),
            other => panic!("expected unknown, got {other:?}"),
        }
        assert_eq!(net.verdict, Verdict::Unknown);
    }

    #[test]
    fn missing_crd_is_not_ready() {
        let (cluster, c) = checker(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
        cluster.set_crds(vec![ChaosKind::Pod.crd_name()]);
        assert_eq!(c.check_one(ChaosKind::Network).verdict, Verdict::NotReady);
        assert_eq!(c.check_one(ChaosKind::Pod).verdict, Verdict::Ready);
    }

    #[test]
    fn never_cached() {
        let (cluster, c) = checker(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
        assert_eq!(c.check_one(ChaosKind::Pod).verdict, Verdict::Ready);
        cluster.set_crds(Vec::new());
        assert_eq!(c.check_one(ChaosKind::Pod).verdict, Verdict::NotReady);
    }
}
