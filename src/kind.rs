//! Chaos kinds and their actions.
//!
//! The kind × action space is closed: every [`ChaosAction`] belongs to exactly
//! one [`ChaosKind`], and every kind maps to exactly one Chaos Mesh resource type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// API group/version shared by every chaos resource.
pub const API_VERSION: &str = "chaos-mesh.org/v1alpha1";

/// A fault category, one per Chaos Mesh custom resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChaosKind {
    Network,
    Stress,
    Pod,
    IO,
    HTTP,
    DNS,
    PhysicalMachine,
}

impl ChaosKind {
    pub const ALL: [ChaosKind; 7] = [
        ChaosKind::Network,
        ChaosKind::Stress,
        ChaosKind::Pod,
        ChaosKind::IO,
        ChaosKind::HTTP,
        ChaosKind::DNS,
        ChaosKind::PhysicalMachine,
    ];

    /// The resource `kind` on the cluster (e.g. `NetworkChaos`).
    pub fn resource_kind(self) -> &'static str {
        match self {
            Self::Network => "NetworkChaos",
            Self::Stress => "StressChaos",
            Self::Pod => "PodChaos",
            Self::IO => "IOChaos",
            Self::HTTP => "HTTPChaos",
            Self::DNS => "DNSChaos",
            Self::PhysicalMachine => "PhysicalMachineChaos",
        }
    }

    /// Lowercase resource name used on the command line (e.g. `networkchaos`).
    pub fn resource_name(self) -> String {
        self.resource_kind().to_ascii_lowercase()
    }

    /// Name of the custom resource definition (e.g. `networkchaos.chaos-mesh.org`).
    pub fn crd_name(self) -> String {
        format!("{}.chaos-mesh.org", self.resource_name())
    }

    /// Short slug used in tool names and generated experiment names.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Stress => "stress",
            Self::Pod => "pod",
            Self::IO => "io",
            Self::HTTP => "http",
            Self::DNS => "dns",
            Self::PhysicalMachine => "physical",
        }
    }

    /// Whether experiments of this kind target pods (as opposed to machines).
    pub fn targets_pods(self) -> bool {
        !matches!(self, Self::PhysicalMachine)
    }

    /// Actions belonging to this kind, in declaration order.
    pub fn actions(self) -> impl Iterator<Item = ChaosAction> {
        ChaosAction::ALL.into_iter().filter(move |a| a.kind() == self)
    }

    /// Parse a kind from a slug, resource kind, or CRD name.
    ///
    /// Accepts `network`, `NetworkChaos`, `networkchaos.chaos-mesh.org`,
    /// and `physical`/`physicalmachine` for machine chaos.
    pub fn parse(s: &str) -> Option<Self> {
        let norm = normalize(s);
        let norm = norm.strip_suffix("chaosmeshorg").unwrap_or(&norm);
        let norm = norm.strip_suffix("chaos").unwrap_or(norm);
        Self::ALL.into_iter().find(|k| {
            normalize(k.slug()) == norm
                || normalize(k.resource_kind()).trim_end_matches("chaos") == norm
        })
    }

    /// Resolve a resource document's `kind` field (e.g. `"PodChaos"`).
    pub fn from_resource_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.resource_kind() == kind)
    }

    /// Inverse of [`crd_name`](Self::crd_name).
    pub fn from_crd_name(crd: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.crd_name() == crd)
    }
}

impl fmt::Display for ChaosKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_kind())
    }
}

/// A fault action. Only meaningful within its own [`ChaosKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChaosAction {
    NetworkDelay,
    NetworkLoss,
    NetworkPartition,
    NetworkCorrupt,
    StressCpu,
    StressMemory,
    StressCombined,
    PodKill,
    PodFailure,
    ContainerKill,
    IoLatency,
    IoFault,
    IoAttrOverride,
    IoMistake,
    HttpAbort,
    HttpDelay,
    HttpReplace,
    HttpPatch,
    DnsError,
    DnsRandom,
    PhysicalStressCpu,
    PhysicalStressMemory,
    PhysicalDiskFill,
    PhysicalProcessKill,
    PhysicalClockSkew,
}

impl ChaosAction {
    pub const ALL: [ChaosAction; 25] = [
        ChaosAction::NetworkDelay,
        ChaosAction::NetworkLoss,
        ChaosAction::NetworkPartition,
        ChaosAction::NetworkCorrupt,
        ChaosAction::StressCpu,
        ChaosAction::StressMemory,
        ChaosAction::StressCombined,
        ChaosAction::PodKill,
        ChaosAction::PodFailure,
        ChaosAction::ContainerKill,
        ChaosAction::IoLatency,
        ChaosAction::IoFault,
        ChaosAction::IoAttrOverride,
        ChaosAction::IoMistake,
        ChaosAction::HttpAbort,
        ChaosAction::HttpDelay,
        ChaosAction::HttpReplace,
        ChaosAction::HttpPatch,
        ChaosAction::DnsError,
        ChaosAction::DnsRandom,
        ChaosAction::PhysicalStressCpu,
        ChaosAction::PhysicalStressMemory,
        ChaosAction::PhysicalDiskFill,
        ChaosAction::PhysicalProcessKill,
        ChaosAction::PhysicalClockSkew,
    ];

    pub fn kind(self) -> ChaosKind {
        use ChaosAction::*;
        match self {
            NetworkDelay | NetworkLoss | NetworkPartition | NetworkCorrupt => ChaosKind::Network,
            StressCpu | StressMemory | StressCombined => ChaosKind::Stress,
            PodKill | PodFailure | ContainerKill => ChaosKind::Pod,
            IoLatency | IoFault | IoAttrOverride | IoMistake => ChaosKind::IO,
            HttpAbort | HttpDelay | HttpReplace | HttpPatch => ChaosKind::HTTP,
            DnsError | DnsRandom => ChaosKind::DNS,
            PhysicalStressCpu | PhysicalStressMemory | PhysicalDiskFill | PhysicalProcessKill
            | PhysicalClockSkew => ChaosKind::PhysicalMachine,
        }
    }

    /// The action value as the platform spells it in `spec.action`.
    ///
    /// Stress and HTTP chaos have no `action` field on the resource; their
    /// names here only identify the action within this crate.
    pub fn name(self) -> &'static str {
        use ChaosAction::*;
        match self {
            NetworkDelay => "delay",
            NetworkLoss => "loss",
            NetworkPartition => "partition",
            NetworkCorrupt => "corrupt",
            StressCpu => "cpu",
            StressMemory => "memory",
            StressCombined => "combined",
            PodKill => "pod-kill",
            PodFailure => "pod-failure",
            ContainerKill => "container-kill",
            IoLatency => "latency",
            IoFault => "fault",
            IoAttrOverride => "attrOverride",
            IoMistake => "mistake",
            HttpAbort => "abort",
            HttpDelay => "delay",
            HttpReplace => "replace",
            HttpPatch => "patch",
            DnsError => "error",
            DnsRandom => "random",
            PhysicalStressCpu => "stress-cpu",
            PhysicalStressMemory => "stress-mem",
            PhysicalDiskFill => "disk-fill",
            PhysicalProcessKill => "process",
            PhysicalClockSkew => "clock",
        }
    }

    /// Snake-case suffix of the creation tool (`create_<kind>_<tool_suffix>`).
    pub fn tool_suffix(self) -> &'static str {
        use ChaosAction::*;
        match self {
            NetworkDelay => "delay",
            NetworkLoss => "loss",
            NetworkPartition => "partition",
            NetworkCorrupt => "corrupt",
            StressCpu => "cpu",
            StressMemory => "memory",
            StressCombined => "combined",
            PodKill => "kill",
            PodFailure => "failure",
            ContainerKill => "container_kill",
            IoLatency => "latency",
            IoFault => "fault",
            IoAttrOverride => "attr_override",
            IoMistake => "mistake",
            HttpAbort => "abort",
            HttpDelay => "delay",
            HttpReplace => "replace",
            HttpPatch => "patch",
            DnsError => "error",
            DnsRandom => "random",
            PhysicalStressCpu => "stress_cpu",
            PhysicalStressMemory => "stress_memory",
            PhysicalDiskFill => "disk_fill",
            PhysicalProcessKill => "process_kill",
            PhysicalClockSkew => "clock_skew",
        }
    }

    /// Name of the tool that creates experiments of this action.
    pub fn tool_name(self) -> String {
        match self {
            // Reads better than `create_pod_container_kill`.
            Self::ContainerKill => "create_container_kill".to_string(),
            _ => format!("create_{}_{}", self.kind().slug(), self.tool_suffix()),
        }
    }

    /// Parse an action name within a kind.
    ///
    /// Matching ignores case, `-` and `_`, and accepts both the platform
    /// spelling and the tool suffix: `stressCpu`, `stress_cpu` and `stress-cpu`
    /// all resolve to [`ChaosAction::PhysicalStressCpu`].
    pub fn parse(kind: ChaosKind, s: &str) -> Option<Self> {
        let norm = normalize(s);
        kind.actions()
            .find(|a| normalize(a.name()) == norm || normalize(a.tool_suffix()) == norm)
    }
}

impl fmt::Display for ChaosAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '-' && *c != '_' && *c != '.')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
