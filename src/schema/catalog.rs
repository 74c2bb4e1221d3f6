//! Built-in field specifications for every chaos action.
//!
//! Field names are snake_case on input; the renderer maps them to the
//! resource's own spelling.

use serde_json::json;

use super::{CrossFieldRule, Field, FieldDomain};
use crate::kind::{ChaosAction, ChaosKind};
use crate::target::SelectorMode;

/// One uncompiled catalog entry.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub action: ChaosAction,
    pub fields: Vec<Field>,
    pub rules: Vec<CrossFieldRule>,
}

const DIRECTIONS: &[&str] = &["to", "from", "both"];

pub const IO_METHODS: &[&str] = &[
    "lookup", "forget", "getattr", "setattr", "readlink", "mknod", "mkdir", "unlink", "rmdir",
    "symlink", "rename", "link", "open", "read", "write", "statfs", "release", "fsync",
    "setxattr", "getxattr", "listxattr", "removexattr", "flush", "opendir", "readdir",
    "releasedir", "fsyncdir", "access", "create", "getlk", "setlk", "bmap",
];

pub const HTTP_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "CONNECT", "TRACE",
];

const HTTP_TARGETS: &[&str] = &["Request", "Response"];

const FILLINGS: &[&str] = &["zero", "random"];

const CLOCK_IDS: &[&str] = &[
    "CLOCK_REALTIME",
    "CLOCK_MONOTONIC",
    "CLOCK_PROCESS_CPUTIME_ID",
    "CLOCK_THREAD_CPUTIME_ID",
    "CLOCK_MONOTONIC_RAW",
    "CLOCK_REALTIME_COARSE",
    "CLOCK_MONOTONIC_COARSE",
    "CLOCK_BOOTTIME",
    "CLOCK_REALTIME_ALARM",
    "CLOCK_BOOTTIME_ALARM",
];

fn int(min: i64, max: i64) -> FieldDomain {
    FieldDomain::Integer { min, max }
}

fn one_of(values: &'static [&'static str]) -> FieldDomain {
    FieldDomain::Enum {
        values,
        case_insensitive: true,
    }
}

/// Fields every action of `kind` accepts besides its own.
fn envelope(kind: ChaosKind) -> Vec<Field> {
    let default_mode = match kind {
        ChaosKind::Pod | ChaosKind::PhysicalMachine => "one",
        _ => "all",
    };
    let mut fields = vec![
        Field::required(
            "duration",
            FieldDomain::Duration,
            "How long the fault lasts before automatic recovery (e.g. 30s, 5m, 1h)",
        ),
        Field::optional(
            "mode",
            one_of(&SelectorMode::NAMES),
            "Which of the matching targets are affected",
        )
        .default(json!(default_mode)),
        Field::optional(
            "value",
            int(1, i64::from(u32::MAX)),
            "Count (fixed) or percentage (fixed-percent, random-max-percent) for the mode",
        ),
        Field::optional(
            "name",
            FieldDomain::ResourceName,
            "Experiment name; generated when omitted",
        ),
        Field::optional(
            "namespace",
            FieldDomain::Namespace,
            "Namespace the experiment resource is created in",
        )
        .default(json!("default")),
    ];
    if kind.targets_pods() {
        fields.push(
            Field::optional(
                "target",
                FieldDomain::Target,
                "Pods to affect: namespace plus label selector",
            )
            .alias(&["selector"]),
        );
    } else {
        fields.push(
            Field::required(
                "address",
                FieldDomain::Addresses,
                "Chaosd agent addresses as host:port, without a scheme",
            )
            .alias(&["addresses"]),
        );
    }
    fields
}

fn entry(action: ChaosAction, own: Vec<Field>, rules: Vec<CrossFieldRule>) -> CatalogEntry {
    let mut fields = envelope(action.kind());
    fields.extend(own);
    let mut all_rules = vec![CrossFieldRule::ModeValue];
    all_rules.extend(rules);
    CatalogEntry {
        action,
        fields,
        rules: all_rules,
    }
}

fn direction(default: &'static str) -> Field {
    Field::optional("direction", one_of(DIRECTIONS), "Traffic direction: to, from or both")
        .default(json!(default))
}

fn correlation() -> Field {
    Field::optional(
        "correlation",
        FieldDomain::Percent,
        "Correlation with the previous packet's outcome (0-100)",
    )
    .default(json!(0))
}

fn external_targets() -> Field {
    Field::optional(
        "external_targets",
        FieldDomain::StringList { non_empty: false },
        "Hosts or IPs outside the cluster to include",
    )
}

/// Fields shared by the four IO actions.
fn io_common() -> Vec<Field> {
    vec![
        Field::required(
            "volume_path",
            FieldDomain::AbsolutePath,
            "Mount point of the volume inside the container",
        ),
        Field::required(
            "path",
            FieldDomain::NonEmptyString,
            "File path or glob to affect (e.g. /data/**/*)",
        ),
        Field::optional(
            "percent",
            FieldDomain::Percent,
            "Probability of affecting each operation",
        )
        .default(json!(100)),
        Field::optional(
            "methods",
            FieldDomain::EnumList { values: IO_METHODS },
            "Filesystem operations to affect; all when omitted",
        ),
    ]
}

/// Fields shared by the four HTTP actions.
fn http_common() -> Vec<Field> {
    vec![
        Field::required("port", int(1, 65535), "Port the target service listens on"),
        Field::optional(
            "http_target",
            FieldDomain::Enum {
                values: HTTP_TARGETS,
                case_insensitive: true,
            },
            "Side of the exchange to act on: Request or Response",
        )
        .default(json!("Request")),
        Field::optional(
            "method",
            one_of(HTTP_METHODS),
            "HTTP method to match; all methods when omitted",
        ),
        Field::optional("path", FieldDomain::NonEmptyString, "URI path to match (e.g. /api/*)"),
        Field::optional(
            "request_headers",
            FieldDomain::StringMap,
            "Request headers that must match",
        ),
    ]
}

fn dns_patterns() -> Field {
    Field::optional(
        "patterns",
        FieldDomain::DnsPatterns,
        "Domains to affect; all domains when omitted",
    )
}

fn memory_size(name: &'static str, required: bool, what: &'static str) -> Field {
    if required {
        Field::required(name, FieldDomain::MemorySize, what)
    } else {
        Field::optional(name, FieldDomain::MemorySize, what)
    }
}

pub(crate) fn build_catalog() -> Vec<CatalogEntry> {
    use ChaosAction::*;
    vec![
        // -- Network --
        entry(
            NetworkDelay,
            vec![
                Field::required("latency", FieldDomain::Duration, "Added latency (e.g. 100ms)")
                    .alias(&["delay"]),
                Field::optional("jitter", FieldDomain::Duration, "Latency variation")
                    .default(json!("0ms")),
                correlation(),
                direction("to"),
                external_targets(),
            ],
            vec![CrossFieldRule::RequiresAll {
                field: "correlation",
                requires: &["jitter"],
            }],
        ),
        entry(
            NetworkLoss,
            vec![
                Field::required("loss", FieldDomain::Percent, "Packet loss percentage"),
                correlation(),
                direction("to"),
            ],
            vec![],
        ),
        entry(NetworkPartition, vec![direction("both"), external_targets()], vec![]),
        entry(
            NetworkCorrupt,
            vec![
                Field::required("corrupt", FieldDomain::Percent, "Packet corruption percentage"),
                correlation(),
                direction("to"),
            ],
            vec![],
        ),
        // -- Stress --
        entry(
            StressCpu,
            vec![
                Field::required("workers", int(1, 16), "Number of CPU stress workers"),
                Field::optional("load", FieldDomain::Percent, "Load per worker (0-100)"),
            ],
            vec![],
        ),
        entry(
            StressMemory,
            vec![
                memory_size("size", true, "Memory to allocate per worker (e.g. 256MB)"),
                Field::optional("workers", int(1, 8), "Number of memory stress workers")
                    .default(json!(1)),
            ],
            vec![],
        ),
        entry(
            StressCombined,
            vec![
                Field::required("cpu_workers", int(1, 16), "Number of CPU stress workers"),
                Field::optional("cpu_load", FieldDomain::Percent, "Load per CPU worker"),
                Field::required("memory_workers", int(1, 8), "Number of memory stress workers"),
                memory_size("memory_size", true, "Memory per worker (e.g. 256MB)"),
            ],
            vec![],
        ),
        // -- Pod --
        entry(
            PodKill,
            vec![
                Field::optional(
                    "grace_period",
                    int(0, i64::MAX),
                    "Seconds to wait before force-killing the pod",
                )
                .default(json!(0)),
            ],
            vec![],
        ),
        entry(PodFailure, vec![], vec![]),
        entry(
            ContainerKill,
            vec![Field::required(
                "container_names",
                FieldDomain::StringList { non_empty: true },
                "Containers to kill inside each selected pod",
            )],
            vec![],
        ),
        // -- IO --
        entry(
            IoLatency,
            [
                io_common(),
                vec![Field::required("delay", FieldDomain::Duration, "Delay added to each operation")],
            ]
            .concat(),
            vec![],
        ),
        entry(
            IoFault,
            [
                io_common(),
                vec![Field::required(
                    "errno",
                    int(0, 4095),
                    "Error number returned (e.g. 5 EIO, 28 ENOSPC)",
                )],
            ]
            .concat(),
            vec![],
        ),
        entry(
            IoAttrOverride,
            [
                io_common(),
                vec![
                    Field::optional("perm", int(0, 0o7777), "Permission bits to report (decimal)"),
                    Field::optional("size", int(0, i64::MAX), "File size to report, in bytes"),
                ],
            ]
            .concat(),
            vec![CrossFieldRule::AtLeastOneOf(&["perm", "size"])],
        ),
        entry(
            IoMistake,
            [
                io_common(),
                vec![
                    Field::optional("filling", one_of(FILLINGS), "Fill with zero or random bytes")
                        .default(json!("zero")),
                    Field::optional("max_occurrences", int(1, i64::MAX), "Mistakes per operation")
                        .default(json!(1)),
                    Field::optional("max_length", int(1, i64::MAX), "Maximum bytes per mistake")
                        .default(json!(1)),
                ],
            ]
            .concat(),
            vec![],
        ),
        // -- HTTP --
        entry(HttpAbort, http_common(), vec![]),
        entry(
            HttpDelay,
            [
                http_common(),
                vec![Field::required("delay", FieldDomain::Duration, "Delay added to each exchange")],
            ]
            .concat(),
            vec![],
        ),
        entry(
            HttpReplace,
            [
                http_common(),
                vec![
                    Field::optional(
                        "replace_headers",
                        FieldDomain::StringMap,
                        "Headers to overwrite",
                    ),
                    Field::optional("replace_body", FieldDomain::Text, "Body to substitute"),
                ],
            ]
            .concat(),
            vec![CrossFieldRule::AtLeastOneOf(&["replace_headers", "replace_body"])],
        ),
        entry(
            HttpPatch,
            [
                http_common(),
                vec![
                    Field::optional(
                        "patch_headers",
                        FieldDomain::HeaderPairs,
                        "Headers to append, as [name, value] pairs",
                    ),
                    Field::optional(
                        "patch_body_value",
                        FieldDomain::NonEmptyString,
                        "JSON merged into the body",
                    ),
                ],
            ]
            .concat(),
            vec![CrossFieldRule::AtLeastOneOf(&["patch_headers", "patch_body_value"])],
        ),
        // -- DNS --
        entry(DnsError, vec![dns_patterns()], vec![]),
        entry(DnsRandom, vec![dns_patterns()], vec![]),
        // -- Physical machine --
        entry(
            PhysicalStressCpu,
            vec![
                Field::optional("workers", int(1, 64), "Number of CPU stress workers")
                    .default(json!(1)),
                Field::optional("load", FieldDomain::Percent, "Load per worker (0-100)"),
            ],
            vec![],
        ),
        entry(
            PhysicalStressMemory,
            vec![memory_size(
                "size",
                false,
                "Memory to allocate (e.g. 1GB); all available memory when omitted",
            )],
            vec![],
        ),
        entry(
            PhysicalDiskFill,
            vec![
                Field::required("path", FieldDomain::AbsolutePath, "Directory to fill"),
                memory_size("size", true, "Amount of data to write (e.g. 10GB)"),
                Field::optional(
                    "fill_by_fallocate",
                    FieldDomain::Bool,
                    "Allocate with fallocate instead of writing",
                )
                .default(json!(true)),
            ],
            vec![],
        ),
        entry(
            PhysicalProcessKill,
            vec![
                Field::required(
                    "process",
                    FieldDomain::NonEmptyString,
                    "Process name or PID to signal",
                ),
                Field::optional("signal", int(1, 64), "Signal number (9 SIGKILL, 15 SIGTERM)")
                    .default(json!(9)),
            ],
            vec![],
        ),
        entry(
            PhysicalClockSkew,
            vec![
                Field::required(
                    "time_offset",
                    FieldDomain::SignedDuration,
                    "Offset applied to the clock (e.g. -10m, 5s)",
                ),
                Field::required("pid", int(1, i64::MAX), "Process whose clock is skewed"),
                Field::optional(
                    "clock_ids",
                    FieldDomain::EnumList { values: CLOCK_IDS },
                    "Clocks to skew",
                )
                .default(json!(["CLOCK_REALTIME"])),
            ],
            vec![],
        ),
    ]
}
