//! Manifest rendering: validated parameters to a Chaos Mesh resource document.
//!
//! Rendering never fails. Everything that could be wrong with the input was
//! rejected by the validator, so the mapping here is a plain translation into
//! the nesting and spelling the controller expects.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value, json};

use crate::duration::ChaosDuration;
use crate::kind::{API_VERSION, ChaosAction, ChaosKind};
use crate::schema::FieldValue;
use crate::target::{SelectorMode, TargetSelector, Targeting};
use crate::validate::NormalizedParams;

/// A rendered, submittable chaos experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentManifest {
    action: ChaosAction,
    name: String,
    namespace: String,
    duration: ChaosDuration,
    mode: SelectorMode,
    targeting: Targeting,
    parameters: Map<String, Value>,
}

impl ExperimentManifest {
    pub fn kind(&self) -> ChaosKind {
        self.action.kind()
    }

    pub fn action(&self) -> ChaosAction {
        self.action
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn duration(&self) -> ChaosDuration {
        self.duration
    }

    pub fn mode(&self) -> SelectorMode {
        self.mode
    }

    pub fn targeting(&self) -> &Targeting {
        &self.targeting
    }

    /// Fault parameters in the resource's own spelling.
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// The full resource document.
    ///
    /// Keys are sorted, so equal manifests serialize to identical bytes.
    pub fn document(&self) -> Value {
        let mut spec = self.parameters.clone();
        spec.insert("mode".into(), json!(self.mode.name()));
        if let Some(v) = self.mode.value() {
            spec.insert("value".into(), json!(v.to_string()));
        }
        spec.insert("duration".into(), json!(self.duration.to_string()));
        match &self.targeting {
            Targeting::Pods(sel) => {
                spec.insert("selector".into(), selector_json(sel));
            }
            Targeting::Machines(addrs) => {
                spec.insert("address".into(), json!(addrs.as_slice()));
            }
        }
        json!({
            "apiVersion": API_VERSION,
            "kind": self.kind().resource_kind(),
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
            },
            "spec": spec,
        })
    }

    /// Compact JSON of [`document`](Self::document).
    pub fn to_json(&self) -> String {
        self.document().to_string()
    }
}

/// Build the manifest for validated parameters.
///
/// When `name` is `None` the name from the parameters is used, and failing
/// that one is generated as `<kind>-<action>-<8 hex digits>`.
pub fn render(
    params: &NormalizedParams,
    targeting: &Targeting,
    namespace: &str,
    name: Option<&str>,
) -> ExperimentManifest {
    let name = name
        .or(params.name())
        .map(str::to_string)
        .unwrap_or_else(|| generate_name(params.action()));
    ExperimentManifest {
        action: params.action(),
        name,
        namespace: namespace.to_string(),
        duration: params.duration(),
        mode: params.mode(),
        targeting: targeting.clone(),
        parameters: fault_parameters(params),
    }
}

/// A fresh experiment name for `action`.
pub fn generate_name(action: ChaosAction) -> String {
    format!(
        "{}-{}-{:08x}",
        action.kind().slug(),
        action.tool_suffix().replace('_', "-"),
        rand::random::<u32>()
    )
}

fn selector_json(sel: &TargetSelector) -> Value {
    json!({
        "namespaces": [sel.namespace],
        "labelSelectors": sel.label_selector,
    })
}

/// Insert `key` if the field is present.
fn copy(out: &mut Map<String, Value>, key: &str, value: Option<&FieldValue>) {
    if let Some(v) = value {
        out.insert(key.to_string(), v.to_json());
    }
}

/// Insert `key` as a string (the controller takes several numbers as strings).
fn copy_str(out: &mut Map<String, Value>, key: &str, value: Option<&FieldValue>) {
    if let Some(v) = value {
        out.insert(key.to_string(), Value::String(v.to_string()));
    }
}

fn object(build: impl FnOnce(&mut Map<String, Value>)) -> Value {
    let mut m = Map::new();
    build(&mut m);
    Value::Object(m)
}

fn fault_parameters(p: &NormalizedParams) -> Map<String, Value> {
    use ChaosAction::*;

    let mut out = Map::new();
    let action = p.action();
    if has_action_field(action.kind()) {
        out.insert("action".into(), json!(action.name()));
    }

    match action.kind() {
        ChaosKind::Network => {
            copy(&mut out, "direction", p.get("direction"));
            copy(&mut out, "externalTargets", p.get("external_targets"));
            match action {
                NetworkDelay => {
                    let delay = object(|m| {
                        copy(m, "latency", p.get("latency"));
                        copy(m, "jitter", p.get("jitter"));
                        copy_str(m, "correlation", p.get("correlation"));
                    });
                    out.insert("delay".into(), delay);
                }
                NetworkLoss => {
                    let loss = object(|m| {
                        copy_str(m, "loss", p.get("loss"));
                        copy_str(m, "correlation", p.get("correlation"));
                    });
                    out.insert("loss".into(), loss);
                }
                NetworkCorrupt => {
                    let corrupt = object(|m| {
                        copy_str(m, "corrupt", p.get("corrupt"));
                        copy_str(m, "correlation", p.get("correlation"));
                    });
                    out.insert("corrupt".into(), corrupt);
                }
                _ => {}
            }
        }
        ChaosKind::Stress => {
            let mut stressors = Map::new();
            match action {
                StressCpu => {
                    stressors.insert("cpu".into(), cpu_stressor(p.get("workers"), p.get("load")));
                }
                StressMemory => {
                    stressors.insert(
                        "memory".into(),
                        memory_stressor(p.get("workers"), p.get("size")),
                    );
                }
                _ => {
                    stressors.insert(
                        "cpu".into(),
                        cpu_stressor(p.get("cpu_workers"), p.get("cpu_load")),
                    );
                    stressors.insert(
                        "memory".into(),
                        memory_stressor(p.get("memory_workers"), p.get("memory_size")),
                    );
                }
            }
            out.insert("stressors".into(), Value::Object(stressors));
            container_names_from_target(&mut out, p);
        }
        ChaosKind::Pod => match action {
            PodKill => copy(&mut out, "gracePeriod", p.get("grace_period")),
            ContainerKill => copy(&mut out, "containerNames", p.get("container_names")),
            _ => {}
        },
        ChaosKind::IO => {
            copy(&mut out, "volumePath", p.get("volume_path"));
            copy(&mut out, "path", p.get("path"));
            copy(&mut out, "percent", p.get("percent"));
            copy(&mut out, "methods", p.get("methods"));
            container_names_from_target(&mut out, p);
            match action {
                IoLatency => copy(&mut out, "delay", p.get("delay")),
                IoFault => copy(&mut out, "errno", p.get("errno")),
                IoAttrOverride => {
                    let attr = object(|m| {
                        copy(m, "perm", p.get("perm"));
                        copy(m, "size", p.get("size"));
                    });
                    out.insert("attr".into(), attr);
                }
                _ => {
                    let mistake = object(|m| {
                        copy(m, "filling", p.get("filling"));
                        copy(m, "maxOccurrences", p.get("max_occurrences"));
                        copy(m, "maxLength", p.get("max_length"));
                    });
                    out.insert("mistake".into(), mistake);
                }
            }
        }
        ChaosKind::HTTP => {
            copy(&mut out, "target", p.get("http_target"));
            copy(&mut out, "port", p.get("port"));
            copy(&mut out, "method", p.get("method"));
            copy(&mut out, "path", p.get("path"));
            copy(&mut out, "request_headers", p.get("request_headers"));
            match action {
                HttpAbort => {
                    out.insert("abort".into(), Value::Bool(true));
                }
                HttpDelay => copy(&mut out, "delay", p.get("delay")),
                HttpReplace => {
                    let replace = object(|m| {
                        copy(m, "headers", p.get("replace_headers"));
                        if let Some(body) = p.str("replace_body") {
                            m.insert("body".into(), json!(BASE64.encode(body)));
                        }
                    });
                    out.insert("replace".into(), replace);
                }
                _ => {
                    let patch = object(|m| {
                        copy(m, "headers", p.get("patch_headers"));
                        if let Some(value) = p.str("patch_body_value") {
                            m.insert("body".into(), json!({"type": "JSON", "value": value}));
                        }
                    });
                    out.insert("patch".into(), patch);
                }
            }
        }
        ChaosKind::DNS => copy(&mut out, "patterns", p.get("patterns")),
        ChaosKind::PhysicalMachine => {
            let (key, body) = match action {
                PhysicalStressCpu => (
                    "stress-cpu",
                    object(|m| {
                        copy(m, "workers", p.get("workers"));
                        copy(m, "load", p.get("load"));
                    }),
                ),
                PhysicalStressMemory => (
                    "stress-mem",
                    object(|m| copy(m, "size", p.get("size"))),
                ),
                PhysicalDiskFill => (
                    "disk-fill",
                    object(|m| {
                        copy(m, "path", p.get("path"));
                        copy(m, "size", p.get("size"));
                        copy(m, "fill-by-fallocate", p.get("fill_by_fallocate"));
                    }),
                ),
                PhysicalProcessKill => (
                    "process",
                    object(|m| {
                        copy(m, "process", p.get("process"));
                        copy(m, "signal", p.get("signal"));
                    }),
                ),
                _ => (
                    "clock",
                    object(|m| {
                        copy(m, "time-offset", p.get("time_offset"));
                        copy(m, "pid", p.get("pid"));
                        if let Some(ids) = p.get("clock_ids").and_then(FieldValue::as_list) {
                            m.insert("clock-ids-slice".into(), json!(ids.join(",")));
                        }
                    }),
                ),
            };
            out.insert(key.into(), body);
        }
    }
    out
}

/// Stress and HTTP chaos have no `action` on the resource.
fn has_action_field(kind: ChaosKind) -> bool {
    !matches!(kind, ChaosKind::Stress | ChaosKind::HTTP)
}

fn cpu_stressor(workers: Option<&FieldValue>, load: Option<&FieldValue>) -> Value {
    object(|m| {
        copy(m, "workers", workers);
        copy(m, "load", load);
    })
}

fn memory_stressor(workers: Option<&FieldValue>, size: Option<&FieldValue>) -> Value {
    object(|m| {
        copy(m, "workers", workers);
        copy(m, "size", size);
    })
}

fn container_names_from_target(out: &mut Map<String, Value>, p: &NormalizedParams) {
    if let Some(t) = p.target().filter(|t| !t.container_names.is_empty()) {
        out.insert("containerNames".into(), json!(t.container_names));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::SchemaRegistry;
    use crate::target::AddressList;
    use crate::validate::Validator;

    fn params(kind: ChaosKind, action: &str, raw: Value) -> NormalizedParams {
        Validator::new(Arc::new(SchemaRegistry::builtin().unwrap()))
            .validate(kind, action, &raw)
            .unwrap()
    }

    fn pods() -> Targeting {
        Targeting::Pods(TargetSelector::new(
            "default",
            [("app".to_string(), "api".to_string())],
        ))
    }

    #[test]
    fn network_delay_document() {
        let p = params(
            ChaosKind::Network,
            "delay",
            json!({"latency": "100ms", "jitter": "10ms", "correlation": "25", "duration": "5m"}),
        );
        let doc = render(&p, &pods(), "chaos-testing", Some("web-delay")).document();
        assert_eq!(doc["apiVersion"], "chaos-mesh.org/v1alpha1");
        assert_eq!(doc["kind"], "NetworkChaos");
        assert_eq!(doc["metadata"]["name"], "web-delay");
        assert_eq!(doc["metadata"]["namespace"], "chaos-testing");
        assert_eq!(doc["spec"]["action"], "delay");
        assert_eq!(doc["spec"]["mode"], "all");
        assert_eq!(doc["spec"]["duration"], "5m");
        assert_eq!(doc["spec"]["direction"], "to");
        assert_eq!(doc["spec"]["delay"]["latency"], "100ms");
        assert_eq!(doc["spec"]["delay"]["correlation"], "25");
        assert_eq!(doc["spec"]["selector"]["namespaces"], json!(["default"]));
        assert_eq!(doc["spec"]["selector"]["labelSelectors"]["app"], "api");
    }

    #[test]
    fn rendering_is_byte_identical() {
        let p = params(
            ChaosKind::IO,
            "mistake",
            json!({"volume_path": "/data", "path": "/data/**", "duration": "1m", "methods": ["read"]}),
        );
        let a = render(&p, &pods(), "default", Some("io-m")).to_json();
        let b = render(&p, &pods(), "default", Some("io-m")).to_json();
        assert_eq!(a, b);
    }

    #[test]
    fn generated_names() {
        let name = generate_name(ChaosAction::PhysicalClockSkew);
        let (prefix, suffix) = name.rsplit_once('-').unwrap();
        assert_eq!(prefix, "physical-clock-skew");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let p = params(ChaosKind::Pod, "pod-failure", json!({"duration": "30s"}));
        let a = render(&p, &pods(), "default", None);
        assert!(a.name().starts_with("pod-failure-"));
    }

    #[test]
    fn mode_value_is_a_string() {
        let p = params(
            ChaosKind::Pod,
            "pod-kill",
            json!({"duration": "30s", "mode": "fixed-percent", "value": 50}),
        );
        let doc = render(&p, &pods(), "default", Some("pk")).document();
        assert_eq!(doc["spec"]["mode"], "fixed-percent");
        assert_eq!(doc["spec"]["value"], "50");
        assert_eq!(doc["spec"]["action"], "pod-kill");
        assert_eq!(doc["spec"]["gracePeriod"], 0);
    }

    #[test]
    fn stress_has_no_action_and_nests_stressors() {
        let p = params(
            ChaosKind::Stress,
            "combined",
            json!({"duration": "1m", "cpu_workers": 2, "cpu_load": 50, "memory_workers": 1, "memory_size": "512MB"}),
        );
        let doc = render(&p, &pods(), "default", Some("s")).document();
        assert!(doc["spec"].get("action").is_none());
        assert_eq!(doc["spec"]["stressors"]["cpu"]["workers"], 2);
        assert_eq!(doc["spec"]["stressors"]["cpu"]["load"], 50);
        assert_eq!(doc["spec"]["stressors"]["memory"]["size"], "512MB");
    }

    #[test]
    fn http_replace_body_is_base64() {
        let p = params(
            ChaosKind::HTTP,
            "replace",
            json!({"duration": "1m", "port": 8080, "method": "get", "replace_body": "hello"}),
        );
        let doc = render(&p, &pods(), "default", Some("h")).document();
        assert_eq!(doc["spec"]["method"], "GET");
        assert_eq!(doc["spec"]["target"], "Request");
        assert_eq!(doc["spec"]["replace"]["body"], "aGVsbG8=");
    }

    #[test]
    fn http_patch_body() {
        let p = params(
            ChaosKind::HTTP,
            "patch",
            json!({"duration": "1m", "port": 80, "patch_body_value": "{\"ok\":false}", "patch_headers": [["X-Chaos", "1"]]}),
        );
        let doc = render(&p, &pods(), "default", Some("h")).document();
        assert_eq!(doc["spec"]["patch"]["body"]["type"], "JSON");
        assert_eq!(doc["spec"]["patch"]["headers"], json!([["X-Chaos", "1"]]));
    }

    #[test]
    fn physical_clock_document() {
        let p = params(
            ChaosKind::PhysicalMachine,
            "clock",
            json!({"address": ["10.0.0.5:31767"], "duration": "1m", "time_offset": "-10m", "pid": 1234,
                   "clock_ids": ["CLOCK_REALTIME", "clock_monotonic"]}),
        );
        let addrs = AddressList::parse(["10.0.0.5:31767"]).unwrap();
        let doc = render(&p, &Targeting::Machines(addrs), "default", Some("c")).document();
        assert_eq!(doc["kind"], "PhysicalMachineChaos");
        assert_eq!(doc["spec"]["action"], "clock");
        assert_eq!(doc["spec"]["mode"], "one");
        assert_eq!(doc["spec"]["address"], json!(["10.0.0.5:31767"]));
        assert_eq!(doc["spec"]["clock"]["time-offset"], "-10m");
        assert_eq!(doc["spec"]["clock"]["clock-ids-slice"], "CLOCK_REALTIME,CLOCK_MONOTONIC");
        assert!(doc["spec"].get("selector").is_none());
    }
}
