//! Lifecycle and capability tools.

use serde_json::json;

use super::{
    DangerLevel, Tool, ToolContext, ToolInput, ToolOutput, ToolParam, ToolRegistry, ToolSignature,
    parse_kind,
};
use crate::error::{ToolResult, ValidationError};
use crate::kind::ChaosKind;
use crate::target;

/// Register the eight non-creation tools.
pub fn register(registry: &mut ToolRegistry) {
    registry.register(Box::new(GetStatusTool));
    registry.register(Box::new(ListExperimentsTool));
    registry.register(Box::new(DeleteTool));
    registry.register(Box::new(PauseTool));
    registry.register(Box::new(ResumeTool));
    registry.register(Box::new(EventsTool));
    registry.register(Box::new(ValidateEnvironmentTool));
    registry.register(Box::new(KindRequirementsTool));
}

fn experiment_id_param() -> ToolParam {
    ToolParam::new("experiment_id", "string", true, "Name of the experiment.")
}

fn namespace_param() -> ToolParam {
    ToolParam::new(
        "namespace",
        "string",
        false,
        "Namespace of the experiment (default: the configured default namespace).",
    )
}

fn kind_hint_param() -> ToolParam {
    ToolParam::new(
        "kind",
        "string",
        false,
        "Chaos kind (e.g. NetworkChaos or network); every kind is searched in the same \
         request when omitted.",
    )
}

const EXPERIMENT_KEYS: &[&str] = &["experiment_id", "namespace", "kind"];

fn experiment_id(input: &ToolInput) -> ToolResult<&str> {
    let name = input.require_str("experiment_id")?;
    target::check_resource_name(name)
        .map_err(|e| ValidationError::invalid("experiment_id", e.to_string()))?;
    Ok(name)
}

/// `(experiment_id, namespace, kind hint)` from the input, allowing `extra` keys.
fn experiment_ref<'a>(
    ctx: &'a ToolContext,
    input: &'a ToolInput,
    extra: &[&str],
) -> ToolResult<(&'a str, &'a str, Option<ChaosKind>)> {
    let allowed: Vec<&str> = EXPERIMENT_KEYS.iter().chain(extra).copied().collect();
    input.deny_unknown(&allowed)?;
    Ok((experiment_id(input)?, ctx.namespace(input)?, parse_kind(input)?))
}

fn kinds_json(kinds: &[ChaosKind]) -> Vec<&'static str> {
    kinds.iter().map(|k| k.resource_kind()).collect()
}

fn experiment_signature(name: &str, description: &str, danger: DangerLevel) -> ToolSignature {
    ToolSignature {
        name: name.into(),
        description: description.into(),
        danger,
        parameters: vec![experiment_id_param(), namespace_param(), kind_hint_param()],
    }
}

/// Current phase, message and (on request) events of one experiment.
pub struct GetStatusTool;

impl Tool for GetStatusTool {
    fn signature(&self) -> ToolSignature {
        let mut sig = experiment_signature(
            "get_experiment_status",
            "Get the phase, start time, controller message and injected target count of a \
             chaos experiment.",
            DangerLevel::Safe,
        );
        sig.parameters.push(
            ToolParam::new(
                "include_events",
                "boolean",
                false,
                "Also fetch the experiment's events (a second cluster request).",
            )
            .with_default(json!(false)),
        );
        sig
    }

    fn execute(&self, ctx: &ToolContext, input: ToolInput) -> ToolResult<ToolOutput> {
        let (name, namespace, kind) = experiment_ref(ctx, &input, &["include_events"])?;
        let with_events = input.bool("include_events")?.unwrap_or(false);
        let status = ctx.manager().status(name, namespace, kind, with_events)?;
        Ok(ToolOutput::json(&status))
    }
}

pub struct ListExperimentsTool;

impl Tool for ListExperimentsTool {
    fn signature(&self) -> ToolSignature {
        ToolSignature {
            name: "list_active_experiments".into(),
            description: "List chaos experiments that are running, paused or not yet \
                          reported on, with their phases."
                .into(),
            danger: DangerLevel::Safe,
            parameters: vec![
                namespace_param(),
                ToolParam::new("kind", "string", false, "Only list experiments of this kind."),
                ToolParam::new(
                    "all_namespaces",
                    "boolean",
                    false,
                    "List across every namespace; `namespace` is ignored.",
                )
                .with_default(json!(false)),
                ToolParam::new(
                    "include_finished",
                    "boolean",
                    false,
                    "Also list finished and failed experiments.",
                )
                .with_default(json!(false)),
            ],
        }
    }

    fn execute(&self, ctx: &ToolContext, input: ToolInput) -> ToolResult<ToolOutput> {
        input.deny_unknown(&["namespace", "kind", "all_namespaces", "include_finished"])?;
        let kind = parse_kind(&input)?;
        let namespace = if input.bool("all_namespaces")?.unwrap_or(false) {
            None
        } else {
            Some(ctx.namespace(&input)?)
        };
        let active_only = !input.bool("include_finished")?.unwrap_or(false);
        let experiments = ctx.manager().list(namespace, kind, active_only)?;
        Ok(ToolOutput::ok(json!({
            "count": experiments.len(),
            "experiments": experiments,
        })))
    }
}

pub struct DeleteTool;

impl Tool for DeleteTool {
    fn signature(&self) -> ToolSignature {
        experiment_signature(
            "delete_experiment",
            "Delete a chaos experiment; the controller recovers every injected fault.",
            DangerLevel::Cautious,
        )
    }

    fn execute(&self, ctx: &ToolContext, input: ToolInput) -> ToolResult<ToolOutput> {
        let (name, namespace, kind) = experiment_ref(ctx, &input, &[])?;
        let kinds = ctx.manager().delete(name, namespace, kind)?;
        Ok(ToolOutput::ok(json!({
            "status": "deleted",
            "experiment_id": name,
            "kinds": kinds_json(&kinds),
            "namespace": namespace,
        })))
    }
}

pub struct PauseTool;

impl Tool for PauseTool {
    fn signature(&self) -> ToolSignature {
        experiment_signature(
            "pause_experiment",
            "Pause a running chaos experiment; injected faults are recovered until it resumes.",
            DangerLevel::Cautious,
        )
    }

    fn execute(&self, ctx: &ToolContext, input: ToolInput) -> ToolResult<ToolOutput> {
        let (name, namespace, kind) = experiment_ref(ctx, &input, &[])?;
        let manager = ctx.manager();
        let kinds = manager.pause(name, namespace, kind)?;
        Ok(ToolOutput::ok(json!({
            "status": "paused",
            "experiment_id": name,
            "kinds": kinds_json(&kinds),
            "namespace": namespace,
            "annotation": manager.pause_annotation().key(),
        })))
    }
}

pub struct ResumeTool;

impl Tool for ResumeTool {
    fn signature(&self) -> ToolSignature {
        experiment_signature(
            "resume_experiment",
            "Resume a paused chaos experiment.",
            DangerLevel::Cautious,
        )
    }

    fn execute(&self, ctx: &ToolContext, input: ToolInput) -> ToolResult<ToolOutput> {
        let (name, namespace, kind) = experiment_ref(ctx, &input, &[])?;
        let kinds = ctx.manager().resume(name, namespace, kind)?;
        Ok(ToolOutput::ok(json!({
            "status": "resumed",
            "experiment_id": name,
            "kinds": kinds_json(&kinds),
            "namespace": namespace,
        })))
    }
}

pub struct EventsTool;

impl Tool for EventsTool {
    fn signature(&self) -> ToolSignature {
        ToolSignature {
            name: "get_experiment_events".into(),
            description: "Get the cluster events recorded for a chaos experiment, oldest first."
                .into(),
            danger: DangerLevel::Safe,
            parameters: vec![experiment_id_param(), namespace_param()],
        }
    }

    fn execute(&self, ctx: &ToolContext, input: ToolInput) -> ToolResult<ToolOutput> {
        input.deny_unknown(&["experiment_id", "namespace"])?;
        let name = experiment_id(&input)?;
        let namespace = ctx.namespace(&input)?;
        let events = ctx.manager().events(name, namespace)?;
        Ok(ToolOutput::ok(json!({
            "experiment_id": name,
            "namespace": namespace,
            "events": events,
        })))
    }
}

/// Capability of the cluster for every chaos kind.
pub struct ValidateEnvironmentTool;

impl Tool for ValidateEnvironmentTool {
    fn signature(&self) -> ToolSignature {
        ToolSignature {
            name: "validate_environment".into(),
            description: "Check whether the cluster is reachable and which chaos kinds it can \
                          run: CRDs installed, Chaos Mesh components running."
                .into(),
            danger: DangerLevel::Safe,
            parameters: vec![],
        }
    }

    fn execute(&self, ctx: &ToolContext, input: ToolInput) -> ToolResult<ToolOutput> {
        input.deny_unknown(&[])?;
        Ok(ToolOutput::json(&ctx.checker().check_all()))
    }
}

pub struct KindRequirementsTool;

impl Tool for KindRequirementsTool {
    fn signature(&self) -> ToolSignature {
        ToolSignature {
            name: "check_chaos_type_requirements".into(),
            description: "Check one chaos kind: its requirements and whether the cluster \
                          currently meets them."
                .into(),
            danger: DangerLevel::Safe,
            parameters: vec![ToolParam::new(
                "kind",
                "string",
                true,
                "Chaos kind, e.g. DNSChaos or dns.",
            )],
        }
    }

    fn execute(&self, ctx: &ToolContext, input: ToolInput) -> ToolResult<ToolOutput> {
        input.deny_unknown(&["kind"])?;
        let kind = parse_kind(&input)?.ok_or_else(|| ValidationError::missing("kind"))?;
        Ok(ToolOutput::json(&ctx.checker().check_one(kind)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::*;
    use crate::cluster::InMemoryCluster;
    use crate::config::ChaosConfig;
    use crate::error::{ClusterError, ToolError};

    fn setup() -> (Arc<InMemoryCluster>, ToolRegistry, ToolContext) {
        let cluster = Arc::new(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
        let (reg, ctx) = super::super::build(cluster.clone(), ChaosConfig::default()).unwrap();
        (cluster, reg, ctx)
    }

    fn call(reg: &ToolRegistry, ctx: &ToolContext, tool: &str, args: Value) -> ToolResult<Value> {
        reg.execute(tool, ToolInput::from_value(args)?, ctx)
            .map(|o| o.result)
    }

    fn create_delay(reg: &ToolRegistry, ctx: &ToolContext) -> String {
        let out = call(
            reg,
            ctx,
            "create_network_delay",
            json!({"target_labels": {"app": "web"}, "latency": "50ms", "duration": "2m"}),
        )
        .unwrap();
        out["experiment_id"].as_str().unwrap().to_string()
    }

    #[test]
    fn lifecycle_round() {
        let (cluster, reg, ctx) = setup();
        let id = create_delay(&reg, &ctx);

        let status = call(&reg, &ctx, "get_experiment_status", json!({"experiment_id": id})).unwrap();
        assert_eq!(status["kind"], "NetworkChaos");

        call(&reg, &ctx, "pause_experiment", json!({"experiment_id": id})).unwrap();
        let status = call(&reg, &ctx, "get_experiment_status", json!({"experiment_id": id})).unwrap();
        assert_eq!(status["phase"], "Paused");

        call(&reg, &ctx, "resume_experiment", json!({"experiment_id": id})).unwrap();
        let listed = call(&reg, &ctx, "list_active_experiments", json!({})).unwrap();
        assert_eq!(listed["count"], 1);

        let deleted = call(&reg, &ctx, "delete_experiment", json!({"experiment_id": id})).unwrap();
        assert_eq!(deleted["status"], "deleted");
        assert_eq!(cluster.resource_count(), 0);
    }

    /// A fresh context over `cluster`, so call logs start empty.
    fn tools_over(cluster: &Arc<InMemoryCluster>) -> (ToolRegistry, ToolContext) {
        super::super::build(cluster.clone(), ChaosConfig::default()).unwrap()
    }

    #[test]
    fn each_lifecycle_tool_makes_one_cluster_call() {
        let cluster = Arc::new(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
        let (reg, ctx) = tools_over(&cluster);
        let id = create_delay(&reg, &ctx);

        let cases = [
            ("get_experiment_status", "get"),
            ("pause_experiment", "annotate"),
            ("resume_experiment", "annotate"),
            ("get_experiment_events", "list_events"),
            ("delete_experiment", "delete"),
        ];
        for (tool, op) in cases {
            let fresh = Arc::new(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
            if let Some(doc) = cluster.resource(ChaosKind::Network, &id, "default") {
                fresh.insert(doc);
            }
            let (reg, ctx) = tools_over(&fresh);
            call(&reg, &ctx, tool, json!({"experiment_id": id})).unwrap();
            assert_eq!(fresh.calls(), vec![op], "{tool}");
        }

        let fresh = Arc::new(InMemoryCluster::with_chaos_mesh("chaos-mesh"));
        let (reg, ctx) = tools_over(&fresh);
        call(&reg, &ctx, "list_active_experiments", json!({})).unwrap();
        assert_eq!(fresh.calls(), vec!["list"]);
    }

    #[test]
    fn pause_then_resume_round_trips_the_annotation() {
        let (cluster, reg, ctx) = setup();
        let id = create_delay(&reg, &ctx);
        let key = "experiment.chaos-mesh.org/pause";

        let paused = call(&reg, &ctx, "pause_experiment", json!({"experiment_id": id})).unwrap();
        assert_eq!(paused["kinds"], json!(["NetworkChaos"]));
        assert_eq!(paused["annotation"], key);
        let stored = cluster.resource(ChaosKind::Network, &id, "default").unwrap();
        assert_eq!(stored["metadata"]["annotations"][key], "true");

        let resumed = call(
            &reg,
            &ctx,
            "resume_experiment",
            json!({"experiment_id": id, "kind": "network"}),
        )
        .unwrap();
        assert_eq!(resumed["status"], "resumed");
        let stored = cluster.resource(ChaosKind::Network, &id, "default").unwrap();
        assert!(stored["metadata"]["annotations"].get(key).is_none());
    }

    #[test]
    fn status_events_are_opt_in() {
        let (cluster, reg, ctx) = setup();
        let id = create_delay(&reg, &ctx);
        cluster.add_event(
            "default",
            &id,
            json!({"type": "Normal", "reason": "Applied", "message": "ok", "lastTimestamp": "2026-10-16T10:00:00Z"}),
        );
        let plain = call(&reg, &ctx, "get_experiment_status", json!({"experiment_id": id})).unwrap();
        assert_eq!(plain["events"], json!([]));
        let full = call(
            &reg,
            &ctx,
            "get_experiment_status",
            json!({"experiment_id": id, "include_events": true}),
        )
        .unwrap();
        assert_eq!(full["events"][0]["reason"], "Applied");
    }

    #[test]
    fn list_hides_finished_unless_asked() {
        let (cluster, reg, ctx) = setup();
        create_delay(&reg, &ctx);
        cluster.insert(json!({
            "apiVersion": "chaos-mesh.org/v1alpha1",
            "kind": "PodChaos",
            "metadata": {"name": "old", "namespace": "default"},
            "spec": {"action": "pod-kill"},
            "status": {"experiment": {"phase": "Finished"}},
        }));
        let active = call(&reg, &ctx, "list_active_experiments", json!({})).unwrap();
        assert_eq!(active["count"], 1);
        assert_eq!(active["experiments"][0]["kind"], "NetworkChaos");
        assert_eq!(active["experiments"][0]["action"], "delay");

        let all = call(&reg, &ctx, "list_active_experiments", json!({"include_finished": true}))
            .unwrap();
        assert_eq!(all["count"], 2);
    }

    #[test]
    fn malformed_experiment_id_never_reaches_the_cluster() {
        let (cluster, reg, ctx) = setup();
        let err = call(
            &reg,
            &ctx,
            "pause_experiment",
            json!({"experiment_id": "a,b"}),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ToolError::Validation(ValidationError::InvalidFieldValue { ref field, .. }) if field == "experiment_id"
        ));
        assert!(cluster.calls().is_empty());
    }

    #[test]
    fn capability_tools_degrade_per_query() {
        let (cluster, reg, ctx) = setup();
        cluster.fail_on(
            "list_pods",
            ClusterError::PermissionDenied {
                cause: "pods is forbidden".into(),
            },
        );

        let report = call(&reg, &ctx, "validate_environment", json!({})).unwrap();
        assert_eq!(report["cluster_reachable"]["state"], "ready");
        for kind in report["kinds"].as_array().unwrap() {
            assert_eq!(kind["crd_installed"]["state"], "ready", "{}", kind["kind"]);
            assert_eq!(kind["required_components_ready"]["state"], "unknown");
            assert_eq!(kind["verdict"], "unknown");
        }

        let dns = call(&reg, &ctx, "check_chaos_type_requirements", json!({"kind": "dns"})).unwrap();
        assert_eq!(dns["crd_installed"]["state"], "ready");
        assert!(
            dns["required_components_ready"]["cause"]
                .as_str()
                .unwrap()
                .contains("forbidden")
        );
        assert_eq!(dns["verdict"], "unknown");
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let (_, reg, ctx) = setup();
        let err = call(&reg, &ctx, "delete_experiment", json!({"experiment_id": "ghost"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::Cluster(ClusterError::NotFound { .. })));
        assert_eq!(err.to_response()["error"]["category"], "environment");
    }

    #[test]
    fn experiment_id_is_required() {
        let (_, reg, ctx) = setup();
        let err = call(&reg, &ctx, "pause_experiment", json!({"namespace": "default"})).unwrap_err();
        assert_eq!(err, ToolError::Validation(ValidationError::missing("experiment_id")));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let (_, reg, ctx) = setup();
        let err = call(&reg, &ctx, "check_chaos_type_requirements", json!({"kind": "KernelChaos"}))
            .unwrap_err();
        assert!(matches!(
            err,
            ToolError::Validation(ValidationError::InvalidFieldValue { ref field, .. }) if field == "kind"
        ));
    }

    #[test]
    fn environment_reports_every_kind() {
        let (_, reg, ctx) = setup();
        let report = call(&reg, &ctx, "validate_environment", json!({})).unwrap();
        assert_eq!(report["kinds"].as_array().unwrap().len(), ChaosKind::ALL.len());

        let dns = call(&reg, &ctx, "check_chaos_type_requirements", json!({"kind": "dns"})).unwrap();
        assert_eq!(dns["kind"], "DNSChaos");
    }

    #[test]
    fn events_tool_lists_events() {
        let (cluster, reg, ctx) = setup();
        cluster.add_event(
            "default",
            "exp",
            json!({"type": "Normal", "reason": "Applied", "message": "ok", "lastTimestamp": "2026-10-16T10:00:00Z"}),
        );
        let out = call(&reg, &ctx, "get_experiment_events", json!({"experiment_id": "exp"})).unwrap();
        assert_eq!(out["events"][0]["reason"], "Applied");
        assert_eq!(out["events"][0]["type"], "Normal");
    }
}
