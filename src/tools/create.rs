//! Creation tools, one per chaos action.

use serde_json::{Value, json};

use super::{DangerLevel, Tool, ToolContext, ToolInput, ToolOutput, ToolParam, ToolSignature};
use crate::error::{ToolResult, ValidationError};
use crate::kind::{ChaosAction, ChaosKind};
use crate::render::render;
use crate::schema::FieldSpec;
use crate::target::Targeting;

/// Validates, renders and submits one kind of experiment.
#[derive(Debug, Clone)]
pub struct CreateTool {
    action: ChaosAction,
    parameters: Vec<ToolParam>,
}

impl CreateTool {
    pub fn new(spec: &FieldSpec) -> Self {
        let action = spec.action();
        let mut parameters: Vec<ToolParam> = spec
            .fields()
            .iter()
            .map(|f| {
                let param = ToolParam::new(
                    f.name,
                    f.domain.json_type(),
                    f.required,
                    format!("{} ({})", f.description, f.domain.describe()),
                );
                match spec.defaults().get(f.name) {
                    Some(d) => param.with_default(d.to_json()),
                    None => param,
                }
            })
            .collect();
        if action.kind().targets_pods() {
            parameters.push(ToolParam::new(
                "target_labels",
                "object",
                false,
                "Labels the target pods must carry; the pods are looked up in `namespace`. \
                 Required unless `target` is given",
            ));
            if takes_selector_containers(action) {
                parameters.push(ToolParam::new(
                    "container_names",
                    "array",
                    false,
                    "Restrict the fault to these containers of the target pods",
                ));
            }
        }
        Self { action, parameters }
    }

    pub fn action(&self) -> ChaosAction {
        self.action
    }

    /// Turn `target_labels`/`container_names` into a `target` selector.
    fn assemble_target(&self, ctx: &ToolContext, input: &mut ToolInput) -> ToolResult<()> {
        let params = &mut input.params;
        let labels = params.remove("target_labels").filter(|v| !v.is_null());
        let containers = if takes_selector_containers(self.action) {
            params.remove("container_names").filter(|v| !v.is_null())
        } else {
            None
        };
        let explicit = ["target", "selector"]
            .into_iter()
            .find(|k| params.get(*k).is_some_and(|v| !v.is_null()));

        match (labels, explicit) {
            (Some(_), Some(key)) => {
                return Err(ValidationError::invalid(
                    "target_labels",
                    format!("give either target_labels or {key}, not both"),
                )
                .into());
            }
            (Some(labels), None) => {
                let namespace = params
                    .get("namespace")
                    .and_then(Value::as_str)
                    .unwrap_or(&ctx.config.default_namespace)
                    .to_string();
                let mut target = json!({"namespace": namespace, "labelSelector": labels});
                if let Some(containers) = containers {
                    target["containerNames"] = containers;
                }
                params.insert("target".into(), target);
            }
            (None, Some(key)) => {
                if let (Some(containers), Some(Value::Object(target))) =
                    (containers, params.get_mut(key))
                {
                    target.insert("containerNames".into(), containers);
                }
            }
            (None, None) => {}
        }
        Ok(())
    }
}

/// Stress and IO faults narrow their pods by container through the selector.
fn takes_selector_containers(action: ChaosAction) -> bool {
    matches!(action.kind(), ChaosKind::Stress | ChaosKind::IO)
}

impl Tool for CreateTool {
    fn signature(&self) -> ToolSignature {
        let kind = self.action.kind();
        let targets = if kind.targets_pods() {
            "the pods matching target_labels"
        } else {
            "the chaosd agents at the given addresses"
        };
        ToolSignature {
            name: self.action.tool_name(),
            description: format!(
                "Create a {} experiment with action '{}' against {targets}. \
                 The experiment recovers automatically after `duration`.",
                kind.resource_kind(),
                self.action.name(),
            ),
            danger: DangerLevel::Dangerous,
            parameters: self.parameters.clone(),
        }
    }

    fn execute(&self, ctx: &ToolContext, mut input: ToolInput) -> ToolResult<ToolOutput> {
        let kind = self.action.kind();
        if kind.targets_pods() {
            self.assemble_target(ctx, &mut input)?;
        }
        if input.get("namespace").is_none() {
            input.params.insert(
                "namespace".into(),
                Value::from(ctx.config.default_namespace.as_str()),
            );
        }

        let params = ctx
            .validator
            .validate_action(self.action, &input.into_value())?;
        let targeting = if kind.targets_pods() {
            params
                .target()
                .cloned()
                .map(Targeting::Pods)
                .ok_or_else(|| ValidationError::missing("target_labels"))?
        } else {
            params
                .address()
                .cloned()
                .map(Targeting::Machines)
                .ok_or_else(|| ValidationError::missing("address"))?
        };

        let manifest = render(&params, &targeting, params.namespace(), None);
        let submitted = ctx.manager().submit(&manifest)?;
        Ok(ToolOutput::ok(json!({
            "experiment_id": submitted.name,
            "kind": submitted.kind,
            "action": self.action.name(),
            "namespace": submitted.namespace,
            "manifest": manifest.document(),
        })))
    }
}
