//! Tool surface: trait-based tools with runtime registration.
//!
//! Each operation the agent can call implements [`Tool`] and is registered
//! in a [`ToolRegistry`]. The 25 creation tools are generated from the
//! schema catalog; the remaining eight cover lifecycle and capability checks.

pub mod create;
pub mod manage;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::capability::CapabilityChecker;
use crate::cluster::ClusterApi;
use crate::config::ChaosConfig;
use crate::error::{SchemaResult, ToolError, ToolResult, ValidationError};
use crate::kind::{ChaosAction, ChaosKind};
use crate::lifecycle::ExperimentManager;
use crate::schema::SchemaRegistry;
use crate::validate::Validator;

/// How much a tool can disturb the cluster.
///
/// Ordered from least to most dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DangerLevel {
    /// Read-only.
    Safe,
    /// Changes an existing experiment (stop, pause, resume).
    Cautious,
    /// Injects a fault.
    Dangerous,
}

impl std::fmt::Display for DangerLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "Safe"),
            Self::Cautious => write!(f, "Cautious"),
            Self::Dangerous => write!(f, "Dangerous"),
        }
    }
}

/// Description of a tool's interface.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSignature {
    /// Unique name of the tool.
    pub name: String,
    /// What this tool does.
    pub description: String,
    pub danger: DangerLevel,
    /// Parameters the tool accepts.
    pub parameters: Vec<ToolParam>,
}

impl ToolSignature {
    /// JSON schema of the tool's input object.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.parameters {
            let mut prop = json!({
                "type": p.json_type,
                "description": p.description,
            });
            if let Some(default) = &p.default {
                prop["default"] = default.clone();
            }
            properties.insert(p.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// A single parameter in a tool's signature.
#[derive(Debug, Clone, Serialize)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    /// JSON schema type (`string`, `integer`, `array`, ...).
    pub json_type: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ToolParam {
    pub fn new(
        name: impl Into<String>,
        json_type: &'static str,
        required: bool,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            json_type,
            required,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Input to a tool execution: a JSON object of named arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolInput {
    pub params: Map<String, Value>,
}

impl ToolInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any JSON value; `null` is an empty input.
    pub fn from_value(value: Value) -> ToolResult<Self> {
        match value {
            Value::Object(params) => Ok(Self { params }),
            Value::Null => Ok(Self::new()),
            other => Err(ValidationError::invalid(
                "arguments",
                format!("expected a JSON object, got {other}"),
            )
            .into()),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// A parameter value; JSON `null` counts as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name).filter(|v| !v.is_null())
    }

    /// A string parameter, if present.
    pub fn str(&self, name: &str) -> ToolResult<Option<&str>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => {
                Err(ValidationError::invalid(name, format!("expected a string, got {other}")).into())
            }
        }
    }

    /// A required string parameter.
    pub fn require_str(&self, name: &str) -> ToolResult<&str> {
        self.str(name)?
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ValidationError::missing(name).into())
    }

    pub fn bool(&self, name: &str) -> ToolResult<Option<bool>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => {
                Err(ValidationError::invalid(name, format!("expected a boolean, got {other}")).into())
            }
        }
    }

    /// Reject any key not named in `allowed`.
    pub fn deny_unknown(&self, allowed: &[&str]) -> ToolResult<()> {
        match self.params.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(k) => Err(ValidationError::UnknownField { field: k.clone() }.into()),
            None => Ok(()),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.params)
    }
}

/// Output from a successful tool execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub result: Value,
}

impl ToolOutput {
    pub fn ok(result: impl Into<Value>) -> Self {
        Self {
            result: result.into(),
        }
    }

    /// Serialise `value` as the result.
    pub fn json<T: Serialize>(value: &T) -> Self {
        Self {
            result: serde_json::to_value(value).unwrap_or(Value::Null),
        }
    }
}

/// Everything a tool needs to run.
pub struct ToolContext {
    pub validator: Validator,
    pub cluster: Arc<dyn ClusterApi>,
    pub config: ChaosConfig,
}

impl ToolContext {
    pub fn new(validator: Validator, cluster: Arc<dyn ClusterApi>, config: ChaosConfig) -> Self {
        Self {
            validator,
            cluster,
            config,
        }
    }

    pub fn manager(&self) -> ExperimentManager {
        ExperimentManager::new(self.cluster.clone(), self.config.pause())
    }

    pub fn checker(&self) -> CapabilityChecker {
        CapabilityChecker::new(self.cluster.clone(), self.config.chaos_namespace.clone())
    }

    /// `namespace` from the input, or the configured default.
    pub fn namespace<'a>(&'a self, input: &'a ToolInput) -> ToolResult<&'a str> {
        Ok(input
            .str("namespace")?
            .unwrap_or(&self.config.default_namespace))
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("validator", &self.validator)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A tool the agent can execute.
pub trait Tool: Send + Sync {
    /// Describe this tool's interface.
    fn signature(&self) -> ToolSignature;

    /// Execute the tool.
    fn execute(&self, ctx: &ToolContext, input: ToolInput) -> ToolResult<ToolOutput>;
}

/// Registry of available tools, ordered by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. If a tool with the same name exists, it is replaced.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let sig = tool.signature();
        self.tools.insert(sig.name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|b| b.as_ref())
    }

    /// All registered tool signatures, sorted by name.
    pub fn list(&self) -> Vec<ToolSignature> {
        self.tools.values().map(|t| t.signature()).collect()
    }

    /// Execute a tool by name.
    pub fn execute(
        &self,
        name: &str,
        input: ToolInput,
        ctx: &ToolContext,
    ) -> ToolResult<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound { name: name.into() })?;
        tracing::debug!(tool = name, "executing tool");
        tool.execute(ctx, input)
    }

    /// Execute and fold any failure into its structured response.
    pub fn call(&self, name: &str, input: ToolInput, ctx: &ToolContext) -> Value {
        match self.execute(name, input, ctx) {
            Ok(out) => out.result,
            Err(e) => {
                tracing::warn!(tool = name, category = %e.category(), error = %e, "tool failed");
                e.to_response()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Register one creation tool per chaos action plus the management tools.
pub fn register_all(registry: &mut ToolRegistry, schemas: &SchemaRegistry) {
    for spec in schemas.specs() {
        registry.register(Box::new(create::CreateTool::new(spec)));
    }
    manage::register(registry);
}

/// A ready-to-use registry and context over `cluster`.
///
/// Fails only if the built-in schema catalog is inconsistent.
pub fn build(
    cluster: Arc<dyn ClusterApi>,
    config: ChaosConfig,
) -> SchemaResult<(ToolRegistry, ToolContext)> {
    let schemas = Arc::new(SchemaRegistry::builtin()?);
    let mut registry = ToolRegistry::new();
    register_all(&mut registry, &schemas);
    tracing::debug!(tools = registry.len(), "tool registry built");
    Ok((registry, ToolContext::new(Validator::new(schemas), cluster, config)))
}

/// Parse a `kind` argument, accepting either the short slug or the resource kind.
pub(crate) fn parse_kind(input: &ToolInput) -> ToolResult<Option<ChaosKind>> {
    match input.str("kind")? {
        None => Ok(None),
        Some(s) => ChaosKind::parse(s).map(Some).ok_or_else(|| {
            ValidationError::invalid(
                "kind",
                format!(
                    "unknown chaos kind '{s}'; expected one of {}",
                    ChaosKind::ALL
                        .iter()
                        .map(|k| k.resource_kind())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )
            .into()
        }),
    }
}

/// Tool name of every action, in catalog order.
pub fn creation_tool_names() -> Vec<String> {
    ChaosAction::ALL.iter().map(|a| a.tool_name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InMemoryCluster;

    struct DummyTool;
    impl Tool for DummyTool {
        fn signature(&self) -> ToolSignature {
            ToolSignature {
                name: "dummy".into(),
                description: "A test tool".into(),
                danger: DangerLevel::Safe,
                parameters: vec![ToolParam::new("x", "string", true, "anything")],
            }
        }
        fn execute(&self, _ctx: &ToolContext, input: ToolInput) -> ToolResult<ToolOutput> {
            Ok(ToolOutput::ok(input.require_str("x")?))
        }
    }

    fn context() -> ToolContext {
        let schemas = Arc::new(SchemaRegistry::builtin().unwrap());
        ToolContext::new(
            Validator::new(schemas),
            Arc::new(InMemoryCluster::new()),
            ChaosConfig::default(),
        )
    }

    #[test]
    fn register_and_list() {
        let mut reg = ToolRegistry::new();
        reg.register(Box::new(DummyTool));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.list()[0].name, "dummy");
    }

    #[test]
    fn unknown_tool_is_invalid_input() {
        let reg = ToolRegistry::new();
        let resp = reg.call("nonexistent", ToolInput::new(), &context());
        assert_eq!(resp["error"]["category"], "invalid_input");
    }

    #[test]
    fn missing_argument_is_reported() {
        let mut reg = ToolRegistry::new();
        reg.register(Box::new(DummyTool));
        let ctx = context();
        let err = reg.execute("dummy", ToolInput::new(), &ctx).unwrap_err();
        assert_eq!(err, ToolError::Validation(ValidationError::missing("x")));
        let ok = reg
            .execute("dummy", ToolInput::new().with_param("x", "hi"), &ctx)
            .unwrap();
        assert_eq!(ok.result, json!("hi"));
    }

    #[test]
    fn input_schema_lists_required() {
        let schema = DummyTool.signature().input_schema();
        assert_eq!(schema["required"], json!(["x"]));
        assert_eq!(schema["properties"]["x"]["type"], "string");
    }

    #[test]
    fn input_must_be_an_object() {
        assert!(ToolInput::from_value(json!([1, 2])).is_err());
        assert!(ToolInput::from_value(Value::Null).unwrap().params.is_empty());
    }

    #[test]
    fn all_tools_registered() {
        let (reg, _) = build(Arc::new(InMemoryCluster::new()), ChaosConfig::default()).unwrap();
        assert_eq!(reg.len(), 33);
        for name in creation_tool_names() {
            assert!(reg.get(&name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn danger_levels_order() {
        assert!(DangerLevel::Safe < DangerLevel::Cautious);
        assert!(DangerLevel::Cautious < DangerLevel::Dangerous);
    }
}
