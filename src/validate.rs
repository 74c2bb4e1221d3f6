//! Parameter validation: raw JSON parameters in, typed [`NormalizedParams`] out.
//!
//! Validation is single-pass and pure. Given the same registry and input it
//! always produces the same result, and it never talks to the cluster.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::duration::ChaosDuration;
use crate::error::{ValidationError, ValidationResult};
use crate::kind::{ChaosAction, ChaosKind};
use crate::schema::{CrossFieldRule, FieldSpec, FieldValue, SchemaRegistry};
use crate::target::{AddressList, SelectorMode, TargetSelector};

/// A fully-typed parameter set with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedParams {
    action: ChaosAction,
    duration: ChaosDuration,
    mode: SelectorMode,
    name: Option<String>,
    namespace: String,
    target: Option<TargetSelector>,
    address: Option<AddressList>,
    fields: BTreeMap<&'static str, FieldValue>,
}

impl NormalizedParams {
    pub fn action(&self) -> ChaosAction {
        self.action
    }

    pub fn kind(&self) -> ChaosKind {
        self.action.kind()
    }

    pub fn duration(&self) -> ChaosDuration {
        self.duration
    }

    pub fn mode(&self) -> SelectorMode {
        self.mode
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn target(&self) -> Option<&TargetSelector> {
        self.target.as_ref()
    }

    pub fn address(&self) -> Option<&AddressList> {
        self.address.as_ref()
    }

    /// Action-specific fields by canonical name.
    pub fn fields(&self) -> &BTreeMap<&'static str, FieldValue> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_int)
    }

    pub fn str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }
}

/// Validates raw parameters against the schema registry.
#[derive(Debug, Clone)]
pub struct Validator {
    registry: Arc<SchemaRegistry>,
}

impl Validator {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Validate parameters for an action given by name.
    pub fn validate(
        &self,
        kind: ChaosKind,
        action: &str,
        raw: &Value,
    ) -> ValidationResult<NormalizedParams> {
        let unknown = || ValidationError::UnknownChaosAction {
            kind: kind.to_string(),
            action: action.to_string(),
        };
        let resolved = ChaosAction::parse(kind, action).ok_or_else(unknown)?;
        let spec = self
            .registry
            .schema_for(kind, resolved)
            .ok_or_else(unknown)?;
        validate_against(spec, raw)
    }

    /// Validate parameters for an already-resolved action.
    pub fn validate_action(
        &self,
        action: ChaosAction,
        raw: &Value,
    ) -> ValidationResult<NormalizedParams> {
        let spec = self
            .registry
            .schema_for(action.kind(), action)
            .ok_or_else(|| ValidationError::UnknownChaosAction {
                kind: action.kind().to_string(),
                action: action.to_string(),
            })?;
        validate_against(spec, raw)
    }
}

fn validate_against(spec: &FieldSpec, raw: &Value) -> ValidationResult<NormalizedParams> {
    let empty = Map::new();
    let obj = match raw {
        Value::Object(obj) => obj,
        Value::Null => &empty,
        other => {
            return Err(ValidationError::invalid(
                "parameters",
                format!("expected a JSON object, got {other}"),
            ));
        }
    };

    // Resolve aliases; nulls count as absent. Unknown keys wait for the
    // closed-world check at the end.
    let mut supplied: BTreeMap<&'static str, &Value> = BTreeMap::new();
    let mut unknown: Vec<&str> = Vec::new();
    for (key, value) in obj {
        if value.is_null() {
            continue;
        }
        match spec.field(key) {
            Some(field) => {
                if supplied.insert(field.name, value).is_some() {
                    return Err(ValidationError::invalid(
                        field.name,
                        format!("supplied more than once (as '{key}' and another alias)"),
                    ));
                }
            }
            None => unknown.push(key),
        }
    }

    // A scheme in a machine address is reported as such, whatever else is wrong.
    if let Some(addr) = supplied.get("address") {
        let has_scheme = match addr {
            Value::String(s) => s.contains("://"),
            Value::Array(items) => items
                .iter()
                .any(|i| i.as_str().is_some_and(|s| s.contains("://"))),
            _ => false,
        };
        if has_scheme {
            return Err(ValidationError::invalid(
                "address",
                "must not include a protocol prefix",
            ));
        }
    }

    for field in spec.required_fields() {
        if !supplied.contains_key(field.name) {
            return Err(ValidationError::missing(field.name));
        }
    }

    let mut values: BTreeMap<&'static str, FieldValue> = BTreeMap::new();
    for field in spec.fields() {
        if let Some(raw) = supplied.get(field.name) {
            let value = field
                .domain
                .coerce(raw)
                .map_err(|reason| ValidationError::invalid(field.name, reason))?;
            values.insert(field.name, value);
        }
    }

    for rule in spec.rules() {
        check_rule(rule, spec, &values)?;
    }

    if let Some(key) = unknown.first() {
        return Err(ValidationError::UnknownField {
            field: (*key).to_string(),
        });
    }

    for (name, default) in spec.defaults() {
        values.entry(*name).or_insert_with(|| default.clone());
    }

    assemble(spec, values)
}

fn check_rule(
    rule: &CrossFieldRule,
    spec: &FieldSpec,
    values: &BTreeMap<&'static str, FieldValue>,
) -> ValidationResult<()> {
    match rule {
        CrossFieldRule::ModeValue => {
            let mode = values
                .get("mode")
                .or_else(|| spec.defaults().get("mode"))
                .and_then(FieldValue::as_str)
                .unwrap_or("all");
            let value = values.get("value").and_then(FieldValue::as_int);
            match value {
                None if SelectorMode::needs_value(mode) => Err(ValidationError::invalid(
                    "value",
                    format!("required when mode is {mode}"),
                )),
                Some(v) if SelectorMode::is_percent(mode) && !(1..=100).contains(&v) => {
                    Err(ValidationError::invalid(
                        "value",
                        format!("{v} must be between 1 and 100 for mode {mode}"),
                    ))
                }
                Some(_) if !SelectorMode::needs_value(mode) => Err(ValidationError::invalid(
                    "value",
                    format!("only used with fixed, fixed-percent or random-max-percent mode, not {mode}"),
                )),
                _ => Ok(()),
            }
        }
        CrossFieldRule::AtLeastOneOf(group) => {
            if group.iter().any(|f| values.contains_key(f)) {
                Ok(())
            } else {
                Err(ValidationError::missing(group.join(" or ")))
            }
        }
        CrossFieldRule::RequiresAll { field, requires } => {
            if !values.contains_key(field) {
                return Ok(());
            }
            match requires.iter().find(|r| !values.contains_key(*r)) {
                Some(missing) => Err(ValidationError::invalid(
                    *field,
                    format!("only meaningful together with {missing}"),
                )),
                None => Ok(()),
            }
        }
    }
}

fn assemble(
    spec: &FieldSpec,
    mut values: BTreeMap<&'static str, FieldValue>,
) -> ValidationResult<NormalizedParams> {
    let duration = match values.remove("duration") {
        Some(FieldValue::Duration(d)) => d,
        _ => return Err(ValidationError::missing("duration")),
    };
    let mode_name = match values.remove("mode") {
        Some(FieldValue::Str(s)) => s,
        _ => "all".to_string(),
    };
    let value = values
        .remove("value")
        .and_then(|v| v.as_int())
        .and_then(|v| u32::try_from(v).ok());
    let mode = SelectorMode::from_parts(&mode_name, value)
        .ok_or_else(|| ValidationError::invalid("mode", format!("cannot use mode {mode_name}")))?;
    let name = match values.remove("name") {
        Some(FieldValue::Str(s)) => Some(s),
        _ => None,
    };
    let namespace = match values.remove("namespace") {
        Some(FieldValue::Str(s)) => s,
        _ => "default".to_string(),
    };
    let target = match values.remove("target") {
        Some(FieldValue::Target(t)) => Some(t),
        _ => None,
    };
    let address = match values.remove("address") {
        Some(FieldValue::Addresses(a)) => Some(a),
        _ => None,
    };
    Ok(NormalizedParams {
        action: spec.action(),
        duration,
        mode,
        name,
        namespace,
        target,
        address,
        fields: values,
    })
}
