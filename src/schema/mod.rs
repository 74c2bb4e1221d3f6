//! Schema registry: per-action field specifications.
//!
//! Every (kind, action) pair has exactly one [`FieldSpec`] listing the fields
//! it accepts, their value domains, defaults, and the cross-field rules that
//! tie them together. The registry is compiled once at startup from the
//! built-in [`catalog`] and checked for internal consistency; a registry that
//! fails to compile must not serve any tool.

pub mod catalog;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::duration::{ChaosDuration, SignedDuration};
use crate::error::{SchemaError, SchemaResult};
use crate::kind::{ChaosAction, ChaosKind};
use crate::target::{self, AddressList, SelectorMode, TargetSelector};

pub use catalog::CatalogEntry;

static RE_MEMORY_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d+)\s*(B|KB|MB|GB|TB)$").unwrap());

static RE_DNS_PATTERN_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9.-]*[A-Za-z0-9.])?$").unwrap());

/// Envelope field names shared by every action.
pub const ENVELOPE_FIELDS: [&str; 7] =
    ["duration", "mode", "value", "name", "namespace", "target", "address"];

// ---------------------------------------------------------------------------
// Domains and values
// ---------------------------------------------------------------------------

/// The set of values a field accepts, and how raw input is coerced into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDomain {
    /// `<digits><ms|s|m|h>`.
    Duration,
    /// A duration with an optional leading sign.
    SignedDuration,
    /// 0–100, given as a number or a numeric string (a trailing `%` is allowed).
    Percent,
    /// An integer within inclusive bounds.
    Integer { min: i64, max: i64 },
    /// One of a fixed set of strings, normalised to the canonical spelling.
    Enum {
        values: &'static [&'static str],
        case_insensitive: bool,
    },
    /// `<n>B|KB|MB|GB|TB`, unit case-insensitive.
    MemorySize,
    /// A path starting with `/`.
    AbsolutePath,
    NonEmptyString,
    /// Any string, including the empty one.
    Text,
    /// A list of non-empty strings.
    StringList { non_empty: bool },
    /// A list of values from a fixed set.
    EnumList { values: &'static [&'static str] },
    /// A string-to-string object.
    StringMap,
    /// `[[key, value], ...]` or an object, kept as ordered pairs.
    HeaderPairs,
    Bool,
    /// DNS patterns; `*` may only appear as a `*.` prefix or a `*` suffix.
    DnsPatterns,
    /// A pod selector object.
    Target,
    /// A list of `host:port` machine addresses.
    Addresses,
    /// An RFC 1123 resource name.
    ResourceName,
    /// An RFC 1123 namespace label.
    Namespace,
}

impl FieldDomain {
    /// Short human description, used in tool signatures.
    pub fn describe(&self) -> String {
        match self {
            Self::Duration => "duration such as 30s, 5m, 1h".into(),
            Self::SignedDuration => "signed duration such as -10m or 30s".into(),
            Self::Percent => "percentage 0-100".into(),
            Self::Integer { min, max } if *max == i64::MAX => format!("integer >= {min}"),
            Self::Integer { min, max } => format!("integer {min}-{max}"),
            Self::Enum { values, .. } => format!("one of {}", values.join(", ")),
            Self::MemorySize => "memory size such as 256MB or 1GB".into(),
            Self::AbsolutePath => "absolute path".into(),
            Self::NonEmptyString => "non-empty string".into(),
            Self::Text => "string".into(),
            Self::StringList { .. } => "list of strings".into(),
            Self::EnumList { values } => format!("list of {}", values.join(", ")),
            Self::StringMap => "object of string values".into(),
            Self::HeaderPairs => "list of [name, value] pairs".into(),
            Self::Bool => "boolean".into(),
            Self::DnsPatterns => "list of domain patterns (wildcard as *. prefix or * suffix)".into(),
            Self::Target => "pod selector {namespace, labelSelector, containerNames?}".into(),
            Self::Addresses => "list of host:port addresses".into(),
            Self::ResourceName => "resource name (lowercase, digits, '-', '.')".into(),
            Self::Namespace => "namespace name".into(),
        }
    }

    /// JSON schema type for this domain.
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::Percent | Self::Integer { .. } => "integer",
            Self::Bool => "boolean",
            Self::StringList { .. }
            | Self::EnumList { .. }
            | Self::HeaderPairs
            | Self::DnsPatterns
            | Self::Addresses => "array",
            Self::StringMap | Self::Target => "object",
            _ => "string",
        }
    }

    /// Coerce a raw JSON value into this domain.
    ///
    /// The error is a reason suitable for `InvalidFieldValue`.
    pub fn coerce(&self, raw: &Value) -> Result<FieldValue, String> {
        match self {
            Self::Duration => {
                let s = expect_str(raw, "a duration string such as '30s'")?;
                s.parse::<ChaosDuration>()
                    .map(FieldValue::Duration)
                    .map_err(|e| e.to_string())
            }
            Self::SignedDuration => {
                let s = expect_str(raw, "a duration string such as '-10m'")?;
                s.parse::<SignedDuration>()
                    .map(FieldValue::SignedDuration)
                    .map_err(|e| e.to_string())
            }
            Self::Percent => {
                let n = coerce_integer(raw, true)?;
                if (0..=100).contains(&n) {
                    Ok(FieldValue::Int(n))
                } else {
                    Err(format!("{n} is outside 0-100"))
                }
            }
            Self::Integer { min, max } => {
                let n = coerce_integer(raw, false)?;
                if n < *min || n > *max {
                    Err(match *max {
                        i64::MAX => format!("{n} must be at least {min}"),
                        _ => format!("{n} must be between {min} and {max}"),
                    })
                } else {
                    Ok(FieldValue::Int(n))
                }
            }
            Self::Enum {
                values,
                case_insensitive,
            } => {
                let s = expect_str(raw, "a string")?;
                match_enum(s, values, *case_insensitive).map(|v| FieldValue::Str(v.to_string()))
            }
            Self::MemorySize => {
                let s = expect_str(raw, "a memory size such as '256MB'")?;
                let caps = RE_MEMORY_SIZE
                    .captures(s.trim())
                    .ok_or_else(|| format!("'{s}' is not a size like 256MB (units B, KB, MB, GB, TB)"))?;
                Ok(FieldValue::Str(format!(
                    "{}{}",
                    &caps[1],
                    caps[2].to_ascii_uppercase()
                )))
            }
            Self::AbsolutePath => {
                let s = expect_str(raw, "a path")?;
                if s.starts_with('/') {
                    Ok(FieldValue::Str(s.to_string()))
                } else {
                    Err(format!("'{s}' is not an absolute path"))
                }
            }
            Self::NonEmptyString => {
                let s = expect_str(raw, "a string")?;
                if s.trim().is_empty() {
                    Err("must not be empty".into())
                } else {
                    Ok(FieldValue::Str(s.to_string()))
                }
            }
            Self::Text => expect_str(raw, "a string").map(|s| FieldValue::Str(s.to_string())),
            Self::StringList { non_empty } => {
                let items = string_items(raw)?;
                if items.iter().any(|s| s.trim().is_empty()) {
                    return Err("list entries must not be empty".into());
                }
                if *non_empty && items.is_empty() {
                    return Err("at least one entry is required".into());
                }
                Ok(FieldValue::List(items))
            }
            Self::EnumList { values } => {
                let mut out = Vec::new();
                for item in string_items(raw)? {
                    let v = match_enum(&item, values, true)?;
                    if !out.iter().any(|o: &String| o == v) {
                        out.push(v.to_string());
                    }
                }
                Ok(FieldValue::List(out))
            }
            Self::StringMap => {
                let obj = raw.as_object().ok_or("expected an object")?;
                let mut map = BTreeMap::new();
                for (k, v) in obj {
                    let v = v
                        .as_str()
                        .ok_or_else(|| format!("value of '{k}' must be a string"))?;
                    map.insert(k.clone(), v.to_string());
                }
                Ok(FieldValue::Map(map))
            }
            Self::HeaderPairs => coerce_pairs(raw).map(FieldValue::Pairs),
            Self::Bool => match raw {
                Value::Bool(b) => Ok(FieldValue::Bool(*b)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(FieldValue::Bool(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(FieldValue::Bool(false)),
                _ => Err("expected true or false".into()),
            },
            Self::DnsPatterns => {
                let items = string_items(raw)?;
                for p in &items {
                    check_dns_pattern(p)?;
                }
                Ok(FieldValue::List(items))
            }
            Self::Target => {
                let sel: TargetSelector = serde_json::from_value(raw.clone())
                    .map_err(|e| format!("expected a pod selector: {e}"))?;
                sel.check().map_err(|e| e.to_string())?;
                Ok(FieldValue::Target(sel))
            }
            Self::Addresses => {
                let items = match raw {
                    Value::String(s) => vec![s.clone()],
                    _ => string_items(raw)?,
                };
                AddressList::parse(&items)
                    .map(FieldValue::Addresses)
                    .map_err(|e| e.to_string())
            }
            Self::ResourceName => {
                let s = expect_str(raw, "a string")?;
                target::check_resource_name(s).map_err(|e| e.to_string())?;
                Ok(FieldValue::Str(s.to_string()))
            }
            Self::Namespace => {
                let s = expect_str(raw, "a string")?;
                target::check_namespace(s).map_err(|e| e.to_string())?;
                Ok(FieldValue::Str(s.to_string()))
            }
        }
    }

    fn check_shape(&self) -> Result<(), String> {
        match self {
            Self::Integer { min, max } if min > max => Err(format!("empty range {min}..={max}")),
            Self::Enum { values, .. } | Self::EnumList { values } if values.is_empty() => {
                Err("enum without values".into())
            }
            _ => Ok(()),
        }
    }
}

/// A value coerced into its field's domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Duration(ChaosDuration),
    SignedDuration(SignedDuration),
    Int(i64),
    Str(String),
    Bool(bool),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
    Pairs(Vec<(String, String)>),
    Target(TargetSelector),
    Addresses(AddressList),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<ChaosDuration> {
        match self {
            Self::Duration(d) => Some(*d),
            _ => None,
        }
    }

    /// JSON form as it appears in a resource document.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Duration(d) => Value::String(d.to_string()),
            Self::SignedDuration(d) => Value::String(d.to_string()),
            Self::Int(n) => Value::from(*n),
            Self::Str(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::List(l) => Value::from(l.clone()),
            Self::Map(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            Self::Pairs(p) => Value::Array(
                p.iter()
                    .map(|(k, v)| Value::from(vec![k.clone(), v.clone()]))
                    .collect(),
            ),
            Self::Target(t) => serde_json::to_value(t).unwrap_or(Value::Null),
            Self::Addresses(a) => Value::from(a.as_slice().to_vec()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Duration(d) => d.fmt(f),
            Self::SignedDuration(d) => d.fmt(f),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

fn expect_str<'a>(raw: &'a Value, what: &str) -> Result<&'a str, String> {
    raw.as_str().ok_or_else(|| format!("expected {what}, got {raw}"))
}

fn coerce_integer(raw: &Value, allow_percent_sign: bool) -> Result<i64, String> {
    match raw {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15) {
                Ok(f as i64)
            } else {
                Err(format!("{n} is not a whole number"))
            }
        }
        Value::String(s) => {
            let t = s.trim();
            let t = if allow_percent_sign {
                t.strip_suffix('%').unwrap_or(t).trim_end()
            } else {
                t
            };
            t.parse::<i64>()
                .map_err(|_| format!("'{s}' is not a whole number"))
        }
        other => Err(format!("expected a number, got {other}")),
    }
}

fn match_enum(s: &str, values: &[&'static str], case_insensitive: bool) -> Result<&'static str, String> {
    values
        .iter()
        .find(|v| if case_insensitive { v.eq_ignore_ascii_case(s) } else { **v == s })
        .copied()
        .ok_or_else(|| format!("'{s}' is not one of: {}", values.join(", ")))
}

fn string_items(raw: &Value) -> Result<Vec<String>, String> {
    let arr = raw.as_array().ok_or("expected a list")?;
    arr.iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("list entry {v} is not a string"))
        })
        .collect()
}

fn coerce_pairs(raw: &Value) -> Result<Vec<(String, String)>, String> {
    match raw {
        Value::Object(obj) => obj
            .iter()
            .map(|(k, v)| {
                v.as_str()
                    .map(|v| (k.clone(), v.to_string()))
                    .ok_or_else(|| format!("value of '{k}' must be a string"))
            })
            .collect(),
        Value::Array(arr) => arr
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([Value::String(k), Value::String(v)]) if !k.is_empty() => {
                    Ok((k.clone(), v.clone()))
                }
                _ => Err(format!("{pair} is not a [name, value] pair")),
            })
            .collect(),
        other => Err(format!("expected a list of [name, value] pairs, got {other}")),
    }
}

fn check_dns_pattern(p: &str) -> Result<(), String> {
    let body = p.strip_prefix("*.").unwrap_or(p);
    let body = body.strip_suffix('*').unwrap_or(body);
    if body.contains('*') {
        return Err(format!(
            "'{p}': wildcard is only allowed as a '*.' prefix or a '*' suffix"
        ));
    }
    if !RE_DNS_PATTERN_BODY.is_match(body) {
        return Err(format!("'{p}' is not a valid domain pattern"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Fields and rules
// ---------------------------------------------------------------------------

/// One declared parameter of an action.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub domain: FieldDomain,
    pub required: bool,
    /// Raw default, coerced into `domain` when the registry is built.
    pub default: Option<Value>,
    /// Alternative input names that resolve to this field.
    pub aliases: &'static [&'static str],
    pub description: &'static str,
}

impl Field {
    pub fn required(name: &'static str, domain: FieldDomain, description: &'static str) -> Self {
        Self {
            name,
            domain,
            required: true,
            default: None,
            aliases: &[],
            description,
        }
    }

    pub fn optional(name: &'static str, domain: FieldDomain, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, domain, description)
        }
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn alias(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn is_envelope(&self) -> bool {
        ENVELOPE_FIELDS.contains(&self.name)
    }

    fn answers_to(&self, key: &str) -> bool {
        self.name == key || self.aliases.contains(&key)
    }
}

/// A constraint spanning several fields, evaluated after per-field coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossFieldRule {
    /// Count and percent modes need `value`; percent modes bound it to 1–100;
    /// `one`/`all` take no `value`.
    ModeValue,
    /// At least one field of the group must be supplied.
    AtLeastOneOf(&'static [&'static str]),
    /// If `field` is supplied, every field in `requires` must be too.
    RequiresAll {
        field: &'static str,
        requires: &'static [&'static str],
    },
}

impl CrossFieldRule {
    fn referenced(&self) -> Vec<&'static str> {
        match self {
            Self::ModeValue => vec!["mode", "value"],
            Self::AtLeastOneOf(group) => group.to_vec(),
            Self::RequiresAll { field, requires } => {
                std::iter::once(*field).chain(requires.iter().copied()).collect()
            }
        }
    }
}

/// The compiled parameter specification of one action.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    action: ChaosAction,
    fields: Vec<Field>,
    rules: Vec<CrossFieldRule>,
    defaults: BTreeMap<&'static str, FieldValue>,
}

impl FieldSpec {
    pub fn action(&self) -> ChaosAction {
        self.action
    }

    pub fn kind(&self) -> ChaosKind {
        self.action.kind()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Action-specific fields, without the envelope.
    pub fn action_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_envelope())
    }

    /// Look up a field by name or alias.
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.answers_to(key))
    }

    pub fn rules(&self) -> &[CrossFieldRule] {
        &self.rules
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Defaults, already coerced into their domains.
    pub fn defaults(&self) -> &BTreeMap<&'static str, FieldValue> {
        &self.defaults
    }

    /// Field groups of which at least one member must be supplied.
    pub fn required_groups(&self) -> impl Iterator<Item = &'static [&'static str]> + '_ {
        self.rules.iter().filter_map(|r| match r {
            CrossFieldRule::AtLeastOneOf(group) => Some(*group),
            _ => None,
        })
    }

    fn compile(entry: CatalogEntry) -> SchemaResult<Self> {
        let CatalogEntry {
            action,
            fields,
            rules,
        } = entry;
        let inconsistent = |message: String| SchemaError::Inconsistent {
            kind: action.kind().to_string(),
            action: action.to_string(),
            message,
        };

        let mut seen = BTreeSet::new();
        for f in &fields {
            for key in std::iter::once(f.name).chain(f.aliases.iter().copied()) {
                if !seen.insert(key) {
                    return Err(inconsistent(format!("field or alias '{key}' declared twice")));
                }
            }
            f.domain
                .check_shape()
                .map_err(|m| inconsistent(format!("field '{}': {m}", f.name)))?;
        }

        match fields.iter().find(|f| f.name == "duration") {
            Some(f) if f.required && f.domain == FieldDomain::Duration => {}
            _ => return Err(inconsistent("'duration' must be a required duration field".into())),
        }

        let mut defaults = BTreeMap::new();
        for f in &fields {
            let Some(raw) = &f.default else { continue };
            if f.required {
                return Err(inconsistent(format!(
                    "required field '{}' declares a default",
                    f.name
                )));
            }
            let value = f.domain.coerce(raw).map_err(|reason| {
                inconsistent(format!("default of '{}' is outside its domain: {reason}", f.name))
            })?;
            defaults.insert(f.name, value);
        }

        for rule in &rules {
            for name in rule.referenced() {
                if !fields.iter().any(|f| f.name == name) {
                    return Err(inconsistent(format!(
                        "rule {rule:?} references undeclared field '{name}'"
                    )));
                }
            }
        }

        if let Some(FieldValue::Str(mode)) = defaults.get("mode") {
            if SelectorMode::needs_value(mode) {
                return Err(inconsistent(format!("default mode '{mode}' needs a value")));
            }
        }

        Ok(Self {
            action,
            fields,
            rules,
            defaults,
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Read-only map from action to its [`FieldSpec`].
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    specs: BTreeMap<ChaosAction, FieldSpec>,
}

impl SchemaRegistry {
    /// Compile the built-in catalog.
    pub fn builtin() -> SchemaResult<Self> {
        Self::from_entries(catalog::build_catalog())
    }

    /// Compile a registry from explicit entries, checking that every action
    /// has exactly one consistent specification.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> SchemaResult<Self> {
        let mut specs = BTreeMap::new();
        for entry in entries {
            let action = entry.action;
            if specs.contains_key(&action) {
                return Err(SchemaError::DuplicateEntry {
                    kind: action.kind().to_string(),
                    action: action.to_string(),
                });
            }
            specs.insert(action, FieldSpec::compile(entry)?);
        }
        if let Some(missing) = ChaosAction::ALL.iter().find(|a| !specs.contains_key(*a)) {
            return Err(SchemaError::MissingEntry {
                kind: missing.kind().to_string(),
                action: missing.to_string(),
            });
        }
        tracing::debug!(specs = specs.len(), "schema registry compiled");
        Ok(Self { specs })
    }

    /// The specification for `action`, if it belongs to `kind`.
    pub fn schema_for(&self, kind: ChaosKind, action: ChaosAction) -> Option<&FieldSpec> {
        if action.kind() != kind {
            return None;
        }
        self.specs.get(&action)
    }

    /// Every specification, in action order.
    pub fn specs(&self) -> impl Iterator<Item = &FieldSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_registry_covers_every_action() {
        let reg = SchemaRegistry::builtin().unwrap();
        assert_eq!(reg.len(), ChaosAction::ALL.len());
        for action in ChaosAction::ALL {
            let spec = reg.schema_for(action.kind(), action).unwrap();
            assert!(spec.field("duration").unwrap().required);
        }
    }

    #[test]
    fn schema_for_rejects_foreign_kind() {
        let reg = SchemaRegistry::builtin().unwrap();
        assert!(reg.schema_for(ChaosKind::DNS, ChaosAction::NetworkDelay).is_none());
    }

    #[test]
    fn default_outside_domain_is_fatal() {
        let mut entries = catalog::build_catalog();
        entries[0]
            .fields
            .push(Field::optional("bogus", FieldDomain::Percent, "").default(json!(150)));
        let err = SchemaRegistry::from_entries(entries).unwrap_err();
        assert!(matches!(err, SchemaError::Inconsistent { .. }), "{err}");
    }

    #[test]
    fn rule_on_undeclared_field_is_fatal() {
        let mut entries = catalog::build_catalog();
        entries[0].rules.push(CrossFieldRule::AtLeastOneOf(&["nope"]));
        assert!(matches!(
            SchemaRegistry::from_entries(entries),
            Err(SchemaError::Inconsistent { .. })
        ));
    }

    #[test]
    fn missing_and_duplicate_entries_are_fatal() {
        let mut entries = catalog::build_catalog();
        entries.pop();
        assert!(matches!(
            SchemaRegistry::from_entries(entries),
            Err(SchemaError::MissingEntry { .. })
        ));

        let mut entries = catalog::build_catalog();
        let first = entries[0].clone();
        entries.push(first);
        assert!(matches!(
            SchemaRegistry::from_entries(entries),
            Err(SchemaError::DuplicateEntry { .. })
        ));
    }

    #[test]
    fn duplicate_alias_is_fatal() {
        let mut entries = catalog::build_catalog();
        let jitter = entries[0]
            .fields
            .iter_mut()
            .find(|f| f.name == "jitter")
            .unwrap();
        jitter.aliases = &["delay"];
        assert!(SchemaRegistry::from_entries(entries).is_err());
    }

    #[test]
    fn percent_accepts_strings_and_numbers() {
        let d = FieldDomain::Percent;
        assert_eq!(d.coerce(&json!("25")), Ok(FieldValue::Int(25)));
        assert_eq!(d.coerce(&json!("25%")), Ok(FieldValue::Int(25)));
        assert_eq!(d.coerce(&json!(100)), Ok(FieldValue::Int(100)));
        assert_eq!(d.coerce(&json!(50.0)), Ok(FieldValue::Int(50)));
        assert!(d.coerce(&json!(101)).is_err());
        assert!(d.coerce(&json!(-1)).is_err());
        assert!(d.coerce(&json!(12.5)).is_err());
        assert!(d.coerce(&json!("lots")).is_err());
    }

    #[test]
    fn memory_size_normalises_unit() {
        let d = FieldDomain::MemorySize;
        assert_eq!(d.coerce(&json!("256mb")), Ok(FieldValue::Str("256MB".into())));
        assert!(d.coerce(&json!("256")).is_err());
        assert!(d.coerce(&json!("1PB")).is_err());
    }

    #[test]
    fn dns_wildcards() {
        let d = FieldDomain::DnsPatterns;
        assert!(d.coerce(&json!(["*.example.com", "google.com", "chaos-mesh.*"])).is_ok());
        assert!(d.coerce(&json!(["exa*mple.com"])).is_err());
        assert!(d.coerce(&json!(["*example.com"])).is_err());
        assert!(d.coerce(&json!([""])).is_err());
    }

    #[test]
    fn header_pairs_from_object_or_list() {
        let d = FieldDomain::HeaderPairs;
        assert_eq!(
            d.coerce(&json!([["X-A", "1"]])),
            Ok(FieldValue::Pairs(vec![("X-A".into(), "1".into())]))
        );
        assert_eq!(
            d.coerce(&json!({"X-A": "1"})),
            Ok(FieldValue::Pairs(vec![("X-A".into(), "1".into())]))
        );
        assert!(d.coerce(&json!([["X-A"]])).is_err());
    }

    #[test]
    fn enum_list_canonicalises_and_dedups() {
        let d = FieldDomain::EnumList {
            values: &["READ", "WRITE"],
        };
        assert_eq!(
            d.coerce(&json!(["read", "READ", "write"])),
            Ok(FieldValue::List(vec!["READ".into(), "WRITE".into()]))
        );
    }
}
