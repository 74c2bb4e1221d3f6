//! Target selection: which pods (or machines) a fault applies to.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{TargetError, TargetResult};

/// Label key: optional DNS-subdomain prefix, then a 1–63 char name.
static RE_LABEL_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*/)?[A-Za-z0-9]([-A-Za-z0-9_.]{0,61}[A-Za-z0-9])?$",
    )
    .unwrap()
});

static RE_LABEL_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9]([-A-Za-z0-9_.]{0,61}[A-Za-z0-9])?)?$").unwrap()
});

/// RFC 1123 label (namespaces).
static RE_DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").unwrap());

/// RFC 1123 subdomain (resource names).
static RE_DNS_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

/// How many of the matching targets are affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorMode {
    /// One randomly chosen target.
    One,
    /// Every matching target.
    All,
    /// A fixed number of targets.
    Fixed(u32),
    /// A fixed percentage of targets.
    FixedPercent(u8),
    /// A random percentage of targets, up to the given bound.
    RandomMaxPercent(u8),
}

impl SelectorMode {
    /// Mode names accepted on input.
    pub const NAMES: [&'static str; 5] = ["one", "all", "fixed", "fixed-percent", "random-max-percent"];

    pub fn name(&self) -> &'static str {
        match self {
            Self::One => "one",
            Self::All => "all",
            Self::Fixed(_) => "fixed",
            Self::FixedPercent(_) => "fixed-percent",
            Self::RandomMaxPercent(_) => "random-max-percent",
        }
    }

    /// The `value` companion of count/percent modes.
    pub fn value(&self) -> Option<u32> {
        match self {
            Self::One | Self::All => None,
            Self::Fixed(n) => Some(*n),
            Self::FixedPercent(p) | Self::RandomMaxPercent(p) => Some(u32::from(*p)),
        }
    }

    /// Whether a mode name needs a `value`.
    pub fn needs_value(name: &str) -> bool {
        matches!(name, "fixed" | "fixed-percent" | "random-max-percent")
    }

    /// Whether a mode name interprets `value` as a percentage.
    pub fn is_percent(name: &str) -> bool {
        matches!(name, "fixed-percent" | "random-max-percent")
    }

    /// Build a mode from its name and optional value.
    ///
    /// Returns `None` if the name is unknown or the value does not fit the mode.
    pub fn from_parts(name: &str, value: Option<u32>) -> Option<Self> {
        match (name, value) {
            ("one", _) => Some(Self::One),
            ("all", _) => Some(Self::All),
            ("fixed", Some(n)) if n >= 1 => Some(Self::Fixed(n)),
            ("fixed-percent", Some(p)) if (1..=100).contains(&p) => {
                Some(Self::FixedPercent(p as u8))
            }
            ("random-max-percent", Some(p)) if (1..=100).contains(&p) => {
                Some(Self::RandomMaxPercent(p as u8))
            }
            _ => None,
        }
    }
}

impl fmt::Display for SelectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Some(v) => write!(f, "{}({v})", self.name()),
            None => f.write_str(self.name()),
        }
    }
}

/// Identifies the pods a fault applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetSelector {
    /// Namespace the pods live in.
    pub namespace: String,
    /// Label selector; every label must match.
    #[serde(alias = "label_selector", alias = "labels")]
    pub label_selector: BTreeMap<String, String>,
    /// Restrict the fault to these containers.
    #[serde(default, alias = "container_names", skip_serializing_if = "Vec::is_empty")]
    pub container_names: Vec<String>,
}

impl TargetSelector {
    pub fn new(
        namespace: impl Into<String>,
        labels: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            label_selector: labels.into_iter().collect(),
            container_names: Vec::new(),
        }
    }

    /// Check namespace, labels and container names.
    pub fn check(&self) -> TargetResult<()> {
        check_namespace(&self.namespace)?;
        check_labels(&self.label_selector)?;
        if self.container_names.iter().any(|c| c.trim().is_empty()) {
            return Err(TargetError::EmptyContainerName);
        }
        Ok(())
    }
}

/// Target machines of a physical-machine experiment, as `host:port` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AddressList(Vec<String>);

impl AddressList {
    /// Parse and check a list of addresses.
    ///
    /// Each entry must be exactly `host:port`. A URI scheme is rejected with
    /// its own reason, since `http://host:port` is the most common mistake.
    pub fn parse<I, S>(entries: I) -> TargetResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.as_ref();
            check_address(entry)?;
            out.push(entry.to_string());
        }
        if out.is_empty() {
            return Err(TargetError::NoAddresses);
        }
        Ok(Self(out))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Either a pod selector or a list of machine addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targeting {
    Pods(TargetSelector),
    Machines(AddressList),
}

fn check_address(entry: &str) -> TargetResult<()> {
    if entry.contains("://") {
        return Err(TargetError::SchemePrefix);
    }
    let (host, port) = entry
        .rsplit_once(':')
        .ok_or_else(|| TargetError::NotHostPort(entry.to_string()))?;
    if host.is_empty() || host.contains('/') || host.contains(char::is_whitespace) {
        return Err(TargetError::InvalidHost(entry.to_string()));
    }
    // Bracketed IPv6 hosts keep their colons inside the brackets.
    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        return Err(TargetError::NotHostPort(entry.to_string()));
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(TargetError::InvalidPort(entry.to_string())),
    }
}

pub(crate) fn check_labels(labels: &BTreeMap<String, String>) -> TargetResult<()> {
    if labels.is_empty() {
        return Err(TargetError::EmptySelector);
    }
    for (key, value) in labels {
        check_label_key(key)?;
        if !RE_LABEL_VALUE.is_match(value) {
            return Err(TargetError::LabelValue {
                key: key.clone(),
                value: value.clone(),
            });
        }
    }
    Ok(())
}

pub(crate) fn check_label_key(key: &str) -> TargetResult<()> {
    if RE_LABEL_KEY.is_match(key) {
        Ok(())
    } else {
        Err(TargetError::LabelKey(key.to_string()))
    }
}

pub(crate) fn check_namespace(ns: &str) -> TargetResult<()> {
    if RE_DNS_LABEL.is_match(ns) {
        Ok(())
    } else {
        Err(TargetError::Namespace(ns.to_string()))
    }
}

pub(crate) fn check_resource_name(name: &str) -> TargetResult<()> {
    if name.len() <= 253 && RE_DNS_SUBDOMAIN.is_match(name) {
        Ok(())
    } else {
        Err(TargetError::ResourceName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_from_parts() {
        assert_eq!(SelectorMode::from_parts("all", None), Some(SelectorMode::All));
        assert_eq!(SelectorMode::from_parts("fixed", Some(3)), Some(SelectorMode::Fixed(3)));
        assert_eq!(
            SelectorMode::from_parts("fixed-percent", Some(50)),
            Some(SelectorMode::FixedPercent(50))
        );
        assert_eq!(SelectorMode::from_parts("fixed", None), None);
        assert_eq!(SelectorMode::from_parts("fixed-percent", Some(101)), None);
        assert_eq!(SelectorMode::from_parts("some", None), None);
    }

    #[test]
    fn addresses_require_host_port() {
        assert!(AddressList::parse(["10.0.0.5:31767"]).is_ok());
        assert!(AddressList::parse(["chaosd.internal:31767", "[::1]:31767"]).is_ok());
        assert_eq!(
            AddressList::parse(["10.0.0.5"]).unwrap_err(),
            TargetError::NotHostPort("10.0.0.5".into())
        );
        assert_eq!(
            AddressList::parse(["10.0.0.5:0"]).unwrap_err(),
            TargetError::InvalidPort("10.0.0.5:0".into())
        );
        assert!(AddressList::parse(["10.0.0.5:99999"]).is_err());
        assert_eq!(
            AddressList::parse(Vec::<String>::new()).unwrap_err(),
            TargetError::NoAddresses
        );
    }

    #[test]
    fn address_with_scheme_has_specific_reason() {
        for bad in ["http://10.0.0.5:31767", "https://10.0.0.5:31767"] {
            let err = AddressList::parse([bad]).unwrap_err();
            assert_eq!(err, TargetError::SchemePrefix);
            assert_eq!(err.to_string(), "must not include a protocol prefix");
        }
    }

    #[test]
    fn label_checks() {
        let mut labels = BTreeMap::new();
        assert!(check_labels(&labels).is_err());
        labels.insert("app".to_string(), "api".to_string());
        labels.insert("app.kubernetes.io/name".to_string(), "api-server".to_string());
        assert!(check_labels(&labels).is_ok());
        labels.insert("Bad Key".to_string(), "x".to_string());
        assert_eq!(
            check_labels(&labels).unwrap_err(),
            TargetError::LabelKey("Bad Key".into())
        );
    }

    #[test]
    fn selector_deserializes_with_aliases() {
        let sel: TargetSelector = serde_json::from_value(serde_json::json!({
            "namespace": "default",
            "labelSelector": {"app": "api"}
        }))
        .unwrap();
        assert_eq!(sel.label_selector["app"], "api");
        assert!(sel.check().is_ok());

        let sel: TargetSelector = serde_json::from_value(serde_json::json!({
            "namespace": "default",
            "labels": {"app": "api"},
            "container_names": ["web"]
        }))
        .unwrap();
        assert_eq!(sel.container_names, vec!["web".to_string()]);
    }

    #[test]
    fn names_and_namespaces() {
        assert!(check_namespace("chaos-testing").is_ok());
        assert!(check_namespace("Default").is_err());
        assert!(check_resource_name("network-delay-a3f4b2c1").is_ok());
        assert!(check_resource_name("-bad").is_err());
    }
}
