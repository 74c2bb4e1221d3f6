//! Rich diagnostic error types for chaos-mesh-tools.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so the calling agent can tell "the input
//! was wrong" apart from "the cluster was not ready".

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum ChaosError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tool(#[from] ToolError),
}

/// Whether an error was caused by the caller's input or by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The parameters were invalid; fix them and try again.
    InvalidInput,
    /// The cluster or environment was not ready; run a capability check.
    Environment,
    /// The tool itself is misconfigured and cannot serve requests.
    Configuration,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Environment => "environment",
            Self::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChaosError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Schema(_) | Self::Config(_) => ErrorCategory::Configuration,
            Self::Validation(_) | Self::Cluster(ClusterError::Ambiguous { .. }) => {
                ErrorCategory::InvalidInput
            }
            Self::Cluster(_) => ErrorCategory::Environment,
            Self::Tool(e) => e.category(),
        }
    }
}

// ---------------------------------------------------------------------------
// Schema errors
// ---------------------------------------------------------------------------

/// Startup-time inconsistencies in the built-in schema catalog.
///
/// These are fatal: a registry that fails to compile must not serve any tool.
#[derive(Debug, Error, Diagnostic)]
pub enum SchemaError {
    #[error("inconsistent schema for {kind}/{action}: {message}")]
    #[diagnostic(
        code(chaos::schema::inconsistent),
        help(
            "A built-in field specification contradicts itself (for example a default \
             outside its own domain, or a rule naming an undeclared field). \
             This is a bug in the catalog, not in your input."
        )
    )]
    Inconsistent {
        kind: String,
        action: String,
        message: String,
    },

    #[error("no field specification registered for {kind}/{action}")]
    #[diagnostic(
        code(chaos::schema::missing_entry),
        help("Every chaos action must have exactly one catalog entry.")
    )]
    MissingEntry { kind: String, action: String },

    #[error("duplicate field specification for {kind}/{action}")]
    #[diagnostic(
        code(chaos::schema::duplicate_entry),
        help("Remove the second catalog entry for this action.")
    )]
    DuplicateEntry { kind: String, action: String },
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Parameter validation failures. Local, pure, and always fixable by
/// correcting the input; none of these ever touch the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ValidationError {
    #[error("unknown chaos action \"{action}\" for kind {kind}")]
    #[diagnostic(
        code(chaos::validate::unknown_action),
        help("List the available tools to see which actions each chaos kind supports.")
    )]
    UnknownChaosAction { kind: String, action: String },

    #[error("missing required field \"{field}\"")]
    #[diagnostic(
        code(chaos::validate::missing_field),
        help("Supply the field; its description is listed in the tool signature.")
    )]
    MissingField { field: String },

    #[error("invalid value for \"{field}\": {reason}")]
    #[diagnostic(
        code(chaos::validate::invalid_value),
        help("Correct the value to match the field's documented format.")
    )]
    InvalidFieldValue { field: String, reason: String },

    #[error("unknown field \"{field}\"")]
    #[diagnostic(
        code(chaos::validate::unknown_field),
        help("The parameter set is closed: remove the field or check its spelling.")
    )]
    UnknownField { field: String },
}

impl ValidationError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFieldValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// The field this error is about, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::UnknownChaosAction { .. } => None,
            Self::MissingField { field }
            | Self::InvalidFieldValue { field, .. }
            | Self::UnknownField { field } => Some(field),
        }
    }
}

// ---------------------------------------------------------------------------
// Target errors
// ---------------------------------------------------------------------------

/// Why a selector, address, name or namespace was rejected.
///
/// Surfaced to callers as the reason of a [`ValidationError::InvalidFieldValue`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("must not include a protocol prefix")]
    SchemePrefix,

    #[error("'{0}' must be host:port")]
    NotHostPort(String),

    #[error("'{0}' has an invalid host")]
    InvalidHost(String),

    #[error("'{0}' has an invalid port")]
    InvalidPort(String),

    #[error("at least one address is required")]
    NoAddresses,

    #[error("label selector cannot be empty")]
    EmptySelector,

    #[error("invalid label value '{value}' for key '{key}'")]
    LabelValue { key: String, value: String },

    #[error("invalid annotation or label key '{0}'")]
    LabelKey(String),

    #[error("container names must be non-empty")]
    EmptyContainerName,

    #[error("'{0}' is not a valid namespace name")]
    Namespace(String),

    #[error("'{0}' is not a valid resource name (lowercase alphanumerics, '-' and '.')")]
    ResourceName(String),
}

// ---------------------------------------------------------------------------
// Cluster errors
// ---------------------------------------------------------------------------

/// Failures of a call to the cluster control plane.
///
/// Surfaced verbatim with the underlying cause and never retried: chaos
/// operations are not safe to repeat automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ClusterError {
    #[error("cluster unreachable: {cause}")]
    #[diagnostic(
        code(chaos::cluster::unreachable),
        help(
            "Check that kubectl is installed, the kubeconfig/context is correct, \
             and the API server is reachable."
        )
    )]
    Unreachable { cause: String },

    #[error("permission denied: {cause}")]
    #[diagnostic(
        code(chaos::cluster::forbidden),
        help("The service account or user lacks RBAC permissions for this operation.")
    )]
    PermissionDenied { cause: String },

    #[error("resource conflict: {cause}")]
    #[diagnostic(
        code(chaos::cluster::conflict),
        help(
            "Another writer changed the resource concurrently, or the name is taken. \
             Re-read its state before deciding whether to try again."
        )
    )]
    Conflict { cause: String },

    #[error("{kind} \"{name}\" not found in namespace \"{namespace}\"")]
    #[diagnostic(
        code(chaos::cluster::not_found),
        help("List the active experiments to see which names exist in this namespace.")
    )]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    #[error("\"{name}\" in namespace \"{namespace}\" matches more than one kind: {kinds}")]
    #[diagnostic(
        code(chaos::cluster::ambiguous),
        help("Pass `kind` to say which experiment is meant.")
    )]
    Ambiguous {
        name: String,
        namespace: String,
        kinds: String,
    },

    #[error("cluster call timed out after {secs}s: {command}")]
    #[diagnostic(
        code(chaos::cluster::timeout),
        help("Raise `timeout_secs` in the configuration or check API server latency.")
    )]
    Timeout { command: String, secs: u64 },

    #[error("cluster command failed: {command}: {stderr}")]
    #[diagnostic(
        code(chaos::cluster::command),
        help("The control plane rejected the request. The message above is its own.")
    )]
    Command { command: String, stderr: String },

    #[error("unexpected output from {command}: {message}")]
    #[diagnostic(
        code(chaos::cluster::malformed_output),
        help("The control plane returned something that is not the expected JSON.")
    )]
    MalformedOutput { command: String, message: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    #[diagnostic(
        code(chaos::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(
        code(chaos::config::parse),
        help("The file must be valid TOML; unknown keys are rejected.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(chaos::config::invalid))]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Tool errors
// ---------------------------------------------------------------------------

/// Failures returned by a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ToolError {
    #[error("unknown tool: {name}")]
    #[diagnostic(
        code(chaos::tool::not_found),
        help("Run `chaos-tools tools` to list the registered tools.")
    )]
    NotFound { name: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cluster(#[from] ClusterError),
}

impl ToolError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. }
            | Self::Validation(_)
            | Self::Cluster(ClusterError::Ambiguous { .. }) => ErrorCategory::InvalidInput,
            Self::Cluster(_) => ErrorCategory::Environment,
        }
    }

    /// Structured form handed back to the calling agent.
    pub fn to_response(&self) -> serde_json::Value {
        let code = self.code().map(|c| c.to_string());
        let mut body = serde_json::json!({
            "category": self.category().as_str(),
            "code": code,
            "message": self.to_string(),
        });
        if let Some(field) = match self {
            Self::Validation(v) => v.field(),
            _ => None,
        } {
            body["field"] = serde_json::Value::from(field);
        }
        serde_json::json!({ "error": body })
    }
}

/// Convenience alias for top-level operations.
pub type ChaosResult<T> = std::result::Result<T, ChaosError>;

pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

pub type TargetResult<T> = std::result::Result<T, TargetError>;

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub type ToolResult<T> = std::result::Result<T, ToolError>;
