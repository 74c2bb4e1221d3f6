//! Configuration: TOML file with every field defaulted.
//!
//! Looked up at `--config <path>` or
//! `$XDG_CONFIG_HOME/chaos-mesh-tools/config.toml`; a missing default file
//! means all defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::lifecycle::PauseAnnotation;
use crate::target;

/// How to reach the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    /// kubectl binary (name on `PATH` or absolute path).
    pub kubectl: String,
    /// Kubeconfig file; kubectl's own lookup when unset.
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context; the current context when unset.
    pub context: Option<String>,
    /// Upper bound for every single cluster call.
    pub timeout_secs: u64,
    /// Largest accepted kubectl output.
    pub max_output_bytes: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".into(),
            kubeconfig: None,
            context: None,
            timeout_secs: 30,
            max_output_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChaosConfig {
    pub cluster: ClusterConfig,
    /// Namespace Chaos Mesh itself is installed in.
    pub chaos_namespace: String,
    /// Namespace for experiments that do not name one.
    pub default_namespace: String,
    /// Annotation key that pauses an experiment.
    pub pause_annotation: String,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            chaos_namespace: "chaos-mesh".into(),
            default_namespace: "default".into(),
            pause_annotation: PauseAnnotation::CHAOS_MESH_2X_KEY.into(),
        }
    }
}

impl ChaosConfig {
    /// Load and check a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.check()?;
        Ok(config)
    }

    /// Load `explicit` if given, else the default file if it exists, else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Reject values that would make every call fail.
    pub fn check(&self) -> ConfigResult<()> {
        let invalid = |message: String| ConfigError::Invalid { message };
        if self.cluster.kubectl.trim().is_empty() {
            return Err(invalid("cluster.kubectl must not be empty".into()));
        }
        if self.cluster.timeout_secs == 0 {
            return Err(invalid("cluster.timeout_secs must be at least 1".into()));
        }
        if self.cluster.max_output_bytes == 0 {
            return Err(invalid("cluster.max_output_bytes must be at least 1".into()));
        }
        target::check_namespace(&self.chaos_namespace)
            .map_err(|m| invalid(format!("chaos_namespace: {m}")))?;
        target::check_namespace(&self.default_namespace)
            .map_err(|m| invalid(format!("default_namespace: {m}")))?;
        PauseAnnotation::new(&self.pause_annotation)
            .map_err(|m| invalid(format!("pause_annotation: {m}")))?;
        Ok(())
    }

    /// The configured pause annotation.
    pub fn pause(&self) -> PauseAnnotation {
        PauseAnnotation::new(&self.pause_annotation).unwrap_or_default()
    }
}

/// `$XDG_CONFIG_HOME/chaos-mesh-tools/config.toml`, falling back to `~/.config`.
pub fn default_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("chaos-mesh-tools").join("config.toml"))
}
