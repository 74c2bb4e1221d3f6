// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # chaos-mesh-tools
//!
//! Agent-callable tools for Chaos Mesh: loosely-typed tool arguments go in,
//! validated and well-formed chaos resources come out, and the cluster is
//! asked whether it can actually run them.
//!
//! ## Architecture
//!
//! - **Schema registry** (`schema`): one field specification per chaos action,
//!   checked for consistency at startup
//! - **Validator** (`validate`): raw JSON arguments to typed, defaulted parameters
//! - **Renderer** (`render`): parameters to a `chaos-mesh.org/v1alpha1` document
//! - **Capability checker** (`capability`): CRDs and components, per chaos kind
//! - **Lifecycle** (`lifecycle`): submit, status, list, pause, resume, delete
//! - **Cluster** (`cluster`): the control-plane seam, driven through `kubectl`
//! - **Tools** (`tools`): the 33 operations exposed to the agent
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use chaos_mesh_tools::cluster::Kubectl;
//! use chaos_mesh_tools::config::ChaosConfig;
//! use chaos_mesh_tools::tools::{self, ToolInput};
//! use serde_json::json;
//!
//! let config = ChaosConfig::default();
//! let cluster = Arc::new(Kubectl::from_config(&config.cluster));
//! let (registry, ctx) = tools::build(cluster, config).unwrap();
//! let input = ToolInput::from_value(json!({
//!     "target_labels": {"app": "web"},
//!     "latency": "100ms",
//!     "duration": "60s",
//! }))
//! .unwrap();
//! let result = registry.call("create_network_delay", input, &ctx);
//! println!("{result}");
//! ```

pub mod capability;
pub mod cluster;
pub mod config;
pub mod duration;
pub mod error;
pub mod kind;
pub mod lifecycle;
pub mod render;
pub mod schema;
pub mod target;
pub mod tools;
pub mod validate;
