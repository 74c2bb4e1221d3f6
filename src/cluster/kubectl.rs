//! [`ClusterApi`] over the `kubectl` binary.
//!
//! The binary is executed directly (no shell) with JSON output, a bounded
//! timeout, and stderr classified into [`ClusterError`] variants.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{ChildStdin, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::{ClusterApi, PodSummary, lookup_label, not_found, single};
use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::kind::ChaosKind;

/// Runs `kubectl` subcommands.
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
    timeout: Duration,
    max_output_bytes: usize,
}

/// The object a command addresses, for not-found reporting.
struct Object<'a> {
    kind: &'a str,
    name: &'a str,
    namespace: &'a str,
}

impl Kubectl {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig: None,
            context: None,
            timeout: Duration::from_secs(30),
            max_output_bytes: 16 * 1024 * 1024,
        }
    }

    pub fn from_config(config: &ClusterConfig) -> Self {
        Self {
            binary: config.kubectl.clone(),
            kubeconfig: config.kubeconfig.clone(),
            context: config.context.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_output_bytes: config.max_output_bytes,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.kubeconfig {
            args.push(format!("--kubeconfig={}", path.display()));
        }
        if let Some(ctx) = &self.context {
            args.push(format!("--context={ctx}"));
        }
        args.push(format!("--request-timeout={}s", self.timeout.as_secs().max(1)));
        args
    }

    /// Run one command, returning stdout on success.
    fn run(&self, args: &[&str], stdin: Option<&[u8]>, object: Option<Object<'_>>) -> ClusterResult<String> {
        let mut full: Vec<String> = self.global_args();
        full.extend(args.iter().map(|a| a.to_string()));
        let shown = format!("{} {}", self.binary, args.join(" "));
        tracing::debug!(command = %shown, "kubectl");

        let mut cmd = Command::new(&self.binary);
        cmd.args(&full)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| ClusterError::Unreachable {
            cause: format!("failed to run {}: {e}", self.binary),
        })?;

        // Feed stdin and drain both pipes off this thread so neither a large
        // body nor a large output can stall the deadline below.
        feed(stdin, child.stdin.take());
        let stdout = drain(child.stdout.take(), self.max_output_bytes);
        let stderr = drain(child.stderr.take(), self.max_output_bytes);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ClusterError::Timeout {
                            command: shown,
                            secs: self.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(ClusterError::Command {
                        command: shown,
                        stderr: format!("failed to wait on kubectl: {e}"),
                    });
                }
            }
        };

        let stdout = join(stdout);
        let stderr = String::from_utf8_lossy(&join(stderr)).trim().to_string();

        if !status.success() {
            return Err(classify(&shown, &stderr, object));
        }
        if stdout.len() > self.max_output_bytes {
            return Err(ClusterError::MalformedOutput {
                command: shown,
                message: format!("output exceeded {} bytes", self.max_output_bytes),
            });
        }
        String::from_utf8(stdout).map_err(|e| ClusterError::MalformedOutput {
            command: shown,
            message: e.to_string(),
        })
    }

    fn decode(&self, args: &[&str], out: &str) -> ClusterResult<Value> {
        serde_json::from_str(out).map_err(|e| ClusterError::MalformedOutput {
            command: format!("{} {}", self.binary, args.join(" ")),
            message: e.to_string(),
        })
    }

    fn run_json(&self, args: &[&str], stdin: Option<&[u8]>, object: Option<Object<'_>>) -> ClusterResult<Value> {
        let out = self.run(args, stdin, object)?;
        self.decode(args, &out)
    }
}

/// Write `input` to the child's stdin on a detached thread; the pipe closes
/// when the write finishes or fails.
fn feed(input: Option<&[u8]>, pipe: Option<ChildStdin>) {
    if let (Some(input), Some(mut pipe)) = (input.map(<[u8]>::to_vec), pipe) {
        std::thread::spawn(move || {
            if let Err(e) = pipe.write_all(&input) {
                tracing::debug!(error = %e, "kubectl closed stdin early");
            }
        });
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>, limit: usize) -> Option<JoinHandle<Vec<u8>>> {
    let pipe = pipe?;
    Some(std::thread::spawn(move || {
        let mut buf = Vec::new();
        // One byte over the limit is enough to detect overflow.
        let _ = pipe.take(limit as u64 + 1).read_to_end(&mut buf);
        buf
    }))
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Comma-joined resource names, so one command covers every kind.
fn resource_arg(kinds: &[ChaosKind]) -> String {
    kinds
        .iter()
        .map(|k| k.crd_name())
        .collect::<Vec<_>>()
        .join(",")
}

/// Kinds named by `-o name` output lines such as `podchaos.chaos-mesh.org/exp`.
fn named_kinds(out: &str) -> Vec<ChaosKind> {
    let mut kinds = Vec::new();
    for line in out.lines() {
        let kind = line
            .split_whitespace()
            .next()
            .and_then(|word| word.split_once('/'))
            .and_then(|(resource, _)| ChaosKind::from_crd_name(resource));
        if let Some(k) = kind {
            if !kinds.contains(&k) {
                kinds.push(k);
            }
        }
    }
    kinds
}

fn items(doc: Value) -> Vec<Value> {
    match doc {
        Value::Object(mut obj) => match obj.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Map a failed command's stderr to an error variant.
fn classify(command: &str, stderr: &str, object: Option<Object<'_>>) -> ClusterError {
    let lower = stderr.to_ascii_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("(notfound)")
        || has("not found")
        || has("doesn't have a resource type")
        || has("no objects passed")
    {
        if let Some(o) = object {
            return ClusterError::NotFound {
                kind: o.kind.to_string(),
                name: o.name.to_string(),
                namespace: o.namespace.to_string(),
            };
        }
    }
    if has("forbidden") || has("unauthorized") {
        return ClusterError::PermissionDenied {
            cause: stderr.to_string(),
        };
    }
    if has("alreadyexists")
        || has("already exists")
        || has("(conflict)")
        || has("the object has been modified")
    {
        return ClusterError::Conflict {
            cause: stderr.to_string(),
        };
    }
    if has("unable to connect")
        || has("connection refused")
        || has("no such host")
        || has("i/o timeout")
        || has("was refused")
        || has("no configuration has been provided")
    {
        return ClusterError::Unreachable {
            cause: stderr.to_string(),
        };
    }
    ClusterError::Command {
        command: command.to_string(),
        stderr: stderr.to_string(),
    }
}

impl ClusterApi for Kubectl {
    fn ping(&self) -> ClusterResult<()> {
        self.run(&["version", "-o", "json"], None, None).map(|_| ())
    }

    fn create(&self, document: &Value) -> ClusterResult<String> {
        let body = document.to_string();
        let created = self.run_json(&["create", "-f", "-", "-o", "json"], Some(body.as_bytes()), None)?;
        created
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClusterError::MalformedOutput {
                command: format!("{} create", self.binary),
                message: "created resource has no metadata.name".into(),
            })
    }

    fn get(&self, kinds: &[ChaosKind], name: &str, namespace: &str) -> ClusterResult<Value> {
        let resources = resource_arg(kinds);
        let args = [
            "get",
            resources.as_str(),
            name,
            "-n",
            namespace,
            "--ignore-not-found",
            "-o",
            "json",
        ];
        let object = Object {
            kind: lookup_label(kinds),
            name,
            namespace,
        };
        let out = self.run(&args, None, Some(object))?;
        // Nothing at all is printed when every kind misses.
        let found = if out.trim().is_empty() {
            Vec::new()
        } else {
            let doc = self.decode(&args, &out)?;
            if doc.get("items").is_some() {
                items(doc)
            } else {
                vec![doc]
            }
        };
        single(found, kinds, name, namespace)
    }

    fn list(&self, kinds: &[ChaosKind], namespace: Option<&str>) -> ClusterResult<Vec<Value>> {
        let resources = resource_arg(kinds);
        // A missing CRD reads as not-found.
        let object = Some(Object {
            kind: lookup_label(kinds),
            name: "",
            namespace: namespace.unwrap_or(""),
        });
        let doc = match namespace {
            Some(ns) => self.run_json(&["get", resources.as_str(), "-n", ns, "-o", "json"], None, object)?,
            None => self.run_json(
                &["get", resources.as_str(), "--all-namespaces", "-o", "json"],
                None,
                object,
            )?,
        };
        Ok(items(doc))
    }

    fn delete(&self, kinds: &[ChaosKind], name: &str, namespace: &str) -> ClusterResult<Vec<ChaosKind>> {
        let resources = resource_arg(kinds);
        let out = self.run(
            &[
                "delete",
                resources.as_str(),
                name,
                "-n",
                namespace,
                "--ignore-not-found",
                "--wait=false",
                "-o",
                "name",
            ],
            None,
            Some(Object {
                kind: lookup_label(kinds),
                name,
                namespace,
            }),
        )?;
        let deleted = named_kinds(&out);
        if deleted.is_empty() {
            return Err(not_found(kinds, name, namespace));
        }
        Ok(deleted)
    }

    fn annotate(
        &self,
        kinds: &[ChaosKind],
        name: &str,
        namespace: &str,
        key: &str,
        value: Option<&str>,
    ) -> ClusterResult<Vec<ChaosKind>> {
        let resources = resource_arg(kinds);
        // Selecting by name lets kinds that lack the resource match nothing
        // instead of failing the whole command.
        let selector = format!("metadata.name={name}");
        let change = match value {
            Some(v) => format!("{key}={v}"),
            None => format!("{key}-"),
        };
        let out = self.run(
            &[
                "annotate",
                resources.as_str(),
                "-n",
                namespace,
                "--field-selector",
                selector.as_str(),
                change.as_str(),
                "--overwrite",
                "-o",
                "name",
            ],
            None,
            Some(Object {
                kind: lookup_label(kinds),
                name,
                namespace,
            }),
        )?;
        let changed = named_kinds(&out);
        if changed.is_empty() {
            return Err(not_found(kinds, name, namespace));
        }
        Ok(changed)
    }

    fn list_events(&self, involved_name: &str, namespace: &str) -> ClusterResult<Vec<Value>> {
        let selector = format!("involvedObject.name={involved_name}");
        let doc = self.run_json(
            &["get", "events", "-n", namespace, "--field-selector", selector.as_str(), "-o", "json"],
            None,
            None,
        )?;
        Ok(items(doc))
    }

    fn list_crds(&self) -> ClusterResult<Vec<String>> {
        let doc = self.run_json(&["get", "crd", "-o", "json"], None, None)?;
        Ok(items(doc)
            .iter()
            .filter_map(|crd| crd.pointer("/metadata/name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    fn list_pods(&self, namespace: &str) -> ClusterResult<Vec<PodSummary>> {
        let doc = self.run_json(&["get", "pods", "-n", namespace, "-o", "json"], None, None)?;
        Ok(items(doc).iter().filter_map(PodSummary::from_document).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj() -> Option<Object<'static>> {
        Some(Object {
            kind: "PodChaos",
            name: "pk",
            namespace: "default",
        })
    }

    #[test]
    fn classify_not_found_needs_an_object() {
        let stderr = r#"Error from server (NotFound): podchaos.chaos-mesh.org "pk" not found"#;
        assert!(matches!(
            classify("kubectl get", stderr, obj()),
            ClusterError::NotFound { .. }
        ));
        assert!(matches!(
            classify("kubectl get", stderr, None),
            ClusterError::Command { .. }
        ));
    }

    #[test]
    fn classify_server_errors() {
        let forbidden = r#"Error from server (Forbidden): podchaos.chaos-mesh.org is forbidden: User "ci" cannot create resource"#;
        assert!(matches!(
            classify("c", forbidden, None),
            ClusterError::PermissionDenied { .. }
        ));

        let exists = r#"Error from server (AlreadyExists): podchaos.chaos-mesh.org "pk" already exists"#;
        assert!(matches!(classify("c", exists, None), ClusterError::Conflict { .. }));

        let modified = "Operation cannot be fulfilled on podchaos.chaos-mesh.org \"pk\": the object has been modified; please apply your changes to the latest version and try again";
        assert!(matches!(classify("c", modified, obj()), ClusterError::Conflict { .. }));

        let down = "The connection to the server localhost:8080 was refused - did you specify the right host or port?";
        assert!(matches!(classify("c", down, None), ClusterError::Unreachable { .. }));

        let other = "error: unknown flag: --bogus";
        assert!(matches!(classify("c", other, None), ClusterError::Command { .. }));
    }

    #[test]
    fn missing_binary_is_unreachable() {
        let k = Kubectl::new("/nonexistent/kubectl-for-tests");
        assert!(matches!(k.ping(), Err(ClusterError::Unreachable { .. })));
    }

    #[test]
    fn global_args_carry_context_and_timeout() {
        let mut k = Kubectl::new("kubectl").with_timeout(Duration::from_secs(10));
        k.context = Some("staging".into());
        let args = k.global_args();
        assert!(args.contains(&"--context=staging".to_string()));
        assert!(args.contains(&"--request-timeout=10s".to_string()));
    }

    #[test]
    fn kinds_from_name_output() {
        let out = "podchaos.chaos-mesh.org/exp\nnetworkchaos.chaos-mesh.org/exp annotated\n";
        assert_eq!(named_kinds(out), vec![ChaosKind::Pod, ChaosKind::Network]);
        assert!(named_kinds("").is_empty());
        assert!(named_kinds("pod/exp").is_empty());
    }

    #[test]
    fn one_resource_argument_covers_every_kind() {
        let arg = resource_arg(&ChaosKind::ALL);
        assert_eq!(arg.split(',').count(), ChaosKind::ALL.len());
        assert!(arg.starts_with("networkchaos.chaos-mesh.org,"));
        assert_eq!(resource_arg(&[ChaosKind::DNS]), "dnschaos.chaos-mesh.org");
    }

    #[test]
    fn nothing_to_annotate_is_not_found() {
        let stderr = "error: no objects passed to annotate";
        assert!(matches!(
            classify("kubectl annotate", stderr, obj()),
            ClusterError::NotFound { .. }
        ));
    }

    /// A fake kubectl that never reads stdin and outlives the timeout.
    #[cfg(unix)]
    #[test]
    fn unread_stdin_cannot_outlast_the_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("kubectl");
        std::fs::write(&script, "#!/bin/sh\nsleep 10\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let k = Kubectl::new(script.display().to_string()).with_timeout(Duration::from_secs(1));
        let body = serde_json::json!({
            "kind": "PodChaos",
            "metadata": {"name": "big"},
            "spec": {"padding": "x".repeat(4 * 1024 * 1024)},
        });
        let started = Instant::now();
        let err = k.create(&body).unwrap_err();
        assert!(matches!(err, ClusterError::Timeout { secs: 1, .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn items_extracts_list() {
        let doc = serde_json::json!({"kind": "List", "items": [{"a": 1}, {"b": 2}]});
        assert_eq!(items(doc).len(), 2);
        assert!(items(serde_json::json!({"kind": "List"})).is_empty());
    }
}
