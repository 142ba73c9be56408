//! [`HelmDriver`] backed by the `helm` binary.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use o2bridge_core::{Ctx, Extensions, O2Error, O2Result};
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::driver::{HelmDriver, HistoryEntry, InstallSpec, ReleaseInfo, ReleaseSummary, UpgradeSpec};

/// Upper bound on `helm history` rows.
pub const HISTORY_MAX: u32 = 256;

#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: PathBuf,
    kube_context: Option<String>,
    kubeconfig: Option<PathBuf>,
}

impl HelmCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into(), kube_context: None, kubeconfig: None }
    }

    pub fn kube_context(mut self, ctx: Option<String>) -> Self {
        self.kube_context = ctx.filter(|s| !s.is_empty());
        self
    }

    pub fn kubeconfig(mut self, path: Option<PathBuf>) -> Self {
        self.kubeconfig = path;
        self
    }

    fn global_args(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(c) = &self.kube_context {
            out.push(format!("--kube-context={}", c));
        }
        if let Some(p) = &self.kubeconfig {
            out.push(format!("--kubeconfig={}", p.display()));
        }
        out
    }

    /// Run helm with `args`; stdout on success, a classified error otherwise. The child is killed
    /// when the context ends first.
    async fn run(&self, ctx: &Ctx, args: Vec<String>) -> O2Result<Vec<u8>> {
        let op = args.first().cloned().unwrap_or_default();
        let t0 = Instant::now();
        let split = args.iter().position(|a| a == "--").unwrap_or(args.len());
        let mut cmd = Command::new(&self.binary);
        cmd.args(&args[..split])
            .args(self.global_args())
            .args(&args[split..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let out = ctx
            .run(&op, async {
                cmd.output()
                    .await
                    .map_err(|e| O2Error::ConnectionFailed(format!("spawning {}: {}", self.binary.display(), e)))
            })
            .await?;
        debug!(op = %op, code = ?out.status.code(), took_ms = t0.elapsed().as_millis() as u64, "helm");
        if out.status.success() {
            return Ok(out.stdout);
        }
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        warn!(op = %op, code = ?out.status.code(), stderr = %stderr, "helm failed");
        Err(classify_stderr(&stderr))
    }

    async fn run_json<T: DeserializeOwned>(&self, ctx: &Ctx, args: Vec<String>) -> O2Result<T> {
        let op = args.first().cloned().unwrap_or_default();
        let out = self.run(ctx, args).await?;
        serde_json::from_slice(&out).map_err(|e| O2Error::Internal(format!("helm {}: decoding output: {}", op, e)))
    }
}

impl Default for HelmCli {
    fn default() -> Self { Self::new("helm") }
}

/// Map helm's stderr onto the error taxonomy.
pub fn classify_stderr(stderr: &str) -> O2Error {
    let msg = stderr.strip_prefix("Error: ").unwrap_or(stderr).to_string();
    let lower = msg.to_ascii_lowercase();
    if lower.contains("release: not found") || lower.contains("not found") {
        O2Error::NotFound(msg)
    } else if lower.contains("cannot re-use a name that is still in use") {
        O2Error::AlreadyExists(msg)
    } else if lower.contains("another operation") && lower.contains("in progress") {
        O2Error::Conflict(msg)
    } else if lower.contains("unauthorized") || lower.contains("forbidden") {
        O2Error::AuthenticationFailed(msg)
    } else if lower.contains("cluster unreachable") || lower.contains("connection refused") {
        O2Error::ConnectionFailed(msg)
    } else if lower.contains("invalid") || lower.contains("unknown flag") || lower.contains("parse error") {
        O2Error::InvalidArgument(msg)
    } else {
        O2Error::Internal(format!("helm: {}", msg))
    }
}

/// Values as a YAML temp file; the file lives as long as the returned handle.
fn values_file(values: &Extensions) -> O2Result<NamedTempFile> {
    let yaml = serde_yaml::to_string(values).map_err(|e| O2Error::InvalidArgument(format!("values: {}", e)))?;
    let mut f = tempfile::Builder::new()
        .prefix("o2bridge-values-")
        .suffix(".yaml")
        .tempfile()
        .map_err(|e| O2Error::Internal(format!("values file: {}", e)))?;
    f.write_all(yaml.as_bytes()).map_err(|e| O2Error::Internal(format!("values file: {}", e)))?;
    f.flush().map_err(|e| O2Error::Internal(format!("values file: {}", e)))?;
    Ok(f)
}

fn chart_args(args: &mut Vec<String>, version: &Option<String>, repo: &Option<String>) {
    if let Some(v) = version.as_ref().filter(|v| !v.is_empty()) {
        args.push(format!("--version={}", v));
    }
    if let Some(r) = repo.as_ref().filter(|r| !r.is_empty()) {
        args.push(format!("--repo={}", r));
    }
}

fn strings<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Request-supplied values only ever appear as `--flag=value` or after the `--` terminator.
fn positionals<const N: usize>(args: &mut Vec<String>, items: [&str; N]) {
    args.push("--".to_string());
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Arguments for `helm install`; kept apart from spawning so they can be checked directly.
pub fn install_args(spec: &InstallSpec, values_path: Option<&str>) -> Vec<String> {
    let mut args = vec!["install".to_string(), format!("--namespace={}", spec.namespace)];
    args.extend(strings(["--create-namespace", "-o", "json"]));
    chart_args(&mut args, &spec.version, &spec.repo);
    if let Some(p) = values_path {
        args.push(format!("--values={}", p));
    }
    if !spec.description.is_empty() {
        args.push(format!("--description={}", spec.description));
    }
    positionals(&mut args, [&spec.release, &spec.chart]);
    args
}

pub fn upgrade_args(spec: &UpgradeSpec, values_path: Option<&str>) -> Vec<String> {
    let mut args = vec!["upgrade".to_string(), format!("--namespace={}", spec.namespace)];
    args.extend(strings(["-o", "json"]));
    chart_args(&mut args, &spec.version, &spec.repo);
    match values_path {
        Some(p) => args.extend(["--reset-values".to_string(), format!("--values={}", p)]),
        None => args.push("--reuse-values".to_string()),
    }
    for (k, v) in &spec.set {
        args.push(format!("--set={}={}", k, v));
    }
    if !spec.description.is_empty() {
        args.push(format!("--description={}", spec.description));
    }
    positionals(&mut args, [&spec.release, &spec.chart]);
    args
}

fn release_args(op: &str, release: &str, namespace: &str, extra: &[&str]) -> Vec<String> {
    let mut args = vec![op.to_string(), format!("--namespace={}", namespace)];
    args.extend(extra.iter().map(|s| s.to_string()));
    positionals(&mut args, [release]);
    args
}

#[async_trait]
impl HelmDriver for HelmCli {
    async fn version(&self, ctx: &Ctx) -> O2Result<String> {
        let out = self.run(ctx, strings(["version", "--short"])).await?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    async fn install(&self, ctx: &Ctx, spec: &InstallSpec) -> O2Result<ReleaseInfo> {
        let file = if spec.values.is_empty() { None } else { Some(values_file(&spec.values)?) };
        let path = file.as_ref().map(|f| f.path().display().to_string());
        self.run_json(ctx, install_args(spec, path.as_deref())).await
    }

    async fn upgrade(&self, ctx: &Ctx, spec: &UpgradeSpec) -> O2Result<ReleaseInfo> {
        let file = match &spec.values {
            Some(v) => Some(values_file(v)?),
            None => None,
        };
        let path = file.as_ref().map(|f| f.path().display().to_string());
        self.run_json(ctx, upgrade_args(spec, path.as_deref())).await
    }

    async fn rollback(&self, ctx: &Ctx, release: &str, namespace: &str, revision: u64) -> O2Result<()> {
        let mut args = release_args("rollback", release, namespace, &[]);
        args.push(revision.to_string());
        self.run(ctx, args).await.map(|_| ())
    }

    async fn uninstall(&self, ctx: &Ctx, release: &str, namespace: &str) -> O2Result<()> {
        self.run(ctx, release_args("uninstall", release, namespace, &[])).await.map(|_| ())
    }

    async fn list(&self, ctx: &Ctx, namespace: Option<&str>) -> O2Result<Vec<ReleaseSummary>> {
        let mut args = strings(["list", "--all", "-o", "json"]);
        match namespace {
            Some(ns) => args.push(format!("--namespace={}", ns)),
            None => args.push("--all-namespaces".to_string()),
        }
        self.run_json(ctx, args).await
    }

    async fn status(&self, ctx: &Ctx, release: &str, namespace: &str) -> O2Result<ReleaseInfo> {
        self.run_json(ctx, release_args("status", release, namespace, &["-o", "json"])).await
    }

    async fn history(&self, ctx: &Ctx, release: &str, namespace: &str) -> O2Result<Vec<HistoryEntry>> {
        let max = format!("--max={}", HISTORY_MAX);
        self.run_json(ctx, release_args("history", release, namespace, &[&max, "-o", "json"])).await
    }
}
