//! Release operations behind a trait, plus the JSON shapes `helm ... -o json` prints.

use o2bridge_core::{Ctx, Extensions, O2Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallSpec {
    pub release: String,
    pub namespace: String,
    /// Chart name (with `repo`), `repo/chart`, a path, or an `oci://` reference.
    pub chart: String,
    pub version: Option<String>,
    pub repo: Option<String>,
    pub values: Extensions,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeSpec {
    pub release: String,
    pub namespace: String,
    pub chart: String,
    pub version: Option<String>,
    pub repo: Option<String>,
    /// `None` keeps the previous values (`--reuse-values`); `Some` replaces them.
    pub values: Option<Extensions>,
    /// `--set k=v` overrides, applied after the values file.
    pub set: Vec<(String, String)>,
    pub description: String,
}

/// Drives Helm for one cluster. Implementations must be safe to call concurrently.
#[async_trait::async_trait]
pub trait HelmDriver: Send + Sync {
    /// Client version string; doubles as the health probe.
    async fn version(&self, ctx: &Ctx) -> O2Result<String>;

    async fn install(&self, ctx: &Ctx, spec: &InstallSpec) -> O2Result<ReleaseInfo>;

    async fn upgrade(&self, ctx: &Ctx, spec: &UpgradeSpec) -> O2Result<ReleaseInfo>;

    async fn rollback(&self, ctx: &Ctx, release: &str, namespace: &str, revision: u64) -> O2Result<()>;

    async fn uninstall(&self, ctx: &Ctx, release: &str, namespace: &str) -> O2Result<()>;

    /// Releases in every state; `None` lists all namespaces.
    async fn list(&self, ctx: &Ctx, namespace: Option<&str>) -> O2Result<Vec<ReleaseSummary>>;

    async fn status(&self, ctx: &Ctx, release: &str, namespace: &str) -> O2Result<ReleaseInfo>;

    async fn history(&self, ctx: &Ctx, release: &str, namespace: &str) -> O2Result<Vec<HistoryEntry>>;
}

/// `helm list` prints the revision as a string; `helm history` as a number.
fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => Ok(n.as_u64().unwrap_or(0)),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!("revision: unexpected {}", other))),
    }
}

/// One row of `helm list -o json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub name: String,
    pub namespace: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub revision: u64,
    /// `2024-05-01 10:00:00.123456 +0000 UTC`
    #[serde(default)]
    pub updated: String,
    pub status: String,
    /// `<chart>-<version>`
    #[serde(default)]
    pub chart: String,
    #[serde(default)]
    pub app_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseStatusInfo {
    #[serde(default)]
    pub first_deployed: Option<String>,
    #[serde(default)]
    pub last_deployed: Option<String>,
    #[serde(default)]
    pub deleted: Option<String>,
    #[serde(default)]
    pub description: String,
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartInfo {
    pub metadata: ChartMetadata,
}

/// `helm status|install|upgrade -o json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    /// Release revision.
    pub version: u64,
    pub info: ReleaseStatusInfo,
    #[serde(default)]
    pub chart: Option<ChartInfo>,
    /// User-supplied values.
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
}

impl ReleaseInfo {
    /// `<chart>-<version>`, the same form `helm list` prints.
    pub fn chart_ref(&self) -> String {
        self.chart.as_ref().map(|c| format!("{}-{}", c.metadata.name, c.metadata.version)).unwrap_or_default()
    }
}

/// One row of `helm history -o json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(deserialize_with = "lenient_u64")]
    pub revision: u64,
    #[serde(default)]
    pub updated: String,
    pub status: String,
    #[serde(default)]
    pub chart: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub description: String,
}
