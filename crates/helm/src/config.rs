use std::path::PathBuf;
use std::time::Duration;

use o2bridge_client::ClientConfig;
use o2bridge_core::CommonConfig;

pub const ENV_PREFIX: &str = "O2B_HELM";
pub const DEFAULT_BINARY: &str = "helm";
pub const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelmConfig {
    /// `default_namespace` is where releases go when a request names none.
    pub common: CommonConfig,
    pub binary: String,
    pub kube_context: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    /// Chart repository; an empty endpoint disables package operations.
    pub repository: ClientConfig,
    /// Zero means `DEFAULT_INDEX_TTL`.
    pub index_ttl: Duration,
}

impl HelmConfig {
    /// `O2B_HELM_*` plus `_BINARY`, `_KUBE_CONTEXT`, `_KUBECONFIG`, `_INDEX_TTL_SECS` and the
    /// repository client under `O2B_HELM_REPO_*`.
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(format!("{}_{}", ENV_PREFIX, k)).ok().filter(|s| !s.is_empty());
        Self {
            common: CommonConfig::from_env(ENV_PREFIX),
            binary: var("BINARY").unwrap_or_default(),
            kube_context: var("KUBE_CONTEXT"),
            kubeconfig: var("KUBECONFIG").map(PathBuf::from),
            repository: ClientConfig::from_env(&format!("{}_REPO", ENV_PREFIX)),
            index_ttl: Duration::from_secs(var("INDEX_TTL_SECS").and_then(|s| s.parse().ok()).unwrap_or(0)),
        }
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.common = self.common.normalized(crate::BACKEND);
        if self.binary.is_empty() { self.binary = DEFAULT_BINARY.into(); }
        if self.index_ttl.is_zero() { self.index_ttl = DEFAULT_INDEX_TTL; }
        self
    }
}
