use o2bridge_core::CommonConfig;

pub const ENV_PREFIX: &str = "O2B_ARGOCD";
pub const DEFAULT_ARGO_NAMESPACE: &str = "argocd";
pub const DEFAULT_PROJECT: &str = "default";
pub const DEFAULT_DESTINATION: &str = "https://kubernetes.default.svc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgoCdConfig {
    /// `default_namespace` is the destination namespace for new applications.
    pub common: CommonConfig,
    /// Namespace holding the `Application` objects.
    pub argo_namespace: String,
    pub project: String,
    pub destination_server: String,
    /// Create applications with an automated sync policy (prune + self-heal).
    pub auto_sync: bool,
}

impl Default for ArgoCdConfig {
    fn default() -> Self {
        Self {
            common: CommonConfig::default(),
            argo_namespace: String::new(),
            project: String::new(),
            destination_server: String::new(),
            auto_sync: true,
        }
    }
}

impl ArgoCdConfig {
    /// `O2B_ARGOCD_*` plus `_ARGO_NAMESPACE`, `_PROJECT`, `_DESTINATION_SERVER`, `_AUTO_SYNC`.
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(format!("{}_{}", ENV_PREFIX, k)).unwrap_or_default();
        Self {
            common: CommonConfig::from_env(ENV_PREFIX),
            argo_namespace: var("ARGO_NAMESPACE"),
            project: var("PROJECT"),
            destination_server: var("DESTINATION_SERVER"),
            auto_sync: !matches!(var("AUTO_SYNC").as_str(), "0" | "false" | "FALSE"),
        }
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.common = self.common.normalized(crate::BACKEND);
        if self.argo_namespace.is_empty() { self.argo_namespace = DEFAULT_ARGO_NAMESPACE.into(); }
        if self.project.is_empty() { self.project = DEFAULT_PROJECT.into(); }
        if self.destination_server.is_empty() { self.destination_server = DEFAULT_DESTINATION.into(); }
        self
    }
}
