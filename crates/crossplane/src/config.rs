use o2bridge_core::CommonConfig;

pub const ENV_PREFIX: &str = "O2B_CROSSPLANE";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossplaneConfig {
    /// `default_namespace` applies only to namespaced composite kinds.
    pub common: CommonConfig,
    /// Label selector narrowing which compositions are exposed as packages; empty exposes all.
    pub composition_selector: String,
}

impl CrossplaneConfig {
    /// `O2B_CROSSPLANE_*` plus `_COMPOSITION_SELECTOR`.
    pub fn from_env() -> Self {
        Self {
            common: CommonConfig::from_env(ENV_PREFIX),
            composition_selector: std::env::var(format!("{}_COMPOSITION_SELECTOR", ENV_PREFIX)).unwrap_or_default(),
        }
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.common = self.common.normalized(crate::BACKEND);
        self.composition_selector = self.composition_selector.trim().to_string();
        self
    }
}
