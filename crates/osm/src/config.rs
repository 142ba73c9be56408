use std::time::Duration;

use o2bridge_client::ClientConfig;
use o2bridge_core::CommonConfig;

pub const ENV_PREFIX: &str = "O2B_OSM";
pub const DEFAULT_PROJECT: &str = "admin";
/// Tokens this close to expiry are renewed before use.
pub const DEFAULT_TOKEN_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsmConfig {
    pub common: CommonConfig,
    /// NBI endpoint, e.g. `https://osm.example:9999`. Its `auth` is ignored; tokens are minted
    /// from the credentials below.
    pub client: ClientConfig,
    pub username: String,
    pub password: String,
    pub project: String,
    /// VIM account used for instantiation when a request names none.
    pub vim_account_id: String,
    pub token_margin: Duration,
}

impl OsmConfig {
    pub fn new(endpoint: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { client: ClientConfig::new(endpoint), username: username.into(), password: password.into(), ..Default::default() }
    }

    /// `O2B_OSM_*` plus `_USERNAME`, `_PASSWORD`, `_PROJECT`, `_VIM_ACCOUNT_ID`.
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(format!("{}_{}", ENV_PREFIX, k)).unwrap_or_default();
        Self {
            common: CommonConfig::from_env(ENV_PREFIX),
            client: ClientConfig::from_env(ENV_PREFIX),
            username: var("USERNAME"),
            password: var("PASSWORD"),
            project: var("PROJECT"),
            vim_account_id: var("VIM_ACCOUNT_ID"),
            token_margin: Duration::ZERO,
        }
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.common = self.common.normalized(crate::BACKEND);
        let mut client = self.client.normalized();
        if client.timeout > self.common.timeout { client.timeout = self.common.timeout; }
        self.client = client;
        if self.project.is_empty() { self.project = DEFAULT_PROJECT.into(); }
        if self.token_margin.is_zero() { self.token_margin = DEFAULT_TOKEN_MARGIN; }
        self
    }
}
