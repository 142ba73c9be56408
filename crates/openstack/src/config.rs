use o2bridge_client::{Auth, ClientConfig};
use o2bridge_core::CommonConfig;

pub const ENV_PREFIX: &str = "O2B_OPENSTACK";
pub const TOKEN_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenStackConfig {
    pub common: CommonConfig,
    /// Nova endpoint (including the `/v2.1` suffix).
    pub client: ClientConfig,
    /// Region name shown in pool locations.
    pub region: String,
    /// Compute API microversion sent as `OpenStack-API-Version`.
    pub microversion: String,
}

impl OpenStackConfig {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        let mut client = ClientConfig::new(endpoint);
        client.auth = Auth::Header { name: TOKEN_HEADER.into(), value: token.into() };
        Self { common: CommonConfig::default(), client, region: String::new(), microversion: String::new() }
    }

    /// `O2B_OPENSTACK_*`; a plain `_TOKEN` is sent as `X-Auth-Token`. `_REGION`, `_MICROVERSION`.
    pub fn from_env() -> Self {
        let mut client = ClientConfig::from_env(ENV_PREFIX);
        if let Auth::Bearer(token) = &client.auth {
            client.auth = Auth::Header { name: TOKEN_HEADER.into(), value: token.clone() };
        }
        let var = |k: &str| std::env::var(format!("{}_{}", ENV_PREFIX, k)).unwrap_or_default();
        Self { common: CommonConfig::from_env(ENV_PREFIX), client, region: var("REGION"), microversion: var("MICROVERSION") }
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.common = self.common.normalized(crate::BACKEND);
        let mut client = self.client.normalized();
        if client.timeout > self.common.timeout { client.timeout = self.common.timeout; }
        if self.microversion.is_empty() { self.microversion = "2.47".into(); }
        client.headers.push(("OpenStack-API-Version".into(), format!("compute {}", self.microversion)));
        self.client = client;
        self
    }
}
