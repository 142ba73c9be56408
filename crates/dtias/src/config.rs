use o2bridge_client::ClientConfig;
use o2bridge_core::CommonConfig;

pub const ENV_PREFIX: &str = "O2B_DTIAS";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DtiasConfig {
    pub common: CommonConfig,
    pub client: ClientConfig,
}

impl DtiasConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { common: CommonConfig::default(), client: ClientConfig::new(endpoint) }
    }

    pub fn from_env() -> Self {
        Self { common: CommonConfig::from_env(ENV_PREFIX), client: ClientConfig::from_env(ENV_PREFIX) }
    }

    pub(crate) fn normalized(self) -> Self {
        let common = self.common.normalized(crate::BACKEND);
        let mut client = self.client.normalized();
        if client.timeout > common.timeout { client.timeout = common.timeout; }
        Self { common, client }
    }
}
