use o2bridge_client::{Auth, ClientConfig};
use o2bridge_core::CommonConfig;

pub const ENV_PREFIX: &str = "O2B_ONAP";
pub const APP_ID_HEADER: &str = "X-FromAppId";
pub const DEFAULT_APP_ID: &str = "o2bridge";
pub const DEFAULT_SERVICE_TYPE: &str = "o2bridge";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnapConfig {
    pub common: CommonConfig,
    /// Service Orchestrator.
    pub so: ClientConfig,
    /// Active & Available Inventory.
    pub aai: ClientConfig,
    /// Service Design & Creation catalog.
    pub sdc: ClientConfig,
    /// Sent as `X-FromAppId` (and `X-ECOMP-InstanceID` towards SDC).
    pub app_id: String,
    /// A&AI customer owning the service instances.
    pub global_customer_id: String,
    pub service_type: String,
}

impl OnapConfig {
    /// All three components behind one Basic-auth identity.
    pub fn new(so: impl Into<String>, aai: impl Into<String>, sdc: impl Into<String>, username: &str, password: &str) -> Self {
        let client = |endpoint: String| {
            let mut c = ClientConfig::new(endpoint);
            c.auth = Auth::Basic { username: username.into(), password: password.into() };
            c
        };
        Self {
            so: client(so.into()),
            aai: client(aai.into()),
            sdc: client(sdc.into()),
            ..Default::default()
        }
    }

    /// `O2B_ONAP_SO_*`, `O2B_ONAP_AAI_*`, `O2B_ONAP_SDC_*` for the component clients; a component
    /// without its own credentials inherits `O2B_ONAP_USERNAME` / `_PASSWORD`. Also `_APP_ID`,
    /// `_GLOBAL_CUSTOMER_ID`, `_SERVICE_TYPE`.
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(format!("{}_{}", ENV_PREFIX, k)).unwrap_or_default();
        let shared = match (var("USERNAME"), var("PASSWORD")) {
            (u, _) if u.is_empty() => Auth::None,
            (username, password) => Auth::Basic { username, password },
        };
        let component = |name: &str| {
            let mut c = ClientConfig::from_env(&format!("{}_{}", ENV_PREFIX, name));
            if c.auth == Auth::None {
                c.auth = shared.clone();
            }
            c
        };
        Self {
            common: CommonConfig::from_env(ENV_PREFIX),
            so: component("SO"),
            aai: component("AAI"),
            sdc: component("SDC"),
            app_id: var("APP_ID"),
            global_customer_id: var("GLOBAL_CUSTOMER_ID"),
            service_type: var("SERVICE_TYPE"),
        }
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.common = self.common.normalized(crate::BACKEND);
        if self.app_id.is_empty() { self.app_id = DEFAULT_APP_ID.into(); }
        if self.global_customer_id.is_empty() { self.global_customer_id = DEFAULT_APP_ID.into(); }
        if self.service_type.is_empty() { self.service_type = DEFAULT_SERVICE_TYPE.into(); }
        let timeout = self.common.timeout;
        let app_id = self.app_id.clone();
        let fix = |c: ClientConfig, extra: &[(&str, &str)]| {
            let mut c = c.normalized();
            if c.timeout > timeout { c.timeout = timeout; }
            c.headers.push((APP_ID_HEADER.into(), app_id.clone()));
            c.headers.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
            c
        };
        self.so = fix(self.so, &[]);
        self.aai = fix(self.aai, &[]);
        self.sdc = fix(self.sdc, &[("X-ECOMP-InstanceID", app_id.as_str())]);
        self
    }
}
