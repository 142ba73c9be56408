//! Configuration shared by every adapter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_OCLOUD_ID: &str = "ocloud-default";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonConfig {
    /// Owning O-Cloud / tenant identifier stamped on every translated entity.
    pub o_cloud_id: String,
    /// Deployment manager id; empty means `"<backend>-<o_cloud_id>"`.
    pub deployment_manager_id: String,
    pub default_namespace: String,
    /// Upper bound for any single backend call; zero means `DEFAULT_TIMEOUT`.
    pub timeout: Duration,
    /// Bound for `health`; zero means `DEFAULT_HEALTH_TIMEOUT`.
    pub health_timeout: Duration,
}

impl CommonConfig {
    /// Replace zero/empty values with defaults. `backend` names the deployment manager fallback.
    pub fn normalized(mut self, backend: &str) -> Self {
        if self.o_cloud_id.is_empty() { self.o_cloud_id = DEFAULT_OCLOUD_ID.to_string(); }
        if self.deployment_manager_id.is_empty() {
            self.deployment_manager_id = format!("{}-{}", backend, self.o_cloud_id);
        }
        if self.default_namespace.is_empty() { self.default_namespace = DEFAULT_NAMESPACE.to_string(); }
        if self.timeout.is_zero() { self.timeout = DEFAULT_TIMEOUT; }
        if self.health_timeout.is_zero() { self.health_timeout = DEFAULT_HEALTH_TIMEOUT; }
        // health probes stay materially shorter than regular calls
        if self.health_timeout > self.timeout { self.health_timeout = self.timeout / 2; }
        self
    }

    /// Read `<prefix>_OCLOUD_ID`, `<prefix>_DM_ID`, `<prefix>_NAMESPACE`, `<prefix>_TIMEOUT_SECS`,
    /// `<prefix>_HEALTH_TIMEOUT_SECS`.
    pub fn from_env(prefix: &str) -> Self {
        let var = |k: &str| std::env::var(format!("{}_{}", prefix, k)).ok();
        let secs = |k: &str| var(k).and_then(|s| s.parse::<u64>().ok()).map(Duration::from_secs).unwrap_or_default();
        Self {
            o_cloud_id: var("OCLOUD_ID").unwrap_or_default(),
            deployment_manager_id: var("DM_ID").unwrap_or_default(),
            default_namespace: var("NAMESPACE").unwrap_or_default(),
            timeout: secs("TIMEOUT_SECS"),
            health_timeout: secs("HEALTH_TIMEOUT_SECS"),
        }
    }
}
