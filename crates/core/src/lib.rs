//! o2bridge core: the canonical O2-IMS/O2-DMS model every backend adapter translates to and from,
//! plus the shared error taxonomy, call context and capability vocabulary.

#![forbid(unsafe_code)]

pub mod capability;
pub mod config;
pub mod ctx;
pub mod error;
pub mod filter;
pub mod model;
pub mod polling;

pub use capability::{Capability, CapabilitySet};
pub use config::CommonConfig;
pub use ctx::Ctx;
pub use error::{ErrorKind, O2Error, O2Result, OpContext};
pub use filter::Filter;
pub use model::*;
pub use polling::{PollingGuidance, PollingRecommendation};

pub mod prelude {
    pub use super::{
        Capability, CapabilitySet, CommonConfig, Ctx, Deployment, DeploymentCondition, DeploymentHistory,
        DeploymentManager, DeploymentPackage, DeploymentRevision, DeploymentStatus, DeploymentStatusDetail,
        ErrorKind, Extensions, Filter, O2Error, O2Result, OpContext, Resource, ResourcePool, ResourceType,
        Subscription,
    };
}

/// Put `value` into an extension bag under `"<ns>.<path>"`.
///
/// Null values are skipped so a missing native field never shows up as an explicit `null`.
pub fn ext_put(ext: &mut Extensions, ns: &str, path: &str, value: impl Into<serde_json::Value>) {
    let v = value.into();
    if v.is_null() { return; }
    ext.insert(format!("{}.{}", ns, path), v);
}

/// Build a namespaced, prefix-invertible identifier (`"<prefix>-<native>"`).
pub fn prefixed_id(prefix: &str, native: &str) -> String {
    format!("{}-{}", prefix, native)
}

/// Recover the native identifier from a prefixed one; `None` when the prefix does not match.
pub fn strip_prefixed_id<'a>(prefix: &str, id: &'a str) -> Option<&'a str> {
    id.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('-')).filter(|s| !s.is_empty())
}
