//! Static capability advertisement.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    ResourcePools,
    Resources,
    ResourceTypes,
    DeploymentManagers,
    Subscriptions,
    HealthChecks,
    PackageManagement,
    DeploymentLifecycle,
    Rollback,
    Scaling,
    Metrics,
    #[serde(rename = "gitops")]
    GitOps,
}

impl Capability {
    pub const ALL: [Capability; 12] = [
        Capability::ResourcePools,
        Capability::Resources,
        Capability::ResourceTypes,
        Capability::DeploymentManagers,
        Capability::Subscriptions,
        Capability::HealthChecks,
        Capability::PackageManagement,
        Capability::DeploymentLifecycle,
        Capability::Rollback,
        Capability::Scaling,
        Capability::Metrics,
        Capability::GitOps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ResourcePools => "resource-pools",
            Capability::Resources => "resources",
            Capability::ResourceTypes => "resource-types",
            Capability::DeploymentManagers => "deployment-managers",
            Capability::Subscriptions => "subscriptions",
            Capability::HealthChecks => "health-checks",
            Capability::PackageManagement => "package-management",
            Capability::DeploymentLifecycle => "deployment-lifecycle",
            Capability::Rollback => "rollback",
            Capability::Scaling => "scaling",
            Capability::Metrics => "metrics",
            Capability::GitOps => "gitops",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Immutable set fixed at adapter construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new(caps: impl IntoIterator<Item = Capability>) -> Self { Self(caps.into_iter().collect()) }

    pub fn contains(&self, cap: Capability) -> bool { self.0.contains(&cap) }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ { self.0.iter().copied() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Tags for `DeploymentManager.capabilities`.
    pub fn tags(&self) -> Vec<String> { self.iter().map(|c| c.as_str().to_string()).collect() }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self { Self::new(iter) }
}
