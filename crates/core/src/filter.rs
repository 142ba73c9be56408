//! Canonical list filter. Matching and slicing live in `o2bridge-filter`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::DeploymentStatus;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    /// Substring match against the entity's location display string.
    #[serde(default)]
    pub location: Option<String>,
    /// Exact key/value equality; every pair must match.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub resource_pool_ids: Vec<String>,
    #[serde(default)]
    pub resource_type_ids: Vec<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub status: Option<DeploymentStatus>,
    /// Equality predicates over extension-bag keys.
    #[serde(default)]
    pub extensions: BTreeMap<String, serde_json::Value>,
    /// Zero means unbounded.
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Filter {
    pub fn new() -> Self { Self::default() }

    pub fn location(mut self, loc: impl Into<String>) -> Self { self.location = Some(loc.into()); self }

    pub fn label(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.labels.insert(k.into(), v.into());
        self
    }

    pub fn pool(mut self, id: impl Into<String>) -> Self { self.resource_pool_ids.push(id.into()); self }

    pub fn resource_type(mut self, id: impl Into<String>) -> Self { self.resource_type_ids.push(id.into()); self }

    pub fn namespace(mut self, ns: impl Into<String>) -> Self { self.namespace = Some(ns.into()); self }

    pub fn status(mut self, s: DeploymentStatus) -> Self { self.status = Some(s); self }

    pub fn extension(mut self, k: impl Into<String>, v: impl Into<serde_json::Value>) -> Self {
        self.extensions.insert(k.into(), v.into());
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Single pool id when exactly one is requested (candidate for push-down).
    pub fn single_pool(&self) -> Option<&str> {
        match self.resource_pool_ids.as_slice() { [one] => Some(one.as_str()), _ => None }
    }

    pub fn single_type(&self) -> Option<&str> {
        match self.resource_type_ids.as_slice() { [one] => Some(one.as_str()), _ => None }
    }
}
