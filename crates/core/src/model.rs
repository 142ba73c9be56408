//! Canonical entities. Built fresh from backend-native objects on every call; never cached.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Namespaced backend-specific attributes (`"<backend>.<field-path>"` → loosely typed value).
/// Consumers treat unknown keys as opaque.
pub type Extensions = serde_json::Map<String, serde_json::Value>;

// ---------------- O2-IMS ----------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePool {
    pub resource_pool_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Display string, possibly combining several backend location facets.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub o_cloud_id: String,
    /// `geo:<lat>,<lon>` or empty when the backend has no coordinates.
    #[serde(default)]
    pub global_location_id: String,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub resource_id: String,
    #[serde(default)]
    pub resource_type_id: String,
    #[serde(default)]
    pub resource_pool_id: String,
    /// URN built deterministically from the native identifier.
    #[serde(default)]
    pub global_asset_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    #[default]
    Compute,
    Storage,
    Network,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    #[default]
    Physical,
    Logical,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
    pub resource_type_id: String,
    pub name: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub resource_class: ResourceClass,
    #[serde(default)]
    pub resource_kind: ResourceKind,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentManager {
    pub deployment_manager_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub o_cloud_id: String,
    #[serde(default)]
    pub service_uri: String,
    /// Free-text tags; distinct from the adapter `Capability` enum.
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub supported_locations: Vec<String>,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Empty on create means "generate one".
    #[serde(default)]
    pub subscription_id: String,
    pub callback: String,
    #[serde(default)]
    pub consumer_subscription_id: String,
    /// Opaque O2-IMS filter expression, stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

// ---------------- O2-DMS ----------------

/// Closed, total projection of every native status vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentStatus {
    #[default]
    Pending,
    Deploying,
    Deployed,
    Failed,
    RollingBack,
    Deleting,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "Pending",
            DeploymentStatus::Deploying => "Deploying",
            DeploymentStatus::Deployed => "Deployed",
            DeploymentStatus::Failed => "Failed",
            DeploymentStatus::RollingBack => "RollingBack",
            DeploymentStatus::Deleting => "Deleting",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub deployment_id: String,
    pub name: String,
    #[serde(default)]
    pub package_id: String,
    #[serde(default)]
    pub namespace: String,
    pub status: DeploymentStatus,
    /// Backend revision counter; never decreases for a given deployment.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPackage {
    pub package_id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Originating packaging model, e.g. `helm-chart`, `crossplane-composition`.
    pub package_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    /// Parse `"True"`/`"False"` (case-insensitive); anything else is `Unknown`.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("true") { ConditionStatus::True }
        else if s.eq_ignore_ascii_case("false") { ConditionStatus::False }
        else { ConditionStatus::Unknown }
    }

    pub fn from_bool(b: bool) -> Self { if b { ConditionStatus::True } else { ConditionStatus::False } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub last_transition_time: Option<DateTime<Utc>>,
}

pub type Conditions = SmallVec<[DeploymentCondition; 4]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatusDetail {
    pub deployment_id: String,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub message: String,
    /// Advisory 0–100 hint, not a completion measurement.
    pub progress: u8,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRevision {
    pub revision: u64,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentHistory {
    pub deployment_id: String,
    /// Oldest first.
    pub revisions: Vec<DeploymentRevision>,
}

// ---------------- Requests ----------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    pub name: String,
    #[serde(default)]
    pub package_id: String,
    /// Empty means the adapter's default namespace.
    #[serde(default)]
    pub namespace: String,
    /// Backend-specific configuration values (chart values, composition parameters, NS params).
    #[serde(default)]
    pub values: Extensions,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentUpdate {
    #[serde(default)]
    pub package_id: Option<String>,
    #[serde(default)]
    pub values: Option<Extensions>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageUpload {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: Vec<u8>,
    #[serde(default)]
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOptions {
    /// Tail last n lines (server-side), if supported
    pub tail_lines: Option<i64>,
    /// Only return logs newer than X seconds
    pub since_seconds: Option<i64>,
    pub container: Option<String>,
}
