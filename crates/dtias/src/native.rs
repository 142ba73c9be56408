//! DTIAS wire types (`/v2/inventory/*`). Fields not modeled here are kept in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub site_id: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativePool {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub labels: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeServer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub server_type_id: String,
    #[serde(default)]
    pub resource_pool_id: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub power_state: Option<String>,
    #[serde(default)]
    pub health_state: Option<String>,
    #[serde(default)]
    pub provisioning_state: Option<String>,
    /// CPU, memory, disks, NICs; kept nested.
    #[serde(default)]
    pub hardware: Option<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub labels: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeServerType {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub memory_gb: f64,
    #[serde(default)]
    pub storage_gb: f64,
    #[serde(default)]
    pub network_ports: u32,
    #[serde(default)]
    pub cpu: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolList {
    #[serde(default)]
    pub resource_pools: Vec<NativePool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerList {
    #[serde(default)]
    pub servers: Vec<NativeServer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTypeList {
    #[serde(default)]
    pub server_types: Vec<NativeServerType>,
}

/// Body of `POST /v2/inventory/servers/{id}/provision`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub resource_pool_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub server_type_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
}
