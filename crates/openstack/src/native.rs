//! Nova (compute API v2.1) wire types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzList {
    #[serde(default)]
    pub availability_zone_info: Vec<AvailabilityZone>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityZone {
    pub zone_name: String,
    #[serde(default)]
    pub zone_state: ZoneState,
    /// host -> service -> state; `null` for non-admin tokens.
    #[serde(default)]
    pub hosts: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ZoneState {
    #[serde(default)]
    pub available: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FlavorRef {
    #[serde(default)]
    pub id: String,
    /// Present from microversion 2.47 on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NativeServer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub flavor: FlavorRef,
    #[serde(default, rename = "OS-EXT-AZ:availability_zone")]
    pub availability_zone: String,
    #[serde(default)]
    pub addresses: Option<Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default, rename = "hostId")]
    pub host_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerList {
    #[serde(default)]
    pub servers: Vec<NativeServer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerEnvelope {
    pub server: NativeServer,
}

/// `202` body of `POST /servers`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedServer {
    pub server: CreatedId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedId {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerCreate {
    pub name: String,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    #[serde(rename = "imageRef", skip_serializing_if = "String::is_empty")]
    pub image_ref: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub availability_zone: String,
    /// List of `{uuid}` objects, or the string `"auto"`.
    pub networks: Value,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerCreateEnvelope {
    pub server: ServerCreate,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NativeFlavor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// MiB.
    #[serde(default)]
    pub ram: u64,
    #[serde(default)]
    pub vcpus: u32,
    /// GiB.
    #[serde(default)]
    pub disk: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "os-flavor-access:is_public")]
    pub is_public: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlavorList {
    #[serde(default)]
    pub flavors: Vec<NativeFlavor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlavorEnvelope {
    pub flavor: NativeFlavor,
}
