//! OSM NBI (SOL005 flavoured) wire types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub project_id: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Token {
    /// Bearer value.
    pub id: String,
    /// Unix seconds.
    #[serde(default)]
    pub expires: f64,
    #[serde(default)]
    pub project_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Admin {
    /// Unix seconds.
    #[serde(default)]
    pub created: Option<f64>,
    #[serde(default)]
    pub modified: Option<f64>,
    #[serde(default, rename = "onboardingState")]
    pub onboarding_state: Option<String>,
    #[serde(default, rename = "operationalState")]
    pub operational_state: Option<String>,
    #[serde(default, rename = "usageState")]
    pub usage_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NsInstance {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "nsdId")]
    pub nsd_id: String,
    #[serde(default, rename = "nsd-name-ref")]
    pub nsd_name: String,
    #[serde(default, rename = "nsState")]
    pub ns_state: String,
    #[serde(default, rename = "operational-status")]
    pub operational_status: String,
    #[serde(default, rename = "config-status")]
    pub config_status: String,
    #[serde(default, rename = "detailed-status")]
    pub detailed_status: String,
    #[serde(default, rename = "vimAccountId")]
    pub vim_account_id: String,
    #[serde(default, rename = "_admin")]
    pub admin: Admin,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NsDescriptor {
    #[serde(rename = "_id")]
    pub uid: String,
    /// Descriptor id from the NSD document itself.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub designer: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "_admin")]
    pub admin: Admin,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NsCreate {
    #[serde(rename = "nsName")]
    pub ns_name: String,
    #[serde(rename = "nsdId")]
    pub nsd_id: String,
    #[serde(rename = "vimAccountId")]
    pub vim_account_id: String,
    #[serde(rename = "nsDescription", skip_serializing_if = "String::is_empty")]
    pub ns_description: String,
    #[serde(rename = "additionalParamsForNs", skip_serializing_if = "Map::is_empty")]
    pub additional_params: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Created {
    pub id: String,
    #[serde(default)]
    pub nslcmop_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LcmOpOcc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, rename = "lcmOperationType")]
    pub operation_type: String,
    #[serde(default, rename = "operationState")]
    pub operation_state: String,
    #[serde(default, rename = "startTime")]
    pub start_time: Option<f64>,
    #[serde(default, rename = "statusEnteredTime")]
    pub status_entered_time: Option<f64>,
    #[serde(default, rename = "detailed-status")]
    pub detailed_status: Option<String>,
}
