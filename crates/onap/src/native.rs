//! SO, A&AI and SDC wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const AAI_VERSION: &str = "v24";
pub const SO_VERSION: &str = "v7";

// ---- A&AI ----

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceInstance {
    pub service_instance_id: String,
    #[serde(default)]
    pub service_instance_name: String,
    #[serde(default)]
    pub model_invariant_id: String,
    #[serde(default)]
    pub model_version_id: String,
    #[serde(default)]
    pub orchestration_status: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_instance_location_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceInstanceList {
    #[serde(default, rename = "service-instance")]
    pub service_instance: Vec<ServiceInstance>,
}

// ---- SDC ----

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogService {
    pub uuid: String,
    #[serde(default, rename = "invariantUUID")]
    pub invariant_uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub lifecycle_state: String,
    #[serde(default)]
    pub distribution_status: String,
    #[serde(default, rename = "toscaModelURL")]
    pub tosca_model_url: String,
    #[serde(default)]
    pub last_updater_user_id: String,
}

// ---- SO ----

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub model_type: String,
    pub model_invariant_id: String,
    pub model_version_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberInfo {
    pub global_subscriber_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub instance_name: String,
    pub source: String,
    pub requestor_id: String,
    pub suppress_rollback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserParam {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParameters {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subscription_service_type: String,
    pub a_la_carte: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub user_params: Vec<UserParam>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    pub model_info: ModelInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber_info: Option<SubscriberInfo>,
    pub request_info: RequestInfo,
    pub request_parameters: RequestParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoRequest {
    pub request_details: RequestDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestReferences {
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub request_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoResponse {
    #[serde(default)]
    pub request_references: RequestReferences,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    #[serde(default)]
    pub request_state: String,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub percent_progress: Option<u8>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationRequest {
    pub request_id: String,
    #[serde(default)]
    pub request_type: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub finish_time: Option<String>,
    #[serde(default)]
    pub request_status: RequestStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrchestrationRequestWrapper {
    pub request: OrchestrationRequest,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationRequestList {
    #[serde(default)]
    pub request_list: Vec<OrchestrationRequestWrapper>,
}
