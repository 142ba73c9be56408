//! SO / A&AI / SDC ↔ canonical mapping.

use chrono::{DateTime, NaiveDateTime, Utc};
use o2bridge_core::{
    ext_put, ConditionStatus, Conditions, Deployment, DeploymentCondition, DeploymentPackage, DeploymentRequest,
    DeploymentRevision, DeploymentStatus, DeploymentStatusDetail, Extensions, O2Error, O2Result,
};

use crate::config::OnapConfig;
use crate::native::{
    CatalogService, ModelInfo, OrchestrationRequest, RequestDetails, RequestInfo, RequestParameters, ServiceInstance,
    SoRequest, SubscriberInfo, UserParam,
};
use crate::BACKEND;

pub const PACKAGE_TYPE: &str = "onap-service";

/// A&AI `orchestration-status` folded into the canonical status and a progress hint.
pub fn project_status(orchestration_status: &str) -> (DeploymentStatus, u8) {
    match orchestration_status.to_ascii_lowercase().as_str() {
        "active" => (DeploymentStatus::Deployed, 100),
        "" | "pending" | "pendingcreate" | "inventoried" | "precreated" => (DeploymentStatus::Pending, 25),
        "assigned" | "created" | "configassigned" | "configured" | "configdeployed" | "pendingactivation" => {
            (DeploymentStatus::Deploying, 50)
        }
        "pendingdelete" | "deleting" => (DeploymentStatus::Deleting, 75),
        _ => (DeploymentStatus::Failed, 0),
    }
}

/// SO request state for one orchestration request.
pub fn request_status(request_type: &str, state: &str) -> DeploymentStatus {
    let deleting = request_type.to_ascii_lowercase().starts_with("delete");
    match state.to_ascii_uppercase().as_str() {
        "COMPLETE" | "COMPLETED" if deleting => DeploymentStatus::Deleting,
        "COMPLETE" | "COMPLETED" => DeploymentStatus::Deployed,
        "IN_PROGRESS" | "IN_PROGRESS_ROLLBACK" if deleting => DeploymentStatus::Deleting,
        "IN_PROGRESS_ROLLBACK" | "ROLLED_BACK" => DeploymentStatus::RollingBack,
        "IN_PROGRESS" => DeploymentStatus::Deploying,
        "PENDING" | "PENDING_MANUAL_TASK" | "LOCKED" => DeploymentStatus::Pending,
        _ => DeploymentStatus::Failed,
    }
}

/// RFC 3339, RFC 2822 (SO's `Thu, 02 May 2024 10:00:00 GMT`) or a bare `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn parse_onap_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok().map(|t| t.and_utc()))
}

pub fn instance_to_deployment(si: &ServiceInstance, service_type: &str) -> Deployment {
    let (status, _) = project_status(&si.orchestration_status);
    let mut ext = Extensions::new();
    ext_put(&mut ext, BACKEND, "orchestrationStatus", si.orchestration_status.as_str());
    ext_put(&mut ext, BACKEND, "modelInvariantId", si.model_invariant_id.as_str());
    ext_put(&mut ext, BACKEND, "resourceVersion", si.resource_version.as_str());
    ext_put(&mut ext, BACKEND, "locationId", si.service_instance_location_id.clone());
    Deployment {
        deployment_id: si.service_instance_id.clone(),
        name: si.service_instance_name.clone(),
        package_id: si.model_version_id.clone(),
        namespace: service_type.to_string(),
        status,
        version: 0,
        description: String::new(),
        created_at: si.created_at.as_deref().and_then(parse_onap_time),
        updated_at: si.updated_at.as_deref().and_then(parse_onap_time),
        extensions: ext,
    }
}

pub fn instance_status(si: &ServiceInstance) -> DeploymentStatusDetail {
    let (status, progress) = project_status(&si.orchestration_status);
    let mut conditions = Conditions::new();
    conditions.push(DeploymentCondition {
        kind: "Active".into(),
        status: ConditionStatus::from_bool(status == DeploymentStatus::Deployed),
        reason: si.orchestration_status.clone(),
        message: String::new(),
        last_transition_time: si.updated_at.as_deref().and_then(parse_onap_time),
    });
    let mut ext = Extensions::new();
    ext_put(&mut ext, BACKEND, "orchestrationStatus", si.orchestration_status.as_str());
    DeploymentStatusDetail {
        deployment_id: si.service_instance_id.clone(),
        status,
        message: format!("orchestration-status {}", si.orchestration_status),
        progress,
        updated_at: si.updated_at.as_deref().and_then(parse_onap_time).unwrap_or_else(Utc::now),
        conditions,
        extensions: ext,
    }
}

pub fn service_to_package(s: &CatalogService) -> DeploymentPackage {
    let mut ext = Extensions::new();
    ext_put(&mut ext, BACKEND, "invariantUUID", s.invariant_uuid.as_str());
    ext_put(&mut ext, BACKEND, "category", s.category.as_str());
    ext_put(&mut ext, BACKEND, "lifecycleState", s.lifecycle_state.as_str());
    ext_put(&mut ext, BACKEND, "distributionStatus", s.distribution_status.as_str());
    ext_put(&mut ext, BACKEND, "toscaModelURL", s.tosca_model_url.as_str());
    DeploymentPackage {
        package_id: s.uuid.clone(),
        name: s.name.clone(),
        version: s.version.clone(),
        package_type: PACKAGE_TYPE.into(),
        description: s.description.clone().unwrap_or_default(),
        uploaded_at: None,
        extensions: ext,
    }
}

fn request_info(cfg: &OnapConfig, instance_name: &str) -> RequestInfo {
    RequestInfo { instance_name: instance_name.to_string(), source: cfg.app_id.clone(), requestor_id: cfg.app_id.clone(), suppress_rollback: false }
}

/// À-la-carte service instantiation; request values become `userParams`.
pub fn build_instantiate(req: &DeploymentRequest, service: &CatalogService, cfg: &OnapConfig) -> O2Result<SoRequest> {
    if req.name.is_empty() {
        return Err(O2Error::InvalidArgument("service instance name is required".into()));
    }
    if service.invariant_uuid.is_empty() {
        return Err(O2Error::InvalidArgument(format!("catalog service {} has no invariantUUID", service.uuid)));
    }
    let service_type = if req.namespace.is_empty() { cfg.service_type.clone() } else { req.namespace.clone() };
    Ok(SoRequest {
        request_details: RequestDetails {
            model_info: ModelInfo {
                model_type: "service".into(),
                model_invariant_id: service.invariant_uuid.clone(),
                model_version_id: service.uuid.clone(),
                model_name: service.name.clone(),
                model_version: service.version.clone(),
            },
            subscriber_info: Some(SubscriberInfo { global_subscriber_id: cfg.global_customer_id.clone() }),
            request_info: request_info(cfg, &req.name),
            request_parameters: RequestParameters {
                subscription_service_type: service_type,
                a_la_carte: true,
                user_params: req.values.iter().map(|(k, v)| UserParam { name: k.clone(), value: v.clone() }).collect(),
            },
        },
    })
}

pub fn build_delete(si: &ServiceInstance, cfg: &OnapConfig) -> SoRequest {
    SoRequest {
        request_details: RequestDetails {
            model_info: ModelInfo {
                model_type: "service".into(),
                model_invariant_id: si.model_invariant_id.clone(),
                model_version_id: si.model_version_id.clone(),
                ..Default::default()
            },
            subscriber_info: None,
            request_info: request_info(cfg, ""),
            request_parameters: RequestParameters { a_la_carte: true, ..Default::default() },
        },
    }
}

/// Orchestration requests in start order, numbered from 1.
pub fn requests_to_history(reqs: &[OrchestrationRequest]) -> Vec<DeploymentRevision> {
    let mut sorted: Vec<&OrchestrationRequest> = reqs.iter().collect();
    sorted.sort_by_key(|r| r.start_time.as_deref().and_then(parse_onap_time));
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, r)| DeploymentRevision {
            revision: i as u64 + 1,
            version: r.request_type.clone(),
            deployed_at: r.finish_time.as_deref().or(r.start_time.as_deref()).and_then(parse_onap_time),
            status: request_status(&r.request_type, &r.request_status.request_state),
            description: r.request_status.status_message.clone(),
        })
        .collect()
}
