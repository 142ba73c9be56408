//! OSM NBI ↔ canonical mapping.

use chrono::{DateTime, Utc};
use o2bridge_core::{
    ext_put, ConditionStatus, Conditions, Deployment, DeploymentCondition, DeploymentPackage, DeploymentRequest,
    DeploymentRevision, DeploymentStatus, DeploymentStatusDetail, Extensions, O2Error, O2Result,
};
use serde_json::Value;

use crate::native::{LcmOpOcc, NsCreate, NsDescriptor, NsInstance};
use crate::BACKEND;

pub const PACKAGE_TYPE: &str = "osm-nsd";

/// `nsState` folded into the canonical status; `operational-status` decides when the state is
/// absent and a failed operation always wins.
pub fn project_status(ns_state: &str, operational: &str) -> (DeploymentStatus, u8) {
    if operational.eq_ignore_ascii_case("failed") {
        return (DeploymentStatus::Failed, 0);
    }
    match ns_state.to_ascii_uppercase().as_str() {
        "NOT_INSTANTIATED" => (DeploymentStatus::Pending, 25),
        "BUILDING" => (DeploymentStatus::Deploying, 50),
        "INSTANTIATED" | "READY" => (DeploymentStatus::Deployed, 100),
        "TERMINATING" => (DeploymentStatus::Deleting, 75),
        "" => match operational.to_ascii_lowercase().as_str() {
            "" | "init" => (DeploymentStatus::Pending, 25),
            "running" => (DeploymentStatus::Deployed, 100),
            "terminating" => (DeploymentStatus::Deleting, 75),
            "terminated" => (DeploymentStatus::Deleting, 100),
            _ => (DeploymentStatus::Failed, 0),
        },
        _ => (DeploymentStatus::Failed, 0),
    }
}

/// OSM timestamps are fractional Unix seconds.
pub fn epoch(secs: Option<f64>) -> Option<DateTime<Utc>> {
    let s = secs.filter(|s| s.is_finite() && *s > 0.0)?;
    DateTime::from_timestamp(s.trunc() as i64, ((s.fract()) * 1e9) as u32)
}

pub fn ns_to_deployment(ns: &NsInstance) -> Deployment {
    let (status, _) = project_status(&ns.ns_state, &ns.operational_status);
    let mut ext = Extensions::new();
    ext_put(&mut ext, BACKEND, "nsState", ns.ns_state.as_str());
    ext_put(&mut ext, BACKEND, "operationalStatus", ns.operational_status.as_str());
    ext_put(&mut ext, BACKEND, "configStatus", ns.config_status.as_str());
    ext_put(&mut ext, BACKEND, "vimAccountId", ns.vim_account_id.as_str());
    ext_put(&mut ext, BACKEND, "nsdName", ns.nsd_name.as_str());
    Deployment {
        deployment_id: ns.id.clone(),
        name: ns.name.clone(),
        package_id: ns.nsd_id.clone(),
        namespace: String::new(),
        status,
        version: 0,
        description: ns.description.clone().unwrap_or_default(),
        created_at: epoch(ns.admin.created),
        updated_at: epoch(ns.admin.modified),
        extensions: ext,
    }
}

pub fn ns_status(ns: &NsInstance) -> DeploymentStatusDetail {
    let (status, progress) = project_status(&ns.ns_state, &ns.operational_status);
    let updated_at = epoch(ns.admin.modified);
    let mut conditions = Conditions::new();
    conditions.push(DeploymentCondition {
        kind: "Operational".into(),
        status: match ns.operational_status.as_str() {
            "running" => ConditionStatus::True,
            "failed" | "terminated" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        },
        reason: ns.operational_status.clone(),
        message: ns.detailed_status.clone(),
        last_transition_time: updated_at,
    });
    if !ns.config_status.is_empty() {
        conditions.push(DeploymentCondition {
            kind: "Configured".into(),
            status: match ns.config_status.as_str() {
                "configured" => ConditionStatus::True,
                "failed" => ConditionStatus::False,
                _ => ConditionStatus::Unknown,
            },
            reason: ns.config_status.clone(),
            message: String::new(),
            last_transition_time: updated_at,
        });
    }
    let mut ext = Extensions::new();
    ext_put(&mut ext, BACKEND, "nsState", ns.ns_state.as_str());
    DeploymentStatusDetail {
        deployment_id: ns.id.clone(),
        status,
        message: ns.detailed_status.clone(),
        progress,
        updated_at: updated_at.unwrap_or_else(Utc::now),
        conditions,
        extensions: ext,
    }
}

pub fn nsd_to_package(d: &NsDescriptor) -> DeploymentPackage {
    let mut ext = Extensions::new();
    ext_put(&mut ext, BACKEND, "descriptorId", d.id.as_str());
    ext_put(&mut ext, BACKEND, "designer", d.designer.as_str());
    ext_put(&mut ext, BACKEND, "onboardingState", d.admin.onboarding_state.clone());
    ext_put(&mut ext, BACKEND, "operationalState", d.admin.operational_state.clone());
    ext_put(&mut ext, BACKEND, "usageState", d.admin.usage_state.clone());
    DeploymentPackage {
        package_id: d.uid.clone(),
        name: if d.name.is_empty() { d.id.clone() } else { d.name.clone() },
        version: d.version.clone(),
        package_type: PACKAGE_TYPE.into(),
        description: d.description.clone().unwrap_or_default(),
        uploaded_at: epoch(d.admin.created),
        extensions: ext,
    }
}

/// `vimAccountId` comes from `osm.vimAccountId` in the request extensions, else `default_vim`.
pub fn build_ns_create(req: &DeploymentRequest, default_vim: &str) -> O2Result<NsCreate> {
    if req.name.is_empty() {
        return Err(O2Error::InvalidArgument("NS name is required".into()));
    }
    if req.package_id.is_empty() {
        return Err(O2Error::InvalidArgument("NS descriptor id is required".into()));
    }
    let vim = req
        .extensions
        .get(&format!("{}.vimAccountId", BACKEND))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_vim);
    if vim.is_empty() {
        return Err(O2Error::InvalidArgument("a VIM account is required (osm.vimAccountId)".into()));
    }
    Ok(NsCreate {
        ns_name: req.name.clone(),
        nsd_id: req.package_id.clone(),
        vim_account_id: vim.to_string(),
        ns_description: req.description.clone(),
        additional_params: req.values.clone(),
    })
}

fn op_status(op_type: &str, state: &str) -> DeploymentStatus {
    let terminate = op_type.eq_ignore_ascii_case("terminate");
    match state.to_ascii_uppercase().as_str() {
        "COMPLETED" | "PROCESSING" | "STARTING" if terminate => DeploymentStatus::Deleting,
        "COMPLETED" => DeploymentStatus::Deployed,
        "PROCESSING" | "STARTING" => DeploymentStatus::Deploying,
        "ROLLING_BACK" | "ROLLED_BACK" => DeploymentStatus::RollingBack,
        _ => DeploymentStatus::Failed,
    }
}

/// LCM operations oldest first, numbered from 1.
pub fn ops_to_history(ops: &[LcmOpOcc]) -> Vec<DeploymentRevision> {
    let mut sorted: Vec<&LcmOpOcc> = ops.iter().collect();
    sorted.sort_by(|a, b| a.start_time.unwrap_or(0.0).total_cmp(&b.start_time.unwrap_or(0.0)));
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, op)| DeploymentRevision {
            revision: i as u64 + 1,
            version: op.operation_type.clone(),
            deployed_at: epoch(op.status_entered_time.or(op.start_time)),
            status: op_status(&op.operation_type, &op.operation_state),
            description: op.detailed_status.clone().unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    #[test]
    fn ns_state_table() {
        assert_eq!(project_status("NOT_INSTANTIATED", ""), (DeploymentStatus::Pending, 25));
        assert_eq!(project_status("BUILDING", "init"), (DeploymentStatus::Deploying, 50));
        assert_eq!(project_status("INSTANTIATED", "running"), (DeploymentStatus::Deployed, 100));
        assert_eq!(project_status("READY", "running"), (DeploymentStatus::Deployed, 100));
        assert_eq!(project_status("TERMINATING", "terminating"), (DeploymentStatus::Deleting, 75));
        assert_eq!(project_status("BROKEN", ""), (DeploymentStatus::Failed, 0));
        assert_eq!(project_status("READY", "failed"), (DeploymentStatus::Failed, 0));
        assert_eq!(project_status("", "running"), (DeploymentStatus::Deployed, 100));
    }

    #[test]
    fn epoch_seconds() {
        let t = epoch(Some(1714644000.5)).expect("time");
        assert_eq!(t.year(), 2024);
        assert_eq!(t.timestamp_subsec_millis(), 500);
        assert!(epoch(None).is_none());
        assert!(epoch(Some(f64::NAN)).is_none());
    }

    #[test]
    fn ns_create_needs_a_vim() {
        let mut req = DeploymentRequest { name: "ns1".into(), package_id: "nsd-1".into(), ..Default::default() };
        assert_eq!(build_ns_create(&req, "").expect_err("no vim").kind(), o2bridge_core::ErrorKind::InvalidArgument);
        req.extensions.insert("osm.vimAccountId".into(), json!("vim-2"));
        req.values.insert("vld".into(), json!([{"name": "mgmt"}]));
        let body = serde_json::to_value(build_ns_create(&req, "vim-1").expect("create")).expect("json");
        assert_eq!(body["vimAccountId"], "vim-2");
        assert_eq!(body["nsdId"], "nsd-1");
        assert_eq!(body["additionalParamsForNs"]["vld"][0]["name"], "mgmt");
        assert!(body.get("nsDescription").is_none());
    }

    #[test]
    fn terminate_ops_are_deleting() {
        let op = |id: &str, ty: &str, state: &str, start: f64| LcmOpOcc {
            id: id.into(),
            operation_type: ty.into(),
            operation_state: state.into(),
            start_time: Some(start),
            ..Default::default()
        };
        let h = ops_to_history(&[op("b", "terminate", "PROCESSING", 20.0), op("a", "instantiate", "COMPLETED", 10.0)]);
        assert_eq!(h[0].status, DeploymentStatus::Deployed);
        assert_eq!(h[1].status, DeploymentStatus::Deleting);
        assert_eq!(h[1].version, "terminate");
    }
}
