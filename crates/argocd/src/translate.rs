//! Argo CD `Application` ↔ canonical deployment mapping.

use std::collections::BTreeMap;

use chrono::Utc;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use o2bridge_core::{
    ext_put, ConditionStatus, Conditions, Deployment, DeploymentCondition, DeploymentRequest, DeploymentRevision,
    DeploymentStatus, DeploymentStatusDetail, DeploymentUpdate, Extensions, O2Error, O2Result,
};
use o2bridge_kube::{conditions_from, parse_time, str_at};
use serde_json::{json, Map, Value};

use crate::config::ArgoCdConfig;

pub const NS: &str = "argocd";
pub const GROUP: &str = "argoproj.io";
pub const VERSION: &str = "v1alpha1";
pub const KIND: &str = "Application";
pub const PLURAL: &str = "applications";
/// Cascade-deletes the managed resources along with the application.
pub const FINALIZER: &str = "resources-finalizer.argocd.argoproj.io";
pub const MANAGED_BY: &str = "o2bridge";
pub const DESCRIPTION_ANNOTATION: &str = "o2bridge.io/description";

pub fn api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(GROUP, VERSION, KIND), PLURAL)
}

/// Health and sync vocabulary folded into the canonical status and an advisory progress hint.
/// Deletion wins over everything else.
pub fn project_status(health: &str, sync: &str, deleting: bool) -> (DeploymentStatus, u8) {
    if deleting {
        return (DeploymentStatus::Deleting, 75);
    }
    match health {
        "Healthy" if sync == "Synced" => (DeploymentStatus::Deployed, 100),
        "Healthy" => (DeploymentStatus::Deploying, 90),
        "Progressing" => (DeploymentStatus::Deploying, 50),
        // not reconciled yet
        "" => (DeploymentStatus::Pending, 25),
        "Suspended" | "Missing" => (DeploymentStatus::Pending, 25),
        "Degraded" => (DeploymentStatus::Failed, 0),
        _ => (DeploymentStatus::Failed, 0),
    }
}

fn status_of(obj: &DynamicObject) -> &Value {
    obj.data.get("status").unwrap_or(&Value::Null)
}

fn spec_of(obj: &DynamicObject) -> &Value {
    obj.data.get("spec").unwrap_or(&Value::Null)
}

fn is_deleting(obj: &DynamicObject) -> bool {
    obj.metadata.deletion_timestamp.is_some() || str_at(status_of(obj), "/operationState/phase") == "Terminating"
}

fn app_status(obj: &DynamicObject) -> (DeploymentStatus, u8) {
    let st = status_of(obj);
    project_status(str_at(st, "/health/status"), str_at(st, "/sync/status"), is_deleting(obj))
}

/// `status.history` ids grow monotonically; fall back to the object generation before the first sync.
fn app_version(obj: &DynamicObject) -> u64 {
    status_of(obj)
        .get("history")
        .and_then(|h| h.as_array())
        .and_then(|h| h.iter().filter_map(|e| e.get("id").and_then(|v| v.as_u64())).max())
        .or_else(|| obj.metadata.generation.map(|g| g.max(0) as u64))
        .unwrap_or(0)
}

/// Source repository plus path or chart; what the application deploys.
pub fn package_ref(spec: &Value) -> String {
    let repo = str_at(spec, "/source/repoURL");
    let sub = Some(str_at(spec, "/source/chart")).filter(|s| !s.is_empty()).unwrap_or_else(|| str_at(spec, "/source/path"));
    if sub.is_empty() { repo.to_string() } else { format!("{}#{}", repo, sub) }
}

pub fn application_to_deployment(obj: &DynamicObject) -> Deployment {
    let spec = spec_of(obj);
    let st = status_of(obj);
    let name = obj.metadata.name.clone().unwrap_or_default();
    let (status, _) = app_status(obj);

    let mut ext = Extensions::new();
    ext_put(&mut ext, NS, "project", str_at(spec, "/project"));
    ext_put(&mut ext, NS, "source", spec.get("source").cloned());
    ext_put(&mut ext, NS, "destination", spec.get("destination").cloned());
    ext_put(&mut ext, NS, "syncPolicy", spec.get("syncPolicy").cloned());
    ext_put(&mut ext, NS, "health", st.pointer("/health/status").cloned());
    ext_put(&mut ext, NS, "sync", st.pointer("/sync/status").cloned());
    ext_put(&mut ext, NS, "syncRevision", st.pointer("/sync/revision").cloned());
    ext_put(&mut ext, NS, "operationPhase", st.pointer("/operationState/phase").cloned());
    if let Some(labels) = &obj.metadata.labels {
        ext_put(&mut ext, NS, "labels", serde_json::to_value(labels).unwrap_or(Value::Null));
    }
    ext_put(&mut ext, NS, "resourceVersion", obj.metadata.resource_version.clone());

    let description = obj
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(DESCRIPTION_ANNOTATION))
        .cloned()
        .unwrap_or_default();
    let updated_at = parse_time(st.get("reconciledAt")).or_else(|| parse_time(st.pointer("/operationState/finishedAt")));

    Deployment {
        deployment_id: name.clone(),
        name,
        package_id: package_ref(spec),
        namespace: str_at(spec, "/destination/namespace").to_string(),
        status,
        version: app_version(obj),
        description,
        created_at: obj.metadata.creation_timestamp.as_ref().map(|t| t.0),
        updated_at,
        extensions: ext,
    }
}

/// Synthesized `Healthy` and `Synced` conditions, followed by Argo's own `status.conditions`.
pub fn application_status(obj: &DynamicObject) -> DeploymentStatusDetail {
    let st = status_of(obj);
    let (status, progress) = app_status(obj);
    let health = str_at(st, "/health/status");
    let sync = str_at(st, "/sync/status");

    let mut conditions = Conditions::new();
    conditions.push(DeploymentCondition {
        kind: "Healthy".into(),
        status: if health.is_empty() { ConditionStatus::Unknown } else { ConditionStatus::from_bool(health == "Healthy") },
        reason: health.to_string(),
        message: str_at(st, "/health/message").to_string(),
        last_transition_time: parse_time(st.pointer("/health/lastTransitionTime")),
    });
    conditions.push(DeploymentCondition {
        kind: "Synced".into(),
        status: if sync.is_empty() { ConditionStatus::Unknown } else { ConditionStatus::from_bool(sync == "Synced") },
        reason: sync.to_string(),
        message: str_at(st, "/sync/revision").to_string(),
        last_transition_time: None,
    });
    conditions.extend(conditions_from(st));

    let message = Some(str_at(st, "/operationState/message"))
        .filter(|m| !m.is_empty())
        .or_else(|| Some(str_at(st, "/health/message")).filter(|m| !m.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("health={} sync={}", or_unknown(health), or_unknown(sync)));

    let mut ext = Extensions::new();
    ext_put(&mut ext, NS, "health", health);
    ext_put(&mut ext, NS, "sync", sync);
    ext_put(&mut ext, NS, "resources", st.get("resources").cloned());

    DeploymentStatusDetail {
        deployment_id: obj.metadata.name.clone().unwrap_or_default(),
        status,
        message,
        progress,
        updated_at: parse_time(st.get("reconciledAt")).unwrap_or_else(Utc::now),
        conditions,
        extensions: ext,
    }
}

fn or_unknown(s: &str) -> &str {
    if s.is_empty() { "Unknown" } else { s }
}

/// `status.history`, oldest first. The newest entry carries the live status; earlier ones were deployed.
pub fn application_history(obj: &DynamicObject) -> Vec<DeploymentRevision> {
    let (current, _) = app_status(obj);
    let mut entries: Vec<&Value> = status_of(obj).get("history").and_then(|h| h.as_array()).map(|h| h.iter().collect()).unwrap_or_default();
    entries.sort_by_key(|e| e.get("id").and_then(|v| v.as_u64()).unwrap_or(0));
    let last = entries.len().saturating_sub(1);
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| DeploymentRevision {
            revision: e.get("id").and_then(|v| v.as_u64()).unwrap_or(0),
            version: str_at(e, "/revision").to_string(),
            deployed_at: parse_time(e.get("deployedAt")),
            status: if i == last { current } else { DeploymentStatus::Deployed },
            description: package_ref(&json!({"source": e.get("source").cloned().unwrap_or(Value::Null)})),
        })
        .collect()
}

fn ext_str<'a>(ext: &'a Extensions, key: &str) -> &'a str {
    ext.get(&format!("{}.{}", NS, key)).and_then(|v| v.as_str()).unwrap_or_default()
}

/// Build a new `Application`. The repository comes from `argocd.repoURL`, falling back to the
/// package id; `argocd.path`, `argocd.chart`, `argocd.targetRevision` and `argocd.project` refine it.
/// Request values become the Helm `valuesObject`.
pub fn build_application(req: &DeploymentRequest, cfg: &ArgoCdConfig) -> O2Result<DynamicObject> {
    if req.name.trim().is_empty() {
        return Err(O2Error::InvalidArgument("deployment name is required".into()));
    }
    let repo = Some(ext_str(&req.extensions, "repoURL")).filter(|s| !s.is_empty()).unwrap_or(req.package_id.as_str());
    if repo.is_empty() {
        return Err(O2Error::InvalidArgument("argocd.repoURL (or packageId) is required".into()));
    }
    let mut source = Map::new();
    source.insert("repoURL".into(), json!(repo));
    let revision = Some(ext_str(&req.extensions, "targetRevision")).filter(|s| !s.is_empty()).unwrap_or("HEAD");
    source.insert("targetRevision".into(), json!(revision));
    let chart = ext_str(&req.extensions, "chart");
    if !chart.is_empty() {
        source.insert("chart".into(), json!(chart));
    } else {
        let path = Some(ext_str(&req.extensions, "path")).filter(|s| !s.is_empty()).unwrap_or(".");
        source.insert("path".into(), json!(path));
    }
    if !req.values.is_empty() {
        source.insert("helm".into(), json!({"valuesObject": Value::Object(req.values.clone())}));
    }

    let project = Some(ext_str(&req.extensions, "project")).filter(|s| !s.is_empty()).unwrap_or(cfg.project.as_str());
    let namespace = if req.namespace.is_empty() { cfg.common.default_namespace.as_str() } else { req.namespace.as_str() };
    let mut spec = json!({
        "project": project,
        "source": Value::Object(source),
        "destination": {"server": cfg.destination_server, "namespace": namespace},
    });
    if cfg.auto_sync {
        spec["syncPolicy"] = json!({"automated": {"prune": true, "selfHeal": true}, "syncOptions": ["CreateNamespace=true"]});
    }

    let mut obj = DynamicObject::new(&req.name, &api_resource()).within(&cfg.argo_namespace).data(json!({"spec": spec}));
    obj.metadata.labels = Some(BTreeMap::from([("app.kubernetes.io/managed-by".to_string(), MANAGED_BY.to_string())]));
    if !req.description.is_empty() {
        obj.metadata.annotations = Some(BTreeMap::from([(DESCRIPTION_ANNOTATION.to_string(), req.description.clone())]));
    }
    obj.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
    Ok(obj)
}

/// Apply an update onto a freshly read object, keeping its `resourceVersion` for conflict detection.
pub fn apply_update(mut obj: DynamicObject, update: &DeploymentUpdate) -> DynamicObject {
    let spec = obj.data.as_object_mut().map(|d| d.entry("spec").or_insert_with(|| json!({})));
    if let Some(spec) = spec {
        if let Some(pkg) = update.package_id.as_deref().filter(|p| !p.is_empty()) {
            spec["source"]["repoURL"] = json!(pkg);
        }
        if let Some(rev) = update.extensions.get("argocd.targetRevision").and_then(|v| v.as_str()) {
            spec["source"]["targetRevision"] = json!(rev);
        }
        if let Some(path) = update.extensions.get("argocd.path").and_then(|v| v.as_str()) {
            spec["source"]["path"] = json!(path);
        }
        if let Some(values) = &update.values {
            spec["source"]["helm"]["valuesObject"] = Value::Object(values.clone());
        }
    }
    if let Some(desc) = &update.description {
        obj.metadata.annotations.get_or_insert_with(BTreeMap::new).insert(DESCRIPTION_ANNOTATION.to_string(), desc.clone());
    }
    obj
}

/// Label selector for the pods Argo CD stamps with the application instance label.
pub fn pod_selector(app: &str) -> String {
    format!("app.kubernetes.io/instance={}", app)
}

/// Label predicates pushed down as an equality selector.
pub fn label_selector(labels: &BTreeMap<String, String>) -> Option<String> {
    if labels.is_empty() {
        return None;
    }
    Some(labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(status: Value) -> DynamicObject {
        let mut obj = DynamicObject::new("web", &api_resource()).within("argocd").data(json!({
            "spec": {
                "project": "default",
                "source": {"repoURL": "https://git.example/apps", "path": "web", "targetRevision": "HEAD"},
                "destination": {"server": "https://kubernetes.default.svc", "namespace": "prod"}
            },
            "status": status
        }));
        obj.metadata.generation = Some(3);
        obj
    }

    #[test]
    fn status_table() {
        use DeploymentStatus::*;
        assert_eq!(project_status("Healthy", "Synced", false), (Deployed, 100));
        assert_eq!(project_status("Healthy", "OutOfSync", false), (Deploying, 90));
        assert_eq!(project_status("Progressing", "Synced", false), (Deploying, 50));
        assert_eq!(project_status("Suspended", "", false), (Pending, 25));
        assert_eq!(project_status("Missing", "OutOfSync", false), (Pending, 25));
        assert_eq!(project_status("Degraded", "Synced", false), (Failed, 0));
        assert_eq!(project_status("Healthy", "Synced", true), (Deleting, 75));
        assert_eq!(project_status("", "", false), (Pending, 25));
        assert_eq!(project_status("Whatever", "Synced", false), (Failed, 0));
    }

    #[test]
    fn deployment_fields() {
        let d = application_to_deployment(&app(json!({
            "health": {"status": "Healthy"},
            "sync": {"status": "Synced", "revision": "abc123"},
            "history": [{"id": 1, "revision": "aaa"}, {"id": 4, "revision": "abc123"}],
            "reconciledAt": "2024-05-01T10:00:00Z"
        })));
        assert_eq!(d.deployment_id, "web");
        assert_eq!(d.package_id, "https://git.example/apps#web");
        assert_eq!(d.namespace, "prod");
        assert_eq!(d.status, DeploymentStatus::Deployed);
        assert_eq!(d.version, 4);
        assert!(d.updated_at.is_some());
        assert_eq!(d.extensions.get("argocd.syncRevision"), Some(&json!("abc123")));
    }

    #[test]
    fn version_falls_back_to_generation() {
        assert_eq!(application_to_deployment(&app(json!({}))).version, 3);
    }

    #[test]
    fn terminating_operation_means_deleting() {
        let d = application_to_deployment(&app(json!({"health": {"status": "Healthy"}, "operationState": {"phase": "Terminating"}})));
        assert_eq!(d.status, DeploymentStatus::Deleting);
    }

    #[test]
    fn status_detail_synthesizes_conditions() {
        let s = application_status(&app(json!({
            "health": {"status": "Progressing", "message": "rolling out"},
            "sync": {"status": "Synced"},
            "conditions": [{"type": "SyncError", "message": "boom"}]
        })));
        assert_eq!(s.status, DeploymentStatus::Deploying);
        assert_eq!(s.progress, 50);
        assert_eq!(s.message, "rolling out");
        let kinds: Vec<_> = s.conditions.iter().map(|c| c.kind.as_str()).collect();
        assert_eq!(kinds, vec!["Healthy", "Synced", "SyncError"]);
        assert_eq!(s.conditions[0].status, ConditionStatus::False);
        assert_eq!(s.conditions[1].status, ConditionStatus::True);
    }

    #[test]
    fn history_oldest_first_with_live_status_on_newest() {
        let h = application_history(&app(json!({
            "health": {"status": "Degraded"},
            "history": [
                {"id": 2, "revision": "bbb", "source": {"repoURL": "r", "path": "p"}},
                {"id": 1, "revision": "aaa", "deployedAt": "2024-05-01T10:00:00Z"}
            ]
        })));
        assert_eq!(h.iter().map(|r| r.revision).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(h[0].status, DeploymentStatus::Deployed);
        assert_eq!(h[1].status, DeploymentStatus::Failed);
        assert_eq!(h[1].description, "r#p");
        assert!(h[0].deployed_at.is_some());
    }

    #[test]
    fn build_requires_repo_and_defaults_revision() {
        let cfg = ArgoCdConfig::default().normalized();
        let mut req = DeploymentRequest { name: "web".into(), ..Default::default() };
        assert!(build_application(&req, &cfg).is_err());
        req.package_id = "https://git.example/apps".into();
        req.values.insert("replicaCount".into(), json!(2));
        let obj = build_application(&req, &cfg).expect("app");
        assert_eq!(obj.metadata.namespace.as_deref(), Some("argocd"));
        let spec = &obj.data["spec"];
        assert_eq!(spec["source"]["targetRevision"], "HEAD");
        assert_eq!(spec["source"]["path"], ".");
        assert_eq!(spec["source"]["helm"]["valuesObject"]["replicaCount"], 2);
        assert_eq!(spec["destination"]["namespace"], "default");
        assert_eq!(spec["project"], "default");
        assert!(spec["syncPolicy"]["automated"]["prune"].as_bool().unwrap_or(false));
    }

    #[test]
    fn update_keeps_resource_version() {
        let mut obj = app(json!({}));
        obj.metadata.resource_version = Some("17".into());
        let upd = DeploymentUpdate { package_id: Some("https://git.example/other".into()), description: Some("v2".into()), ..Default::default() };
        let out = apply_update(obj, &upd);
        assert_eq!(out.metadata.resource_version.as_deref(), Some("17"));
        assert_eq!(out.data["spec"]["source"]["repoURL"], "https://git.example/other");
        assert_eq!(out.metadata.annotations.as_ref().and_then(|a| a.get(DESCRIPTION_ANNOTATION)).map(String::as_str), Some("v2"));
    }

    #[test]
    fn selectors() {
        assert_eq!(label_selector(&BTreeMap::new()), None);
        let l = BTreeMap::from([("team".to_string(), "ran".to_string()), ("env".to_string(), "prod".to_string())]);
        assert_eq!(label_selector(&l).as_deref(), Some("env=prod,team=ran"));
        assert_eq!(pod_selector("web"), "app.kubernetes.io/instance=web");
    }
}
