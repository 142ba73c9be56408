//! o2bridge kube: shared plumbing for backends that live on a Kubernetes control plane
//! (Argo CD applications, Crossplane compositions, Helm release pods).

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use kube::{
    api::{Api, DeleteParams, ListParams, LogParams, PostParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    Client,
};
use o2bridge_core::{ConditionStatus, Conditions, DeploymentCondition, LogOptions, O2Error, O2Result};
use serde_json::Value;
use tracing::{debug, info};

/// Parse `"v1/Kind"` or `"group/v1/Kind"`.
pub fn parse_gvk_key(key: &str) -> O2Result<GroupVersionKind> {
    let parts: Vec<_> = key.split('/').collect();
    match parts.as_slice() {
        [version, kind] if !version.is_empty() && !kind.is_empty() => {
            Ok(GroupVersionKind { group: String::new(), version: (*version).to_string(), kind: (*kind).to_string() })
        }
        [group, version, kind] if !version.is_empty() && !kind.is_empty() => Ok(GroupVersionKind {
            group: (*group).to_string(),
            version: (*version).to_string(),
            kind: (*kind).to_string(),
        }),
        _ => Err(O2Error::InvalidArgument(format!("invalid gvk key: {} (expect v1/Kind or group/v1/Kind)", key))),
    }
}

/// `group/version/kind` (or `version/kind` for the core group).
pub fn gvk_key(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() { format!("{}/{}", gvk.version, gvk.kind) } else { format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind) }
}

/// Client from the ambient kubeconfig or in-cluster service account.
pub async fn kube_client() -> O2Result<Client> {
    Client::try_default().await.map_err(map_kube_error)
}

/// Resolve a GVK to its served API resource and scope. Discovery is limited to the GVK's group.
pub async fn find_api_resource(client: Client, gvk: &GroupVersionKind) -> O2Result<(ApiResource, bool)> {
    let discovery = Discovery::new(client).filter(&[gvk.group.as_str()]).run().await.map_err(map_kube_error)?;
    for group in discovery.groups() {
        for (ar, caps) in group.recommended_resources() {
            if ar.group == gvk.group && ar.version == gvk.version && ar.kind == gvk.kind {
                let namespaced = matches!(caps.scope, Scope::Namespaced);
                debug!(gvk = %gvk_key(gvk), plural = %ar.plural, namespaced, "api resource resolved");
                return Ok((ar.clone(), namespaced));
            }
        }
    }
    Err(O2Error::NotFound(format!("GVK not served: {}", gvk_key(gvk))))
}

/// Dynamic API handle scoped to `namespace` when the kind is namespaced.
pub fn dynamic_api(client: Client, ar: &ApiResource, namespaced: bool, namespace: &str) -> Api<DynamicObject> {
    if namespaced && !namespace.is_empty() {
        Api::namespaced_with(client, namespace, ar)
    } else {
        Api::all_with(client, ar)
    }
}

/// Map a kube error onto the adapter taxonomy.
pub fn map_kube_error(e: kube::Error) -> O2Error {
    match e {
        kube::Error::Api(ae) => match ae.code {
            404 => O2Error::NotFound(ae.message),
            409 => O2Error::Conflict(ae.message),
            401 | 403 => O2Error::AuthenticationFailed(ae.message),
            400 | 422 => O2Error::InvalidArgument(ae.message),
            code => O2Error::Backend { status: code, code: Some(ae.reason), message: ae.message },
        },
        kube::Error::SerdeError(e) => O2Error::Internal(format!("kube decode: {}", e)),
        other => O2Error::ConnectionFailed(other.to_string()),
    }
}

/// Like [`map_kube_error`], but a 409 on create means the name is taken.
pub fn map_create_error(e: kube::Error) -> O2Error {
    match map_kube_error(e) {
        O2Error::Conflict(m) => O2Error::AlreadyExists(m),
        other => other,
    }
}

pub async fn get_object(api: &Api<DynamicObject>, name: &str) -> O2Result<DynamicObject> {
    api.get(name).await.map_err(map_kube_error)
}

pub async fn list_objects(api: &Api<DynamicObject>, label_selector: Option<&str>) -> O2Result<Vec<DynamicObject>> {
    let mut lp = ListParams::default();
    if let Some(sel) = label_selector { lp = lp.labels(sel); }
    Ok(api.list(&lp).await.map_err(map_kube_error)?.items)
}

pub async fn create_object(api: &Api<DynamicObject>, obj: &DynamicObject) -> O2Result<DynamicObject> {
    api.create(&PostParams::default(), obj).await.map_err(map_create_error)
}

/// Full replace; `obj.metadata.resource_version` must carry the version that was read so a
/// concurrent writer surfaces as `Conflict`.
pub async fn replace_object(api: &Api<DynamicObject>, name: &str, obj: &DynamicObject) -> O2Result<DynamicObject> {
    api.replace(name, &PostParams::default(), obj).await.map_err(map_kube_error)
}

pub async fn delete_object(api: &Api<DynamicObject>, name: &str) -> O2Result<()> {
    api.delete(name, &DeleteParams::default()).await.map_err(map_kube_error)?;
    Ok(())
}

/// Concatenated logs of every pod matching `selector`, each section headed by the pod name.
pub async fn pod_logs(client: Client, namespace: &str, selector: &str, opts: &LogOptions) -> O2Result<String> {
    use k8s_openapi::api::core::v1::Pod;

    let api: Api<Pod> = Api::namespaced(client, namespace);
    let pods = api.list(&ListParams::default().labels(selector)).await.map_err(map_kube_error)?;
    if pods.items.is_empty() {
        return Err(O2Error::NotFound(format!("no pods match {} in {}", selector, namespace)));
    }
    let mut lp = LogParams::default();
    lp.tail_lines = opts.tail_lines;
    lp.since_seconds = opts.since_seconds;
    lp.container = opts.container.clone();
    let mut out = String::new();
    for pod in pods.items {
        let Some(name) = pod.metadata.name else { continue };
        let text = api.logs(&name, &lp).await.map_err(map_kube_error)?;
        out.push_str(&format!("==> {} <==\n", name));
        out.push_str(&text);
        if !text.ends_with('\n') { out.push('\n'); }
    }
    metrics::counter!("pod_log_fetches_total", 1);
    info!(ns = %namespace, selector = %selector, bytes = out.len(), "pod logs fetched");
    Ok(out)
}

/// RFC 3339 timestamp from a JSON string value.
pub fn parse_time(v: Option<&Value>) -> Option<DateTime<Utc>> {
    v.and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Standard `status.conditions` array into canonical conditions, order preserved.
pub fn conditions_from(status: &Value) -> Conditions {
    let mut out = Conditions::new();
    let Some(items) = status.get("conditions").and_then(|c| c.as_array()) else { return out };
    for c in items {
        let s = |k: &str| c.get(k).and_then(|v| v.as_str()).unwrap_or_default().to_string();
        out.push(DeploymentCondition {
            kind: s("type"),
            status: ConditionStatus::parse(&s("status")),
            reason: s("reason"),
            message: s("message"),
            last_transition_time: parse_time(c.get("lastTransitionTime")),
        });
    }
    out
}

/// Status of the condition named `kind`, `Unknown` when absent.
pub fn condition_status(conds: &Conditions, kind: &str) -> ConditionStatus {
    conds.iter().find(|c| c.kind == kind).map(|c| c.status).unwrap_or(ConditionStatus::Unknown)
}

/// Pointer lookup that yields `""` for missing or non-string values.
pub fn str_at<'a>(v: &'a Value, pointer: &str) -> &'a str {
    v.pointer(pointer).and_then(|v| v.as_str()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_gvk_key_parses_core_and_group() {
        let g = parse_gvk_key("v1/ConfigMap").expect("ok");
        assert_eq!((g.group.as_str(), g.version.as_str(), g.kind.as_str()), ("", "v1", "ConfigMap"));
        let g = parse_gvk_key("argoproj.io/v1alpha1/Application").expect("ok");
        assert_eq!(g.group, "argoproj.io");
        assert_eq!(gvk_key(&g), "argoproj.io/v1alpha1/Application");
    }

    #[test]
    fn parse_gvk_key_invalid_returns_err() {
        for bad in ["invalid", "", "a/b/c/d", "v1/", "g//Kind"] {
            let err = parse_gvk_key(bad).expect_err(bad);
            assert_eq!(err.kind(), o2bridge_core::ErrorKind::InvalidArgument);
        }
    }

    fn api_err(code: u16) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: format!("code {}", code),
            reason: "Reason".into(),
            code,
        })
    }

    #[test]
    fn kube_errors_map_to_kinds() {
        use o2bridge_core::ErrorKind::*;
        assert_eq!(map_kube_error(api_err(404)).kind(), NotFound);
        assert_eq!(map_kube_error(api_err(409)).kind(), Conflict);
        assert_eq!(map_create_error(api_err(409)).kind(), AlreadyExists);
        assert_eq!(map_kube_error(api_err(403)).kind(), AuthenticationFailed);
        assert_eq!(map_kube_error(api_err(422)).kind(), InvalidArgument);
        assert_eq!(map_kube_error(api_err(503)).kind(), ConnectionFailed);
    }

    #[test]
    fn conditions_parse_in_order() {
        let status = json!({"conditions": [
            {"type": "Synced", "status": "True", "reason": "ReconcileSuccess", "lastTransitionTime": "2024-05-01T10:00:00Z"},
            {"type": "Ready", "status": "False", "reason": "Creating", "message": "waiting"}
        ]});
        let conds = conditions_from(&status);
        assert_eq!(conds.len(), 2);
        assert_eq!(conds[0].kind, "Synced");
        assert!(conds[0].last_transition_time.is_some());
        assert_eq!(condition_status(&conds, "Ready"), ConditionStatus::False);
        assert_eq!(condition_status(&conds, "Healthy"), ConditionStatus::Unknown);
        assert!(conditions_from(&json!({})).is_empty());
    }

    #[test]
    fn str_at_defaults_to_empty() {
        let v = json!({"spec": {"source": {"repoURL": "https://git.example/app"}}});
        assert_eq!(str_at(&v, "/spec/source/repoURL"), "https://git.example/app");
        assert_eq!(str_at(&v, "/spec/source/path"), "");
    }
}
