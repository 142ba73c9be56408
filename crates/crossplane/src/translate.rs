//! Crossplane objects ↔ canonical packages and deployments.

use std::collections::BTreeMap;

use chrono::Utc;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use o2bridge_core::{
    ext_put, ConditionStatus, Deployment, DeploymentPackage, DeploymentRequest, DeploymentRevision, DeploymentStatus,
    DeploymentStatusDetail, DeploymentUpdate, Extensions, O2Error, O2Result, PackageUpload,
};
use o2bridge_kube::{condition_status, conditions_from, parse_time, str_at};
use serde_json::{json, Value};

pub const NS: &str = "crossplane";
pub const GROUP: &str = "apiextensions.crossplane.io";
pub const VERSION: &str = "v1";
pub const PACKAGE_TYPE: &str = "crossplane-composition";
pub const COMPOSITION_LABEL: &str = "o2bridge.io/composition";
pub const REVISION_COMPOSITION_LABEL: &str = "crossplane.io/composition-name";
pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by=o2bridge";
pub const DESCRIPTION_ANNOTATION: &str = "o2bridge.io/description";
pub const VERSION_ANNOTATION: &str = "o2bridge.io/version";

pub fn compositions() -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(GROUP, VERSION, "Composition"), "compositions")
}

pub fn composition_revisions() -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(GROUP, VERSION, "CompositionRevision"), "compositionrevisions")
}

/// `name` for cluster-scoped composites and those in `default_ns`, else `namespace/name`.
pub fn composite_id(name: &str, namespace: &str, default_ns: &str) -> String {
    if namespace.is_empty() || namespace == default_ns {
        name.to_string()
    } else {
        format!("{}/{}", namespace, name)
    }
}

/// Splits a deployment id into `(namespace, name)`; the namespace is `None` when the id carries none.
pub fn parse_composite_id(id: &str) -> O2Result<(Option<&str>, &str)> {
    let (ns, name) = match id.split_once('/') {
        Some((ns, name)) => (Some(ns), name),
        None => (None, id),
    };
    if ns.is_some_and(str::is_empty) || name.is_empty() || name.contains('/') {
        return Err(O2Error::InvalidArgument(format!("deployment id {:?}: want <name> or <namespace>/<name>", id)));
    }
    Ok((ns, name))
}

fn annotation(obj: &DynamicObject, key: &str) -> Option<String> {
    obj.metadata.annotations.as_ref().and_then(|a| a.get(key)).cloned()
}

fn field<'a>(obj: &'a DynamicObject, key: &str) -> &'a Value {
    obj.data.get(key).unwrap_or(&Value::Null)
}

pub fn composition_to_package(obj: &DynamicObject) -> DeploymentPackage {
    let spec = field(obj, "spec");
    let name = obj.metadata.name.clone().unwrap_or_default();
    let mut ext = Extensions::new();
    ext_put(&mut ext, NS, "compositeTypeRef", spec.get("compositeTypeRef").cloned());
    ext_put(&mut ext, NS, "mode", spec.get("mode").cloned());
    ext_put(&mut ext, NS, "writeConnectionSecretsToNamespace", spec.get("writeConnectionSecretsToNamespace").cloned());
    if let Some(labels) = &obj.metadata.labels {
        ext_put(&mut ext, NS, "labels", serde_json::to_value(labels).unwrap_or(Value::Null));
    }
    DeploymentPackage {
        package_id: name.clone(),
        name,
        version: annotation(obj, VERSION_ANNOTATION)
            .or_else(|| obj.metadata.generation.map(|g| g.to_string()))
            .unwrap_or_default(),
        package_type: PACKAGE_TYPE.into(),
        description: annotation(obj, DESCRIPTION_ANNOTATION).unwrap_or_default(),
        uploaded_at: obj.metadata.creation_timestamp.as_ref().map(|t| t.0),
        extensions: ext,
    }
}

/// Composition manifest (YAML or JSON) from an upload. The upload name overrides `metadata.name`.
pub fn composition_from_upload(pkg: &PackageUpload) -> O2Result<DynamicObject> {
    if pkg.content.is_empty() {
        return Err(O2Error::InvalidArgument("composition manifest is required".into()));
    }
    let value: Value = serde_yaml::from_slice(&pkg.content)
        .map_err(|e| O2Error::InvalidArgument(format!("composition manifest: {}", e)))?;
    if value.get("kind").and_then(|k| k.as_str()) != Some("Composition") {
        return Err(O2Error::InvalidArgument("manifest kind must be Composition".into()));
    }
    let mut obj: DynamicObject = serde_json::from_value(value)
        .map_err(|e| O2Error::InvalidArgument(format!("composition manifest: {}", e)))?;
    if !pkg.name.is_empty() {
        obj.metadata.name = Some(pkg.name.clone());
    }
    if obj.metadata.name.as_deref().unwrap_or_default().is_empty() {
        return Err(O2Error::InvalidArgument("composition name is required".into()));
    }
    composite_gvk(&obj)?;
    let annotations = obj.metadata.annotations.get_or_insert_with(BTreeMap::new);
    if !pkg.version.is_empty() {
        annotations.insert(VERSION_ANNOTATION.into(), pkg.version.clone());
    }
    if !pkg.description.is_empty() {
        annotations.insert(DESCRIPTION_ANNOTATION.into(), pkg.description.clone());
    }
    obj.metadata.resource_version = None;
    Ok(obj)
}

/// Kind of the composite resources a composition renders.
pub fn composite_gvk(composition: &DynamicObject) -> O2Result<GroupVersionKind> {
    let spec = field(composition, "spec");
    let api_version = str_at(spec, "/compositeTypeRef/apiVersion");
    let kind = str_at(spec, "/compositeTypeRef/kind");
    match api_version.split_once('/') {
        Some((group, version)) if !group.is_empty() && !version.is_empty() && !kind.is_empty() => {
            Ok(GroupVersionKind::gvk(group, version, kind))
        }
        _ => Err(O2Error::InvalidArgument(format!(
            "composition {} has no usable compositeTypeRef",
            composition.metadata.name.as_deref().unwrap_or_default()
        ))),
    }
}

/// Conditions to status. Deletion first, then: no conditions yet → Pending; Ready and Synced →
/// Deployed; Synced=False → Failed; neither condition readable → Failed; anything else is still
/// converging.
pub fn project_status(ready: ConditionStatus, synced: ConditionStatus, has_conditions: bool, deleting: bool) -> (DeploymentStatus, u8) {
    use ConditionStatus::*;
    if deleting {
        return (DeploymentStatus::Deleting, 75);
    }
    if !has_conditions {
        return (DeploymentStatus::Pending, 25);
    }
    match (ready, synced) {
        (True, True) => (DeploymentStatus::Deployed, 100),
        (_, False) | (Unknown, Unknown) => (DeploymentStatus::Failed, 0),
        _ => (DeploymentStatus::Deploying, 50),
    }
}

fn composite_status_pair(obj: &DynamicObject) -> (DeploymentStatus, u8) {
    let conds = conditions_from(field(obj, "status"));
    project_status(
        condition_status(&conds, "Ready"),
        condition_status(&conds, "Synced"),
        !conds.is_empty(),
        obj.metadata.deletion_timestamp.is_some(),
    )
}

pub fn composite_to_deployment(obj: &DynamicObject, default_ns: &str) -> Deployment {
    let spec = field(obj, "spec");
    let conds = conditions_from(field(obj, "status"));
    let (status, _) = composite_status_pair(obj);
    let name = obj.metadata.name.clone().unwrap_or_default();
    let namespace = obj.metadata.namespace.clone().unwrap_or_default();

    let mut ext = Extensions::new();
    if let Some(types) = &obj.types {
        ext_put(&mut ext, NS, "apiVersion", types.api_version.as_str());
        ext_put(&mut ext, NS, "kind", types.kind.as_str());
    }
    ext_put(&mut ext, NS, "compositionRevision", spec.pointer("/compositionRevisionRef/name").cloned());
    ext_put(&mut ext, NS, "compositionUpdatePolicy", spec.get("compositionUpdatePolicy").cloned());
    ext_put(&mut ext, NS, "parameters", spec.get("parameters").cloned());
    ext_put(&mut ext, NS, "resourceRefs", spec.get("resourceRefs").cloned());
    if let Some(labels) = &obj.metadata.labels {
        ext_put(&mut ext, NS, "labels", serde_json::to_value(labels).unwrap_or(Value::Null));
    }
    ext_put(&mut ext, NS, "resourceVersion", obj.metadata.resource_version.clone());

    Deployment {
        deployment_id: composite_id(&name, &namespace, default_ns),
        name,
        package_id: str_at(spec, "/compositionRef/name").to_string(),
        namespace,
        status,
        version: obj.metadata.generation.map(|g| g.max(0) as u64).unwrap_or(0),
        description: annotation(obj, DESCRIPTION_ANNOTATION).unwrap_or_default(),
        created_at: obj.metadata.creation_timestamp.as_ref().map(|t| t.0),
        updated_at: conds.iter().filter_map(|c| c.last_transition_time).max(),
        extensions: ext,
    }
}

pub fn composite_status(obj: &DynamicObject, default_ns: &str) -> DeploymentStatusDetail {
    let conditions = conditions_from(field(obj, "status"));
    let (status, progress) = composite_status_pair(obj);
    let message = conditions
        .iter()
        .find(|c| c.kind == "Ready" && !c.message.is_empty())
        .or_else(|| conditions.iter().find(|c| !c.message.is_empty()))
        .map(|c| c.message.clone())
        .unwrap_or_else(|| format!("{} ({} conditions)", status, conditions.len()));
    let mut ext = Extensions::new();
    let refs = field(obj, "spec").get("resourceRefs").and_then(|r| r.as_array()).map(|r| r.len()).unwrap_or(0);
    ext_put(&mut ext, NS, "composedResources", refs);
    DeploymentStatusDetail {
        deployment_id: composite_id(
            obj.metadata.name.as_deref().unwrap_or_default(),
            obj.metadata.namespace.as_deref().unwrap_or_default(),
            default_ns,
        ),
        status,
        message,
        progress,
        updated_at: conditions.iter().filter_map(|c| c.last_transition_time).max().unwrap_or_else(Utc::now),
        conditions,
        extensions: ext,
    }
}

/// Composition revisions, oldest first. The revision the composite is bound to (or the newest,
/// when unbound) carries the live status.
pub fn revisions_to_history(composite: &DynamicObject, revisions: &[DynamicObject]) -> Vec<DeploymentRevision> {
    let (live, _) = composite_status_pair(composite);
    let bound = str_at(field(composite, "spec"), "/compositionRevisionRef/name");
    let mut revs: Vec<&DynamicObject> = revisions.iter().collect();
    revs.sort_by_key(|r| revision_number(r));
    let newest = revs.last().and_then(|r| r.metadata.name.clone()).unwrap_or_default();
    let current = if bound.is_empty() { newest.as_str() } else { bound };
    revs.iter()
        .map(|r| {
            let name = r.metadata.name.clone().unwrap_or_default();
            let hash = r.metadata.labels.as_ref().and_then(|l| l.get("crossplane.io/composition-hash")).cloned().unwrap_or_default();
            DeploymentRevision {
                revision: revision_number(r),
                status: if name == current { live } else { DeploymentStatus::Deployed },
                version: name,
                deployed_at: r.metadata.creation_timestamp.as_ref().map(|t| t.0),
                description: if hash.is_empty() { String::new() } else { format!("composition hash {}", &hash[..hash.len().min(12)]) },
            }
        })
        .collect()
}

fn revision_number(r: &DynamicObject) -> u64 {
    field(r, "spec").get("revision").and_then(|v| v.as_u64()).unwrap_or(0)
}

/// Composite resource for `composition`, parameters from the request values.
pub fn build_composite(req: &DeploymentRequest, ar: &ApiResource, namespaced: bool, default_ns: &str) -> O2Result<DynamicObject> {
    if req.name.trim().is_empty() {
        return Err(O2Error::InvalidArgument("deployment name is required".into()));
    }
    let mut spec = json!({"compositionRef": {"name": req.package_id}});
    if !req.values.is_empty() {
        spec["parameters"] = Value::Object(req.values.clone());
    }
    if let Some(policy) = req.extensions.get("crossplane.compositionUpdatePolicy") {
        spec["compositionUpdatePolicy"] = policy.clone();
    }
    let mut obj = DynamicObject::new(&req.name, ar).data(json!({"spec": spec}));
    if namespaced {
        obj = obj.within(if req.namespace.is_empty() { default_ns } else { req.namespace.as_str() });
    }
    let (k, v) = MANAGED_BY.split_once('=').unwrap_or((MANAGED_BY, ""));
    obj.metadata.labels = Some(BTreeMap::from([
        (k.to_string(), v.to_string()),
        (COMPOSITION_LABEL.to_string(), req.package_id.clone()),
    ]));
    if !req.description.is_empty() {
        obj.metadata.annotations = Some(BTreeMap::from([(DESCRIPTION_ANNOTATION.to_string(), req.description.clone())]));
    }
    Ok(obj)
}

pub fn apply_update(mut obj: DynamicObject, update: &DeploymentUpdate) -> DynamicObject {
    if let Some(spec) = obj.data.as_object_mut().map(|d| d.entry("spec").or_insert_with(|| json!({}))) {
        if let Some(pkg) = update.package_id.as_deref().filter(|p| !p.is_empty()) {
            spec["compositionRef"] = json!({"name": pkg});
        }
        if let Some(values) = &update.values {
            spec["parameters"] = Value::Object(values.clone());
        }
    }
    if let Some(pkg) = update.package_id.as_deref().filter(|p| !p.is_empty()) {
        obj.metadata.labels.get_or_insert_with(BTreeMap::new).insert(COMPOSITION_LABEL.into(), pkg.to_string());
    }
    if let Some(desc) = &update.description {
        obj.metadata.annotations.get_or_insert_with(BTreeMap::new).insert(DESCRIPTION_ANNOTATION.into(), desc.clone());
    }
    obj
}

/// Managed-by selector plus pushed-down label predicates.
pub fn composite_selector(labels: &BTreeMap<String, String>) -> String {
    std::iter::once(MANAGED_BY.to_string())
        .chain(labels.iter().map(|(k, v)| format!("{}={}", k, v)))
        .collect::<Vec<_>>()
        .join(",")
}
