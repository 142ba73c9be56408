//! Helm release ↔ canonical deployment mapping.

use chrono::{DateTime, NaiveDateTime, Utc};
use o2bridge_core::{
    ext_put, ConditionStatus, Conditions, Deployment, DeploymentCondition, DeploymentRevision, DeploymentStatus,
    DeploymentStatusDetail, Extensions, O2Error, O2Result,
};

use crate::driver::{HistoryEntry, ReleaseInfo, ReleaseSummary};
use crate::BACKEND;

/// Helm's release status vocabulary folded into the canonical status and a progress hint.
pub fn project_status(status: &str) -> (DeploymentStatus, u8) {
    match status {
        "deployed" => (DeploymentStatus::Deployed, 100),
        // an older revision that was replaced cleanly
        "superseded" => (DeploymentStatus::Deployed, 100),
        "failed" => (DeploymentStatus::Failed, 0),
        "pending-install" => (DeploymentStatus::Pending, 25),
        "pending-upgrade" => (DeploymentStatus::Deploying, 50),
        "pending-rollback" => (DeploymentStatus::RollingBack, 50),
        "uninstalling" => (DeploymentStatus::Deleting, 75),
        "uninstalled" => (DeploymentStatus::Deleting, 100),
        _ => (DeploymentStatus::Failed, 0),
    }
}

/// Accepts RFC 3339 (`helm status`) and Go's default time format (`helm list`, `helm history`),
/// e.g. `2024-05-01 10:00:00.123456789 +0000 UTC`.
pub fn parse_helm_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    let head = s.split(" m=").next().unwrap_or(s);
    let mut parts: Vec<&str> = head.split_whitespace().collect();
    // trailing zone abbreviation ("UTC", "CEST"); the numeric offset carries the meaning
    if parts.len() == 4 {
        parts.pop();
    }
    let joined = parts.join(" ");
    if let Ok(t) = DateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M:%S%.f").ok().map(|t| t.and_utc())
}

/// Releases in the default namespace are addressed by name; others as `<namespace>/<name>`.
pub fn release_id(name: &str, namespace: &str, default_ns: &str) -> String {
    if namespace.is_empty() || namespace == default_ns {
        name.to_string()
    } else {
        format!("{}/{}", namespace, name)
    }
}

pub fn parse_release_id<'a>(id: &'a str, default_ns: &'a str) -> O2Result<(&'a str, &'a str)> {
    let (ns, name) = match id.split_once('/') {
        Some((ns, name)) => (ns, name),
        None => (default_ns, id),
    };
    if ns.is_empty() || name.is_empty() || name.contains('/') {
        return Err(O2Error::InvalidArgument(format!("release id {:?}: want <name> or <namespace>/<name>", id)));
    }
    validate_namespace(ns)?;
    validate_release_name(name)?;
    Ok((ns, name))
}

/// Helm's release name limit; stricter than the 63 of a plain DNS-1123 label.
const RELEASE_NAME_MAX: usize = 53;
const NAMESPACE_MAX: usize = 63;

fn is_dns1123_label(s: &str, max: usize) -> bool {
    let edge = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    !s.is_empty()
        && s.len() <= max
        && s.chars().all(|c| edge(c) || c == '-')
        && s.starts_with(edge)
        && s.ends_with(edge)
}

pub fn validate_release_name(name: &str) -> O2Result<()> {
    if is_dns1123_label(name, RELEASE_NAME_MAX) {
        return Ok(());
    }
    Err(O2Error::InvalidArgument(format!(
        "release name {:?}: want lowercase alphanumerics and '-', at most {} characters",
        name, RELEASE_NAME_MAX
    )))
}

pub fn validate_namespace(ns: &str) -> O2Result<()> {
    if is_dns1123_label(ns, NAMESPACE_MAX) {
        return Ok(());
    }
    Err(O2Error::InvalidArgument(format!("namespace {:?} is not a DNS-1123 label", ns)))
}

/// Chart references are handed to helm as a positional; flag-shaped ones are refused outright.
pub fn validate_chart_ref(chart: &str) -> O2Result<()> {
    if chart.is_empty() {
        return Err(O2Error::InvalidArgument("chart reference is required".into()));
    }
    if chart.starts_with('-') || chart.chars().any(char::is_control) {
        return Err(O2Error::InvalidArgument(format!("chart reference {:?} is not allowed", chart)));
    }
    Ok(())
}

pub fn summary_to_deployment(r: &ReleaseSummary, default_ns: &str) -> Deployment {
    let (status, _) = project_status(&r.status);
    let mut ext = Extensions::new();
    ext_put(&mut ext, BACKEND, "status", r.status.as_str());
    ext_put(&mut ext, BACKEND, "chart", r.chart.as_str());
    ext_put(&mut ext, BACKEND, "appVersion", r.app_version.as_str());
    Deployment {
        deployment_id: release_id(&r.name, &r.namespace, default_ns),
        name: r.name.clone(),
        package_id: r.chart.clone(),
        namespace: r.namespace.clone(),
        status,
        version: r.revision,
        description: String::new(),
        created_at: None,
        updated_at: parse_helm_time(&r.updated),
        extensions: ext,
    }
}

pub fn release_to_deployment(r: &ReleaseInfo, default_ns: &str) -> Deployment {
    let (status, _) = project_status(&r.info.status);
    let mut ext = Extensions::new();
    ext_put(&mut ext, BACKEND, "status", r.info.status.as_str());
    ext_put(&mut ext, BACKEND, "chart", r.chart_ref());
    if let Some(c) = &r.chart {
        ext_put(&mut ext, BACKEND, "appVersion", c.metadata.app_version.as_str());
    }
    if let Some(values) = &r.config {
        if !values.is_empty() {
            ext_put(&mut ext, BACKEND, "values", serde_json::Value::Object(values.clone()));
        }
    }
    Deployment {
        deployment_id: release_id(&r.name, &r.namespace, default_ns),
        name: r.name.clone(),
        package_id: r.chart_ref(),
        namespace: r.namespace.clone(),
        status,
        version: r.version,
        description: r.info.description.clone(),
        created_at: r.info.first_deployed.as_deref().and_then(parse_helm_time),
        updated_at: r.info.last_deployed.as_deref().and_then(parse_helm_time),
        extensions: ext,
    }
}

pub fn release_status(id: &str, r: &ReleaseInfo) -> DeploymentStatusDetail {
    let (status, progress) = project_status(&r.info.status);
    let updated_at = r.info.last_deployed.as_deref().and_then(parse_helm_time);
    let released = match r.info.status.as_str() {
        "deployed" => ConditionStatus::True,
        s if s.starts_with("pending-") => ConditionStatus::Unknown,
        _ => ConditionStatus::False,
    };
    let mut conditions = Conditions::new();
    conditions.push(DeploymentCondition {
        kind: "Released".into(),
        status: released,
        reason: r.info.status.clone(),
        message: r.info.description.clone(),
        last_transition_time: updated_at,
    });
    let mut ext = Extensions::new();
    ext_put(&mut ext, BACKEND, "revision", r.version);
    ext_put(&mut ext, BACKEND, "notes", r.info.notes.clone());
    DeploymentStatusDetail {
        deployment_id: id.to_string(),
        status,
        message: r.info.description.clone(),
        progress,
        updated_at: updated_at.unwrap_or_else(Utc::now),
        conditions,
        extensions: ext,
    }
}

/// Oldest first.
pub fn history_revisions(entries: &[HistoryEntry]) -> Vec<DeploymentRevision> {
    let mut out: Vec<DeploymentRevision> = entries
        .iter()
        .map(|h| DeploymentRevision {
            revision: h.revision,
            version: h.chart.clone(),
            deployed_at: parse_helm_time(&h.updated),
            status: project_status(&h.status).0,
            description: h.description.clone(),
        })
        .collect();
    out.sort_by_key(|r| r.revision);
    out
}

/// Resolve a rollback target; `0` means the revision before the newest one.
pub fn rollback_target(entries: &[HistoryEntry], revision: u64) -> O2Result<u64> {
    let mut revs: Vec<u64> = entries.iter().map(|h| h.revision).collect();
    revs.sort_unstable();
    if revision == 0 {
        return match revs.len() {
            0 => Err(O2Error::NotFound("release has no history".into())),
            1 => Err(O2Error::InvalidArgument("no previous revision to roll back to".into())),
            n => Ok(revs[n - 2]),
        };
    }
    if revs.binary_search(&revision).is_ok() {
        Ok(revision)
    } else {
        Err(O2Error::NotFound(format!("revision {}", revision)))
    }
}

/// Pod selector for a release; matches charts following the standard labels.
pub fn pod_selector(release: &str) -> String {
    format!("app.kubernetes.io/instance={}", release)
}
