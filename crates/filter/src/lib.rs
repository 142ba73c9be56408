//! o2bridge filter: backend-agnostic predicate matching and offset/limit slicing.
//!
//! Stateless; every function is pure and safe to call from any number of tasks at once.
//! Pagination always runs after every predicate has been applied.

#![forbid(unsafe_code)]

use o2bridge_core::{
    Deployment, DeploymentPackage, DeploymentStatus, Extensions, Filter, Resource, ResourcePool, ResourceType,
};
use serde::Serialize;
use tracing::debug;

/// Attributes the engine can see on a candidate. `None` means "not applicable to this entity
/// kind" and the corresponding predicate is skipped.
pub trait Filterable {
    fn location(&self) -> Option<&str> { None }
    fn pool_id(&self) -> Option<&str> { None }
    fn type_id(&self) -> Option<&str> { None }
    fn namespace(&self) -> Option<&str> { None }
    fn status(&self) -> Option<DeploymentStatus> { None }
    /// Metadata bag used for label and extension predicates.
    fn extensions(&self) -> &Extensions;
}

impl Filterable for ResourcePool {
    fn location(&self) -> Option<&str> { Some(&self.location) }
    fn pool_id(&self) -> Option<&str> { Some(&self.resource_pool_id) }
    fn extensions(&self) -> &Extensions { &self.extensions }
}

impl Filterable for Resource {
    fn pool_id(&self) -> Option<&str> { Some(&self.resource_pool_id) }
    fn type_id(&self) -> Option<&str> { Some(&self.resource_type_id) }
    fn extensions(&self) -> &Extensions { &self.extensions }
}

impl Filterable for ResourceType {
    fn type_id(&self) -> Option<&str> { Some(&self.resource_type_id) }
    fn extensions(&self) -> &Extensions { &self.extensions }
}

impl Filterable for Deployment {
    fn namespace(&self) -> Option<&str> { Some(&self.namespace) }
    fn status(&self) -> Option<DeploymentStatus> { Some(self.status) }
    fn extensions(&self) -> &Extensions { &self.extensions }
}

impl Filterable for DeploymentPackage {
    fn extensions(&self) -> &Extensions { &self.extensions }
}

/// Counts after each stage, for explain/debug output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total: usize,
    pub after_location: usize,
    pub after_ids: usize,
    pub after_namespace: usize,
    pub after_status: usize,
    pub after_labels: usize,
    pub after_extensions: usize,
    pub returned: usize,
}

/// Look up a label: a top-level bag key first, then any `"<ns>.labels"` or `"<ns>.metadata"` object.
pub fn label_value<'a>(ext: &'a Extensions, key: &str) -> Option<&'a str> {
    if let Some(v) = ext.get(key).and_then(|v| v.as_str()) { return Some(v); }
    ext.iter()
        .filter(|(k, _)| k.ends_with(".labels") || k.ends_with(".metadata"))
        .find_map(|(_, v)| v.as_object().and_then(|m| m.get(key)).and_then(|v| v.as_str()))
}

fn location_ok<T: Filterable>(item: &T, f: &Filter) -> bool {
    match (&f.location, item.location()) {
        (Some(want), Some(have)) => have.to_ascii_lowercase().contains(&want.to_ascii_lowercase()),
        _ => true,
    }
}

fn ids_ok<T: Filterable>(item: &T, f: &Filter) -> bool {
    let pool_ok = match item.pool_id() {
        Some(p) if !f.resource_pool_ids.is_empty() => f.resource_pool_ids.iter().any(|want| want == p),
        _ => true,
    };
    let type_ok = match item.type_id() {
        Some(t) if !f.resource_type_ids.is_empty() => f.resource_type_ids.iter().any(|want| want == t),
        _ => true,
    };
    pool_ok && type_ok
}

fn namespace_ok<T: Filterable>(item: &T, f: &Filter) -> bool {
    match (&f.namespace, item.namespace()) {
        (Some(want), Some(have)) => want.is_empty() || want == have,
        _ => true,
    }
}

fn status_ok<T: Filterable>(item: &T, f: &Filter) -> bool {
    match (f.status, item.status()) {
        (Some(want), Some(have)) => want == have,
        _ => true,
    }
}

fn labels_ok<T: Filterable>(item: &T, f: &Filter) -> bool {
    if f.labels.is_empty() { return true; }
    let ext = item.extensions();
    if ext.is_empty() { return false; }
    f.labels.iter().all(|(k, v)| label_value(ext, k) == Some(v.as_str()))
}

fn extensions_ok<T: Filterable>(item: &T, f: &Filter) -> bool {
    let ext = item.extensions();
    f.extensions.iter().all(|(k, v)| ext.get(k) == Some(v))
}

/// True when `item` passes every predicate in `f` (pagination fields are ignored).
pub fn matches<T: Filterable>(item: &T, f: &Filter) -> bool {
    location_ok(item, f)
        && ids_ok(item, f)
        && namespace_ok(item, f)
        && status_ok(item, f)
        && labels_ok(item, f)
        && extensions_ok(item, f)
}

/// Slice `items` by `offset` then `limit`. Offset past the end yields an empty page;
/// zero limit returns everything after the offset.
pub fn paginate<T>(items: Vec<T>, limit: usize, offset: usize) -> Vec<T> {
    if offset >= items.len() { return Vec::new(); }
    let it = items.into_iter().skip(offset);
    if limit == 0 { it.collect() } else { it.take(limit).collect() }
}

/// Filter then paginate.
pub fn apply<T: Filterable>(items: Vec<T>, f: &Filter) -> Vec<T> {
    apply_with_stats(items, f).0
}

pub fn apply_with_stats<T: Filterable>(items: Vec<T>, f: &Filter) -> (Vec<T>, FilterStats) {
    let mut stats = FilterStats { total: items.len(), ..Default::default() };
    let mut cur: Vec<T> = items.into_iter().filter(|i| location_ok(i, f)).collect();
    stats.after_location = cur.len();
    cur.retain(|i| ids_ok(i, f));
    stats.after_ids = cur.len();
    cur.retain(|i| namespace_ok(i, f));
    stats.after_namespace = cur.len();
    cur.retain(|i| status_ok(i, f));
    stats.after_status = cur.len();
    cur.retain(|i| labels_ok(i, f));
    stats.after_labels = cur.len();
    cur.retain(|i| extensions_ok(i, f));
    stats.after_extensions = cur.len();
    let page = paginate(cur, f.limit, f.offset);
    stats.returned = page.len();
    metrics::histogram!("filter_candidates", stats.total as f64);
    debug!(total = stats.total, matched = stats.after_extensions, returned = stats.returned, limit = f.limit, offset = f.offset, "filter applied");
    (page, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pool(id: &str, loc: &str, ext: &[(&str, serde_json::Value)]) -> ResourcePool {
        let mut extensions = Extensions::new();
        for (k, v) in ext { extensions.insert((*k).to_string(), v.clone()); }
        ResourcePool { resource_pool_id: id.into(), name: id.into(), location: loc.into(), extensions, ..Default::default() }
    }

    fn numbered(n: usize) -> Vec<ResourcePool> {
        (0..n).map(|i| pool(&format!("p{}", i), "Dallas", &[])).collect()
    }

    #[test]
    fn paginate_tail_and_past_end() {
        let page = apply(numbered(10), &Filter::new().page(3, 9));
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].resource_pool_id, "p9");
        assert!(apply(numbered(10), &Filter::new().page(3, 20)).is_empty());
    }

    #[test]
    fn zero_limit_is_unbounded() {
        assert_eq!(apply(numbered(10), &Filter::new().page(0, 4)).len(), 6);
        assert_eq!(apply(numbered(10), &Filter::new()).len(), 10);
    }

    #[test]
    fn filtering_happens_before_the_page_cut() {
        let mut items = numbered(6);
        items.extend((0..4).map(|i| pool(&format!("x{}", i), "Austin", &[])));
        // Austin pools sit at the tail; a premature cut of 5 would return none of them.
        let page = apply(items, &Filter::new().location("austin").page(5, 0));
        assert_eq!(page.len(), 4);
        assert!(page.iter().all(|p| p.location == "Austin"));
    }

    #[test]
    fn labels_require_every_pair() {
        let a = pool("a", "", &[("env", json!("prod")), ("tier", json!("gold"))]);
        let b = pool("b", "", &[("env", json!("prod"))]);
        let f = Filter::new().label("env", "prod").label("tier", "gold");
        assert!(matches(&a, &f));
        assert!(!matches(&b, &f));
    }

    #[test]
    fn labels_never_match_empty_bag() {
        let bare = pool("a", "", &[]);
        assert!(!matches(&bare, &Filter::new().label("env", "prod")));
        assert!(matches(&bare, &Filter::new()));
    }

    #[test]
    fn labels_found_under_namespaced_labels_object() {
        let p = pool("a", "", &[("dtias.labels", json!({"env": "lab"}))]);
        assert!(matches(&p, &Filter::new().label("env", "lab")));
        assert!(!matches(&p, &Filter::new().label("env", "prod")));
    }

    #[test]
    fn resource_ids_and_extensions() {
        let mut r = Resource { resource_id: "r1".into(), resource_pool_id: "pool-a".into(), resource_type_id: "t1".into(), ..Default::default() };
        r.extensions.insert("dtias.powerState".into(), json!("on"));
        assert!(matches(&r, &Filter::new().pool("pool-a").pool("pool-b")));
        assert!(!matches(&r, &Filter::new().pool("pool-b")));
        assert!(!matches(&r, &Filter::new().resource_type("t2")));
        assert!(matches(&r, &Filter::new().extension("dtias.powerState", "on")));
        assert!(!matches(&r, &Filter::new().extension("dtias.powerState", "off")));
        // location does not apply to resources
        assert!(matches(&r, &Filter::new().location("nowhere")));
    }

    #[test]
    fn deployment_namespace_and_status() {
        let d = Deployment {
            deployment_id: "d1".into(),
            name: "d1".into(),
            package_id: String::new(),
            namespace: "apps".into(),
            status: DeploymentStatus::Deployed,
            version: 1,
            description: String::new(),
            created_at: None,
            updated_at: None,
            extensions: Extensions::new(),
        };
        assert!(matches(&d, &Filter::new().namespace("apps").status(DeploymentStatus::Deployed)));
        assert!(!matches(&d, &Filter::new().namespace("other")));
        assert!(!matches(&d, &Filter::new().status(DeploymentStatus::Failed)));
    }

    #[test]
    fn page_never_exceeds_limit_nor_leaks_non_matching() {
        let items: Vec<ResourcePool> = (0..50)
            .map(|i| pool(&format!("p{}", i), if i % 3 == 0 { "Dallas" } else { "Austin" }, &[]))
            .collect();
        for limit in 0..8 {
            for offset in 0..25 {
                let f = Filter::new().location("dallas").page(limit, offset);
                let (page, stats) = apply_with_stats(items.clone(), &f);
                if limit > 0 { assert!(page.len() <= limit); }
                assert!(page.iter().all(|p| matches(p, &f)));
                assert_eq!(stats.after_location, 17);
                assert_eq!(stats.returned, page.len());
            }
        }
    }
}
