use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use o2bridge_api::Adapter;
use o2bridge_core::prelude::*;
use o2bridge_core::{DeploymentRequest, DeploymentUpdate, LogOptions, PackageUpload};
use o2bridge_crossplane::{CrossplaneAdapter, CrossplaneConfig};
use serde_json::{json, Value};

const COMPS: &str = "/apis/apiextensions.crossplane.io/v1/compositions";
const REVS: &str = "/apis/apiextensions.crossplane.io/v1/compositionrevisions";
const XRS: &str = "/apis/nop.example.org/v1alpha1/xnetworks";
/// Namespaced composites, stored under `<namespace>/<name>`.
const SUBNETS: &str = "/apis/nop.example.org/v1alpha1/xsubnets";

/// Collections keyed by base path, objects keyed by name.
#[derive(Clone, Default)]
struct Cluster {
    objects: Arc<Mutex<BTreeMap<&'static str, BTreeMap<String, Value>>>>,
    posts: Arc<Mutex<Vec<(&'static str, Value)>>>,
}

fn key_of(obj: &Value) -> String {
    let name = obj["metadata"]["name"].as_str().unwrap_or_default();
    match obj["metadata"]["namespace"].as_str() {
        Some(ns) => format!("{}/{}", ns, name),
        None => name.to_string(),
    }
}

impl Cluster {
    fn put(&self, base: &'static str, obj: Value) {
        self.objects.lock().unwrap().entry(base).or_default().insert(key_of(&obj), obj);
    }
}

fn status(code: u16, reason: &str, message: &str) -> Response {
    let sc = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (sc, Json(json!({"kind": "Status", "apiVersion": "v1", "metadata": {}, "status": "Failure", "message": message, "reason": reason, "code": code})))
        .into_response()
}

fn labels_match(obj: &Value, selector: &str) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        obj["metadata"]["labels"][k] == v
    })
}

fn list(c: &Cluster, base: &'static str, ns: Option<&str>, q: &HashMap<String, String>) -> Response {
    let sel = q.get("labelSelector").cloned().unwrap_or_default();
    let in_ns = |o: &Value| ns.is_none() || o["metadata"]["namespace"].as_str() == ns;
    let items: Vec<Value> = c
        .objects
        .lock()
        .unwrap()
        .get(base)
        .map(|m| m.values().filter(|o| in_ns(o) && labels_match(o, &sel)).cloned().collect())
        .unwrap_or_default();
    Json(json!({"apiVersion": "v1", "kind": "List", "metadata": {"resourceVersion": "1"}, "items": items})).into_response()
}

fn create(c: &Cluster, base: &'static str, mut body: Value) -> Response {
    c.posts.lock().unwrap().push((base, body.clone()));
    let name = key_of(&body);
    if c.objects.lock().unwrap().get(base).is_some_and(|m| m.contains_key(&name)) {
        return status(409, "AlreadyExists", &format!("{} already exists", name));
    }
    body["metadata"]["resourceVersion"] = json!("1");
    body["metadata"]["generation"] = json!(1);
    body["metadata"]["creationTimestamp"] = json!("2024-06-01T00:00:00Z");
    c.put(base, body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

fn get_one(c: &Cluster, base: &'static str, name: &str) -> Response {
    match c.objects.lock().unwrap().get(base).and_then(|m| m.get(name)) {
        Some(o) => Json(o.clone()).into_response(),
        None => status(404, "NotFound", &format!("{} not found", name)),
    }
}

fn replace(c: &Cluster, base: &'static str, name: &str, mut body: Value) -> Response {
    let mut all = c.objects.lock().unwrap();
    let Some(current) = all.get_mut(base).and_then(|m| m.get_mut(name)) else { return status(404, "NotFound", "not found") };
    if body["metadata"]["resourceVersion"] != current["metadata"]["resourceVersion"] {
        return status(409, "Conflict", "the object has been modified");
    }
    body["metadata"]["resourceVersion"] = json!("2");
    body["metadata"]["generation"] = json!(current["metadata"]["generation"].as_i64().unwrap_or(0) + 1);
    *current = body.clone();
    Json(body).into_response()
}

fn remove(c: &Cluster, base: &'static str, name: &str) -> Response {
    match c.objects.lock().unwrap().get_mut(base).and_then(|m| m.remove(name)) {
        Some(o) => Json(o).into_response(),
        None => status(404, "NotFound", "not found"),
    }
}

fn collection(router: Router<Cluster>, base: &'static str) -> Router<Cluster> {
    router
        .route(
            base,
            get(move |State(c): State<Cluster>, Query(q): Query<HashMap<String, String>>| async move { list(&c, base, None, &q) })
                .post(move |State(c): State<Cluster>, Json(b): Json<Value>| async move { create(&c, base, b) }),
        )
        .route(
            &format!("{}/{{name}}", base),
            get(move |State(c): State<Cluster>, Path(n): Path<String>| async move { get_one(&c, base, &n) })
                .put(move |State(c): State<Cluster>, Path(n): Path<String>, Json(b): Json<Value>| async move { replace(&c, base, &n, b) })
                .delete(move |State(c): State<Cluster>, Path(n): Path<String>| async move { remove(&c, base, &n) }),
        )
}

/// Cluster-wide list plus the `namespaces/{ns}/xsubnets` routes.
fn namespaced_collection(router: Router<Cluster>) -> Router<Cluster> {
    const SCOPED: &str = "/apis/nop.example.org/v1alpha1/namespaces/{ns}/xsubnets";
    router
        .route(
            SUBNETS,
            get(|State(c): State<Cluster>, Query(q): Query<HashMap<String, String>>| async move { list(&c, SUBNETS, None, &q) }),
        )
        .route(
            SCOPED,
            get(|State(c): State<Cluster>, Path(ns): Path<String>, Query(q): Query<HashMap<String, String>>| async move {
                list(&c, SUBNETS, Some(&ns), &q)
            })
            .post(|State(c): State<Cluster>, Path(ns): Path<String>, Json(mut b): Json<Value>| async move {
                b["metadata"]["namespace"] = json!(ns);
                create(&c, SUBNETS, b)
            }),
        )
        .route(
            &format!("{}/{{name}}", SCOPED),
            get(|State(c): State<Cluster>, Path((ns, n)): Path<(String, String)>| async move {
                get_one(&c, SUBNETS, &format!("{}/{}", ns, n))
            })
            .put(|State(c): State<Cluster>, Path((ns, n)): Path<(String, String)>, Json(b): Json<Value>| async move {
                replace(&c, SUBNETS, &format!("{}/{}", ns, n), b)
            })
            .delete(|State(c): State<Cluster>, Path((ns, n)): Path<(String, String)>| async move {
                remove(&c, SUBNETS, &format!("{}/{}", ns, n))
            }),
        )
}

async fn start(cluster: Cluster) -> String {
    let router = Router::new()
        .route(
            "/apis",
            get(|| async {
                Json(json!({"kind": "APIGroupList", "apiVersion": "v1", "groups": [{
                    "name": "nop.example.org",
                    "versions": [{"groupVersion": "nop.example.org/v1alpha1", "version": "v1alpha1"}],
                    "preferredVersion": {"groupVersion": "nop.example.org/v1alpha1", "version": "v1alpha1"}
                }]}))
            }),
        )
        .route(
            "/apis/nop.example.org/v1alpha1",
            get(|| async {
                Json(json!({"kind": "APIResourceList", "apiVersion": "v1", "groupVersion": "nop.example.org/v1alpha1", "resources": [
                    {"name": "xnetworks", "singularName": "xnetwork", "namespaced": false, "kind": "XNetwork",
                     "verbs": ["create", "delete", "get", "list", "patch", "update", "watch"]},
                    {"name": "xnetworks/status", "singularName": "", "namespaced": false, "kind": "XNetwork", "verbs": ["get", "patch", "update"]},
                    {"name": "xsubnets", "singularName": "xsubnet", "namespaced": true, "kind": "XSubnet",
                     "verbs": ["create", "delete", "get", "list", "patch", "update", "watch"]}
                ]}))
            }),
        );
    let router = collection(router, COMPS);
    let router = collection(router, REVS);
    let router = namespaced_collection(router);
    let app = collection(router, XRS).with_state(cluster);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

fn composition(name: &str, api_version: &str, kind: &str) -> Value {
    json!({
        "apiVersion": "apiextensions.crossplane.io/v1", "kind": "Composition",
        "metadata": {"name": name, "generation": 3, "creationTimestamp": "2024-04-01T00:00:00Z",
                     "annotations": {"o2bridge.io/description": format!("{} composition", name)}},
        "spec": {"compositeTypeRef": {"apiVersion": api_version, "kind": kind}, "mode": "Pipeline"}
    })
}

fn revision(name: &str, composition: &str, n: u64) -> Value {
    json!({
        "apiVersion": "apiextensions.crossplane.io/v1", "kind": "CompositionRevision",
        "metadata": {"name": name, "creationTimestamp": "2024-04-01T00:00:00Z",
                     "labels": {"crossplane.io/composition-name": composition, "crossplane.io/composition-hash": "abcdef0123456789"}},
        "spec": {"revision": n}
    })
}

async fn adapter() -> (CrossplaneAdapter, Cluster) {
    let cluster = Cluster::default();
    cluster.put(COMPS, composition("vpc", "nop.example.org/v1alpha1", "XNetwork"));
    cluster.put(COMPS, composition("ghost", "gone.example.org/v1", "XGhost"));
    cluster.put(COMPS, composition("subnets", "nop.example.org/v1alpha1", "XSubnet"));
    cluster.put(REVS, revision("vpc-aaa", "vpc", 1));
    cluster.put(REVS, revision("vpc-bbb", "vpc", 2));
    cluster.put(REVS, revision("other-1", "other", 1));
    cluster.put(XRS, json!({
        "apiVersion": "nop.example.org/v1alpha1", "kind": "XNetwork",
        "metadata": {"name": "net-1", "resourceVersion": "1", "generation": 2,
                     "labels": {"app.kubernetes.io/managed-by": "o2bridge", "o2bridge.io/composition": "vpc", "env": "prod"}},
        "spec": {"compositionRef": {"name": "vpc"}, "compositionRevisionRef": {"name": "vpc-bbb"}, "parameters": {"cidr": "10.0.0.0/16"}},
        "status": {"conditions": [
            {"type": "Synced", "status": "True", "lastTransitionTime": "2024-05-01T10:00:00Z"},
            {"type": "Ready", "status": "True", "lastTransitionTime": "2024-05-01T10:02:00Z"}
        ]}
    }));
    cluster.put(XRS, json!({
        "apiVersion": "nop.example.org/v1alpha1", "kind": "XNetwork",
        "metadata": {"name": "handmade", "resourceVersion": "1"},
        "spec": {"compositionRef": {"name": "vpc"}}
    }));
    let url = start(cluster.clone()).await;
    let client = kube::Client::try_from(kube::Config::new(url.parse().expect("uri"))).expect("client");
    (CrossplaneAdapter::with_client(CrossplaneConfig::default(), client), cluster)
}

#[tokio::test]
async fn compositions_are_packages() {
    let (a, _) = adapter().await;
    let ctx = Ctx::background();
    a.health(&ctx).await.expect("healthy");
    let pkgs = a.list_deployment_packages(&ctx, &Filter::new()).await.expect("packages");
    assert_eq!(pkgs.iter().map(|p| p.package_id.as_str()).collect::<Vec<_>>(), vec!["ghost", "subnets", "vpc"]);
    assert!(pkgs.iter().all(|p| p.package_type == "crossplane-composition"));
    let vpc = a.get_deployment_package(&ctx, "vpc").await.expect("get");
    assert_eq!(vpc.version, "3");
    assert_eq!(vpc.description, "vpc composition");
    assert_eq!(a.get_deployment_package(&ctx, "nope").await.expect_err("404").kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn upload_creates_composition() {
    let (a, cluster) = adapter().await;
    let ctx = Ctx::background();
    let yaml = "apiVersion: apiextensions.crossplane.io/v1\nkind: Composition\nmetadata:\n  name: subnet\nspec:\n  compositeTypeRef:\n    apiVersion: nop.example.org/v1alpha1\n    kind: XNetwork\n";
    let up = PackageUpload { name: "subnet".into(), version: "0.3.0".into(), content: yaml.as_bytes().to_vec(), ..Default::default() };
    let p = a.upload_deployment_package(&ctx, up.clone()).await.expect("upload");
    assert_eq!(p.package_id, "subnet");
    assert_eq!(p.version, "0.3.0");
    assert_eq!(cluster.posts.lock().unwrap().last().map(|(b, _)| *b), Some(COMPS));
    assert_eq!(a.upload_deployment_package(&ctx, up).await.expect_err("dup").kind(), ErrorKind::AlreadyExists);
    a.delete_deployment_package(&ctx, "subnet").await.expect("delete");
}

#[tokio::test]
async fn only_managed_composites_are_listed() {
    let (a, _) = adapter().await;
    let ctx = Ctx::background();
    let deps = a.list_deployments(&ctx, &Filter::new()).await.expect("list");
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].deployment_id, "net-1");
    assert_eq!(deps[0].status, DeploymentStatus::Deployed);
    assert_eq!(deps[0].package_id, "vpc");
    assert!(a.list_deployments(&ctx, &Filter::new().label("env", "dev")).await.expect("none").is_empty());
}

#[tokio::test]
async fn create_binds_composition() {
    let (a, cluster) = adapter().await;
    let ctx = Ctx::background();
    let mut req = DeploymentRequest { name: "net-2".into(), package_id: "vpc".into(), description: "edge".into(), ..Default::default() };
    req.values.insert("cidr".into(), json!("10.9.0.0/16"));
    let d = a.create_deployment(&ctx, req).await.expect("create");
    assert_eq!(d.deployment_id, "net-2");
    assert_eq!(d.status, DeploymentStatus::Pending);
    let (base, body) = cluster.posts.lock().unwrap().last().cloned().expect("post");
    assert_eq!(base, XRS);
    assert_eq!(body["spec"]["compositionRef"]["name"], "vpc");
    assert_eq!(body["spec"]["parameters"]["cidr"], "10.9.0.0/16");

    let err = a.create_deployment(&ctx, DeploymentRequest { name: "x".into(), ..Default::default() }).await.expect_err("no package");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = a
        .create_deployment(&ctx, DeploymentRequest { name: "x".into(), package_id: "missing".into(), ..Default::default() })
        .await
        .expect_err("unknown composition");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn update_status_and_history() {
    let (a, _) = adapter().await;
    let ctx = Ctx::background();
    let mut values = Extensions::new();
    values.insert("cidr".into(), json!("10.2.0.0/16"));
    let d = a
        .update_deployment(&ctx, "net-1", DeploymentUpdate { values: Some(values), ..Default::default() })
        .await
        .expect("update");
    assert_eq!(d.version, 3);
    assert_eq!(d.extensions.get("crossplane.parameters"), Some(&json!({"cidr": "10.2.0.0/16"})));

    let s = a.get_deployment_status(&ctx, "net-1").await.expect("status");
    assert_eq!((s.status, s.progress), (DeploymentStatus::Deployed, 100));

    let h = a.get_deployment_history(&ctx, "net-1").await.expect("history");
    assert_eq!(h.revisions.iter().map(|r| r.version.as_str()).collect::<Vec<_>>(), vec!["vpc-aaa", "vpc-bbb"]);
    assert_eq!(h.revisions[1].status, DeploymentStatus::Deployed);
}

#[tokio::test]
async fn delete_and_unsupported_operations() {
    let (a, _) = adapter().await;
    let ctx = Ctx::background();
    a.delete_deployment(&ctx, "net-1").await.expect("delete");
    assert_eq!(a.get_deployment(&ctx, "net-1").await.expect_err("gone").kind(), ErrorKind::NotFound);
    assert_eq!(a.rollback_deployment(&ctx, "net-1", 0).await.expect_err("rollback").kind(), ErrorKind::OperationNotSupported);
    assert_eq!(
        a.get_deployment_logs(&ctx, "net-1", LogOptions::default()).await.expect_err("logs").kind(),
        ErrorKind::OperationNotSupported
    );
    assert!(!a.supports_gitops());
}

#[tokio::test]
async fn namespaced_composites_round_trip() {
    let (a, cluster) = adapter().await;
    let ctx = Ctx::background();
    let req = DeploymentRequest { name: "net-2".into(), package_id: "subnets".into(), namespace: "team-a".into(), ..Default::default() };
    let d = a.create_deployment(&ctx, req).await.expect("create");
    assert_eq!(d.deployment_id, "team-a/net-2");
    assert_eq!(d.namespace, "team-a");
    assert!(cluster.objects.lock().unwrap()[SUBNETS].contains_key("team-a/net-2"));

    let req = DeploymentRequest { name: "net-3".into(), package_id: "subnets".into(), ..Default::default() };
    assert_eq!(a.create_deployment(&ctx, req).await.expect("default ns").deployment_id, "net-3");

    let got = a.get_deployment(&ctx, "team-a/net-2").await.expect("get");
    assert_eq!((got.name.as_str(), got.package_id.as_str()), ("net-2", "subnets"));
    assert_eq!(a.get_deployment(&ctx, "net-3").await.expect("get default").namespace, "default");
    assert_eq!(a.get_deployment(&ctx, "team-b/net-2").await.expect_err("other ns").kind(), ErrorKind::NotFound);

    let ids: Vec<String> = a.list_deployments(&ctx, &Filter::new()).await.expect("list").into_iter().map(|d| d.deployment_id).collect();
    assert_eq!(ids, vec!["net-1", "net-3", "team-a/net-2"]);
    let team_a = a.list_deployments(&ctx, &Filter::new().namespace("team-a")).await.expect("team-a");
    assert_eq!(team_a.len(), 1);

    let s = a.get_deployment_status(&ctx, "team-a/net-2").await.expect("status");
    assert_eq!((s.deployment_id.as_str(), s.status), ("team-a/net-2", DeploymentStatus::Pending));

    let d = a
        .update_deployment(&ctx, "team-a/net-2", DeploymentUpdate { description: Some("moved".into()), ..Default::default() })
        .await
        .expect("update");
    assert_eq!(d.description, "moved");

    a.delete_deployment(&ctx, "team-a/net-2").await.expect("delete");
    assert_eq!(a.get_deployment(&ctx, "team-a/net-2").await.expect_err("gone").kind(), ErrorKind::NotFound);
    assert_eq!(a.get_deployment(&ctx, "a/b/c").await.expect_err("bad id").kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn close_clears_subscriptions() {
    let (a, _) = adapter().await;
    let ctx = Ctx::background();
    let sub = a
        .create_subscription(&ctx, Subscription { callback: "https://smo.example/cb".into(), ..Default::default() })
        .await
        .expect("subscribe");
    assert_eq!(a.get_subscription(&ctx, &sub.subscription_id).await.expect("get").callback, "https://smo.example/cb");
    a.close().await.expect("close");
    assert_eq!(a.get_subscription(&ctx, &sub.subscription_id).await.expect_err("cleared").kind(), ErrorKind::NotFound);
    assert!(a.list_subscriptions(&ctx).await.expect("list").is_empty());
}
