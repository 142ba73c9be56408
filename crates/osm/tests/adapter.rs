use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use o2bridge_api::Adapter;
use o2bridge_core::prelude::*;
use o2bridge_core::{DeploymentRequest, PackageUpload};
use o2bridge_osm::{OsmAdapter, OsmConfig};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Nbi {
    /// Lifetime of newly issued tokens, in seconds.
    ttl: Arc<Mutex<f64>>,
    issued: Arc<Mutex<Vec<Value>>>,
    valid: Arc<Mutex<HashSet<String>>>,
    instances: Arc<Mutex<BTreeMap<String, Value>>>,
    nsds: Arc<Mutex<BTreeMap<String, Value>>>,
    uploads: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

fn now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"code": "UNAUTHORIZED", "status": 401, "detail": "Expired Token or Authorization HTTP header"})))
        .into_response()
}

fn authorized(n: &Nbi, headers: &HeaderMap) -> bool {
    let Some(v) = headers.get("authorization").and_then(|v| v.to_str().ok()) else { return false };
    v.strip_prefix("Bearer ").map(|t| n.valid.lock().unwrap().contains(t)).unwrap_or(false)
}

fn ns(id: &str, name: &str, state: &str, op: &str) -> Value {
    json!({
        "_id": id, "name": name, "nsdId": "nsd-1", "nsd-name-ref": "cnf_ns",
        "nsState": state, "operational-status": op, "config-status": "configured",
        "detailed-status": "Done", "vimAccountId": "vim-1",
        "_admin": {"created": 1714644000.25, "modified": 1714647600.0}
    })
}

async fn issue(State(n): State<Nbi>, Json(body): Json<Value>) -> Response {
    if body["password"] != "secret" {
        return unauthorized();
    }
    let mut issued = n.issued.lock().unwrap();
    let id = format!("tok-{}", issued.len() + 1);
    issued.push(body);
    n.valid.lock().unwrap().insert(id.clone());
    let ttl = *n.ttl.lock().unwrap();
    Json(json!({"id": id, "_id": id, "expires": now() + ttl, "project_id": "admin"})).into_response()
}

async fn start(n: Nbi) -> String {
    let app = Router::new()
        .route("/osm/admin/v1/tokens", post(issue).get(|State(n): State<Nbi>, h: HeaderMap| async move {
            if !authorized(&n, &h) { return unauthorized(); }
            Json(json!([])).into_response()
        }))
        .route(
            "/osm/nslcm/v1/ns_instances",
            get(|State(n): State<Nbi>, h: HeaderMap| async move {
                if !authorized(&n, &h) { return unauthorized(); }
                Json(n.instances.lock().unwrap().values().cloned().collect::<Vec<_>>()).into_response()
            }),
        )
        .route(
            "/osm/nslcm/v1/ns_instances/{id}",
            get(|State(n): State<Nbi>, Path(id): Path<String>, h: HeaderMap| async move {
                if !authorized(&n, &h) { return unauthorized(); }
                match n.instances.lock().unwrap().get(&id) {
                    Some(v) => Json(v.clone()).into_response(),
                    None => (StatusCode::NOT_FOUND, Json(json!({"code": "NOT_FOUND", "status": 404, "detail": format!("ns {} not found", id)}))).into_response(),
                }
            }),
        )
        .route(
            "/osm/nslcm/v1/ns_instances_content",
            post(|State(n): State<Nbi>, h: HeaderMap, Json(body): Json<Value>| async move {
                if !authorized(&n, &h) { return unauthorized(); }
                let id = format!("ns-{}", n.instances.lock().unwrap().len() + 1);
                let mut v = ns(&id, body["nsName"].as_str().unwrap_or_default(), "BUILDING", "init");
                v["vimAccountId"] = body["vimAccountId"].clone();
                n.instances.lock().unwrap().insert(id.clone(), v);
                (StatusCode::CREATED, Json(json!({"id": id, "nslcmop_id": "op-1"}))).into_response()
            }),
        )
        .route(
            "/osm/nslcm/v1/ns_instances_content/{id}",
            delete(|State(n): State<Nbi>, Path(id): Path<String>, h: HeaderMap| async move {
                if !authorized(&n, &h) { return unauthorized(); }
                match n.instances.lock().unwrap().remove(&id) {
                    Some(_) => StatusCode::ACCEPTED.into_response(),
                    None => (StatusCode::NOT_FOUND, Json(json!({"code": "NOT_FOUND", "status": 404, "detail": "not found"}))).into_response(),
                }
            }),
        )
        .route(
            "/osm/nslcm/v1/ns_lcm_op_occs",
            get(|State(n): State<Nbi>, Query(q): Query<HashMap<String, String>>, h: HeaderMap| async move {
                if !authorized(&n, &h) { return unauthorized(); }
                let ops = if q.get("nsInstanceId").map(String::as_str) == Some("ns-a") {
                    json!([
                        {"_id": "op-2", "lcmOperationType": "scale", "operationState": "FAILED", "startTime": 1714650000.0, "detailed-status": "quota exceeded"},
                        {"_id": "op-1", "lcmOperationType": "instantiate", "operationState": "COMPLETED", "startTime": 1714644000.0, "statusEnteredTime": 1714644100.0}
                    ])
                } else {
                    json!([])
                };
                Json(ops).into_response()
            }),
        )
        .route(
            "/osm/nsd/v1/ns_descriptors",
            get(|State(n): State<Nbi>, h: HeaderMap| async move {
                if !authorized(&n, &h) { return unauthorized(); }
                Json(n.nsds.lock().unwrap().values().cloned().collect::<Vec<_>>()).into_response()
            }),
        )
        .route(
            "/osm/nsd/v1/ns_descriptors/{id}",
            get(|State(n): State<Nbi>, Path(id): Path<String>, h: HeaderMap| async move {
                if !authorized(&n, &h) { return unauthorized(); }
                match n.nsds.lock().unwrap().get(&id) {
                    Some(v) => Json(v.clone()).into_response(),
                    None => (StatusCode::NOT_FOUND, Json(json!({"code": "NOT_FOUND", "status": 404, "detail": "nsd not found"}))).into_response(),
                }
            }),
        )
        .route(
            "/osm/nsd/v1/ns_descriptors_content",
            post(|State(n): State<Nbi>, h: HeaderMap, body: Bytes| async move {
                if !authorized(&n, &h) { return unauthorized(); }
                let ct = h.get("content-type").and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();
                n.uploads.lock().unwrap().push((ct, body.to_vec()));
                let id = format!("nsd-{}", n.nsds.lock().unwrap().len() + 1);
                n.nsds.lock().unwrap().insert(id.clone(), json!({"_id": id, "id": "uploaded_ns", "name": "uploaded_ns", "version": "1.0",
                    "_admin": {"onboardingState": "ONBOARDED", "usageState": "NOT_IN_USE", "created": 1714644000.0}}));
                (StatusCode::CREATED, Json(json!({"id": id}))).into_response()
            }),
        )
        .route(
            "/osm/nsd/v1/ns_descriptors_content/{id}",
            delete(|State(n): State<Nbi>, Path(id): Path<String>, h: HeaderMap| async move {
                if !authorized(&n, &h) { return unauthorized(); }
                match n.nsds.lock().unwrap().remove(&id) {
                    Some(_) => StatusCode::NO_CONTENT.into_response(),
                    None => (StatusCode::NOT_FOUND, Json(json!({"code": "NOT_FOUND", "status": 404, "detail": "nsd not found"}))).into_response(),
                }
            }),
        )
        .with_state(n);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

async fn adapter_with(password: &str, vim: &str) -> (OsmAdapter, Nbi) {
    let n = Nbi::default();
    *n.ttl.lock().unwrap() = 3600.0;
    n.instances.lock().unwrap().insert("ns-a".into(), ns("ns-a", "edge-a", "READY", "running"));
    n.instances.lock().unwrap().insert("ns-b".into(), ns("ns-b", "edge-b", "BROKEN", "failed"));
    n.nsds.lock().unwrap().insert(
        "nsd-1".into(),
        json!({"_id": "nsd-1", "id": "cnf_ns", "name": "cnf_ns", "version": "1.2", "designer": "ops",
               "_admin": {"onboardingState": "ONBOARDED", "usageState": "IN_USE", "created": 1714644000.0}}),
    );
    let endpoint = start(n.clone()).await;
    let mut cfg = OsmConfig::new(endpoint, "admin", password);
    cfg.vim_account_id = vim.into();
    (OsmAdapter::new(cfg).expect("adapter"), n)
}

async fn adapter() -> (OsmAdapter, Nbi) {
    adapter_with("secret", "vim-1").await
}

#[tokio::test]
async fn token_is_shared_across_calls() {
    let (a, n) = adapter().await;
    let ctx = Ctx::background();
    a.health(&ctx).await.expect("health");
    a.list_deployments(&ctx, &Filter::new()).await.expect("list");
    a.list_deployment_packages(&ctx, &Filter::new()).await.expect("packages");
    let issued = n.issued.lock().unwrap();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0]["username"], "admin");
    assert_eq!(issued[0]["project_id"], "admin");
}

#[tokio::test]
async fn revoked_token_is_renewed_once() {
    let (a, n) = adapter().await;
    let ctx = Ctx::background();
    a.list_deployments(&ctx, &Filter::new()).await.expect("first");
    n.valid.lock().unwrap().clear();
    let all = a.list_deployments(&ctx, &Filter::new()).await.expect("after revocation");
    assert_eq!(all.len(), 2);
    assert_eq!(n.issued.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn tokens_near_expiry_are_replaced() {
    let (a, n) = adapter().await;
    *n.ttl.lock().unwrap() = 10.0;
    let ctx = Ctx::background();
    a.list_deployments(&ctx, &Filter::new()).await.expect("first");
    a.list_deployments(&ctx, &Filter::new()).await.expect("second");
    assert_eq!(n.issued.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn bad_credentials_fail_authentication_and_retry_later() {
    let (a, n) = adapter_with("wrong", "vim-1").await;
    let ctx = Ctx::background();
    let err = a.list_deployments(&ctx, &Filter::new()).await.expect_err("bad password");
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    let err = a.health(&ctx).await.expect_err("still bad");
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    assert!(n.issued.lock().unwrap().is_empty());
}

#[tokio::test]
async fn ns_instances_map_to_deployments() {
    let (a, _) = adapter().await;
    let ctx = Ctx::background();
    let all = a.list_deployments(&ctx, &Filter::new()).await.expect("list");
    assert_eq!(all.len(), 2);
    let failed = a.list_deployments(&ctx, &Filter::new().status(DeploymentStatus::Failed)).await.expect("failed");
    assert_eq!(failed.iter().map(|d| d.deployment_id.as_str()).collect::<Vec<_>>(), vec!["ns-b"]);

    let d = a.get_deployment(&ctx, "ns-a").await.expect("get");
    assert_eq!(d.status, DeploymentStatus::Deployed);
    assert_eq!(d.package_id, "nsd-1");
    assert!(d.created_at.is_some());

    let st = a.get_deployment_status(&ctx, "ns-a").await.expect("status");
    assert_eq!((st.status, st.progress), (DeploymentStatus::Deployed, 100));
    assert_eq!(st.conditions.len(), 2);

    let err = a.get_deployment(&ctx, "ns-z").await.expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn instantiate_and_terminate() {
    let (a, n) = adapter().await;
    let ctx = Ctx::background();
    let req = DeploymentRequest { name: "edge-c".into(), package_id: "nsd-1".into(), ..Default::default() };
    let d = a.create_deployment(&ctx, req).await.expect("create");
    assert_eq!(d.deployment_id, "ns-3");
    assert_eq!(d.status, DeploymentStatus::Deploying);
    assert_eq!(n.instances.lock().unwrap()["ns-3"]["vimAccountId"], "vim-1");

    a.delete_deployment(&ctx, "ns-3").await.expect("delete");
    let err = a.delete_deployment(&ctx, "ns-3").await.expect_err("gone");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = a
        .create_deployment(&ctx, DeploymentRequest { name: "x".into(), ..Default::default() })
        .await
        .expect_err("no descriptor");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn instantiate_without_vim_is_rejected() {
    let (a, n) = adapter_with("secret", "").await;
    let ctx = Ctx::background();
    let req = DeploymentRequest { name: "edge-c".into(), package_id: "nsd-1".into(), ..Default::default() };
    let err = a.create_deployment(&ctx, req).await.expect_err("no vim");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(n.issued.lock().unwrap().is_empty(), "rejected before any NBI call");
}

#[tokio::test]
async fn history_from_lcm_operations() {
    let (a, _) = adapter().await;
    let ctx = Ctx::background();
    let h = a.get_deployment_history(&ctx, "ns-a").await.expect("history");
    assert_eq!(h.revisions.iter().map(|r| r.version.as_str()).collect::<Vec<_>>(), vec!["instantiate", "scale"]);
    assert_eq!(h.revisions[1].status, DeploymentStatus::Failed);
    assert_eq!(h.revisions[1].description, "quota exceeded");
    let err = a.get_deployment_history(&ctx, "ns-z").await.expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn descriptors_as_packages() {
    let (a, n) = adapter().await;
    let ctx = Ctx::background();
    let p = a.get_deployment_package(&ctx, "nsd-1").await.expect("get");
    assert_eq!((p.name.as_str(), p.version.as_str(), p.package_type.as_str()), ("cnf_ns", "1.2", "osm-nsd"));

    let up = PackageUpload { name: "uploaded_ns".into(), content: b"nsd:\n  nsd: []\n".to_vec(), ..Default::default() };
    let pkg = a.upload_deployment_package(&ctx, up).await.expect("upload");
    assert_eq!(pkg.package_id, "nsd-2");
    assert_eq!(n.uploads.lock().unwrap()[0].0, "application/yaml");

    let up = PackageUpload { name: "archive".into(), content: vec![0x1f, 0x8b, 0x08, 0x00], ..Default::default() };
    a.upload_deployment_package(&ctx, up).await.expect("upload archive");
    assert_eq!(n.uploads.lock().unwrap()[1].0, "application/gzip");

    a.delete_deployment_package(&ctx, "nsd-2").await.expect("delete");
    let err = a.get_deployment_package(&ctx, "nsd-2").await.expect_err("deleted");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(a.list_deployment_packages(&ctx, &Filter::new()).await.expect("list").len(), 2);
}

#[tokio::test]
async fn subscriptions_point_to_polling() {
    let (a, _) = adapter().await;
    let ctx = Ctx::background();
    let rec = a.polling_recommendation().expect("recommendation");
    assert!(rec.for_category("deployments").is_some());
    let err = a
        .create_subscription(&ctx, Subscription { callback: "https://smo.example/cb".into(), ..Default::default() })
        .await
        .expect_err("unsupported");
    assert_eq!(err.kind(), ErrorKind::OperationNotSupported);
    assert!(!a.capabilities().contains(Capability::Subscriptions));
}

#[tokio::test]
async fn path_shaped_ids_are_rejected_before_login() {
    let (a, n) = adapter().await;
    let ctx = Ctx::background();
    for id in ["../nsd/v1/ns_descriptors/nsd-1", "ns-a?FORCE=true", "ns-a#x", ".."] {
        assert_eq!(a.get_deployment(&ctx, id).await.expect_err(id).kind(), ErrorKind::InvalidArgument, "{}", id);
        assert_eq!(a.delete_deployment_package(&ctx, id).await.expect_err(id).kind(), ErrorKind::InvalidArgument, "{}", id);
    }
    assert!(n.issued.lock().unwrap().is_empty());
}
