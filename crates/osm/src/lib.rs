//! o2bridge OSM backend: network services through the OSM northbound interface.
//!
//! Every call carries a bearer token minted from `/osm/admin/v1/tokens`. The token is obtained
//! once, renewed shortly before it expires, and dropped when the NBI rejects it so the next call
//! authenticates again. OSM has no webhook registration here; subscriptions are rejected and a
//! polling recommendation is published instead.

#![forbid(unsafe_code)]

mod config;
pub mod native;
pub mod translate;

pub use config::OsmConfig;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use o2bridge_api::{require_segment, run_op, Adapter};
use o2bridge_client::{Auth, BackendClient, Call};
use o2bridge_core::prelude::*;
use o2bridge_core::{DeploymentRequest, PackageUpload, PollingGuidance, PollingRecommendation};
use o2bridge_store::LazyInit;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use native::{Created, LcmOpOcc, NsDescriptor, NsInstance, Token, TokenRequest};

pub const BACKEND: &str = "osm";

const TOKENS: &str = "/osm/admin/v1/tokens";
const NS_INSTANCES: &str = "/osm/nslcm/v1/ns_instances";
const NS_CONTENT: &str = "/osm/nslcm/v1/ns_instances_content";
const NS_OPS: &str = "/osm/nslcm/v1/ns_lcm_op_occs";
const NSDS: &str = "/osm/nsd/v1/ns_descriptors";
const NSD_CONTENT: &str = "/osm/nsd/v1/ns_descriptors_content";

pub struct OsmAdapter {
    cfg: OsmConfig,
    caps: CapabilitySet,
    client: LazyInit<Arc<BackendClient>>,
    token: LazyInit<Token>,
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn guidance(category: &str, secs: u64, fields: &[&str], tips: &[&str]) -> PollingGuidance {
    PollingGuidance {
        category: category.to_string(),
        interval: Duration::from_secs(secs),
        diff_fields: fields.iter().map(|s| s.to_string()).collect(),
        tips: tips.iter().map(|s| s.to_string()).collect(),
    }
}

impl OsmAdapter {
    pub fn new(cfg: OsmConfig) -> O2Result<Self> {
        let cfg = cfg.normalized();
        if cfg.client.endpoint.is_empty() {
            return Err(O2Error::InvalidArgument("osm: endpoint is required".into()));
        }
        if cfg.username.is_empty() {
            return Err(O2Error::InvalidArgument("osm: username is required".into()));
        }
        let caps = CapabilitySet::new([
            Capability::DeploymentManagers,
            Capability::PackageManagement,
            Capability::DeploymentLifecycle,
            Capability::HealthChecks,
        ]);
        Ok(Self { cfg, caps, client: LazyInit::new("osm-client"), token: LazyInit::new("osm-token") })
    }

    async fn client(&self) -> O2Result<Arc<BackendClient>> {
        let cfg = self.cfg.client.clone();
        self.client.get_or_try_init(|| async move { BackendClient::new(BACKEND, cfg).map(Arc::new) }).await
    }

    /// A token with more than the configured margin left; tokens without an expiry never age.
    async fn token(&self, ctx: &Ctx) -> O2Result<Token> {
        let client = self.client().await?;
        let margin = self.cfg.token_margin.as_secs_f64();
        self.token
            .get_valid_or_try_init(
                |t| t.expires <= 0.0 || t.expires - now_secs() > margin,
                || async move {
                    let body = TokenRequest { username: &self.cfg.username, password: &self.cfg.password, project_id: &self.cfg.project };
                    let t: Token = client.json(ctx, Call::post(TOKENS).json(&body)?).await.map_err(|e| match e.kind() {
                        ErrorKind::AuthenticationFailed | ErrorKind::InvalidArgument => {
                            O2Error::AuthenticationFailed(format!("osm: token request for {} rejected: {}", self.cfg.username, e))
                        }
                        _ => e,
                    })?;
                    if t.id.is_empty() {
                        return Err(O2Error::AuthenticationFailed("osm: token response carries no id".into()));
                    }
                    info!(project = %t.project_id, expires_in = (t.expires - now_secs()) as i64, "osm token issued");
                    Ok(t)
                },
            )
            .await
    }

    /// Send with the current token; a 401/403 drops it and the call is retried once.
    async fn send(&self, ctx: &Ctx, call: Call) -> O2Result<Bytes> {
        let client = self.client().await?;
        let token = self.token(ctx).await?;
        match client.send(ctx, call.clone().auth(Auth::Bearer(token.id))).await {
            Err(e) if e.kind() == ErrorKind::AuthenticationFailed => {
                debug!(path = %call.path(), "token rejected; authenticating again");
                self.token.reset().await;
                let token = self.token(ctx).await?;
                client.send(ctx, call.auth(Auth::Bearer(token.id))).await
            }
            other => other,
        }
    }

    async fn json<T: DeserializeOwned>(&self, ctx: &Ctx, call: Call) -> O2Result<T> {
        let path = call.path().to_string();
        let body = self.send(ctx, call).await?;
        serde_json::from_slice(&body).map_err(|e| O2Error::Internal(format!("osm: decoding {}: {}", path, e)))
    }

    async fn fetch_ns(&self, ctx: &Ctx, id: &str) -> O2Result<NsInstance> {
        self.json(ctx, Call::get(format!("{}/{}", NS_INSTANCES, id))).await
    }

    fn subscriptions_unsupported(&self, op: &str) -> O2Error {
        O2Error::NotSupported(format!("osm does not support {}; poll as described by polling_recommendation()", op))
    }
}

#[async_trait::async_trait]
impl Adapter for OsmAdapter {
    fn name(&self) -> &'static str { BACKEND }

    fn version(&self) -> &'static str { "v1" }

    fn capabilities(&self) -> &CapabilitySet { &self.caps }

    fn polling_recommendation(&self) -> Option<PollingRecommendation> {
        Some(PollingRecommendation {
            backend: BACKEND.to_string(),
            guidance: vec![
                guidance("deployments", 30, &["nsState", "operational-status", "config-status", "detailed-status"], &["list NS instances once, then get by id for instances in flight"]),
                guidance("deploymentOperations", 15, &["operationState", "statusEnteredTime"], &["query ns_lcm_op_occs by nsInstanceId while an operation is PROCESSING"]),
                guidance("deploymentPackages", 300, &["version", "_admin.onboardingState", "_admin.usageState"], &["descriptors change rarely; cache between polls"]),
            ],
            tips: vec![
                "reuse the bearer token; it is renewed automatically before expiry".into(),
                "back off exponentially on 429 and 5xx".into(),
                "compare only the listed diff fields to detect change".into(),
            ],
        })
    }

    async fn health(&self, ctx: &Ctx) -> O2Result<()> {
        let ctx = ctx.with_timeout(self.cfg.common.health_timeout);
        run_op(&ctx, BACKEND, "health", TOKENS, async {
            self.send(&ctx, Call::get(TOKENS)).await.map(|_| ())
        })
        .await
    }

    async fn close(&self) -> O2Result<()> {
        self.token.reset().await;
        self.client.reset().await;
        Ok(())
    }

    async fn get_deployment_manager(&self, _ctx: &Ctx) -> O2Result<DeploymentManager> {
        let mut ext = Extensions::new();
        o2bridge_core::ext_put(&mut ext, BACKEND, "project", self.cfg.project.as_str());
        if !self.cfg.vim_account_id.is_empty() {
            o2bridge_core::ext_put(&mut ext, BACKEND, "vimAccountId", self.cfg.vim_account_id.as_str());
        }
        Ok(DeploymentManager {
            deployment_manager_id: self.cfg.common.deployment_manager_id.clone(),
            name: "OSM".into(),
            description: "ETSI Open Source MANO network service orchestration".into(),
            o_cloud_id: self.cfg.common.o_cloud_id.clone(),
            service_uri: self.cfg.client.endpoint.clone(),
            capabilities: self.caps.tags(),
            supported_locations: Vec::new(),
            extensions: ext,
        })
    }

    async fn list_deployment_packages(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<DeploymentPackage>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let nsds: Vec<NsDescriptor> = run_op(&ctx, BACKEND, "list_deployment_packages", "", self.json(&ctx, Call::get(NSDS))).await?;
        let items = nsds.iter().map(translate::nsd_to_package).collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_deployment_package(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentPackage> {
        require_segment("package", id).op("get_deployment_package", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let nsd: NsDescriptor =
            run_op(&ctx, BACKEND, "get_deployment_package", id, self.json(&ctx, Call::get(format!("{}/{}", NSDS, id)))).await?;
        Ok(translate::nsd_to_package(&nsd))
    }

    /// Onboards an NSD package: a gzip archive or a plain YAML descriptor.
    async fn upload_deployment_package(&self, ctx: &Ctx, pkg: PackageUpload) -> O2Result<DeploymentPackage> {
        if pkg.content.is_empty() {
            return Err(O2Error::InvalidArgument("descriptor content is required".into()).context("upload_deployment_package", pkg.name));
        }
        let content_type = if pkg.content.starts_with(&[0x1f, 0x8b]) { "application/gzip" } else { "application/yaml" };
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let nsd = run_op(&ctx, BACKEND, "upload_deployment_package", &pkg.name, async {
            let created: Created = self.json(&ctx, Call::post(NSD_CONTENT).raw(content_type, pkg.content.clone())).await?;
            info!(nsd = %created.id, name = %pkg.name, "NS descriptor onboarded");
            self.json::<NsDescriptor>(&ctx, Call::get(format!("{}/{}", NSDS, created.id))).await
        })
        .await?;
        Ok(translate::nsd_to_package(&nsd))
    }

    async fn delete_deployment_package(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        require_segment("package", id).op("delete_deployment_package", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "delete_deployment_package", id, async {
            self.send(&ctx, Call::delete(format!("{}/{}", NSD_CONTENT, id))).await.map(|_| ())
        })
        .await
    }

    async fn list_deployments(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<Deployment>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let list: Vec<NsInstance> = run_op(&ctx, BACKEND, "list_deployments", "", self.json(&ctx, Call::get(NS_INSTANCES))).await?;
        let items = list.iter().map(translate::ns_to_deployment).collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_deployment(&self, ctx: &Ctx, id: &str) -> O2Result<Deployment> {
        require_segment("deployment", id).op("get_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let ns = run_op(&ctx, BACKEND, "get_deployment", id, self.fetch_ns(&ctx, id)).await?;
        Ok(translate::ns_to_deployment(&ns))
    }

    /// Create and instantiate in one step (`ns_instances_content`).
    async fn create_deployment(&self, ctx: &Ctx, req: DeploymentRequest) -> O2Result<Deployment> {
        let body = translate::build_ns_create(&req, &self.cfg.vim_account_id).map_err(|e| e.context("create_deployment", &req.name))?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let ns = run_op(&ctx, BACKEND, "create_deployment", &req.name, async {
            let created: Created = self.json(&ctx, Call::post(NS_CONTENT).json(&body)?).await?;
            info!(ns = %created.id, op = ?created.nslcmop_id, "NS instantiation started");
            self.fetch_ns(&ctx, &created.id).await
        })
        .await?;
        Ok(translate::ns_to_deployment(&ns))
    }

    /// Terminate and remove the instance (`ns_instances_content`).
    async fn delete_deployment(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        require_segment("deployment", id).op("delete_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "delete_deployment", id, async {
            self.send(&ctx, Call::delete(format!("{}/{}", NS_CONTENT, id))).await.map(|_| ())
        })
        .await
    }

    async fn get_deployment_status(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentStatusDetail> {
        require_segment("deployment", id).op("get_deployment_status", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let ns = run_op(&ctx, BACKEND, "get_deployment_status", id, self.fetch_ns(&ctx, id)).await?;
        Ok(translate::ns_status(&ns))
    }

    /// LCM operation occurrences of the instance.
    async fn get_deployment_history(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentHistory> {
        require_segment("deployment", id).op("get_deployment_history", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let ops: Vec<LcmOpOcc> = run_op(&ctx, BACKEND, "get_deployment_history", id, async {
            // existence check; the op list is empty rather than 404 for unknown instances
            self.fetch_ns(&ctx, id).await?;
            self.json(&ctx, Call::get(NS_OPS).query("nsInstanceId", id)).await
        })
        .await?;
        Ok(DeploymentHistory { deployment_id: id.to_string(), revisions: translate::ops_to_history(&ops) })
    }

    async fn create_subscription(&self, _ctx: &Ctx, sub: Subscription) -> O2Result<Subscription> {
        Err(self.subscriptions_unsupported("create_subscription").context("create_subscription", &sub.subscription_id))
    }

    async fn get_subscription(&self, _ctx: &Ctx, id: &str) -> O2Result<Subscription> {
        Err(self.subscriptions_unsupported("get_subscription").context("get_subscription", id))
    }

    async fn list_subscriptions(&self, _ctx: &Ctx) -> O2Result<Vec<Subscription>> {
        Err(self.subscriptions_unsupported("list_subscriptions"))
    }

    async fn delete_subscription(&self, _ctx: &Ctx, id: &str) -> O2Result<()> {
        Err(self.subscriptions_unsupported("delete_subscription").context("delete_subscription", id))
    }
}
