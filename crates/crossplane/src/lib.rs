//! o2bridge Crossplane backend.
//!
//! Compositions are the deployable packages; a deployment is a composite resource (XR) bound to
//! one of them. The XR kind differs per composition, so every deployment lookup first resolves
//! the composite kinds the exposed compositions render and then searches those.

#![forbid(unsafe_code)]

mod config;
pub mod translate;

pub use config::CrossplaneConfig;

use std::collections::BTreeSet;

use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::Client;
use o2bridge_api::{require_id, run_op, Adapter};
use o2bridge_core::prelude::*;
use o2bridge_core::{DeploymentRequest, DeploymentUpdate, PackageUpload};
use o2bridge_kube as kh;
use o2bridge_store::{LazyInit, SubscriptionStore};
use tracing::debug;

pub const BACKEND: &str = "crossplane";

pub struct CrossplaneAdapter {
    cfg: CrossplaneConfig,
    caps: CapabilitySet,
    preset: Option<Client>,
    client: LazyInit<Client>,
    subs: SubscriptionStore,
}

impl CrossplaneAdapter {
    pub fn new(cfg: CrossplaneConfig) -> Self {
        Self::build(cfg, None)
    }

    pub fn with_client(cfg: CrossplaneConfig, client: Client) -> Self {
        Self::build(cfg, Some(client))
    }

    fn build(cfg: CrossplaneConfig, preset: Option<Client>) -> Self {
        let caps = CapabilitySet::new([
            Capability::DeploymentManagers,
            Capability::PackageManagement,
            Capability::DeploymentLifecycle,
            Capability::HealthChecks,
            Capability::Subscriptions,
        ]);
        Self { cfg: cfg.normalized(), caps, preset, client: LazyInit::new("crossplane-kube-client"), subs: SubscriptionStore::new(BACKEND) }
    }

    async fn client(&self) -> O2Result<Client> {
        let preset = self.preset.clone();
        self.client
            .get_or_try_init(|| async move {
                match preset {
                    Some(c) => Ok(c),
                    None => kh::kube_client().await,
                }
            })
            .await
    }

    async fn compositions_api(&self) -> O2Result<Api<DynamicObject>> {
        Ok(Api::all_with(self.client().await?, &translate::compositions()))
    }

    async fn list_compositions(&self) -> O2Result<Vec<DynamicObject>> {
        let api = self.compositions_api().await?;
        let sel = Some(self.cfg.composition_selector.as_str()).filter(|s| !s.is_empty());
        kh::list_objects(&api, sel).await
    }

    /// Served resource for the composite kind `composition` renders.
    async fn composite_kind_for(&self, composition: &DynamicObject) -> O2Result<CompositeKind> {
        let gvk = translate::composite_gvk(composition)?;
        let (ar, namespaced) = kh::find_api_resource(self.client().await?, &gvk).await?;
        Ok(CompositeKind { ar, namespaced })
    }

    /// Distinct composite kinds of the exposed compositions. Kinds that are not (yet) served are skipped.
    async fn composite_kinds(&self) -> O2Result<Vec<CompositeKind>> {
        let comps = self.list_compositions().await?;
        let mut seen = BTreeSet::new();
        let mut kinds = Vec::new();
        for c in &comps {
            let Ok(gvk) = translate::composite_gvk(c) else { continue };
            if !seen.insert(kh::gvk_key(&gvk)) {
                continue;
            }
            match self.composite_kind_for(c).await {
                Ok(kind) => kinds.push(kind),
                Err(e) if e.is(ErrorKind::NotFound) => debug!(gvk = %kh::gvk_key(&gvk), "composite kind not served; skipped"),
                Err(e) => return Err(e),
            }
        }
        Ok(kinds)
    }

    /// The composite behind deployment `id` together with the API handle that owns it and its name.
    /// Ids without a namespace resolve namespaced kinds in the default namespace.
    async fn find_composite<'a>(&self, id: &'a str) -> O2Result<(Api<DynamicObject>, DynamicObject, &'a str)> {
        let (ns, name) = translate::parse_composite_id(id)?;
        let client = self.client().await?;
        for kind in self.composite_kinds().await? {
            let api = match (kind.namespaced, ns) {
                (true, ns) => Api::namespaced_with(client.clone(), ns.unwrap_or(&self.cfg.common.default_namespace), &kind.ar),
                (false, None) => Api::all_with(client.clone(), &kind.ar),
                (false, Some(_)) => continue,
            };
            match kh::get_object(&api, name).await {
                Ok(obj) => return Ok((api, obj, name)),
                Err(e) if e.is(ErrorKind::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(O2Error::NotFound(format!("composite resource {}", id)))
    }
}

struct CompositeKind {
    ar: ApiResource,
    namespaced: bool,
}

#[async_trait::async_trait]
impl Adapter for CrossplaneAdapter {
    fn name(&self) -> &'static str { BACKEND }

    fn version(&self) -> &'static str { "v1" }

    fn capabilities(&self) -> &CapabilitySet { &self.caps }

    async fn health(&self, ctx: &Ctx) -> O2Result<()> {
        let ctx = ctx.with_timeout(self.cfg.common.health_timeout);
        run_op(&ctx, BACKEND, "health", "compositions", async {
            let api = self.compositions_api().await?;
            api.list(&ListParams::default().limit(1)).await.map_err(kh::map_kube_error)?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> O2Result<()> {
        self.client.reset().await;
        self.subs.clear();
        Ok(())
    }

    async fn get_deployment_manager(&self, _ctx: &Ctx) -> O2Result<DeploymentManager> {
        let mut ext = Extensions::new();
        if !self.cfg.composition_selector.is_empty() {
            o2bridge_core::ext_put(&mut ext, BACKEND, "compositionSelector", self.cfg.composition_selector.as_str());
        }
        Ok(DeploymentManager {
            deployment_manager_id: self.cfg.common.deployment_manager_id.clone(),
            name: "Crossplane".into(),
            description: "Infrastructure composition via Crossplane composite resources".into(),
            o_cloud_id: self.cfg.common.o_cloud_id.clone(),
            service_uri: String::new(),
            capabilities: self.caps.tags(),
            supported_locations: Vec::new(),
            extensions: ext,
        })
    }

    async fn list_deployment_packages(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<DeploymentPackage>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let comps = run_op(&ctx, BACKEND, "list_deployment_packages", "", self.list_compositions()).await?;
        let items = comps.iter().map(translate::composition_to_package).collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_deployment_package(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentPackage> {
        require_id("package", id).op("get_deployment_package", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let obj = run_op(&ctx, BACKEND, "get_deployment_package", id, async {
            kh::get_object(&self.compositions_api().await?, id).await
        })
        .await?;
        Ok(translate::composition_to_package(&obj))
    }

    /// `content` is a Composition manifest in YAML or JSON.
    async fn upload_deployment_package(&self, ctx: &Ctx, pkg: PackageUpload) -> O2Result<DeploymentPackage> {
        let obj = translate::composition_from_upload(&pkg).map_err(|e| e.context("upload_deployment_package", &pkg.name))?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let created = run_op(&ctx, BACKEND, "upload_deployment_package", &pkg.name, async {
            kh::create_object(&self.compositions_api().await?, &obj).await
        })
        .await?;
        Ok(translate::composition_to_package(&created))
    }

    async fn delete_deployment_package(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        require_id("package", id).op("delete_deployment_package", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "delete_deployment_package", id, async {
            kh::delete_object(&self.compositions_api().await?, id).await
        })
        .await
    }

    async fn list_deployments(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<Deployment>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let selector = translate::composite_selector(&filter.labels);
        let objs = run_op(&ctx, BACKEND, "list_deployments", "", async {
            let client = self.client().await?;
            let mut out = Vec::new();
            // cluster-wide handles list namespaced composites across every namespace
            for kind in self.composite_kinds().await? {
                let api = Api::all_with(client.clone(), &kind.ar);
                out.extend(kh::list_objects(&api, Some(&selector)).await?);
            }
            Ok(out)
        })
        .await?;
        let default_ns = self.cfg.common.default_namespace.as_str();
        let mut items: Vec<Deployment> = objs.iter().map(|o| translate::composite_to_deployment(o, default_ns)).collect();
        items.sort_by(|a, b| a.deployment_id.cmp(&b.deployment_id));
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_deployment(&self, ctx: &Ctx, id: &str) -> O2Result<Deployment> {
        require_id("deployment", id).op("get_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let (_, obj, _) = run_op(&ctx, BACKEND, "get_deployment", id, self.find_composite(id)).await?;
        Ok(translate::composite_to_deployment(&obj, &self.cfg.common.default_namespace))
    }

    /// `package_id` names the composition; its `compositeTypeRef` decides the XR kind.
    async fn create_deployment(&self, ctx: &Ctx, req: DeploymentRequest) -> O2Result<Deployment> {
        if req.package_id.trim().is_empty() {
            return Err(O2Error::InvalidArgument("packageId (composition) is required".into()).context("create_deployment", &req.name));
        }
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let created = run_op(&ctx, BACKEND, "create_deployment", &req.name, async {
            let composition = kh::get_object(&self.compositions_api().await?, &req.package_id).await?;
            let kind = self.composite_kind_for(&composition).await?;
            let xr = translate::build_composite(&req, &kind.ar, kind.namespaced, &self.cfg.common.default_namespace)?;
            let ns = xr.metadata.namespace.as_deref().unwrap_or_default();
            let api = kh::dynamic_api(self.client().await?, &kind.ar, kind.namespaced, ns);
            kh::create_object(&api, &xr).await
        })
        .await?;
        Ok(translate::composite_to_deployment(&created, &self.cfg.common.default_namespace))
    }

    async fn update_deployment(&self, ctx: &Ctx, id: &str, update: DeploymentUpdate) -> O2Result<Deployment> {
        require_id("deployment", id).op("update_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let replaced = run_op(&ctx, BACKEND, "update_deployment", id, async {
            let (api, current, name) = self.find_composite(id).await?;
            kh::replace_object(&api, name, &translate::apply_update(current, &update)).await
        })
        .await?;
        Ok(translate::composite_to_deployment(&replaced, &self.cfg.common.default_namespace))
    }

    async fn delete_deployment(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        require_id("deployment", id).op("delete_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "delete_deployment", id, async {
            let (api, _, name) = self.find_composite(id).await?;
            kh::delete_object(&api, name).await
        })
        .await
    }

    async fn get_deployment_status(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentStatusDetail> {
        require_id("deployment", id).op("get_deployment_status", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let (_, obj, _) = run_op(&ctx, BACKEND, "get_deployment_status", id, self.find_composite(id)).await?;
        Ok(translate::composite_status(&obj, &self.cfg.common.default_namespace))
    }

    async fn get_deployment_history(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentHistory> {
        require_id("deployment", id).op("get_deployment_history", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let revisions = run_op(&ctx, BACKEND, "get_deployment_history", id, async {
            let (_, xr, _) = self.find_composite(id).await?;
            let composition = kh::str_at(xr.data.get("spec").unwrap_or(&serde_json::Value::Null), "/compositionRef/name").to_string();
            let api: Api<DynamicObject> = Api::all_with(self.client().await?, &translate::composition_revisions());
            let sel = format!("{}={}", translate::REVISION_COMPOSITION_LABEL, composition);
            let revs = kh::list_objects(&api, Some(&sel)).await?;
            Ok(translate::revisions_to_history(&xr, &revs))
        })
        .await?;
        Ok(DeploymentHistory { deployment_id: id.to_string(), revisions })
    }

    async fn create_subscription(&self, ctx: &Ctx, sub: Subscription) -> O2Result<Subscription> {
        ctx.check("create_subscription")?;
        let id = sub.subscription_id.clone();
        self.subs.create(sub).op("create_subscription", id)
    }

    async fn get_subscription(&self, ctx: &Ctx, id: &str) -> O2Result<Subscription> {
        ctx.check("get_subscription")?;
        self.subs.get(id).op("get_subscription", id)
    }

    async fn list_subscriptions(&self, ctx: &Ctx) -> O2Result<Vec<Subscription>> {
        ctx.check("list_subscriptions")?;
        Ok(self.subs.list())
    }

    async fn delete_subscription(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        ctx.check("delete_subscription")?;
        self.subs.delete(id).op("delete_subscription", id)
    }
}
