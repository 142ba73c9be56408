//! o2bridge Argo CD backend: deployments are `Application` objects reconciled from Git.
//!
//! Everything goes through the cluster API server; Argo CD's own REST API is never called.
//! Rollback and scaling are declared unsupported: the desired state lives in Git, so both are
//! commits to the source repository rather than operations on the application.

#![forbid(unsafe_code)]

mod config;
pub mod translate;

pub use config::ArgoCdConfig;

use kube::api::{Api, DynamicObject, ListParams};
use kube::Client;
use o2bridge_api::{require_id, run_op, Adapter};
use o2bridge_core::prelude::*;
use o2bridge_core::{DeploymentRequest, DeploymentUpdate, LogOptions};
use o2bridge_kube as kh;
use o2bridge_store::{LazyInit, SubscriptionStore};
use tracing::debug;

pub const BACKEND: &str = "argocd";

pub struct ArgoCdAdapter {
    cfg: ArgoCdConfig,
    caps: CapabilitySet,
    /// Pre-built client; `None` means kubeconfig / in-cluster discovery on first use.
    preset: Option<Client>,
    client: LazyInit<Client>,
    subs: SubscriptionStore,
}

impl ArgoCdAdapter {
    pub fn new(cfg: ArgoCdConfig) -> Self {
        Self::build(cfg, None)
    }

    /// Use an already configured client instead of the ambient kubeconfig.
    pub fn with_client(cfg: ArgoCdConfig, client: Client) -> Self {
        Self::build(cfg, Some(client))
    }

    fn build(cfg: ArgoCdConfig, preset: Option<Client>) -> Self {
        let caps = CapabilitySet::new([
            Capability::DeploymentManagers,
            Capability::DeploymentLifecycle,
            Capability::GitOps,
            Capability::HealthChecks,
            Capability::Subscriptions,
        ]);
        Self { cfg: cfg.normalized(), caps, preset, client: LazyInit::new("argocd-kube-client"), subs: SubscriptionStore::new(BACKEND) }
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

    async fn apps(&self) -> O2Result<Api<DynamicObject>> {
        let client = self.client().await?;
        Ok(Api::namespaced_with(client, &self.cfg.argo_namespace, &translate::api_resource()))
    }

    async fn fetch(&self, name: &str) -> O2Result<DynamicObject> {
        let api = self.apps().await?;
        kh::get_object(&api, name).await
    }
}

#[async_trait::async_trait]
impl Adapter for ArgoCdAdapter {
    fn name(&self) -> &'static str { BACKEND }

    fn version(&self) -> &'static str { "v1alpha1" }

    fn capabilities(&self) -> &CapabilitySet { &self.caps }

    async fn health(&self, ctx: &Ctx) -> O2Result<()> {
        let ctx = ctx.with_timeout(self.cfg.common.health_timeout);
        run_op(&ctx, BACKEND, "health", &self.cfg.argo_namespace, async {
            let api = self.apps().await?;
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
        o2bridge_core::ext_put(&mut ext, BACKEND, "argoNamespace", self.cfg.argo_namespace.as_str());
        o2bridge_core::ext_put(&mut ext, BACKEND, "project", self.cfg.project.as_str());
        o2bridge_core::ext_put(&mut ext, BACKEND, "autoSync", self.cfg.auto_sync);
        Ok(DeploymentManager {
            deployment_manager_id: self.cfg.common.deployment_manager_id.clone(),
            name: "Argo CD".into(),
            description: "GitOps continuous delivery via Argo CD Applications".into(),
            o_cloud_id: self.cfg.common.o_cloud_id.clone(),
            service_uri: self.cfg.destination_server.clone(),
            capabilities: self.caps.tags(),
            supported_locations: Vec::new(),
            extensions: ext,
        })
    }

    async fn list_deployments(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<Deployment>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let selector = translate::label_selector(&filter.labels);
        let objs = run_op(&ctx, BACKEND, "list_deployments", "", async {
            let api = self.apps().await?;
            kh::list_objects(&api, selector.as_deref()).await
        })
        .await?;
        let items = objs.iter().map(translate::application_to_deployment).collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_deployment(&self, ctx: &Ctx, id: &str) -> O2Result<Deployment> {
        require_id("deployment", id).op("get_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let obj = run_op(&ctx, BACKEND, "get_deployment", id, self.fetch(id)).await?;
        Ok(translate::application_to_deployment(&obj))
    }

    async fn create_deployment(&self, ctx: &Ctx, req: DeploymentRequest) -> O2Result<Deployment> {
        let obj = translate::build_application(&req, &self.cfg).map_err(|e| e.context("create_deployment", &req.name))?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let created = run_op(&ctx, BACKEND, "create_deployment", &req.name, async {
            let api = self.apps().await?;
            kh::create_object(&api, &obj).await
        })
        .await?;
        Ok(translate::application_to_deployment(&created))
    }

    /// Read-modify-replace; a concurrent writer surfaces as `Conflict`.
    async fn update_deployment(&self, ctx: &Ctx, id: &str, update: DeploymentUpdate) -> O2Result<Deployment> {
        require_id("deployment", id).op("update_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let replaced = run_op(&ctx, BACKEND, "update_deployment", id, async {
            let api = self.apps().await?;
            let current = kh::get_object(&api, id).await?;
            debug!(app = %id, rv = ?current.metadata.resource_version, "replacing application");
            kh::replace_object(&api, id, &translate::apply_update(current, &update)).await
        })
        .await?;
        Ok(translate::application_to_deployment(&replaced))
    }

    async fn delete_deployment(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        require_id("deployment", id).op("delete_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "delete_deployment", id, async {
            let api = self.apps().await?;
            kh::delete_object(&api, id).await
        })
        .await
    }

    async fn get_deployment_status(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentStatusDetail> {
        require_id("deployment", id).op("get_deployment_status", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let obj = run_op(&ctx, BACKEND, "get_deployment_status", id, self.fetch(id)).await?;
        Ok(translate::application_status(&obj))
    }

    async fn get_deployment_history(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentHistory> {
        require_id("deployment", id).op("get_deployment_history", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let obj = run_op(&ctx, BACKEND, "get_deployment_history", id, self.fetch(id)).await?;
        Ok(DeploymentHistory { deployment_id: id.to_string(), revisions: translate::application_history(&obj) })
    }

    /// Logs of the pods carrying the application instance label in the destination namespace.
    async fn get_deployment_logs(&self, ctx: &Ctx, id: &str, opts: LogOptions) -> O2Result<String> {
        require_id("deployment", id).op("get_deployment_logs", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "get_deployment_logs", id, async {
            let obj = self.fetch(id).await?;
            let dep = translate::application_to_deployment(&obj);
            let ns = if dep.namespace.is_empty() { self.cfg.common.default_namespace.clone() } else { dep.namespace };
            kh::pod_logs(self.client().await?, &ns, &translate::pod_selector(id), &opts).await
        })
        .await
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
