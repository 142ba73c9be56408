//! o2bridge Helm backend: deployments are Helm releases, packages are charts in a repository.
//!
//! Release operations go through a [`HelmDriver`]; the default one shells out to the `helm`
//! binary. Packages come from the repository's `index.yaml` and uploads target the ChartMuseum
//! API. Pod logs are read straight from the cluster.

#![forbid(unsafe_code)]

pub mod cli;
mod config;
pub mod driver;
pub mod index;
pub mod translate;

pub use cli::HelmCli;
pub use config::HelmConfig;
pub use driver::HelmDriver;

use std::sync::Arc;

use kube::Client;
use o2bridge_api::{require_id, run_op, Adapter};
use o2bridge_client::BackendClient;
use o2bridge_core::prelude::*;
use o2bridge_core::{DeploymentRequest, DeploymentUpdate, LogOptions, PackageUpload};
use o2bridge_kube as kh;
use o2bridge_store::{LazyInit, SubscriptionStore};
use serde_json::Value;
use tracing::{debug, info};

use crate::driver::{InstallSpec, ReleaseInfo, UpgradeSpec};
use crate::index::IndexCache;

pub const BACKEND: &str = "helm";

/// Chart coordinates handed to install/upgrade.
#[derive(Debug, Clone, Default, PartialEq)]
struct ChartRef {
    chart: String,
    version: Option<String>,
    repo: Option<String>,
}

pub struct HelmAdapter {
    cfg: HelmConfig,
    caps: CapabilitySet,
    driver: Arc<dyn HelmDriver>,
    /// `None` when no chart repository is configured.
    index: Option<IndexCache>,
    kube_preset: Option<Client>,
    kube: LazyInit<Client>,
    subs: SubscriptionStore,
}

impl HelmAdapter {
    pub fn new(cfg: HelmConfig) -> O2Result<Self> {
        let cfg = cfg.normalized();
        let cli = HelmCli::new(cfg.binary.as_str()).kube_context(cfg.kube_context.clone()).kubeconfig(cfg.kubeconfig.clone());
        Self::with_driver(cfg, Arc::new(cli))
    }

    /// Use `driver` for release operations instead of the `helm` binary.
    pub fn with_driver(cfg: HelmConfig, driver: Arc<dyn HelmDriver>) -> O2Result<Self> {
        let cfg = cfg.normalized();
        let index = if cfg.repository.endpoint.is_empty() {
            None
        } else {
            Some(IndexCache::new(BackendClient::new(BACKEND, cfg.repository.clone())?, cfg.index_ttl))
        };
        let caps = CapabilitySet::new([
            Capability::DeploymentManagers,
            Capability::PackageManagement,
            Capability::DeploymentLifecycle,
            Capability::Rollback,
            Capability::Scaling,
            Capability::HealthChecks,
            Capability::Subscriptions,
        ]);
        Ok(Self {
            cfg,
            caps,
            driver,
            index,
            kube_preset: None,
            kube: LazyInit::new("helm-kube-client"),
            subs: SubscriptionStore::new(BACKEND),
        })
    }

    /// Read pod logs through `client` instead of the ambient kubeconfig.
    pub fn with_kube_client(mut self, client: Client) -> Self {
        self.kube_preset = Some(client);
        self
    }

    async fn kube_client(&self) -> O2Result<Client> {
        let preset = self.kube_preset.clone();
        self.kube
            .get_or_try_init(|| async move {
                match preset {
                    Some(c) => Ok(c),
                    None => kh::kube_client().await,
                }
            })
            .await
    }

    fn index(&self, op: &str) -> O2Result<&IndexCache> {
        self.index
            .as_ref()
            .ok_or_else(|| O2Error::NotSupported(format!("{}: {} needs a chart repository endpoint", BACKEND, op)))
    }

    fn release<'a>(&'a self, id: &'a str) -> O2Result<(&'a str, &'a str)> {
        translate::parse_release_id(id, &self.cfg.common.default_namespace)
    }

    /// Explicit `helm.chart` wins; a known repository package id comes next, then a bare chart
    /// name at its newest version; anything else is passed to helm as-is (`repo/chart`, a path,
    /// `oci://...`).
    async fn resolve_chart(&self, ctx: &Ctx, package_id: &str, ext: &Extensions) -> O2Result<ChartRef> {
        let chart = self.lookup_chart(ctx, package_id, ext).await?;
        translate::validate_chart_ref(&chart.chart)?;
        Ok(chart)
    }

    async fn lookup_chart(&self, ctx: &Ctx, package_id: &str, ext: &Extensions) -> O2Result<ChartRef> {
        let ext_str = |k: &str| {
            ext.get(&format!("{}.{}", BACKEND, k)).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string)
        };
        if let Some(chart) = ext_str("chart") {
            return Ok(ChartRef { chart, version: ext_str("version"), repo: ext_str("repo") });
        }
        if package_id.is_empty() {
            return Err(O2Error::InvalidArgument("package id is required".into()));
        }
        translate::validate_chart_ref(package_id)?;
        if let Some(index) = &self.index {
            let idx = index.get(ctx).await?;
            let pinned = ext_str("version");
            let found = match pinned {
                Some(_) => idx.find(package_id),
                None => idx.find(package_id).or_else(|| idx.latest(package_id)),
            };
            if let Some(v) = found {
                return Ok(ChartRef {
                    chart: v.name.clone(),
                    version: Some(v.version.clone()),
                    repo: Some(index.endpoint().to_string()),
                });
            }
        }
        Ok(ChartRef { chart: package_id.to_string(), version: ext_str("version"), repo: ext_str("repo") })
    }

    /// Chart of a deployed release, pinned to its current version.
    fn current_chart(&self, rel: &ReleaseInfo) -> O2Result<ChartRef> {
        let meta = rel
            .chart
            .as_ref()
            .map(|c| &c.metadata)
            .ok_or_else(|| O2Error::Internal(format!("release {} carries no chart metadata", rel.name)))?;
        Ok(ChartRef {
            chart: meta.name.clone(),
            version: Some(meta.version.clone()).filter(|v| !v.is_empty()),
            repo: self.index.as_ref().map(|i| i.endpoint().to_string()),
        })
    }

    async fn upgrade(&self, ctx: &Ctx, id: &str, update: &DeploymentUpdate, set: Vec<(String, String)>) -> O2Result<ReleaseInfo> {
        let (ns, name) = self.release(id)?;
        let current = self.driver.status(ctx, name, ns).await?;
        let chart = match &update.package_id {
            Some(p) => self.resolve_chart(ctx, p, &update.extensions).await?,
            None => self.current_chart(&current)?,
        };
        let spec = UpgradeSpec {
            release: name.to_string(),
            namespace: ns.to_string(),
            chart: chart.chart,
            version: chart.version,
            repo: chart.repo,
            values: update.values.clone(),
            set,
            description: update.description.clone().unwrap_or_default(),
        };
        debug!(release = %name, namespace = %ns, revision = current.version, "upgrading release");
        self.driver.upgrade(ctx, &spec).await
    }
}

#[async_trait::async_trait]
impl Adapter for HelmAdapter {
    fn name(&self) -> &'static str { BACKEND }

    fn version(&self) -> &'static str { "v3" }

    fn capabilities(&self) -> &CapabilitySet { &self.caps }

    async fn health(&self, ctx: &Ctx) -> O2Result<()> {
        let ctx = ctx.with_timeout(self.cfg.common.health_timeout);
        run_op(&ctx, BACKEND, "health", "", async {
            let v = self.driver.version(&ctx).await?;
            debug!(helm = %v, "helm reachable");
            self.driver.list(&ctx, Some(&self.cfg.common.default_namespace)).await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> O2Result<()> {
        self.kube.reset().await;
        if let Some(i) = &self.index {
            i.invalidate();
        }
        self.subs.clear();
        Ok(())
    }

    async fn get_deployment_manager(&self, _ctx: &Ctx) -> O2Result<DeploymentManager> {
        let mut ext = Extensions::new();
        o2bridge_core::ext_put(&mut ext, BACKEND, "binary", self.cfg.binary.as_str());
        o2bridge_core::ext_put(&mut ext, BACKEND, "kubeContext", self.cfg.kube_context.clone());
        o2bridge_core::ext_put(&mut ext, BACKEND, "repository", self.cfg.repository.endpoint.as_str());
        Ok(DeploymentManager {
            deployment_manager_id: self.cfg.common.deployment_manager_id.clone(),
            name: "Helm".into(),
            description: "Package-based releases managed by Helm".into(),
            o_cloud_id: self.cfg.common.o_cloud_id.clone(),
            service_uri: self.cfg.repository.endpoint.clone(),
            capabilities: self.caps.tags(),
            supported_locations: Vec::new(),
            extensions: ext,
        })
    }

    async fn list_deployment_packages(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<DeploymentPackage>> {
        let index = self.index("list_deployment_packages")?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let idx = run_op(&ctx, BACKEND, "list_deployment_packages", "", index.get(&ctx)).await?;
        let items = idx.versions().map(|v| v.to_package()).collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_deployment_package(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentPackage> {
        require_id("package", id).op("get_deployment_package", id)?;
        let index = self.index("get_deployment_package")?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "get_deployment_package", id, async {
            let idx = index.get(&ctx).await?;
            idx.find(id).map(|v| v.to_package()).ok_or_else(|| O2Error::NotFound(format!("chart {}", id)))
        })
        .await
    }

    /// The chart archive goes to ChartMuseum; name and version come from the upload.
    async fn upload_deployment_package(&self, ctx: &Ctx, pkg: PackageUpload) -> O2Result<DeploymentPackage> {
        let id = format!("{}-{}", pkg.name, pkg.version);
        if pkg.name.is_empty() || pkg.version.is_empty() || pkg.content.is_empty() {
            return Err(O2Error::InvalidArgument("chart upload needs name, version and content".into())
                .context("upload_deployment_package", id));
        }
        let index = self.index("upload_deployment_package")?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "upload_deployment_package", &id, index.upload(&ctx, &pkg)).await?;
        info!(chart = %id, bytes = pkg.content.len(), "chart uploaded");
        Ok(DeploymentPackage {
            package_id: id,
            name: pkg.name,
            version: pkg.version,
            package_type: index::PACKAGE_TYPE.into(),
            description: pkg.description,
            uploaded_at: Some(chrono::Utc::now()),
            extensions: pkg.extensions,
        })
    }

    async fn delete_deployment_package(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        require_id("package", id).op("delete_deployment_package", id)?;
        let index = self.index("delete_deployment_package")?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "delete_deployment_package", id, async {
            let idx = index.get(&ctx).await?;
            let v = idx.find(id).ok_or_else(|| O2Error::NotFound(format!("chart {}", id)))?;
            index.remove(&ctx, &v.name, &v.version).await
        })
        .await
    }

    async fn list_deployments(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<Deployment>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let ns = filter.namespace.as_deref().filter(|s| !s.is_empty());
        let rows = run_op(&ctx, BACKEND, "list_deployments", ns.unwrap_or(""), self.driver.list(&ctx, ns)).await?;
        let default_ns = &self.cfg.common.default_namespace;
        let items = rows.iter().map(|r| translate::summary_to_deployment(r, default_ns)).collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_deployment(&self, ctx: &Ctx, id: &str) -> O2Result<Deployment> {
        require_id("deployment", id).op("get_deployment", id)?;
        let (ns, name) = self.release(id).op("get_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let rel = run_op(&ctx, BACKEND, "get_deployment", id, self.driver.status(&ctx, name, ns)).await?;
        Ok(translate::release_to_deployment(&rel, &self.cfg.common.default_namespace))
    }

    async fn create_deployment(&self, ctx: &Ctx, req: DeploymentRequest) -> O2Result<Deployment> {
        if req.name.is_empty() {
            return Err(O2Error::InvalidArgument("release name is required".into()).context("create_deployment", ""));
        }
        translate::validate_release_name(&req.name).op("create_deployment", &req.name)?;
        let namespace = if req.namespace.is_empty() { self.cfg.common.default_namespace.clone() } else { req.namespace.clone() };
        translate::validate_namespace(&namespace).op("create_deployment", &req.name)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let rel = run_op(&ctx, BACKEND, "create_deployment", &req.name, async {
            let chart = self.resolve_chart(&ctx, &req.package_id, &req.extensions).await?;
            let spec = InstallSpec {
                release: req.name.clone(),
                namespace: namespace.clone(),
                chart: chart.chart,
                version: chart.version,
                repo: chart.repo,
                values: req.values.clone(),
                description: req.description.clone(),
            };
            self.driver.install(&ctx, &spec).await
        })
        .await?;
        info!(release = %rel.name, namespace = %rel.namespace, chart = %rel.chart_ref(), "release installed");
        Ok(translate::release_to_deployment(&rel, &self.cfg.common.default_namespace))
    }

    async fn update_deployment(&self, ctx: &Ctx, id: &str, update: DeploymentUpdate) -> O2Result<Deployment> {
        require_id("deployment", id).op("update_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let rel = run_op(&ctx, BACKEND, "update_deployment", id, self.upgrade(&ctx, id, &update, Vec::new())).await?;
        Ok(translate::release_to_deployment(&rel, &self.cfg.common.default_namespace))
    }

    async fn delete_deployment(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        require_id("deployment", id).op("delete_deployment", id)?;
        let (ns, name) = self.release(id).op("delete_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "delete_deployment", id, self.driver.uninstall(&ctx, name, ns)).await
    }

    /// `upgrade --reuse-values --set replicaCount=N`; only charts exposing that value react.
    async fn scale_deployment(&self, ctx: &Ctx, id: &str, replicas: i32) -> O2Result<()> {
        require_id("deployment", id).op("scale_deployment", id)?;
        if replicas < 0 {
            return Err(O2Error::InvalidArgument(format!("replicas must be >= 0, got {}", replicas)).context("scale_deployment", id));
        }
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let set = vec![("replicaCount".to_string(), replicas.to_string())];
        run_op(&ctx, BACKEND, "scale_deployment", id, self.upgrade(&ctx, id, &DeploymentUpdate::default(), set)).await?;
        Ok(())
    }

    async fn rollback_deployment(&self, ctx: &Ctx, id: &str, revision: u64) -> O2Result<()> {
        require_id("deployment", id).op("rollback_deployment", id)?;
        let (ns, name) = self.release(id).op("rollback_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "rollback_deployment", id, async {
            let history = self.driver.history(&ctx, name, ns).await?;
            let target = translate::rollback_target(&history, revision)?;
            info!(release = %name, namespace = %ns, revision = target, "rolling back release");
            self.driver.rollback(&ctx, name, ns, target).await
        })
        .await
    }

    async fn get_deployment_status(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentStatusDetail> {
        require_id("deployment", id).op("get_deployment_status", id)?;
        let (ns, name) = self.release(id).op("get_deployment_status", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let rel = run_op(&ctx, BACKEND, "get_deployment_status", id, self.driver.status(&ctx, name, ns)).await?;
        Ok(translate::release_status(id, &rel))
    }

    async fn get_deployment_history(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentHistory> {
        require_id("deployment", id).op("get_deployment_history", id)?;
        let (ns, name) = self.release(id).op("get_deployment_history", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let entries = run_op(&ctx, BACKEND, "get_deployment_history", id, self.driver.history(&ctx, name, ns)).await?;
        Ok(DeploymentHistory { deployment_id: id.to_string(), revisions: translate::history_revisions(&entries) })
    }

    async fn get_deployment_logs(&self, ctx: &Ctx, id: &str, opts: LogOptions) -> O2Result<String> {
        require_id("deployment", id).op("get_deployment_logs", id)?;
        let (ns, name) = self.release(id).op("get_deployment_logs", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "get_deployment_logs", id, async {
            kh::pod_logs(self.kube_client().await?, ns, &translate::pod_selector(name), &opts).await
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
