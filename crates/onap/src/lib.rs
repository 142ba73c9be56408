//! o2bridge ONAP backend: service instances through SO and A&AI, service models from the SDC
//! catalog.
//!
//! Instantiation is asynchronous in SO; a freshly created deployment reports `Pending` until A&AI
//! carries the instance. Catalog onboarding is a design-time SDC flow, so packages are read-only.

#![forbid(unsafe_code)]

mod config;
pub mod native;
pub mod translate;

pub use config::OnapConfig;

use std::sync::Arc;

use o2bridge_api::{require_segment, run_op, Adapter};
use o2bridge_client::{BackendClient, Call};
use o2bridge_core::prelude::*;
use o2bridge_core::DeploymentRequest;
use o2bridge_store::{LazyInit, SubscriptionStore};
use tracing::{debug, info};

use native::{CatalogService, OrchestrationRequestList, ServiceInstance, ServiceInstanceList, SoResponse, AAI_VERSION, SO_VERSION};

pub const BACKEND: &str = "onap";

struct Clients {
    so: BackendClient,
    aai: BackendClient,
    sdc: BackendClient,
}

pub struct OnapAdapter {
    cfg: OnapConfig,
    caps: CapabilitySet,
    clients: LazyInit<Arc<Clients>>,
    subs: SubscriptionStore,
}

impl OnapAdapter {
    pub fn new(cfg: OnapConfig) -> O2Result<Self> {
        let cfg = cfg.normalized();
        for (name, c) in [("so", &cfg.so), ("aai", &cfg.aai), ("sdc", &cfg.sdc)] {
            if c.endpoint.is_empty() {
                return Err(O2Error::InvalidArgument(format!("onap: {} endpoint is required", name)));
            }
        }
        let caps = CapabilitySet::new([
            Capability::DeploymentManagers,
            Capability::PackageManagement,
            Capability::DeploymentLifecycle,
            Capability::HealthChecks,
            Capability::Subscriptions,
        ]);
        Ok(Self { cfg, caps, clients: LazyInit::new("onap-clients"), subs: SubscriptionStore::new(BACKEND) })
    }

    async fn clients(&self) -> O2Result<Arc<Clients>> {
        let (so, aai, sdc) = (self.cfg.so.clone(), self.cfg.aai.clone(), self.cfg.sdc.clone());
        self.clients
            .get_or_try_init(|| async move {
                Ok(Arc::new(Clients {
                    so: BackendClient::new("onap-so", so)?,
                    aai: BackendClient::new("onap-aai", aai)?,
                    sdc: BackendClient::new("onap-sdc", sdc)?,
                }))
            })
            .await
    }

    fn instances_path(&self, service_type: &str) -> String {
        format!(
            "/aai/{}/business/customers/customer/{}/service-subscriptions/service-subscription/{}/service-instances",
            AAI_VERSION, self.cfg.global_customer_id, service_type
        )
    }

    /// Looks the instance up regardless of customer and subscription.
    async fn fetch_instance(&self, ctx: &Ctx, id: &str) -> O2Result<ServiceInstance> {
        let c = self.clients().await?;
        c.aai.json(ctx, Call::get(format!("/aai/{}/nodes/service-instances/service-instance/{}", AAI_VERSION, id))).await
    }

    async fn fetch_service(&self, ctx: &Ctx, uuid: &str) -> O2Result<CatalogService> {
        let c = self.clients().await?;
        c.sdc.json(ctx, Call::get(format!("/sdc/v1/catalog/services/{}/metadata", uuid))).await
    }
}

#[async_trait::async_trait]
impl Adapter for OnapAdapter {
    fn name(&self) -> &'static str { BACKEND }

    fn version(&self) -> &'static str { SO_VERSION }

    fn capabilities(&self) -> &CapabilitySet { &self.caps }

    async fn health(&self, ctx: &Ctx) -> O2Result<()> {
        let ctx = ctx.with_timeout(self.cfg.common.health_timeout);
        run_op(&ctx, BACKEND, "health", "", async {
            let c = self.clients().await?;
            c.aai.exec(&ctx, Call::get("/aai/util/echo")).await?;
            c.so.exec(&ctx, Call::get("/manage/health")).await
        })
        .await
    }

    async fn close(&self) -> O2Result<()> {
        self.clients.reset().await;
        self.subs.clear();
        Ok(())
    }

    async fn get_deployment_manager(&self, _ctx: &Ctx) -> O2Result<DeploymentManager> {
        let mut ext = Extensions::new();
        o2bridge_core::ext_put(&mut ext, BACKEND, "globalCustomerId", self.cfg.global_customer_id.as_str());
        o2bridge_core::ext_put(&mut ext, BACKEND, "serviceType", self.cfg.service_type.as_str());
        o2bridge_core::ext_put(&mut ext, BACKEND, "aai", self.cfg.aai.endpoint.as_str());
        o2bridge_core::ext_put(&mut ext, BACKEND, "sdc", self.cfg.sdc.endpoint.as_str());
        Ok(DeploymentManager {
            deployment_manager_id: self.cfg.common.deployment_manager_id.clone(),
            name: "ONAP".into(),
            description: "Network service orchestration via ONAP SO".into(),
            o_cloud_id: self.cfg.common.o_cloud_id.clone(),
            service_uri: self.cfg.so.endpoint.clone(),
            capabilities: self.caps.tags(),
            supported_locations: Vec::new(),
            extensions: ext,
        })
    }

    async fn list_deployment_packages(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<DeploymentPackage>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let services: Vec<CatalogService> = run_op(&ctx, BACKEND, "list_deployment_packages", "", async {
            let c = self.clients().await?;
            c.sdc.json(&ctx, Call::get("/sdc/v1/catalog/services")).await
        })
        .await?;
        let items = services.iter().map(translate::service_to_package).collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_deployment_package(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentPackage> {
        require_segment("package", id).op("get_deployment_package", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let svc = run_op(&ctx, BACKEND, "get_deployment_package", id, self.fetch_service(&ctx, id)).await?;
        Ok(translate::service_to_package(&svc))
    }

    /// Instances of one service subscription: the filter namespace, else the configured type.
    async fn list_deployments(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<Deployment>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let service_type = filter.namespace.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| self.cfg.service_type.clone());
        require_segment("service type", &service_type).op("list_deployments", &service_type)?;
        let path = self.instances_path(&service_type);
        let list = run_op(&ctx, BACKEND, "list_deployments", &service_type, async {
            let c = self.clients().await?;
            match c.aai.json::<ServiceInstanceList>(&ctx, Call::get(path)).await {
                // A&AI answers 404 for an empty subscription
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(ServiceInstanceList::default()),
                other => other,
            }
        })
        .await?;
        let items = list.service_instance.iter().map(|si| translate::instance_to_deployment(si, &service_type)).collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_deployment(&self, ctx: &Ctx, id: &str) -> O2Result<Deployment> {
        require_segment("deployment", id).op("get_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let si = run_op(&ctx, BACKEND, "get_deployment", id, self.fetch_instance(&ctx, id)).await?;
        Ok(translate::instance_to_deployment(&si, ""))
    }

    /// `package_id` is the SDC service UUID (the A&AI model-version-id).
    async fn create_deployment(&self, ctx: &Ctx, req: DeploymentRequest) -> O2Result<Deployment> {
        require_segment("package", &req.package_id).op("create_deployment", req.name.clone())?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let (svc, resp) = run_op(&ctx, BACKEND, "create_deployment", &req.name, async {
            let svc = self.fetch_service(&ctx, &req.package_id).await?;
            let body = translate::build_instantiate(&req, &svc, &self.cfg)?;
            let c = self.clients().await?;
            let path = format!("/onap/so/infra/serviceInstantiation/{}/serviceInstances", SO_VERSION);
            let resp: SoResponse = c.so.json(&ctx, Call::post(path).json(&body)?).await?;
            Ok((svc, resp))
        })
        .await?;
        let refs = resp.request_references;
        if refs.instance_id.is_empty() {
            return Err(O2Error::Internal("SO accepted the request without an instance id".into()).context("create_deployment", req.name));
        }
        info!(instance = %refs.instance_id, request = %refs.request_id, service = %svc.name, "service instantiation requested");
        let service_type = if req.namespace.is_empty() { self.cfg.service_type.clone() } else { req.namespace.clone() };
        let si = ServiceInstance {
            service_instance_id: refs.instance_id,
            service_instance_name: req.name.clone(),
            model_invariant_id: svc.invariant_uuid,
            model_version_id: svc.uuid,
            orchestration_status: "PendingCreate".into(),
            ..Default::default()
        };
        let mut d = translate::instance_to_deployment(&si, &service_type);
        d.description = req.description;
        o2bridge_core::ext_put(&mut d.extensions, BACKEND, "requestId", refs.request_id);
        Ok(d)
    }

    async fn delete_deployment(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        require_segment("deployment", id).op("delete_deployment", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "delete_deployment", id, async {
            let si = self.fetch_instance(&ctx, id).await?;
            let body = translate::build_delete(&si, &self.cfg);
            let c = self.clients().await?;
            let path = format!("/onap/so/infra/serviceInstantiation/{}/serviceInstances/{}", SO_VERSION, id);
            let resp: SoResponse = c.so.json(&ctx, Call::delete(path).json(&body)?).await?;
            debug!(instance = %id, request = %resp.request_references.request_id, "service deletion requested");
            Ok(())
        })
        .await
    }

    async fn get_deployment_status(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentStatusDetail> {
        require_segment("deployment", id).op("get_deployment_status", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let si = run_op(&ctx, BACKEND, "get_deployment_status", id, self.fetch_instance(&ctx, id)).await?;
        Ok(translate::instance_status(&si))
    }

    /// SO orchestration requests recorded against the instance.
    async fn get_deployment_history(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentHistory> {
        require_segment("deployment", id).op("get_deployment_history", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let list = run_op(&ctx, BACKEND, "get_deployment_history", id, async {
            let c = self.clients().await?;
            let call = Call::get(format!("/onap/so/infra/orchestrationRequests/{}", SO_VERSION))
                .query("filter", format!("serviceInstanceId:EQUALS:{}", id));
            c.so.json::<OrchestrationRequestList>(&ctx, call).await
        })
        .await?;
        let reqs: Vec<_> = list.request_list.into_iter().map(|w| w.request).collect();
        if reqs.is_empty() {
            return Err(O2Error::NotFound(format!("no orchestration requests for {}", id)).context("get_deployment_history", id));
        }
        Ok(DeploymentHistory { deployment_id: id.to_string(), revisions: translate::requests_to_history(&reqs) })
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
