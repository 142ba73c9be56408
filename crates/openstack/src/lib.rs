//! o2bridge OpenStack backend: Nova availability zones as resource pools, servers as resources,
//! flavors as resource types. Nova has no webhook mechanism, so subscriptions live in an
//! adapter-owned store.

#![forbid(unsafe_code)]

mod config;
pub mod native;
pub mod translate;

pub use config::OpenStackConfig;

use std::sync::Arc;

use o2bridge_api::{require_segment, run_op, Adapter};
use o2bridge_client::{BackendClient, Call};
use o2bridge_core::prelude::*;
use o2bridge_store::{LazyInit, SubscriptionStore};
use tracing::info;

use native::{AzList, CreatedServer, FlavorEnvelope, FlavorList, ServerCreateEnvelope, ServerEnvelope, ServerList};

pub const BACKEND: &str = "openstack";

pub struct OpenStackAdapter {
    cfg: OpenStackConfig,
    caps: CapabilitySet,
    client: LazyInit<Arc<BackendClient>>,
    subs: SubscriptionStore,
}

impl OpenStackAdapter {
    pub fn new(cfg: OpenStackConfig) -> O2Result<Self> {
        let cfg = cfg.normalized();
        if cfg.client.endpoint.is_empty() {
            return Err(O2Error::InvalidArgument("openstack: endpoint is required".into()));
        }
        let caps = CapabilitySet::new([
            Capability::ResourcePools,
            Capability::Resources,
            Capability::ResourceTypes,
            Capability::DeploymentManagers,
            Capability::Subscriptions,
            Capability::HealthChecks,
        ]);
        Ok(Self { cfg, caps, client: LazyInit::new("openstack-client"), subs: SubscriptionStore::new(BACKEND) })
    }

    async fn client(&self) -> O2Result<Arc<BackendClient>> {
        let cfg = self.cfg.client.clone();
        self.client.get_or_try_init(|| async move { BackendClient::new(BACKEND, cfg).map(Arc::new) }).await
    }

    async fn fetch_server(&self, ctx: &Ctx, id: &str) -> O2Result<Resource> {
        let c = self.client().await?;
        let env: ServerEnvelope = c.json(ctx, Call::get(format!("/servers/{}", id))).await?;
        Ok(translate::server_to_resource(&env.server))
    }
}

#[async_trait::async_trait]
impl Adapter for OpenStackAdapter {
    fn name(&self) -> &'static str { BACKEND }

    fn version(&self) -> &'static str { "v2.1" }

    fn capabilities(&self) -> &CapabilitySet { &self.caps }

    async fn health(&self, ctx: &Ctx) -> O2Result<()> {
        let ctx = ctx.with_timeout(self.cfg.common.health_timeout);
        run_op(&ctx, BACKEND, "health", "/flavors", async {
            let c = self.client().await?;
            c.exec(&ctx, Call::get("/flavors").query("limit", 1)).await
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
        o2bridge_core::ext_put(&mut ext, BACKEND, "microversion", self.cfg.microversion.as_str());
        if !self.cfg.region.is_empty() {
            o2bridge_core::ext_put(&mut ext, BACKEND, "region", self.cfg.region.as_str());
        }
        Ok(DeploymentManager {
            deployment_manager_id: self.cfg.common.deployment_manager_id.clone(),
            name: "OpenStack Nova".into(),
            description: "OpenStack compute service".into(),
            o_cloud_id: self.cfg.common.o_cloud_id.clone(),
            service_uri: self.cfg.client.endpoint.clone(),
            capabilities: self.caps.tags(),
            supported_locations: if self.cfg.region.is_empty() { Vec::new() } else { vec![self.cfg.region.clone()] },
            extensions: ext,
        })
    }

    async fn list_resource_pools(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<ResourcePool>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let list: AzList = run_op(&ctx, BACKEND, "list_resource_pools", "", async {
            let c = self.client().await?;
            c.json(&ctx, Call::get("/os-availability-zone/detail")).await
        })
        .await?;
        let items = list
            .availability_zone_info
            .iter()
            // the internal zone only carries control-plane services
            .filter(|z| z.zone_name != "internal")
            .map(|z| translate::zone_to_pool(z, &self.cfg.region, &self.cfg.common.o_cloud_id))
            .collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_resource_pool(&self, ctx: &Ctx, id: &str) -> O2Result<ResourcePool> {
        require_segment("resource pool", id).op("get_resource_pool", id)?;
        let pools = self.list_resource_pools(ctx, &Filter::new()).await.op("get_resource_pool", id)?;
        pools
            .into_iter()
            .find(|p| p.resource_pool_id == id)
            .ok_or_else(|| O2Error::NotFound(format!("availability zone {}", translate::zone_of(id))).context("get_resource_pool", id))
    }

    async fn list_resources(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<Resource>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let call = Call::get("/servers/detail")
            .query_opt("flavor", filter.single_type().map(translate::flavor_of))
            .query_opt("availability_zone", filter.single_pool().map(translate::zone_of));
        let list: ServerList = run_op(&ctx, BACKEND, "list_resources", "", async {
            let c = self.client().await?;
            c.json(&ctx, call).await
        })
        .await?;
        let items = list.servers.iter().map(translate::server_to_resource).collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_resource(&self, ctx: &Ctx, id: &str) -> O2Result<Resource> {
        require_segment("resource", id).op("get_resource", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "get_resource", id, self.fetch_server(&ctx, id)).await
    }

    /// Boot a server, then read it back for the full representation.
    async fn create_resource(&self, ctx: &Ctx, resource: Resource) -> O2Result<Resource> {
        let body = translate::server_create(&resource).map_err(|e| e.context("create_resource", &resource.description))?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let name = body.name.clone();
        let r = run_op(&ctx, BACKEND, "create_resource", &name, async {
            let c = self.client().await?;
            let created: CreatedServer = c.json(&ctx, Call::post("/servers").json(&ServerCreateEnvelope { server: body })?).await?;
            self.fetch_server(&ctx, &created.server.id).await
        })
        .await?;
        info!(server = %r.resource_id, name = %name, "server boot requested");
        Ok(r)
    }

    async fn delete_resource(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        require_segment("resource", id).op("delete_resource", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "delete_resource", id, async {
            let c = self.client().await?;
            c.exec(&ctx, Call::delete(format!("/servers/{}", id))).await
        })
        .await?;
        info!(server = %id, "server deleted");
        Ok(())
    }

    async fn list_resource_types(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<ResourceType>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let list: FlavorList = run_op(&ctx, BACKEND, "list_resource_types", "", async {
            let c = self.client().await?;
            c.json(&ctx, Call::get("/flavors/detail")).await
        })
        .await?;
        let items = list.flavors.iter().map(translate::flavor_to_type).collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_resource_type(&self, ctx: &Ctx, id: &str) -> O2Result<ResourceType> {
        require_segment("resource type", id).op("get_resource_type", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let env: FlavorEnvelope = run_op(&ctx, BACKEND, "get_resource_type", id, async {
            let c = self.client().await?;
            c.json(&ctx, Call::get(format!("/flavors/{}", translate::flavor_of(id)))).await
        })
        .await?;
        Ok(translate::flavor_to_type(&env.flavor))
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
