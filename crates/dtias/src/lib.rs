//! o2bridge DTIAS backend: bare-metal resource pools, servers and server types.
//!
//! DTIAS has no change notification; subscription calls are rejected and a polling
//! recommendation is published instead.

#![forbid(unsafe_code)]

mod config;
pub mod native;
pub mod translate;

pub use config::DtiasConfig;

use std::sync::Arc;
use std::time::Duration;

use o2bridge_api::{require_segment, run_op, Adapter};
use o2bridge_client::{BackendClient, Call};
use o2bridge_core::polling::{PollingGuidance, PollingRecommendation};
use o2bridge_core::prelude::*;
use o2bridge_store::LazyInit;
use tracing::info;

use native::{NativePool, NativeServer, NativeServerType, PoolList, ServerList, ServerTypeList};

pub const BACKEND: &str = "dtias";

const POOLS: &str = "/v2/inventory/resourcepools";
const SERVERS: &str = "/v2/inventory/servers";
const SERVER_TYPES: &str = "/v2/inventory/servertypes";
const HEALTH: &str = "/v2/health";

pub struct DtiasAdapter {
    cfg: DtiasConfig,
    caps: CapabilitySet,
    client: LazyInit<Arc<BackendClient>>,
}

impl DtiasAdapter {
    pub fn new(cfg: DtiasConfig) -> O2Result<Self> {
        let cfg = cfg.normalized();
        if cfg.client.endpoint.is_empty() {
            return Err(O2Error::InvalidArgument("dtias: endpoint is required".into()));
        }
        let caps = CapabilitySet::new([
            Capability::ResourcePools,
            Capability::Resources,
            Capability::ResourceTypes,
            Capability::DeploymentManagers,
            Capability::HealthChecks,
        ]);
        Ok(Self { cfg, caps, client: LazyInit::new("dtias-client") })
    }

    async fn client(&self) -> O2Result<Arc<BackendClient>> {
        let cfg = self.cfg.client.clone();
        self.client.get_or_try_init(|| async move { BackendClient::new(BACKEND, cfg).map(Arc::new) }).await
    }

    fn subscriptions_unsupported(&self, op: &str) -> O2Error {
        O2Error::NotSupported(format!("dtias does not support {}; poll as described by polling_recommendation()", op))
    }

    fn pool_path(id: &str) -> String { format!("{}/{}", POOLS, id) }
    fn server_path(id: &str) -> String { format!("{}/{}", SERVERS, id) }
}

fn guidance(category: &str, secs: u64, fields: &[&str], tips: &[&str]) -> PollingGuidance {
    PollingGuidance {
        category: category.to_string(),
        interval: Duration::from_secs(secs),
        diff_fields: fields.iter().map(|s| s.to_string()).collect(),
        tips: tips.iter().map(|s| s.to_string()).collect(),
    }
}

#[async_trait::async_trait]
impl Adapter for DtiasAdapter {
    fn name(&self) -> &'static str { BACKEND }

    fn version(&self) -> &'static str { "v2" }

    fn capabilities(&self) -> &CapabilitySet { &self.caps }

    fn polling_recommendation(&self) -> Option<PollingRecommendation> {
        Some(PollingRecommendation {
            backend: BACKEND.to_string(),
            guidance: vec![
                guidance("resourcePools", 60, &["status", "serverCount", "location"], &["list pools once, then get by id for pools of interest"]),
                guidance("resources", 30, &["powerState", "healthState", "provisioningState", "resourcePoolId"], &["filter by resourcePoolId server-side to shrink pages"]),
                guidance("resourceTypes", 300, &["memoryGB", "storageGB", "networkPorts"], &["server types change rarely; cache between polls"]),
            ],
            tips: vec![
                "send If-None-Match with the last ETag where the endpoint returns one".into(),
                "back off exponentially on 429 and 5xx".into(),
                "compare only the listed diff fields to detect change".into(),
            ],
        })
    }

    async fn health(&self, ctx: &Ctx) -> O2Result<()> {
        let ctx = ctx.with_timeout(self.cfg.common.health_timeout);
        run_op(&ctx, BACKEND, "health", HEALTH, async {
            let c = self.client().await?;
            c.exec(&ctx, Call::get(HEALTH)).await
        })
        .await
    }

    async fn close(&self) -> O2Result<()> {
        self.client.reset().await;
        Ok(())
    }

    async fn get_deployment_manager(&self, _ctx: &Ctx) -> O2Result<DeploymentManager> {
        let mut ext = Extensions::new();
        o2bridge_core::ext_put(&mut ext, BACKEND, "apiVersion", "v2");
        Ok(DeploymentManager {
            deployment_manager_id: self.cfg.common.deployment_manager_id.clone(),
            name: "DTIAS bare-metal".into(),
            description: "Dell Telecom Infrastructure Automation Suite inventory".into(),
            o_cloud_id: self.cfg.common.o_cloud_id.clone(),
            service_uri: self.cfg.client.endpoint.clone(),
            capabilities: self.caps.tags(),
            supported_locations: Vec::new(),
            extensions: ext,
        })
    }

    async fn list_resource_pools(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<ResourcePool>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let list: PoolList = run_op(&ctx, BACKEND, "list_resource_pools", "", async {
            let c = self.client().await?;
            c.json(&ctx, Call::get(POOLS).query_opt("location", filter.location.as_deref())).await
        })
        .await?;
        let items = list.resource_pools.iter().map(|p| translate::pool_to_canonical(p, &self.cfg.common.o_cloud_id)).collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_resource_pool(&self, ctx: &Ctx, id: &str) -> O2Result<ResourcePool> {
        require_segment("resource pool", id).op("get_resource_pool", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let p: NativePool = run_op(&ctx, BACKEND, "get_resource_pool", id, async {
            let c = self.client().await?;
            c.json(&ctx, Call::get(Self::pool_path(id))).await
        })
        .await?;
        Ok(translate::pool_to_canonical(&p, &self.cfg.common.o_cloud_id))
    }

    async fn create_resource_pool(&self, ctx: &Ctx, pool: ResourcePool) -> O2Result<ResourcePool> {
        if pool.name.trim().is_empty() {
            return Err(O2Error::InvalidArgument("resource pool name is required".into()).context("create_resource_pool", &pool.resource_pool_id));
        }
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let body = translate::pool_from_canonical(&pool);
        let created: NativePool = run_op(&ctx, BACKEND, "create_resource_pool", &pool.name, async {
            let c = self.client().await?;
            c.json(&ctx, Call::post(POOLS).json(&body)?).await.map_err(|e| match e.kind() {
                ErrorKind::Conflict => O2Error::AlreadyExists(format!("resource pool {}", body.name)),
                _ => e,
            })
        })
        .await?;
        info!(pool = %created.id, name = %created.name, "resource pool created");
        Ok(translate::pool_to_canonical(&created, &self.cfg.common.o_cloud_id))
    }

    async fn update_resource_pool(&self, ctx: &Ctx, id: &str, pool: ResourcePool) -> O2Result<ResourcePool> {
        require_segment("resource pool", id).op("update_resource_pool", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let mut body = translate::pool_from_canonical(&pool);
        body.id = id.to_string();
        let updated: NativePool = run_op(&ctx, BACKEND, "update_resource_pool", id, async {
            let c = self.client().await?;
            c.json(&ctx, Call::put(Self::pool_path(id)).json(&body)?).await
        })
        .await?;
        Ok(translate::pool_to_canonical(&updated, &self.cfg.common.o_cloud_id))
    }

    async fn delete_resource_pool(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        require_segment("resource pool", id).op("delete_resource_pool", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "delete_resource_pool", id, async {
            let c = self.client().await?;
            c.exec(&ctx, Call::delete(Self::pool_path(id))).await
        })
        .await?;
        info!(pool = %id, "resource pool deleted");
        Ok(())
    }

    async fn list_resources(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<Resource>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let call = Call::get(SERVERS)
            .query_opt("resourcePoolId", filter.single_pool())
            .query_opt("serverTypeId", filter.single_type().map(translate::native_type_id));
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
        let s: NativeServer = run_op(&ctx, BACKEND, "get_resource", id, async {
            let c = self.client().await?;
            c.json(&ctx, Call::get(Self::server_path(id))).await
        })
        .await?;
        Ok(translate::server_to_resource(&s))
    }

    /// Provision a discovered server into a pool.
    async fn create_resource(&self, ctx: &Ctx, resource: Resource) -> O2Result<Resource> {
        let id = resource.resource_id.clone();
        require_segment("resource", &id).op("create_resource", &id)?;
        if resource.resource_pool_id.is_empty() {
            return Err(O2Error::InvalidArgument("resourcePoolId is required to provision a server".into()).context("create_resource", &id));
        }
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let body = translate::provision_request(&resource);
        let s: NativeServer = run_op(&ctx, BACKEND, "create_resource", &id, async {
            let c = self.client().await?;
            c.json(&ctx, Call::post(format!("{}/provision", Self::server_path(&id))).json(&body)?).await
        })
        .await?;
        info!(server = %id, pool = %resource.resource_pool_id, "server provisioning requested");
        Ok(translate::server_to_resource(&s))
    }

    /// Decommission a server.
    async fn delete_resource(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        require_segment("resource", id).op("delete_resource", id)?;
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        run_op(&ctx, BACKEND, "delete_resource", id, async {
            let c = self.client().await?;
            c.exec(&ctx, Call::delete(Self::server_path(id))).await
        })
        .await?;
        info!(server = %id, "server decommissioned");
        Ok(())
    }

    async fn list_resource_types(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<ResourceType>> {
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let list: ServerTypeList = run_op(&ctx, BACKEND, "list_resource_types", "", async {
            let c = self.client().await?;
            c.json(&ctx, Call::get(SERVER_TYPES)).await
        })
        .await?;
        let items = list.server_types.iter().map(translate::server_type_to_canonical).collect();
        Ok(o2bridge_filter::apply(items, filter))
    }

    async fn get_resource_type(&self, ctx: &Ctx, id: &str) -> O2Result<ResourceType> {
        require_segment("resource type", id).op("get_resource_type", id)?;
        let native = translate::native_type_id(id).to_string();
        let ctx = ctx.with_timeout(self.cfg.common.timeout);
        let t: NativeServerType = run_op(&ctx, BACKEND, "get_resource_type", id, async {
            let c = self.client().await?;
            c.json(&ctx, Call::get(format!("{}/{}", SERVER_TYPES, native))).await
        })
        .await?;
        Ok(translate::server_type_to_canonical(&t))
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
