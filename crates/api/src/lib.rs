//! o2bridge adapter contract.
//!
//! Every backend (bare-metal, cloud compute, GitOps, composition, package release, NFV) implements
//! [`Adapter`]. Callers hold `Arc<dyn Adapter>` and never a concrete backend type. Operations a
//! backend cannot perform keep the default body, which returns `OperationNotSupported`; callers
//! consult [`Adapter::capabilities`] (or [`ensure_capability`]) before attempting gated operations.

#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::Arc;

use o2bridge_core::model::{DeploymentRequest, DeploymentUpdate, LogOptions, PackageUpload};
use o2bridge_core::prelude::*;
use o2bridge_core::PollingRecommendation;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

pub type AdapterRef = Arc<dyn Adapter>;

/// Static self-description, convenient for listing and CLI output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub supports_rollback: bool,
    pub supports_scaling: bool,
    pub supports_gitops: bool,
}

/// The uniform backend surface.
#[allow(unused_variables)]
#[async_trait::async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str;

    /// Fixed at construction; never changes afterwards.
    fn capabilities(&self) -> &CapabilitySet;

    fn supports_rollback(&self) -> bool { self.capabilities().contains(Capability::Rollback) }

    fn supports_scaling(&self) -> bool { self.capabilities().contains(Capability::Scaling) }

    fn supports_gitops(&self) -> bool { self.capabilities().contains(Capability::GitOps) }

    /// Advisory for backends that emulate change notification by polling.
    fn polling_recommendation(&self) -> Option<PollingRecommendation> { None }

    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            name: self.name().to_string(),
            version: self.version().to_string(),
            capabilities: self.capabilities().tags(),
            supports_rollback: self.supports_rollback(),
            supports_scaling: self.supports_scaling(),
            supports_gitops: self.supports_gitops(),
        }
    }

    /// Connectivity and credential probe, bounded by the health timeout.
    async fn health(&self, ctx: &Ctx) -> O2Result<()>;

    /// Drop connections and adapter-owned state. Idempotent.
    async fn close(&self) -> O2Result<()>;

    async fn get_deployment_manager(&self, ctx: &Ctx) -> O2Result<DeploymentManager>;

    // ---- O2-IMS inventory ----

    async fn list_resource_pools(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<ResourcePool>> {
        Err(O2Error::not_supported(self.name(), "list_resource_pools"))
    }
    async fn get_resource_pool(&self, ctx: &Ctx, id: &str) -> O2Result<ResourcePool> {
        Err(O2Error::not_supported(self.name(), "get_resource_pool"))
    }
    async fn create_resource_pool(&self, ctx: &Ctx, pool: ResourcePool) -> O2Result<ResourcePool> {
        Err(O2Error::not_supported(self.name(), "create_resource_pool"))
    }
    async fn update_resource_pool(&self, ctx: &Ctx, id: &str, pool: ResourcePool) -> O2Result<ResourcePool> {
        Err(O2Error::not_supported(self.name(), "update_resource_pool"))
    }
    async fn delete_resource_pool(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        Err(O2Error::not_supported(self.name(), "delete_resource_pool"))
    }

    async fn list_resources(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<Resource>> {
        Err(O2Error::not_supported(self.name(), "list_resources"))
    }
    async fn get_resource(&self, ctx: &Ctx, id: &str) -> O2Result<Resource> {
        Err(O2Error::not_supported(self.name(), "get_resource"))
    }
    async fn create_resource(&self, ctx: &Ctx, resource: Resource) -> O2Result<Resource> {
        Err(O2Error::not_supported(self.name(), "create_resource"))
    }
    async fn delete_resource(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        Err(O2Error::not_supported(self.name(), "delete_resource"))
    }

    async fn list_resource_types(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<ResourceType>> {
        Err(O2Error::not_supported(self.name(), "list_resource_types"))
    }
    async fn get_resource_type(&self, ctx: &Ctx, id: &str) -> O2Result<ResourceType> {
        Err(O2Error::not_supported(self.name(), "get_resource_type"))
    }

    // ---- subscriptions ----

    async fn create_subscription(&self, ctx: &Ctx, sub: Subscription) -> O2Result<Subscription> {
        Err(O2Error::not_supported(self.name(), "create_subscription"))
    }
    async fn get_subscription(&self, ctx: &Ctx, id: &str) -> O2Result<Subscription> {
        Err(O2Error::not_supported(self.name(), "get_subscription"))
    }
    async fn list_subscriptions(&self, ctx: &Ctx) -> O2Result<Vec<Subscription>> {
        Err(O2Error::not_supported(self.name(), "list_subscriptions"))
    }
    async fn delete_subscription(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        Err(O2Error::not_supported(self.name(), "delete_subscription"))
    }

    // ---- O2-DMS packages ----

    async fn list_deployment_packages(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<DeploymentPackage>> {
        Err(O2Error::not_supported(self.name(), "list_deployment_packages"))
    }
    async fn get_deployment_package(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentPackage> {
        Err(O2Error::not_supported(self.name(), "get_deployment_package"))
    }
    async fn upload_deployment_package(&self, ctx: &Ctx, pkg: PackageUpload) -> O2Result<DeploymentPackage> {
        Err(O2Error::not_supported(self.name(), "upload_deployment_package"))
    }
    async fn delete_deployment_package(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        Err(O2Error::not_supported(self.name(), "delete_deployment_package"))
    }

    // ---- O2-DMS deployments ----

    async fn list_deployments(&self, ctx: &Ctx, filter: &Filter) -> O2Result<Vec<Deployment>> {
        Err(O2Error::not_supported(self.name(), "list_deployments"))
    }
    async fn get_deployment(&self, ctx: &Ctx, id: &str) -> O2Result<Deployment> {
        Err(O2Error::not_supported(self.name(), "get_deployment"))
    }
    async fn create_deployment(&self, ctx: &Ctx, req: DeploymentRequest) -> O2Result<Deployment> {
        Err(O2Error::not_supported(self.name(), "create_deployment"))
    }
    async fn update_deployment(&self, ctx: &Ctx, id: &str, update: DeploymentUpdate) -> O2Result<Deployment> {
        Err(O2Error::not_supported(self.name(), "update_deployment"))
    }
    async fn delete_deployment(&self, ctx: &Ctx, id: &str) -> O2Result<()> {
        Err(O2Error::not_supported(self.name(), "delete_deployment"))
    }

    async fn scale_deployment(&self, ctx: &Ctx, id: &str, replicas: i32) -> O2Result<()> {
        Err(O2Error::not_supported(self.name(), "scale_deployment"))
    }
    /// `revision == 0` means "the revision before the current one".
    async fn rollback_deployment(&self, ctx: &Ctx, id: &str, revision: u64) -> O2Result<()> {
        Err(O2Error::not_supported(self.name(), "rollback_deployment"))
    }
    async fn get_deployment_status(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentStatusDetail> {
        Err(O2Error::not_supported(self.name(), "get_deployment_status"))
    }
    async fn get_deployment_history(&self, ctx: &Ctx, id: &str) -> O2Result<DeploymentHistory> {
        Err(O2Error::not_supported(self.name(), "get_deployment_history"))
    }
    async fn get_deployment_logs(&self, ctx: &Ctx, id: &str, opts: LogOptions) -> O2Result<String> {
        Err(O2Error::not_supported(self.name(), "get_deployment_logs"))
    }
}

/// Reject a gated operation up front when the adapter does not advertise `cap`.
pub fn ensure_capability(adapter: &dyn Adapter, cap: Capability) -> O2Result<()> {
    if adapter.capabilities().contains(cap) {
        Ok(())
    } else {
        Err(O2Error::NotSupported(format!("{} lacks capability {}", adapter.name(), cap)))
    }
}

/// Run one adapter operation: fail fast on an ended context, bound the future by the context,
/// wrap failures with `op`/`entity`, and log the outcome with elapsed time.
pub async fn run_op<T, F>(ctx: &Ctx, backend: &'static str, op: &'static str, entity: &str, fut: F) -> O2Result<T>
where
    F: Future<Output = O2Result<T>>,
{
    ctx.check(op).map_err(|e| e.context(op, entity))?;
    let t0 = Instant::now();
    match ctx.run(op, fut).await {
        Ok(v) => {
            info!(backend, op, entity = %entity, took_ms = t0.elapsed().as_millis() as u64, "{}: {} ok", backend, op);
            Ok(v)
        }
        Err(e) => {
            metrics::counter!("adapter_errors_total", 1, "backend" => backend, "op" => op);
            warn!(backend, op, entity = %entity, kind = ?e.kind(), error = %e, took_ms = t0.elapsed().as_millis() as u64, "{}: {} failed", backend, op);
            Err(e.context(op, entity))
        }
    }
}

/// Reject empty identifiers before any backend round-trip.
pub fn require_id(what: &str, id: &str) -> O2Result<()> {
    if id.trim().is_empty() {
        return Err(O2Error::InvalidArgument(format!("{} id is required", what)));
    }
    Ok(())
}

/// Like [`require_id`], for identifiers spliced into a REST path as one segment.
pub fn require_segment(what: &str, id: &str) -> O2Result<()> {
    require_id(what, id)?;
    let bad = id == "." || id == ".." || id.chars().any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_control());
    if bad {
        return Err(O2Error::InvalidArgument(format!("{} id {:?} is not a valid path segment", what, id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Tiny { caps: CapabilitySet }

    #[async_trait::async_trait]
    impl Adapter for Tiny {
        fn name(&self) -> &'static str { "tiny" }
        fn version(&self) -> &'static str { "0.0.1" }
        fn capabilities(&self) -> &CapabilitySet { &self.caps }
        async fn health(&self, _ctx: &Ctx) -> O2Result<()> { Ok(()) }
        async fn close(&self) -> O2Result<()> { Ok(()) }
        async fn get_deployment_manager(&self, _ctx: &Ctx) -> O2Result<DeploymentManager> {
            Ok(DeploymentManager { deployment_manager_id: "tiny-1".into(), name: "tiny".into(), ..Default::default() })
        }
    }

    fn tiny() -> Tiny { Tiny { caps: CapabilitySet::new([Capability::DeploymentManagers, Capability::Rollback]) } }

    #[tokio::test]
    async fn defaults_are_not_supported() {
        let a: AdapterRef = Arc::new(tiny());
        let ctx = Ctx::background();
        let err = a.list_resource_pools(&ctx, &Filter::new()).await.expect_err("default");
        assert_eq!(err.kind(), ErrorKind::OperationNotSupported);
        assert!(err.to_string().contains("tiny"));
        let err = a.scale_deployment(&ctx, "d", 2).await.expect_err("default");
        assert_eq!(err.kind(), ErrorKind::OperationNotSupported);
        assert!(a.polling_recommendation().is_none());
    }

    #[test]
    fn supports_follow_capabilities() {
        let a = tiny();
        assert!(a.supports_rollback());
        assert!(!a.supports_scaling());
        assert!(!a.supports_gitops());
        assert!(ensure_capability(&a, Capability::Rollback).is_ok());
        let err = ensure_capability(&a, Capability::Scaling).expect_err("gated");
        assert_eq!(err.kind(), ErrorKind::OperationNotSupported);
        let info = a.info();
        assert_eq!(info.capabilities.len(), 2);
    }

    #[tokio::test]
    async fn run_op_wraps_and_checks_context() {
        let ctx = Ctx::background();
        let err = run_op::<(), _>(&ctx, "tiny", "get_resource", "r-1", async { Err(O2Error::NotFound("server 1".into())) })
            .await
            .expect_err("wrapped");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().starts_with("get_resource r-1:"));

        let canceled = Ctx::background();
        canceled.cancel();
        let err = run_op(&canceled, "tiny", "get_resource", "r-1", async { Ok(1) }).await.expect_err("canceled");
        assert_eq!(err.kind(), ErrorKind::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn run_op_honors_deadline() {
        let ctx = Ctx::background().with_timeout(Duration::from_millis(50));
        let err = run_op(&ctx, "tiny", "health", "", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await
        .expect_err("deadline");
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    }

    #[test]
    fn require_id_rejects_blank() {
        assert!(require_id("pool", "p1").is_ok());
        assert_eq!(require_id("pool", " ").expect_err("blank").kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn path_segments_reject_traversal_and_delimiters() {
        for ok in ["p1", "4f1c-9a2e", "zone:nova", "a.b"] {
            assert!(require_segment("pool", ok).is_ok(), "{}", ok);
        }
        for bad in ["", "..", ".", "../servers/x", "p1?force=true", "p1#frag", "p%2Fx", "a\\b", "p\n1"] {
            assert_eq!(require_segment("pool", bad).expect_err(bad).kind(), ErrorKind::InvalidArgument, "{:?}", bad);
        }
    }
}
