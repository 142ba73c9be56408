//! Chart repository `index.yaml`, cached for a TTL.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use o2bridge_client::{BackendClient, Call};
use o2bridge_core::{ext_put, Ctx, DeploymentPackage, Extensions, O2Error, O2Result, PackageUpload};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

pub const PACKAGE_TYPE: &str = "helm-chart";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ChartVersion {
    /// `<name>-<version>`, the same form `helm list` prints in its chart column.
    pub fn package_id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn to_package(&self) -> DeploymentPackage {
        let mut ext = Extensions::new();
        ext_put(&mut ext, crate::BACKEND, "appVersion", self.app_version.as_str());
        ext_put(&mut ext, crate::BACKEND, "digest", self.digest.as_str());
        ext_put(&mut ext, crate::BACKEND, "urls", self.urls.clone());
        if self.deprecated {
            ext_put(&mut ext, crate::BACKEND, "deprecated", true);
        }
        if !self.keywords.is_empty() {
            ext_put(&mut ext, crate::BACKEND, "keywords", self.keywords.clone());
        }
        DeploymentPackage {
            package_id: self.package_id(),
            name: self.name.clone(),
            version: self.version.clone(),
            package_type: PACKAGE_TYPE.into(),
            description: self.description.clone(),
            uploaded_at: self.created,
            extensions: ext,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartIndex {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartVersion>>,
}

impl ChartIndex {
    pub fn parse(bytes: &[u8]) -> O2Result<Self> {
        serde_yaml::from_slice(bytes).map_err(|e| O2Error::Internal(format!("index.yaml: {}", e)))
    }

    /// Every version of every chart, name order then index order.
    pub fn versions(&self) -> impl Iterator<Item = &ChartVersion> {
        self.entries.values().flatten()
    }

    pub fn find(&self, package_id: &str) -> Option<&ChartVersion> {
        self.versions().find(|v| v.package_id() == package_id)
    }

    /// First listed version of `name`; repositories list newest first.
    pub fn latest(&self, name: &str) -> Option<&ChartVersion> {
        self.entries.get(name).and_then(|v| v.first())
    }
}

struct Cached {
    fetched: Instant,
    index: Arc<ChartIndex>,
}

/// Concurrent refreshes may race; the last one to finish wins.
pub struct IndexCache {
    client: BackendClient,
    ttl: Duration,
    cached: ArcSwapOption<Cached>,
}

impl IndexCache {
    pub fn new(client: BackendClient, ttl: Duration) -> Self {
        Self { client, ttl, cached: ArcSwapOption::empty() }
    }

    pub fn endpoint(&self) -> &str { self.client.endpoint() }

    pub async fn get(&self, ctx: &Ctx) -> O2Result<Arc<ChartIndex>> {
        if let Some(c) = self.cached.load_full() {
            if c.fetched.elapsed() < self.ttl {
                return Ok(c.index.clone());
            }
        }
        self.refresh(ctx).await
    }

    pub async fn refresh(&self, ctx: &Ctx) -> O2Result<Arc<ChartIndex>> {
        let body = self.client.send(ctx, Call::get("/index.yaml")).await?;
        let index = Arc::new(ChartIndex::parse(&body)?);
        debug!(charts = index.entries.len(), "chart index refreshed");
        self.cached.store(Some(Arc::new(Cached { fetched: Instant::now(), index: index.clone() })));
        Ok(index)
    }

    pub fn invalidate(&self) {
        self.cached.store(None);
    }

    /// ChartMuseum upload; the index is refetched on next use.
    pub async fn upload(&self, ctx: &Ctx, pkg: &PackageUpload) -> O2Result<()> {
        self.client.exec(ctx, Call::post("/api/charts").raw("application/octet-stream", pkg.content.clone())).await?;
        self.invalidate();
        Ok(())
    }

    pub async fn remove(&self, ctx: &Ctx, name: &str, version: &str) -> O2Result<()> {
        self.client.exec(ctx, Call::delete(format!("/api/charts/{}/{}", name, version))).await?;
        self.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
apiVersion: v1
entries:
  nginx:
    - name: nginx
      version: 15.1.0
      appVersion: 1.25.1
      description: NGINX web server
      created: "2024-05-02T10:00:00Z"
      urls: [charts/nginx-15.1.0.tgz]
      digest: abc
    - name: nginx
      version: 15.0.0-rc.1
      appVersion: 1.25.0
      deprecated: true
  redis:
    - name: redis
      version: 18.0.0
generated: "2024-05-02T10:00:00Z"
"#;

    #[test]
    fn parses_entries_and_finds_hyphenated_versions() {
        let idx = ChartIndex::parse(INDEX.as_bytes()).expect("parse");
        assert_eq!(idx.versions().count(), 3);
        assert_eq!(idx.latest("nginx").map(|v| v.version.as_str()), Some("15.1.0"));
        let rc = idx.find("nginx-15.0.0-rc.1").expect("rc");
        assert!(rc.deprecated);
        assert!(idx.find("nginx-14").is_none());
    }

    #[test]
    fn package_projection() {
        let idx = ChartIndex::parse(INDEX.as_bytes()).expect("parse");
        let p = idx.find("nginx-15.1.0").expect("chart").to_package();
        assert_eq!(p.package_type, PACKAGE_TYPE);
        assert_eq!(p.name, "nginx");
        assert_eq!(p.extensions.get("helm.appVersion").and_then(|v| v.as_str()), Some("1.25.1"));
        assert!(p.uploaded_at.is_some());
        assert!(!p.extensions.contains_key("helm.deprecated"));
    }

    #[test]
    fn garbage_index_is_internal() {
        let err = ChartIndex::parse(b"entries: [").expect_err("bad yaml");
        assert_eq!(err.kind(), o2bridge_core::ErrorKind::Internal);
    }
}
