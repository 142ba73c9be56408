use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use o2bridge_api::{Adapter, AdapterRef};
use o2bridge_core::model::LogOptions;
use o2bridge_core::prelude::*;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "o2ctl", version, about = "o2bridge diagnostic CLI")]
struct Cli {
    /// Backend adapter to build from O2B_<BACKEND>_* variables
    #[arg(short = 'b', long = "backend", env = "O2B_BACKEND", value_enum, global = true, default_value_t = Backend::Helm)]
    backend: Backend,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Overall deadline for the command, in seconds
    #[arg(long = "timeout", global = true, default_value_t = 60)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Backend { Dtias, Openstack, Argocd, Crossplane, Helm, Onap, Osm }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum StatusArg { Pending, Deploying, Deployed, Failed, RollingBack, Deleting }

impl From<StatusArg> for DeploymentStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Pending => DeploymentStatus::Pending,
            StatusArg::Deploying => DeploymentStatus::Deploying,
            StatusArg::Deployed => DeploymentStatus::Deployed,
            StatusArg::Failed => DeploymentStatus::Failed,
            StatusArg::RollingBack => DeploymentStatus::RollingBack,
            StatusArg::Deleting => DeploymentStatus::Deleting,
        }
    }
}

/// Filter flags shared by the list commands.
#[derive(clap::Args, Debug, Default)]
struct ListArgs {
    /// Location substring
    #[arg(long)]
    location: Option<String>,
    /// Label equality, repeatable: key=value
    #[arg(short = 'l', long = "label", value_parser = parse_kv)]
    labels: Vec<(String, String)>,
    /// Resource pool id, repeatable
    #[arg(long = "pool")]
    pools: Vec<String>,
    /// Resource type id, repeatable
    #[arg(long = "type")]
    types: Vec<String>,
    #[arg(long = "ns")]
    namespace: Option<String>,
    #[arg(long, value_enum)]
    status: Option<StatusArg>,
    /// Zero means unbounded
    #[arg(long, default_value_t = 0)]
    limit: usize,
    #[arg(long, default_value_t = 0)]
    offset: usize,
}

impl ListArgs {
    fn filter(&self) -> Filter {
        let mut f = Filter::new().page(self.limit, self.offset);
        if let Some(loc) = &self.location { f = f.location(loc); }
        if let Some(ns) = &self.namespace { f = f.namespace(ns); }
        if let Some(s) = self.status { f = f.status(s.into()); }
        for (k, v) in &self.labels { f = f.label(k, v); }
        for p in &self.pools { f = f.pool(p); }
        for t in &self.types { f = f.resource_type(t); }
        f
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Name, version and advertised capabilities
    Info,
    /// Probe backend reachability
    Health,
    /// The deployment manager this backend exposes
    Manager,
    /// Polling guidance for backends without change notification
    Polling,
    /// List resource pools
    Pools {
        #[command(flatten)]
        list: ListArgs,
    },
    /// List resources
    Resources {
        #[command(flatten)]
        list: ListArgs,
    },
    /// List resource types
    Types {
        #[command(flatten)]
        list: ListArgs,
    },
    /// List deployment packages
    Packages {
        #[command(flatten)]
        list: ListArgs,
    },
    /// List deployments
    Deployments {
        #[command(flatten)]
        list: ListArgs,
    },
    /// Show one deployment
    Get { id: String },
    /// Detailed deployment status with conditions
    Status { id: String },
    /// Revision history of a deployment
    History { id: String },
    /// Workload logs of a deployment
    Logs {
        id: String,
        #[arg(long)]
        tail: Option<i64>,
        #[arg(long)]
        since: Option<i64>,
        #[arg(short = 'c', long)]
        container: Option<String>,
    },
    /// List subscriptions held by the adapter
    Subscriptions,
}

fn parse_kv(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}

fn init_tracing() {
    let env = std::env::var("O2B_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("O2B_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid O2B_METRICS_ADDR; expected host:port");
        }
    }
}

fn build(backend: Backend) -> Result<AdapterRef> {
    let adapter: AdapterRef = match backend {
        Backend::Dtias => Arc::new(o2bridge_dtias::DtiasAdapter::new(o2bridge_dtias::DtiasConfig::from_env())?),
        Backend::Openstack => Arc::new(o2bridge_openstack::OpenStackAdapter::new(o2bridge_openstack::OpenStackConfig::from_env())?),
        Backend::Argocd => Arc::new(o2bridge_argocd::ArgoCdAdapter::new(o2bridge_argocd::ArgoCdConfig::from_env())),
        Backend::Crossplane => Arc::new(o2bridge_crossplane::CrossplaneAdapter::new(o2bridge_crossplane::CrossplaneConfig::from_env())),
        Backend::Helm => Arc::new(o2bridge_helm::HelmAdapter::new(o2bridge_helm::HelmConfig::from_env())?),
        Backend::Onap => Arc::new(o2bridge_onap::OnapAdapter::new(o2bridge_onap::OnapConfig::from_env())?),
        Backend::Osm => Arc::new(o2bridge_osm::OsmAdapter::new(o2bridge_osm::OsmConfig::from_env())?),
    };
    Ok(adapter)
}

/// JSON as-is, or one line per item through `line`.
fn emit<T: Serialize>(out: Output, items: &[T], header: &str, line: impl Fn(&T) -> String) -> Result<()> {
    match out {
        Output::Json => println!("{}", serde_json::to_string_pretty(items)?),
        Output::Human => {
            println!("{}", header);
            for it in items {
                println!("{}", line(it));
            }
        }
    }
    Ok(())
}

fn emit_one<T: Serialize>(out: Output, item: &T, human: impl FnOnce(&T)) -> Result<()> {
    match out {
        Output::Json => println!("{}", serde_json::to_string_pretty(item)?),
        Output::Human => human(item),
    }
    Ok(())
}

fn when(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let out = cli.output;

    let adapter = build(cli.backend).with_context(|| format!("building the {:?} adapter", cli.backend))?;
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; canceling in-flight calls");
                cancel.cancel();
            }
        }
    });
    let ctx = Ctx::with_token(cancel).with_timeout(Duration::from_secs(cli.timeout));
    let t0 = Instant::now();
    info!(backend = adapter.name(), command = ?cli.command, "o2ctl invoked");

    let result = run(&*adapter, &ctx, out, cli.command).await;
    if let Err(e) = adapter.close().await {
        warn!(error = %e, "close failed");
    }
    info!(took_ms = %t0.elapsed().as_millis(), ok = result.is_ok(), "o2ctl done");
    result
}

async fn run(a: &dyn Adapter, ctx: &Ctx, out: Output, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Info => emit_one(out, &a.info(), |i| {
            println!("{} {}", i.name, i.version);
            println!("capabilities: {}", i.capabilities.join(", "));
        })?,
        Commands::Health => {
            a.health(ctx).await?;
            emit_one(out, &serde_json::json!({"backend": a.name(), "healthy": true}), |_| println!("{}: healthy", a.name()))?;
        }
        Commands::Manager => {
            let dm = a.get_deployment_manager(ctx).await?;
            emit_one(out, &dm, |d| {
                println!("{} ({})", d.name, d.deployment_manager_id);
                println!("service: {}", d.service_uri);
                println!("capabilities: {}", d.capabilities.join(", "));
            })?;
        }
        Commands::Polling => match a.polling_recommendation() {
            Some(rec) => emit_one(out, &rec, |r| {
                for g in &r.guidance {
                    println!("{:<22} every {:>4}s  diff: {}", g.category, g.interval.as_secs(), g.diff_fields.join(", "));
                }
                for t in &r.tips {
                    println!("- {}", t);
                }
            })?,
            None => println!("{} supports subscriptions natively; no polling guidance", a.name()),
        },
        Commands::Pools { list } => {
            let pools = a.list_resource_pools(ctx, &list.filter()).await?;
            emit(out, &pools, "ID                                   NAME                 LOCATION", |p| {
                format!("{:<36} {:<20} {}", p.resource_pool_id, p.name, p.location)
            })?;
        }
        Commands::Resources { list } => {
            let res = a.list_resources(ctx, &list.filter()).await?;
            emit(out, &res, "ID                                   TYPE                 POOL", |r| {
                format!("{:<36} {:<20} {}", r.resource_id, r.resource_type_id, r.resource_pool_id)
            })?;
        }
        Commands::Types { list } => {
            let types = a.list_resource_types(ctx, &list.filter()).await?;
            emit(out, &types, "ID                                   NAME                 VENDOR/MODEL", |t| {
                format!("{:<36} {:<20} {}/{}", t.resource_type_id, t.name, t.vendor, t.model)
            })?;
        }
        Commands::Packages { list } => {
            let pkgs = a.list_deployment_packages(ctx, &list.filter()).await?;
            emit(out, &pkgs, "ID                                   NAME                 VERSION    TYPE", |p| {
                format!("{:<36} {:<20} {:<10} {}", p.package_id, p.name, p.version, p.package_type)
            })?;
        }
        Commands::Deployments { list } => {
            let deps = a.list_deployments(ctx, &list.filter()).await?;
            emit(out, &deps, "ID                                   NAME                 STATUS      PACKAGE", |d| {
                format!("{:<36} {:<20} {:<11} {}", d.deployment_id, d.name, d.status, d.package_id)
            })?;
        }
        Commands::Get { id } => {
            let d = a.get_deployment(ctx, &id).await?;
            emit_one(out, &d, |d| {
                println!("{} ({})", d.name, d.deployment_id);
                println!("status: {}  package: {}  namespace: {}", d.status, d.package_id, d.namespace);
                for (k, v) in &d.extensions {
                    println!("  {} = {}", k, v);
                }
            })?;
        }
        Commands::Status { id } => {
            let st = a.get_deployment_status(ctx, &id).await?;
            emit_one(out, &st, |s| {
                println!("{}: {} ({}%) {}", s.deployment_id, s.status, s.progress, s.message);
                for c in s.conditions.iter() {
                    println!("  {:<14} {:?} {} {}", c.kind, c.status, c.reason, c.message);
                }
            })?;
        }
        Commands::History { id } => {
            let h = a.get_deployment_history(ctx, &id).await?;
            emit(out, &h.revisions, "REV   VERSION              STATUS      DEPLOYED", |r| {
                format!("{:<5} {:<20} {:<11} {}", r.revision, r.version, r.status, when(r.deployed_at))
            })?;
        }
        Commands::Logs { id, tail, since, container } => {
            let opts = LogOptions { tail_lines: tail, since_seconds: since, container };
            let logs = a.get_deployment_logs(ctx, &id, opts).await?;
            print!("{}", logs);
        }
        Commands::Subscriptions => {
            let subs = a.list_subscriptions(ctx).await?;
            emit(out, &subs, "ID                                   CALLBACK", |s| format!("{:<36} {}", s.subscription_id, s.callback))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_flags_build_a_filter() {
        let cli = Cli::try_parse_from([
            "o2ctl", "-b", "dtias", "pools", "--location", "Dallas", "-l", "tier=edge", "--pool", "p1", "--limit", "5",
        ])
        .expect("parse");
        assert_eq!(cli.backend, Backend::Dtias);
        let Commands::Pools { list } = cli.command else { panic!("expected pools") };
        let f = list.filter();
        assert_eq!(f.location.as_deref(), Some("Dallas"));
        assert_eq!(f.labels.get("tier").map(String::as_str), Some("edge"));
        assert_eq!(f.single_pool(), Some("p1"));
        assert_eq!((f.limit, f.offset), (5, 0));
    }

    #[test]
    fn status_flag_maps_to_canonical_status() {
        let cli = Cli::try_parse_from(["o2ctl", "deployments", "--status", "rolling-back"]).expect("parse");
        let Commands::Deployments { list } = cli.command else { panic!("expected deployments") };
        assert_eq!(list.filter().status, Some(DeploymentStatus::RollingBack));
    }

    #[test]
    fn labels_need_key_value() {
        assert!(parse_kv("a=b").is_ok());
        assert!(parse_kv("a=").is_ok());
        assert!(parse_kv("=b").is_err());
        assert!(parse_kv("ab").is_err());
    }
}
