//! ringkv gateway binary: single client entry point for the cluster.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ringkv_gateway::anti_entropy::spawn_anti_entropy;
use ringkv_gateway::monitor::spawn_health_monitor;
use ringkv_gateway::{serve, ClusterManager, GatewayConfig, GatewayState};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ringkv-gateway", about = "Routing gateway for a ringkv cluster")]
struct Args {
    /// Listen port
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Cluster node as an id=url pair; repeat per node
    /// (e.g. --node 1=http://localhost:8001 --node 2=http://localhost:8002)
    #[arg(long = "node", required = true)]
    nodes: Vec<String>,

    /// Seconds between heartbeat sweeps
    #[arg(long, default_value_t = 5)]
    heartbeat_secs: u64,

    /// Skip registering peers with each other on startup
    #[arg(long)]
    skip_bootstrap: bool,
}

fn parse_nodes(specs: &[String]) -> Result<BTreeMap<u32, String>> {
    let mut nodes = BTreeMap::new();
    for spec in specs {
        let Some((id, url)) = spec.split_once('=') else {
            bail!("node spec '{spec}' is not id=url");
        };
        let id: u32 = id
            .parse()
            .with_context(|| format!("node id in '{spec}' is not an integer"))?;
        nodes.insert(id, url.trim_end_matches('/').to_string());
    }
    Ok(nodes)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let nodes = parse_nodes(&args.nodes)?;
    info!(cluster_size = nodes.len(), port = args.port, "starting gateway");

    if !args.skip_bootstrap {
        let manager = ClusterManager::new(nodes.clone());
        let failures = manager.register_peers().await;
        if failures > 0 {
            warn!(failures, "some peer registrations failed; anti-entropy will retry state");
        }
        if !manager.verify_cluster().await {
            warn!("cluster verification incomplete; health monitor will track recovery");
        }
    }

    let mut config = GatewayConfig::new(nodes);
    config.heartbeat_interval = Duration::from_secs(args.heartbeat_secs);
    let state = GatewayState::new(config);

    let monitor = spawn_health_monitor(state.clone());
    let anti_entropy = spawn_anti_entropy(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let served = tokio::select! {
        result = serve(state, addr) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    monitor.abort();
    anti_entropy.abort();
    served?;
    Ok(())
}
