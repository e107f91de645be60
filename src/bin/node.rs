//! ringkv node server binary.

use anyhow::Result;
use clap::Parser;
use ringkv_engine::{PoolConfig, Store, StoreConfig, WorkerPool};
use ringkv_node::{serve, NodeConfig, NodeState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ringkv-node", about = "One node of a ringkv cluster")]
struct Args {
    /// Node identifier (1, 2, 3, ...)
    #[arg(long)]
    node_id: u32,

    /// Listen port; defaults to 8000 + node id
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding this node's snapshot and WAL files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Worker threads driving the store
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let port = args.port.unwrap_or(8000 + args.node_id as u16);
    let snapshot_path = args.data_dir.join(format!("node_{}.db", args.node_id));
    let wal_path = args.data_dir.join(format!("node_{}.wal", args.node_id));
    info!(
        node_id = args.node_id,
        snapshot = %snapshot_path.display(),
        wal = %wal_path.display(),
        "starting node"
    );

    let store = Arc::new(Store::open(StoreConfig::durable(snapshot_path, wal_path))?);
    let pool = Arc::new(WorkerPool::start(
        store,
        PoolConfig {
            workers: args.workers,
            ..PoolConfig::default()
        },
    ));
    let state = NodeState::new(NodeConfig::new(args.node_id), Arc::clone(&pool));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let served = tokio::select! {
        result = serve(state, addr) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    pool.stop()?;
    served?;
    Ok(())
}
