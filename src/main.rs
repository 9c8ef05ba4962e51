use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use leader_elect::raft::Raft;
use leader_elect::{Cluster, ClusterConfig};

#[derive(Parser)]
#[command(name = "leader-elect")]
#[command(about = "Randomized-timeout leader election over UDP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Overrides for values in the cluster config file (or its defaults).
#[derive(Args, Debug, Default)]
struct ClusterArgs {
    /// JSON cluster config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of nodes in the cluster
    #[arg(short, long)]
    nodes: Option<u64>,

    /// Host every node binds on
    #[arg(long)]
    host: Option<std::net::IpAddr>,

    /// Node i listens on base_port + i
    #[arg(short, long)]
    base_port: Option<u16>,

    /// Leader heartbeat interval in milliseconds
    #[arg(long)]
    heartbeat_ms: Option<u64>,

    /// Lower bound of the election timeout in milliseconds
    #[arg(long)]
    election_min_ms: Option<u64>,

    /// Upper bound (exclusive) of the election timeout in milliseconds
    #[arg(long)]
    election_max_ms: Option<u64>,

    /// Poll loop tick in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,
}

impl ClusterArgs {
    fn load(&self) -> Result<ClusterConfig> {
        let mut config = match &self.config {
            Some(path) => ClusterConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ClusterConfig::default(),
        };

        if let Some(v) = self.nodes {
            config.node_count = v;
        }
        if let Some(v) = self.host {
            config.host = v;
        }
        if let Some(v) = self.base_port {
            config.base_port = v;
        }
        if let Some(v) = self.heartbeat_ms {
            config.heartbeat_interval_ms = v;
        }
        if let Some(v) = self.election_min_ms {
            config.election_timeout_min_ms = v;
        }
        if let Some(v) = self.election_max_ms {
            config.election_timeout_max_ms = v;
        }
        if let Some(v) = self.tick_ms {
            config.tick_interval_ms = v;
        }

        Ok(config)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run every node of the cluster in this process
    Cluster {
        #[command(flatten)]
        cluster: ClusterArgs,

        /// Seconds to run before stopping; 0 runs until Ctrl-C
        #[arg(short, long)]
        duration_secs: Option<u64>,
    },

    /// Run a single node; its peers run elsewhere on the same host
    Node {
        /// Id of this node, in 0..nodes
        #[arg(short, long)]
        id: u64,

        #[command(flatten)]
        cluster: ClusterArgs,
    },
}

async fn run_cluster(mut config: ClusterConfig, duration_secs: Option<u64>) -> Result<()> {
    if let Some(secs) = duration_secs {
        config.run_duration_secs = (secs > 0).then_some(secs);
    }
    config.validate()?;

    info!(
        "Starting {} nodes on {}:{}..",
        config.node_count, config.host, config.base_port
    );
    let cluster = Cluster::start(&config).await.context("starting cluster")?;

    let run = async {
        let mut last_leader = None;
        let started = tokio::time::Instant::now();
        loop {
            let leader = cluster.leader().map(|s| (s.id, s.term));
            if leader != last_leader {
                match leader {
                    Some((id, term)) => info!("Cluster leader: node {id} in term {term}"),
                    None => info!("Cluster has no leader"),
                }
                last_leader = leader;
            }
            if let Some(limit) = config.run_duration() {
                if started.elapsed() >= limit {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(config.tick_interval_ms)).await;
        }
    };

    tokio::select! {
        _ = run => info!("Run duration elapsed"),
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!("Ctrl-C handler failed: {e}");
            }
            info!("Interrupted");
        }
    }

    for status in cluster.statuses() {
        info!(
            "Node {}: {} in term {} (leader {:?})",
            status.id, status.role, status.term, status.leader_id
        );
    }
    cluster.shutdown().await?;
    Ok(())
}

async fn run_node(config: ClusterConfig, id: u64) -> Result<()> {
    config.validate()?;
    if id >= config.node_count {
        bail!("node id {id} is outside 0..{}", config.node_count);
    }

    let handle = Raft::start(config.raft_config(id))
        .await
        .with_context(|| format!("starting node {id}"))?;
    let mut status = handle.subscribe();

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let s = *status.borrow_and_update();
                info!("Node {}: {} in term {} (leader {:?})", s.id, s.role, s.term, s.leader_id);
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!("Ctrl-C handler failed: {e}");
                }
                break;
            }
        }
    }

    handle.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    leader_elect::logging::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Cluster {
            cluster,
            duration_secs,
        } => run_cluster(cluster.load()?, duration_secs).await,
        Command::Node { id, cluster } => run_node(cluster.load()?, id).await,
    }
}
