//! BINVOTE Node Binary

use binvote_core::{NodeConfig, ProcessId, Value};
use binvote_node::{cycle_values, LocalCluster, NodeBuilder};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "binvote-node")]
#[command(about = "BINVOTE Node - binary majority consensus process")]
#[command(version)]
struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single process
    Run {
        /// Process id in [0, N)
        #[arg(long)]
        id: usize,

        /// Number of processes (N)
        #[arg(short, long)]
        nodes: Option<usize>,

        /// Number of faults to tolerate (F)
        #[arg(short, long)]
        faults: Option<usize>,

        /// Initial value: 0, 1 or ?
        #[arg(long, default_value = "?")]
        value: Value,

        /// Run as a faulty (silent) process
        #[arg(long)]
        faulty: bool,

        /// Host all processes listen on
        #[arg(long)]
        host: Option<String>,

        /// Process i listens on base_port + i
        #[arg(long)]
        base_port: Option<u16>,

        /// Start consensus once every peer is reachable
        #[arg(long)]
        auto_start: bool,
    },

    /// Launch a whole cluster in this process and run it to completion
    Cluster {
        /// Number of processes (N)
        #[arg(short, long)]
        nodes: Option<usize>,

        /// Number of faults to tolerate (F)
        #[arg(short, long)]
        faults: Option<usize>,

        /// Initial values, repeated to cover every process
        #[arg(long, value_delimiter = ',', default_value = "1")]
        values: Vec<Value>,

        /// Ids of faulty processes
        #[arg(long, value_delimiter = ',')]
        faulty: Vec<usize>,

        /// Process i listens on base_port + i, 0 picks free ports
        #[arg(long)]
        base_port: Option<u16>,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "60")]
        timeout_secs: u64,

        /// Keep serving after consensus finished, until Ctrl-C
        #[arg(long)]
        serve: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<NodeConfig> {
    match path {
        Some(path) => Ok(NodeConfig::from_json_file(path)?),
        None => Ok(NodeConfig::default()),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    init_logging(&config.log_level);

    match cli.command {
        Commands::Run {
            id,
            nodes,
            faults,
            value,
            faulty,
            host,
            base_port,
            auto_start,
        } => {
            if let Some(nodes) = nodes {
                config.consensus.node_count = nodes;
            }
            if let Some(faults) = faults {
                config.consensus.fault_tolerance = faults;
            }
            if let Some(host) = host {
                config.network.host = host;
            }
            if let Some(port) = base_port {
                config.network.base_port = port;
            }

            info!("Starting BINVOTE process {}...", id);

            let node = NodeBuilder::new()
                .config(config)
                .id(id)
                .initial_value(value)
                .faulty(faulty)
                .build()?;

            node.run(auto_start).await?;
        }

        Commands::Cluster {
            nodes,
            faults,
            values,
            faulty,
            base_port,
            timeout_secs,
            serve,
        } => {
            if let Some(nodes) = nodes {
                config.consensus.node_count = nodes;
            }
            if let Some(faults) = faults {
                config.consensus.fault_tolerance = faults;
            }
            if let Some(port) = base_port {
                config.network.base_port = port;
            }

            let node_count = config.consensus.node_count;
            let initial_values = cycle_values(&values, node_count)?;
            let faulty: Vec<ProcessId> = faulty.into_iter().map(ProcessId::new).collect();

            let cluster = LocalCluster::launch(&config, &initial_values, &faulty).await?;
            for (id, addr) in cluster.addrs().iter().enumerate() {
                info!("Process {} at http://{}", id, addr);
            }

            cluster.start_all().await?;
            let states = cluster
                .wait_for_outcome(Duration::from_secs(timeout_secs))
                .await?;

            for (engine, state) in cluster.engines().iter().zip(&states) {
                let line = serde_json::json!({
                    "id": engine.id(),
                    "status": engine.status().to_string(),
                    "state": state,
                });
                println!("{}", line);
            }

            match cluster.agreed_value() {
                Some(value) => println!("Agreement on {}", value),
                None => println!("No agreement"),
            }

            if serve {
                info!("Serving until Ctrl-C");
                signal::ctrl_c().await?;
            }

            cluster.shutdown();
        }
    }

    Ok(())
}
