//! BINVOTE CLI - operator tool for a running cluster

use binvote_cli::{format_state, is_settled, parse_raw_value, ApiError, ClusterClient};
use binvote_core::{ProcessId, ProcessStatus};
use binvote_p2p::PeerDirectory;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fmt::Display;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "binvote")]
#[command(about = "BINVOTE - inspect and drive a consensus cluster")]
#[command(version)]
struct Cli {
    /// Host every process listens on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Process i listens on base_port + i
    #[arg(short, long, default_value = "3000")]
    base_port: u16,

    /// Number of processes (N)
    #[arg(short, long, default_value = "4")]
    nodes: usize,

    /// Request timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether processes are live or faulty
    Status {
        /// Process id, every process when omitted
        id: Option<usize>,
    },

    /// Show process state
    State {
        /// Process id, every process when omitted
        id: Option<usize>,
    },

    /// Start consensus
    Start {
        /// Process id, every process when omitted
        id: Option<usize>,
    },

    /// Stop (kill) processes
    Stop {
        /// Process id, every process when omitted
        id: Option<usize>,
    },

    /// Deliver a vote by hand
    Send {
        /// Receiving process
        #[arg(long)]
        to: usize,

        /// Claimed sender
        #[arg(long)]
        from: usize,

        /// Vote value, e.g. 0, 1 or "?"
        #[arg(long)]
        value: String,
    },

    /// Poll states until every live process decided or was killed
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value = "500")]
        interval_ms: u64,

        /// Give up after this many polls
        #[arg(long, default_value = "240")]
        max_polls: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directory = PeerDirectory::with_base_port(&cli.host, cli.base_port, cli.nodes)?;
    let cluster = ClusterClient::new(&directory, Duration::from_millis(cli.timeout_ms))?;

    match cli.command {
        Commands::Status { id } => {
            let results = match id {
                Some(id) => vec![client(&cluster, id)?.status().await],
                None => cluster.statuses().await,
            };
            for (id, result) in targets(&cluster, id).zip(results) {
                match result {
                    Ok(ProcessStatus::Live) => println!("{:>4}  {}", id, "live".green()),
                    Ok(ProcessStatus::Faulty) => println!("{:>4}  {}", id, "faulty".red()),
                    Err(e) => println!("{:>4}  {} ({})", id, "unreachable".yellow(), e),
                }
            }
        }

        Commands::State { id } => {
            let states = match id {
                Some(id) => vec![client(&cluster, id)?.state_or_unknown().await],
                None => cluster.states().await,
            };
            for (id, state) in targets(&cluster, id).zip(&states) {
                println!("{}", format_state(id, state));
            }
        }

        Commands::Start { id } => {
            println!("Waiting for the cluster to come up...");
            let results = match id {
                Some(id) => vec![client(&cluster, id)?.start().await],
                None => cluster.start_all().await,
            };
            report(targets(&cluster, id).zip(results));
        }

        Commands::Stop { id } => {
            let results = match id {
                Some(id) => vec![client(&cluster, id)?.stop().await],
                None => cluster.stop_all().await,
            };
            report(targets(&cluster, id).zip(results));
        }

        Commands::Send { to, from, value } => {
            let result = client(&cluster, to)?
                .send_message(ProcessId::new(from), parse_raw_value(&value))
                .await;
            report(std::iter::once((ProcessId::new(to), result)));
        }

        Commands::Watch {
            interval_ms,
            max_polls,
        } => {
            let interval = Duration::from_millis(interval_ms);

            for poll in 1..=max_polls {
                let states = cluster.states().await;

                println!("--- poll {} ---", poll);
                for (id, state) in ProcessId::all(cluster.len()).zip(&states) {
                    println!("{}", format_state(id, state));
                }

                if states.iter().all(is_settled) {
                    println!("{}", "All live processes settled".green());
                    return Ok(());
                }
                tokio::time::sleep(interval).await;
            }

            eprintln!("Gave up after {} polls", max_polls);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn client(cluster: &ClusterClient, id: usize) -> anyhow::Result<&binvote_cli::ApiClient> {
    cluster
        .process(ProcessId::new(id))
        .ok_or_else(|| anyhow::anyhow!("no process {} in a cluster of {}", id, cluster.len()))
}

fn targets(cluster: &ClusterClient, id: Option<usize>) -> Box<dyn Iterator<Item = ProcessId>> {
    match id {
        Some(id) => Box::new(std::iter::once(ProcessId::new(id))),
        None => Box::new(ProcessId::all(cluster.len())),
    }
}

fn report<T: Display>(results: impl Iterator<Item = (ProcessId, Result<T, ApiError>)>) {
    let mut failed = false;
    for (id, result) in results {
        match result {
            Ok(body) => println!("{:>4}  {}", id, body),
            Err(e) => {
                failed = true;
                eprintln!("{:>4}  {} {}", id, "error:".red(), e);
            }
        }
    }
    if failed {
        std::process::exit(1);
    }
}
