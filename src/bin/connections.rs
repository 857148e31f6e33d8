use clap::Parser;
use entitytrace::db::{GraphStore, RunLog};
use entitytrace::runner;
use entitytrace::setup::{build_centrala, init_logging, open_db};
use entitytrace::{Config, TraceOutcome, TraversalMode};
use anyhow::{Context, Result};

#[derive(Parser, Debug)]
#[command(name = "connections")]
#[command(about = "Load users and connections, then report the shortest path between two people")]
struct Args {
    /// Start display name, matched exactly (overrides graph.start)
    #[arg(short, long)]
    start: Option<String>,

    /// End display name, matched exactly (overrides graph.end)
    #[arg(short, long)]
    end: Option<String>,

    /// Search in memory without mirroring the graph into SQLite
    #[arg(long)]
    no_persist: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load()?;
    init_logging(&config.trace.log_level);

    // Command-line names win over [graph]
    if let Some(start) = args.start {
        config.graph.start = start;
    }
    if let Some(end) = args.end {
        config.graph.end = end;
    }
    config
        .validate_for(TraversalMode::Materialized)
        .context("Pass --start/--end or set them under [graph] in config.toml")?;

    // Initialize clients and storage
    let centrala = build_centrala(&config)?;
    let db = open_db(&config).await?;
    let run_log = RunLog::new(db.clone());
    let store = GraphStore::new(db);
    let store = (config.graph.persist && !args.no_persist).then_some(&store);

    // Load, search, report
    let result =
        runner::connect(&centrala, store, &centrala, &config.graph, Some(&run_log)).await?;

    match &result.outcome {
        TraceOutcome::Path(names) => {
            println!("Path ({} hops): {}", names.len().saturating_sub(1), names.join(", "));
            if let Some(ack) = &result.ack {
                println!("Reported ({}: {})", ack.code, ack.message);
            }
        }
        TraceOutcome::NoPath { reason, neighbors } => {
            println!("No path from {} to {} ({:?})", config.graph.start, config.graph.end, reason);
            println!(
                "Within {} hops of {}: {}",
                config.graph.neighbor_depth,
                config.graph.start,
                neighbors.join(", ")
            );
        }
        TraceOutcome::Explored(_) => {}
    }

    Ok(())
}
