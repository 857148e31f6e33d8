use entitytrace::db::{migrate, GraphStore, RunLog};
use entitytrace::runner;
use entitytrace::setup::{build_centrala, build_extractor, init_logging, open_db};
use entitytrace::{Config, TraceOutcome, TraversalMode};
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    // Load configuration
    let config = Config::load()?;
    init_logging(&config.trace.log_level);

    match command {
        "run" => run(&config).await?,
        "runs" => list_runs(&config).await?,
        _ => verify(&config).await?,
    }

    Ok(())
}

/// Run the strategy selected by `trace.mode`
async fn run(config: &Config) -> Result<()> {
    config.validate_for(config.trace.mode)?;
    log::info!(
        "Starting entitytrace v{} ({} mode)",
        env!("CARGO_PKG_VERSION"),
        config.trace.mode
    );

    // Initialize storage and the grading service client
    let db = open_db(config).await?;
    let run_log = RunLog::new(db.clone());
    let centrala = build_centrala(config)?;

    match config.trace.mode {
        TraversalMode::Frontier => {
            // Fetch the note the seeds are extracted from
            let extractor = build_extractor(config)?;
            let note = centrala.fetch_text(&config.frontier.note_path).await?;
            log::debug!("Downloaded note ({} bytes)", note.len());

            let outcome = runner::locate(
                &note,
                &extractor,
                &centrala,
                &centrala,
                &config.frontier,
                Some(&run_log),
            )
            .await?;

            let people: Vec<_> = outcome.report.people.iter().cloned().collect();
            let places: Vec<_> = outcome.report.places.iter().cloned().collect();
            println!("People: {}", people.join(", "));
            println!("Places: {}", places.join(", "));
            println!("{} path: {}", config.frontier.target, outcome.scan.sightings.join(" -> "));
            match outcome.scan.answer {
                Some(place) => println!("Answer: {}", place),
                None => println!("Answer: none"),
            }
        }
        TraversalMode::Materialized => {
            let store = GraphStore::new(db);
            let store = config.graph.persist.then_some(&store);
            let result =
                runner::connect(&centrala, store, &centrala, &config.graph, Some(&run_log))
                    .await?;
            print_path(&result.outcome, &config.graph.start);
        }
    }

    Ok(())
}

fn print_path(outcome: &TraceOutcome, start: &str) {
    match outcome {
        TraceOutcome::Path(names) => println!("Path: {}", names.join(", ")),
        TraceOutcome::NoPath { reason, neighbors } => {
            println!("No path ({:?}). Near {}: {}", reason, start, neighbors.join(", "));
        }
        TraceOutcome::Explored(_) => {}
    }
}

async fn list_runs(config: &Config) -> Result<()> {
    let db = open_db(config).await?;
    let runs = RunLog::new(db).recent(20).await?;
    if runs.is_empty() {
        println!("No runs recorded.");
    }
    for (run_id, outcome, answer) in runs {
        println!("{}  {:<12} {}", run_id, outcome, answer.unwrap_or_default());
    }
    Ok(())
}

/// Check that the store has every expected table
async fn verify(config: &Config) -> Result<()> {
    log::info!("Database path: {}", config.db_path().display());
    let db = open_db(config).await?;

    // Compare the live schema against the expected tables

    let (missing, applied) = db
        .with_connection(|conn| {
            let missing = migrate::missing_tables(conn)?;
            let applied = migrate::get_applied_migrations(conn)?;
            Ok((missing, applied))
        })
        .await?;

    if !missing.is_empty() {
        for table in &missing {
            log::error!("Missing table: {}", table);
        }
        anyhow::bail!("Schema incomplete: {} table(s) missing", missing.len());
    }

    log::info!("✓ {} migrations applied, schema complete", applied.len());
    Ok(())
}
