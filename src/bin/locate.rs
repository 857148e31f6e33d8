use clap::Parser;
use entitytrace::db::RunLog;
use entitytrace::runner;
use entitytrace::setup::{build_centrala, build_extractor, init_logging, open_db};
use entitytrace::{Config, TraversalMode};
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "locate")]
#[command(about = "Trace a person through the people/places oracle and report their last sighting")]
struct Args {
    /// Person to locate (overrides frontier.target)
    #[arg(short, long)]
    target: Option<String>,

    /// Candidate place to scan, in order; repeat for more (overrides frontier.candidate_places)
    #[arg(short, long = "place")]
    places: Vec<String>,

    /// Note to extract seeds from, relative to centrala.base_url
    #[arg(short, long)]
    note: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load()?;
    init_logging(&config.trace.log_level);

    // Command-line overrides
    if let Some(target) = args.target {
        config.frontier.target = target;
    }
    if !args.places.is_empty() {
        config.frontier.candidate_places = args.places;
    }
    if let Some(note) = args.note {
        config.frontier.note_path = note;
    }
    config.validate_for(TraversalMode::Frontier)?;

    // Initialize clients and storage
    let centrala = build_centrala(&config)?;
    let extractor = build_extractor(&config)?;
    let run_log = RunLog::new(open_db(&config).await?);

    // Fetch the note and trace from its seeds
    log::info!("Downloading note {}", config.frontier.note_path);
    let note = centrala.fetch_text(&config.frontier.note_path).await?;

    let outcome = runner::locate(
        &note,
        &extractor,
        &centrala,
        &centrala,
        &config.frontier,
        Some(&run_log),
    )
    .await?;

    // Summary
    println!(
        "\nDiscovered {} people and {} places ({} lookups, {} failed)",
        outcome.report.people.len(),
        outcome.report.places.len(),
        outcome.report.stats.total_lookups(),
        outcome.report.stats.transient_failures,
    );
    for person in &outcome.report.people {
        println!("  {:<12} {}", person, outcome.report.places_of(person).join(" "));
    }
    println!("\n{} seen at: {}", config.frontier.target, outcome.scan.sightings.join(" -> "));

    match (&outcome.scan.answer, &outcome.ack) {
        (Some(place), Some(ack)) => println!("Reported {} ({}: {})", place, ack.code, ack.message),
        (Some(place), None) => println!("Answer {} (submission failed, see log)", place),
        (None, _) => println!("No sighting of {}", config.frontier.target),
    }

    Ok(())
}
