//! End-to-end runs: traverse, pick an answer, submit it, record the run.
//!
//! Collaborators are passed in as trait objects so the binaries can plug in
//! the HTTP clients and tests can plug in fakes.

use serde_json::{json, Value};

use crate::config::{FrontierConfig, GraphConfig};
use crate::db::{GraphStore, RunLog, RunRecord};
use crate::oracle::{AnswerSink, EntityExtractor, EntityOracle, RelationalSource, ReportAck};
use crate::traversal::{
    FrontierReport, FrontierStrategy, LastSightingPolicy, MaterializedStrategy, SightingScan,
    TraceOutcome, TraversalStrategy,
};
use crate::{Result, TraceError};

/// Result of a frontier-mode run.
#[derive(Debug)]
pub struct LocateOutcome {
    pub report: FrontierReport,
    pub scan: SightingScan,
    pub ack: Option<ReportAck>,
}

/// Result of a materialized-mode run.
#[derive(Debug)]
pub struct ConnectOutcome {
    pub outcome: TraceOutcome,
    pub ack: Option<ReportAck>,
}

/// Extract seeds from `note`, expand to a fixpoint, scan candidates for the
/// target, and submit the last sighting. Only seed extraction is fatal.
pub async fn locate(
    note: &str,
    extractor: &dyn EntityExtractor,
    oracle: &dyn EntityOracle,
    sink: &dyn AnswerSink,
    settings: &FrontierConfig,
    run_log: Option<&RunLog>,
) -> Result<LocateOutcome> {
    let seeds = extractor.fetch_initial_entities(note).await.map_err(|e| {
        log::error!("extract: failed: {}", e);
        e
    })?;
    log::info!("extract: seeds people={:?} places={:?}", seeds.people, seeds.places);

    // Expand to a fixpoint
    let strategy = FrontierStrategy::new(oracle, seeds);
    let mut run = RunRecord::start(strategy.mode(), &settings.task);

    let report = match strategy.trace().await? {
        TraceOutcome::Explored(report) => report,
        other => {
            return Err(TraceError::InvalidInput(format!(
                "frontier strategy produced {}",
                other.label()
            )))
        }
    };

    for person in &report.people {
        let places = report.places_of(person);
        if !places.is_empty() {
            log::info!("lookup: {} seen at {}", person, places.join(", "));
        }
    }

    // Pick the last place the target was reported at
    let policy = LastSightingPolicy::for_report(&settings.candidate_places, &report);
    let scan = policy.select(oracle, &settings.target).await;

    let ack = match &scan.answer {
        Some(place) => submit(sink, &settings.task, json!(place)).await,
        None => {
            log::warn!("scan: {} not reported at any candidate place", settings.target);
            None
        }
    };

    // Record the run
    run.outcome = if scan.answer.is_some() { "located" } else { "not_located" }.to_string();
    run.answer = scan.answer.clone();
    run.submitted = ack.is_some();
    let detail = json!({
        "report": &report,
        "relations": report.relations(),
        "scan": &scan,
    });
    run.detail_json = serde_json::to_string(&detail).ok();
    record(run_log, &run).await;

    Ok(LocateOutcome { report, scan, ack })
}

/// Materialize the person graph, search `start -> end`, and submit the path.
/// Bulk load failures are fatal; a missing path is not.
pub async fn connect(
    source: &dyn RelationalSource,
    store: Option<&GraphStore>,
    sink: &dyn AnswerSink,
    settings: &GraphConfig,
    run_log: Option<&RunLog>,
) -> Result<ConnectOutcome> {
    let mut strategy =
        MaterializedStrategy::new(source, &settings.start, &settings.end, settings.neighbor_depth);
    if let Some(store) = store {
        strategy = strategy.with_store(store);
    }
    let mut run = RunRecord::start(strategy.mode(), &settings.task);

    // Load, materialize, search
    let outcome = strategy.trace().await?;
    let answer = outcome.path_answer();

    let ack = match &answer {
        Some(path) => submit(sink, &settings.task, Value::String(path.clone())).await,
        None => None,
    };

    // Record the run
    run.outcome = outcome.label().to_string();
    run.answer = answer;
    run.submitted = ack.is_some();
    let detail = json!({
        "outcome": &outcome,
        "relations": outcome.path_relations(),
    });
    run.detail_json = serde_json::to_string(&detail).ok();
    record(run_log, &run).await;

    Ok(ConnectOutcome { outcome, ack })
}

async fn submit(sink: &dyn AnswerSink, task: &str, answer: Value) -> Option<ReportAck> {
    log::info!("submit: {} <- {}", task, answer);
    match sink.submit_answer(task, answer).await {
        Ok(ack) => {
            log::info!("submit: {} acknowledged ({}): {}", task, ack.code, ack.message);
            Some(ack)
        }
        Err(e) => {
            log::error!("submit: {} failed: {}", task, e);
            None
        }
    }
}

async fn record(run_log: Option<&RunLog>, run: &RunRecord) {
    if let Some(run_log) = run_log {
        if let Err(e) = run_log.record(run).await {
            log::warn!("Failed to record run {}: {}", run.run_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{migrate, Db};
    use crate::entity::Seeds;
    use crate::oracle::fake::{FakeExtractor, FakeOracle, FakeRelational, FakeSink};
    use crate::traversal::NotFoundReason;
    use std::path::Path;
    use tempfile::TempDir;

    async fn setup_db() -> (Db, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        (db, temp_dir)
    }

    async fn latest_detail(db: &Db) -> Value {
        let detail: String = db
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT detail_json FROM trace_runs ORDER BY started_at DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        serde_json::from_str(&detail).unwrap()
    }

    fn barbara_oracle() -> FakeOracle {
        FakeOracle::new()
            .person("ALEKSANDER", &["KRAKOW", "LUBLIN"])
            .person("BARBARA", &["KRAKOW", "ELBLAG"])
            .place("KRAKOW", &["ALEKSANDER", "BARBARA"])
            .place("LUBLIN", &["ALEKSANDER"])
            .place("ELBLAG", &["BARBARA"])
    }

    #[tokio::test]
    async fn test_locate_submits_last_sighting() {
        let oracle = barbara_oracle();
        let extractor = FakeExtractor {
            seeds: Some(Seeds {
                people: vec!["ALEKSANDER".into()],
                places: vec![],
            }),
        };
        let sink = FakeSink::default();
        let settings = FrontierConfig {
            candidate_places: vec!["ELBLAG".into(), "KRAKOW".into(), "LUBLIN".into()],
            ..Default::default()
        };
        let (db, _temp) = setup_db().await;
        let run_log = RunLog::new(db.clone());

        let outcome = locate("note", &extractor, &oracle, &sink, &settings, Some(&run_log))
            .await
            .unwrap();

        assert!(outcome.report.people.contains("BARBARA"));
        assert_eq!(outcome.scan.sightings, vec!["ELBLAG", "KRAKOW"]);
        assert_eq!(outcome.scan.answer.as_deref(), Some("KRAKOW"));
        assert!(outcome.ack.is_some());

        let submitted = sink.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0], ("loop".to_string(), json!("KRAKOW")));

        let recent = run_log.recent(5).await.unwrap();
        assert_eq!(recent[0].1, "located");

        let detail = latest_detail(&db).await;
        let relations = detail["relations"].as_array().unwrap();
        assert_eq!(relations.len(), outcome.report.relations().len());
        assert!(relations.contains(&json!({"kind": "seen_at", "from": "BARBARA", "to": "ELBLAG"})));
    }

    #[tokio::test]
    async fn test_locate_extraction_failure_is_fatal() {
        let oracle = barbara_oracle();
        let extractor = FakeExtractor { seeds: None };
        let sink = FakeSink::default();
        let err = locate("note", &extractor, &oracle, &sink, &FrontierConfig::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TraceError::Extraction(_)));
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_locate_submission_failure_keeps_result() {
        let oracle = barbara_oracle();
        let extractor = FakeExtractor {
            seeds: Some(Seeds {
                people: vec!["BARBARA".into()],
                places: vec![],
            }),
        };
        let sink = FakeSink {
            reject: true,
            ..Default::default()
        };
        let outcome = locate("note", &extractor, &oracle, &sink, &FrontierConfig::default(), None)
            .await
            .unwrap();
        // No candidates configured: expansion order is BARBARA's places first
        assert!(outcome.scan.answer.is_some());
        assert!(outcome.ack.is_none());
        assert_eq!(sink.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_submits_joined_path() {
        let source = FakeRelational::new(
            &[(1, "Rafał"), (2, "Adam"), (3, "Barbara")],
            &[(1, 2), (3, 2)],
        );
        let sink = FakeSink::default();
        let settings = GraphConfig {
            start: "Rafał".into(),
            end: "Barbara".into(),
            ..Default::default()
        };
        let (db, _temp) = setup_db().await;
        let store = GraphStore::new(db.clone());
        let run_log = RunLog::new(db.clone());

        let result = connect(&source, Some(&store), &sink, &settings, Some(&run_log))
            .await
            .unwrap();

        assert_eq!(
            result.outcome,
            TraceOutcome::Path(vec!["Rafał".into(), "Adam".into(), "Barbara".into()])
        );
        let submitted = sink.submitted.lock().unwrap();
        assert_eq!(submitted[0], ("connections".to_string(), json!("Rafał, Adam, Barbara")));
        assert_eq!(run_log.recent(1).await.unwrap()[0].1, "path");

        let detail = latest_detail(&db).await;
        assert_eq!(detail["relations"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_connect_no_path_does_not_submit() {
        let source = FakeRelational::new(&[(1, "Rafał"), (2, "Barbara")], &[]);
        let sink = FakeSink::default();
        let settings = GraphConfig {
            start: "Rafał".into(),
            end: "Barbara".into(),
            ..Default::default()
        };
        let result = connect(&source, None, &sink, &settings, None).await.unwrap();
        assert_eq!(
            result.outcome,
            TraceOutcome::NoPath {
                reason: NotFoundReason::Disconnected,
                neighbors: vec![],
            }
        );
        assert!(result.ack.is_none());
        assert!(sink.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_bulk_load_failure() {
        let mut source = FakeRelational::new(&[(1, "Rafał")], &[]);
        source.fail = true;
        let sink = FakeSink::default();
        let err = connect(&source, None, &sink, &GraphConfig::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TraceError::BulkLoad(_)));
    }
}
