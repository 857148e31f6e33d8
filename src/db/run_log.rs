use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use super::Db;
use crate::error::Result;
use crate::traversal::TraversalMode;

/// One engine run, as written to `trace_runs`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub mode: TraversalMode,
    pub task: String,
    pub outcome: String,
    pub answer: Option<String>,
    pub submitted: bool,
    pub detail_json: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn start(mode: TraversalMode, task: &str) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            mode,
            task: task.to_string(),
            outcome: "started".to_string(),
            answer: None,
            submitted: false,
            detail_json: None,
            started_at: Utc::now(),
        }
    }
}

/// Append-only audit of runs
#[derive(Debug, Clone)]
pub struct RunLog {
    db: Db,
}

impl RunLog {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn record(&self, run: &RunRecord) -> Result<()> {
        let run = run.clone();
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO trace_runs (run_id, mode, task, outcome, answer, submitted, detail_json, started_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        run.run_id,
                        run.mode.to_string(),
                        run.task,
                        run.outcome,
                        run.answer,
                        run.submitted,
                        run.detail_json,
                        run.started_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Most recent runs first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<(String, String, Option<String>)>> {
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT run_id, outcome, answer FROM trace_runs ORDER BY started_at DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map([limit as i64], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;
    use std::path::Path;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_record_and_list() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        let log = RunLog::new(db);

        let mut run = RunRecord::start(TraversalMode::Materialized, "connections");
        run.outcome = "path".to_string();
        run.answer = Some("Rafał, Adam, Barbara".to_string());
        log.record(&run).await.unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].0, run.run_id);
        assert_eq!(recent[0].1, "path");
        assert_eq!(recent[0].2.as_deref(), Some("Rafał, Adam, Barbara"));
    }

    #[test]
    fn test_run_ids_unique() {
        let a = RunRecord::start(TraversalMode::Frontier, "loop");
        let b = RunRecord::start(TraversalMode::Frontier, "loop");
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.outcome, "started");
    }
}
