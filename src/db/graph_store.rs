//! SQLite-backed materialized person graph.

use rusqlite::params;
use std::collections::HashSet;

use super::Db;
use crate::entity::{ConnectionRecord, PersonRecord};
use crate::error::Result;
use crate::traversal::PersonGraph;

/// Row counts written by one destructive load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub persons: usize,
    pub connections: usize,
    pub skipped: usize,
}

/// Persons and connections tables, replaced wholesale on each load.
#[derive(Debug, Clone)]
pub struct GraphStore {
    db: Db,
}

impl GraphStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Clear both tables and insert the given rows in one transaction.
    /// A repeated person id keeps its first row; connections referencing
    /// unknown person ids are skipped.
    pub async fn replace_all(
        &self,
        persons: Vec<PersonRecord>,
        connections: Vec<ConnectionRecord>,
    ) -> Result<LoadSummary> {
        let summary = self
            .db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM connections", [])?;
                tx.execute("DELETE FROM persons", [])?;

                let mut summary = LoadSummary::default();
                let mut ids = HashSet::with_capacity(persons.len());
                {
                    let mut insert = tx.prepare(
                        "INSERT OR IGNORE INTO persons (person_id, name) VALUES (?1, ?2)",
                    )?;
                    for person in &persons {
                        insert.execute(params![person.id, person.name])?;
                        ids.insert(person.id);
                    }
                    summary.persons = ids.len();

                    let mut insert = tx.prepare(
                        "INSERT OR IGNORE INTO connections (source_id, target_id) VALUES (?1, ?2)",
                    )?;
                    for c in &connections {
                        if !ids.contains(&c.source_id) || !ids.contains(&c.target_id) {
                            summary.skipped += 1;
                            continue;
                        }
                        summary.connections += insert.execute(params![c.source_id, c.target_id])?;
                    }
                }

                tx.commit()?;
                Ok(summary)
            })
            .await?;

        log::info!(
            "materialize: stored {} persons, {} connections ({} skipped)",
            summary.persons,
            summary.connections,
            summary.skipped
        );
        Ok(summary)
    }

    /// Rebuild the in-memory graph from the stored rows.
    pub async fn load_graph(&self) -> Result<PersonGraph> {
        self.db
            .with_connection(|conn| {
                let mut stmt =
                    conn.prepare("SELECT person_id, name FROM persons ORDER BY person_id")?;
                let persons = stmt
                    .query_map([], |row| {
                        Ok(PersonRecord {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

                let mut stmt = conn.prepare(
                    "SELECT source_id, target_id FROM connections ORDER BY source_id, target_id",
                )?;
                let connections = stmt
                    .query_map([], |row| {
                        Ok(ConnectionRecord {
                            source_id: row.get(0)?,
                            target_id: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

                Ok(PersonGraph::build(&persons, &connections))
            })
            .await
    }
}
