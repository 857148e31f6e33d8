//! Traversal engines over the person/place network.
//!
//! Two interchangeable strategies answer "where is / how do I reach X":
//! lazy frontier expansion against an oracle, and BFS over a graph
//! materialized from bulk rows. `TraversalMode` selects one at runtime.

mod frontier;
mod heuristic;
mod materialized;

pub use frontier::{FrontierEngine, FrontierPhase, FrontierReport, FrontierState, FrontierStats};
pub use heuristic::{LastSightingPolicy, SightingScan};
pub use materialized::{NotFoundReason, PathEngine, PathOutcome, PersonGraph};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::GraphStore;
use crate::entity::{Relation, Seeds};
use crate::oracle::{EntityOracle, RelationalSource};
use crate::Result;

/// Strategy selector used in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalMode {
    #[default]
    Frontier,
    Materialized,
}

impl std::fmt::Display for TraversalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraversalMode::Frontier => write!(f, "frontier"),
            TraversalMode::Materialized => write!(f, "materialized"),
        }
    }
}

/// What a strategy produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TraceOutcome {
    /// Frontier fixpoint. Answer selection happens afterwards.
    Explored(FrontierReport),
    /// Shortest path between the two named people.
    Path(Vec<String>),
    /// No path; neighbours of the start node for diagnostics.
    NoPath {
        reason: NotFoundReason,
        neighbors: Vec<String>,
    },
}

impl TraceOutcome {
    /// The answer a path search yields directly (`"A, B, C"`).
    pub fn path_answer(&self) -> Option<String> {
        match self {
            TraceOutcome::Path(names) => Some(names.join(", ")),
            _ => None,
        }
    }

    /// Consecutive hops of a found path as `Knows` relations.
    pub fn path_relations(&self) -> Vec<Relation> {
        match self {
            TraceOutcome::Path(names) => names
                .windows(2)
                .map(|hop| Relation::knows(&hop[0], &hop[1]))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TraceOutcome::Explored(_) => "explored",
            TraceOutcome::Path(_) => "path",
            TraceOutcome::NoPath { .. } => "no_path",
        }
    }
}

#[async_trait]
pub trait TraversalStrategy: Send + Sync {
    fn mode(&self) -> TraversalMode;
    async fn trace(&self) -> Result<TraceOutcome>;
}

/// Lazy oracle expansion from a seed set.
pub struct FrontierStrategy<'a> {
    oracle: &'a dyn EntityOracle,
    seeds: Seeds,
}

impl<'a> FrontierStrategy<'a> {
    pub fn new(oracle: &'a dyn EntityOracle, seeds: Seeds) -> Self {
        Self { oracle, seeds }
    }
}

#[async_trait]
impl<'a> TraversalStrategy for FrontierStrategy<'a> {
    fn mode(&self) -> TraversalMode {
        TraversalMode::Frontier
    }

    async fn trace(&self) -> Result<TraceOutcome> {
        let report = FrontierEngine::new(self.oracle).run(&self.seeds).await;
        Ok(TraceOutcome::Explored(report))
    }
}

/// Eager materialization followed by BFS between two display names.
pub struct MaterializedStrategy<'a> {
    source: &'a dyn RelationalSource,
    store: Option<&'a GraphStore>,
    start: String,
    end: String,
    neighbor_depth: usize,
}

impl<'a> MaterializedStrategy<'a> {
    pub fn new(
        source: &'a dyn RelationalSource,
        start: &str,
        end: &str,
        neighbor_depth: usize,
    ) -> Self {
        Self {
            source,
            store: None,
            start: start.to_string(),
            end: end.to_string(),
            neighbor_depth,
        }
    }

    pub fn with_store(mut self, store: &'a GraphStore) -> Self {
        self.store = Some(store);
        self
    }
}

#[async_trait]
impl<'a> TraversalStrategy for MaterializedStrategy<'a> {
    fn mode(&self) -> TraversalMode {
        TraversalMode::Materialized
    }

    async fn trace(&self) -> Result<TraceOutcome> {
        let mut engine = PathEngine::new(self.source);
        if let Some(store) = self.store {
            engine = engine.with_store(store);
        }
        let (graph, outcome) = engine.shortest_path(&self.start, &self.end).await?;

        Ok(match outcome {
            PathOutcome::Found(path) => TraceOutcome::Path(path),
            PathOutcome::NotFound(reason) => {
                let neighbors = graph.neighbors_within(&self.start, self.neighbor_depth);
                log::info!(
                    "search: people within {} hops of {}: {:?}",
                    self.neighbor_depth,
                    self.start,
                    neighbors
                );
                TraceOutcome::NoPath { reason, neighbors }
            }
        })
    }
}
