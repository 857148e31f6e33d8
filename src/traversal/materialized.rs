//! Eager materialized graph and BFS shortest path between display names.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::Serialize;

use crate::db::GraphStore;
use crate::entity::{ConnectionRecord, PersonRecord};
use crate::oracle::RelationalSource;
use crate::Result;

/// Why a path search came back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotFoundReason {
    UnknownStart,
    UnknownEnd,
    Disconnected,
}

/// Result of a shortest-path query. Absence of a path is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PathOutcome {
    /// Display names from start to end, inclusive.
    Found(Vec<String>),
    NotFound(NotFoundReason),
}

/// Undirected "knows" graph keyed by person id.
///
/// Names are matched exactly (no normalization), unlike frontier keys.
#[derive(Debug, Clone, Default)]
pub struct PersonGraph {
    names: BTreeMap<i64, String>,
    ids_by_name: HashMap<String, i64>,
    adjacency: BTreeMap<i64, BTreeSet<i64>>,
    skipped_connections: usize,
}

impl PersonGraph {
    /// Build the graph from bulk rows. Every connection is inserted in both
    /// directions; connections naming unknown ids are skipped.
    ///
    /// Rows are taken in id order so the result does not depend on how the
    /// source ordered them. A repeated id keeps its first row; a repeated
    /// display name resolves to the lowest id.
    pub fn build(persons: &[PersonRecord], connections: &[ConnectionRecord]) -> Self {
        let mut graph = Self::default();

        let mut ordered: Vec<&PersonRecord> = persons.iter().collect();
        ordered.sort_by_key(|person| person.id);

        for person in ordered {
            if let Some(kept) = graph.names.get(&person.id) {
                log::warn!(
                    "materialize: duplicate id {} ({} and {}), keeping {}",
                    person.id,
                    kept,
                    person.name,
                    kept
                );
                continue;
            }
            graph.names.insert(person.id, person.name.clone());
            graph.adjacency.entry(person.id).or_default();

            if let Some(existing) = graph.ids_by_name.get(&person.name) {
                log::warn!(
                    "materialize: duplicate name {} (ids {} and {}), keeping {}",
                    person.name,
                    existing,
                    person.id,
                    existing
                );
                continue;
            }
            graph.ids_by_name.insert(person.name.clone(), person.id);
        }

        for conn in connections {
            let known = |id: &i64| graph.names.contains_key(id);
            if !known(&conn.source_id) || !known(&conn.target_id) {
                log::debug!(
                    "materialize: skipping connection {} -> {} with unknown endpoint",
                    conn.source_id,
                    conn.target_id
                );
                graph.skipped_connections += 1;
                continue;
            }
            graph.adjacency.entry(conn.source_id).or_default().insert(conn.target_id);
            graph.adjacency.entry(conn.target_id).or_default().insert(conn.source_id);
        }

        graph
    }

    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        let endpoints: usize = self
            .adjacency
            .iter()
            .map(|(id, n)| n.len() + usize::from(n.contains(id)))
            .sum();
        endpoints / 2
    }

    pub fn skipped_connections(&self) -> usize {
        self.skipped_connections
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ids_by_name.contains_key(name)
    }

    /// Names reachable from `name` in 1..=depth hops, nearest first.
    pub fn neighbors_within(&self, name: &str, depth: usize) -> Vec<String> {
        let Some(&start) = self.ids_by_name.get(name) else {
            return Vec::new();
        };

        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut out = Vec::new();

        while let Some((id, hops)) = queue.pop_front() {
            if hops >= depth {
                continue;
            }
            for &next in &self.adjacency[&id] {
                if seen.insert(next) {
                    out.push(self.names[&next].clone());
                    queue.push_back((next, hops + 1));
                }
            }
        }

        out
    }

    /// Unweighted BFS shortest path with parent-pointer reconstruction.
    pub fn shortest_path(&self, start: &str, end: &str) -> PathOutcome {
        let Some(&from) = self.ids_by_name.get(start) else {
            return PathOutcome::NotFound(NotFoundReason::UnknownStart);
        };
        let Some(&to) = self.ids_by_name.get(end) else {
            return PathOutcome::NotFound(NotFoundReason::UnknownEnd);
        };

        let mut parent: HashMap<i64, i64> = HashMap::new();
        let mut seen = BTreeSet::from([from]);
        let mut queue = VecDeque::from([from]);

        while let Some(id) = queue.pop_front() {
            if id == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(&prev) = parent.get(&cursor) {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return PathOutcome::Found(path.iter().map(|id| self.names[id].clone()).collect());
            }
            for &next in &self.adjacency[&id] {
                if seen.insert(next) {
                    parent.insert(next, id);
                    queue.push_back(next);
                }
            }
        }

        PathOutcome::NotFound(NotFoundReason::Disconnected)
    }
}

/// Loads bulk rows, materializes the graph, and answers path queries.
pub struct PathEngine<'a> {
    source: &'a dyn RelationalSource,
    store: Option<&'a GraphStore>,
}

impl<'a> PathEngine<'a> {
    pub fn new(source: &'a dyn RelationalSource) -> Self {
        Self { source, store: None }
    }

    /// Mirror the loaded graph into SQLite and search the stored copy.
    pub fn with_store(mut self, store: &'a GraphStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Rebuild the graph from scratch. Bulk load failures are fatal.
    pub async fn materialize(&self) -> Result<PersonGraph> {
        let persons = self.source.load_all_persons().await.map_err(|e| {
            log::error!("load: persons failed: {}", e);
            e
        })?;
        let connections = self.source.load_all_connections().await.map_err(|e| {
            log::error!("load: connections failed: {}", e);
            e
        })?;
        log::info!(
            "load: {} persons, {} connections",
            persons.len(),
            connections.len()
        );

        let graph = match self.store {
            Some(store) => {
                store.replace_all(persons, connections).await?;
                store.load_graph().await?
            }
            None => PersonGraph::build(&persons, &connections),
        };

        log::info!(
            "materialize: {} nodes, {} edges ({} connections skipped)",
            graph.node_count(),
            graph.edge_count(),
            graph.skipped_connections()
        );
        Ok(graph)
    }

    /// Materialize and search in one step.
    pub async fn shortest_path(
        &self,
        start: &str,
        end: &str,
    ) -> Result<(PersonGraph, PathOutcome)> {
        let graph = self.materialize().await?;
        let outcome = graph.shortest_path(start, end);
        match &outcome {
            PathOutcome::Found(path) => log::info!("search: {}", path.join(" -> ")),
            PathOutcome::NotFound(reason) => {
                log::warn!("search: no path {} -> {} ({:?})", start, end, reason)
            }
        }
        Ok((graph, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::fake::FakeRelational;
    use crate::TraceError;

    fn graph(persons: &[(i64, &str)], connections: &[(i64, i64)]) -> PersonGraph {
        let source = FakeRelational::new(persons, connections);
        PersonGraph::build(&source.persons, &source.connections)
    }

    #[test]
    fn test_chain_path() {
        let g = graph(&[(1, "A"), (2, "B"), (3, "C"), (4, "D")], &[(1, 2), (2, 3), (3, 4)]);
        assert_eq!(
            g.shortest_path("A", "D"),
            PathOutcome::Found(vec!["A".into(), "B".into(), "C".into(), "D".into()])
        );
    }

    #[test]
    fn test_disconnected() {
        let g = graph(&[(1, "X"), (2, "Y"), (3, "Z")], &[(1, 3)]);
        assert_eq!(
            g.shortest_path("X", "Y"),
            PathOutcome::NotFound(NotFoundReason::Disconnected)
        );
    }

    #[test]
    fn test_single_directed_row_is_symmetric() {
        let g = graph(&[(1, "Rafał"), (2, "Barbara")], &[(1, 2)]);
        assert_eq!(
            g.shortest_path("Rafał", "Barbara"),
            PathOutcome::Found(vec!["Rafał".into(), "Barbara".into()])
        );
        assert_eq!(
            g.shortest_path("Barbara", "Rafał"),
            PathOutcome::Found(vec!["Barbara".into(), "Rafał".into()])
        );
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_prefers_shortest_over_first_found() {
        // A-B-C-D-E and a shortcut A-E
        let g = graph(
            &[(1, "A"), (2, "B"), (3, "C"), (4, "D"), (5, "E")],
            &[(1, 2), (2, 3), (3, 4), (4, 5), (5, 1)],
        );
        assert_eq!(
            g.shortest_path("A", "E"),
            PathOutcome::Found(vec!["A".into(), "E".into()])
        );
    }

    #[test]
    fn test_unknown_endpoints() {
        let g = graph(&[(1, "A")], &[]);
        assert_eq!(
            g.shortest_path("Nobody", "A"),
            PathOutcome::NotFound(NotFoundReason::UnknownStart)
        );
        assert_eq!(
            g.shortest_path("A", "Nobody"),
            PathOutcome::NotFound(NotFoundReason::UnknownEnd)
        );
    }

    #[test]
    fn test_start_equals_end() {
        let g = graph(&[(1, "A")], &[]);
        assert_eq!(g.shortest_path("A", "A"), PathOutcome::Found(vec!["A".into()]));
    }

    #[test]
    fn test_lookup_uses_exact_display_name() {
        // Path search does not normalize: "RAFAL" is not "Rafał".
        let g = graph(&[(1, "Rafał"), (2, "Barbara")], &[(1, 2)]);
        assert_eq!(
            g.shortest_path("RAFAL", "Barbara"),
            PathOutcome::NotFound(NotFoundReason::UnknownStart)
        );
        assert_eq!(
            g.shortest_path("Rafał", "BARBARA"),
            PathOutcome::NotFound(NotFoundReason::UnknownEnd)
        );
    }

    #[test]
    fn test_dangling_connections_skipped() {
        let g = graph(&[(1, "A"), (2, "B")], &[(1, 2), (1, 99)]);
        assert_eq!(g.skipped_connections(), 1);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_duplicate_name_resolves_to_lowest_id() {
        // Rows arrive out of id order; the later row carries the lower id
        let g = graph(&[(5, "Adam"), (9, "Ewa"), (2, "Adam")], &[(5, 9)]);
        assert_eq!(g.node_count(), 3);
        assert_eq!(
            g.shortest_path("Adam", "Ewa"),
            PathOutcome::NotFound(NotFoundReason::Disconnected)
        );
    }

    #[test]
    fn test_duplicate_id_keeps_first_row() {
        let g = graph(&[(1, "Adam"), (2, "Ewa"), (1, "Adrian")], &[(1, 2)]);
        assert_eq!(g.node_count(), 2);
        assert!(g.contains("Adam"));
        assert!(!g.contains("Adrian"));
        assert_eq!(
            g.shortest_path("Adam", "Ewa"),
            PathOutcome::Found(vec!["Adam".into(), "Ewa".into()])
        );
    }

    #[test]
    fn test_neighbors_within_depth() {
        let g = graph(&[(1, "A"), (2, "B"), (3, "C"), (4, "D")], &[(1, 2), (2, 3), (3, 4)]);
        assert_eq!(g.neighbors_within("A", 1), vec!["B"]);
        assert_eq!(g.neighbors_within("A", 2), vec!["B", "C"]);
        assert!(g.neighbors_within("Nobody", 2).is_empty());
    }

    #[tokio::test]
    async fn test_engine_in_memory() {
        let source = FakeRelational::new(&[(1, "A"), (2, "B"), (3, "C")], &[(1, 2), (2, 3)]);
        let (_, outcome) = PathEngine::new(&source).shortest_path("C", "A").await.unwrap();
        assert_eq!(
            outcome,
            PathOutcome::Found(vec!["C".into(), "B".into(), "A".into()])
        );
    }

    #[tokio::test]
    async fn test_engine_bulk_load_failure_is_fatal() {
        let mut source = FakeRelational::new(&[(1, "A")], &[]);
        source.fail = true;
        let err = PathEngine::new(&source).materialize().await.unwrap_err();
        assert!(matches!(err, TraceError::BulkLoad(_)));
    }
}
