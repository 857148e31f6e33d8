//! Lazy frontier expansion over the person/place oracle.
//!
//! Drains the people queue, then the places queue, and repeats until both
//! are empty. Every key is looked up at most once per traversal.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::Serialize;

use crate::entity::{Entity, EntityKind, Relation, Seeds};
use crate::oracle::{EntityOracle, Lookup};

/// Lifecycle of one traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrontierPhase {
    Idle,
    Expanding,
    Fixpoint,
}

/// Lookup counters for one traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrontierStats {
    pub person_lookups: usize,
    pub place_lookups: usize,
    pub not_found: usize,
    pub transient_failures: usize,
}

impl FrontierStats {
    pub fn total_lookups(&self) -> usize {
        self.person_lookups + self.place_lookups
    }
}

/// Traversal state owned by exactly one expansion run.
#[derive(Debug, Default)]
pub struct FrontierState {
    people_queue: VecDeque<String>,
    places_queue: VecDeque<String>,
    queued_people: HashSet<String>,
    queued_places: HashSet<String>,
    processed_people: BTreeSet<String>,
    processed_places: BTreeSet<String>,
    place_order: Vec<String>,
    sightings: BTreeMap<String, BTreeSet<String>>,
    stats: FrontierStats,
    started: bool,
}

impl FrontierState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state with normalized seeds already enqueued.
    pub fn seeded(seeds: &Seeds) -> Self {
        let mut state = Self::new();
        for person in &seeds.people {
            state.submit(Entity::person(person));
        }
        for place in &seeds.places {
            state.submit(Entity::place(place));
        }
        state
    }

    /// Enqueue an entity unless it is empty, already processed, or already queued.
    /// Returns true when the entity was enqueued.
    pub fn submit(&mut self, entity: Entity) -> bool {
        if entity.key.is_empty() {
            return false;
        }
        let (queue, queued, processed) = match entity.kind {
            EntityKind::Person => (
                &mut self.people_queue,
                &mut self.queued_people,
                &self.processed_people,
            ),
            EntityKind::Place => (
                &mut self.places_queue,
                &mut self.queued_places,
                &self.processed_places,
            ),
        };
        if processed.contains(&entity.key) || !queued.insert(entity.key.clone()) {
            return false;
        }
        queue.push_back(entity.key);
        true
    }

    pub fn is_processed(&self, entity: &Entity) -> bool {
        match entity.kind {
            EntityKind::Person => self.processed_people.contains(&entity.key),
            EntityKind::Place => self.processed_places.contains(&entity.key),
        }
    }

    pub fn pending(&self) -> usize {
        self.people_queue.len() + self.places_queue.len()
    }

    pub fn phase(&self) -> FrontierPhase {
        if !self.started {
            FrontierPhase::Idle
        } else if self.pending() > 0 {
            FrontierPhase::Expanding
        } else {
            FrontierPhase::Fixpoint
        }
    }

    pub fn stats(&self) -> &FrontierStats {
        &self.stats
    }

    fn record_sighting(&mut self, person: &str, place: &str) {
        if person.is_empty() || place.is_empty() {
            return;
        }
        self.sightings
            .entry(person.to_string())
            .or_default()
            .insert(place.to_string());
    }

    fn mark_processed(&mut self, entity: &Entity) {
        match entity.kind {
            EntityKind::Person => {
                self.processed_people.insert(entity.key.clone());
            }
            EntityKind::Place => {
                if self.processed_places.insert(entity.key.clone()) {
                    self.place_order.push(entity.key.clone());
                }
            }
        }
    }

    pub fn into_report(self) -> FrontierReport {
        FrontierReport {
            people: self.processed_people,
            places: self.processed_places,
            place_order: self.place_order,
            sightings: self.sightings,
            stats: self.stats,
        }
    }
}

/// Everything a finished traversal discovered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrontierReport {
    pub people: BTreeSet<String>,
    pub places: BTreeSet<String>,
    /// Places in the order they were expanded.
    pub place_order: Vec<String>,
    /// Person -> places the oracle associated with them.
    pub sightings: BTreeMap<String, BTreeSet<String>>,
    pub stats: FrontierStats,
}

impl FrontierReport {
    /// Places associated with `person` (normalized key).
    pub fn places_of(&self, person: &str) -> Vec<String> {
        self.sightings
            .get(person)
            .map(|places| places.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every person -> place sighting as a `SeenAt` relation.
    pub fn relations(&self) -> Vec<Relation> {
        self.sightings
            .iter()
            .flat_map(|(person, places)| {
                places.iter().map(move |place| Relation::seen_at(person, place))
            })
            .collect()
    }
}

/// Frontier expansion engine. Holds no traversal state of its own.
pub struct FrontierEngine<'a> {
    oracle: &'a dyn EntityOracle,
}

impl<'a> FrontierEngine<'a> {
    pub fn new(oracle: &'a dyn EntityOracle) -> Self {
        Self { oracle }
    }

    /// Seed a fresh state and expand it to a fixpoint.
    pub async fn run(&self, seeds: &Seeds) -> FrontierReport {
        let mut state = FrontierState::seeded(seeds);
        self.expand(&mut state).await;
        state.into_report()
    }

    /// Expand `state` until both queues are empty.
    pub async fn expand(&self, state: &mut FrontierState) {
        state.started = true;
        log::info!(
            "lookup: expanding frontier ({} people, {} places queued)",
            state.people_queue.len(),
            state.places_queue.len()
        );

        while state.pending() > 0 {
            while let Some(person) = state.people_queue.pop_front() {
                state.queued_people.remove(&person);
                self.visit(state, Entity { kind: EntityKind::Person, key: person }).await;
            }
            while let Some(place) = state.places_queue.pop_front() {
                state.queued_places.remove(&place);
                self.visit(state, Entity { kind: EntityKind::Place, key: place }).await;
            }
        }

        log::info!(
            "lookup: fixpoint after {} lookups ({} people, {} places, {} failures)",
            state.stats.total_lookups(),
            state.processed_people.len(),
            state.processed_places.len(),
            state.stats.transient_failures
        );
    }

    async fn visit(&self, state: &mut FrontierState, entity: Entity) {
        if state.is_processed(&entity) {
            return;
        }

        let result = match entity.kind {
            EntityKind::Person => {
                state.stats.person_lookups += 1;
                self.oracle.lookup_person(&entity.key).await
            }
            EntityKind::Place => {
                state.stats.place_lookups += 1;
                self.oracle.lookup_place(&entity.key).await
            }
        };
        state.mark_processed(&entity);

        let lookup = match result {
            Ok(lookup) => lookup,
            Err(e) => {
                log::warn!("lookup: {} {} failed, skipping: {}", entity.kind, entity.key, e);
                state.stats.transient_failures += 1;
                return;
            }
        };
        if lookup == Lookup::NotFound {
            log::debug!("lookup: no {} named {}", entity.kind, entity.key);
            state.stats.not_found += 1;
            return;
        }

        log::debug!("lookup: {} {} -> {:?}", entity.kind, entity.key, lookup.related());

        for raw in lookup.related() {
            let discovered = match entity.kind {
                EntityKind::Person => Entity::place(raw),
                EntityKind::Place => Entity::person(raw),
            };
            // Sightings are always keyed person -> place
            match entity.kind {
                EntityKind::Person => state.record_sighting(&entity.key, &discovered.key),
                EntityKind::Place => state.record_sighting(&discovered.key, &entity.key),
            }
            state.submit(discovered);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::fake::FakeOracle;

    fn seeds(people: &[&str], places: &[&str]) -> Seeds {
        Seeds {
            people: people.iter().map(|s| s.to_string()).collect(),
            places: places.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_three_call_scenario() {
        let oracle = FakeOracle::new()
            .person("ALEKSANDER", &["KRAKOW"])
            .place("KRAKOW", &["BARBARA"])
            .person("BARBARA", &[]);
        let report = FrontierEngine::new(&oracle).run(&seeds(&["ALEKSANDER"], &[])).await;

        assert_eq!(report.people, set(&["ALEKSANDER", "BARBARA"]));
        assert_eq!(report.places, set(&["KRAKOW"]));
        assert_eq!(oracle.call_count(), 3);
        assert_eq!(report.stats.total_lookups(), 3);
        assert_eq!(oracle.calls_for(EntityKind::Person, "ALEKSANDER"), 1);
        assert_eq!(oracle.calls_for(EntityKind::Place, "KRAKOW"), 1);
        assert_eq!(oracle.calls_for(EntityKind::Person, "BARBARA"), 1);
    }

    #[tokio::test]
    async fn test_cycles_reach_fixpoint() {
        let oracle = FakeOracle::new()
            .person("ADAM", &["LUBLIN", "KONIN"])
            .person("EWA", &["LUBLIN"])
            .place("LUBLIN", &["ADAM", "EWA"])
            .place("KONIN", &["EWA", "ADAM"]);
        let report = FrontierEngine::new(&oracle).run(&seeds(&["ADAM"], &[])).await;

        assert_eq!(report.people, set(&["ADAM", "EWA"]));
        assert_eq!(report.places, set(&["KONIN", "LUBLIN"]));
        assert_eq!(oracle.call_count(), 4);
    }

    #[tokio::test]
    async fn test_reaches_entities_from_place_seed() {
        // Chain alternates kinds four times; every hop must be found.
        let oracle = FakeOracle::new()
            .place("ELBLAG", &["GABRIEL"])
            .person("GABRIEL", &["FROMBORK"])
            .place("FROMBORK", &["AZAZEL"])
            .person("AZAZEL", &["GRUDZIADZ"]);
        let report = FrontierEngine::new(&oracle).run(&seeds(&[], &["Elbląg"])).await;

        assert_eq!(report.people, set(&["AZAZEL", "GABRIEL"]));
        assert_eq!(report.places, set(&["ELBLAG", "FROMBORK", "GRUDZIADZ"]));
        assert_eq!(report.place_order, vec!["ELBLAG", "FROMBORK", "GRUDZIADZ"]);
        // GRUDZIADZ is unknown to the oracle but still processed once
        assert_eq!(report.stats.not_found, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_not_fatal() {
        let oracle = FakeOracle::new()
            .person("ADAM", &["KRAKOW", "WARSZAWA"])
            .place("WARSZAWA", &["RAFAL"])
            .person("RAFAL", &[])
            .failing("KRAKOW");
        let report = FrontierEngine::new(&oracle).run(&seeds(&["ADAM"], &[])).await;

        assert_eq!(report.stats.transient_failures, 1);
        assert!(report.places.contains("KRAKOW"));
        assert!(report.people.contains("RAFAL"));
        assert_eq!(oracle.calls_for(EntityKind::Place, "KRAKOW"), 1);
    }

    #[tokio::test]
    async fn test_resubmitting_processed_entity_is_noop() {
        let oracle = FakeOracle::new().person("ADAM", &[]);
        let engine = FrontierEngine::new(&oracle);
        let mut state = FrontierState::seeded(&seeds(&["ADAM"], &[]));
        engine.expand(&mut state).await;
        assert_eq!(oracle.call_count(), 1);

        assert!(!state.submit(Entity::person("Adam")));
        assert_eq!(state.pending(), 0);
        engine.expand(&mut state).await;
        assert_eq!(oracle.call_count(), 1);
    }

    #[test]
    fn test_duplicate_seeds_enqueued_once() {
        let mut state =
            FrontierState::seeded(&seeds(&["Barbara", "BARBARA Zawadzka"], &["Kraków", "KRAKOW"]));
        assert_eq!(state.pending(), 2);
        assert!(!state.submit(Entity::person("barbara")));
        assert!(!state.submit(Entity::place("")));
    }

    #[tokio::test]
    async fn test_phase_transitions() {
        let oracle = FakeOracle::new();
        let mut state = FrontierState::seeded(&seeds(&["ADAM"], &[]));
        assert_eq!(state.phase(), FrontierPhase::Idle);
        FrontierEngine::new(&oracle).expand(&mut state).await;
        assert_eq!(state.phase(), FrontierPhase::Fixpoint);
        assert_eq!(state.stats().not_found, 1);
    }

    #[tokio::test]
    async fn test_empty_seeds_make_no_calls() {
        let oracle = FakeOracle::new();
        let report = FrontierEngine::new(&oracle).run(&Seeds::default()).await;
        assert!(report.people.is_empty());
        assert!(report.places.is_empty());
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_sightings_from_both_directions() {
        let oracle = FakeOracle::new()
            .person("ADAM", &["KONIN"])
            .place("KONIN", &["BARBARA"])
            .person("BARBARA", &["LUBLIN"]);
        let report = FrontierEngine::new(&oracle).run(&seeds(&["ADAM"], &[])).await;

        assert_eq!(report.places_of("ADAM"), vec!["KONIN"]);
        assert_eq!(report.places_of("BARBARA"), vec!["KONIN", "LUBLIN"]);
        assert!(report.places_of("NOBODY").is_empty());
        assert_eq!(report.relations().len(), 3);
    }

    #[tokio::test]
    async fn test_oracle_results_are_normalized() {
        let oracle = FakeOracle::new()
            .person("RAFAL", &["Grudziądz"])
            .place("GRUDZIADZ", &["Rafał Bomba"]);
        let report = FrontierEngine::new(&oracle).run(&seeds(&["Rafał"], &[])).await;

        assert_eq!(report.people, set(&["RAFAL"]));
        assert_eq!(report.places, set(&["GRUDZIADZ"]));
        assert_eq!(oracle.call_count(), 2);
    }
}
