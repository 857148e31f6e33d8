//! Entity model shared by both traversal strategies.
//!
//! People and places are identified by normalized keys in frontier mode and
//! by raw display names in the materialized graph.

mod normalize;

pub use normalize::{normalize, normalize_person, normalize_place};

use serde::{Deserialize, Serialize};

/// The two kinds of node in the person/place network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Person,
    Place,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Person => write!(f, "person"),
            EntityKind::Place => write!(f, "place"),
        }
    }
}

/// A named node. `key` is already normalized for its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub key: String,
}

impl Entity {
    pub fn person(raw: &str) -> Self {
        Self {
            kind: EntityKind::Person,
            key: normalize_person(raw),
        }
    }

    pub fn place(raw: &str) -> Self {
        Self {
            kind: EntityKind::Place,
            key: normalize_place(raw),
        }
    }
}

/// Kind of association between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Person was reported at a place.
    SeenAt,
    /// Person knows another person.
    Knows,
}

/// An undirected association discovered lazily or loaded in bulk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub kind: RelationKind,
    pub from: String,
    pub to: String,
}

impl Relation {
    pub fn seen_at(person: &str, place: &str) -> Self {
        Self {
            kind: RelationKind::SeenAt,
            from: person.to_string(),
            to: place.to_string(),
        }
    }

    pub fn knows(a: &str, b: &str) -> Self {
        Self {
            kind: RelationKind::Knows,
            from: a.to_string(),
            to: b.to_string(),
        }
    }
}

/// Seed entities handed to the frontier engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seeds {
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default, alias = "cities")]
    pub places: Vec<String>,
}

impl Seeds {
    /// Normalize every name and drop empty keys.
    pub fn normalized(&self) -> Self {
        Self {
            people: self
                .people
                .iter()
                .map(|p| normalize_person(p))
                .filter(|k| !k.is_empty())
                .collect(),
            places: self
                .places
                .iter()
                .map(|p| normalize_place(p))
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

/// A person row from the relational source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: i64,
    pub name: String,
}

/// A connection row from the relational source. Stored once, traversed both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub source_id: i64,
    pub target_id: i64,
}
