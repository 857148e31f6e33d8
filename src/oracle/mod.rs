//! Collaborator interfaces consumed by the traversal engines.
//!
//! The engines only see these traits; `CentralaClient` and `OpenAiExtractor`
//! are the network-backed implementations used by the binaries.

mod centrala;
mod openai;

pub use centrala::CentralaClient;
pub use openai::OpenAiExtractor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entity::{ConnectionRecord, PersonRecord, Seeds};
use crate::Result;

/// Answer of a single oracle query. Errors are reported through `Err` and
/// treated by the frontier engine as "no new relations".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Related keys, in the order the oracle returned them.
    Found(Vec<String>),
    NotFound,
}

impl Lookup {
    /// Related keys, empty for `NotFound`.
    pub fn related(&self) -> &[String] {
        match self {
            Lookup::Found(keys) => keys,
            Lookup::NotFound => &[],
        }
    }
}

/// Person -> places and place -> people queries.
#[async_trait]
pub trait EntityOracle: Send + Sync {
    async fn lookup_person(&self, key: &str) -> Result<Lookup>;
    async fn lookup_place(&self, key: &str) -> Result<Lookup>;
}

/// Bulk source of person and connection rows for the materialized graph.
#[async_trait]
pub trait RelationalSource: Send + Sync {
    async fn load_all_persons(&self) -> Result<Vec<PersonRecord>>;
    async fn load_all_connections(&self) -> Result<Vec<ConnectionRecord>>;
}

/// Extracts the initial people and places from free text.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn fetch_initial_entities(&self, source_text: &str) -> Result<Seeds>;
}

/// Acknowledgement returned by the grading service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAck {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Final answer delivery. A single attempt; callers log failures.
#[async_trait]
pub trait AnswerSink: Send + Sync {
    async fn submit_answer(&self, task: &str, answer: serde_json::Value) -> Result<ReportAck>;
}
