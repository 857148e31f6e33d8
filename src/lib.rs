pub mod config;
pub mod error;
pub mod db;
pub mod entity;
pub mod oracle;
pub mod traversal;
pub mod runner;
pub mod setup;

pub use config::Config;
pub use error::{TraceError, Result};
pub use entity::{normalize, Entity, EntityKind, Relation, Seeds};
pub use traversal::{TraceOutcome, TraversalMode, TraversalStrategy};
