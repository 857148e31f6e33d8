//! Last-sighting answer selection.
//!
//! After exploration, each candidate place is queried again in a fixed order
//! and the last one currently listing the target is taken as the answer.
//! This is an order-dependent heuristic, not a "most recent" guarantee.

use serde::Serialize;

use crate::entity::{normalize_person, normalize_place};
use crate::oracle::{EntityOracle, Lookup};

use super::FrontierReport;

/// Outcome of one candidate scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SightingScan {
    /// Candidates reporting the target, in scan order.
    pub sightings: Vec<String>,
    pub answer: Option<String>,
}

/// Scans candidate places in order; the last place reporting the target wins.
#[derive(Debug, Clone)]
pub struct LastSightingPolicy {
    candidates: Vec<String>,
}

impl LastSightingPolicy {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys: Vec<String> = Vec::new();
        for candidate in candidates {
            let key = normalize_place(candidate.as_ref());
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        Self { candidates: keys }
    }

    /// Use the configured list, or the traversal's expansion order when it is empty.
    pub fn for_report(configured: &[String], report: &FrontierReport) -> Self {
        if configured.is_empty() {
            Self::new(&report.place_order)
        } else {
            Self::new(configured)
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub async fn select(&self, oracle: &dyn EntityOracle, target: &str) -> SightingScan {
        let target = normalize_person(target);
        let mut scan = SightingScan::default();

        for place in &self.candidates {
            match oracle.lookup_place(place).await {
                Ok(Lookup::Found(people)) => {
                    let present = people.iter().any(|p| normalize_person(p) == target);
                    log::info!("scan: {} -> {:?}", place, people);
                    if present {
                        scan.sightings.push(place.clone());
                    }
                }
                Ok(Lookup::NotFound) => log::debug!("scan: {} has no visitors", place),
                Err(e) => log::warn!("scan: {} failed, skipping: {}", place, e),
            }
        }

        scan.answer = scan.sightings.last().cloned();
        log::info!("scan: {} path {}", target, scan.sightings.join(" -> "));
        scan
    }
}
