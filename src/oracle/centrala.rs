use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::{AnswerSink, EntityOracle, Lookup, RelationalSource, ReportAck};
use crate::entity::{normalize, ConnectionRecord, EntityKind, PersonRecord};
use crate::error::{Result, TraceError};

/// Request body for `/people` and `/places`
#[derive(Serialize)]
struct LookupRequest<'a> {
    apikey: &'a str,
    query: &'a str,
}

/// Response body for `/people` and `/places`
#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Value,
}

/// Request body for `/apidb`
#[derive(Serialize)]
struct DatabaseRequest<'a> {
    task: &'a str,
    apikey: &'a str,
    query: &'a str,
}

/// Response body for `/apidb`
#[derive(Deserialize)]
struct DatabaseResponse {
    #[serde(default)]
    reply: Value,
    #[serde(default)]
    error: String,
}

/// Request body for `/report`
#[derive(Serialize)]
struct ReportRequest<'a> {
    task: &'a str,
    apikey: &'a str,
    answer: Value,
}

/// HTTP client for the grading service ("centrala").
///
/// Serves as the person/place oracle, the relational source for the
/// materialized graph, and the answer sink.
pub struct CentralaClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl CentralaClient {
    /// Create a new client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in normal operation)
    pub fn new(base_url: Url, api_key: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        // Url::join replaces the last segment unless the base ends with '/'
        let base_url = if base_url.path().ends_with('/') {
            base_url
        } else {
            let mut with_slash = base_url;
            let path = format!("{}/", with_slash.path());
            with_slash.set_path(&path);
            with_slash
        };

        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TraceError::InvalidInput(format!("Bad endpoint path {}: {}", path, e)))
    }

    /// Download a text resource relative to the base URL (e.g. `dane/barbara.txt`).
    pub async fn fetch_text(&self, path: &str) -> Result<String> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TraceError::Http(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TraceError::Http(format!("GET {} returned {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| TraceError::Http(format!("Failed to read {}: {}", url, e)))
    }

    async fn lookup(&self, path: &str, key: &str, related_kind: EntityKind) -> Result<Lookup> {
        let url = self.endpoint(path)?;
        let request = LookupRequest {
            apikey: &self.api_key,
            query: key,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TraceError::Oracle(format!("Network error querying {}: {}", key, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(TraceError::Oracle(format!(
                "/{} returned {} for {}: {}",
                path, status, key, body
            )));
        }

        let parsed: LookupResponse = response
            .json()
            .await
            .map_err(|e| {
                TraceError::Oracle(format!("Failed to parse response for {}: {}", key, e))
            })?;

        if parsed.code != 0 {
            log::debug!("/{} reported code {} for {}", path, parsed.code, key);
            return Ok(Lookup::NotFound);
        }

        let keys = match parsed.message {
            Value::String(ref message) => parse_message_keys(message, related_kind),
            _ => Vec::new(),
        };

        if keys.is_empty() {
            Ok(Lookup::NotFound)
        } else {
            Ok(Lookup::Found(keys))
        }
    }

    async fn query_database(&self, query: &str) -> Result<Vec<Value>> {
        let url = self.endpoint("apidb")?;
        let request = DatabaseRequest {
            task: "database",
            apikey: &self.api_key,
            query,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                TraceError::BulkLoad(format!("Network error running '{}': {}", query, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TraceError::BulkLoad(format!(
                "'{}' returned HTTP {}",
                query, status
            )));
        }

        let parsed: DatabaseResponse = response
            .json()
            .await
            .map_err(|e| {
                TraceError::BulkLoad(format!("Failed to parse reply to '{}': {}", query, e))
            })?;

        if parsed.error != "OK" {
            return Err(TraceError::BulkLoad(format!(
                "'{}' failed: {}",
                query, parsed.error
            )));
        }

        match parsed.reply {
            Value::Array(rows) => Ok(rows),
            other => Err(TraceError::BulkLoad(format!(
                "'{}' returned a non-list reply: {}",
                query, other
            ))),
        }
    }
}

/// Split an oracle message into normalized keys, dropping restricted-data markers.
fn parse_message_keys(message: &str, kind: EntityKind) -> Vec<String> {
    message
        .split_whitespace()
        .filter(|token| !token.contains("**"))
        .map(|token| normalize(token, kind))
        .filter(|key| !key.is_empty())
        .collect()
}

/// Ids arrive either as JSON numbers or numeric strings.
fn id_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn person_from_row(row: &Value) -> Result<PersonRecord> {
    let id = row
        .get("id")
        .and_then(id_from_value)
        .ok_or_else(|| TraceError::BulkLoad(format!("User row without id: {}", row)))?;
    let name = row
        .get("username")
        .or_else(|| row.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| TraceError::BulkLoad(format!("User row without username: {}", row)))?;
    Ok(PersonRecord {
        id,
        name: name.to_string(),
    })
}

fn connection_from_row(row: &Value) -> Result<ConnectionRecord> {
    let source_id = row.get("user1_id").and_then(id_from_value);
    let target_id = row.get("user2_id").and_then(id_from_value);
    match (source_id, target_id) {
        (Some(source_id), Some(target_id)) => Ok(ConnectionRecord {
            source_id,
            target_id,
        }),
        _ => Err(TraceError::BulkLoad(format!("Malformed connection row: {}", row))),
    }
}

#[async_trait]
impl EntityOracle for CentralaClient {
    async fn lookup_person(&self, key: &str) -> Result<Lookup> {
        self.lookup("people", key, EntityKind::Place).await
    }

    async fn lookup_place(&self, key: &str) -> Result<Lookup> {
        self.lookup("places", key, EntityKind::Person).await
    }
}

#[async_trait]
impl RelationalSource for CentralaClient {
    async fn load_all_persons(&self) -> Result<Vec<PersonRecord>> {
        let rows = self.query_database("SELECT * FROM users").await?;
        rows.iter().map(person_from_row).collect()
    }

    async fn load_all_connections(&self) -> Result<Vec<ConnectionRecord>> {
        let rows = self.query_database("SELECT * FROM connections").await?;
        rows.iter().map(connection_from_row).collect()
    }
}

#[async_trait]
impl AnswerSink for CentralaClient {
    async fn submit_answer(&self, task: &str, answer: Value) -> Result<ReportAck> {
        let url = self.endpoint("report")?;
        let request = ReportRequest {
            task,
            apikey: &self.api_key,
            answer,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TraceError::Report(format!("Network error: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response".to_string());

        if !status.is_success() {
            return Err(TraceError::Report(format!("Report rejected {}: {}", status, body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| TraceError::Report(format!("Failed to parse ack '{}': {}", body, e)))
    }
}
