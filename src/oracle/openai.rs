use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::EntityExtractor;
use crate::entity::Seeds;
use crate::error::{Result, TraceError};

const EXTRACTION_PROMPT: &str = "Extract names of people and cities from the text. Important rules:\n\
1. Use only capital ASCII letters (A-Z)\n\
2. Replace Polish letters: Ą->A, Ę->E, Ł->L, Ó->O, Ś->S, Ż/Ź->Z, Ć->C, Ń->N\n\
3. For people, use only first names\n\
4. Format response exactly as: {\"people\": [\"NAME1\", \"NAME2\"], \"cities\": [\"CITY1\", \"CITY2\"]}";

/// Request structure for the chat completions API
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response structure from the chat completions API
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-backed seed extraction.
///
/// Retries rate-limit and server errors with exponential backoff.
pub struct OpenAiExtractor {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_retries: usize,
}

impl OpenAiExtractor {
    /// Create a new extractor
    ///
    /// # Panics
    ///
    /// Panics if HTTP client cannot be created (should not happen in normal operation)
    pub fn new(api_key: String, model: String, base_url: String, max_retries: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        }
    }

    async fn complete(&self, text: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: EXTRACTION_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| TraceError::Extraction(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(TraceError::Extraction(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| TraceError::Extraction(format!("Failed to parse response: {}", e)))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TraceError::Extraction("Empty response from OpenAI API".to_string()))
    }

    async fn complete_with_retry(&self, text: &str) -> Result<String> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.complete(text).await {
                Ok(content) => return Ok(content),
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    log::warn!(
                        "extract: retry {}/{} after error: {}",
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_retryable(err: &TraceError) -> bool {
    let msg = err.to_string();
    ["429", "500", "502", "503", "504"]
        .iter()
        .any(|code| msg.contains(code))
}

/// Parse the model's JSON answer, tolerating a surrounding ```json fence.
fn parse_seeds(content: &str) -> Result<Seeds> {
    let fence = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("Invalid regex pattern");
    let json = fence
        .captures(content)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| content.trim());

    serde_json::from_str(json).map_err(|e| {
        TraceError::Extraction(format!("Model returned invalid JSON ({}): {}", e, json))
    })
}

#[async_trait]
impl EntityExtractor for OpenAiExtractor {
    async fn fetch_initial_entities(&self, source_text: &str) -> Result<Seeds> {
        let content = self.complete_with_retry(source_text).await?;
        let seeds = parse_seeds(&content)?.normalized();
        log::info!(
            "extract: {} people, {} places",
            seeds.people.len(),
            seeds.places.len()
        );
        Ok(seeds)
    }
}
