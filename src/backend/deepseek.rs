//! DeepSeek chat/completions batch backend.
//! Connection pooling via reqwest, simple token-bucket rate limiting, compact
//! JSON prompts. Retry is layered on top via `RetryingBackend`.

use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{BackendError, BatchItem, TranslationBackend};

/// System prompt kept short: the whole contract is "JSON array in, JSON array
/// out, same order and length".
const SYSTEM_PROMPT: &str = "You are a translator. The user sends a JSON array of items; \
each has \"t\" (text) and may have \"d\" (description), \"m\" (meaning) and \"g\" \
(glossary: term to instruction). Reply with only a JSON array of translated strings, \
same order and length as the input.";

/// DeepSeek chat/completions client translating one batch per request.
pub struct DeepSeekBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    /// Simple token-bucket: tracks the next allowed request time.
    next_allowed: tokio::sync::Mutex<Instant>,
    /// Minimum interval between requests (100ms = 10 req/s).
    min_interval: Duration,
}

impl DeepSeekBackend {
    pub fn new(api_key: impl Into<String>) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: "https://api.deepseek.com".into(),
            model: "deepseek-chat".into(),
            next_allowed: tokio::sync::Mutex::new(Instant::now()),
            min_interval: Duration::from_millis(100),
        })
    }

    /// Create a client with the key from `DEEPSEEK_API_KEY`.
    pub fn from_env() -> Result<Self, BackendError> {
        let api_key = std::env::var("DEEPSEEK_API_KEY").map_err(|_| {
            BackendError::Transport("DEEPSEEK_API_KEY environment variable not set".into())
        })?;
        Self::new(api_key)
    }

    /// Point the client at a different endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Wait until the rate limiter allows a request.
    async fn rate_limit_wait(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep(*next - now).await;
        }
        *next = Instant::now() + self.min_interval;
    }
}

impl TranslationBackend for DeepSeekBackend {
    fn translate_batch<'a>(
        &'a self,
        items: &'a [BatchItem],
        from: &'a str,
        to: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, BackendError>> {
        Box::pin(async move {
            if items.is_empty() {
                return Ok(Vec::new());
            }

            self.rate_limit_wait().await;

            let body = json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": build_user_prompt(items, from, to)}
                ],
                "max_tokens": estimate_max_tokens(items),
                "temperature": 0.1
            });

            let start = Instant::now();
            let response = self
                .http
                .post(format!("{}/v1/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
                .map_err(|e| BackendError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body_text = response.text().await.unwrap_or_default();
                return Err(BackendError::status(
                    status.as_u16(),
                    body_text.chars().take(200).collect::<String>(),
                ));
            }

            let completion: Completion = response
                .json()
                .await
                .map_err(|e| BackendError::Malformed(e.to_string()))?;
            let content = completion
                .choices
                .first()
                .map(|c| c.message.content.as_str())
                .ok_or_else(|| BackendError::Malformed("no choices in completion".into()))?;

            let translations = parse_translation_list(content)?;
            debug!(
                requested = items.len(),
                returned = translations.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "batch translated"
            );
            Ok(translations)
        })
    }

    fn dispose(&self) {
        // reqwest pools close on drop; nothing else to release.
        info!("deepseek backend disposed");
    }
}

/// Build the compact user prompt: a JSON array of
/// `{"t": text, "d"?: description, "m"?: meaning, "g"?: {term: instruction}}`.
fn build_user_prompt(items: &[BatchItem], from: &str, to: &str) -> String {
    let rendered: Vec<Value> = items
        .iter()
        .map(|item| {
            let mut obj = serde_json::Map::new();
            obj.insert("t".into(), Value::String(item.content.clone()));
            if let Some(ctx) = &item.context {
                if let Some(d) = &ctx.description {
                    obj.insert("d".into(), Value::String(d.clone()));
                }
                if let Some(m) = &ctx.meaning {
                    obj.insert("m".into(), Value::String(m.clone()));
                }
                if !ctx.glossary.is_empty() {
                    let glossary: serde_json::Map<String, Value> = ctx
                        .glossary
                        .iter()
                        .map(|e| (e.term.clone(), Value::String(e.instruction.clone())))
                        .collect();
                    obj.insert("g".into(), Value::Object(glossary));
                }
            }
            Value::Object(obj)
        })
        .collect();

    format!(
        "Translate from {from} to {to}: {}",
        Value::Array(rendered)
    )
}

/// Parse the model reply as a JSON array of strings, tolerating markdown
/// code fences around it.
fn parse_translation_list(content: &str) -> Result<Vec<String>, BackendError> {
    let trimmed = content.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    let value: Value = serde_json::from_str(stripped)
        .map_err(|e| BackendError::Malformed(format!("reply is not JSON: {e}")))?;
    let array = value
        .as_array()
        .ok_or_else(|| BackendError::Malformed("reply is not a JSON array".into()))?;

    array
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| BackendError::Malformed("array element is not a string".into()))
        })
        .collect()
}

/// Estimate max_tokens for the whole batch: ~3 chars/token input with 15%
/// headroom plus a per-item constant, capped.
fn estimate_max_tokens(items: &[BatchItem]) -> u32 {
    let input_chars: usize = items.iter().map(|i| i.content.len()).sum();
    let estimated = (input_chars as f64 / 3.0 * 1.15) as u32 + 32 * items.len() as u32;
    estimated.clamp(64, 4096)
}

// --- wire types ---

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}
