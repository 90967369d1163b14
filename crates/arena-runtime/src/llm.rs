//! LLM backend contract and an OpenAI-compatible reference implementation.
//!
//! [`LlmBackend`] is deliberately narrow: the core does not assume any
//! particular serving stack, only that it can turn a prompt (and, for tool
//! use, a tool list) into a [`GenerationResult`]. [`HttpBackend`] is the one
//! implementation this crate ships, talking to a `/v1/chat/completions`
//! endpoint such as [Ollama](https://ollama.com) (`http://localhost:11434`).
//!
//! # Cost control
//!
//! [`HttpBackend`] carries forward the same built-in safeguards against
//! runaway API spend as the OODA-loop driver it is descended from:
//!
//! * a [`governor`]-backed token-bucket rate limiter
//!   ([`HttpBackend::DEFAULT_RPM`] requests per minute by default),
//! * a cumulative token-budget circuit breaker
//!   ([`HttpBackend::DEFAULT_TOKEN_BUDGET`] tokens by default), and
//! * a TLS/localhost-only endpoint check that rejects plaintext `http://`
//!   connections to any non-loopback host.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arena_types::Decision;
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Anti-loop rules appended to every system-role message sent to a backend,
/// so the model is nudged away from repeating a failing action forever.
pub const STABILITY_GUIDELINES: &str = "\
## Stability Guidelines (anti-loop rules)
- Do not repeat the same action more than 3 times in a row.
- If an action fails, try a different approach rather than retrying immediately.
- Vary your strategy when the previous actions have not produced progress.
- When stuck, prefer \"idle\" over repeating a decision that has not helped.";

/// Why a generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Error,
}

/// What a backend returns for one generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub tokens_used: u64,
    pub finish_reason: FinishReason,
    /// Backend-specific extras. May carry a native `tool_call` or a
    /// `parsed_tool_call` the backend already extracted (see [`crate::parsing`]).
    #[serde(default)]
    pub metadata: Map<String, serde_json::Value>,
}

/// The role of a participant in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// An external LLM collaborator. The core places no requirements on how it is
/// hosted — llama.cpp, vLLM, and HTTP-based hosted APIs are all valid.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<GenerationResult, LlmError>;

    async fn generate_with_tools(
        &self,
        prompt: &str,
        tools: &[arena_types::ToolSchema],
        temperature: Option<f32>,
    ) -> Result<GenerationResult, LlmError>;

    fn is_available(&self) -> bool;

    fn unload(&self) {}
}

/// Errors that can arise from [`LlmBackend`] operations.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response format: {0}")]
    BadResponse(String),
    #[error("LLM rate limit exceeded: too many requests per minute")]
    RateLimitExceeded,
    #[error("LLM token budget exceeded: {used} tokens used, budget is {budget}")]
    BudgetExceeded { used: u64, budget: u64 },
    #[error("insecure endpoint: '{0}' uses http:// for a non-localhost host; use https://")]
    InsecureEndpoint(String),
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: serde_json::Value,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// An async client for an OpenAI-compatible `/v1/chat/completions` endpoint.
///
/// Construct once and reuse across ticks.
pub struct HttpBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
    total_tokens: Arc<AtomicU64>,
    token_budget: u64,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl HttpBackend {
    pub const DEFAULT_RPM: u32 = 20;
    pub const DEFAULT_TOKEN_BUDGET: u64 = 100_000;

    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_limits(base_url, model, Self::DEFAULT_RPM, Self::DEFAULT_TOKEN_BUDGET)
    }

    pub fn with_budget(
        base_url: impl Into<String>,
        model: impl Into<String>,
        token_budget: u64,
    ) -> Self {
        Self::with_limits(base_url, model, Self::DEFAULT_RPM, token_budget)
    }

    pub fn with_rpm(base_url: impl Into<String>, model: impl Into<String>, rpm: u32) -> Self {
        Self::with_limits(base_url, model, rpm, Self::DEFAULT_TOKEN_BUDGET)
    }

    /// `rpm` of `0` is clamped to `1`: the underlying rate limiter panics on a
    /// zero quota.
    pub fn with_limits(
        base_url: impl Into<String>,
        model: impl Into<String>,
        rpm: u32,
        token_budget: u64,
    ) -> Self {
        let rpm = rpm.max(1);
        let quota = Quota::per_minute(NonZeroU32::new(rpm).expect("rpm is >= 1 after clamp"));
        let rate_limiter = Arc::new(RateLimiter::direct(quota));
        let client = reqwest::ClientBuilder::new()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()
            .expect("failed to build reqwest client with TLS 1.2 minimum");
        HttpBackend {
            base_url: base_url.into(),
            model: model.into(),
            client,
            total_tokens: Arc::new(AtomicU64::new(0)),
            token_budget,
            rate_limiter,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens.load(Ordering::Relaxed)
    }

    pub fn reset_token_counter(&self) {
        self.total_tokens.store(0, Ordering::Relaxed);
    }

    pub fn token_budget(&self) -> u64 {
        self.token_budget
    }

    #[instrument(
        name = "llm.complete",
        skip(self, messages),
        fields(
            model = %self.model,
            tokens_used_before = %self.total_tokens.load(Ordering::Relaxed),
            prompt_tokens = tracing::field::Empty,
            reply_tokens = tracing::field::Empty,
            tokens_used_after = tracing::field::Empty,
            inference_latency_ms = tracing::field::Empty,
        )
    )]
    async fn complete(&self, messages: &[ChatMessage]) -> Result<GenerationResult, LlmError> {
        if !Self::is_secure_url(&self.base_url) {
            return Err(LlmError::InsecureEndpoint(self.base_url.clone()));
        }

        let used = self.total_tokens.load(Ordering::Relaxed);
        if used >= self.token_budget {
            return Err(LlmError::BudgetExceeded {
                used,
                budget: self.token_budget,
            });
        }

        if self.rate_limiter.check().is_err() {
            return Err(LlmError::RateLimitExceeded);
        }

        let mut augmented: Vec<ChatMessage> = messages
            .iter()
            .map(|m| {
                if m.role == Role::System {
                    ChatMessage {
                        role: Role::System,
                        content: format!("{}\n\n{}", m.content, STABILITY_GUIDELINES),
                    }
                } else {
                    m.clone()
                }
            })
            .collect();
        if !augmented.iter().any(|m| m.role == Role::System) {
            augmented.insert(
                0,
                ChatMessage {
                    role: Role::System,
                    content: STABILITY_GUIDELINES.to_string(),
                },
            );
        }

        let url = format!("{}/v1/chat/completions", self.base_url);
        let schema =
            serde_json::to_value(schema_for!(Decision)).unwrap_or(serde_json::Value::Null);
        let body = ChatRequest {
            model: &self.model,
            messages: &augmented,
            stream: false,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: schema,
            },
        };

        let inference_start = Instant::now();
        let response: ChatResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let inference_latency_ms = inference_start.elapsed().as_millis() as u64;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))?;
        let reply = choice.message.content;
        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            Some("stop") | None => FinishReason::Stop,
            Some(_) => FinishReason::Stop,
        };

        let prompt_tokens: u64 = augmented.iter().map(|m| Self::estimate_tokens(&m.content)).sum();
        let reply_tokens = Self::estimate_tokens(&reply);
        let new_total = self
            .total_tokens
            .fetch_add(prompt_tokens + reply_tokens, Ordering::Relaxed)
            + prompt_tokens
            + reply_tokens;

        let span = tracing::Span::current();
        span.record("prompt_tokens", prompt_tokens);
        span.record("reply_tokens", reply_tokens);
        span.record("tokens_used_after", new_total);
        span.record("inference_latency_ms", inference_latency_ms);
        debug!(
            model = %self.model,
            prompt_tokens,
            reply_tokens,
            tokens_used_after = new_total,
            inference_latency_ms,
            "LLM inference complete"
        );
        if new_total >= self.token_budget {
            warn!(
                tokens_used = new_total,
                budget = self.token_budget,
                "token budget reached or exceeded; further requests may be rejected"
            );
        }

        Ok(GenerationResult {
            text: reply,
            tokens_used: prompt_tokens + reply_tokens,
            finish_reason,
            metadata: Map::new(),
        })
    }

    /// A URL is safe without further TLS enforcement when it uses `https://`,
    /// or `http://` against a loopback host (`localhost`, `127.0.0.1`, `::1`).
    pub(crate) fn is_secure_url(url: &str) -> bool {
        if url.starts_with("https://") {
            return true;
        }
        if let Some(without_scheme) = url.strip_prefix("http://") {
            let host_port = without_scheme.split('/').next().unwrap_or("");
            let host = if host_port.starts_with('[') {
                match host_port.find(']') {
                    Some(close) => &host_port[1..close],
                    None => return false,
                }
            } else if let Some(idx) = host_port.rfind(':') {
                &host_port[..idx]
            } else {
                host_port
            };
            return matches!(host, "localhost" | "127.0.0.1" | "::1");
        }
        false
    }

    /// `ceil(words * 1.3)`, computed as integer arithmetic to avoid float
    /// conversion: approximates BPE tokenisation closely enough for budget
    /// enforcement without a tokenizer dependency.
    fn estimate_tokens(text: &str) -> u64 {
        let words = text.split_whitespace().count() as u64;
        (words * 13).div_ceil(10)
    }
}

#[async_trait]
impl LlmBackend for HttpBackend {
    async fn generate(
        &self,
        prompt: &str,
        _temperature: Option<f32>,
        _max_tokens: Option<u32>,
    ) -> Result<GenerationResult, LlmError> {
        self.complete(&[ChatMessage {
            role: Role::User,
            content: prompt.to_string(),
        }])
        .await
    }

    async fn generate_with_tools(
        &self,
        prompt: &str,
        tools: &[arena_types::ToolSchema],
        _temperature: Option<f32>,
    ) -> Result<GenerationResult, LlmError> {
        let tool_list = tools
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n");
        let content = if tool_list.is_empty() {
            prompt.to_string()
        } else {
            format!("{prompt}\n\nAvailable tools:\n{tool_list}")
        };
        self.complete(&[ChatMessage {
            role: Role::User,
            content,
        }])
        .await
    }

    fn is_available(&self) -> bool {
        Self::is_secure_url(&self.base_url)
    }
}
