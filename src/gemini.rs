use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::models::PromptPayload;
use crate::prompt::{ASPECT_RATIO, IMAGE_SIZE_TIER};

const TEXT_TEMPERATURE: f64 = 0.95;
const TEXT_MAX_OUTPUT_TOKENS: u32 = 1024;

/// Why a single attempt did not produce a usable payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("service unavailable (503): {0}")]
    ServiceUnavailable(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no candidates returned")]
    NoCandidates,
    #[error("no inline media in response")]
    MissingMedia,
    #[error("no text in response")]
    MissingText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome<T> {
    Success(T),
    RetryableFailure(FailureReason),
    TerminalFailure(FailureReason),
}

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("gave up after {attempts} attempt(s): {reason}")]
    RetriesExhausted { attempts: u32, reason: FailureReason },
    #[error("terminal failure on attempt {attempt}: {reason}")]
    Terminal { attempt: u32, reason: FailureReason },
}

impl GeminiError {
    pub fn attempts(&self) -> u32 {
        match self {
            GeminiError::RetriesExhausted { attempts, .. } => *attempts,
            GeminiError::Terminal { attempt, .. } => *attempt,
        }
    }

    pub fn reason(&self) -> &FailureReason {
        match self {
            GeminiError::RetriesExhausted { reason, .. } | GeminiError::Terminal { reason, .. } => reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Image,
    Text,
}

impl GenerationKind {
    fn label(&self) -> &'static str {
        match self {
            GenerationKind::Image => "image",
            GenerationKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

/// The single network seam: POST a JSON body with a bearer credential.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, url: &str, bearer: &str, body: &Value) -> Result<TransportResponse, TransportError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Other(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, bearer: &str, body: &Value) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        Ok(TransportResponse { status, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn single_attempt() -> Self {
        Self { max_attempts: 1, retry_delay: Duration::ZERO }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, retry_delay: Duration::from_secs(2) }
    }
}

#[derive(Debug, Clone)]
pub struct InvokerConfig {
    pub base_url: String,
    pub api_key: String,
    pub image_model: String,
    pub text_model: String,
    pub image_timeout: Duration,
    pub text_timeout: Duration,
    pub image_retry: RetryPolicy,
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 {
                            *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn content_parts(payload: &PromptPayload) -> Vec<Value> {
    let mut parts = vec![json!({ "text": payload.instruction_text })];
    parts.extend(payload.parts.iter().map(|part| {
        json!({
            "inline_data": {
                "mime_type": part.mime_type.as_str(),
                "data": base64::engine::general_purpose::STANDARD.encode(&part.data),
            }
        })
    }));
    parts
}

pub fn image_request_body(payload: &PromptPayload) -> Value {
    json!({
        "contents": [{ "parts": content_parts(payload) }],
        "generationConfig": {
            "responseModalities": ["IMAGE"],
            "imageConfig": {
                "aspectRatio": ASPECT_RATIO,
                "imageSize": IMAGE_SIZE_TIER,
            }
        }
    })
}

pub fn text_request_body(payload: &PromptPayload) -> Value {
    json!({
        "contents": [{ "parts": content_parts(payload) }],
        "generationConfig": {
            "temperature": TEXT_TEMPERATURE,
            "maxOutputTokens": TEXT_MAX_OUTPUT_TOKENS,
        }
    })
}

type Parser<T> = fn(&str) -> Result<T, FailureReason>;

enum RetryState<T> {
    Attempting { attempt: u32 },
    RetryScheduled { attempt: u32, reason: FailureReason },
    Succeeded(T),
    FailedTerminal(GeminiError),
}

pub struct GeminiClient {
    transport: Arc<dyn Transport>,
    config: InvokerConfig,
}

impl GeminiClient {
    pub fn new(config: InvokerConfig, transport: Arc<dyn Transport>) -> Self {
        Self { transport, config }
    }

    fn endpoint(&self, kind: GenerationKind) -> String {
        let model = match kind {
            GenerationKind::Image => &self.config.image_model,
            GenerationKind::Text => &self.config.text_model,
        };
        format!("{}/models/{}:generateContent", self.config.base_url.trim_end_matches('/'), model)
    }

    fn timeout_for(&self, kind: GenerationKind) -> Duration {
        match kind {
            GenerationKind::Image => self.config.image_timeout,
            GenerationKind::Text => self.config.text_timeout,
        }
    }

    /// Image generation, retried on 503 and timeouts within the configured budget.
    pub async fn generate_image(&self, payload: &PromptPayload) -> Result<Bytes, GeminiError> {
        let body = image_request_body(payload);
        self.invoke(GenerationKind::Image, &body, self.config.image_retry, parse_image_response)
            .await
    }

    /// Caption generation. Exactly one attempt; callers fall back on any error.
    pub async fn generate_text(&self, payload: &PromptPayload) -> Result<String, GeminiError> {
        let body = text_request_body(payload);
        self.invoke(GenerationKind::Text, &body, RetryPolicy::single_attempt(), parse_text_response)
            .await
    }

    async fn invoke<T>(
        &self,
        kind: GenerationKind,
        body: &Value,
        policy: RetryPolicy,
        parse: Parser<T>,
    ) -> Result<T, GeminiError> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut logged = body.clone();
            truncate_base64_in_json(&mut logged);
            debug!(kind = kind.label(), body = %logged, "📤 Request body");
        }

        let max_attempts = policy.max_attempts.max(1);
        let started = Instant::now();
        let mut state = RetryState::Attempting { attempt: 1 };
        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    info!("🎯 {} generation attempt {}/{}", kind.label(), attempt, max_attempts);
                    match self.attempt(kind, body, parse).await {
                        AttemptOutcome::Success(value) => RetryState::Succeeded(value),
                        AttemptOutcome::RetryableFailure(reason) if attempt < max_attempts => {
                            RetryState::RetryScheduled { attempt, reason }
                        }
                        AttemptOutcome::RetryableFailure(reason) => {
                            RetryState::FailedTerminal(GeminiError::RetriesExhausted { attempts: attempt, reason })
                        }
                        AttemptOutcome::TerminalFailure(reason) => {
                            RetryState::FailedTerminal(GeminiError::Terminal { attempt, reason })
                        }
                    }
                }
                RetryState::RetryScheduled { attempt, reason } => {
                    warn!(
                        "🔄 {} attempt {} failed after {:.1}s ({}), retrying in {:?}",
                        kind.label(),
                        attempt,
                        started.elapsed().as_secs_f64(),
                        reason,
                        policy.retry_delay
                    );
                    tokio::time::sleep(policy.retry_delay).await;
                    RetryState::Attempting { attempt: attempt + 1 }
                }
                RetryState::Succeeded(value) => {
                    info!("✅ {} generated in {:.1}s", kind.label(), started.elapsed().as_secs_f64());
                    return Ok(value);
                }
                RetryState::FailedTerminal(err) => {
                    error!(
                        "❌ {} generation failed after {:.1}s: {}",
                        kind.label(),
                        started.elapsed().as_secs_f64(),
                        err
                    );
                    return Err(err);
                }
            };
        }
    }

    /// One attempt under a hard wall-clock timeout. Dropping the in-flight
    /// future on timeout aborts the request.
    pub async fn attempt<T>(&self, kind: GenerationKind, body: &Value, parse: Parser<T>) -> AttemptOutcome<T> {
        let url = self.endpoint(kind);
        let timeout = self.timeout_for(kind);
        let started = Instant::now();

        let call = self.transport.post_json(&url, &self.config.api_key, body);
        let response = match tokio::time::timeout(timeout, call).await {
            Err(_) | Ok(Err(TransportError::Timeout)) => {
                return AttemptOutcome::RetryableFailure(FailureReason::Timeout(timeout));
            }
            Ok(Err(TransportError::Other(msg))) => {
                return AttemptOutcome::TerminalFailure(FailureReason::Transport(msg));
            }
            Ok(Ok(response)) => response,
        };

        info!(
            "📥 {} response in {:.1}s, status: {}",
            kind.label(),
            started.elapsed().as_secs_f64(),
            response.status
        );
        classify_response(response, parse)
    }
}

fn classify_response<T>(response: TransportResponse, parse: Parser<T>) -> AttemptOutcome<T> {
    if response.status == StatusCode::SERVICE_UNAVAILABLE {
        return AttemptOutcome::RetryableFailure(FailureReason::ServiceUnavailable(summarize(&response.body)));
    }
    if !response.status.is_success() {
        return AttemptOutcome::TerminalFailure(FailureReason::Status {
            status: response.status.as_u16(),
            body: summarize(&response.body),
        });
    }
    match parse(&response.body) {
        Ok(value) => AttemptOutcome::Success(value),
        Err(reason) => AttemptOutcome::TerminalFailure(reason),
    }
}

fn summarize(body: &str) -> String {
    const LIMIT: usize = 300;
    if body.chars().count() <= LIMIT {
        return body.to_string();
    }
    let head: String = body.chars().take(LIMIT).collect();
    format!("{head}...")
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    #[allow(dead_code)]
    Other(Value),
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(default, rename = "mimeType", alias = "mime_type")]
    mime_type: String,
}

fn parse_response(body: &str) -> Result<GeminiResponse, FailureReason> {
    let parsed: GeminiResponse =
        serde_json::from_str(body).map_err(|e| FailureReason::Malformed(e.to_string()))?;
    if parsed.candidates.is_empty() {
        return Err(FailureReason::NoCandidates);
    }
    Ok(parsed)
}

fn extract_first_image_b64(resp: &GeminiResponse) -> Option<&InlineData> {
    resp.candidates
        .iter()
        .flat_map(|c| c.content.parts.iter())
        .find_map(|p| match p {
            Part::Inline { inline_data } => Some(inline_data),
            _ => None,
        })
}

fn parse_image_response(body: &str) -> Result<Bytes, FailureReason> {
    let parsed = parse_response(body)?;
    let inline = extract_first_image_b64(&parsed).ok_or(FailureReason::MissingMedia)?;
    info!("🖼️ Found image data with mime type: {}", inline.mime_type);
    base64::engine::general_purpose::STANDARD
        .decode(inline.data.trim())
        .map(Bytes::from)
        .map_err(|e| FailureReason::Malformed(format!("image data is not base64: {e}")))
}

fn parse_text_response(body: &str) -> Result<String, FailureReason> {
    let parsed = parse_response(body)?;
    parsed.candidates[0]
        .content
        .parts
        .iter()
        .find_map(|p| match p {
            Part::Text { text } if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        })
        .ok_or(FailureReason::MissingText)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::models::ImagePart;
    use pretty_assertions::assert_eq;

    fn payload() -> PromptPayload {
        PromptPayload {
            instruction_text: "compose".into(),
            parts: vec![
                ImagePart::jpeg(Bytes::from_static(b"product")),
                ImagePart::png(Bytes::from_static(b"logo")),
            ],
        }
    }

    fn client(transport: Arc<FakeTransport>) -> GeminiClient {
        GeminiClient::new(config(), transport)
    }

    #[tokio::test]
    async fn image_success_on_first_attempt() {
        let transport = FakeTransport::scripted(vec![image_reply(b"png-bytes")]);
        let image = client(transport.clone()).generate_image(&payload()).await.unwrap();
        assert_eq!(image, Bytes::from_static(b"png-bytes"));
        assert_eq!(transport.calls(), 1);

        let (url, bearer, body) = &transport.requests()[0];
        assert_eq!(url, "https://inference.test/v1beta/models/image-model:generateContent");
        assert_eq!(bearer, "test-key");
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "1:1");
        assert_eq!(body["generationConfig"]["imageConfig"]["imageSize"], "1K");
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "compose");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[2]["inline_data"]["mime_type"], "image/png");
    }

    #[tokio::test]
    async fn image_retries_twice_when_every_attempt_is_503() {
        let transport = FakeTransport::scripted(vec![
            Reply::Respond(503, "busy".into()),
            Reply::Respond(503, "busy".into()),
            Reply::Respond(503, "busy".into()),
            image_reply(b"never reached"),
        ]);
        let err = client(transport.clone()).generate_image(&payload()).await.unwrap_err();
        assert_eq!(transport.calls(), 3);
        assert!(matches!(err, GeminiError::RetriesExhausted { attempts: 3, .. }));
        assert!(matches!(err.reason(), FailureReason::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn image_recovers_after_transient_503() {
        let transport = FakeTransport::scripted(vec![Reply::Respond(503, String::new()), image_reply(b"ok")]);
        let image = client(transport.clone()).generate_image(&payload()).await.unwrap();
        assert_eq!(image, Bytes::from_static(b"ok"));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn non_503_error_stops_retrying_immediately() {
        let transport = FakeTransport::scripted(vec![
            Reply::Respond(503, String::new()),
            Reply::Respond(400, "bad request".into()),
            image_reply(b"never reached"),
        ]);
        let err = client(transport.clone()).generate_image(&payload()).await.unwrap_err();
        assert_eq!(transport.calls(), 2);
        assert_eq!(err.attempts(), 2);
        assert!(matches!(
            err,
            GeminiError::Terminal { reason: FailureReason::Status { status: 400, .. }, .. }
        ));
    }

    #[tokio::test]
    async fn success_without_media_is_terminal() {
        let transport = FakeTransport::scripted(vec![text_reply("here is a description instead"), image_reply(b"x")]);
        let err = client(transport.clone()).generate_image(&payload()).await.unwrap_err();
        assert_eq!(transport.calls(), 1);
        assert_eq!(err.reason(), &FailureReason::MissingMedia);
    }

    #[tokio::test]
    async fn empty_candidates_and_garbage_are_terminal() {
        let transport = FakeTransport::scripted(vec![Reply::Respond(200, r#"{"candidates":[]}"#.into())]);
        let err = client(transport).generate_image(&payload()).await.unwrap_err();
        assert_eq!(err.reason(), &FailureReason::NoCandidates);

        let transport = FakeTransport::scripted(vec![Reply::Respond(200, "<html>".into())]);
        let err = client(transport).generate_image(&payload()).await.unwrap_err();
        assert!(matches!(err.reason(), FailureReason::Malformed(_)));
    }

    #[tokio::test]
    async fn snake_case_inline_data_is_accepted() {
        let data = base64::engine::general_purpose::STANDARD.encode(b"jpeg");
        let body = json!({ "candidates": [
            { "content": { "parts": [{ "text": "caption" }] } },
            { "content": { "parts": [{ "inline_data": { "mime_type": "image/jpeg", "data": data } }] } }
        ] });
        let transport = FakeTransport::scripted(vec![Reply::Respond(200, body.to_string())]);
        let image = client(transport).generate_image(&payload()).await.unwrap();
        assert_eq!(image, Bytes::from_static(b"jpeg"));
    }

    #[tokio::test]
    async fn connection_error_is_terminal() {
        let transport = FakeTransport::scripted(vec![Reply::Fail("connection refused".into()), image_reply(b"x")]);
        let err = client(transport.clone()).generate_image(&payload()).await.unwrap_err();
        assert_eq!(transport.calls(), 1);
        assert!(matches!(err.reason(), FailureReason::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_attempt_is_cancelled_and_retried() {
        let transport = FakeTransport::scripted(vec![Reply::Hang, image_reply(b"late but fine")]);
        let started = tokio::time::Instant::now();
        let image = client(transport.clone()).generate_image(&payload()).await.unwrap();
        assert_eq!(image, Bytes::from_static(b"late but fine"));
        assert_eq!(transport.calls(), 2);
        assert!(started.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn every_attempt_timing_out_exhausts_budget() {
        let transport = FakeTransport::scripted(vec![Reply::Hang, Reply::Hang, Reply::Hang]);
        let err = client(transport.clone()).generate_image(&payload()).await.unwrap_err();
        assert_eq!(transport.calls(), 3);
        assert_eq!(err.reason(), &FailureReason::Timeout(Duration::from_secs(120)));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_for_the_configured_delay() {
        let mut cfg = config();
        cfg.image_retry.retry_delay = Duration::from_secs(2);
        let transport = FakeTransport::scripted(vec![Reply::Respond(503, String::new()), image_reply(b"ok")]);
        let started = tokio::time::Instant::now();
        GeminiClient::new(cfg, transport).generate_image(&payload()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn text_is_never_retried() {
        let transport = FakeTransport::scripted(vec![Reply::Respond(503, String::new()), text_reply("unused")]);
        let err = client(transport.clone())
            .generate_text(&PromptPayload::text_only("write".into()))
            .await
            .unwrap_err();
        assert_eq!(transport.calls(), 1);
        assert_eq!(err.attempts(), 1);
    }

    #[tokio::test]
    async fn text_success_is_trimmed_and_uses_sampling_config() {
        let transport = FakeTransport::scripted(vec![text_reply("  一段文案 \n")]);
        let text = client(transport.clone())
            .generate_text(&PromptPayload::text_only("write".into()))
            .await
            .unwrap();
        assert_eq!(text, "一段文案");

        let (url, _, body) = &transport.requests()[0];
        assert!(url.ends_with("/models/text-model:generateContent"));
        assert_eq!(body["generationConfig"]["temperature"], 0.95);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(body["contents"][0]["parts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_text_is_a_failure() {
        let transport = FakeTransport::scripted(vec![text_reply("   ")]);
        let err = client(transport)
            .generate_text(&PromptPayload::text_only("write".into()))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), &FailureReason::MissingText);
    }

    #[test]
    fn base64_payloads_are_truncated_for_logging() {
        let mut body = image_request_body(&PromptPayload {
            instruction_text: "x".into(),
            parts: vec![ImagePart::jpeg(Bytes::from(vec![7u8; 600]))],
        });
        truncate_base64_in_json(&mut body);
        let data = body["contents"][0]["parts"][1]["inline_data"]["data"].as_str().unwrap();
        assert!(data.contains("[truncated"));
        assert!(data.len() < 120);
    }
}
