use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use validator::Validate;

use crate::core::config::AiSettings;
use crate::schemas::document::{Document, Memo, QuestionPaper, ScriptInput};
use crate::schemas::marking::MarkingResult;

pub(crate) const MEMO_BEGIN_MARKER: &str = "--- MARKING MEMO START ---";
pub(crate) const MEMO_END_MARKER: &str = "--- MARKING MEMO END ---";

const EXAMINER_INSTRUCTIONS: &str = "You are an expert Grade 12 examiner for the South African education system.
The first file is the question paper. The second file is the learner's answer script.
1. Identify each question in the question paper and the learner's answer to it.
2. Determine the correctness of each answer using your knowledge of the South African Grade 12 curriculum.
3. Award marks for each question. Never award more than the question's maximum. Be fair and consistent.
4. Give brief, constructive feedback per question explaining why marks were awarded or deducted.
5. Calculate the total marks awarded and the total marks available for the entire script.
6. Give overall feedback on the learner's performance.
7. Return the entire analysis in the requested JSON format.";

const MEMO_INSTRUCTIONS: &str = "A marking memo is enclosed between the memo markers. \
Mark strictly against the memo: use its answers, mark allocations and marking notes in preference to your own judgement.";

/// Upper bound on the wait between two marking attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// `base * 2^attempt`, saturating at [`MAX_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    2_u32
        .checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

#[derive(Debug, Error)]
pub(crate) enum MarkingError {
    #[error("marking request failed: {0}")]
    Transport(String),
    #[error("marking service returned {status}: {body}")]
    RemoteStatus { status: u16, body: String },
    #[error("marking request timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed marking response: {0}")]
    MalformedResponse(String),
    #[error("invalid marking input: {0}")]
    InvalidInput(String),
}

impl MarkingError {
    /// Stable label for the `failure_kind` log field.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::RemoteStatus { .. } => "remote_status",
            Self::Timeout(_) => "timeout",
            Self::MalformedResponse(_) => "malformed_response",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    /// Text shown next to the failed script.
    pub(crate) fn user_message(&self) -> String {
        match self {
            Self::Transport(_) => {
                "Could not reach the marking service. Please try again.".to_string()
            }
            Self::RemoteStatus { status, .. } => {
                format!("The marking service rejected the request (status {status}). Please try again.")
            }
            Self::Timeout(_) => {
                "The marking service took too long to respond. Please try again.".to_string()
            }
            Self::MalformedResponse(_) => {
                "The AI returned an invalid format. Please try again.".to_string()
            }
            Self::InvalidInput(detail) => detail.clone(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::RemoteStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            Self::MalformedResponse(_) | Self::InvalidInput(_) => false,
        }
    }
}

/// Marks one script against a question paper and optional memo.
#[async_trait]
pub(crate) trait MarkingPort: Send + Sync {
    async fn mark_one(
        &self,
        paper: &QuestionPaper,
        script: &ScriptInput,
        memo: Option<&Memo>,
    ) -> Result<MarkingResult, MarkingError>;
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
#[derive(Debug, Clone)]
pub(crate) struct AiMarkingClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl AiMarkingClient {
    pub(crate) fn from_settings(settings: &AiSettings) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(settings.request_timeout_seconds);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build marking HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout,
            max_retries: settings.max_retries,
            backoff_base: Duration::from_secs(1),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    fn build_payload(&self, parts: Vec<Value>) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": parts}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "marking_result",
                    "strict": true,
                    "schema": marking_result_schema()
                }
            }
        })
    }

    async fn send_once(&self, url: &str, payload: &Value) -> Result<Value, MarkingError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| self.classify_transport(err))?;

        let status = response.status();
        let body = response.text().await.map_err(|err| self.classify_transport(err))?;

        if !status.is_success() {
            return Err(MarkingError::RemoteStatus {
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }

        serde_json::from_str(&body)
            .map_err(|err| MarkingError::MalformedResponse(format!("envelope is not JSON: {err}")))
    }

    fn classify_transport(&self, err: reqwest::Error) -> MarkingError {
        if err.is_timeout() {
            MarkingError::Timeout(self.timeout)
        } else {
            MarkingError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl MarkingPort for AiMarkingClient {
    async fn mark_one(
        &self,
        paper: &QuestionPaper,
        script: &ScriptInput,
        memo: Option<&Memo>,
    ) -> Result<MarkingResult, MarkingError> {
        let parts = build_request_parts(paper, script, memo)?;
        let payload = self.build_payload(parts);
        let url = format!("{}/chat/completions", self.base_url);
        let timer = Instant::now();

        tracing::info!(
            script = %script.name,
            media_type = script.document.media_type.as_str(),
            with_memo = memo.is_some(),
            "Sending marking request"
        );

        let mut attempt = 0;
        let envelope = loop {
            match self.send_once(&url, &payload).await {
                Ok(envelope) => break envelope,
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    tracing::warn!(
                        script = %script.name,
                        attempt = attempt + 1,
                        failure_kind = err.kind(),
                        error = %err,
                        "Marking request failed, retrying"
                    );
                    tokio::time::sleep(backoff_delay(self.backoff_base, attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        script = %script.name,
                        failure_kind = err.kind(),
                        error = %err,
                        "Marking request failed"
                    );
                    return Err(err);
                }
            }
        };

        match parse_marking_response(&envelope) {
            Ok(result) => {
                let tokens_used =
                    envelope.pointer("/usage/total_tokens").and_then(serde_json::Value::as_u64);
                tracing::info!(
                    script = %script.name,
                    duration_seconds = timer.elapsed().as_secs_f64(),
                    tokens_used,
                    marks_awarded = result.marks_awarded,
                    total_marks_available = result.total_marks_available,
                    "Marking completed"
                );
                Ok(result)
            }
            Err(err) => {
                tracing::error!(
                    script = %script.name,
                    failure_kind = err.kind(),
                    error = %err,
                    "Marking response did not match the expected shape"
                );
                Err(err)
            }
        }
    }
}

/// Ordered content parts: question paper, script, optional memo between
/// markers, then the instruction text.
pub(crate) fn build_request_parts(
    paper: &QuestionPaper,
    script: &ScriptInput,
    memo: Option<&Memo>,
) -> Result<Vec<Value>, MarkingError> {
    ensure_not_empty(paper, "question paper")?;
    ensure_not_empty(&script.document, "script")?;
    if let Some(memo) = memo {
        ensure_not_empty(memo, "memo")?;
    }

    let mut parts = vec![document_part(paper), document_part(&script.document)];

    let mut instructions = EXAMINER_INSTRUCTIONS.to_string();
    if let Some(memo) = memo {
        parts.push(json!({"type": "text", "text": MEMO_BEGIN_MARKER}));
        parts.push(document_part(memo));
        parts.push(json!({"type": "text", "text": MEMO_END_MARKER}));
        instructions.push('\n');
        instructions.push_str(MEMO_INSTRUCTIONS);
    }

    parts.push(json!({"type": "text", "text": instructions}));
    Ok(parts)
}

/// Extracts and strictly validates the structured result from a
/// `chat/completions` response body.
pub(crate) fn parse_marking_response(envelope: &Value) -> Result<MarkingResult, MarkingError> {
    let content = envelope
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| MarkingError::MalformedResponse("missing message content".to_string()))?;

    let result: MarkingResult = serde_json::from_str(strip_code_fence(content))
        .map_err(|err| MarkingError::MalformedResponse(err.to_string()))?;

    result.validate().map_err(|err| MarkingError::MalformedResponse(err.to_string()))?;

    Ok(result)
}

fn ensure_not_empty(document: &Document, role: &str) -> Result<(), MarkingError> {
    if document.bytes.is_empty() {
        return Err(MarkingError::InvalidInput(format!(
            "The {role} '{}' is empty.",
            document.filename
        )));
    }
    Ok(())
}

fn document_part(document: &Document) -> Value {
    let data_url =
        format!("data:{};base64,{}", document.media_type.mime(), STANDARD.encode(&document.bytes));

    if document.media_type.is_image() {
        json!({"type": "image_url", "image_url": {"url": data_url}})
    } else {
        json!({
            "type": "file",
            "file": {"filename": document.filename, "file_data": data_url}
        })
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

fn marking_result_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "totalMarksAvailable": {"type": "number", "description": "The total possible marks for the script."},
            "marksAwarded": {"type": "number", "description": "The total marks the learner achieved."},
            "overallFeedback": {"type": "string", "description": "A summary of the learner's performance."},
            "questions": {
                "type": "array",
                "description": "A detailed breakdown of marks for each question.",
                "items": {
                    "type": "object",
                    "properties": {
                        "questionNumber": {"type": "string", "description": "The number or identifier of the question."},
                        "marksAwarded": {"type": "number", "description": "Marks awarded for this question."},
                        "maxMarks": {"type": "number", "description": "Maximum possible marks for this question."},
                        "feedback": {"type": "string", "description": "Constructive feedback on the answer."}
                    },
                    "required": ["questionNumber", "marksAwarded", "maxMarks", "feedback"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["totalMarksAvailable", "marksAwarded", "overallFeedback", "questions"],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{http::StatusCode, routing::post, Json, Router};

    use super::*;
    use crate::schemas::document::MediaType;

    fn doc(name: &str, media_type: MediaType) -> Document {
        Document::new(name, media_type, vec![1, 2, 3])
    }

    fn envelope(content: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    const VALID_RESULT: &str = r#"{"totalMarksAvailable": 20, "marksAwarded": 15, "overallFeedback": "Good",
        "questions": [{"questionNumber": "1", "marksAwarded": 15, "maxMarks": 20, "feedback": "ok"}]}"#;

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 6), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, 32), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, u32::MAX), MAX_BACKOFF);
        assert_eq!(backoff_delay(Duration::MAX, 1), MAX_BACKOFF);
    }

    #[test]
    fn parts_without_memo_are_paper_script_instructions() {
        let paper = doc("paper.pdf", MediaType::Pdf);
        let script = ScriptInput::new(doc("learner.png", MediaType::Png));

        let parts = build_request_parts(&paper, &script, None).expect("parts");

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["type"], "file");
        assert_eq!(parts[0]["file"]["filename"], "paper.pdf");
        assert_eq!(parts[1]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"].as_str().unwrap().starts_with("data:image/png;base64,"));
        assert_eq!(parts[2]["type"], "text");
        assert!(!parts[2]["text"].as_str().unwrap().contains("memo markers"));
    }

    #[test]
    fn memo_is_delimited_between_script_and_instructions() {
        let paper = doc("paper.png", MediaType::Png);
        let script = ScriptInput::new(doc("learner.jpg", MediaType::Jpeg));
        let memo = doc("memo.pdf", MediaType::Pdf);

        let parts = build_request_parts(&paper, &script, Some(&memo)).expect("parts");

        assert_eq!(parts.len(), 6);
        assert_eq!(parts[2]["text"], MEMO_BEGIN_MARKER);
        assert_eq!(parts[3]["file"]["filename"], "memo.pdf");
        assert_eq!(parts[4]["text"], MEMO_END_MARKER);
        assert!(parts[5]["text"].as_str().unwrap().contains("memo markers"));
    }

    #[test]
    fn empty_script_is_invalid_input() {
        let paper = doc("paper.png", MediaType::Png);
        let script = ScriptInput::new(Document::new("blank.png", MediaType::Png, Vec::new()));

        let err = build_request_parts(&paper, &script, None).expect_err("empty script");
        assert_eq!(err.kind(), "invalid_input");
        assert!(err.user_message().contains("blank.png"));
    }

    #[test]
    fn parses_valid_and_fenced_content() {
        let parsed = parse_marking_response(&envelope(VALID_RESULT)).expect("valid");
        assert_eq!(parsed.marks_awarded, 15.0);

        let fenced = format!("```json\n{VALID_RESULT}\n```");
        assert!(parse_marking_response(&envelope(&fenced)).is_ok());
    }

    #[test]
    fn missing_field_or_wrong_type_is_malformed() {
        let missing_questions =
            r#"{"totalMarksAvailable": 20, "marksAwarded": 15, "overallFeedback": "Good"}"#;
        let wrong_type = r#"{"totalMarksAvailable": "20", "marksAwarded": 15, "overallFeedback": "Good", "questions": []}"#;

        for content in [missing_questions, wrong_type, "not json at all"] {
            let err = parse_marking_response(&envelope(content)).expect_err("malformed");
            assert_eq!(err.kind(), "malformed_response");
            assert_eq!(err.user_message(), "The AI returned an invalid format. Please try again.");
        }

        let err = parse_marking_response(&json!({"choices": []})).expect_err("no choices");
        assert!(matches!(err, MarkingError::MalformedResponse(_)));
    }

    #[test]
    fn out_of_range_marks_are_malformed() {
        let over = r#"{"totalMarksAvailable": 10, "marksAwarded": 12, "overallFeedback": "", "questions": []}"#;
        assert!(matches!(
            parse_marking_response(&envelope(over)),
            Err(MarkingError::MalformedResponse(_))
        ));
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(MarkingError::Transport("reset".into()).is_retryable());
        assert!(MarkingError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(MarkingError::RemoteStatus { status: 503, body: String::new() }.is_retryable());
        assert!(MarkingError::RemoteStatus { status: 429, body: String::new() }.is_retryable());
        assert!(!MarkingError::RemoteStatus { status: 400, body: String::new() }.is_retryable());
        assert!(!MarkingError::MalformedResponse(String::new()).is_retryable());
    }

    async fn spawn_fake_endpoint(fail_first: usize, content: &'static str) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                let counter = counter.clone();
                async move {
                    let seen = counter.fetch_add(1, Ordering::SeqCst);
                    if seen < fail_first {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "busy"})))
                    } else {
                        (StatusCode::OK, Json(envelope(content)))
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        (format!("http://{addr}"), hits)
    }

    fn client_for(base_url: String, max_retries: u32) -> AiMarkingClient {
        let settings = AiSettings {
            api_key: "test-key".to_string(),
            base_url,
            model: "test-model".to_string(),
            max_tokens: 256,
            temperature: 0.0,
            request_timeout_seconds: 5,
            max_retries,
        };
        AiMarkingClient::from_settings(&settings)
            .expect("client")
            .with_backoff_base(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let (base_url, hits) = spawn_fake_endpoint(2, VALID_RESULT).await;
        let client = client_for(base_url, 2);
        let paper = doc("paper.png", MediaType::Png);
        let script = ScriptInput::new(doc("learner.png", MediaType::Png));

        let result = client.mark_one(&paper, &script, None).await.expect("marked");

        assert_eq!(result.total_marks_available, 20.0);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries_with_remote_status() {
        let (base_url, hits) = spawn_fake_endpoint(usize::MAX, VALID_RESULT).await;
        let client = client_for(base_url, 1);
        let paper = doc("paper.png", MediaType::Png);
        let script = ScriptInput::new(doc("learner.png", MediaType::Png));

        let err = client.mark_one(&paper, &script, None).await.expect_err("unavailable");

        assert!(matches!(err, MarkingError::RemoteStatus { status: 503, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_content_is_not_retried() {
        let (base_url, hits) = spawn_fake_endpoint(0, "{\"marksAwarded\": 3}").await;
        let client = client_for(base_url, 3);
        let paper = doc("paper.png", MediaType::Png);
        let script = ScriptInput::new(doc("learner.png", MediaType::Png));

        let err = client.mark_one(&paper, &script, None).await.expect_err("malformed");

        assert_eq!(err.kind(), "malformed_response");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
