use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower::ServiceExt;

use crate::api;
use crate::core::{config::Settings, state::AppState};
use crate::repositories::schools::SchoolStore;
use crate::schemas::assistant::ChatMessage;
use crate::schemas::batch::BatchOutcome;
use crate::schemas::document::{Document, MediaType, Memo, QuestionPaper, ScriptInput};
use crate::schemas::marking::{MarkingResult, QuestionResult};
use crate::services::assistant::{AssistantError, AssistantPort};
use crate::services::marking_client::{MarkingError, MarkingPort};

const TEST_SECRET_KEY: &str = "test-secret";
const MULTIPART_BOUNDARY: &str = "script-marker-test-boundary";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("MARKER_ENV", "test");
    std::env::set_var("MARKER_STRICT_CONFIG", "0");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::set_var("OPENAI_API_KEY", "test-key");
    std::env::remove_var("ALLOWED_UPLOAD_TYPES");
    std::env::remove_var("SCHOOL_STORE_PATH");
    std::env::remove_var("MAX_CONCURRENT_MARKING");
    std::env::remove_var("AI_MAX_RETRIES");
    std::env::remove_var("MAX_SCRIPTS_PER_BATCH");
    std::env::remove_var("PROJECT_NAME");
    std::env::remove_var("API_V1_STR");
}

pub(crate) async fn setup_test_context() -> TestContext {
    build_context(&[], ScriptedMarker::new(), ScriptedAssistant::replying("Happy to help.")).await
}

pub(crate) async fn setup_test_context_with(marker: ScriptedMarker) -> TestContext {
    build_context(&[], marker, ScriptedAssistant::replying("Happy to help.")).await
}

pub(crate) async fn setup_test_context_with_assistant(assistant: ScriptedAssistant) -> TestContext {
    build_context(&[], ScriptedMarker::new(), assistant).await
}

pub(crate) async fn setup_test_context_with_env(overrides: &[(&str, &str)]) -> TestContext {
    build_context(overrides, ScriptedMarker::new(), ScriptedAssistant::replying("Happy to help."))
        .await
}

async fn build_context(
    overrides: &[(&str, &str)],
    marker: ScriptedMarker,
    assistant: ScriptedAssistant,
) -> TestContext {
    let guard = env_lock().await;
    set_test_env();
    for (key, value) in overrides {
        std::env::set_var(key, value);
    }

    let settings = Settings::load().expect("settings");
    let state =
        AppState::new(settings, SchoolStore::in_memory(), marker.shared(), Arc::new(assistant));
    let app = api::router::router(state.clone());

    TestContext { state, app, _guard: guard }
}

/// Registers a school through the API and returns its bearer token.
pub(crate) async fn signed_up_school(app: &Router, emis_number: &str) -> String {
    let body = serde_json::json!({
        "school_name": format!("School {emis_number}"),
        "emis_number": emis_number,
        "password": "Password123",
        "confirm_password": "Password123"
    });
    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/auth/signup", None, Some(body)))
        .await
        .expect("signup");
    assert_eq!(response.status(), StatusCode::CREATED);

    read_json(response).await["access_token"].as_str().expect("access token").to_string()
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) struct UploadPart {
    field: &'static str,
    filename: String,
    content_type: &'static str,
    bytes: Vec<u8>,
}

impl UploadPart {
    pub(crate) fn file(
        field: &'static str,
        filename: &str,
        content_type: &'static str,
        bytes: &[u8],
    ) -> Self {
        Self { field, filename: filename.to_string(), content_type, bytes: bytes.to_vec() }
    }
}

pub(crate) fn multipart_request(uri: &str, token: &str, parts: &[UploadPart]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                part.field, part.filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
        body.extend_from_slice(&part.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("multipart body")
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}

pub(crate) fn document(name: &str) -> Document {
    let media_type = MediaType::from_filename(name).unwrap_or(MediaType::Png);
    Document::new(name, media_type, format!("bytes of {name}").into_bytes())
}

pub(crate) fn script(name: &str) -> ScriptInput {
    ScriptInput::new(document(name))
}

pub(crate) fn test_paper() -> Arc<QuestionPaper> {
    Arc::new(document("paper.pdf"))
}

pub(crate) fn result_with_questions(
    awarded: f64,
    total: f64,
    questions: &[(&str, f64, f64)],
) -> MarkingResult {
    MarkingResult {
        total_marks_available: total,
        marks_awarded: awarded,
        overall_feedback: "Good effort overall.".to_string(),
        questions: questions
            .iter()
            .map(|(number, awarded, max)| QuestionResult {
                question_number: number.to_string(),
                marks_awarded: *awarded,
                max_marks: *max,
                feedback: format!("Feedback for question {number}."),
            })
            .collect(),
    }
}

pub(crate) fn marked_outcome(index: usize, name: &str, result: MarkingResult) -> BatchOutcome {
    BatchOutcome::marked(index, Arc::new(script(name)), result)
}

pub(crate) fn failed_outcome(index: usize, name: &str, error: &str) -> BatchOutcome {
    BatchOutcome::failed(index, Arc::new(script(name)), error)
}

pub(crate) fn scripted_marker() -> Arc<dyn MarkingPort> {
    ScriptedMarker::new().shared()
}

#[derive(Debug, Clone)]
enum Plan {
    Succeed { awarded: f64, delay: Option<Duration> },
    Malformed,
}

/// Marking stand-in driven by script name. Unknown scripts score 50 / 100.
#[derive(Clone, Default)]
pub(crate) struct ScriptedMarker {
    plans: HashMap<String, Plan>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    calls_with_memo: Arc<AtomicUsize>,
}

impl ScriptedMarker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn succeed(mut self, name: &str, awarded: f64) -> Self {
        self.plans.insert(name.to_string(), Plan::Succeed { awarded, delay: None });
        self
    }

    pub(crate) fn succeed_after(mut self, name: &str, awarded: f64, delay: Duration) -> Self {
        self.plans.insert(name.to_string(), Plan::Succeed { awarded, delay: Some(delay) });
        self
    }

    pub(crate) fn fail_malformed(mut self, name: &str) -> Self {
        self.plans.insert(name.to_string(), Plan::Malformed);
        self
    }

    pub(crate) fn shared(&self) -> Arc<dyn MarkingPort> {
        Arc::new(self.clone())
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_with_memo(&self) -> usize {
        self.calls_with_memo.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarkingPort for ScriptedMarker {
    async fn mark_one(
        &self,
        _paper: &QuestionPaper,
        script: &ScriptInput,
        memo: Option<&Memo>,
    ) -> Result<MarkingResult, MarkingError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if memo.is_some() {
            self.calls_with_memo.fetch_add(1, Ordering::SeqCst);
        }

        let plan = self
            .plans
            .get(&script.name)
            .cloned()
            .unwrap_or(Plan::Succeed { awarded: 50.0, delay: None });

        let outcome = match plan {
            Plan::Succeed { awarded, delay } => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                } else {
                    tokio::task::yield_now().await;
                }
                Ok(result_with_questions(awarded, 100.0, &[("1", awarded, 100.0)]))
            }
            Plan::Malformed => {
                Err(MarkingError::MalformedResponse("scripted malformed response".to_string()))
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// Assistant stand-in with a fixed reply or a fixed transport failure.
pub(crate) struct ScriptedAssistant {
    reply: Option<String>,
}

impl ScriptedAssistant {
    pub(crate) fn replying(reply: &str) -> Self {
        Self { reply: Some(reply.to_string()) }
    }

    pub(crate) fn failing() -> Self {
        Self { reply: None }
    }
}

#[async_trait]
impl AssistantPort for ScriptedAssistant {
    async fn reply(&self, _history: &[ChatMessage]) -> Result<String, AssistantError> {
        self.reply
            .clone()
            .ok_or_else(|| AssistantError::Transport("scripted failure".to_string()))
    }
}
