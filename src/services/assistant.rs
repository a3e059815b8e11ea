use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::AiSettings;
use crate::schemas::assistant::{ChatMessage, ChatRole};

pub(crate) const FALLBACK_REPLY: &str = "Sorry, I couldn't get a response. Please try again.";

const SYSTEM_INSTRUCTION: &str = "You are a friendly and helpful AI assistant for the \"SA Grade 12 Script Marker\" application. \
Your purpose is to assist teachers and administrators using this tool.
- You can answer questions about the app's features (uploading papers, marking scripts, viewing results, exporting PDFs, ZIP archives and CSV summaries).
- You can provide general information about the South African Grade 12 curriculum and marking principles.
- Be concise, professional, and supportive.
- If you don't know an answer, say so politely. Do not make up information.";

#[derive(Debug, Error)]
pub(crate) enum AssistantError {
    #[error("conversation must end with a user message")]
    NotAwaitingReply,
    #[error("assistant request failed: {0}")]
    Transport(String),
    #[error("assistant service returned {status}")]
    RemoteStatus { status: u16 },
    #[error("assistant returned no reply")]
    EmptyReply,
}

#[async_trait]
pub(crate) trait AssistantPort: Send + Sync {
    async fn reply(&self, history: &[ChatMessage]) -> Result<String, AssistantError>;
}

/// Help-desk chat over the same OpenAI-compatible endpoint used for marking.
#[derive(Debug, Clone)]
pub(crate) struct AiAssistant {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
}

impl AiAssistant {
    pub(crate) fn from_settings(settings: &AiSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build assistant HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }
}

#[async_trait]
impl AssistantPort for AiAssistant {
    async fn reply(&self, history: &[ChatMessage]) -> Result<String, AssistantError> {
        let messages = build_messages(history)?;
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| AssistantError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::RemoteStatus { status: status.as_u16() });
        }

        let body: Value =
            response.json().await.map_err(|err| AssistantError::Transport(err.to_string()))?;

        extract_reply(&body)
    }
}

/// System instruction followed by the conversation, with `model` turns sent
/// as `assistant`.
pub(crate) fn build_messages(history: &[ChatMessage]) -> Result<Vec<Value>, AssistantError> {
    match history.last() {
        Some(last) if last.role == ChatRole::User => {}
        _ => return Err(AssistantError::NotAwaitingReply),
    }

    let mut messages = vec![json!({"role": "system", "content": SYSTEM_INSTRUCTION})];
    messages.extend(history.iter().map(|message| {
        let role = match message.role {
            ChatRole::User => "user",
            ChatRole::Model => "assistant",
        };
        json!({"role": role, "content": message.text.trim()})
    }));
    Ok(messages)
}

fn extract_reply(body: &Value) -> Result<String, AssistantError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or(AssistantError::EmptyReply)
}
