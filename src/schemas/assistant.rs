use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub(crate) struct ChatMessage {
    pub(crate) role: ChatRole,
    #[validate(length(min = 1, max = 4000, message = "text must be 1..4000 characters"))]
    pub(crate) text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ChatRequest {
    #[validate(length(min = 1, max = 50, message = "messages must contain 1..50 items"))]
    #[validate(nested)]
    pub(crate) messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatResponse {
    pub(crate) reply: String,
}
