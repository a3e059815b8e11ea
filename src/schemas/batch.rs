use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::schemas::analytics::ClassAnalytics;
use crate::schemas::document::{MediaType, ScriptInput};
use crate::schemas::marking::MarkingResult;

#[derive(Debug, Clone)]
pub(crate) enum OutcomeStatus {
    Marked(MarkingResult),
    Failed { error: String },
}

/// Result of marking one script, positionally tied to its input.
#[derive(Debug, Clone)]
pub(crate) struct BatchOutcome {
    pub(crate) index: usize,
    pub(crate) script: Arc<ScriptInput>,
    pub(crate) status: OutcomeStatus,
}

impl BatchOutcome {
    pub(crate) fn marked(index: usize, script: Arc<ScriptInput>, result: MarkingResult) -> Self {
        Self { index, script, status: OutcomeStatus::Marked(result) }
    }

    pub(crate) fn failed(index: usize, script: Arc<ScriptInput>, error: impl Into<String>) -> Self {
        Self { index, script, status: OutcomeStatus::Failed { error: error.into() } }
    }

    pub(crate) fn name(&self) -> &str {
        &self.script.name
    }

    pub(crate) fn result(&self) -> Option<&MarkingResult> {
        match &self.status {
            OutcomeStatus::Marked(result) => Some(result),
            OutcomeStatus::Failed { .. } => None,
        }
    }

    pub(crate) fn error(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Marked(_) => None,
            OutcomeStatus::Failed { error } => Some(error),
        }
    }

    pub(crate) fn percentage(&self) -> Option<f64> {
        self.result().and_then(MarkingResult::percentage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SortCriterion {
    #[default]
    Name,
    Score,
    Percentage,
}

impl SortCriterion {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "score" => Some(Self::Score),
            "percentage" => Some(Self::Percentage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SortQuery {
    #[serde(default)]
    pub(crate) sort: SortCriterion,
    #[serde(default)]
    pub(crate) direction: SortDirection,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum OutcomeState {
    Marked,
    Failed,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutcomeResponse {
    pub(crate) index: usize,
    pub(crate) script_name: String,
    pub(crate) media_type: MediaType,
    pub(crate) status: OutcomeState,
    pub(crate) result: Option<MarkingResult>,
    pub(crate) error: Option<String>,
    pub(crate) percentage: Option<f64>,
}

impl OutcomeResponse {
    pub(crate) fn from_outcome(outcome: &BatchOutcome) -> Self {
        let status = match outcome.status {
            OutcomeStatus::Marked(_) => OutcomeState::Marked,
            OutcomeStatus::Failed { .. } => OutcomeState::Failed,
        };

        Self {
            index: outcome.index,
            script_name: outcome.name().to_string(),
            media_type: outcome.script.document.media_type,
            status,
            result: outcome.result().cloned(),
            error: outcome.error().map(str::to_string),
            percentage: outcome.percentage(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BatchResponse {
    pub(crate) batch_id: String,
    pub(crate) created_at: String,
    pub(crate) question_paper: String,
    pub(crate) memo: Option<String>,
    pub(crate) marked_count: usize,
    pub(crate) failed_count: usize,
    pub(crate) outcomes: Vec<OutcomeResponse>,
    pub(crate) analytics: Option<ClassAnalytics>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnalyticsResponse {
    pub(crate) analytics: Option<ClassAnalytics>,
}
