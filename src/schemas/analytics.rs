use serde::Serialize;

/// Averages for one question identifier across every marked script.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionPerformance {
    pub(crate) question_number: String,
    pub(crate) average_marks: f64,
    pub(crate) max_marks: f64,
    /// `None` when the question has no positive maximum to divide by.
    pub(crate) percentage: Option<f64>,
    pub(crate) attempts: usize,
}

/// Class-level view over the marked scripts of one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClassAnalytics {
    pub(crate) script_count: usize,
    pub(crate) total_available_marks: f64,
    pub(crate) average_score: f64,
    pub(crate) average_percentage: Option<f64>,
    pub(crate) pass_rate: f64,
    pub(crate) highest_score: f64,
    pub(crate) lowest_score: f64,
    pub(crate) hardest_questions: Vec<QuestionPerformance>,
    pub(crate) easiest_questions: Vec<QuestionPerformance>,
    pub(crate) question_breakdown: Vec<QuestionPerformance>,
}
