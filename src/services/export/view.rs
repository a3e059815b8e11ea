use crate::schemas::batch::BatchOutcome;

use super::ExportError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuestionLine {
    pub(crate) label: String,
    pub(crate) marks: String,
    pub(crate) feedback: String,
}

/// Display-ready text for one marked script.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResultView {
    pub(crate) title: String,
    pub(crate) script_name: String,
    pub(crate) score_line: String,
    pub(crate) overall_feedback: String,
    pub(crate) questions: Vec<QuestionLine>,
}

impl ResultView {
    pub(crate) fn from_outcome(outcome: &BatchOutcome) -> Result<Self, ExportError> {
        let result = outcome
            .result()
            .ok_or_else(|| ExportError::NothingToRender(outcome.name().to_string()))?;

        let percentage = result
            .percentage()
            .map(|value| format!("{value:.1}%"))
            .unwrap_or_else(|| "N/A".to_string());

        let questions = result
            .questions
            .iter()
            .map(|question| QuestionLine {
                label: format!("Question {}", question.question_number),
                marks: format!("{} / {}", question.marks_awarded, question.max_marks),
                feedback: question.feedback.trim().to_string(),
            })
            .collect();

        Ok(Self {
            title: "Marking Results".to_string(),
            script_name: outcome.name().to_string(),
            score_line: format!(
                "Total: {} / {} ({percentage})",
                result.marks_awarded, result.total_marks_available
            ),
            overall_feedback: result.overall_feedback.trim().to_string(),
            questions,
        })
    }
}
