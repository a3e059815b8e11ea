use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

const MARK_TOLERANCE: f64 = 1e-9;

/// One graded question. Field names follow the structured output the
/// marking model is asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_question_bounds"))]
pub(crate) struct QuestionResult {
    #[validate(length(min = 1, message = "questionNumber must not be empty"))]
    pub(crate) question_number: String,
    #[validate(range(min = 0.0, message = "marksAwarded must be non-negative"))]
    pub(crate) marks_awarded: f64,
    #[validate(range(min = 0.0, message = "maxMarks must be non-negative"))]
    pub(crate) max_marks: f64,
    pub(crate) feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_script_bounds"))]
pub(crate) struct MarkingResult {
    #[validate(range(exclusive_min = 0.0, message = "totalMarksAvailable must be positive"))]
    pub(crate) total_marks_available: f64,
    #[validate(range(min = 0.0, message = "marksAwarded must be non-negative"))]
    pub(crate) marks_awarded: f64,
    pub(crate) overall_feedback: String,
    #[validate(nested)]
    pub(crate) questions: Vec<QuestionResult>,
}

impl MarkingResult {
    /// Share of this script's own total, as a percentage.
    pub(crate) fn percentage(&self) -> Option<f64> {
        if self.total_marks_available > 0.0 {
            Some(self.marks_awarded / self.total_marks_available * 100.0)
        } else {
            None
        }
    }
}

fn validate_question_bounds(question: &QuestionResult) -> Result<(), ValidationError> {
    if question.marks_awarded > question.max_marks + MARK_TOLERANCE {
        let mut err = ValidationError::new("marks_exceed_max");
        err.message = Some("marksAwarded exceeds maxMarks".into());
        return Err(err);
    }
    Ok(())
}

fn validate_script_bounds(result: &MarkingResult) -> Result<(), ValidationError> {
    if result.marks_awarded > result.total_marks_available + MARK_TOLERANCE {
        let mut err = ValidationError::new("marks_exceed_total");
        err.message = Some("marksAwarded exceeds totalMarksAvailable".into());
        return Err(err);
    }
    Ok(())
}
