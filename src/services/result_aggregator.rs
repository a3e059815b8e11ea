use std::cmp::Ordering;
use std::collections::HashMap;

use crate::schemas::analytics::{ClassAnalytics, QuestionPerformance};
use crate::schemas::batch::BatchOutcome;
use crate::schemas::marking::MarkingResult;

const PASS_THRESHOLD: f64 = 0.5;
const RANKED_QUESTIONS: usize = 3;

struct QuestionGroup {
    question_number: String,
    total_awarded: f64,
    max_marks: f64,
    attempts: usize,
}

/// Class analytics over the marked outcomes, or `None` when nothing was marked.
///
/// The first marked script's total is taken as the paper total; mixed-paper
/// batches are not detected.
pub(crate) fn aggregate(outcomes: &[BatchOutcome]) -> Option<ClassAnalytics> {
    let marked: Vec<&MarkingResult> = outcomes.iter().filter_map(BatchOutcome::result).collect();
    let first = marked.first()?;

    let count = marked.len() as f64;
    let total_available = first.total_marks_available;
    let average_score = marked.iter().map(|result| result.marks_awarded).sum::<f64>() / count;
    let average_percentage =
        (total_available > 0.0).then(|| average_score / total_available * 100.0);

    let passed = marked
        .iter()
        .filter(|result| {
            result.total_marks_available > 0.0
                && result.marks_awarded / result.total_marks_available >= PASS_THRESHOLD
        })
        .count();
    let pass_rate = passed as f64 / count * 100.0;

    let highest_score = marked.iter().map(|result| result.marks_awarded).fold(f64::MIN, f64::max);
    let lowest_score = marked.iter().map(|result| result.marks_awarded).fold(f64::MAX, f64::min);

    let question_breakdown = question_breakdown(&marked);
    let (hardest_questions, easiest_questions) = rank_difficulty(&question_breakdown);

    Some(ClassAnalytics {
        script_count: marked.len(),
        total_available_marks: total_available,
        average_score,
        average_percentage,
        pass_rate,
        highest_score,
        lowest_score,
        hardest_questions,
        easiest_questions,
        question_breakdown,
    })
}

/// Per-question averages in the order identifiers were first seen.
fn question_breakdown(marked: &[&MarkingResult]) -> Vec<QuestionPerformance> {
    let mut groups: Vec<QuestionGroup> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for question in marked.iter().flat_map(|result| result.questions.iter()) {
        match positions.get(question.question_number.as_str()) {
            Some(&position) => {
                let group = &mut groups[position];
                group.total_awarded += question.marks_awarded;
                group.attempts += 1;
                // A zero maximum cannot be divided by; take the next usable one.
                if group.max_marks <= 0.0 && question.max_marks > 0.0 {
                    group.max_marks = question.max_marks;
                }
            }
            None => {
                positions.insert(question.question_number.as_str(), groups.len());
                groups.push(QuestionGroup {
                    question_number: question.question_number.clone(),
                    total_awarded: question.marks_awarded,
                    max_marks: question.max_marks,
                    attempts: 1,
                });
            }
        }
    }

    groups
        .into_iter()
        .map(|group| {
            let average_marks = group.total_awarded / group.attempts as f64;
            let percentage =
                (group.max_marks > 0.0).then(|| average_marks / group.max_marks * 100.0);
            QuestionPerformance {
                question_number: group.question_number,
                average_marks,
                max_marks: group.max_marks,
                percentage,
                attempts: group.attempts,
            }
        })
        .collect()
}

/// Hardest are the first three of the ascending ranking, easiest the last
/// three reversed. With three or fewer questions the two lists overlap.
fn rank_difficulty(
    breakdown: &[QuestionPerformance],
) -> (Vec<QuestionPerformance>, Vec<QuestionPerformance>) {
    let mut ranked: Vec<&QuestionPerformance> =
        breakdown.iter().filter(|question| question.percentage.is_some()).collect();
    ranked.sort_by(|left, right| {
        left.percentage.partial_cmp(&right.percentage).unwrap_or(Ordering::Equal)
    });

    let hardest = ranked.iter().take(RANKED_QUESTIONS).map(|question| (*question).clone()).collect();
    let easiest =
        ranked.iter().rev().take(RANKED_QUESTIONS).map(|question| (*question).clone()).collect();

    (hardest, easiest)
}
