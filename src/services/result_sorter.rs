use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

use crate::schemas::batch::{BatchOutcome, SortCriterion, SortDirection};

/// Returns a reordered view of `outcomes`; the input is left untouched.
///
/// The sort is stable. For score and percentage, failed scripts always come
/// after marked ones whatever the direction.
pub(crate) fn sort_outcomes(
    outcomes: &[BatchOutcome],
    criterion: SortCriterion,
    direction: SortDirection,
) -> Vec<&BatchOutcome> {
    let mut sorted: Vec<&BatchOutcome> = outcomes.iter().collect();

    sorted.sort_by(|left, right| match criterion {
        SortCriterion::Name => directed(natural_cmp(left.name(), right.name()), direction),
        SortCriterion::Score => by_metric(
            left.result().map(|result| result.marks_awarded),
            right.result().map(|result| result.marks_awarded),
            direction,
        ),
        SortCriterion::Percentage => by_metric(left.percentage(), right.percentage(), direction),
    });

    sorted
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn by_metric(left: Option<f64>, right: Option<f64>, direction: SortDirection) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => {
            directed(left.partial_cmp(&right).unwrap_or(Ordering::Equal), direction)
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Case-insensitive comparison where runs of digits compare by value,
/// so "script2" < "script10".
pub(crate) fn natural_cmp(left: &str, right: &str) -> Ordering {
    let left = left.to_lowercase();
    let right = right.to_lowercase();
    let mut left_chars = left.chars().peekable();
    let mut right_chars = right.chars().peekable();

    loop {
        match (left_chars.peek().copied(), right_chars.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let left_run = take_digits(&mut left_chars);
                let right_run = take_digits(&mut right_chars);
                let ordering = compare_digit_runs(&left_run, &right_run);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left_chars.next();
                right_chars.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        run.push(c);
    }
    run
}

fn compare_digit_runs(left: &str, right: &str) -> Ordering {
    let left_trimmed = left.trim_start_matches('0');
    let right_trimmed = right.trim_start_matches('0');

    left_trimmed
        .len()
        .cmp(&right_trimmed.len())
        .then_with(|| left_trimmed.cmp(right_trimmed))
        // equal values: fewer leading zeros first
        .then_with(|| left.len().cmp(&right.len()))
}
