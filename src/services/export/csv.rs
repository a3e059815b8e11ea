use crate::schemas::batch::BatchOutcome;

pub(crate) const SUMMARY_HEADER: &str =
    "Script Name,Total Marks Awarded,Total Marks Available,Percentage,Overall Feedback";

pub(super) fn summary<'a, I>(outcomes: I) -> String
where
    I: IntoIterator<Item = &'a BatchOutcome>,
{
    let mut csv = String::from(SUMMARY_HEADER);
    csv.push_str("\r\n");

    for outcome in outcomes {
        let Some(result) = outcome.result() else {
            continue;
        };

        let percentage =
            result.percentage().map(|value| format!("{value:.1}")).unwrap_or_default();
        let row = [
            escape_field(outcome.name()),
            result.marks_awarded.to_string(),
            result.total_marks_available.to_string(),
            percentage,
            escape_field(&result.overall_feedback),
        ];
        csv.push_str(&row.join(","));
        csv.push_str("\r\n");
    }

    csv
}

/// RFC 4180 quoting: fields with a delimiter, quote or line break are wrapped
/// in quotes with inner quotes doubled.
fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
