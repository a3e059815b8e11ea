use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::core::metrics;
use crate::schemas::batch::BatchOutcome;
use crate::schemas::document::{Memo, QuestionPaper, ScriptInput};
use crate::services::marking_client::MarkingPort;

const TASK_ABORTED_MESSAGE: &str = "Marking stopped unexpectedly. Please try again.";

/// Marks every script against the same question paper.
///
/// One task is spawned per script and every handle is awaited, so the
/// returned outcomes line up with `scripts` by position no matter which call
/// finishes first. A failing script only ever affects its own outcome.
/// `max_concurrency == 0` keeps every call in flight at once. Larger limits
/// are clamped to what a semaphore can hold.
pub(crate) async fn run_batch(
    marker: Arc<dyn MarkingPort>,
    paper: Arc<QuestionPaper>,
    scripts: Vec<Arc<ScriptInput>>,
    memo: Option<Arc<Memo>>,
    max_concurrency: usize,
) -> Vec<BatchOutcome> {
    let total = scripts.len();
    let max_concurrency = max_concurrency.min(Semaphore::MAX_PERMITS);
    let limiter = (max_concurrency > 0).then(|| Arc::new(Semaphore::new(max_concurrency)));
    let started = Instant::now();

    tracing::info!(
        scripts = total,
        question_paper = %paper.filename,
        with_memo = memo.is_some(),
        max_concurrency,
        "Starting marking batch"
    );
    metrics::record_batch(total);

    let mut handles = Vec::with_capacity(total);
    for (index, script) in scripts.iter().enumerate() {
        let marker = marker.clone();
        let paper = paper.clone();
        let memo = memo.clone();
        let script = script.clone();
        let limiter = limiter.clone();

        let handle = tokio::spawn(async move {
            // Closed semaphores are never produced here; a failed acquire just runs unthrottled.
            let _permit = match &limiter {
                Some(limiter) => limiter.clone().acquire_owned().await.ok(),
                None => None,
            };

            let timer = Instant::now();
            let marked = marker.mark_one(&paper, &script, memo.as_deref()).await;

            match marked {
                Ok(result) => {
                    metrics::record_marking("marked", timer.elapsed());
                    BatchOutcome::marked(index, script, result)
                }
                Err(err) => {
                    metrics::record_marking("failed", timer.elapsed());
                    tracing::warn!(
                        script = %script.name,
                        index,
                        failure_kind = err.kind(),
                        error = %err,
                        "Script could not be marked"
                    );
                    BatchOutcome::failed(index, script, err.user_message())
                }
            }
        });
        handles.push(handle);
    }

    let mut outcomes = Vec::with_capacity(total);
    for (index, handle) in handles.into_iter().enumerate() {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(index, error = %err, "Marking task panicked or was cancelled");
                metrics::record_marking("failed", started.elapsed());
                BatchOutcome::failed(index, scripts[index].clone(), TASK_ABORTED_MESSAGE)
            }
        };
        outcomes.push(outcome);
    }

    let failed = outcomes.iter().filter(|outcome| outcome.result().is_none()).count();
    tracing::info!(
        scripts = total,
        marked = total - failed,
        failed,
        duration_seconds = started.elapsed().as_secs_f64(),
        "Marking batch finished"
    );

    outcomes
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::{script, scripted_marker, test_paper, ScriptedMarker};

    fn scripts(names: &[&str]) -> Vec<Arc<ScriptInput>> {
        names.iter().map(|name| Arc::new(script(name))).collect()
    }

    #[tokio::test]
    async fn all_successes_keep_input_order() {
        // Earlier scripts finish last.
        let marker = ScriptedMarker::new()
            .succeed_after("s1", 40.0, Duration::from_millis(60))
            .succeed_after("s2", 70.0, Duration::from_millis(30))
            .succeed("s3", 100.0);

        let outcomes =
            run_batch(marker.shared(), test_paper(), scripts(&["s1", "s2", "s3"]), None, 0).await;

        assert_eq!(outcomes.len(), 3);
        for (position, (outcome, expected)) in
            outcomes.iter().zip([("s1", 40.0), ("s2", 70.0), ("s3", 100.0)]).enumerate()
        {
            assert_eq!(outcome.index, position);
            assert_eq!(outcome.name(), expected.0);
            assert_eq!(outcome.result().expect("marked").marks_awarded, expected.1);
            assert!(outcome.error().is_none());
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_siblings() {
        let marker = ScriptedMarker::new()
            .succeed("a", 55.0)
            .fail_malformed("b")
            .succeed_after("c", 65.0, Duration::from_millis(20));

        let outcomes =
            run_batch(marker.shared(), test_paper(), scripts(&["a", "b", "c"]), None, 0).await;

        assert_eq!(outcomes[0].result().unwrap().marks_awarded, 55.0);
        assert!(outcomes[1].result().is_none());
        assert_eq!(
            outcomes[1].error(),
            Some("The AI returned an invalid format. Please try again.")
        );
        assert_eq!(outcomes[2].result().unwrap().marks_awarded, 65.0);
    }

    #[tokio::test]
    async fn empty_batch_returns_no_outcomes() {
        let outcomes = run_batch(scripted_marker(), test_paper(), Vec::new(), None, 0).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn concurrency_limit_caps_calls_in_flight() {
        let marker = ScriptedMarker::new()
            .succeed_after("a", 1.0, Duration::from_millis(20))
            .succeed_after("b", 2.0, Duration::from_millis(20))
            .succeed_after("c", 3.0, Duration::from_millis(20))
            .succeed_after("d", 4.0, Duration::from_millis(20));
        let shared = marker.shared();

        let outcomes =
            run_batch(shared, test_paper(), scripts(&["a", "b", "c", "d"]), None, 2).await;

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|outcome| outcome.result().is_some()));
        assert_eq!(marker.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn oversized_concurrency_limit_is_clamped() {
        let marker = ScriptedMarker::new().succeed("a", 5.0).succeed("b", 6.0);

        let outcomes =
            run_batch(marker.shared(), test_paper(), scripts(&["a", "b"]), None, usize::MAX).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|outcome| outcome.result().is_some()));
    }

    #[tokio::test]
    async fn memo_is_forwarded_to_every_call() {
        let marker = ScriptedMarker::new().succeed("a", 10.0).succeed("b", 12.0);
        let memo = Arc::new(crate::test_support::document("memo.pdf"));

        run_batch(marker.shared(), test_paper(), scripts(&["a", "b"]), Some(memo), 0).await;

        assert_eq!(marker.calls_with_memo(), 2);
    }
}
