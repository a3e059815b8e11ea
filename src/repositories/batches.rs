use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::schemas::analytics::ClassAnalytics;
use crate::schemas::batch::BatchOutcome;

/// Immutable snapshot of one finished batch.
#[derive(Debug)]
pub(crate) struct BatchRun {
    pub(crate) id: String,
    pub(crate) school_id: String,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) question_paper: String,
    pub(crate) memo: Option<String>,
    pub(crate) outcomes: Vec<BatchOutcome>,
    pub(crate) analytics: Option<ClassAnalytics>,
}

impl BatchRun {
    pub(crate) fn marked_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.result().is_some()).count()
    }

    pub(crate) fn outcome(&self, index: usize) -> Option<&BatchOutcome> {
        self.outcomes.get(index)
    }
}

/// Latest batch per school. A new run replaces the previous snapshot
/// wholesale; readers holding the old `Arc` keep a consistent view.
#[derive(Debug, Default)]
pub(crate) struct BatchRegistry {
    runs: RwLock<HashMap<String, Arc<BatchRun>>>,
}

impl BatchRegistry {
    pub(crate) async fn replace(&self, run: BatchRun) -> Arc<BatchRun> {
        let run = Arc::new(run);
        self.runs.write().await.insert(run.school_id.clone(), run.clone());
        run
    }

    pub(crate) async fn current(&self, school_id: &str) -> Option<Arc<BatchRun>> {
        self.runs.read().await.get(school_id).cloned()
    }

    pub(crate) async fn len(&self) -> usize {
        self.runs.read().await.len()
    }
}
