use std::sync::Arc;

use crate::core::config::Settings;
use crate::repositories::{batches::BatchRegistry, schools::SchoolStore};
use crate::services::assistant::AssistantPort;
use crate::services::marking_client::MarkingPort;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    schools: SchoolStore,
    batches: BatchRegistry,
    marker: Arc<dyn MarkingPort>,
    assistant: Arc<dyn AssistantPort>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        schools: SchoolStore,
        marker: Arc<dyn MarkingPort>,
        assistant: Arc<dyn AssistantPort>,
    ) -> Self {
        Self {
            inner: Arc::new(InnerState {
                settings,
                schools,
                batches: BatchRegistry::default(),
                marker,
                assistant,
            }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn schools(&self) -> &SchoolStore {
        &self.inner.schools
    }

    pub(crate) fn batches(&self) -> &BatchRegistry {
        &self.inner.batches
    }

    pub(crate) fn marker(&self) -> Arc<dyn MarkingPort> {
        self.inner.marker.clone()
    }

    pub(crate) fn assistant(&self) -> &dyn AssistantPort {
        self.inner.assistant.as_ref()
    }
}
