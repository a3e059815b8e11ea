//! Turns marked outcomes into downloadable artifacts.
//!
//! Every operation reads an immutable batch snapshot, so concurrent exports of
//! the same batch never observe a half-updated result.

mod archive;
mod csv;
mod pdf;
mod view;

use thiserror::Error;

use crate::core::metrics;
use crate::schemas::batch::BatchOutcome;

pub(crate) use archive::{artifact_name, ARCHIVE_FILE_NAME};
#[cfg(test)]
pub(crate) use csv::SUMMARY_HEADER;
use view::ResultView;

#[derive(Debug, Error)]
pub(crate) enum ExportError {
    #[error("script '{0}' has no marking result to render")]
    NothingToRender(String),
    #[error("no marked scripts to export")]
    NoArtifacts,
    #[error("failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl ExportError {
    pub(crate) fn user_message(&self) -> String {
        match self {
            Self::NothingToRender(name) => {
                format!("There are no results to export for '{name}'.")
            }
            Self::NoArtifacts => "No results could be exported. Mark at least one script first."
                .to_string(),
            Self::Archive(_) => "The results archive could not be created.".to_string(),
        }
    }
}

/// Single-page A4 PDF for one marked script.
pub(crate) fn export_single(outcome: &BatchOutcome) -> Result<Vec<u8>, ExportError> {
    let rendered = ResultView::from_outcome(outcome).map(|view| pdf::render(&view));
    metrics::record_export("pdf", rendered.is_ok());

    if let Err(err) = &rendered {
        tracing::warn!(script = %outcome.name(), error = %err, "Single export failed");
    }
    rendered
}

/// ZIP of `<stem>-results.pdf` files; failed scripts are skipped.
pub(crate) fn export_batch<'a, I>(outcomes: I) -> Result<Vec<u8>, ExportError>
where
    I: IntoIterator<Item = &'a BatchOutcome>,
{
    let built = archive::build(outcomes);
    metrics::record_export("archive", built.is_ok());

    match &built {
        Ok(bytes) => tracing::info!(size_bytes = bytes.len(), "Batch archive exported"),
        Err(err) => tracing::warn!(error = %err, "Batch export failed"),
    }
    built
}

/// One CSV row per marked script, in the order given.
pub(crate) fn export_summary_csv<'a, I>(outcomes: I) -> String
where
    I: IntoIterator<Item = &'a BatchOutcome>,
{
    let rendered = csv::summary(outcomes);
    metrics::record_export("csv", true);
    rendered
}
