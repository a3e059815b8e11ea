use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{pdf, view::ResultView, ExportError};
use crate::schemas::batch::BatchOutcome;

pub(crate) const ARCHIVE_FILE_NAME: &str = "All-Script-Results.zip";
const ARTIFACT_SUFFIX: &str = "-results.pdf";

/// `<name without extension>-results.pdf`.
pub(crate) fn artifact_name(script_name: &str) -> String {
    let file_name = Path::new(script_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(script_name);
    let stem = Path::new(file_name).file_stem().and_then(|stem| stem.to_str()).unwrap_or(file_name);
    let stem = if stem.trim().is_empty() { "script" } else { stem };
    format!("{stem}{ARTIFACT_SUFFIX}")
}

pub(super) fn build<'a, I>(outcomes: I) -> Result<Vec<u8>, ExportError>
where
    I: IntoIterator<Item = &'a BatchOutcome>,
{
    // Same stripped name twice: the later script replaces the earlier entry.
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    for outcome in outcomes {
        let Ok(view) = ResultView::from_outcome(outcome) else {
            tracing::debug!(script = %outcome.name(), "Skipping unmarked script in archive");
            continue;
        };

        let name = artifact_name(outcome.name());
        let bytes = pdf::render(&view);
        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = bytes,
            None => entries.push((name, bytes)),
        }
    }

    if entries.is_empty() {
        return Err(ExportError::NoArtifacts);
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in &entries {
        writer.start_file(name.as_str(), options)?;
        writer.write_all(bytes).map_err(zip::result::ZipError::Io)?;
    }

    Ok(writer.finish()?.into_inner())
}
