//! Offline marking of a folder of scripts, writing the exports to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::core::config::UploadSettings;
use crate::schemas::analytics::ClassAnalytics;
use crate::schemas::batch::{SortCriterion, SortDirection};
use crate::schemas::document::{Document, ScriptInput};
use crate::services::export::{self, ExportError, ARCHIVE_FILE_NAME};
use crate::services::marking_client::MarkingPort;
use crate::services::uploads::check_upload;
use crate::services::{batch_orchestrator, result_aggregator, result_sorter};

pub(crate) const SUMMARY_FILE_NAME: &str = "summary.csv";

const USAGE: &str = "usage: mark-folder --paper PATH [--memo PATH] --scripts DIR --out DIR \
                     [--sort name|score|percentage] [--direction asc|desc]";

#[derive(Debug, PartialEq)]
pub(crate) struct FolderArgs {
    pub(crate) paper: PathBuf,
    pub(crate) memo: Option<PathBuf>,
    pub(crate) scripts: PathBuf,
    pub(crate) out: PathBuf,
    pub(crate) sort: SortCriterion,
    pub(crate) direction: SortDirection,
}

impl FolderArgs {
    pub(crate) fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut paper = None;
        let mut memo = None;
        let mut scripts = None;
        let mut out = None;
        let mut sort = SortCriterion::default();
        let mut direction = SortDirection::default();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = || args.next().ok_or_else(|| anyhow!("{arg} missing value\n{USAGE}"));
            match arg.as_str() {
                "--paper" => paper = Some(PathBuf::from(value()?)),
                "--memo" => memo = Some(PathBuf::from(value()?)),
                "--scripts" => scripts = Some(PathBuf::from(value()?)),
                "--out" => out = Some(PathBuf::from(value()?)),
                "--sort" => {
                    let raw = value()?;
                    sort = SortCriterion::parse(&raw)
                        .ok_or_else(|| anyhow!("Unknown sort criterion: {raw}"))?;
                }
                "--direction" => {
                    let raw = value()?;
                    direction = SortDirection::parse(&raw)
                        .ok_or_else(|| anyhow!("Unknown sort direction: {raw}"))?;
                }
                _ => return Err(anyhow!("Unknown argument: {arg}\n{USAGE}")),
            }
        }

        Ok(Self {
            paper: paper.ok_or_else(|| anyhow!("--paper is required\n{USAGE}"))?,
            memo,
            scripts: scripts.ok_or_else(|| anyhow!("--scripts is required\n{USAGE}"))?,
            out: out.ok_or_else(|| anyhow!("--out is required\n{USAGE}"))?,
            sort,
            direction,
        })
    }
}

#[derive(Debug)]
pub(crate) struct FolderReport {
    pub(crate) marked: usize,
    pub(crate) failed: usize,
    pub(crate) analytics: Option<ClassAnalytics>,
    pub(crate) archive_written: bool,
}

pub(crate) async fn mark_folder(
    args: &FolderArgs,
    marker: Arc<dyn MarkingPort>,
    uploads: &UploadSettings,
    max_concurrency: usize,
) -> Result<FolderReport> {
    let paper = load_document(&args.paper, uploads).await.context("Question paper rejected")?;
    let memo = match &args.memo {
        Some(path) => Some(load_document(path, uploads).await.context("Memo rejected")?),
        None => None,
    };

    let scripts = collect_scripts(&args.scripts, uploads).await?;
    if scripts.is_empty() {
        return Err(anyhow!("No supported scripts found in {}", args.scripts.display()));
    }

    let outcomes = batch_orchestrator::run_batch(
        marker,
        Arc::new(paper),
        scripts.into_iter().map(|document| Arc::new(ScriptInput::new(document))).collect(),
        memo.map(Arc::new),
        max_concurrency,
    )
    .await;

    let analytics = result_aggregator::aggregate(&outcomes);
    match &analytics {
        Some(analytics) => tracing::info!(
            scripts = analytics.script_count,
            average_score = analytics.average_score,
            average_percentage = ?analytics.average_percentage,
            pass_rate = analytics.pass_rate,
            highest_score = analytics.highest_score,
            lowest_score = analytics.lowest_score,
            "Class analytics"
        ),
        None => tracing::warn!("No scripts were marked; class analytics unavailable"),
    }

    let sorted = result_sorter::sort_outcomes(&outcomes, args.sort, args.direction);

    tokio::fs::create_dir_all(&args.out)
        .await
        .with_context(|| format!("Failed to create {}", args.out.display()))?;

    let summary_path = args.out.join(SUMMARY_FILE_NAME);
    tokio::fs::write(&summary_path, export::export_summary_csv(sorted.iter().copied()))
        .await
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    let archive_written = match export::export_batch(sorted.iter().copied()) {
        Ok(bytes) => {
            let archive_path = args.out.join(ARCHIVE_FILE_NAME);
            tokio::fs::write(&archive_path, bytes)
                .await
                .with_context(|| format!("Failed to write {}", archive_path.display()))?;
            true
        }
        Err(ExportError::NoArtifacts) => {
            tracing::warn!("No marked scripts; archive not written");
            false
        }
        Err(err) => return Err(err).context("Failed to build results archive"),
    };

    let marked = outcomes.iter().filter(|outcome| outcome.result().is_some()).count();
    Ok(FolderReport { marked, failed: outcomes.len() - marked, analytics, archive_written })
}

/// Files directly inside `dir` that pass the upload checks, in natural
/// file-name order. Rejected files are logged and skipped.
async fn collect_scripts(dir: &Path, uploads: &UploadSettings) -> Result<Vec<Document>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read scripts folder {}", dir.display()))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort_by(|left, right| {
        result_sorter::natural_cmp(&file_name(left), &file_name(right))
    });

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = read_file(&path).await?;
        match check_upload(&file_name(&path), None, bytes, uploads) {
            Ok(document) => documents.push(document),
            Err(rejection) => {
                tracing::warn!(path = %path.display(), reason = %rejection, "Skipping script")
            }
        }
    }
    Ok(documents)
}

async fn load_document(path: &Path, uploads: &UploadSettings) -> Result<Document> {
    let bytes = read_file(path).await?;
    Ok(check_upload(&file_name(path), None, bytes, uploads)?)
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.with_context(|| format!("Failed to read {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}
