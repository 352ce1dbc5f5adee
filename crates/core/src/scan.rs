//! # Directory Scan Loop
//!
//! Top-level scheduler. Each pass lists the watch directory and runs every
//! task file through the pipeline, strictly one file after another:
//!
//! ```text
//! read → consume → decode → build queries → dispatch → poll → merge → write
//! ```
//!
//! A file leaves the watch directory before its first job is submitted, so a
//! crash mid-run loses that task instead of running it twice. `stage` mode
//! parks the file in `.processing/` until its output is written.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Settings;
use crate::jobs::{Clock, Dispatcher, PollConfig, TokioClock};
use crate::results::{DomainNormalizer, ExclusionMatcher, ResultMerger};
use crate::service::ParserService;
use crate::task::file::{self, TaskFile};
use crate::task::{build_plan, RunTag, TaskLayout};

/// Staging directory inside the watch directory
pub const PROCESSING_DIR: &str = ".processing";

/// How a task file leaves the watch directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsumeMode {
    /// Remove right after reading (at-most-once)
    #[default]
    Delete,
    /// Move to `.processing/`, remove once the output is written
    Stage,
}

impl FromStr for ConsumeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(ConsumeMode::Delete),
            "stage" => Ok(ConsumeMode::Stage),
            other => Err(format!(
                "unknown consume mode '{}', expected delete or stage",
                other
            )),
        }
    }
}

impl fmt::Display for ConsumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConsumeMode::Delete => "delete",
            ConsumeMode::Stage => "stage",
        })
    }
}

/// What happened to one task file
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub file_name: String,
    pub batch: String,
    pub tag: Option<String>,
    pub queries: usize,
    pub outputs: Vec<PathBuf>,
    pub finished_at: DateTime<Utc>,
}

/// Summary of one scan pass
#[derive(Debug, Default)]
pub struct ScanReport {
    pub processed: Vec<TaskOutcome>,
    /// (file name, error chain)
    pub failed: Vec<(String, String)>,
}

/// Watches the task directory and drives every file through the pipeline
pub struct Scanner {
    settings: Settings,
    service: Arc<dyn ParserService>,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
    merger: ResultMerger,
    encoding: &'static Encoding,
}

impl Scanner {
    /// Build a scanner on the wall clock
    pub fn new(
        settings: Settings,
        service: Arc<dyn ParserService>,
        exclusions: Option<Arc<ExclusionMatcher>>,
    ) -> Result<Self> {
        Self::with_clock(settings, service, exclusions, Arc::new(TokioClock))
    }

    /// Build a scanner with an explicit time source
    pub fn with_clock(
        settings: Settings,
        service: Arc<dyn ParserService>,
        exclusions: Option<Arc<ExclusionMatcher>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let encoding = settings.text_encoding()?;
        let normalizer = DomainNormalizer::new().context("Failed to compile host pattern")?;
        let dispatcher = Dispatcher::new(
            service.clone(),
            clock.clone(),
            settings.presets.clone(),
            settings.config_preset.clone(),
            PollConfig {
                interval: settings.poll_every(),
                deadline: settings.poll_limit(),
                policy: settings.terminal,
            },
        );

        Ok(Self {
            settings,
            service,
            clock,
            dispatcher,
            merger: ResultMerger::new(exclusions, normalizer),
            encoding,
        })
    }

    /// Scan forever, sleeping the configured delay between passes.
    ///
    /// Failures are logged; the loop itself never stops.
    pub async fn run(&self) {
        tracing::info!(
            delay_secs = self.settings.delay,
            folder = %self.settings.task_folder.display(),
            "Scan loop started"
        );
        loop {
            match self.scan_once().await {
                Ok(report) => tracing::info!(
                    processed = report.processed.len(),
                    failed = report.failed.len(),
                    "Scan pass finished"
                ),
                Err(e) => tracing::error!(error = %format!("{:#}", e), "Scan pass failed"),
            }
            self.clock.sleep(self.settings.scan_delay()).await;
        }
    }

    /// Names of regular files waiting in the watch directory, sorted
    pub async fn list_pending(&self) -> Result<Vec<String>> {
        let dir = &self.settings.task_folder;
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read task directory: {:?}", dir))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Ok(file_type) = entry.file_type().await {
                if file_type.is_file() {
                    if let Ok(name) = entry.file_name().into_string() {
                        files.push(name);
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// One pass over the watch directory
    pub async fn scan_once(&self) -> Result<ScanReport> {
        tracing::info!(folder = %self.settings.task_folder.display(), "Checking for tasks");
        let pending = self.list_pending().await?;
        let mut report = ScanReport::default();

        if pending.is_empty() {
            tracing::info!("Tasks not found");
            return Ok(report);
        }
        tracing::info!(count = pending.len(), "Found tasks");

        for name in pending {
            match self.process_file(&name).await {
                Ok(outcome) => report.processed.push(outcome),
                Err(e) => {
                    let chain = format!("{:#}", e);
                    tracing::error!(file = %name, error = %chain, "Task failed, its queries are lost");
                    report.failed.push((name, chain));
                }
            }
        }

        Ok(report)
    }

    /// Run a single task file through the whole pipeline
    #[tracing::instrument(skip(self), fields(tag = tracing::field::Empty))]
    pub async fn process_file(&self, file_name: &str) -> Result<TaskOutcome> {
        let path = self.settings.task_folder.join(file_name);
        let raw = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read task file: {:?}", path))?;
        let staged = self.consume(&path, file_name).await?;

        let text = file::decode(&raw, self.encoding);
        let task = TaskFile::from_file_name(file_name);
        let layout = self.layout_for(&task);
        let plan = build_plan(&text, layout, self.settings.quote);
        tracing::info!(
            prefix = %task.prefix,
            batch = %task.batch,
            %layout,
            queries = plan.queries.len(),
            exclusions = plan.exclusions.len(),
            "Task parsed"
        );

        let mut outcome = TaskOutcome {
            file_name: file_name.to_string(),
            batch: task.batch.clone(),
            tag: None,
            queries: plan.queries.len(),
            outputs: Vec::new(),
            finished_at: Utc::now(),
        };

        if plan.queries.is_empty() {
            tracing::warn!(file = %file_name, "Task produced no queries, nothing to submit");
            release(staged).await?;
            return Ok(outcome);
        }

        let task_exclusions = ExclusionMatcher::from_terms(&plan.exclusions)
            .context("Failed to compile task exclusion terms")?;

        let tag = RunTag::generate();
        tracing::Span::current().record("tag", tag.as_str());
        outcome.tag = Some(tag.to_string());

        let settled = self.dispatcher.run(Arc::from(plan.queries), &tag).await?;
        let docs = self
            .merger
            .build(
                self.service.as_ref(),
                &settled,
                &self.settings.selection,
                task_exclusions.as_ref(),
            )
            .await?;

        for doc in docs {
            let name = match &doc.preset {
                Some(preset) => task.preset_output_name(preset),
                None => task.output_name(),
            };
            let out = self.settings.result_folder.join(name);
            tokio::fs::write(&out, doc.body())
                .await
                .with_context(|| format!("Failed to write result file: {:?}", out))?;
            tracing::info!(path = %out.display(), lines = doc.lines.len(), "Result file written");
            outcome.outputs.push(out);
        }

        release(staged).await?;
        outcome.finished_at = Utc::now();
        Ok(outcome)
    }

    /// Take the file out of the watch directory; returns its staged path
    async fn consume(&self, path: &Path, file_name: &str) -> Result<Option<PathBuf>> {
        match self.settings.consume {
            ConsumeMode::Delete => {
                tokio::fs::remove_file(path)
                    .await
                    .with_context(|| format!("Failed to remove task file: {:?}", path))?;
                tracing::info!(file = %file_name, "Task file read and removed");
                Ok(None)
            }
            ConsumeMode::Stage => {
                let dir = self.settings.task_folder.join(PROCESSING_DIR);
                tokio::fs::create_dir_all(&dir)
                    .await
                    .with_context(|| format!("Failed to create staging directory: {:?}", dir))?;
                let mut staged = dir.join(file_name);
                let mut attempt = 0u32;
                while tokio::fs::try_exists(&staged).await.unwrap_or(false) {
                    attempt += 1;
                    staged = dir.join(format!(
                        "{}.{}.{}",
                        file_name,
                        Utc::now().format("%Y%m%d%H%M%S"),
                        attempt
                    ));
                }
                if attempt > 0 {
                    tracing::warn!(
                        file = %file_name,
                        staged = %staged.display(),
                        "Earlier staged copy still waiting, staging under a new name"
                    );
                }
                tokio::fs::rename(path, &staged)
                    .await
                    .with_context(|| format!("Failed to stage task file: {:?}", path))?;
                tracing::info!(file = %file_name, staged = %staged.display(), "Task file staged");
                Ok(Some(staged))
            }
        }
    }

    fn layout_for(&self, task: &TaskFile) -> TaskLayout {
        match task.kind.as_deref().map(str::parse::<TaskLayout>) {
            Some(Ok(layout)) => layout,
            Some(Err(reason)) => {
                tracing::warn!(file = %task.file_name, %reason, "Ignoring layout token");
                self.settings.layout
            }
            None => self.settings.layout,
        }
    }
}

async fn release(staged: Option<PathBuf>) -> Result<()> {
    if let Some(path) = staged {
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to remove staged task file: {:?}", path))?;
    }
    Ok(())
}
