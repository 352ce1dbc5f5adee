//! # Result Merger
//!
//! Turns settled jobs into output documents:
//!
//! 1. pick result links per [`ResultSelection`] and download them
//! 2. in `merge` mode, drop blank and repeated lines across presets
//! 3. drop lines hit by the global exclusion list, then by the task's own terms
//! 4. decode punycode hosts under Cyrillic TLDs
//!
//! Single-preset documents keep their payload lines as the service wrote them.
//!
//! Only `completed` jobs are fetched; paused or stopped ones contribute nothing.

use anyhow::{anyhow, Context, Result};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::domain::DomainNormalizer;
use super::exclusion::ExclusionMatcher;
use crate::jobs::SettledJob;
use crate::service::ParserService;

/// Which job results end up in which output file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultSelection {
    /// Every preset's results in one file, first occurrence of a line wins
    #[default]
    Merge,
    /// Only the named preset's results
    Canonical(String),
    /// One file per preset
    PerPreset,
}

impl FromStr for ResultSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((mode, name)) = s.split_once(':') {
            if mode.trim().eq_ignore_ascii_case("canonical") && !name.trim().is_empty() {
                return Ok(ResultSelection::Canonical(name.trim().to_string()));
            }
        }
        match s.to_ascii_lowercase().as_str() {
            "merge" => Ok(ResultSelection::Merge),
            "per-preset" => Ok(ResultSelection::PerPreset),
            _ => Err(format!(
                "unknown selection '{}', expected merge, per-preset or canonical:<preset>",
                s
            )),
        }
    }
}

impl fmt::Display for ResultSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSelection::Merge => f.write_str("merge"),
            ResultSelection::Canonical(name) => write!(f, "canonical:{}", name),
            ResultSelection::PerPreset => f.write_str("per-preset"),
        }
    }
}

/// Cleaned lines destined for one output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDoc {
    /// Preset name in per-preset mode
    pub preset: Option<String>,
    pub lines: Vec<String>,
}

impl OutputDoc {
    pub fn body(&self) -> String {
        self.lines.join("\n")
    }
}

/// Counters for one cleaning pass, for logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanStats {
    pub fetched: usize,
    pub duplicates: usize,
    pub excluded: usize,
    pub normalized: usize,
}

/// Fetches and cleans job results
#[derive(Debug, Clone)]
pub struct ResultMerger {
    exclusions: Option<Arc<ExclusionMatcher>>,
    normalizer: DomainNormalizer,
}

impl ResultMerger {
    pub fn new(exclusions: Option<Arc<ExclusionMatcher>>, normalizer: DomainNormalizer) -> Self {
        Self {
            exclusions,
            normalizer,
        }
    }

    /// Build the output documents for a task's settled jobs
    pub async fn build(
        &self,
        service: &dyn ParserService,
        settled: &[SettledJob],
        selection: &ResultSelection,
        task_exclusions: Option<&ExclusionMatcher>,
    ) -> Result<Vec<OutputDoc>> {
        let fetchable: Vec<&SettledJob> = settled
            .iter()
            .filter(|job| {
                if !job.has_results() {
                    tracing::warn!(
                        preset = %job.preset.name,
                        job = %job.id,
                        status = %job.status,
                        "Job ended without completing, skipping its results"
                    );
                }
                job.has_results()
            })
            .collect();

        match selection {
            ResultSelection::Merge => {
                let payloads =
                    try_join_all(fetchable.iter().map(|job| fetch(service, job))).await?;
                Ok(vec![self.clean(None, &payloads, true, task_exclusions)])
            }
            ResultSelection::Canonical(name) => {
                let job = settled
                    .iter()
                    .find(|job| &job.preset.name == name)
                    .ok_or_else(|| anyhow!("Canonical preset '{}' is not configured", name))?;
                let payloads = if job.has_results() {
                    vec![fetch(service, job).await?]
                } else {
                    Vec::new()
                };
                Ok(vec![self.clean(None, &payloads, false, task_exclusions)])
            }
            ResultSelection::PerPreset => {
                let payloads =
                    try_join_all(fetchable.iter().map(|job| fetch(service, job))).await?;
                Ok(fetchable
                    .iter()
                    .zip(payloads)
                    .map(|(job, payload)| {
                        self.clean(
                            Some(job.preset.name.clone()),
                            std::slice::from_ref(&payload),
                            false,
                            task_exclusions,
                        )
                    })
                    .collect())
            }
        }
    }

    /// Turn payloads into filtered, normalized lines.
    ///
    /// With `combine`, blank lines and repeats across payloads are dropped;
    /// otherwise every payload line is kept.
    pub fn clean(
        &self,
        preset: Option<String>,
        payloads: &[String],
        combine: bool,
        task_exclusions: Option<&ExclusionMatcher>,
    ) -> OutputDoc {
        let mut stats = CleanStats::default();
        let mut lines = Vec::new();

        if combine {
            let mut seen = HashSet::new();
            for line in payloads.iter().flat_map(|p| p.lines()) {
                if line.trim().is_empty() {
                    continue;
                }
                stats.fetched += 1;
                if seen.insert(line) {
                    lines.push(line.to_string());
                } else {
                    stats.duplicates += 1;
                }
            }
        } else {
            lines.extend(payloads.iter().flat_map(|p| p.lines()).map(str::to_string));
            stats.fetched = lines.len();
        }

        for matcher in [self.exclusions.as_deref(), task_exclusions].into_iter().flatten() {
            stats.excluded += matcher.retain_allowed(&mut lines);
        }
        stats.normalized = self.normalizer.normalize_all(&mut lines);

        tracing::info!(
            preset = preset.as_deref().unwrap_or("merged"),
            fetched = stats.fetched,
            duplicates = stats.duplicates,
            excluded = stats.excluded,
            normalized = stats.normalized,
            kept = lines.len(),
            "Results cleaned"
        );

        OutputDoc { preset, lines }
    }
}

async fn fetch(service: &dyn ParserService, job: &SettledJob) -> Result<String> {
    let link = service
        .results_link(&job.id)
        .await
        .with_context(|| format!("Failed to get results link for job {} ({})", job.id, job.preset.name))?;
    tracing::info!(preset = %job.preset.name, job = %job.id, link = %link, "Fetching results");

    service
        .download(&link)
        .await
        .with_context(|| format!("Failed to download results from {}", link))
}
