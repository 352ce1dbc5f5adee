//! # Job Dispatcher
//!
//! Fans one task's queries out to every configured preset.
//!
//! All submissions are issued together and joined before any polling starts.
//! Each job is then polled on its own tokio task, and [`Dispatcher::wait_all`]
//! returns only when every branch has settled.

use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use std::sync::Arc;

use super::poller::{Clock, PollConfig, Poller};
use crate::config::Preset;
use crate::service::{JobId, JobSpec, JobStatus, ParserService};
use crate::task::RunTag;

/// A job accepted by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub preset: Preset,
    pub id: JobId,
}

/// A job whose poller observed a terminal status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledJob {
    pub preset: Preset,
    pub id: JobId,
    pub status: JobStatus,
}

impl SettledJob {
    /// Only completed jobs have results worth fetching
    pub fn has_results(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

/// Submits and tracks the jobs of one task at a time
pub struct Dispatcher {
    service: Arc<dyn ParserService>,
    clock: Arc<dyn Clock>,
    presets: Vec<Preset>,
    config_preset: String,
    poll: PollConfig,
}

impl Dispatcher {
    pub fn new(
        service: Arc<dyn ParserService>,
        clock: Arc<dyn Clock>,
        presets: Vec<Preset>,
        config_preset: impl Into<String>,
        poll: PollConfig,
    ) -> Self {
        Self {
            service,
            clock,
            presets,
            config_preset: config_preset.into(),
            poll,
        }
    }

    /// Submit one job per preset, concurrently.
    ///
    /// Fails if any submission fails; jobs that were accepted anyway are
    /// logged and left running on the service.
    pub async fn submit_all(&self, queries: Arc<[String]>, tag: &RunTag) -> Result<Vec<Job>> {
        let submissions = self.presets.iter().map(|preset| {
            let spec = JobSpec {
                preset_id: preset.id.clone(),
                config_preset: self.config_preset.clone(),
                queries: queries.clone(),
                results_file_name: tag.results_file_name(),
                dedupe_key: tag.to_string(),
            };
            async move {
                let result = self.service.add_task(&spec).await;
                (preset, result)
            }
        });

        let mut jobs = Vec::with_capacity(self.presets.len());
        let mut first_error = None;
        for (preset, result) in join_all(submissions).await {
            match result {
                Ok(id) => {
                    tracing::info!(preset = %preset.name, job = %id, tag = %tag, "Job submitted");
                    jobs.push(Job {
                        preset: preset.clone(),
                        id,
                    });
                }
                Err(e) => {
                    tracing::error!(preset = %preset.name, error = %e, "Job submission failed");
                    if first_error.is_none() {
                        first_error = Some(anyhow::Error::new(e).context(format!(
                            "Failed to submit job for preset '{}'",
                            preset.name
                        )));
                    }
                }
            }
        }

        if let Some(err) = first_error {
            for job in &jobs {
                tracing::warn!(preset = %job.preset.name, job = %job.id, "Abandoning submitted job");
            }
            return Err(err);
        }

        Ok(jobs)
    }

    /// Poll every job on its own task and wait for all of them
    pub async fn wait_all(&self, jobs: Vec<Job>) -> Result<Vec<SettledJob>> {
        let branches: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let poller = Poller::new(
                    self.service.clone(),
                    self.clock.clone(),
                    self.poll,
                    job.id.clone(),
                );
                let handle = tokio::spawn(poller.wait());
                (job, handle)
            })
            .collect();

        let mut settled = Vec::with_capacity(branches.len());
        let mut first_error = None;
        for (job, handle) in branches {
            let outcome = handle
                .await
                .map_err(|e| anyhow!("Poll task for preset '{}' died: {}", job.preset.name, e))
                .and_then(|polled| {
                    polled.with_context(|| {
                        format!("Failed waiting for job {} ({})", job.id, job.preset.name)
                    })
                });

            match outcome {
                Ok(status) => settled.push(SettledJob {
                    preset: job.preset,
                    id: job.id,
                    status,
                }),
                Err(e) => {
                    tracing::error!(error = %e, "Job branch failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(settled),
        }
    }

    /// Submit, then wait for every job to settle
    pub async fn run(&self, queries: Arc<[String]>, tag: &RunTag) -> Result<Vec<SettledJob>> {
        let jobs = self.submit_all(queries, tag).await?;
        self.wait_all(jobs).await
    }
}
