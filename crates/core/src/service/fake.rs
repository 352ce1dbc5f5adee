//! Scripted in-memory parsing service for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use super::{JobId, JobSpec, JobStatus, ParserService};
use crate::error::ServiceError;

#[derive(Default)]
struct FakeState {
    next_id: u32,
    /// Status sequence per preset id; the last entry repeats
    scripts: HashMap<String, Vec<JobStatus>>,
    payloads: HashMap<String, String>,
    failing_submits: HashSet<String>,
    failing_downloads: bool,
    /// job id -> (preset id, polls so far)
    jobs: HashMap<String, (String, usize)>,
    submitted: Vec<JobSpec>,
    downloads: Vec<String>,
    /// Action names in call order
    calls: Vec<&'static str>,
    probe: Option<PathBuf>,
    probe_hits: Vec<bool>,
}

/// In-memory [`ParserService`] with per-preset scripts
pub struct FakeService {
    state: Mutex<FakeState>,
}

impl Default for FakeService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Statuses returned to successive polls of jobs on `preset_id`
    pub fn with_statuses(self, preset_id: &str, statuses: Vec<JobStatus>) -> Self {
        self.lock().scripts.insert(preset_id.to_string(), statuses);
        self
    }

    /// Results payload of jobs on `preset_id`
    pub fn with_payload(self, preset_id: &str, payload: &str) -> Self {
        self.lock()
            .payloads
            .insert(preset_id.to_string(), payload.to_string());
        self
    }

    pub fn failing_submit(self, preset_id: &str) -> Self {
        self.lock().failing_submits.insert(preset_id.to_string());
        self
    }

    pub fn failing_downloads(self) -> Self {
        self.lock().failing_downloads = true;
        self
    }

    /// Record whether `path` exists each time a job is submitted
    pub fn probing(self, path: PathBuf) -> Self {
        self.lock().probe = Some(path);
        self
    }

    pub fn submitted(&self) -> Vec<JobSpec> {
        self.lock().submitted.clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.lock().downloads.clone()
    }

    /// Action names in the order they were called
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    /// Whether the probed path existed at each submission
    pub fn probe_hits(&self) -> Vec<bool> {
        self.lock().probe_hits.clone()
    }

    /// Total status polls across all jobs of `preset_id`
    pub fn polls_for(&self, preset_id: &str) -> usize {
        self.lock()
            .jobs
            .values()
            .filter(|(preset, _)| preset == preset_id)
            .map(|(_, polls)| *polls)
            .sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ParserService for FakeService {
    async fn ping(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn add_task(&self, spec: &JobSpec) -> Result<JobId, ServiceError> {
        let mut state = self.lock();
        state.calls.push("addTask");
        if let Some(path) = state.probe.clone() {
            state.probe_hits.push(path.exists());
        }
        state.submitted.push(spec.clone());

        if state.failing_submits.contains(&spec.preset_id) {
            return Err(ServiceError::Rejected {
                action: "addTask".to_string(),
                message: format!("preset {} unavailable", spec.preset_id),
            });
        }

        state.next_id += 1;
        let id = format!("job-{}", state.next_id);
        state
            .jobs
            .insert(id.clone(), (spec.preset_id.clone(), 0));
        Ok(JobId(id))
    }

    async fn task_state(&self, job: &JobId) -> Result<JobStatus, ServiceError> {
        let mut state = self.lock();
        state.calls.push("getTaskState");
        let (preset, polls) = state.jobs.get(&job.0).cloned().ok_or_else(|| {
            ServiceError::Rejected {
                action: "getTaskState".to_string(),
                message: format!("no job {}", job),
            }
        })?;

        let status = match state.scripts.get(&preset) {
            Some(script) if !script.is_empty() => {
                script[polls.min(script.len() - 1)].clone()
            }
            _ => JobStatus::Completed,
        };
        if let Some(entry) = state.jobs.get_mut(&job.0) {
            entry.1 += 1;
        }
        Ok(status)
    }

    async fn results_link(&self, job: &JobId) -> Result<String, ServiceError> {
        self.lock().calls.push("getTaskResultsFile");
        Ok(format!("fake://{}", job.0))
    }

    async fn download(&self, link: &str) -> Result<String, ServiceError> {
        let mut state = self.lock();
        state.downloads.push(link.to_string());
        if state.failing_downloads {
            return Err(ServiceError::UnexpectedReply {
                action: "download".to_string(),
                details: format!("{} unreachable", link),
            });
        }

        let job = link.trim_start_matches("fake://");
        let preset = state
            .jobs
            .get(job)
            .map(|(preset, _)| preset.clone())
            .unwrap_or_default();
        Ok(state.payloads.get(&preset).cloned().unwrap_or_default())
    }
}
