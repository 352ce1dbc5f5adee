//! # Completion Poller
//!
//! Explicit state machine that waits for one remote job to settle.
//!
//! ```text
//! Submitted ──poll──▶ Polling{n} ──sleep+poll──▶ Polling{n+1}
//!     │                   │
//!     └──terminal──▶ Finished ◀──terminal──┘
//!                         Polling ──deadline──▶ TimedOut
//! ```
//!
//! The interval is fixed (no backoff). Without a deadline a job that never
//! settles is polled forever.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::PollError;
use crate::service::{JobId, JobStatus, ParserService};

/// Source of time for the poller
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Which statuses end polling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalPolicy {
    /// Only `completed`; a paused job keeps being polled
    CompletedOnly,
    /// `completed`, `paused` or `stopped`
    #[default]
    Settled,
}

impl TerminalPolicy {
    pub fn is_terminal(&self, status: &JobStatus) -> bool {
        match self {
            TerminalPolicy::CompletedOnly => matches!(status, JobStatus::Completed),
            TerminalPolicy::Settled => matches!(
                status,
                JobStatus::Completed | JobStatus::Paused | JobStatus::Stopped
            ),
        }
    }
}

impl FromStr for TerminalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "completed-only" | "completed" => Ok(TerminalPolicy::CompletedOnly),
            "settled" => Ok(TerminalPolicy::Settled),
            other => Err(format!(
                "unknown terminal policy '{}', expected completed-only or settled",
                other
            )),
        }
    }
}

impl fmt::Display for TerminalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminalPolicy::CompletedOnly => "completed-only",
            TerminalPolicy::Settled => "settled",
        })
    }
}

/// Polling parameters shared by every job of a run
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub deadline: Option<Duration>,
    pub policy: TerminalPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            deadline: None,
            policy: TerminalPolicy::default(),
        }
    }
}

/// Where a poller is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Job exists remotely, not yet polled
    Submitted,
    /// Last poll returned a non-terminal status
    Polling { attempts: u32, last: JobStatus },
    /// A terminal status was observed
    Finished { attempts: u32, status: JobStatus },
    /// The deadline passed first
    TimedOut { attempts: u32 },
}

/// Waits for a single job to reach a terminal status
pub struct Poller {
    service: Arc<dyn ParserService>,
    clock: Arc<dyn Clock>,
    config: PollConfig,
    job: JobId,
    state: PollState,
    started: Option<Instant>,
}

impl Poller {
    pub fn new(
        service: Arc<dyn ParserService>,
        clock: Arc<dyn Clock>,
        config: PollConfig,
        job: JobId,
    ) -> Self {
        Self {
            service,
            clock,
            config,
            job,
            state: PollState::Submitted,
            started: None,
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Advance by one poll.
    ///
    /// The first step polls immediately; later steps sleep one interval first.
    /// Once finished or timed out, stepping is a no-op.
    pub async fn step(&mut self) -> Result<(), PollError> {
        let attempts = match &self.state {
            PollState::Submitted => {
                self.started = Some(self.clock.now());
                0
            }
            PollState::Polling { attempts, .. } => {
                self.clock.sleep(self.config.interval).await;
                *attempts
            }
            PollState::Finished { .. } => return Ok(()),
            PollState::TimedOut { attempts } => return Err(self.deadline_error(*attempts)),
        };

        let status = self.service.task_state(&self.job).await?;
        let attempts = attempts + 1;
        tracing::debug!(job = %self.job, %status, attempts, "Polled job");

        if self.config.policy.is_terminal(&status) {
            self.state = PollState::Finished { attempts, status };
            return Ok(());
        }

        if let Some(deadline) = self.config.deadline {
            if self.elapsed() >= deadline {
                self.state = PollState::TimedOut { attempts };
                return Err(self.deadline_error(attempts));
            }
        }

        self.state = PollState::Polling {
            attempts,
            last: status,
        };
        Ok(())
    }

    /// Poll until a terminal status, returning it
    pub async fn wait(mut self) -> Result<JobStatus, PollError> {
        loop {
            if let PollState::Finished { status, attempts } = &self.state {
                tracing::info!(job = %self.job, %status, attempts, "Job settled");
                return Ok(status.clone());
            }
            self.step().await?;
        }
    }

    fn elapsed(&self) -> Duration {
        self.started
            .map(|started| self.clock.now().saturating_duration_since(started))
            .unwrap_or_default()
    }

    fn deadline_error(&self, attempts: u32) -> PollError {
        PollError::DeadlineExceeded {
            job_id: self.job.to_string(),
            waited_secs: self.elapsed().as_secs(),
            attempts,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::service::fake::FakeService;
    use crate::service::{JobSpec, ParserService};
    use std::sync::Mutex;

    /// Clock that only moves when slept on
    pub(crate) struct ManualClock {
        base: Instant,
        elapsed: Mutex<Duration>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self {
                base: Instant::now(),
                elapsed: Mutex::new(Duration::ZERO),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.elapsed.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            *self.elapsed.lock().unwrap() += duration;
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    async fn submit(service: &FakeService, preset: &str) -> JobId {
        let spec = JobSpec {
            preset_id: preset.to_string(),
            config_preset: "default".to_string(),
            queries: Arc::from(vec!["q".to_string()]),
            results_file_name: "tag.txt".to_string(),
            dedupe_key: "tag".to_string(),
        };
        service.add_task(&spec).await.unwrap()
    }

    fn config(policy: TerminalPolicy, deadline: Option<u64>) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(5),
            deadline: deadline.map(Duration::from_secs),
            policy,
        }
    }

    #[tokio::test]
    async fn test_polls_until_completed() {
        let service = Arc::new(FakeService::new().with_statuses(
            "p",
            vec![JobStatus::Queued, JobStatus::Running, JobStatus::Completed],
        ));
        let clock = Arc::new(ManualClock::new());
        let job = submit(&service, "p").await;

        let poller = Poller::new(
            service.clone(),
            clock.clone(),
            config(TerminalPolicy::Settled, None),
            job,
        );
        assert_eq!(poller.wait().await.unwrap(), JobStatus::Completed);
        assert_eq!(service.polls_for("p"), 3);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5); 2]);
    }

    #[tokio::test]
    async fn test_first_poll_is_immediate() {
        let service = Arc::new(FakeService::new());
        let clock = Arc::new(ManualClock::new());
        let job = submit(&service, "p").await;

        let status = Poller::new(service.clone(), clock.clone(), PollConfig::default(), job)
            .wait()
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Completed);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_settled_policy_stops_on_pause() {
        let service = Arc::new(FakeService::new().with_statuses(
            "p",
            vec![JobStatus::Running, JobStatus::Paused, JobStatus::Completed],
        ));
        let clock = Arc::new(ManualClock::new());
        let job = submit(&service, "p").await;

        let status = Poller::new(
            service.clone(),
            clock,
            config(TerminalPolicy::Settled, None),
            job,
        )
        .wait()
        .await
        .unwrap();
        assert_eq!(status, JobStatus::Paused);
        assert_eq!(service.polls_for("p"), 2);
    }

    #[tokio::test]
    async fn test_completed_only_policy_polls_past_pause() {
        let service = Arc::new(FakeService::new().with_statuses(
            "p",
            vec![JobStatus::Paused, JobStatus::Stopped, JobStatus::Completed],
        ));
        let clock = Arc::new(ManualClock::new());
        let job = submit(&service, "p").await;

        let status = Poller::new(
            service.clone(),
            clock,
            config(TerminalPolicy::CompletedOnly, None),
            job,
        )
        .wait()
        .await
        .unwrap();
        assert_eq!(status, JobStatus::Completed);
        assert_eq!(service.polls_for("p"), 3);
    }

    #[tokio::test]
    async fn test_no_polls_after_terminal() {
        let service = Arc::new(FakeService::new().with_statuses("p", vec![JobStatus::Stopped]));
        let clock = Arc::new(ManualClock::new());
        let job = submit(&service, "p").await;

        let mut poller = Poller::new(
            service.clone(),
            clock.clone(),
            config(TerminalPolicy::Settled, None),
            job,
        );
        poller.step().await.unwrap();
        assert!(matches!(poller.state(), PollState::Finished { attempts: 1, .. }));

        poller.step().await.unwrap();
        poller.step().await.unwrap();
        assert_eq!(service.polls_for("p"), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_bounds_the_wait() {
        let service = Arc::new(FakeService::new().with_statuses("p", vec![JobStatus::Running]));
        let clock = Arc::new(ManualClock::new());
        let job = submit(&service, "p").await;

        let err = Poller::new(
            service.clone(),
            clock.clone(),
            config(TerminalPolicy::Settled, Some(12)),
            job,
        )
        .wait()
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PollError::DeadlineExceeded {
                attempts: 4,
                waited_secs: 15,
                ..
            }
        ));
        assert_eq!(service.polls_for("p"), 4);
    }

    #[tokio::test]
    async fn test_status_error_aborts() {
        let service: Arc<dyn ParserService> = Arc::new(FakeService::new());
        let clock = Arc::new(ManualClock::new());

        let err = Poller::new(
            service,
            clock,
            PollConfig::default(),
            JobId("missing".to_string()),
        )
        .wait()
        .await
        .unwrap_err();
        assert!(matches!(err, PollError::Service(_)));
    }
}
