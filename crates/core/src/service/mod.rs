//! # Parsing Service Boundary
//!
//! The remote parsing service runs the actual search-engine scraping. The
//! pipeline only needs five operations from it, captured by
//! [`ParserService`] so the scan loop can run against the real HTTP API or a
//! scripted fake in tests.
//!
//! ## Modules
//!
//! - `http` - JSON-over-HTTP client built on `reqwest`

pub mod http;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::ServiceError;

pub use http::HttpParserService;

/// Source mode for submitted queries
pub const QUERIES_FROM_TEXT: &str = "text";

/// Remote-assigned job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status reported for a remote job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Paused,
    Stopped,
    /// Any token we do not know; never terminal
    Unknown(String),
}

impl JobStatus {
    /// Map a status token from the service
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "queued" => JobStatus::Queued,
            "running" | "work" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "paused" => JobStatus::Paused,
            "stopped" => JobStatus::Stopped,
            other => JobStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => f.write_str("queued"),
            JobStatus::Running => f.write_str("running"),
            JobStatus::Completed => f.write_str("completed"),
            JobStatus::Paused => f.write_str("paused"),
            JobStatus::Stopped => f.write_str("stopped"),
            JobStatus::Unknown(token) => write!(f, "unknown({})", token),
        }
    }
}

/// Everything the service needs to create one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Engine preset identifier
    pub preset_id: String,
    /// Configuration profile name
    pub config_preset: String,
    /// Queries, shared between every job of a task
    pub queries: Arc<[String]>,
    /// Results file name on the service side
    pub results_file_name: String,
    /// Key the service stamps into its duplicate tracking for this run
    pub dedupe_key: String,
}

/// Operations consumed from the remote parsing service
#[async_trait]
pub trait ParserService: Send + Sync {
    /// Connectivity check
    async fn ping(&self) -> Result<(), ServiceError>;

    /// Create a job and return its identifier
    async fn add_task(&self, spec: &JobSpec) -> Result<JobId, ServiceError>;

    /// Current status of a job
    async fn task_state(&self, job: &JobId) -> Result<JobStatus, ServiceError>;

    /// Downloadable link to a finished job's results
    async fn results_link(&self, job: &JobId) -> Result<String, ServiceError>;

    /// Plain GET of a results link
    async fn download(&self, link: &str) -> Result<String, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tokens() {
        assert_eq!(JobStatus::from_token("completed"), JobStatus::Completed);
        assert_eq!(JobStatus::from_token("work"), JobStatus::Running);
        assert_eq!(
            JobStatus::from_token("deleting"),
            JobStatus::Unknown("deleting".to_string())
        );
        assert_eq!(JobStatus::Paused.to_string(), "paused");
    }
}
