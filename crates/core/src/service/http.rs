//! # HTTP Parsing Service Client
//!
//! Every call is a JSON POST to the API endpoint:
//!
//! ```text
//! {"password": "...", "action": "addTask", "data": {...}}
//! ```
//!
//! and every reply is `{"success": 1, "data": ...}` or
//! `{"success": 0, "msg": "..."}`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{JobId, JobSpec, JobStatus, ParserService, QUERIES_FROM_TEXT};
use crate::error::ServiceError;

const PING_REPLY: &str = "pong";

/// Raw reply envelope
#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    success: Value,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    msg: Option<String>,
}

/// Parsing service reached over its JSON HTTP API
#[derive(Debug, Clone)]
pub struct HttpParserService {
    client: reqwest::Client,
    endpoint: String,
    password: String,
}

impl HttpParserService {
    /// Build a client for `endpoint`.
    ///
    /// Only connection setup is bounded; long result downloads are not.
    pub fn new(endpoint: impl Into<String>, password: impl Into<String>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .user_agent("harvest/0.1")
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            password: password.into(),
        })
    }

    async fn call(&self, action: &str, data: Value) -> Result<Value, ServiceError> {
        let body = request_body(&self.password, action, data);
        let reply: Value = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::debug!(action, "Parsing service replied");
        unwrap_reply(action, reply)
    }
}

#[async_trait]
impl ParserService for HttpParserService {
    async fn ping(&self) -> Result<(), ServiceError> {
        let data = self.call("ping", json!({})).await?;
        pong_from(&data)
    }

    async fn add_task(&self, spec: &JobSpec) -> Result<JobId, ServiceError> {
        let data = self.call("addTask", add_task_data(spec)).await?;
        job_id_from(&data).ok_or_else(|| ServiceError::UnexpectedReply {
            action: "addTask".to_string(),
            details: format!("no task id in {}", data),
        })
    }

    async fn task_state(&self, job: &JobId) -> Result<JobStatus, ServiceError> {
        let data = self
            .call("getTaskState", json!({ "taskUid": job.0 }))
            .await?;
        status_from(&data)
    }

    async fn results_link(&self, job: &JobId) -> Result<String, ServiceError> {
        let data = self
            .call("getTaskResultsFile", json!({ "taskUid": job.0 }))
            .await?;
        link_from(&data)
    }

    async fn download(&self, link: &str) -> Result<String, ServiceError> {
        let text = self
            .client
            .get(link)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}

// --- Wire helpers ---

fn request_body(password: &str, action: &str, data: Value) -> Value {
    json!({
        "password": password,
        "action": action,
        "data": data,
    })
}

fn add_task_data(spec: &JobSpec) -> Value {
    json!({
        "queriesFrom": QUERIES_FROM_TEXT,
        "queries": spec.queries.as_ref(),
        "preset": spec.preset_id,
        "configPreset": spec.config_preset,
        "resultsFileName": spec.results_file_name,
        "options": [
            { "type": "override", "id": "uniqueKey", "value": spec.dedupe_key }
        ],
    })
}

fn unwrap_reply(action: &str, raw: Value) -> Result<Value, ServiceError> {
    let reply: Reply =
        serde_json::from_value(raw.clone()).map_err(|e| ServiceError::UnexpectedReply {
            action: action.to_string(),
            details: format!("{}: {}", e, raw),
        })?;

    let ok = match &reply.success {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    };

    if ok {
        Ok(reply.data)
    } else {
        Err(ServiceError::Rejected {
            action: action.to_string(),
            message: reply.msg.unwrap_or_else(|| raw.to_string()),
        })
    }
}

fn pong_from(data: &Value) -> Result<(), ServiceError> {
    match data.as_str() {
        Some(PING_REPLY) => Ok(()),
        _ => Err(ServiceError::NotPong(data.to_string())),
    }
}

fn status_from(data: &Value) -> Result<JobStatus, ServiceError> {
    data.get("status")
        .and_then(Value::as_str)
        .map(JobStatus::from_token)
        .ok_or_else(|| ServiceError::UnexpectedReply {
            action: "getTaskState".to_string(),
            details: format!("no status in {}", data),
        })
}

fn link_from(data: &Value) -> Result<String, ServiceError> {
    match data.as_str() {
        Some(link) if !link.trim().is_empty() => Ok(link.to_string()),
        _ => Err(ServiceError::UnexpectedReply {
            action: "getTaskResultsFile".to_string(),
            details: format!("no link in {}", data),
        }),
    }
}

fn job_id_from(data: &Value) -> Option<JobId> {
    match data {
        Value::String(s) if !s.is_empty() => Some(JobId(s.clone())),
        Value::Number(n) => Some(JobId(n.to_string())),
        _ => None,
    }
}
