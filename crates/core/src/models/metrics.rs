use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::TutorError;

/// Named rate-limit budget
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    Submit,
    Status,
    History,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 3] = [
        EndpointClass::Submit,
        EndpointClass::Status,
        EndpointClass::History,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Submit => "submit",
            EndpointClass::Status => "status",
            EndpointClass::History => "history",
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointClass {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submit" => Ok(EndpointClass::Submit),
            "status" => Ok(EndpointClass::Status),
            "history" => Ok(EndpointClass::History),
            _ => Err(TutorError::Validation(format!("Unknown endpoint class: {s}"))),
        }
    }
}

/// Process and host resource usage at sampling time
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceUsage {
    pub process_memory_mb: f64,
    pub process_cpu_percent: f32,
    pub system_memory_used_mb: f64,
    pub system_memory_total_mb: f64,
}

/// Point-in-time copy of the collected metrics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub request_counts: BTreeMap<String, u64>,
    pub error_counts: BTreeMap<String, u64>,
    /// Mean over the trailing window, in seconds
    pub average_response_time: BTreeMap<String, f64>,
    pub api_call_counts: BTreeMap<String, u64>,
    pub resource_usage: ResourceUsage,
    pub timestamp: DateTime<Utc>,
}

/// One row of the error log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorLogEntry {
    pub task_id: Option<String>,
    pub error_type: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ErrorLogEntry {
    pub fn for_task(
        task_id: impl Into<String>,
        error_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id: Some(task_id.into()),
            error_type: error_type.into(),
            message: message.into(),
            details: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Stored monitoring-log row
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringRecord {
    pub id: i64,
    pub snapshot: MetricsSnapshot,
    pub recorded_at: DateTime<Utc>,
}
