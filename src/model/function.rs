use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::common::{
    ApplicationId, FunctionEventId, FunctionInvocationId, FunctionVersionId, Timestamp,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Building,
    Success,
    Failed,
}

/// Source handed to the Function Provider for a build.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VersionSource {
    SourceCode { archive_url: String },
    Image { image_ref: String },
}

/// An immutable build of a function's source. Exactly one version per
/// application may have `is_active = true` (spec.md §3, §8).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionVersion {
    pub id: FunctionVersionId,
    pub application_id: ApplicationId,
    pub version_number: i64,
    pub source: VersionSource,
    pub build_status: BuildStatus,
    pub build_logs: String,
    pub is_active: bool,
    pub created_at: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Http,
    Schedule,
    Event,
    MessageQueue,
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(TriggerType::Http),
            "schedule" => Ok(TriggerType::Schedule),
            "event" => Ok(TriggerType::Event),
            "messagequeue" | "message_queue" => Ok(TriggerType::MessageQueue),
            other => Err(format!("unknown trigger type '{other}'")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    pub trigger_type: TriggerType,
    pub config: std::collections::HashMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Running,
    Completed,
    Failed,
    Timeout,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionInvocation {
    pub id: FunctionInvocationId,
    pub application_id: ApplicationId,
    pub version_id: FunctionVersionId,
    pub trigger_source: String,
    pub request_method: String,
    pub request_path: String,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub status: InvocationStatus,
    pub response_status: Option<u16>,
    pub response_headers: HashMap<String, String>,
    pub response_body: String,
    pub cold_start: bool,
    pub duration_ms: i64,
}

impl FunctionInvocation {
    /// `duration_ms = completed_at - started_at` (±1ms), per spec.md §8.
    pub fn complete(
        &mut self,
        status: InvocationStatus,
        response_status: u16,
        response_headers: HashMap<String, String>,
        response_body: String,
        cold_start: bool,
        at: Timestamp,
    ) {
        self.completed_at = Some(at);
        self.status = status;
        self.response_status = Some(response_status);
        self.response_headers = response_headers;
        self.response_body = response_body;
        self.cold_start = cold_start;
        self.duration_ms = (at - self.started_at).num_milliseconds().max(0);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventProcessingStatus {
    Pending,
    Retry,
    Success,
    Failed,
    DeadLetter,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionEvent {
    pub id: FunctionEventId,
    pub application_id: ApplicationId,
    pub event_type: String,
    pub event_source: String,
    pub event_data: serde_json::Value,
    pub processing_status: EventProcessingStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<Timestamp>,
    pub created_at: Timestamp,
}
