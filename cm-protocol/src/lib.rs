//! Chassismon IPC protocol
//!
//! Newline-delimited JSON envelopes exchanged with `chassismond` over its Unix
//! socket. The daemon only answers read requests: the active alarm list is
//! derived from hardware state and cannot be written by clients.
//!
//! The [`platform`] module holds the messages the daemon itself exchanges with
//! the platform hardware-state service.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub mod platform;

/// Global request ID counter for correlation
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Maximum message size for IPC (64KB, large enough for a full alarm list)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Maximum length of a condition string carried in a request
const MAX_CONDITION_LENGTH: usize = 256;

/// Error message returned for any attempt to mutate alarm state
pub const READ_ONLY_MESSAGE: &str = "alarm state is read-only";

/// Generate a unique request ID for correlation
pub fn generate_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation and debugging
    pub id: u64,
    /// The actual request
    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request: Request) -> Self {
        Self {
            id: generate_request_id(),
            request,
        }
    }

    pub fn with_id(request: Request, id: u64) -> Self {
        Self { id, request }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    Ping,
    Version,
    /// Active alarms ordered by first-observed timestamp
    ListAlarms,
    /// Always refused; present so clients get an explicit answer
    SetAlarm { condition: String },
    /// Always refused; present so clients get an explicit answer
    ClearAlarm { condition: String },
}

impl Request {
    /// Validate request parameters before sending to daemon
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Request::Ping | Request::Version | Request::ListAlarms => Ok(()),
            Request::SetAlarm { condition } | Request::ClearAlarm { condition } => {
                validate_condition(condition)
            }
        }
    }

    /// Whether this request tries to mutate alarm state
    pub fn is_write(&self) -> bool {
        matches!(self, Request::SetAlarm { .. } | Request::ClearAlarm { .. })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::Version => "Version",
            Request::ListAlarms => "ListAlarms",
            Request::SetAlarm { .. } => "SetAlarm",
            Request::ClearAlarm { .. } => "ClearAlarm",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to
    pub id: u64,
    /// The actual response
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    pub fn new(id: u64, response: Response) -> Self {
        Self { id, response }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok(ResponseData),
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarms: Option<Vec<AlarmEntry>>,
}

impl ResponseData {
    pub fn none() -> Self { Self::default() }
    pub fn string(v: String) -> Self { Self { value: Some(v), ..Self::default() } }
    pub fn alarm_list(a: Vec<AlarmEntry>) -> Self { Self { alarms: Some(a), ..Self::default() } }
}

/// One active alarm as rendered on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmEntry {
    /// First-observed time, RFC 3339 UTC
    pub timestamp: String,
    /// Condition identity, e.g. "PSU 3 airflow normal fault"
    pub condition: String,
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(ResponseData::none())
    }

    pub fn ok_string(s: impl Into<String>) -> Self {
        Response::Ok(ResponseData::string(s.into()))
    }

    pub fn ok_alarms(alarms: Vec<AlarmEntry>) -> Self {
        Response::Ok(ResponseData::alarm_list(alarms))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error { message: msg.into() }
    }

    pub fn read_only() -> Self {
        Response::error(READ_ONLY_MESSAGE)
    }
}

pub fn validate_condition(condition: &str) -> Result<(), String> {
    if condition.is_empty() {
        return Err("Condition cannot be empty".into());
    }

    if condition.len() > MAX_CONDITION_LENGTH {
        return Err(format!(
            "Condition too long: {} > {} chars",
            condition.len(),
            MAX_CONDITION_LENGTH
        ));
    }

    if condition.chars().any(|c| c.is_control()) {
        return Err("Condition contains control characters".into());
    }

    Ok(())
}
