//! Platform hardware-feed messages
//!
//! The platform service owns the hardware and publishes its state. The daemon
//! sends one [`PlatformRequest`] per line and reads one [`PlatformResponse`]
//! per line. After `Subscribe` the connection switches to a stream of
//! [`PlatformEvent`] lines.
//!
//! Record attributes are optional on the wire: decoding into typed facts
//! happens in the core, where a missing attribute is a retryable failure.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum PlatformRequest {
    ScanEntities,
    ScanFans,
    ScanTempFaults,
    ScanTempEntityFaults,
    GetAirflow { entity_type: String, slot: u32 },
    Subscribe,
}

impl PlatformRequest {
    pub fn type_name(&self) -> &'static str {
        match self {
            PlatformRequest::ScanEntities => "ScanEntities",
            PlatformRequest::ScanFans => "ScanFans",
            PlatformRequest::ScanTempFaults => "ScanTempFaults",
            PlatformRequest::ScanTempEntityFaults => "ScanTempEntityFaults",
            PlatformRequest::GetAirflow { .. } => "GetAirflow",
            PlatformRequest::Subscribe => "Subscribe",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum PlatformResponse {
    #[serde(rename = "ok")]
    Ok(PlatformData),
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<EntityRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fans: Option<Vec<FanRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_faults: Option<Vec<TempFaultRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_entity_faults: Option<Vec<TempEntityFaultRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airflow: Option<String>,
}

/// Presence and health of a PSU, fan tray or system board
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub slot: Option<u32>,
    #[serde(default)]
    pub present: Option<bool>,
    #[serde(default)]
    pub oper_status: Option<String>,
}

/// Health of one fan inside a PSU or fan tray
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanRecord {
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub slot: Option<u32>,
    #[serde(default)]
    pub fan_index: Option<u32>,
    #[serde(default)]
    pub oper_status: Option<String>,
}

/// Current fault level of one temperature sensor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempFaultRecord {
    #[serde(default)]
    pub sensor: Option<String>,
    #[serde(default)]
    pub fault_type: Option<String>,
}

/// PPID and airflow mismatch flags reported by the thermal subsystem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempEntityFaultRecord {
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub slot: Option<u32>,
    #[serde(default)]
    pub wrong_ppid: Option<bool>,
    #[serde(default)]
    pub wrong_airflow: Option<bool>,
}

/// One change notification on a subscribed connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", content = "fact", rename_all = "snake_case")]
pub enum PlatformEvent {
    Entity(EntityRecord),
    Fan(FanRecord),
    TempFault(TempFaultRecord),
    TempEntityFault(TempEntityFaultRecord),
}
