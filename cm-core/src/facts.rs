//! Typed hardware facts
//!
//! Wire records from the platform service carry every attribute as optional.
//! The conversions here are the single place where a record becomes a typed
//! fact; a missing or unparsable attribute becomes a retryable error so the
//! reconciliation loop rebuilds instead of acting on half a record.

use std::fmt;
use std::str::FromStr;

use cm_protocol::platform::{
    EntityRecord, FanRecord, PlatformEvent, TempEntityFaultRecord, TempFaultRecord,
};

use crate::error::{ChassisError, Result};

/// Kind of field-replaceable unit a fact is about
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    Psu,
    FanTray,
    SystemBoard,
    Other(String),
}

impl EntityType {
    pub fn name(&self) -> &str {
        match self {
            EntityType::Psu => "PSU",
            EntityType::FanTray => "Fan tray",
            EntityType::SystemBoard => "System board",
            EntityType::Other(name) => name,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "psu" => EntityType::Psu,
            "fan tray" => EntityType::FanTray,
            "system board" => EntityType::SystemBoard,
            _ => EntityType::Other(s.to_string()),
        }
    }
}

impl FromStr for EntityType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(EntityType::from(s))
    }
}

/// Physical airflow direction of a PSU or fan tray
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Airflow {
    Normal,
    Reverse,
    /// Not yet resolved from the hardware
    Unknown,
}

impl Airflow {
    /// Parse the platform's airflow attribute; anything unrecognised stays unresolved
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Airflow::Normal,
            "reverse" => Airflow::Reverse,
            _ => Airflow::Unknown,
        }
    }

    pub fn is_resolved(self) -> bool {
        self != Airflow::Unknown
    }

    /// Text used inside condition strings; `None` while unresolved
    pub fn term(self) -> Option<&'static str> {
        match self {
            Airflow::Normal => Some("normal"),
            Airflow::Reverse => Some("reverse"),
            Airflow::Unknown => None,
        }
    }
}

impl fmt::Display for Airflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.term().unwrap_or("unknown"))
    }
}

/// Operational status reported for entities and fans
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperStatus {
    Ok,
    Failed,
    Other(String),
}

impl OperStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "ok" | "up" => OperStatus::Ok,
            "failed" | "fault" | "down" => OperStatus::Failed,
            _ => OperStatus::Other(s.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, OperStatus::Ok)
    }
}

/// Severity level of a temperature sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TempLevel {
    Nominal,
    Warning,
    Minor,
    Major,
    Critical,
}

impl TempLevel {
    pub const ALL: [TempLevel; 5] = [
        TempLevel::Nominal,
        TempLevel::Warning,
        TempLevel::Minor,
        TempLevel::Major,
        TempLevel::Critical,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TempLevel::Nominal => "nominal",
            TempLevel::Warning => "warning",
            TempLevel::Minor => "minor",
            TempLevel::Major => "major",
            TempLevel::Critical => "critical",
        }
    }

    /// Resolve a platform fault type to a level
    pub fn from_fault_type(fault_type: &str) -> Option<Self> {
        let level = match fault_type.trim().to_ascii_lowercase().as_str() {
            "nominal" | "normal" | "ok" => TempLevel::Nominal,
            "warning" => TempLevel::Warning,
            "minor" => TempLevel::Minor,
            "major" => TempLevel::Major,
            "critical" => TempLevel::Critical,
            _ => return None,
        };
        Some(level)
    }
}

impl fmt::Display for TempLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key of the airflow memo and of per-entity conditions
pub type EntityKey = (EntityType, u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFact {
    pub entity_type: EntityType,
    pub slot: u32,
    pub present: bool,
    pub oper_status: OperStatus,
}

impl EntityFact {
    pub fn key(&self) -> EntityKey {
        (self.entity_type.clone(), self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanFact {
    pub entity_type: EntityType,
    pub slot: u32,
    pub fan_index: u32,
    pub oper_status: OperStatus,
}

impl FanFact {
    pub fn key(&self) -> EntityKey {
        (self.entity_type.clone(), self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempFaultFact {
    pub sensor: String,
    pub level: TempLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempEntityFaultFact {
    pub entity_type: EntityType,
    pub slot: u32,
    pub wrong_ppid: bool,
    pub wrong_airflow: bool,
}

impl TempEntityFaultFact {
    pub fn key(&self) -> EntityKey {
        (self.entity_type.clone(), self.slot)
    }
}

/// One incremental change delivered by the event subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareEvent {
    Entity(EntityFact),
    Fan(FanFact),
    TempFault(TempFaultFact),
    TempEntityFault(TempEntityFaultFact),
}

impl HardwareEvent {
    pub fn category(&self) -> &'static str {
        match self {
            HardwareEvent::Entity(_) => "entity",
            HardwareEvent::Fan(_) => "fan",
            HardwareEvent::TempFault(_) => "temp_fault",
            HardwareEvent::TempEntityFault(_) => "temp_entity_fault",
        }
    }
}

fn require<T>(value: Option<T>, fact: &'static str, attribute: &'static str) -> Result<T> {
    value.ok_or(ChassisError::MissingAttribute { fact, attribute })
}

fn entity_type_of(value: Option<&String>, fact: &'static str) -> Result<EntityType> {
    let raw = require(value, fact, "entity_type")?;
    if raw.trim().is_empty() {
        return Err(ChassisError::InvalidAttribute {
            fact,
            attribute: "entity_type",
            value: raw.clone(),
        });
    }
    Ok(EntityType::from(raw.as_str()))
}

impl TryFrom<&EntityRecord> for EntityFact {
    type Error = ChassisError;

    fn try_from(record: &EntityRecord) -> Result<Self> {
        const FACT: &str = "entity";
        let entity_type = entity_type_of(record.entity_type.as_ref(), FACT)?;
        let slot = require(record.slot, FACT, "slot")?;
        let present = require(record.present, FACT, "present")?;
        // Absent entities report no meaningful status
        let oper_status = if present {
            OperStatus::parse(require(record.oper_status.as_deref(), FACT, "oper_status")?)
        } else {
            record
                .oper_status
                .as_deref()
                .map(OperStatus::parse)
                .unwrap_or(OperStatus::Failed)
        };
        Ok(Self {
            entity_type,
            slot,
            present,
            oper_status,
        })
    }
}

impl TryFrom<&FanRecord> for FanFact {
    type Error = ChassisError;

    fn try_from(record: &FanRecord) -> Result<Self> {
        const FACT: &str = "fan";
        Ok(Self {
            entity_type: entity_type_of(record.entity_type.as_ref(), FACT)?,
            slot: require(record.slot, FACT, "slot")?,
            fan_index: require(record.fan_index, FACT, "fan_index")?,
            oper_status: OperStatus::parse(require(record.oper_status.as_deref(), FACT, "oper_status")?),
        })
    }
}

impl TryFrom<&TempFaultRecord> for TempFaultFact {
    type Error = ChassisError;

    fn try_from(record: &TempFaultRecord) -> Result<Self> {
        const FACT: &str = "temperature fault";
        let sensor = require(record.sensor.clone(), FACT, "sensor")?;
        let fault_type = require(record.fault_type.as_deref(), FACT, "fault_type")?;
        let level = TempLevel::from_fault_type(fault_type).ok_or_else(|| {
            ChassisError::InvalidAttribute {
                fact: FACT,
                attribute: "fault_type",
                value: fault_type.to_string(),
            }
        })?;
        Ok(Self { sensor, level })
    }
}

impl TryFrom<&TempEntityFaultRecord> for TempEntityFaultFact {
    type Error = ChassisError;

    fn try_from(record: &TempEntityFaultRecord) -> Result<Self> {
        const FACT: &str = "temperature entity fault";
        Ok(Self {
            entity_type: entity_type_of(record.entity_type.as_ref(), FACT)?,
            slot: require(record.slot, FACT, "slot")?,
            wrong_ppid: require(record.wrong_ppid, FACT, "wrong_ppid")?,
            wrong_airflow: require(record.wrong_airflow, FACT, "wrong_airflow")?,
        })
    }
}

impl TryFrom<&PlatformEvent> for HardwareEvent {
    type Error = ChassisError;

    fn try_from(event: &PlatformEvent) -> Result<Self> {
        Ok(match event {
            PlatformEvent::Entity(r) => HardwareEvent::Entity(r.try_into()?),
            PlatformEvent::Fan(r) => HardwareEvent::Fan(r.try_into()?),
            PlatformEvent::TempFault(r) => HardwareEvent::TempFault(r.try_into()?),
            PlatformEvent::TempEntityFault(r) => HardwareEvent::TempEntityFault(r.try_into()?),
        })
    }
}
