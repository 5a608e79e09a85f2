//! Canonical condition strings
//!
//! Each function renders one hardware fact into its condition identity. A
//! `None` argument becomes a wildcard, so the same function builds both the
//! string stored on `set` and the pattern handed to a bulk clear:
//!
//! | Position | Wildcard |
//! |---|---|
//! | entity type, airflow, sensor, level | `.*` |
//! | slot, fan index | `[0-9]+` |
//!
//! An unresolved airflow (`Airflow::Unknown`) renders as the wildcard too, so
//! conditions set before airflow resolution are retired by the wildcard clear
//! that runs once it resolves.
//!
//! Concrete values are inserted verbatim. When a concrete entity type takes
//! part in a bulk-clear pattern, pass it through [`literal`] first.

use crate::constants::patterns::{ANY_NUMBER, ANY_TEXT};
use crate::facts::{Airflow, EntityType, TempLevel};

/// Entity type whose name is regex-escaped, for building bulk-clear patterns
pub fn literal(entity_type: &EntityType) -> EntityType {
    EntityType::Other(regex::escape(entity_type.name()))
}

pub const SYSTEM_BOARD_FAULT: &str = "System board fault";

fn text(entity_type: Option<&EntityType>) -> &str {
    entity_type.map(EntityType::name).unwrap_or(ANY_TEXT)
}

fn number(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| ANY_NUMBER.to_string())
}

fn airflow_term(airflow: Option<Airflow>) -> &'static str {
    airflow.and_then(Airflow::term).unwrap_or(ANY_TEXT)
}

fn entity_prefix(entity_type: Option<&EntityType>, slot: Option<u32>, airflow: Option<Airflow>) -> String {
    format!("{} {} airflow {}", text(entity_type), number(slot), airflow_term(airflow))
}

pub fn system_board_fault() -> String {
    SYSTEM_BOARD_FAULT.to_string()
}

pub fn fan_fault(
    entity_type: Option<&EntityType>,
    slot: Option<u32>,
    airflow: Option<Airflow>,
    fan_index: Option<u32>,
) -> String {
    format!("{} fan {} fault", entity_prefix(entity_type, slot, airflow), number(fan_index))
}

pub fn entity_fault(entity_type: Option<&EntityType>, slot: Option<u32>, airflow: Option<Airflow>) -> String {
    format!("{} fault", entity_prefix(entity_type, slot, airflow))
}

pub fn wrong_ppid(entity_type: Option<&EntityType>, slot: Option<u32>, airflow: Option<Airflow>) -> String {
    format!("{} incorrect PPID", entity_prefix(entity_type, slot, airflow))
}

pub fn wrong_airflow(entity_type: Option<&EntityType>, slot: Option<u32>, airflow: Option<Airflow>) -> String {
    format!("{} incorrect airflow", entity_prefix(entity_type, slot, airflow))
}

pub fn entity_present(entity_type: Option<&EntityType>, slot: Option<u32>, airflow: Option<Airflow>) -> String {
    format!("{} present", entity_prefix(entity_type, slot, airflow))
}

pub fn entity_absent(entity_type: Option<&EntityType>, slot: Option<u32>) -> String {
    format!("{} {} absent", text(entity_type), number(slot))
}

pub fn temperature(sensor: Option<&str>, level: Option<TempLevel>) -> String {
    format!(
        "Temperature sensor {} {}",
        sensor.unwrap_or(ANY_TEXT),
        level.map(TempLevel::name).unwrap_or(ANY_TEXT)
    )
}
