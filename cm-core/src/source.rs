//! Hardware seams
//!
//! The engine never talks to hardware directly. The daemon supplies a
//! [`HardwareSource`] (full scans, the event subscription and attribute
//! lookups) and an [`IndicatorSink`] (LED writes). Tests supply scripted ones.
//!
//! Every failure returned through these traits is treated as a transport
//! failure by the reconciliation loop.

use crate::error::Result;
use crate::facts::{
    Airflow, EntityFact, EntityType, FanFact, HardwareEvent, TempEntityFaultFact, TempFaultFact,
};

/// Per-entity attribute lookups used while processing facts
#[cfg_attr(test, mockall::automock)]
pub trait AttributeLookup {
    /// Airflow direction of one PSU or fan tray
    fn airflow(&mut self, entity_type: &EntityType, slot: u32) -> Result<Airflow>;
}

/// Full-scan queries and the incremental event stream
pub trait HardwareSource: AttributeLookup {
    /// (Re)start the event subscription. Called before every full scan so no
    /// change between the scan and the first event is lost.
    fn subscribe(&mut self) -> Result<()>;

    fn scan_entities(&mut self) -> Result<Vec<EntityFact>>;

    fn scan_fans(&mut self) -> Result<Vec<FanFact>>;

    fn scan_temp_faults(&mut self) -> Result<Vec<TempFaultFact>>;

    fn scan_temp_entity_faults(&mut self) -> Result<Vec<TempEntityFaultFact>>;

    /// Block until the next hardware event arrives
    fn next_event(&mut self) -> Result<HardwareEvent>;
}

/// Indicator (LED) actuator
#[cfg_attr(test, mockall::automock)]
pub trait IndicatorSink {
    fn set_indicator(&mut self, name: &str, on: bool) -> Result<()>;
}
