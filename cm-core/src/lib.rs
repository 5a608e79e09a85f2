//! Chassismon Core Library
//!
//! Tracks the health of a chassis (PSUs, fan trays, fans, temperature
//! sensors, system board) as a set of human-readable condition strings, and
//! derives alarms and indicator LEDs from that set.
//!
//! # Module Structure
//!
//! - `facts` - typed hardware facts decoded from platform records
//! - `conditions/` - condition strings, patterns, classification, the store
//! - `engine/` - fact processing, indicator derivation, the reconciliation loop
//! - `source` - traits the daemon implements to feed and actuate the engine
//!
//! # Example
//!
//! ```
//! use cm_core::{is_alarm, ConditionStore};
//!
//! let mut store = ConditionStore::new();
//! store.set_condition("PSU 1 absent");
//! store.set_condition("PSU 2 airflow normal present");
//!
//! let alarms = store.snapshot_alarms();
//! assert_eq!(alarms.len(), 1);
//! assert!(is_alarm(&alarms[0].condition));
//! ```

// Grouped modules
pub mod conditions;
pub mod engine;

// Standalone modules
pub mod config;
pub mod constants;
pub mod daemon_client;
pub mod error;
pub mod facts;
pub mod source;

pub use conditions::{format, is_alarm, AlarmRecord, ConditionStore, Pattern};

pub use config::{load_config, parse_config, ConfigFile, MonitorConfig, RuleEntry};

pub use engine::{
    derive_indicators, AirflowMemo, ConditionState, IndicatorPlan, IndicatorRule, LoopPhase, Monitor,
};

pub use error::{ChassisError, Result};

pub use facts::{
    Airflow, EntityFact, EntityKey, EntityType, FanFact, HardwareEvent, OperStatus, TempEntityFaultFact,
    TempFaultFact, TempLevel,
};

pub use source::{AttributeLookup, HardwareSource, IndicatorSink};

pub use daemon_client::DaemonClient;
