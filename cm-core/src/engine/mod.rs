//! Condition engine
//!
//! - `airflow` - memoized airflow direction per PSU / fan tray
//! - `processors` - per-fact condition updates
//! - `indicators` - indicator state derived from the condition set
//! - `reconcile` - the rebuild / serve / retry loop and the shared [`Monitor`]

mod airflow;
mod indicators;
mod processors;
mod reconcile;

pub use airflow::AirflowMemo;
pub use indicators::{derive_indicators, IndicatorPlan, IndicatorRule};
pub use processors::ConditionState;
pub use reconcile::{LoopPhase, Monitor};
