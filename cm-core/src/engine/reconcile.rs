//! Reconciliation loop
//!
//! Rebuilds the condition set from a full hardware scan, then applies events
//! one at a time. Any failure discards all state, waits out the backoff and
//! rebuilds.
//!
//! ```text
//!  Rebuilding --ok--> Serving --event ok--> Serving
//!      ^                 |
//!      |               error
//!      |                 v
//!      +---backoff--- Retrying
//! ```
//!
//! # Locking
//! A single mutex guards the condition store and airflow memo. The loop holds
//! it for one whole event application (including attribute lookups); the
//! alarm query holds it for one snapshot. The event wait happens unlocked.
//! When an event application fails, state is reset *before* the guard is
//! released so a reader never sees a half-invalidated set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::conditions::AlarmRecord;
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::facts::{EntityFact, FanFact, HardwareEvent, TempEntityFaultFact, TempFaultFact};
use crate::source::{HardwareSource, IndicatorSink};

use super::{derive_indicators, ConditionState, IndicatorPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Rebuilding,
    Serving,
    Retrying,
}

/// Everything one full scan returned
#[derive(Debug, Default)]
struct Scan {
    entities: Vec<EntityFact>,
    fans: Vec<FanFact>,
    temp_faults: Vec<TempFaultFact>,
    temp_entity_faults: Vec<TempEntityFaultFact>,
}

/// Condition engine shared between the reconciliation loop and alarm queries
#[derive(Clone)]
pub struct Monitor {
    state: Arc<Mutex<ConditionState>>,
    phase: Arc<Mutex<LoopPhase>>,
    config: Arc<MonitorConfig>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConditionState::new())),
            phase: Arc::new(Mutex::new(LoopPhase::Rebuilding)),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Last phase entered by the loop
    pub fn phase(&self) -> LoopPhase {
        *self.phase.lock()
    }

    fn enter(&self, phase: LoopPhase) {
        let mut current = self.phase.lock();
        if *current != phase {
            debug!("Reconciliation: {:?} -> {:?}", *current, phase);
            *current = phase;
        }
    }

    /// Active alarms, ordered by first-observed time
    pub fn active_alarms(&self) -> Vec<AlarmRecord> {
        self.state.lock().conditions.snapshot_alarms()
    }

    /// Sorted identities of every present condition
    pub fn conditions(&self) -> Vec<String> {
        self.state.lock().conditions.identities()
    }

    /// Indicator plan for the current condition set. The identities are
    /// copied out under the lock; matching runs without it.
    pub fn derive_indicators(&self) -> IndicatorPlan {
        let conditions = self.conditions();
        derive_indicators(&self.config.indicators, &self.config.indicator_rules, &conditions)
    }

    /// Discard all state and replay a full scan.
    ///
    /// The subscription is (re)started first so nothing between the scan and
    /// the first event is lost. Scans run unlocked; the reset and replay
    /// happen under one guard so a reader sees either the previous set or the
    /// complete new one. Entities go first because fans read the airflow memo
    /// they populate.
    pub fn rebuild<S: HardwareSource>(&self, source: &mut S) -> Result<()> {
        self.enter(LoopPhase::Rebuilding);
        source.subscribe()?;
        let scan = Scan {
            entities: source.scan_entities()?,
            fans: source.scan_fans()?,
            temp_faults: source.scan_temp_faults()?,
            temp_entity_faults: source.scan_temp_entity_faults()?,
        };

        let mut state = self.state.lock();
        state.reset();
        if let Err(e) = self.replay(&mut state, &scan, source) {
            state.reset();
            return Err(e);
        }
        info!(
            "Rebuilt condition set: {} entities, {} fans, {} sensors -> {} conditions, {} airflow entries",
            scan.entities.len(),
            scan.fans.len(),
            scan.temp_faults.len(),
            state.conditions.len(),
            state.airflow.len()
        );
        drop(state);

        self.enter(LoopPhase::Serving);
        Ok(())
    }

    fn replay<S: HardwareSource>(&self, state: &mut ConditionState, scan: &Scan, source: &mut S) -> Result<()> {
        let expected = self.config.expected_airflow;
        for fact in &scan.entities {
            state.apply_entity(fact, source, expected)?;
        }
        for fact in &scan.fans {
            state.apply_fan(fact)?;
        }
        for fact in &scan.temp_faults {
            state.apply_temp_fault(fact)?;
        }
        for fact in &scan.temp_entity_faults {
            state.apply_temp_entity_fault(fact)?;
        }
        Ok(())
    }

    /// Apply one event under the lock, resetting state before unlocking on failure
    pub fn apply_event<S: HardwareSource>(&self, event: &HardwareEvent, source: &mut S) -> Result<()> {
        let mut state = self.state.lock();
        let result = state.apply_event(event, source, self.config.expected_airflow);
        if result.is_err() {
            state.reset();
        }
        result
    }

    /// One Serving iteration: drive indicators, wait for an event, apply it
    pub fn serve_once<S: HardwareSource>(&self, source: &mut S, sink: &mut dyn IndicatorSink) -> Result<()> {
        self.derive_indicators().apply(sink)?;
        let event = source.next_event()?;
        self.apply_event(&event, source)
    }

    /// Rebuild and serve until `shutdown` is set or a step fails
    fn run_cycle<S: HardwareSource>(
        &self,
        source: &mut S,
        sink: &mut dyn IndicatorSink,
        shutdown: &AtomicBool,
    ) -> Result<()> {
        self.rebuild(source)?;
        while !shutdown.load(Ordering::SeqCst) {
            self.serve_once(source, sink)?;
        }
        Ok(())
    }

    /// Run the loop until `shutdown` is set.
    ///
    /// The flag is checked between iterations and during the backoff; a
    /// blocked event wait is not interrupted.
    pub fn run<S: HardwareSource>(&self, source: &mut S, sink: &mut dyn IndicatorSink, shutdown: &AtomicBool) {
        let backoff = Duration::from_millis(self.config.retry_backoff_ms);
        info!("Reconciliation loop starting (retry backoff {:?})", backoff);
        let mut attempt: u32 = 0;

        while !shutdown.load(Ordering::SeqCst) {
            let Err(e) = self.run_cycle(source, sink, shutdown) else {
                break;
            };

            // Readers must not see the set from before the failure
            self.state.lock().reset();
            self.enter(LoopPhase::Retrying);
            attempt = attempt.saturating_add(1);
            if e.is_retryable() {
                warn!("Reconciliation failed: {} - rebuilding in {:?} (attempt {})", e, backoff, attempt);
            } else {
                error!("Reconciliation failed: {} - rebuilding in {:?} (attempt {})", e, backoff, attempt);
            }
            sleep_unless_shutdown(backoff, shutdown);
        }

        info!("Reconciliation loop stopped");
    }
}

fn sleep_unless_shutdown(total: Duration, shutdown: &AtomicBool) {
    const STEP: Duration = Duration::from_millis(100);
    let mut remaining = total;
    while !remaining.is_zero() && !shutdown.load(Ordering::SeqCst) {
        let step = remaining.min(STEP);
        std::thread::sleep(step);
        remaining -= step;
    }
}
