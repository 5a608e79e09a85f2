//! Fact processors
//!
//! [`ConditionState`] owns the condition store and the airflow memo and
//! applies one hardware fact at a time to them. It holds no lock of its own:
//! the [`Monitor`](super::Monitor) wraps it in the single mutex shared with
//! the alarm-query path.

use tracing::{debug, info, trace, warn};

use crate::conditions::{format, ConditionStore, Pattern};
use crate::error::Result;
use crate::facts::{
    Airflow, EntityFact, EntityType, FanFact, HardwareEvent, TempEntityFaultFact, TempFaultFact, TempLevel,
};
use crate::source::AttributeLookup;

use super::AirflowMemo;

#[derive(Debug, Default, Clone)]
pub struct ConditionState {
    pub conditions: ConditionStore,
    pub airflow: AirflowMemo,
}

impl ConditionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all conditions and memoized airflow
    pub fn reset(&mut self) {
        self.conditions.reset();
        self.airflow.clear();
    }

    pub fn apply_event(
        &mut self,
        event: &HardwareEvent,
        lookup: &mut dyn AttributeLookup,
        expected_airflow: Option<Airflow>,
    ) -> Result<()> {
        trace!("Applying {} event: {:?}", event.category(), event);
        match event {
            HardwareEvent::Entity(fact) => self.apply_entity(fact, lookup, expected_airflow),
            HardwareEvent::Fan(fact) => self.apply_fan(fact),
            HardwareEvent::TempFault(fact) => self.apply_temp_fault(fact),
            HardwareEvent::TempEntityFault(fact) => self.apply_temp_entity_fault(fact),
        }
    }

    pub fn apply_entity(
        &mut self,
        fact: &EntityFact,
        lookup: &mut dyn AttributeLookup,
        expected_airflow: Option<Airflow>,
    ) -> Result<()> {
        let ty = Some(&fact.entity_type);
        let literal = format::literal(&fact.entity_type);
        let pattern_ty = Some(&literal);
        let slot = Some(fact.slot);
        let key = fact.key();

        if !fact.present {
            for pattern in [
                format::fan_fault(pattern_ty, slot, None, None),
                format::entity_fault(pattern_ty, slot, None),
                format::wrong_ppid(pattern_ty, slot, None),
                format::wrong_airflow(pattern_ty, slot, None),
                format::entity_present(pattern_ty, slot, None),
            ] {
                self.clear_pattern(&pattern)?;
            }
            self.conditions.set_condition(&format::entity_absent(ty, slot));
            if self.airflow.remove(&key).is_some() {
                debug!("Dropped airflow memo for {} {}", fact.entity_type, fact.slot);
            }
            return Ok(());
        }

        if fact.entity_type == EntityType::SystemBoard {
            self.conditions
                .set_or_clear(&format::system_board_fault(), !fact.oper_status.is_ok());
            return Ok(());
        }

        self.conditions.clear_condition(&format::entity_absent(ty, slot));

        let mut airflow = self.airflow.ensure(&key);
        if !airflow.is_resolved() {
            airflow = lookup.airflow(&fact.entity_type, fact.slot)?;
            self.airflow.resolve(&key, airflow);
            if airflow.is_resolved() {
                debug!("{} {} airflow resolved to {}", fact.entity_type, fact.slot, airflow);
                self.clear_pattern(&format::entity_fault(pattern_ty, slot, None))?;
                self.clear_pattern(&format::entity_present(pattern_ty, slot, None))?;
                if let Some(expected) = expected_airflow {
                    self.conditions.set_or_clear(
                        &format::wrong_airflow(ty, slot, Some(airflow)),
                        airflow != expected,
                    );
                }
            }
        }

        self.conditions
            .set_condition(&format::entity_present(ty, slot, Some(airflow)));
        self.conditions.set_or_clear(
            &format::entity_fault(ty, slot, Some(airflow)),
            !fact.oper_status.is_ok(),
        );
        Ok(())
    }

    /// Fans are keyed by their parent's memoized airflow. A fan whose parent
    /// has never been seen present has no memo entry; the fact is skipped with
    /// a warning and picked up again by the next rebuild.
    pub fn apply_fan(&mut self, fact: &FanFact) -> Result<()> {
        let Some(airflow) = self.airflow.get(&fact.key()) else {
            warn!(
                "Skipping fan {} of {} {}: airflow not yet known for its entity",
                fact.fan_index, fact.entity_type, fact.slot
            );
            return Ok(());
        };
        let condition = format::fan_fault(
            Some(&fact.entity_type),
            Some(fact.slot),
            Some(airflow),
            Some(fact.fan_index),
        );
        self.conditions
            .set_or_clear(&condition, !fact.oper_status.is_ok());
        Ok(())
    }

    /// A sensor holds exactly one level at a time. Every level change is
    /// logged, including a return to nominal; repeats are ignored.
    ///
    /// The previous level is dropped by exact identity, so sensor names are
    /// never interpreted as patterns.
    pub fn apply_temp_fault(&mut self, fact: &TempFaultFact) -> Result<()> {
        let condition = format::temperature(Some(&fact.sensor), Some(fact.level));
        if self.conditions.contains(&condition) {
            return Ok(());
        }
        let previous: Vec<String> = TempLevel::ALL
            .into_iter()
            .filter(|level| *level != fact.level)
            .map(|level| format::temperature(Some(&fact.sensor), Some(level)))
            .collect();
        self.conditions.replace_conditions(&previous, &condition);
        info!("{}", condition);
        Ok(())
    }

    pub fn apply_temp_entity_fault(&mut self, fact: &TempEntityFaultFact) -> Result<()> {
        let airflow = self.airflow.get(&fact.key()).unwrap_or(Airflow::Unknown);
        let ty = Some(&fact.entity_type);
        let slot = Some(fact.slot);
        self.conditions
            .set_or_clear(&format::wrong_ppid(ty, slot, Some(airflow)), fact.wrong_ppid);
        self.conditions
            .set_or_clear(&format::wrong_airflow(ty, slot, Some(airflow)), fact.wrong_airflow);
        Ok(())
    }

    fn clear_pattern(&mut self, pattern: &str) -> Result<usize> {
        let pattern = Pattern::new(pattern)?;
        Ok(self.conditions.clear_matching(&pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChassisError;
    use crate::facts::OperStatus;
    use crate::source::MockAttributeLookup;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    /// Collects formatted log output for assertions
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty())
                .collect()
        }
    }

    /// Run `f` with INFO-level output captured as bare message lines
    fn info_lines(f: impl FnOnce()) -> Vec<String> {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .with_level(false)
            .with_target(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        logs.lines()
    }

    fn entity(entity_type: EntityType, slot: u32, present: bool, ok: bool) -> EntityFact {
        EntityFact {
            entity_type,
            slot,
            present,
            oper_status: if ok { OperStatus::Ok } else { OperStatus::Failed },
        }
    }

    fn lookup_returning(airflow: Airflow) -> MockAttributeLookup {
        let mut lookup = MockAttributeLookup::new();
        lookup.expect_airflow().returning(move |_, _| Ok(airflow));
        lookup
    }

    #[test]
    fn test_present_psu_with_matching_airflow() {
        let mut state = ConditionState::new();
        let mut lookup = lookup_returning(Airflow::Normal);
        state
            .apply_entity(&entity(EntityType::Psu, 1, true, true), &mut lookup, Some(Airflow::Normal))
            .unwrap();
        assert_eq!(state.conditions.identities(), vec!["PSU 1 airflow normal present"]);
        assert_eq!(state.airflow.get(&(EntityType::Psu, 1)), Some(Airflow::Normal));
    }

    #[test]
    fn test_airflow_mismatch_sets_incorrect_airflow() {
        let mut state = ConditionState::new();
        let mut lookup = lookup_returning(Airflow::Reverse);
        state
            .apply_entity(&entity(EntityType::FanTray, 2, true, true), &mut lookup, Some(Airflow::Normal))
            .unwrap();
        assert!(state.conditions.contains("Fan tray 2 airflow reverse incorrect airflow"));
        assert!(state.conditions.contains("Fan tray 2 airflow reverse present"));
    }

    #[test]
    fn test_airflow_looked_up_once_resolved() {
        let mut state = ConditionState::new();
        let mut lookup = MockAttributeLookup::new();
        lookup.expect_airflow().times(1).returning(|_, _| Ok(Airflow::Normal));
        let fact = entity(EntityType::Psu, 1, true, true);
        state.apply_entity(&fact, &mut lookup, None).unwrap();
        state
            .apply_entity(&entity(EntityType::Psu, 1, true, false), &mut lookup, None)
            .unwrap();
        assert!(state.conditions.contains("PSU 1 airflow normal fault"));
    }

    #[test]
    fn test_unresolved_airflow_uses_wildcard_then_rekeys() {
        let mut state = ConditionState::new();
        let mut unknown = lookup_returning(Airflow::Unknown);
        state
            .apply_entity(&entity(EntityType::Psu, 1, true, false), &mut unknown, None)
            .unwrap();
        assert!(state.conditions.contains("PSU 1 airflow .* present"));
        assert!(state.conditions.contains("PSU 1 airflow .* fault"));

        let mut normal = lookup_returning(Airflow::Normal);
        state
            .apply_entity(&entity(EntityType::Psu, 1, true, false), &mut normal, None)
            .unwrap();
        assert_eq!(
            state.conditions.identities(),
            vec!["PSU 1 airflow normal fault", "PSU 1 airflow normal present"]
        );
    }

    #[test]
    fn test_absent_clears_everything_for_entity() {
        let mut state = ConditionState::new();
        let mut lookup = lookup_returning(Airflow::Normal);
        state
            .apply_entity(&entity(EntityType::Psu, 1, true, false), &mut lookup, None)
            .unwrap();
        state
            .apply_fan(&FanFact {
                entity_type: EntityType::Psu,
                slot: 1,
                fan_index: 0,
                oper_status: OperStatus::Failed,
            })
            .unwrap();
        state
            .apply_temp_entity_fault(&TempEntityFaultFact {
                entity_type: EntityType::Psu,
                slot: 1,
                wrong_ppid: true,
                wrong_airflow: true,
            })
            .unwrap();
        state
            .apply_entity(&entity(EntityType::Psu, 2, true, true), &mut lookup, None)
            .unwrap();

        state
            .apply_entity(&entity(EntityType::Psu, 1, false, false), &mut lookup, None)
            .unwrap();
        assert_eq!(
            state.conditions.identities(),
            vec!["PSU 1 absent", "PSU 2 airflow normal present"]
        );
        assert_eq!(state.airflow.get(&(EntityType::Psu, 1)), None);
    }

    #[test]
    fn test_present_again_clears_absent() {
        let mut state = ConditionState::new();
        let mut lookup = lookup_returning(Airflow::Normal);
        state
            .apply_entity(&entity(EntityType::FanTray, 3, false, false), &mut lookup, None)
            .unwrap();
        assert!(state.conditions.contains("Fan tray 3 absent"));
        state
            .apply_entity(&entity(EntityType::FanTray, 3, true, true), &mut lookup, None)
            .unwrap();
        assert!(!state.conditions.contains("Fan tray 3 absent"));
    }

    #[test]
    fn test_system_board_fault() {
        let mut state = ConditionState::new();
        let mut lookup = MockAttributeLookup::new();
        lookup.expect_airflow().never();
        state
            .apply_entity(&entity(EntityType::SystemBoard, 0, true, false), &mut lookup, Some(Airflow::Normal))
            .unwrap();
        assert_eq!(state.conditions.identities(), vec!["System board fault"]);
        state
            .apply_entity(&entity(EntityType::SystemBoard, 0, true, true), &mut lookup, Some(Airflow::Normal))
            .unwrap();
        assert!(state.conditions.is_empty());
        assert!(state.airflow.is_empty());
    }

    #[test]
    fn test_lookup_failure_propagates() {
        let mut state = ConditionState::new();
        let mut lookup = MockAttributeLookup::new();
        lookup
            .expect_airflow()
            .returning(|_, _| Err(ChassisError::transport("socket closed")));
        let err = state
            .apply_entity(&entity(EntityType::Psu, 1, true, true), &mut lookup, None)
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_fan_before_entity_is_skipped() {
        let mut state = ConditionState::new();
        state
            .apply_fan(&FanFact {
                entity_type: EntityType::Psu,
                slot: 2,
                fan_index: 0,
                oper_status: OperStatus::Failed,
            })
            .unwrap();
        assert!(state.conditions.is_empty());
        assert!(state.airflow.is_empty());
    }

    #[test]
    fn test_fan_fault_set_and_clear() {
        let mut state = ConditionState::new();
        let mut lookup = lookup_returning(Airflow::Reverse);
        state
            .apply_entity(&entity(EntityType::FanTray, 1, true, true), &mut lookup, None)
            .unwrap();
        let mut fan = FanFact {
            entity_type: EntityType::FanTray,
            slot: 1,
            fan_index: 2,
            oper_status: OperStatus::Failed,
        };
        state.apply_fan(&fan).unwrap();
        assert!(state.conditions.contains("Fan tray 1 airflow reverse fan 2 fault"));
        fan.oper_status = OperStatus::Ok;
        state.apply_fan(&fan).unwrap();
        assert!(!state.conditions.contains("Fan tray 1 airflow reverse fan 2 fault"));
    }

    #[test]
    fn test_temperature_level_replacement() {
        let mut state = ConditionState::new();
        let major = TempFaultFact { sensor: "TEMP0".into(), level: TempLevel::Major };
        state.apply_temp_fault(&major).unwrap();
        let first_seen = state.conditions.timestamp("Temperature sensor TEMP0 major");
        assert!(first_seen.is_some());

        state.apply_temp_fault(&major).unwrap();
        assert_eq!(state.conditions.timestamp("Temperature sensor TEMP0 major"), first_seen);

        state
            .apply_temp_fault(&TempFaultFact { sensor: "TEMP0".into(), level: TempLevel::Critical })
            .unwrap();
        assert_eq!(state.conditions.identities(), vec!["Temperature sensor TEMP0 critical"]);
    }

    #[test]
    fn test_temperature_sensor_name_is_not_a_pattern() {
        let mut state = ConditionState::new();
        for level in [TempLevel::Major, TempLevel::Critical, TempLevel::Nominal] {
            state
                .apply_temp_fault(&TempFaultFact { sensor: "CPU(0)".into(), level })
                .unwrap();
        }
        state
            .apply_temp_fault(&TempFaultFact { sensor: "TEMP(".into(), level: TempLevel::Minor })
            .unwrap();
        state
            .apply_temp_fault(&TempFaultFact { sensor: "TEMP(".into(), level: TempLevel::Warning })
            .unwrap();
        assert_eq!(
            state.conditions.identities(),
            vec!["Temperature sensor CPU(0) nominal", "Temperature sensor TEMP( warning"]
        );
    }

    #[test]
    fn test_other_entity_with_regex_characters_clears_when_absent() {
        let mut state = ConditionState::new();
        let mut lookup = lookup_returning(Airflow::Normal);
        let module = EntityType::Other("Line card (A+)".to_string());
        state
            .apply_entity(&entity(module.clone(), 2, true, false), &mut lookup, None)
            .unwrap();
        assert!(state.conditions.contains("Line card (A+) 2 airflow normal fault"));

        state
            .apply_entity(&entity(module, 2, false, false), &mut lookup, None)
            .unwrap();
        assert_eq!(state.conditions.identities(), vec!["Line card (A+) 2 absent"]);
    }

    #[test]
    fn test_alarm_transitions_logged_at_info() {
        let mut lookup = lookup_returning(Airflow::Normal);
        let lines = info_lines(|| {
            let mut state = ConditionState::new();
            state
                .apply_entity(&entity(EntityType::Psu, 1, false, true), &mut lookup, None)
                .unwrap();
            state
                .apply_entity(&entity(EntityType::Psu, 1, false, true), &mut lookup, None)
                .unwrap();
            state
                .apply_entity(&entity(EntityType::Psu, 1, true, true), &mut lookup, None)
                .unwrap();
            state
                .apply_entity(&entity(EntityType::Psu, 1, true, false), &mut lookup, None)
                .unwrap();
            state
                .apply_entity(&entity(EntityType::Psu, 1, true, true), &mut lookup, None)
                .unwrap();
        });
        assert_eq!(
            lines,
            vec![
                "PSU 1 absent",
                "PSU 1 absent cleared",
                "PSU 1 airflow normal fault",
                "PSU 1 airflow normal fault cleared",
            ]
        );
    }

    #[test]
    fn test_temperature_transitions_logged_once_each() {
        let lines = info_lines(|| {
            let mut state = ConditionState::new();
            for level in [TempLevel::Major, TempLevel::Major, TempLevel::Nominal, TempLevel::Nominal] {
                state
                    .apply_temp_fault(&TempFaultFact { sensor: "TEMP0".into(), level })
                    .unwrap();
            }
        });
        assert_eq!(
            lines,
            vec!["Temperature sensor TEMP0 major", "Temperature sensor TEMP0 nominal"]
        );
    }

    #[test]
    fn test_temp_entity_fault_without_memo_uses_wildcard() {
        let mut state = ConditionState::new();
        state
            .apply_temp_entity_fault(&TempEntityFaultFact {
                entity_type: EntityType::Psu,
                slot: 4,
                wrong_ppid: true,
                wrong_airflow: false,
            })
            .unwrap();
        assert_eq!(state.conditions.identities(), vec!["PSU 4 airflow .* incorrect PPID"]);
    }

    #[test]
    fn test_reset() {
        let mut state = ConditionState::new();
        let mut lookup = lookup_returning(Airflow::Normal);
        state
            .apply_entity(&entity(EntityType::Psu, 1, true, true), &mut lookup, None)
            .unwrap();
        state.reset();
        assert!(state.conditions.is_empty());
        assert!(state.airflow.is_empty());
    }
}
