/*
 * Integration tests for Chassismon
 *
 * These drive the full engine (config -> monitor -> processors -> store ->
 * indicators) through the public API with a scripted hardware source.
 */

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use cm_core::{
    is_alarm, load_config, parse_config, Airflow, AttributeLookup, ChassisError, ConditionStore, EntityFact,
    EntityType, FanFact, HardwareEvent, HardwareSource, IndicatorSink, LoopPhase, Monitor, OperStatus, Pattern,
    Result, TempEntityFaultFact, TempFaultFact, TempLevel,
};
use cm_protocol::AlarmEntry;
use mockall::mock;

mock! {
    Leds {}
    impl IndicatorSink for Leds {
        fn set_indicator(&mut self, name: &str, on: bool) -> Result<()>;
    }
}

/// In-memory hardware: fixed scan results, a queue of events, fixed airflow
/// (normal unless set)
#[derive(Default)]
struct FakeChassis {
    entities: Vec<EntityFact>,
    fans: Vec<FanFact>,
    temp_faults: Vec<TempFaultFact>,
    temp_entity_faults: Vec<TempEntityFaultFact>,
    events: VecDeque<HardwareEvent>,
    airflow: Option<Airflow>,
    airflow_lookups: usize,
    subscriptions: usize,
    stop_when_drained: Option<Arc<AtomicBool>>,
}

impl AttributeLookup for FakeChassis {
    fn airflow(&mut self, _entity_type: &EntityType, _slot: u32) -> Result<Airflow> {
        self.airflow_lookups += 1;
        Ok(self.airflow.unwrap_or(Airflow::Normal))
    }
}

impl HardwareSource for FakeChassis {
    fn subscribe(&mut self) -> Result<()> {
        self.subscriptions += 1;
        Ok(())
    }

    fn scan_entities(&mut self) -> Result<Vec<EntityFact>> {
        Ok(self.entities.clone())
    }

    fn scan_fans(&mut self) -> Result<Vec<FanFact>> {
        Ok(self.fans.clone())
    }

    fn scan_temp_faults(&mut self) -> Result<Vec<TempFaultFact>> {
        Ok(self.temp_faults.clone())
    }

    fn scan_temp_entity_faults(&mut self) -> Result<Vec<TempEntityFaultFact>> {
        Ok(self.temp_entity_faults.clone())
    }

    fn next_event(&mut self) -> Result<HardwareEvent> {
        match self.events.pop_front() {
            Some(event) => Ok(event),
            None => {
                if let Some(flag) = &self.stop_when_drained {
                    flag.store(true, Ordering::SeqCst);
                }
                Err(ChassisError::SubscriptionClosed)
            }
        }
    }
}

fn entity(entity_type: EntityType, slot: u32, present: bool, ok: bool) -> EntityFact {
    EntityFact {
        entity_type,
        slot,
        present,
        oper_status: if ok { OperStatus::Ok } else { OperStatus::Failed },
    }
}

fn fan(slot: u32, fan_index: u32, ok: bool) -> FanFact {
    FanFact {
        entity_type: EntityType::Psu,
        slot,
        fan_index,
        oper_status: if ok { OperStatus::Ok } else { OperStatus::Failed },
    }
}

fn temp(sensor: &str, level: TempLevel) -> TempFaultFact {
    TempFaultFact {
        sensor: sensor.to_string(),
        level,
    }
}

fn monitor(config_json: &str) -> Monitor {
    Monitor::new(parse_config(config_json).unwrap())
}

fn quiet_leds() -> MockLeds {
    let mut leds = MockLeds::new();
    leds.expect_set_indicator().returning(|_, _| Ok(()));
    leds
}

/// Apply one event the way the serving loop does
fn step(monitor: &Monitor, chassis: &mut FakeChassis, event: HardwareEvent) {
    chassis.events.push_back(event);
    monitor.serve_once(chassis, &mut quiet_leds()).unwrap();
}

#[test]
fn test_psu_present_with_expected_airflow() {
    let monitor = monitor(r#"{"expected_airflow": "normal"}"#);
    let mut chassis = FakeChassis {
        entities: vec![entity(EntityType::Psu, 1, true, true)],
        ..Default::default()
    };
    monitor.rebuild(&mut chassis).unwrap();

    assert_eq!(monitor.conditions(), vec!["PSU 1 airflow normal present".to_string()]);
    assert!(monitor.active_alarms().is_empty());
}

#[test]
fn test_psu_goes_absent() {
    let monitor = monitor(r#"{"expected_airflow": "normal"}"#);
    let mut chassis = FakeChassis {
        entities: vec![entity(EntityType::Psu, 1, true, false)],
        fans: vec![fan(1, 0, false)],
        ..Default::default()
    };
    monitor.rebuild(&mut chassis).unwrap();
    assert_eq!(monitor.conditions().len(), 3);

    step(&monitor, &mut chassis, HardwareEvent::Entity(entity(EntityType::Psu, 1, false, false)));

    assert_eq!(monitor.conditions(), vec!["PSU 1 absent".to_string()]);
    let alarms = monitor.active_alarms();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].condition, "PSU 1 absent");

    // Fan facts for the absent PSU no longer have a memo entry
    step(&monitor, &mut chassis, HardwareEvent::Fan(fan(1, 0, false)));
    assert_eq!(monitor.conditions(), vec!["PSU 1 absent".to_string()]);
}

#[test]
fn test_reverse_airflow_mismatch() {
    let monitor = monitor(r#"{"expected_airflow": "normal"}"#);
    let mut chassis = FakeChassis {
        entities: vec![entity(EntityType::FanTray, 2, true, true)],
        airflow: Some(Airflow::Reverse),
        ..Default::default()
    };
    monitor.rebuild(&mut chassis).unwrap();

    let conditions = monitor.conditions();
    assert!(conditions.contains(&"Fan tray 2 airflow reverse incorrect airflow".to_string()));
    assert!(conditions.contains(&"Fan tray 2 airflow reverse present".to_string()));
    assert_eq!(chassis.airflow_lookups, 1);

    // Resolved airflow is not looked up again
    step(&monitor, &mut chassis, HardwareEvent::Entity(entity(EntityType::FanTray, 2, true, false)));
    assert_eq!(chassis.airflow_lookups, 1);
    assert!(monitor
        .conditions()
        .contains(&"Fan tray 2 airflow reverse fault".to_string()));
}

#[test]
fn test_temperature_level_replacement() {
    let monitor = monitor("{}");
    let mut chassis = FakeChassis {
        temp_faults: vec![temp("TEMP0", TempLevel::Major)],
        ..Default::default()
    };
    monitor.rebuild(&mut chassis).unwrap();
    assert_eq!(monitor.conditions(), vec!["Temperature sensor TEMP0 major".to_string()]);

    step(&monitor, &mut chassis, HardwareEvent::TempFault(temp("TEMP0", TempLevel::Critical)));
    assert_eq!(monitor.conditions(), vec!["Temperature sensor TEMP0 critical".to_string()]);

    // A repeat keeps the original first-observed time
    let first = monitor.active_alarms()[0].timestamp;
    step(&monitor, &mut chassis, HardwareEvent::TempFault(temp("TEMP0", TempLevel::Critical)));
    assert_eq!(monitor.active_alarms()[0].timestamp, first);

    // Back to nominal leaves an informational condition, not an alarm
    step(&monitor, &mut chassis, HardwareEvent::TempFault(temp("TEMP0", TempLevel::Nominal)));
    assert_eq!(monitor.conditions(), vec!["Temperature sensor TEMP0 nominal".to_string()]);
    assert!(monitor.active_alarms().is_empty());
}

#[test]
fn test_fan_before_entity_is_skipped() {
    let monitor = monitor("{}");
    let mut chassis = FakeChassis {
        fans: vec![fan(2, 0, false)],
        ..Default::default()
    };
    monitor.rebuild(&mut chassis).unwrap();
    assert!(monitor.conditions().is_empty());
    assert_eq!(monitor.phase(), LoopPhase::Serving);

    step(&monitor, &mut chassis, HardwareEvent::Fan(fan(2, 0, false)));
    assert!(monitor.conditions().is_empty());
    assert_eq!(monitor.phase(), LoopPhase::Serving);
}

#[test]
fn test_wrong_ppid_uses_memoized_airflow() {
    let monitor = monitor("{}");
    let mut chassis = FakeChassis {
        entities: vec![entity(EntityType::Psu, 3, true, true)],
        temp_entity_faults: vec![TempEntityFaultFact {
            entity_type: EntityType::Psu,
            slot: 3,
            wrong_ppid: true,
            wrong_airflow: false,
        }],
        ..Default::default()
    };
    monitor.rebuild(&mut chassis).unwrap();
    assert!(monitor
        .conditions()
        .contains(&"PSU 3 airflow normal incorrect PPID".to_string()));

    step(
        &monitor,
        &mut chassis,
        HardwareEvent::TempEntityFault(TempEntityFaultFact {
            entity_type: EntityType::Psu,
            slot: 3,
            wrong_ppid: false,
            wrong_airflow: false,
        }),
    );
    assert_eq!(monitor.conditions(), vec!["PSU 3 airflow normal present".to_string()]);
}

#[test]
fn test_system_board_fault() {
    let monitor = monitor("{}");
    let mut chassis = FakeChassis {
        entities: vec![entity(EntityType::SystemBoard, 0, true, false)],
        ..Default::default()
    };
    monitor.rebuild(&mut chassis).unwrap();
    assert_eq!(monitor.conditions(), vec!["System board fault".to_string()]);
    assert_eq!(chassis.airflow_lookups, 0);

    step(&monitor, &mut chassis, HardwareEvent::Entity(entity(EntityType::SystemBoard, 0, true, true)));
    assert!(monitor.conditions().is_empty());
}

#[test]
fn test_indicators_follow_conditions() {
    let monitor = monitor(
        r#"{
            "indicators": ["psu_fault", "temp_fault"],
            "indicator_rules": [
                {"pattern": "PSU .* (fault|absent)", "indicator": "psu_fault"},
                {"pattern": "Temperature sensor .* (major|critical)", "indicator": "temp_fault"}
            ]
        }"#,
    );
    let mut chassis = FakeChassis {
        entities: vec![entity(EntityType::Psu, 1, false, false)],
        temp_faults: vec![temp("TEMP1", TempLevel::Minor)],
        ..Default::default()
    };
    monitor.rebuild(&mut chassis).unwrap();

    let plan = monitor.derive_indicators();
    assert_eq!(plan.state("psu_fault"), Some(true));
    assert_eq!(plan.state("temp_fault"), Some(false));

    let mut leds = MockLeds::new();
    let mut seq = mockall::Sequence::new();
    leds.expect_set_indicator()
        .withf(|name, on| name == "psu_fault" && *on)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    leds.expect_set_indicator()
        .withf(|name, on| name == "temp_fault" && !*on)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    chassis
        .events
        .push_back(HardwareEvent::Entity(entity(EntityType::Psu, 1, true, true)));
    monitor.serve_once(&mut chassis, &mut leds).unwrap();

    assert_eq!(monitor.derive_indicators().state("psu_fault"), Some(false));
}

#[test]
fn test_run_rebuilds_after_failure_then_stops() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let monitor = monitor(r#"{"retry_backoff_ms": 100}"#);
    let mut chassis = FakeChassis {
        entities: vec![entity(EntityType::Psu, 2, false, false)],
        events: VecDeque::from(vec![HardwareEvent::TempFault(temp("TEMP0", TempLevel::Major))]),
        stop_when_drained: Some(shutdown.clone()),
        ..Default::default()
    };

    monitor.run(&mut chassis, &mut quiet_leds(), &shutdown);

    assert_eq!(chassis.subscriptions, 1);
    assert_eq!(monitor.phase(), LoopPhase::Retrying);
    assert!(monitor.active_alarms().is_empty());
}

#[test]
fn test_alarm_query_from_another_thread() {
    let monitor = monitor("{}");
    let mut chassis = FakeChassis {
        entities: vec![entity(EntityType::Psu, 1, false, false)],
        ..Default::default()
    };
    monitor.rebuild(&mut chassis).unwrap();

    let reader = monitor.clone();
    let alarms = std::thread::spawn(move || reader.active_alarms())
        .join()
        .unwrap();
    let entries: Vec<AlarmEntry> = alarms.into_iter().map(AlarmEntry::from).collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].condition, "PSU 1 absent");
    assert!(entries[0].timestamp.ends_with('Z'));
}

#[test]
fn test_store_snapshot_order_and_classification() {
    let mut store = ConditionStore::new();
    let at = |secs: i64| Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
    store.set_condition_at("Temperature sensor TEMP0 major", at(20));
    store.set_condition_at("PSU 1 airflow normal present", at(5));
    store.set_condition_at("Fan tray 1 absent", at(10));

    let alarms: Vec<String> = store.snapshot_alarms().into_iter().map(|a| a.condition).collect();
    assert_eq!(alarms, vec!["Fan tray 1 absent", "Temperature sensor TEMP0 major"]);

    assert_eq!(store.clear_matching(&Pattern::new(".* absent").unwrap()), 1);
    assert!(!is_alarm("Temperature sensor TEMP0 nominal"));
    assert!(is_alarm("System board fault"));
}

#[test]
fn test_config_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"expected_airflow": "reverse", "indicators": ["status"],
            "indicator_rules": [{{"pattern": ".* absent", "indicator": "status"}}]}}"#
    )
    .unwrap();
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.expected_airflow, Some(Airflow::Reverse));

    let monitor = Monitor::new(config);
    let mut chassis = FakeChassis {
        entities: vec![entity(EntityType::Psu, 4, false, false)],
        ..Default::default()
    };
    monitor.rebuild(&mut chassis).unwrap();
    assert_eq!(monitor.derive_indicators().state("status"), Some(true));
}

#[test]
fn test_config_rejects_unknown_indicator() {
    let err = parse_config(r#"{"indicators": [], "indicator_rules": [{"pattern": "x", "indicator": "led0"}]}"#)
        .unwrap_err();
    assert!(!err.is_retryable());
}
