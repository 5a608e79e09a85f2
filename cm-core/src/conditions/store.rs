//! Condition store
//!
//! Maps each currently-true condition to the time it was first observed.
//! A condition is present if and only if it is true; clearing removes it.
//!
//! Alarm transitions are logged at INFO (journald priority *notice*) with the
//! exact condition text, and `" cleared"` appended on clear. Informational
//! transitions go to DEBUG.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};

use super::{is_alarm, Pattern};

/// One active alarm as returned by [`ConditionStore::snapshot_alarms`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmRecord {
    pub timestamp: DateTime<Utc>,
    pub condition: String,
}

impl AlarmRecord {
    /// RFC 3339 UTC with microseconds, e.g. `2024-05-01T12:00:00.000000Z`
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl From<AlarmRecord> for cm_protocol::AlarmEntry {
    fn from(record: AlarmRecord) -> Self {
        Self {
            timestamp: record.timestamp_string(),
            condition: record.condition,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConditionStore {
    conditions: HashMap<String, DateTime<Utc>>,
}

impl ConditionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a condition true. Returns whether it was newly inserted.
    pub fn set_condition(&mut self, condition: &str) -> bool {
        self.set_condition_at(condition, Utc::now())
    }

    /// Mark a condition true with an explicit first-observed time.
    ///
    /// An already-present condition keeps its original timestamp.
    pub fn set_condition_at(&mut self, condition: &str, timestamp: DateTime<Utc>) -> bool {
        if self.conditions.contains_key(condition) {
            return false;
        }
        self.conditions.insert(condition.to_string(), timestamp);
        if is_alarm(condition) {
            info!("{}", condition);
        } else {
            debug!("{}", condition);
        }
        true
    }

    /// Mark a condition false. Returns whether it was present.
    pub fn clear_condition(&mut self, condition: &str) -> bool {
        if self.conditions.remove(condition).is_none() {
            return false;
        }
        if is_alarm(condition) {
            info!("{} cleared", condition);
        } else {
            debug!("{} cleared", condition);
        }
        true
    }

    /// Set the condition when `active`, clear it otherwise.
    pub fn set_or_clear(&mut self, condition: &str, active: bool) -> bool {
        if active {
            self.set_condition(condition)
        } else {
            self.clear_condition(condition)
        }
    }

    /// Clear every present condition whose full string matches `pattern`.
    ///
    /// Returns the number of conditions cleared.
    pub fn clear_matching(&mut self, pattern: &Pattern) -> usize {
        let matching = self.matching(pattern);
        for condition in &matching {
            self.clear_condition(condition);
        }
        if !matching.is_empty() {
            debug!("Cleared {} condition(s) matching '{}'", matching.len(), pattern);
        }
        matching.len()
    }

    /// Silently drop each of `previous`, then set `condition`.
    ///
    /// Used where a fact replaces its previous value outright and the caller
    /// logs the transition itself. Returns the number of conditions dropped.
    pub fn replace_conditions(&mut self, previous: &[String], condition: &str) -> usize {
        let dropped = previous
            .iter()
            .filter(|old| old.as_str() != condition && self.conditions.remove(old.as_str()).is_some())
            .count();
        self.conditions
            .entry(condition.to_string())
            .or_insert_with(Utc::now);
        dropped
    }

    /// Active alarms ordered by first-observed time, ties broken by condition text.
    pub fn snapshot_alarms(&self) -> Vec<AlarmRecord> {
        let mut alarms: Vec<AlarmRecord> = self
            .conditions
            .iter()
            .filter(|(condition, _)| is_alarm(condition))
            .map(|(condition, timestamp)| AlarmRecord {
                timestamp: *timestamp,
                condition: condition.clone(),
            })
            .collect();
        alarms.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.condition.cmp(&b.condition))
        });
        alarms
    }

    /// All present conditions, sorted
    pub fn identities(&self) -> Vec<String> {
        let mut all: Vec<String> = self.conditions.keys().cloned().collect();
        all.sort();
        all
    }

    pub fn contains(&self, condition: &str) -> bool {
        self.conditions.contains_key(condition)
    }

    pub fn timestamp(&self, condition: &str) -> Option<DateTime<Utc>> {
        self.conditions.get(condition).copied()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Forget every condition. Only used when rebuilding from a full scan.
    pub fn reset(&mut self) {
        self.conditions.clear();
    }

    fn matching(&self, pattern: &Pattern) -> Vec<String> {
        self.conditions
            .keys()
            .filter(|condition| pattern.matches(condition))
            .cloned()
            .collect()
    }
}
