//! Airflow memo
//!
//! Caches the resolved airflow direction of each PSU / fan tray. An entry is
//! created as `Unknown` the first time the entity is seen present and dropped
//! when it goes absent. Fan facts read the memo to key their conditions.

use std::collections::HashMap;

use crate::facts::{Airflow, EntityKey};

#[derive(Debug, Default, Clone)]
pub struct AirflowMemo {
    entries: HashMap<EntityKey, Airflow>,
}

impl AirflowMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoized airflow, or `None` if the entity has never been seen present
    pub fn get(&self, key: &EntityKey) -> Option<Airflow> {
        self.entries.get(key).copied()
    }

    /// Current airflow, inserting an unresolved entry if there is none
    pub fn ensure(&mut self, key: &EntityKey) -> Airflow {
        *self.entries.entry(key.clone()).or_insert(Airflow::Unknown)
    }

    pub fn resolve(&mut self, key: &EntityKey, airflow: Airflow) {
        self.entries.insert(key.clone(), airflow);
    }

    pub fn remove(&mut self, key: &EntityKey) -> Option<Airflow> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
