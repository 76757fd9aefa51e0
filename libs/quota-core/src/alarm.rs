use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::AlarmDefinition;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlarmError {
    #[error("alarm name cannot be empty")]
    EmptyName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmMatch {
    pub name: String,
    pub threshold_percent: u32,
}

/// Named percentage thresholds, kept ordered by name so that ties between
/// alarms with equal thresholds always resolve the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlarmRegistry {
    alarms: BTreeMap<String, u32>,
}

impl AlarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the alarm with this name. Returns the previous
    /// threshold when one was replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        threshold_percent: u32,
    ) -> Result<Option<u32>, AlarmError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AlarmError::EmptyName);
        }
        Ok(self.alarms.insert(name, threshold_percent))
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.alarms.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.alarms.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.alarms
            .iter()
            .map(|(name, threshold)| (name.as_str(), *threshold))
    }

    pub fn definitions(&self) -> Vec<AlarmDefinition> {
        self.iter()
            .map(|(name, threshold)| AlarmDefinition::new(name, threshold))
            .collect()
    }

    pub fn evaluate(&self, usage: u64, limit: f64) -> Option<AlarmMatch> {
        evaluate(usage, limit, self)
    }
}

impl FromIterator<AlarmDefinition> for AlarmRegistry {
    fn from_iter<T: IntoIterator<Item = AlarmDefinition>>(iter: T) -> Self {
        let mut registry = AlarmRegistry::new();
        for alarm in iter {
            if !alarm.name.trim().is_empty() {
                registry.alarms.insert(alarm.name, alarm.threshold_percent);
            }
        }
        registry
    }
}

/// Finds the most severe alarm crossed by `usage` against `limit`.
///
/// A limit of zero or below cannot be evaluated and never matches. Usage above
/// the limit gives a percentage over 100 and still matches. Among alarms with
/// the same highest matched threshold the first by name wins.
pub fn evaluate(usage: u64, limit: f64, alarms: &AlarmRegistry) -> Option<AlarmMatch> {
    if limit.is_nan() || limit <= 0.0 {
        return None;
    }

    let percent = usage as f64 * 100.0 / limit;
    let mut best: Option<(&str, u32)> = None;

    for (name, threshold) in alarms.iter() {
        if f64::from(threshold) > percent {
            continue;
        }
        // strict comparison keeps the earlier name on equal thresholds
        if best.map_or(true, |(_, current)| threshold > current) {
            best = Some((name, threshold));
        }
    }

    best.map(|(name, threshold_percent)| AlarmMatch {
        name: name.to_string(),
        threshold_percent,
    })
}
