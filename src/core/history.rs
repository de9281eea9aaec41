//! Transition log.
//!
//! When a machine definition is built with `record_transitions(true)`, every
//! state-changing transition is appended to a [`TransitionLog`] owned by the
//! root machine. The log is plain data and serializes with serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of a single state change.
///
/// # Example
///
/// ```rust
/// use hsm::core::TransitionRecord;
/// use chrono::Utc;
///
/// let record = TransitionRecord {
///     machine: "Player".to_string(),
///     region: 0,
///     from: "Stopped".to_string(),
///     to: "Playing".to_string(),
///     event: "Play".to_string(),
///     round: 1,
///     timestamp: Utc::now(),
/// };
/// assert_eq!(record.to, "Playing");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Name of the machine (or submachine) that took the transition
    pub machine: String,
    /// Region index inside that machine
    pub region: usize,
    pub from: String,
    pub to: String,
    /// Name of the triggering event
    pub event: String,
    /// Value of the root machine's round counter when the transition fired
    pub round: u64,
    pub timestamp: DateTime<Utc>,
}

/// Ordered log of transitions taken by a machine hierarchy.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransitionLog {
    records: Vec<TransitionRecord>,
}

impl TransitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: TransitionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// States traversed by one region of one machine.
    ///
    /// Returns the first `from` followed by every `to`, in order.
    ///
    /// ```rust
    /// use hsm::core::{TransitionLog, TransitionRecord};
    /// use chrono::Utc;
    ///
    /// let step = |from: &str, to: &str| TransitionRecord {
    ///     machine: "M".into(),
    ///     region: 0,
    ///     from: from.into(),
    ///     to: to.into(),
    ///     event: "Go".into(),
    ///     round: 1,
    ///     timestamp: Utc::now(),
    /// };
    ///
    /// let mut log = TransitionLog::new();
    /// log.record(step("A", "B"));
    /// log.record(step("B", "C"));
    /// assert_eq!(log.path("M", 0), vec!["A", "B", "C"]);
    /// ```
    pub fn path(&self, machine: &str, region: usize) -> Vec<&str> {
        let mut steps = self
            .records
            .iter()
            .filter(|record| record.machine == machine && record.region == region);
        let mut path = Vec::new();
        if let Some(first) = steps.next() {
            path.push(first.from.as_str());
            path.push(first.to.as_str());
        }
        path.extend(steps.map(|record| record.to.as_str()));
        path
    }

    /// Time between the first and the last recorded transition.
    pub fn duration(&self) -> Option<Duration> {
        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) => last
                .timestamp
                .signed_duration_since(first.timestamp)
                .to_std()
                .ok(),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
