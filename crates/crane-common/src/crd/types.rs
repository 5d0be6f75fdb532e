//! Shared status types for crane resources
//!
//! Conditions follow Kubernetes API conventions on the wire (a list of
//! condition objects) but are held in memory as a map keyed by condition
//! type, so lookups and upserts never have to pick between duplicates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., Available, ScalingDecision)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: DateTime<Utc>,

    /// Generation of the resource this condition was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
            observed_generation: None,
        }
    }

    /// Attach the generation this condition was observed at
    pub fn with_observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }
}

/// Conditions of a resource, keyed by condition type
///
/// Serialized as a list sorted by type.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
#[schemars(with = "Vec<Condition>")]
pub struct Conditions(BTreeMap<String, Condition>);

impl Conditions {
    /// Look up a condition by type
    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.0.get(type_)
    }

    /// Upsert a condition by type.
    ///
    /// The existing `lastTransitionTime` is kept when the status value does
    /// not change.
    pub fn set(&mut self, mut condition: Condition) {
        if let Some(existing) = self.0.get(&condition.type_) {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
        }
        self.0.insert(condition.type_.clone(), condition);
    }

    /// Whether no condition has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded conditions
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<Condition>> for Conditions {
    /// Later entries win when the list carries the same type twice.
    fn from(list: Vec<Condition>) -> Self {
        Self(list.into_iter().map(|c| (c.type_.clone(), c)).collect())
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.0.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cond(type_: &str, status: ConditionStatus, reason: &str) -> Condition {
        Condition::new(type_, status, reason, "msg")
    }

    #[test]
    fn set_keeps_transition_time_when_status_unchanged() {
        let mut conditions = Conditions::default();
        let mut first = cond("Available", ConditionStatus::True, "Reconciling");
        first.last_transition_time = Utc::now() - Duration::hours(1);
        let original_time = first.last_transition_time;
        conditions.set(first);

        let mut second = cond("Available", ConditionStatus::True, "Reconciling");
        second.message = "again".to_string();
        conditions.set(second);

        let stored = conditions.get("Available").unwrap();
        assert_eq!(stored.last_transition_time, original_time);
        assert_eq!(stored.message, "again");
    }

    #[test]
    fn set_refreshes_transition_time_when_status_changes() {
        let mut conditions = Conditions::default();
        let mut first = cond("Available", ConditionStatus::Unknown, "Reconciling");
        first.last_transition_time = Utc::now() - Duration::hours(1);
        let original_time = first.last_transition_time;
        conditions.set(first);

        conditions.set(cond("Available", ConditionStatus::False, "Reconciling"));

        let stored = conditions.get("Available").unwrap();
        assert!(stored.last_transition_time > original_time);
        assert_eq!(stored.status, ConditionStatus::False);
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn serializes_as_list_sorted_by_type() {
        let mut conditions = Conditions::default();
        conditions.set(cond("ScalingDecision", ConditionStatus::True, "HPA"));
        conditions.set(cond("Available", ConditionStatus::True, "Reconciling"));

        let value = serde_json::to_value(&conditions).unwrap();
        let list = value.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["type"], "Available");
        assert_eq!(list[1]["type"], "ScalingDecision");
        assert_eq!(list[1]["reason"], "HPA");
        assert!(list[0].get("lastTransitionTime").is_some());
        assert!(list[0].get("observedGeneration").is_none());
    }

    #[test]
    fn deserializes_from_list_with_last_duplicate_winning() {
        let json = serde_json::json!([
            {"type": "ScalingDecision", "status": "True", "reason": "HPA", "message": "",
             "lastTransitionTime": "2024-01-01T00:00:00Z"},
            {"type": "ScalingDecision", "status": "True", "reason": "VPA", "message": "",
             "lastTransitionTime": "2024-01-02T00:00:00Z", "observedGeneration": 3}
        ]);
        let conditions: Conditions = serde_json::from_value(json).unwrap();
        assert_eq!(conditions.len(), 1);
        let decision = conditions.get("ScalingDecision").unwrap();
        assert_eq!(decision.reason, "VPA");
        assert_eq!(decision.observed_generation, Some(3));
    }

    #[test]
    fn observed_generation_is_attached() {
        let c = cond("Available", ConditionStatus::True, "Reconciling").with_observed_generation(Some(7));
        assert_eq!(c.observed_generation, Some(7));
    }

    #[test]
    fn condition_status_display() {
        assert_eq!(ConditionStatus::True.to_string(), "True");
        assert_eq!(ConditionStatus::False.to_string(), "False");
        assert_eq!(ConditionStatus::Unknown.to_string(), "Unknown");
    }
}
