//! Import condition reporting
//!
//! Conditions are keyed by type. Setting a condition replaces the existing
//! entry of the same type in place, otherwise it is appended, so unrelated
//! types keep their insertion order.

use chrono::{DateTime, Utc};

use crate::crd::{Condition, ConditionStatus};
use crate::model::{ClusterIdentity, ClusterRecord};

/// Condition type reporting the outcome of the last import attempt
pub const IMPORT_SUCCEEDED: &str = "ImportSucceeded";

pub const REASON_IMPORTED: &str = "Imported";
pub const REASON_NOT_IMPORTED: &str = "NotImported";

/// Condition for a successful import
pub fn import_succeeded(now: DateTime<Utc>) -> Condition {
    Condition {
        type_: IMPORT_SUCCEEDED.to_string(),
        status: ConditionStatus::True,
        last_transition_time: now,
        reason: REASON_IMPORTED.to_string(),
        message: "Import succeeded".to_string(),
        observed_generation: None,
    }
}

/// Condition for a failed import, carrying the underlying error text
pub fn import_failed(
    identity: &ClusterIdentity,
    error: &dyn std::fmt::Display,
    now: DateTime<Utc>,
) -> Condition {
    Condition {
        type_: IMPORT_SUCCEEDED.to_string(),
        status: ConditionStatus::False,
        last_transition_time: now,
        reason: REASON_NOT_IMPORTED.to_string(),
        message: format!("Unable to import {}: {}", identity, error),
        observed_generation: None,
    }
}

/// Merge `condition` into `conditions` by type.
///
/// The transition time of an existing entry is kept when its status value
/// does not change. Returns `true` when anything observable changed.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            let changed = *existing != condition;
            *existing = condition;
            changed
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

impl ClusterRecord {
    /// Set a condition on this record, see [`set_condition`]
    pub fn set_condition(&mut self, condition: Condition) -> bool {
        set_condition(&mut self.conditions, condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn condition(type_: &str, status: bool, message: &str, at: DateTime<Utc>) -> Condition {
        Condition {
            type_: type_.to_string(),
            status: status.into(),
            last_transition_time: at,
            reason: "Test".to_string(),
            message: message.to_string(),
            observed_generation: None,
        }
    }

    #[test]
    fn appends_new_types_in_order() {
        let now = Utc::now();
        let mut conditions = Vec::new();
        assert!(set_condition(&mut conditions, condition("A", true, "", now)));
        assert!(set_condition(&mut conditions, condition("B", true, "", now)));

        let types: Vec<_> = conditions.iter().map(|c| c.type_.as_str()).collect();
        assert_eq!(types, ["A", "B"]);
    }

    #[test]
    fn second_set_of_same_type_wins_in_place() {
        let now = Utc::now();
        let mut conditions = vec![
            condition("A", true, "a", now),
            condition(IMPORT_SUCCEEDED, false, "first", now),
            condition("C", true, "c", now),
        ];

        set_condition(&mut conditions, condition(IMPORT_SUCCEEDED, true, "second", now));

        assert_eq!(conditions.len(), 3);
        let matching: Vec<_> = conditions
            .iter()
            .filter(|c| c.type_ == IMPORT_SUCCEEDED)
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].message, "second");
        assert_eq!(conditions[1].type_, IMPORT_SUCCEEDED);
    }

    #[test]
    fn other_types_are_left_untouched() {
        let now = Utc::now();
        let mut joined = condition("ManagedClusterJoined", true, "joined", now);
        joined.observed_generation = Some(4);
        let mut conditions = vec![joined.clone()];

        set_condition(&mut conditions, import_succeeded(now));

        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0], joined);
    }

    #[test]
    fn transition_time_only_moves_on_status_change() {
        let earlier = Utc::now() - Duration::minutes(10);
        let later = Utc::now();
        let mut conditions = vec![condition(IMPORT_SUCCEEDED, false, "try 1", earlier)];

        set_condition(&mut conditions, condition(IMPORT_SUCCEEDED, false, "try 2", later));
        assert_eq!(conditions[0].last_transition_time, earlier);
        assert_eq!(conditions[0].message, "try 2");

        set_condition(&mut conditions, condition(IMPORT_SUCCEEDED, true, "ok", later));
        assert_eq!(conditions[0].last_transition_time, later);
    }

    #[test]
    fn identical_condition_reports_no_change() {
        let now = Utc::now();
        let mut conditions = vec![import_succeeded(now)];
        assert!(!set_condition(&mut conditions, import_succeeded(now + Duration::seconds(5))));
    }

    #[test]
    fn failure_message_names_cluster_and_cause() {
        let c = import_failed(&ClusterIdentity::new("c1"), &"connection refused", Utc::now());
        assert_eq!(c.status, ConditionStatus::False);
        assert_eq!(c.reason, REASON_NOT_IMPORTED);
        assert_eq!(c.message, "Unable to import c1: connection refused");
    }
}
