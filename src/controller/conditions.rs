//! Condition tracking shared by every status computation
//!
//! `update_condition` is the only way the controllers touch a condition list. It
//! knows nothing about canaries or rolling updates; callers decide the boolean.

use crate::crd::condition::{Condition, ConditionStatus, ConditionType};
use chrono::{DateTime, Utc};

/// Upsert a condition
///
/// - Absent type: appended only when `status` is true, or when `force_false` is set.
/// - Present type with a different status: status flips, both timestamps move to `now`.
/// - Present type with status true: reason/message are refreshed; `lastUpdateTime`
///   moves only when they actually change, so repeating a pass is a no-op.
pub fn update_condition(
    conditions: &mut Vec<Condition>,
    type_: ConditionType,
    status: bool,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
    force_false: bool,
) {
    let new_status = ConditionStatus::from(status);
    let timestamp = now.to_rfc3339();
    let reason = (!reason.is_empty()).then(|| reason.to_string());
    let message = (!message.is_empty()).then(|| message.to_string());

    match conditions.iter_mut().find(|c| c.type_ == type_) {
        None => {
            if status || force_false {
                conditions.push(Condition {
                    type_,
                    status: new_status,
                    last_transition_time: Some(timestamp.clone()),
                    last_update_time: Some(timestamp),
                    reason,
                    message,
                });
            }
        }
        Some(existing) if existing.status != new_status => {
            existing.status = new_status;
            existing.last_transition_time = Some(timestamp.clone());
            existing.last_update_time = Some(timestamp);
            existing.reason = reason;
            existing.message = message;
        }
        Some(existing) => {
            if status && (existing.reason != reason || existing.message != message) {
                existing.reason = reason;
                existing.message = message;
                existing.last_update_time = Some(timestamp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::condition::find_condition;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    #[test]
    fn test_absent_false_condition_is_not_recorded() {
        let mut conditions = Vec::new();
        update_condition(
            &mut conditions,
            ConditionType::CanaryPaused,
            false,
            "",
            "",
            t0(),
            false,
        );
        assert!(conditions.is_empty());
    }

    #[test]
    fn test_absent_false_condition_recorded_when_forced() {
        let mut conditions = Vec::new();
        update_condition(
            &mut conditions,
            ConditionType::CanaryPaused,
            false,
            "",
            "",
            t0(),
            true,
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, ConditionStatus::False);
    }

    #[test]
    fn test_transition_moves_timestamps() {
        let mut conditions = Vec::new();
        update_condition(
            &mut conditions,
            ConditionType::Canary,
            true,
            "Started",
            "",
            t0(),
            false,
        );
        let later = t0() + Duration::minutes(5);
        update_condition(
            &mut conditions,
            ConditionType::Canary,
            false,
            "Ended",
            "",
            later,
            false,
        );

        let cond = find_condition(&conditions, ConditionType::Canary).unwrap();
        assert_eq!(cond.status, ConditionStatus::False);
        assert_eq!(cond.transition_time(), Some(later));
        assert_eq!(cond.reason.as_deref(), Some("Ended"));
    }

    #[test]
    fn test_same_status_keeps_transition_time_and_refreshes_reason() {
        let mut conditions = Vec::new();
        update_condition(
            &mut conditions,
            ConditionType::PodRestarting,
            true,
            "Error",
            "pod a restarted 1 times",
            t0(),
            false,
        );
        let later = t0() + Duration::minutes(1);
        update_condition(
            &mut conditions,
            ConditionType::PodRestarting,
            true,
            "OOMKilled",
            "pod a restarted 2 times",
            later,
            false,
        );

        let cond = find_condition(&conditions, ConditionType::PodRestarting).unwrap();
        assert_eq!(cond.transition_time(), Some(t0()));
        assert_eq!(cond.update_time(), Some(later));
        assert_eq!(cond.reason.as_deref(), Some("OOMKilled"));
    }

    #[test]
    fn test_repeating_the_same_update_is_a_no_op() {
        let mut conditions = Vec::new();
        update_condition(
            &mut conditions,
            ConditionType::Active,
            true,
            "",
            "",
            t0(),
            false,
        );
        let before = conditions.clone();
        update_condition(
            &mut conditions,
            ConditionType::Active,
            true,
            "",
            "",
            t0() + Duration::hours(1),
            false,
        );
        assert_eq!(conditions, before);
    }
}
