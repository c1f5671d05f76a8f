//! Condition management helpers following Kubernetes API conventions

use chrono::Utc;

use crate::crd::{Condition, ReplsetStatus};

/// Standard condition types following Kubernetes conventions
pub const CONDITION_TYPE_READY: &str = "Ready";
pub const CONDITION_TYPE_PROGRESSING: &str = "Progressing";
pub const CONDITION_TYPE_DEGRADED: &str = "Degraded";

/// Standard condition statuses
pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

/// Update or add a condition to the conditions list
///
/// The transition time only moves when the status changes.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    let now = Utc::now().to_rfc3339();

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        let should_update_time = existing.status != status;

        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();

        if should_update_time {
            existing.last_transition_time = now;
        }
    } else {
        conditions.push(Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            last_transition_time: now,
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation: None,
        });
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Check if a condition is true
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(|c| c.status == CONDITION_STATUS_TRUE)
        .unwrap_or(false)
}

fn bool_status(value: bool) -> &'static str {
    if value {
        CONDITION_STATUS_TRUE
    } else {
        CONDITION_STATUS_FALSE
    }
}

/// Derive Ready/Progressing/Degraded from the observed replica sets.
///
/// `previous` keeps transition times stable across reconcile passes.
pub fn cluster_conditions(
    previous: &[Condition],
    replsets: &[ReplsetStatus],
    generation: Option<i64>,
) -> Vec<Condition> {
    let mut conditions = previous.to_vec();

    let not_ready: Vec<&str> = replsets
        .iter()
        .filter(|r| !r.is_ready())
        .map(|r| r.name.as_str())
        .collect();
    let updating: Vec<&str> = replsets
        .iter()
        .filter(|r| r.updating)
        .map(|r| r.name.as_str())
        .collect();
    let unreachable: Vec<&str> = replsets
        .iter()
        .flat_map(|r| r.members.iter())
        .filter(|m| m.address.is_none())
        .map(|m| m.name.as_str())
        .collect();

    let ready = !replsets.is_empty() && not_ready.is_empty();
    let (reason, message) = if ready {
        ("AllReplsetsReady", "All replica sets are ready".to_string())
    } else {
        (
            "ReplsetsNotReady",
            format!("Replica sets not ready: {}", not_ready.join(", ")),
        )
    };
    set_condition(
        &mut conditions,
        CONDITION_TYPE_READY,
        bool_status(ready),
        reason,
        &message,
    );

    let (reason, message) = if updating.is_empty() {
        ("RolloutComplete", "No rollout in progress".to_string())
    } else {
        (
            "RolloutInProgress",
            format!("Rolling out: {}", updating.join(", ")),
        )
    };
    set_condition(
        &mut conditions,
        CONDITION_TYPE_PROGRESSING,
        bool_status(!updating.is_empty()),
        reason,
        &message,
    );

    let (reason, message) = if unreachable.is_empty() {
        ("NoIssues", "No degradation detected".to_string())
    } else {
        (
            "MemberAddressUnknown",
            format!("No mongodb address for: {}", unreachable.join(", ")),
        )
    };
    set_condition(
        &mut conditions,
        CONDITION_TYPE_DEGRADED,
        bool_status(!unreachable.is_empty()),
        reason,
        &message,
    );

    for condition in conditions.iter_mut() {
        condition.observed_generation = generation;
    }
    conditions
}
