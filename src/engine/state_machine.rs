use std::fmt;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{render_states, AppError};
use crate::models::delivery::{Delivery, DeliveryStatus};

impl DeliveryStatus {
    /// The adjacency table of the delivery workflow.
    pub const fn next_states(self) -> &'static [DeliveryStatus] {
        match self {
            DeliveryStatus::Created => &[DeliveryStatus::Assigned],
            DeliveryStatus::Assigned => &[DeliveryStatus::InTransit],
            DeliveryStatus::InTransit => &[DeliveryStatus::Completed, DeliveryStatus::Failed],
            DeliveryStatus::Completed | DeliveryStatus::Failed => &[],
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Completed | DeliveryStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Terminal(DeliveryStatus),
    Invalid {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Terminal(current) => write!(
                f,
                "Cannot update delivery in {current} state. This is a terminal state."
            ),
            Rejection::Invalid { from, to } => write!(
                f,
                "Invalid transition from {from} to {to}. Valid transitions: {}",
                render_states(from.next_states())
            ),
        }
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Terminal(current) => AppError::TerminalState(current),
            Rejection::Invalid { from, to } => AppError::InvalidTransition {
                from,
                to,
                valid: from.next_states(),
            },
        }
    }
}

/// The single source of truth for transition rules.
pub fn check(current: DeliveryStatus, target: DeliveryStatus) -> Result<(), Rejection> {
    if current.is_terminal() {
        return Err(Rejection::Terminal(current));
    }

    if !current.next_states().contains(&target) {
        return Err(Rejection::Invalid {
            from: current,
            to: target,
        });
    }

    Ok(())
}

pub fn can_transition(current: DeliveryStatus, target: DeliveryStatus) -> (bool, Option<String>) {
    match check(current, target) {
        Ok(()) => (true, None),
        Err(rejection) => (false, Some(rejection.to_string())),
    }
}

pub fn ensure_transition(current: DeliveryStatus, target: DeliveryStatus) -> Result<(), AppError> {
    check(current, target).map_err(AppError::from)
}

/// Rejects a requested status that names no workflow state, judged against
/// where the delivery currently is.
pub fn reject_unknown(current: DeliveryStatus, target: &str) -> AppError {
    if current.is_terminal() {
        return AppError::TerminalState(current);
    }

    AppError::UnknownTarget {
        from: current,
        to: target.to_string(),
        valid: current.next_states(),
    }
}

/// Produces the post-transition record without touching the original.
///
/// Entering `ASSIGNED` needs an assignee, either passed in or already on the
/// record.
pub fn apply(
    delivery: &Delivery,
    target: DeliveryStatus,
    assignee: Option<Uuid>,
) -> Result<Delivery, AppError> {
    ensure_transition(delivery.status, target)?;

    let mut updated = delivery.clone();
    if let Some(assignee) = assignee {
        updated.assigned_to = Some(assignee);
    }
    if target == DeliveryStatus::Assigned && updated.assigned_to.is_none() {
        return Err(AppError::MissingField("assigned_to"));
    }

    updated.status = target;
    updated.updated_at = Utc::now();
    Ok(updated)
}
