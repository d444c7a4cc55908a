//! Work-order state machine.
//!
//! ```text
//! pending ─► accepted ─► in_progress ───────────────► completed
//!                             │                           ▲
//!                             ▼                           │
//!                  awaiting_correction ◄─► corrected ─────┘
//! ```
//!
//! Every non-terminal state may also move to `cancelled`.

use chrono::{DateTime, Utc};

use crate::db::{WorkOrder, WorkOrderStatus};
use crate::error::{LifecycleError, LifecycleResult};

impl WorkOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: WorkOrderStatus) -> bool {
        use WorkOrderStatus::*;
        match (self, next) {
            (from, Cancelled) => !from.is_terminal(),
            (Pending, Accepted) => true,
            (Accepted, InProgress) => true,
            (InProgress, AwaitingCorrection | Completed) => true,
            (AwaitingCorrection, Corrected | AwaitingCorrection) => true,
            (Corrected, AwaitingCorrection | Completed) => true,
            _ => false,
        }
    }

    /// States in which the assignee may hand in work.
    pub fn accepts_deliveries(&self) -> bool {
        use WorkOrderStatus::*;
        matches!(self, Accepted | InProgress | AwaitingCorrection | Corrected)
    }

    /// Status a work order moves to after a delivery.
    pub fn after_delivery(&self) -> WorkOrderStatus {
        match self {
            Self::Accepted => Self::InProgress,
            Self::AwaitingCorrection => Self::Corrected,
            other => *other,
        }
    }
}

/// Overdue is derived on every read and never stored.
pub fn is_overdue(deadline: DateTime<Utc>, status: WorkOrderStatus, now: DateTime<Utc>) -> bool {
    deadline < now && !status.is_terminal()
}

impl WorkOrder {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        is_overdue(self.deadline, self.status, now)
    }

    /// Copy of this order with its version bumped, ready for a
    /// compare-and-swap write.
    pub fn touched(&self, now: DateTime<Utc>) -> WorkOrder {
        let mut next = self.clone();
        next.version += 1;
        next.updated_at = now;
        next
    }

    /// Like [`touched`](Self::touched) but also moves the status, refusing
    /// edges the state machine does not allow.
    pub fn transition(
        &self,
        to: WorkOrderStatus,
        now: DateTime<Utc>,
    ) -> LifecycleResult<WorkOrder> {
        if !self.status.can_transition_to(to) {
            return Err(LifecycleError::precondition(format!(
                "work order {} cannot move from {} to {}",
                self.id, self.status, to
            )));
        }
        let mut next = self.touched(now);
        next.status = to;
        if to == WorkOrderStatus::Cancelled {
            next.cancelled_at = Some(now);
        }
        Ok(next)
    }
}
