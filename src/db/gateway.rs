use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::*;
use crate::error::LifecycleResult;

/// Write to the aggregate root carried by a [`ChangeSet`].
#[derive(Debug, Clone)]
pub enum WorkOrderWrite {
    Insert(WorkOrder),
    /// Replace the row only if it is still at `expected_version`.
    Update {
        record: WorkOrder,
        expected_version: i64,
    },
}

/// Every row touched by one lifecycle operation. Gateways apply it all or
/// nothing, in field order.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub work_order: Option<WorkOrderWrite>,
    /// Upserted by id.
    pub acceptances: Vec<Acceptance>,
    pub deliveries: Vec<Delivery>,
    pub corrections: Vec<Correction>,
    /// Open corrections answered by a delivery in this change set.
    pub resolved_corrections: Vec<Uuid>,
    pub activities: Vec<ActivityRecord>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkOrderFilter {
    pub owner_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    /// With `assignee_id`, also match unassigned pending orders.
    pub include_unassigned: bool,
    pub status: Option<WorkOrderStatus>,
}

impl WorkOrderFilter {
    pub fn matches(&self, order: &WorkOrder) -> bool {
        if let Some(owner) = self.owner_id {
            if order.owner_id != owner {
                return false;
            }
        }
        if let Some(assignee) = self.assignee_id {
            let open = self.include_unassigned
                && order.assignee_id.is_none()
                && order.status == WorkOrderStatus::Pending;
            if order.assignee_id != Some(assignee) && !open {
                return false;
            }
        }
        self.status.map_or(true, |s| order.status == s)
    }
}

/// Storage seen by the lifecycle engine.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn work_order(&self, id: Uuid) -> LifecycleResult<Option<WorkOrder>>;

    async fn work_orders(&self, filter: &WorkOrderFilter) -> LifecycleResult<Vec<WorkOrder>>;

    async fn current_acceptance(
        &self,
        work_order_id: Uuid,
        drafter_id: Uuid,
    ) -> LifecycleResult<Option<Acceptance>>;

    /// All acceptances of a work order, superseded ones included.
    async fn acceptances(&self, work_order_id: Uuid) -> LifecycleResult<Vec<Acceptance>>;

    async fn deliveries(&self, work_order_id: Uuid) -> LifecycleResult<Vec<Delivery>>;

    async fn corrections(&self, work_order_id: Uuid) -> LifecycleResult<Vec<Correction>>;

    async fn activities(&self, work_order_id: Uuid) -> LifecycleResult<Vec<ActivityRecord>>;

    async fn notifications(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
    ) -> LifecycleResult<Vec<Notification>>;

    /// Applies the change set atomically. Fails with `Conflict` when the
    /// work order version moved or a current acceptance already exists.
    async fn apply(&self, changes: ChangeSet) -> LifecycleResult<()>;

    /// Returns `None` when no such notification belongs to `recipient_id`.
    async fn mark_notification_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
        at: DateTime<Utc>,
    ) -> LifecycleResult<Option<Notification>>;
}
