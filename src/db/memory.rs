use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::gateway::{ChangeSet, Gateway, WorkOrderFilter, WorkOrderWrite};
use super::models::*;
use crate::error::{LifecycleError, LifecycleResult};

#[derive(Default)]
struct Tables {
    work_orders: HashMap<Uuid, WorkOrder>,
    acceptances: Vec<Acceptance>,
    deliveries: Vec<Delivery>,
    corrections: Vec<Correction>,
    activities: Vec<ActivityRecord>,
    notifications: Vec<Notification>,
}

impl Tables {
    /// Checks every constraint the change set relies on before anything is
    /// written, so a rejected change set leaves the tables untouched.
    fn check(&self, changes: &ChangeSet) -> LifecycleResult<()> {
        match &changes.work_order {
            Some(WorkOrderWrite::Insert(order)) => {
                if self.work_orders.contains_key(&order.id) {
                    return Err(LifecycleError::Conflict(format!(
                        "work order {} already exists",
                        order.id
                    )));
                }
            }
            Some(WorkOrderWrite::Update {
                record,
                expected_version,
            }) => {
                let stored = self
                    .work_orders
                    .get(&record.id)
                    .ok_or_else(|| LifecycleError::not_found("work order", record.id))?;
                if stored.version != *expected_version {
                    return Err(LifecycleError::Conflict(format!(
                        "work order {} is at version {}, expected {}",
                        record.id, stored.version, expected_version
                    )));
                }
            }
            None => {}
        }

        // Simulate the partial unique index on current acceptances.
        let mut current: HashMap<(Uuid, Uuid), Uuid> = self
            .acceptances
            .iter()
            .filter(|a| a.is_current())
            .map(|a| ((a.work_order_id, a.drafter_id), a.id))
            .collect();
        for acceptance in &changes.acceptances {
            let key = (acceptance.work_order_id, acceptance.drafter_id);
            if !acceptance.is_current() {
                if current.get(&key) == Some(&acceptance.id) {
                    current.remove(&key);
                }
                continue;
            }
            match current.get(&key) {
                Some(existing) if *existing != acceptance.id => {
                    return Err(LifecycleError::Conflict(format!(
                        "work order {} already has a current acceptance for drafter {}",
                        acceptance.work_order_id, acceptance.drafter_id
                    )));
                }
                _ => {
                    current.insert(key, acceptance.id);
                }
            }
        }
        Ok(())
    }

    fn write(&mut self, changes: ChangeSet) {
        match changes.work_order {
            Some(WorkOrderWrite::Insert(order))
            | Some(WorkOrderWrite::Update { record: order, .. }) => {
                self.work_orders.insert(order.id, order);
            }
            None => {}
        }
        for acceptance in changes.acceptances {
            match self.acceptances.iter_mut().find(|a| a.id == acceptance.id) {
                Some(existing) => {
                    // signature fields never change once written
                    let mut next = acceptance;
                    next.signature = existing.signature.take().or(next.signature);
                    next.signed_at = existing.signed_at.or(next.signed_at);
                    next.accepted_at = existing.accepted_at.or(next.accepted_at);
                    *existing = next;
                }
                None => self.acceptances.push(acceptance),
            }
        }
        self.deliveries.extend(changes.deliveries);
        self.corrections.extend(changes.corrections);
        for id in changes.resolved_corrections {
            if let Some(c) = self.corrections.iter_mut().find(|c| c.id == id) {
                c.status = WorkOrderStatus::Corrected;
            }
        }
        self.activities.extend(changes.activities);
        self.notifications.extend(changes.notifications);
    }
}

/// Process-local gateway. Backs the `memory` storage backend and the tests.
#[derive(Default)]
pub struct MemoryGateway {
    tables: RwLock<Tables>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn work_order(&self, id: Uuid) -> LifecycleResult<Option<WorkOrder>> {
        Ok(self.tables.read().await.work_orders.get(&id).cloned())
    }

    async fn work_orders(&self, filter: &WorkOrderFilter) -> LifecycleResult<Vec<WorkOrder>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<WorkOrder> = tables
            .work_orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.deadline.cmp(&b.deadline).then(a.created_at.cmp(&b.created_at)));
        Ok(orders)
    }

    async fn current_acceptance(
        &self,
        work_order_id: Uuid,
        drafter_id: Uuid,
    ) -> LifecycleResult<Option<Acceptance>> {
        Ok(self
            .tables
            .read()
            .await
            .acceptances
            .iter()
            .find(|a| {
                a.work_order_id == work_order_id && a.drafter_id == drafter_id && a.is_current()
            })
            .cloned())
    }

    async fn acceptances(&self, work_order_id: Uuid) -> LifecycleResult<Vec<Acceptance>> {
        Ok(self
            .tables
            .read()
            .await
            .acceptances
            .iter()
            .filter(|a| a.work_order_id == work_order_id)
            .cloned()
            .collect())
    }

    async fn deliveries(&self, work_order_id: Uuid) -> LifecycleResult<Vec<Delivery>> {
        Ok(self
            .tables
            .read()
            .await
            .deliveries
            .iter()
            .filter(|d| d.work_order_id == work_order_id)
            .cloned()
            .collect())
    }

    async fn corrections(&self, work_order_id: Uuid) -> LifecycleResult<Vec<Correction>> {
        Ok(self
            .tables
            .read()
            .await
            .corrections
            .iter()
            .filter(|c| c.work_order_id == work_order_id)
            .cloned()
            .collect())
    }

    async fn activities(&self, work_order_id: Uuid) -> LifecycleResult<Vec<ActivityRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .activities
            .iter()
            .filter(|a| a.work_order_id == Some(work_order_id))
            .cloned()
            .collect())
    }

    async fn notifications(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
    ) -> LifecycleResult<Vec<Notification>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id && (!unread_only || !n.read))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn apply(&self, changes: ChangeSet) -> LifecycleResult<()> {
        let mut tables = self.tables.write().await;
        tables.check(&changes)?;
        tables.write(changes);
        Ok(())
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
        at: DateTime<Utc>,
    ) -> LifecycleResult<Option<Notification>> {
        let mut tables = self.tables.write().await;
        let Some(notification) = tables
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == recipient_id)
        else {
            return Ok(None);
        };
        if !notification.read {
            notification.read = true;
            notification.read_at = Some(at);
        }
        Ok(Some(notification.clone()))
    }
}
