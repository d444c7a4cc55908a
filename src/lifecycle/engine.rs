use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::commands::*;
use crate::db::*;
use crate::error::{LifecycleError, LifecycleResult};
use crate::identity::{Identity, Role};

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Let any drafter act on an unassigned pending order and claim it by
    /// accepting.
    pub allow_open_acceptance: bool,
}

/// Owns every work-order state change. Each operation reads, decides, and
/// hands a single [`ChangeSet`] to the gateway.
pub struct LifecycleEngine {
    gateway: Arc<dyn Gateway>,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
}

impl LifecycleEngine {
    pub fn new(gateway: Arc<dyn Gateway>, clock: Arc<dyn Clock>, options: EngineOptions) -> Self {
        Self {
            gateway,
            clock,
            options,
        }
    }

    async fn load(&self, id: Uuid) -> LifecycleResult<WorkOrder> {
        self.gateway
            .work_order(id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("work order", id))
    }

    async fn commit(&self, changes: ChangeSet) -> LifecycleResult<()> {
        match self.gateway.apply(changes).await {
            Err(LifecycleError::Conflict(msg)) => {
                warn!("Concurrent modification rejected: {}", msg);
                Err(LifecycleError::Conflict(msg))
            }
            Err(e) => {
                tracing::error!("Failed to apply change set: {}", e);
                Err(e)
            }
            ok => ok,
        }
    }

    fn ensure_owner_or_admin(caller: &Identity, order: &WorkOrder) -> LifecycleResult<()> {
        if caller.is_admin() || order.owner_id == caller.user_id {
            Ok(())
        } else {
            Err(LifecycleError::unauthorized(
                "only the owner or an admin may do this",
            ))
        }
    }

    fn ensure_assignee(caller: &Identity, order: &WorkOrder) -> LifecycleResult<()> {
        if order.assignee_id == Some(caller.user_id) {
            Ok(())
        } else {
            Err(LifecycleError::unauthorized(
                "only the assigned drafter may do this",
            ))
        }
    }

    /// Caller may take part in the acceptance protocol of `order`.
    fn ensure_acceptance_party(
        &self,
        caller: &Identity,
        order: &WorkOrder,
    ) -> LifecycleResult<()> {
        match order.assignee_id {
            Some(_) => Self::ensure_assignee(caller, order),
            None if self.options.allow_open_acceptance && caller.role == Role::Drafter => Ok(()),
            None => Err(LifecycleError::unauthorized(
                "work order has no assigned drafter",
            )),
        }
    }

    fn ensure_open(order: &WorkOrder) -> LifecycleResult<()> {
        if order.status.is_terminal() {
            return Err(LifecycleError::precondition(format!(
                "work order {} is {}",
                order.id, order.status
            )));
        }
        Ok(())
    }

    fn can_view(&self, caller: &Identity, order: &WorkOrder) -> bool {
        caller.is_admin()
            || order.owner_id == caller.user_id
            || order.assignee_id == Some(caller.user_id)
            || (self.options.allow_open_acceptance
                && caller.role == Role::Drafter
                && order.assignee_id.is_none()
                && order.status == WorkOrderStatus::Pending)
    }

    fn activity(
        &self,
        caller: &Identity,
        order: &WorkOrder,
        category: ActivityCategory,
        description: impl Into<String>,
        metadata: Option<serde_json::Value>,
        ip_address: Option<String>,
    ) -> ActivityRecord {
        ActivityRecord {
            id: Uuid::new_v4(),
            work_order_id: Some(order.id),
            actor_id: caller.user_id,
            actor_role: caller.role,
            category,
            description: description.into(),
            metadata,
            ip_address,
            created_at: self.clock.now(),
        }
    }

    pub async fn create(
        &self,
        caller: &Identity,
        input: NewWorkOrder,
    ) -> LifecycleResult<WorkOrder> {
        if caller.role == Role::Drafter {
            return Err(LifecycleError::unauthorized(
                "only responsibles and admins create work orders",
            ));
        }
        let title = required(&input.title, "title")?;
        let terms = required(&input.terms, "terms")?;
        let deadline = input
            .deadline
            .ok_or_else(|| LifecycleError::validation("deadline is required"))?;

        let now = self.clock.now();
        let order = WorkOrder {
            id: Uuid::new_v4(),
            owner_id: caller.user_id,
            assignee_id: input.assignee_id,
            title,
            work_type: input.work_type,
            description: input.description.trim().to_string(),
            source_link: optional(input.source_link.as_deref()),
            from_scratch: input.from_scratch,
            mandatory_corrections: input.mandatory_corrections,
            deadline,
            terms,
            status: WorkOrderStatus::Pending,
            version: 1,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        };

        let created = self.activity(
            caller,
            &order,
            ActivityCategory::Creation,
            format!("Work order '{}' created", order.title),
            Some(json!({ "work_type": order.work_type, "deadline": order.deadline })),
            None,
        );
        self.commit(ChangeSet {
            work_order: Some(WorkOrderWrite::Insert(order.clone())),
            activities: vec![created],
            ..Default::default()
        })
        .await?;

        info!("Work order {} created by {}", order.id, caller.user_id);
        Ok(order)
    }

    pub async fn update(
        &self,
        caller: &Identity,
        id: Uuid,
        patch: WorkOrderPatch,
    ) -> LifecycleResult<WorkOrder> {
        let order = self.load(id).await?;
        Self::ensure_owner_or_admin(caller, &order)?;
        Self::ensure_open(&order)?;

        let now = self.clock.now();
        let mut next = order.touched(now);
        let mut changed: Vec<&str> = Vec::new();

        if let Some(title) = patch.title {
            let title = required(&title, "title")?;
            if title != order.title {
                next.title = title;
                changed.push("title");
            }
        }
        if let Some(terms) = patch.terms {
            let terms = required(&terms, "terms")?;
            if terms != order.terms {
                next.terms = terms;
                changed.push("terms");
            }
        }
        if let Some(work_type) = patch.work_type.filter(|w| *w != order.work_type) {
            next.work_type = work_type;
            changed.push("work_type");
        }
        if let Some(description) = patch.description {
            let description = description.trim().to_string();
            if description != order.description {
                next.description = description;
                changed.push("description");
            }
        }
        if let Some(link) = patch.source_link {
            let link = optional(Some(link.as_str()));
            if link != order.source_link {
                next.source_link = link;
                changed.push("source_link");
            }
        }
        if let Some(flag) = patch.from_scratch.filter(|f| *f != order.from_scratch) {
            next.from_scratch = flag;
            changed.push("from_scratch");
        }
        if let Some(flag) = patch
            .mandatory_corrections
            .filter(|f| *f != order.mandatory_corrections)
        {
            next.mandatory_corrections = flag;
            changed.push("mandatory_corrections");
        }
        if let Some(deadline) = patch.deadline.filter(|d| *d != order.deadline) {
            next.deadline = deadline;
            changed.push("deadline");
        }
        let mut notifications = Vec::new();
        if let Some(assignee) = patch.assignee_id.filter(|a| Some(*a) != order.assignee_id) {
            if order.status != WorkOrderStatus::Pending {
                return Err(LifecycleError::precondition(
                    "the drafter can only change while the work order is pending",
                ));
            }
            next.assignee_id = Some(assignee);
            changed.push("assignee_id");
            notifications.push(Notification::new(
                assignee,
                Some(order.id),
                "New work order assigned",
                format!("You were assigned to '{}'", next.title),
                now,
            ));
        }

        if changed.is_empty() {
            return Ok(order);
        }

        let updated = self.activity(
            caller,
            &order,
            ActivityCategory::Update,
            format!("Work order updated: {}", changed.join(", ")),
            Some(json!({ "fields": changed })),
            None,
        );
        self.commit(ChangeSet {
            work_order: Some(WorkOrderWrite::Update {
                record: next.clone(),
                expected_version: order.version,
            }),
            activities: vec![updated],
            notifications,
            ..Default::default()
        })
        .await?;

        info!("Work order {} updated ({})", order.id, changed.join(", "));
        Ok(next)
    }

    /// Idempotent: a second call returns the stored acceptance unchanged.
    pub async fn mark_terms_read(
        &self,
        caller: &Identity,
        id: Uuid,
    ) -> LifecycleResult<Acceptance> {
        let order = self.load(id).await?;
        self.ensure_acceptance_party(caller, &order)?;
        Self::ensure_open(&order)?;

        let now = self.clock.now();
        let mut acceptance = self
            .gateway
            .current_acceptance(order.id, caller.user_id)
            .await?
            .unwrap_or_else(|| Acceptance::pending(order.id, caller.user_id, now));
        if acceptance.terms_read {
            return Ok(acceptance);
        }

        acceptance.terms_read = true;
        acceptance.terms_read_at = Some(now);
        if acceptance.status == AcceptanceStatus::Pending {
            acceptance.status = AcceptanceStatus::Read;
        }
        acceptance.updated_at = now;

        self.commit(ChangeSet {
            work_order: Some(WorkOrderWrite::Update {
                record: order.touched(now),
                expected_version: order.version,
            }),
            acceptances: vec![acceptance.clone()],
            ..Default::default()
        })
        .await?;

        info!("Terms of work order {} read by {}", order.id, caller.user_id);
        Ok(acceptance)
    }

    pub async fn accept(
        &self,
        caller: &Identity,
        id: Uuid,
        input: AcceptInput,
    ) -> LifecycleResult<Acceptance> {
        let signature = required(&input.signature, "signature")?;
        let order = self.load(id).await?;
        self.ensure_acceptance_party(caller, &order)?;

        let current = self
            .gateway
            .current_acceptance(order.id, caller.user_id)
            .await?;
        let reacceptance = order.status == WorkOrderStatus::AwaitingCorrection
            && current
                .as_ref()
                .is_some_and(|a| a.status != AcceptanceStatus::Accepted);
        if order.status != WorkOrderStatus::Pending && !reacceptance {
            return Err(LifecycleError::precondition(format!(
                "cannot accept a work order that is {}",
                order.status
            )));
        }

        let mut acceptance = match current {
            Some(a) if a.terms_read => a,
            _ => {
                return Err(LifecycleError::validation(
                    "terms must be read before accepting",
                ))
            }
        };
        if acceptance.signature.is_some() {
            return Err(LifecycleError::precondition("acceptance is already signed"));
        }

        let now = self.clock.now();
        acceptance.signature = Some(signature);
        acceptance.signed_at = Some(now);
        acceptance.accepted_at = Some(now);
        acceptance.status = AcceptanceStatus::Accepted;
        acceptance.anti_plagiarism_commitment = input.anti_plagiarism_commitment;
        acceptance.corrections_commitment = input.corrections_commitment;
        acceptance.refusal_reason = None;
        acceptance.ip_address = optional(input.ip_address.as_deref());
        acceptance.user_agent = optional(input.user_agent.as_deref());
        acceptance.updated_at = now;

        // re-acceptance keeps the status, only the version moves
        let mut next = if reacceptance {
            order.touched(now)
        } else {
            order.transition(WorkOrderStatus::Accepted, now)?
        };
        if next.assignee_id.is_none() {
            next.assignee_id = Some(caller.user_id);
        }

        let description = if reacceptance {
            format!("Updated terms re-accepted by {}", caller.role)
        } else {
            format!("Work order accepted by {}", caller.role)
        };
        let accepted = self.activity(
            caller,
            &order,
            ActivityCategory::Acceptance,
            description,
            Some(json!({
                "acceptance_id": acceptance.id,
                "anti_plagiarism_commitment": acceptance.anti_plagiarism_commitment,
                "corrections_commitment": acceptance.corrections_commitment,
            })),
            acceptance.ip_address.clone(),
        );
        self.commit(ChangeSet {
            work_order: Some(WorkOrderWrite::Update {
                record: next,
                expected_version: order.version,
            }),
            acceptances: vec![acceptance.clone()],
            activities: vec![accepted],
            ..Default::default()
        })
        .await?;

        info!("Work order {} accepted by {}", order.id, caller.user_id);
        Ok(acceptance)
    }

    pub async fn refuse(
        &self,
        caller: &Identity,
        id: Uuid,
        reason: &str,
    ) -> LifecycleResult<Acceptance> {
        let reason = required(reason, "refusal reason")?;
        let order = self.load(id).await?;
        self.ensure_acceptance_party(caller, &order)?;
        Self::ensure_open(&order)?;

        let now = self.clock.now();
        let mut acceptance = self
            .gateway
            .current_acceptance(order.id, caller.user_id)
            .await?
            .unwrap_or_else(|| Acceptance::pending(order.id, caller.user_id, now));
        if acceptance.status == AcceptanceStatus::Accepted {
            return Err(LifecycleError::precondition(
                "an accepted work order cannot be refused",
            ));
        }
        acceptance.status = AcceptanceStatus::Pending;
        acceptance.refusal_reason = Some(reason.clone());
        acceptance.updated_at = now;

        let refused = self.activity(
            caller,
            &order,
            ActivityCategory::Update,
            format!("Work order refused by {}", caller.role),
            Some(json!({ "reason": reason })),
            None,
        );
        let notice = Notification::new(
            order.owner_id,
            Some(order.id),
            "Work order refused",
            format!("'{}' was refused: {}", order.title, reason),
            now,
        );
        // the order version guards the acceptance row against a racing accept
        self.commit(ChangeSet {
            work_order: Some(WorkOrderWrite::Update {
                record: order.touched(now),
                expected_version: order.version,
            }),
            acceptances: vec![acceptance.clone()],
            activities: vec![refused],
            notifications: vec![notice],
            ..Default::default()
        })
        .await?;

        info!("Work order {} refused by {}", order.id, caller.user_id);
        Ok(acceptance)
    }

    pub async fn deliver(
        &self,
        caller: &Identity,
        id: Uuid,
        input: DeliveryInput,
    ) -> LifecycleResult<Delivery> {
        let file_ref = required(&input.file_ref, "file")?;
        let order = self.load(id).await?;
        Self::ensure_assignee(caller, &order)?;
        if !order.status.accepts_deliveries() {
            return Err(LifecycleError::precondition(format!(
                "cannot deliver a work order that is {}",
                order.status
            )));
        }
        let acceptance = self
            .gateway
            .current_acceptance(order.id, caller.user_id)
            .await?;
        if acceptance.is_some_and(|a| a.status != AcceptanceStatus::Accepted) {
            return Err(LifecycleError::precondition(
                "updated terms must be re-accepted before delivering",
            ));
        }

        let now = self.clock.now();
        let delivery = Delivery {
            id: Uuid::new_v4(),
            work_order_id: order.id,
            drafter_id: caller.user_id,
            file_ref,
            anti_plagiarism_report_ref: optional(input.anti_plagiarism_report_ref.as_deref()),
            notes: optional(input.notes.as_deref()),
            delivered_at: now,
        };

        let resolved_corrections = if order.status == WorkOrderStatus::AwaitingCorrection {
            self.gateway
                .corrections(order.id)
                .await?
                .into_iter()
                .filter(|c| c.status == WorkOrderStatus::AwaitingCorrection)
                .map(|c| c.id)
                .collect()
        } else {
            Vec::new()
        };

        let next_status = order.status.after_delivery();
        let next = if next_status == order.status {
            order.touched(now)
        } else {
            order.transition(next_status, now)?
        };

        let delivered = self.activity(
            caller,
            &order,
            ActivityCategory::Delivery,
            "Work delivered",
            Some(json!({
                "delivery_id": delivery.id,
                "file_ref": delivery.file_ref,
                "anti_plagiarism_report_ref": delivery.anti_plagiarism_report_ref,
            })),
            None,
        );
        let notice = Notification::new(
            order.owner_id,
            Some(order.id),
            "New delivery",
            format!("A new delivery was submitted for '{}'", order.title),
            now,
        );
        self.commit(ChangeSet {
            work_order: Some(WorkOrderWrite::Update {
                record: next,
                expected_version: order.version,
            }),
            deliveries: vec![delivery.clone()],
            resolved_corrections,
            activities: vec![delivered],
            notifications: vec![notice],
            ..Default::default()
        })
        .await?;

        info!("Work order {} delivered ({})", order.id, next_status);
        Ok(delivery)
    }

    pub async fn complete(
        &self,
        caller: &Identity,
        id: Uuid,
        checklist: CompletionChecklist,
    ) -> LifecycleResult<WorkOrder> {
        if !checklist.antiplagiarism_sent || !checklist.final_sent {
            return Err(LifecycleError::validation(
                "the anti-plagiarism report and the final version must both be sent",
            ));
        }
        let order = self.load(id).await?;
        Self::ensure_assignee(caller, &order)?;
        if self.gateway.deliveries(order.id).await?.is_empty() {
            return Err(LifecycleError::precondition(
                "cannot complete a work order without a delivery",
            ));
        }
        let now = self.clock.now();
        let next = order.transition(WorkOrderStatus::Completed, now)?;

        let completed = self.activity(
            caller,
            &order,
            ActivityCategory::Delivery,
            "Work order completed by drafter",
            Some(json!(checklist)),
            None,
        );
        let notice = Notification::new(
            order.owner_id,
            Some(order.id),
            "Work order completed",
            format!("'{}' was marked as completed", order.title),
            now,
        );
        self.commit(ChangeSet {
            work_order: Some(WorkOrderWrite::Update {
                record: next.clone(),
                expected_version: order.version,
            }),
            activities: vec![completed],
            notifications: vec![notice],
            ..Default::default()
        })
        .await?;

        info!("Work order {} completed", order.id);
        Ok(next)
    }

    pub async fn request_correction(
        &self,
        caller: &Identity,
        id: Uuid,
        request: CorrectionRequest,
    ) -> LifecycleResult<Correction> {
        let description = required(&request.description, "correction description")?;
        let deadline = request
            .deadline
            .ok_or_else(|| LifecycleError::validation("correction deadline is required"))?;
        let order = self.load(id).await?;
        Self::ensure_owner_or_admin(caller, &order)?;

        let deliveries = self.gateway.deliveries(order.id).await?;
        if deliveries.is_empty() {
            return Err(LifecycleError::precondition(
                "cannot request a correction before any delivery",
            ));
        }
        if let Some(target) = request.delivery_id {
            if !deliveries.iter().any(|d| d.id == target) {
                return Err(LifecycleError::not_found("delivery", target));
            }
        }
        let assignee = order
            .assignee_id
            .ok_or_else(|| LifecycleError::precondition("work order has no assigned drafter"))?;

        let now = self.clock.now();
        let next = order.transition(WorkOrderStatus::AwaitingCorrection, now)?;

        let mut acceptances = Vec::new();
        let mut reacceptance_id = None;
        if order.mandatory_corrections {
            if let Some(mut previous) = self.gateway.current_acceptance(order.id, assignee).await? {
                previous.superseded_at = Some(now);
                previous.updated_at = now;
                acceptances.push(previous);
            }
            let fresh = Acceptance::pending(order.id, assignee, now);
            reacceptance_id = Some(fresh.id);
            acceptances.push(fresh);
        }

        let correction = Correction {
            id: Uuid::new_v4(),
            work_order_id: order.id,
            delivery_id: request.delivery_id,
            requester_id: caller.user_id,
            assignee_id: assignee,
            description,
            reference_file_ref: optional(request.reference_file_ref.as_deref()),
            deadline,
            status: WorkOrderStatus::AwaitingCorrection,
            requires_reacceptance: order.mandatory_corrections,
            reacceptance_id,
            created_at: now,
        };

        let requested = self.activity(
            caller,
            &order,
            ActivityCategory::Correction,
            "Correction requested",
            Some(json!({
                "correction_id": correction.id,
                "delivery_id": correction.delivery_id,
                "deadline": correction.deadline,
                "requires_reacceptance": correction.requires_reacceptance,
            })),
            None,
        );
        let notice = Notification::new(
            assignee,
            Some(order.id),
            "Correction requested",
            format!("Corrections were requested for '{}'", order.title),
            now,
        );
        self.commit(ChangeSet {
            work_order: Some(WorkOrderWrite::Update {
                record: next,
                expected_version: order.version,
            }),
            acceptances,
            corrections: vec![correction.clone()],
            activities: vec![requested],
            notifications: vec![notice],
            ..Default::default()
        })
        .await?;

        info!("Correction {} requested on work order {}", correction.id, order.id);
        Ok(correction)
    }

    /// Soft delete: the order moves to `cancelled` and keeps its history.
    pub async fn cancel(
        &self,
        caller: &Identity,
        id: Uuid,
        reason: Option<&str>,
    ) -> LifecycleResult<WorkOrder> {
        let order = self.load(id).await?;
        Self::ensure_owner_or_admin(caller, &order)?;
        let now = self.clock.now();
        let next = order.transition(WorkOrderStatus::Cancelled, now)?;
        let reason = optional(reason);

        let cancelled = self.activity(
            caller,
            &order,
            ActivityCategory::Cancellation,
            format!("Work order '{}' cancelled", order.title),
            reason.as_ref().map(|r| json!({ "reason": r })),
            None,
        );
        let notifications = order
            .assignee_id
            .map(|assignee| {
                Notification::new(
                    assignee,
                    Some(order.id),
                    "Work order cancelled",
                    format!("'{}' was cancelled", order.title),
                    now,
                )
            })
            .into_iter()
            .collect();
        self.commit(ChangeSet {
            work_order: Some(WorkOrderWrite::Update {
                record: next.clone(),
                expected_version: order.version,
            }),
            activities: vec![cancelled],
            notifications,
            ..Default::default()
        })
        .await?;

        info!("Work order {} cancelled by {}", order.id, caller.user_id);
        Ok(next)
    }

    pub async fn work_order(&self, caller: &Identity, id: Uuid) -> LifecycleResult<WorkOrderView> {
        let order = self.load(id).await?;
        if !self.can_view(caller, &order) {
            return Err(LifecycleError::unauthorized("work order is not visible to caller"));
        }
        Ok(WorkOrderView::new(order, self.clock.now()))
    }

    pub async fn details(&self, caller: &Identity, id: Uuid) -> LifecycleResult<WorkOrderDetails> {
        let view = self.work_order(caller, id).await?;
        Ok(WorkOrderDetails {
            acceptances: self.gateway.acceptances(id).await?,
            deliveries: self.gateway.deliveries(id).await?,
            corrections: self.gateway.corrections(id).await?,
            activities: self.gateway.activities(id).await?,
            view,
        })
    }

    pub async fn list(
        &self,
        caller: &Identity,
        status: Option<WorkOrderStatus>,
    ) -> LifecycleResult<Vec<WorkOrderView>> {
        let filter = match caller.role {
            Role::Admin => WorkOrderFilter::default(),
            Role::Responsible => WorkOrderFilter {
                owner_id: Some(caller.user_id),
                ..Default::default()
            },
            Role::Drafter => WorkOrderFilter {
                assignee_id: Some(caller.user_id),
                include_unassigned: self.options.allow_open_acceptance,
                ..Default::default()
            },
        };
        let filter = WorkOrderFilter { status, ..filter };
        let now = self.clock.now();
        Ok(self
            .gateway
            .work_orders(&filter)
            .await?
            .into_iter()
            .map(|o| WorkOrderView::new(o, now))
            .collect())
    }

    pub async fn notifications(
        &self,
        caller: &Identity,
        unread_only: bool,
    ) -> LifecycleResult<Vec<Notification>> {
        self.gateway.notifications(caller.user_id, unread_only).await
    }

    pub async fn mark_notification_read(
        &self,
        caller: &Identity,
        id: Uuid,
    ) -> LifecycleResult<Notification> {
        self.gateway
            .mark_notification_read(id, caller.user_id, self.clock.now())
            .await?
            .ok_or_else(|| LifecycleError::not_found("notification", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ManualClock;
    use chrono::{Duration, TimeZone, Utc};

    struct Harness {
        engine: LifecycleEngine,
        gateway: Arc<MemoryGateway>,
        clock: Arc<ManualClock>,
        owner: Identity,
        drafter: Identity,
    }

    fn harness_with(options: EngineOptions) -> Harness {
        let gateway = Arc::new(MemoryGateway::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        ));
        Harness {
            engine: LifecycleEngine::new(gateway.clone(), clock.clone(), options),
            gateway,
            clock,
            owner: Identity::new(Uuid::new_v4(), Role::Responsible),
            drafter: Identity::new(Uuid::new_v4(), Role::Drafter),
        }
    }

    fn harness() -> Harness {
        harness_with(EngineOptions::default())
    }

    impl Harness {
        fn new_order(&self, assignee: Option<Uuid>) -> NewWorkOrder {
            NewWorkOrder {
                title: "Thesis X".into(),
                work_type: WorkType::Thesis,
                description: "Chapter 3 rewrite".into(),
                source_link: Some("https://drive.example/folder".into()),
                from_scratch: false,
                mandatory_corrections: false,
                deadline: Some(self.clock.now() + Duration::days(7)),
                terms: "No AI-generated text. Cite every source.".into(),
                assignee_id: assignee,
            }
        }

        async fn created(&self, mandatory_corrections: bool) -> WorkOrder {
            let mut input = self.new_order(Some(self.drafter.user_id));
            input.mandatory_corrections = mandatory_corrections;
            self.engine.create(&self.owner, input).await.unwrap()
        }

        fn signature(&self) -> AcceptInput {
            AcceptInput {
                signature: "Jane Doe".into(),
                anti_plagiarism_commitment: true,
                corrections_commitment: true,
                ip_address: Some("203.0.113.7".into()),
                user_agent: Some("Mozilla/5.0".into()),
            }
        }

        async fn accepted(&self, mandatory_corrections: bool) -> WorkOrder {
            let order = self.created(mandatory_corrections).await;
            self.engine.mark_terms_read(&self.drafter, order.id).await.unwrap();
            self.engine
                .accept(&self.drafter, order.id, self.signature())
                .await
                .unwrap();
            order
        }

        async fn delivered(&self, mandatory_corrections: bool) -> WorkOrder {
            let order = self.accepted(mandatory_corrections).await;
            self.engine
                .deliver(&self.drafter, order.id, delivery("f.pdf"))
                .await
                .unwrap();
            order
        }

        async fn status(&self, id: Uuid) -> WorkOrderStatus {
            self.gateway.work_order(id).await.unwrap().unwrap().status
        }
    }

    fn delivery(file: &str) -> DeliveryInput {
        DeliveryInput {
            file_ref: file.into(),
            anti_plagiarism_report_ref: Some("r.pdf".into()),
            notes: None,
        }
    }

    fn all_sent() -> CompletionChecklist {
        CompletionChecklist {
            antiplagiarism_sent: true,
            preview_sent: true,
            final_sent: true,
        }
    }

    fn correction(h: &Harness, description: &str) -> CorrectionRequest {
        CorrectionRequest {
            delivery_id: None,
            description: description.into(),
            deadline: Some(h.clock.now() + Duration::days(3)),
            reference_file_ref: None,
        }
    }

    #[tokio::test]
    async fn create_starts_pending_with_creation_activity() {
        let h = harness();
        let order = h.created(false).await;

        assert_eq!(order.status, WorkOrderStatus::Pending);
        assert_eq!(order.version, 1);
        let activities = h.gateway.activities(order.id).await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].category, ActivityCategory::Creation);
        assert_eq!(activities[0].actor_role, Role::Responsible);
    }

    #[tokio::test]
    async fn create_validates_required_fields() {
        let h = harness();
        let mut blank_title = h.new_order(None);
        blank_title.title = "   ".into();
        let mut no_deadline = h.new_order(None);
        no_deadline.deadline = None;
        let mut no_terms = h.new_order(None);
        no_terms.terms = String::new();

        for input in [blank_title, no_deadline, no_terms] {
            let err = h.engine.create(&h.owner, input).await.unwrap_err();
            assert!(matches!(err, LifecycleError::Validation(_)), "{:?}", err);
        }
    }

    #[tokio::test]
    async fn drafters_cannot_create() {
        let h = harness();
        let err = h
            .engine
            .create(&h.drafter, h.new_order(None))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn accept_with_blank_signature_is_a_validation_error() {
        let h = harness();
        let order = h.created(false).await;
        let blank = AcceptInput {
            signature: "  ".into(),
            ..h.signature()
        };

        let before = h.engine.accept(&h.drafter, order.id, blank.clone()).await;
        assert!(matches!(before, Err(LifecycleError::Validation(_))));

        h.engine.mark_terms_read(&h.drafter, order.id).await.unwrap();
        let after = h.engine.accept(&h.drafter, order.id, blank).await;
        assert!(matches!(after, Err(LifecycleError::Validation(_))));
        assert_eq!(h.status(order.id).await, WorkOrderStatus::Pending);
    }

    #[tokio::test]
    async fn accept_requires_terms_read() {
        let h = harness();
        let order = h.created(false).await;
        let err = h
            .engine
            .accept(&h.drafter, order.id, h.signature())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
    }

    #[tokio::test]
    async fn accept_outside_pending_is_a_precondition_failure() {
        let h = harness();
        let order = h.accepted(false).await;
        let err = h
            .engine
            .accept(&h.drafter, order.id, h.signature())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn accept_sets_signature_timestamps_and_status() {
        let h = harness();
        let order = h.accepted(false).await;

        assert_eq!(h.status(order.id).await, WorkOrderStatus::Accepted);
        let acceptance = h
            .gateway
            .current_acceptance(order.id, h.drafter.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(acceptance.status, AcceptanceStatus::Accepted);
        assert_eq!(acceptance.signature.as_deref(), Some("Jane Doe"));
        assert!(acceptance.signed_at.is_some());
        assert_eq!(acceptance.signed_at, acceptance.accepted_at);
        assert_eq!(acceptance.ip_address.as_deref(), Some("203.0.113.7"));

        let activities = h.gateway.activities(order.id).await.unwrap();
        let accepted = activities
            .iter()
            .find(|a| a.category == ActivityCategory::Acceptance)
            .unwrap();
        assert_eq!(accepted.actor_role, Role::Drafter);
    }

    #[tokio::test]
    async fn only_the_assignee_accepts() {
        let h = harness();
        let order = h.created(false).await;
        let stranger = Identity::new(Uuid::new_v4(), Role::Drafter);
        let err = h
            .engine
            .mark_terms_read(&stranger, order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unassigned_orders_need_open_acceptance() {
        let closed = harness();
        let order = closed
            .engine
            .create(&closed.owner, closed.new_order(None))
            .await
            .unwrap();
        let err = closed
            .engine
            .mark_terms_read(&closed.drafter, order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized(_)));

        let open = harness_with(EngineOptions {
            allow_open_acceptance: true,
        });
        let order = open
            .engine
            .create(&open.owner, open.new_order(None))
            .await
            .unwrap();
        open.engine.mark_terms_read(&open.drafter, order.id).await.unwrap();
        open.engine
            .accept(&open.drafter, order.id, open.signature())
            .await
            .unwrap();
        let stored = open.gateway.work_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.assignee_id, Some(open.drafter.user_id));
        assert_eq!(stored.status, WorkOrderStatus::Accepted);
    }

    #[tokio::test]
    async fn mark_terms_read_is_idempotent() {
        let h = harness();
        let order = h.created(false).await;

        let first = h.engine.mark_terms_read(&h.drafter, order.id).await.unwrap();
        h.clock.advance(Duration::minutes(5));
        let second = h.engine.mark_terms_read(&h.drafter, order.id).await.unwrap();

        assert!(second.terms_read);
        assert_eq!(first.id, second.id);
        assert_eq!(first.terms_read_at, second.terms_read_at);
        assert_eq!(second.status, AcceptanceStatus::Read);
        assert_eq!(h.gateway.acceptances(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refuse_records_reason_and_notifies_owner() {
        let h = harness();
        let order = h.created(false).await;
        h.engine.mark_terms_read(&h.drafter, order.id).await.unwrap();

        let blank = h.engine.refuse(&h.drafter, order.id, " ").await;
        assert!(matches!(blank, Err(LifecycleError::Validation(_))));

        let refused = h
            .engine
            .refuse(&h.drafter, order.id, "Deadline too tight")
            .await
            .unwrap();
        assert_eq!(refused.status, AcceptanceStatus::Pending);
        assert_eq!(refused.refusal_reason.as_deref(), Some("Deadline too tight"));
        assert_eq!(h.status(order.id).await, WorkOrderStatus::Pending);
        assert_eq!(
            h.gateway.notifications(h.owner.user_id, false).await.unwrap().len(),
            1
        );

        // refusal does not block a later acceptance
        h.engine
            .accept(&h.drafter, order.id, h.signature())
            .await
            .unwrap();
        assert_eq!(h.status(order.id).await, WorkOrderStatus::Accepted);
    }

    /// Serves the work order and acceptance as they were when frozen, so an
    /// engine on top of it decides on a stale read.
    struct FrozenReads {
        inner: Arc<MemoryGateway>,
        order: WorkOrder,
        acceptance: Option<Acceptance>,
    }

    #[async_trait::async_trait]
    impl Gateway for FrozenReads {
        async fn work_order(&self, _id: Uuid) -> LifecycleResult<Option<WorkOrder>> {
            Ok(Some(self.order.clone()))
        }

        async fn work_orders(&self, filter: &WorkOrderFilter) -> LifecycleResult<Vec<WorkOrder>> {
            self.inner.work_orders(filter).await
        }

        async fn current_acceptance(
            &self,
            _work_order_id: Uuid,
            _drafter_id: Uuid,
        ) -> LifecycleResult<Option<Acceptance>> {
            Ok(self.acceptance.clone())
        }

        async fn acceptances(&self, work_order_id: Uuid) -> LifecycleResult<Vec<Acceptance>> {
            self.inner.acceptances(work_order_id).await
        }

        async fn deliveries(&self, work_order_id: Uuid) -> LifecycleResult<Vec<Delivery>> {
            self.inner.deliveries(work_order_id).await
        }

        async fn corrections(&self, work_order_id: Uuid) -> LifecycleResult<Vec<Correction>> {
            self.inner.corrections(work_order_id).await
        }

        async fn activities(&self, work_order_id: Uuid) -> LifecycleResult<Vec<ActivityRecord>> {
            self.inner.activities(work_order_id).await
        }

        async fn notifications(
            &self,
            recipient_id: Uuid,
            unread_only: bool,
        ) -> LifecycleResult<Vec<Notification>> {
            self.inner.notifications(recipient_id, unread_only).await
        }

        async fn apply(&self, changes: ChangeSet) -> LifecycleResult<()> {
            self.inner.apply(changes).await
        }

        async fn mark_notification_read(
            &self,
            id: Uuid,
            recipient_id: Uuid,
            at: chrono::DateTime<Utc>,
        ) -> LifecycleResult<Option<Notification>> {
            self.inner.mark_notification_read(id, recipient_id, at).await
        }
    }

    #[tokio::test]
    async fn refuse_racing_an_accept_conflicts() {
        let h = harness();
        let order = h.created(false).await;
        h.engine.mark_terms_read(&h.drafter, order.id).await.unwrap();

        let frozen = FrozenReads {
            inner: h.gateway.clone(),
            order: h.gateway.work_order(order.id).await.unwrap().unwrap(),
            acceptance: h
                .gateway
                .current_acceptance(order.id, h.drafter.user_id)
                .await
                .unwrap(),
        };
        let stale = LifecycleEngine::new(
            Arc::new(frozen),
            h.clock.clone(),
            EngineOptions::default(),
        );

        h.engine
            .accept(&h.drafter, order.id, h.signature())
            .await
            .unwrap();
        let err = stale
            .refuse(&h.drafter, order.id, "Deadline too tight")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict(_)), "{:?}", err);

        let current = h
            .gateway
            .current_acceptance(order.id, h.drafter.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.status, AcceptanceStatus::Accepted);
        assert_eq!(current.refusal_reason, None);
        assert!(h.gateway.notifications(h.owner.user_id, false).await.unwrap().is_empty());
        h.engine
            .deliver(&h.drafter, order.id, delivery("f.pdf"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn accepted_work_order_cannot_be_refused() {
        let h = harness();
        let order = h.accepted(false).await;
        let err = h
            .engine
            .refuse(&h.drafter, order.id, "Changed my mind")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn deliver_requires_acceptance() {
        let h = harness();
        let order = h.created(false).await;
        let err = h
            .engine
            .deliver(&h.drafter, order.id, delivery("f.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn complete_requires_antiplagiarism_and_final() {
        let h = harness();
        let order = h.delivered(false).await;
        for checklist in [
            CompletionChecklist {
                antiplagiarism_sent: false,
                preview_sent: true,
                final_sent: true,
            },
            CompletionChecklist {
                antiplagiarism_sent: true,
                preview_sent: true,
                final_sent: false,
            },
        ] {
            let err = h
                .engine
                .complete(&h.drafter, order.id, checklist)
                .await
                .unwrap_err();
            assert!(matches!(err, LifecycleError::Validation(_)));
        }
        assert_eq!(h.status(order.id).await, WorkOrderStatus::InProgress);
    }

    #[tokio::test]
    async fn complete_without_delivery_fails() {
        let h = harness();
        let order = h.accepted(false).await;
        let err = h
            .engine
            .complete(&h.drafter, order.id, all_sent())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn full_happy_path() {
        let h = harness();
        let order = h.created(false).await;
        h.engine.mark_terms_read(&h.drafter, order.id).await.unwrap();
        h.engine
            .accept(&h.drafter, order.id, h.signature())
            .await
            .unwrap();
        h.engine
            .deliver(&h.drafter, order.id, delivery("f.pdf"))
            .await
            .unwrap();
        let done = h
            .engine
            .complete(&h.drafter, order.id, all_sent())
            .await
            .unwrap();

        assert_eq!(done.status, WorkOrderStatus::Completed);
        let categories: Vec<ActivityCategory> = h
            .gateway
            .activities(order.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.category)
            .collect();
        assert_eq!(
            categories,
            vec![
                ActivityCategory::Creation,
                ActivityCategory::Acceptance,
                ActivityCategory::Delivery,
                ActivityCategory::Delivery,
            ]
        );
        assert_eq!(
            h.gateway.notifications(h.owner.user_id, false).await.unwrap().len(),
            2
        );
        assert!(h
            .gateway
            .notifications(h.drafter.user_id, false)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn correction_before_delivery_fails() {
        let h = harness();
        let order = h.created(false).await;
        let err = h
            .engine
            .request_correction(&h.owner, order.id, correction(&h, "Fix citations"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn blank_correction_leaves_status_alone() {
        let h = harness();
        let order = h.delivered(false).await;
        let err = h
            .engine
            .request_correction(&h.owner, order.id, correction(&h, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
        assert_eq!(h.status(order.id).await, WorkOrderStatus::InProgress);
        assert!(h.gateway.corrections(order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn drafter_cannot_request_corrections() {
        let h = harness();
        let order = h.delivered(false).await;
        let err = h
            .engine
            .request_correction(&h.drafter, order.id, correction(&h, "Fix"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn correction_cycle_without_reacceptance() {
        let h = harness();
        let order = h.delivered(false).await;
        let target = h.gateway.deliveries(order.id).await.unwrap()[0].id;

        let mut request = correction(&h, "Expand the literature review");
        request.delivery_id = Some(target);
        let requested = h
            .engine
            .request_correction(&h.owner, order.id, request)
            .await
            .unwrap();
        assert_eq!(requested.status, WorkOrderStatus::AwaitingCorrection);
        assert_eq!(h.status(order.id).await, WorkOrderStatus::AwaitingCorrection);
        assert_eq!(
            h.gateway.notifications(h.drafter.user_id, false).await.unwrap().len(),
            1
        );

        h.engine
            .deliver(&h.drafter, order.id, delivery("f-v2.pdf"))
            .await
            .unwrap();
        assert_eq!(h.status(order.id).await, WorkOrderStatus::Corrected);
        let corrections = h.gateway.corrections(order.id).await.unwrap();
        assert_eq!(corrections[0].status, WorkOrderStatus::Corrected);

        h.engine
            .complete(&h.drafter, order.id, all_sent())
            .await
            .unwrap();
        assert_eq!(h.status(order.id).await, WorkOrderStatus::Completed);
    }

    #[tokio::test]
    async fn optional_correction_does_not_reopen_acceptance() {
        let h = harness();
        let order = h.delivered(false).await;
        h.engine
            .request_correction(&h.owner, order.id, correction(&h, "Fix the citations"))
            .await
            .unwrap();

        let err = h
            .engine
            .accept(&h.drafter, order.id, h.signature())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed(_)), "{:?}", err);
        assert_eq!(h.gateway.acceptances(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn complete_while_awaiting_correction_is_refused() {
        let h = harness();
        let order = h.delivered(false).await;
        h.engine
            .request_correction(&h.owner, order.id, correction(&h, "Fix the citations"))
            .await
            .unwrap();

        let err = h
            .engine
            .complete(&h.drafter, order.id, all_sent())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed(_)), "{:?}", err);
        assert_eq!(h.status(order.id).await, WorkOrderStatus::AwaitingCorrection);
    }

    #[tokio::test]
    async fn correction_against_unknown_delivery_is_not_found() {
        let h = harness();
        let order = h.delivered(false).await;
        let mut request = correction(&h, "Fix");
        request.delivery_id = Some(Uuid::new_v4());
        let err = h
            .engine
            .request_correction(&h.owner, order.id, request)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { .. }));
    }

    #[tokio::test]
    async fn mandatory_corrections_force_reacceptance() {
        let h = harness();
        let order = h.delivered(true).await;
        let before = h.gateway.acceptances(order.id).await.unwrap();
        assert_eq!(before.len(), 1);

        let requested = h
            .engine
            .request_correction(&h.owner, order.id, correction(&h, "Rework chapter 2"))
            .await
            .unwrap();

        let after = h.gateway.acceptances(order.id).await.unwrap();
        assert_eq!(after.len(), 2);
        let pending: Vec<&Acceptance> = after
            .iter()
            .filter(|a| a.status == AcceptanceStatus::Pending)
            .collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(Some(pending[0].id), requested.reacceptance_id);
        assert!(requested.requires_reacceptance);
        // the signed acceptance is kept as history
        let signed = after.iter().find(|a| a.id == before[0].id).unwrap();
        assert!(signed.superseded_at.is_some());
        assert_eq!(signed.signature.as_deref(), Some("Jane Doe"));

        let blocked = h
            .engine
            .deliver(&h.drafter, order.id, delivery("f-v2.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(blocked, LifecycleError::PreconditionFailed(_)));

        h.engine.mark_terms_read(&h.drafter, order.id).await.unwrap();
        h.engine
            .accept(&h.drafter, order.id, h.signature())
            .await
            .unwrap();
        assert_eq!(h.status(order.id).await, WorkOrderStatus::AwaitingCorrection);
        h.engine
            .deliver(&h.drafter, order.id, delivery("f-v2.pdf"))
            .await
            .unwrap();
        assert_eq!(h.status(order.id).await, WorkOrderStatus::Corrected);
    }

    #[tokio::test]
    async fn cancel_is_a_soft_delete() {
        let h = harness();
        let order = h.delivered(false).await;
        let cancelled = h
            .engine
            .cancel(&h.owner, order.id, Some("Client withdrew"))
            .await
            .unwrap();

        assert_eq!(cancelled.status, WorkOrderStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(h.gateway.deliveries(order.id).await.unwrap().len(), 1);
        let activities = h.gateway.activities(order.id).await.unwrap();
        assert_eq!(
            activities.last().map(|a| a.category),
            Some(ActivityCategory::Cancellation)
        );

        let again = h.engine.cancel(&h.owner, order.id, None).await.unwrap_err();
        assert!(matches!(again, LifecycleError::PreconditionFailed(_)));
        let deliver = h
            .engine
            .deliver(&h.drafter, order.id, delivery("late.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(deliver, LifecycleError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn only_owner_or_admin_cancels() {
        let h = harness();
        let order = h.created(false).await;
        let err = h.engine.cancel(&h.drafter, order.id, None).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized(_)));

        let admin = Identity::new(Uuid::new_v4(), Role::Admin);
        h.engine.cancel(&admin, order.id, None).await.unwrap();
        let activities = h.gateway.activities(order.id).await.unwrap();
        assert_eq!(activities.last().unwrap().actor_role, Role::Admin);
    }

    #[tokio::test]
    async fn update_changes_fields_and_bumps_version() {
        let h = harness();
        let order = h.engine.create(&h.owner, h.new_order(None)).await.unwrap();
        let updated = h
            .engine
            .update(
                &h.owner,
                order.id,
                WorkOrderPatch {
                    title: Some("Thesis X (revised)".into()),
                    assignee_id: Some(h.drafter.user_id),
                    source_link: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.title, "Thesis X (revised)");
        assert_eq!(updated.source_link, None);
        assert_eq!(updated.assignee_id, Some(h.drafter.user_id));
        assert_eq!(
            h.gateway.notifications(h.drafter.user_id, false).await.unwrap().len(),
            1
        );

        let noop = h
            .engine
            .update(&h.owner, order.id, WorkOrderPatch::default())
            .await
            .unwrap();
        assert_eq!(noop.version, 2);
    }

    #[tokio::test]
    async fn reassignment_after_acceptance_is_refused() {
        let h = harness();
        let order = h.accepted(false).await;
        let err = h
            .engine
            .update(
                &h.owner,
                order.id,
                WorkOrderPatch {
                    assignee_id: Some(Uuid::new_v4()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn terminal_work_orders_cannot_be_updated() {
        let h = harness();
        let order = h.created(false).await;
        h.engine.cancel(&h.owner, order.id, None).await.unwrap();

        let err = h
            .engine
            .update(
                &h.owner,
                order.id,
                WorkOrderPatch {
                    title: Some("Too late".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed(_)), "{:?}", err);
        let stored = h.gateway.work_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Thesis X");
    }

    #[tokio::test]
    async fn overdue_is_computed_on_read() {
        let h = harness();
        let order = h.accepted(false).await;
        assert!(!h.engine.work_order(&h.owner, order.id).await.unwrap().overdue);

        h.clock.advance(Duration::days(8));
        assert!(h.engine.work_order(&h.owner, order.id).await.unwrap().overdue);
    }

    #[tokio::test]
    async fn listing_is_scoped_by_role() {
        let h = harness();
        let mine = h.created(false).await;
        let other_owner = Identity::new(Uuid::new_v4(), Role::Responsible);
        h.engine
            .create(&other_owner, h.new_order(None))
            .await
            .unwrap();
        let admin = Identity::new(Uuid::new_v4(), Role::Admin);

        assert_eq!(h.engine.list(&admin, None).await.unwrap().len(), 2);
        let owned = h.engine.list(&h.owner, None).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].work_order.id, mine.id);
        assert_eq!(h.engine.list(&h.drafter, None).await.unwrap().len(), 1);
        assert!(h
            .engine
            .list(&admin, Some(WorkOrderStatus::Completed))
            .await
            .unwrap()
            .is_empty());

        let err = h.engine.work_order(&other_owner, mine.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn notifications_are_marked_read_by_recipient() {
        let h = harness();
        h.delivered(false).await;
        let inbox = h.engine.notifications(&h.owner, true).await.unwrap();
        assert_eq!(inbox.len(), 1);

        let err = h
            .engine
            .mark_notification_read(&h.drafter, inbox[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { .. }));

        let read = h
            .engine
            .mark_notification_read(&h.owner, inbox[0].id)
            .await
            .unwrap();
        assert!(read.read);
        assert!(h.engine.notifications(&h.owner, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_work_order_is_not_found() {
        let h = harness();
        let err = h
            .engine
            .deliver(&h.drafter, Uuid::new_v4(), delivery("f.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { .. }));
    }
}
