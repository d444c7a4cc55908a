use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::gateway::{ChangeSet, Gateway, WorkOrderFilter, WorkOrderWrite};
use super::models::*;
use super::DbPool;
use crate::error::{LifecycleError, LifecycleResult};

/// Gateway over PostgreSQL. Each change set runs in its own transaction.
#[derive(Clone)]
pub struct PgGateway {
    pool: DbPool,
}

impl PgGateway {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }
}

async fn insert_work_order(conn: &mut PgConnection, order: &WorkOrder) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO work_orders (id, owner_id, assignee_id, title, work_type, description, source_link,
            from_scratch, mandatory_corrections, deadline, terms, status, version, created_at, updated_at, cancelled_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(order.id)
    .bind(order.owner_id)
    .bind(order.assignee_id)
    .bind(&order.title)
    .bind(order.work_type)
    .bind(&order.description)
    .bind(&order.source_link)
    .bind(order.from_scratch)
    .bind(order.mandatory_corrections)
    .bind(order.deadline)
    .bind(&order.terms)
    .bind(order.status)
    .bind(order.version)
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.cancelled_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Compare-and-swap on `version`. Returns false when another writer won.
async fn update_work_order(
    conn: &mut PgConnection,
    order: &WorkOrder,
    expected_version: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE work_orders
        SET assignee_id = $3, title = $4, work_type = $5, description = $6, source_link = $7,
            from_scratch = $8, mandatory_corrections = $9, deadline = $10, terms = $11,
            status = $12, version = $13, updated_at = $14, cancelled_at = $15
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(order.id)
    .bind(expected_version)
    .bind(order.assignee_id)
    .bind(&order.title)
    .bind(order.work_type)
    .bind(&order.description)
    .bind(&order.source_link)
    .bind(order.from_scratch)
    .bind(order.mandatory_corrections)
    .bind(order.deadline)
    .bind(&order.terms)
    .bind(order.status)
    .bind(order.version)
    .bind(order.updated_at)
    .bind(order.cancelled_at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

async fn upsert_acceptance(conn: &mut PgConnection, a: &Acceptance) -> Result<(), sqlx::Error> {
    // signature, signed_at and accepted_at are write-once
    sqlx::query(
        r#"
        INSERT INTO acceptances (id, work_order_id, drafter_id, terms_read, terms_read_at, signature, signed_at,
            status, accepted_at, anti_plagiarism_commitment, corrections_commitment, refusal_reason,
            ip_address, user_agent, created_at, updated_at, superseded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        ON CONFLICT (id) DO UPDATE SET
            terms_read = EXCLUDED.terms_read,
            terms_read_at = EXCLUDED.terms_read_at,
            signature = COALESCE(acceptances.signature, EXCLUDED.signature),
            signed_at = COALESCE(acceptances.signed_at, EXCLUDED.signed_at),
            status = EXCLUDED.status,
            accepted_at = COALESCE(acceptances.accepted_at, EXCLUDED.accepted_at),
            anti_plagiarism_commitment = EXCLUDED.anti_plagiarism_commitment,
            corrections_commitment = EXCLUDED.corrections_commitment,
            refusal_reason = EXCLUDED.refusal_reason,
            ip_address = EXCLUDED.ip_address,
            user_agent = EXCLUDED.user_agent,
            updated_at = EXCLUDED.updated_at,
            superseded_at = EXCLUDED.superseded_at
        "#,
    )
    .bind(a.id)
    .bind(a.work_order_id)
    .bind(a.drafter_id)
    .bind(a.terms_read)
    .bind(a.terms_read_at)
    .bind(&a.signature)
    .bind(a.signed_at)
    .bind(a.status)
    .bind(a.accepted_at)
    .bind(a.anti_plagiarism_commitment)
    .bind(a.corrections_commitment)
    .bind(&a.refusal_reason)
    .bind(&a.ip_address)
    .bind(&a.user_agent)
    .bind(a.created_at)
    .bind(a.updated_at)
    .bind(a.superseded_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_delivery(conn: &mut PgConnection, d: &Delivery) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO deliveries (id, work_order_id, drafter_id, file_ref, anti_plagiarism_report_ref, notes, delivered_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(d.id)
    .bind(d.work_order_id)
    .bind(d.drafter_id)
    .bind(&d.file_ref)
    .bind(&d.anti_plagiarism_report_ref)
    .bind(&d.notes)
    .bind(d.delivered_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_correction(conn: &mut PgConnection, c: &Correction) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO corrections (id, work_order_id, delivery_id, requester_id, assignee_id, description,
            reference_file_ref, deadline, status, requires_reacceptance, reacceptance_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(c.id)
    .bind(c.work_order_id)
    .bind(c.delivery_id)
    .bind(c.requester_id)
    .bind(c.assignee_id)
    .bind(&c.description)
    .bind(&c.reference_file_ref)
    .bind(c.deadline)
    .bind(c.status)
    .bind(c.requires_reacceptance)
    .bind(c.reacceptance_id)
    .bind(c.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_activity(conn: &mut PgConnection, r: &ActivityRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO activities (id, work_order_id, actor_id, actor_role, category, description, metadata, ip_address, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(r.id)
    .bind(r.work_order_id)
    .bind(r.actor_id)
    .bind(r.actor_role)
    .bind(r.category)
    .bind(&r.description)
    .bind(&r.metadata)
    .bind(&r.ip_address)
    .bind(r.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_notification(conn: &mut PgConnection, n: &Notification) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO notifications (id, recipient_id, work_order_id, title, message, read, read_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(n.id)
    .bind(n.recipient_id)
    .bind(n.work_order_id)
    .bind(&n.title)
    .bind(&n.message)
    .bind(n.read)
    .bind(n.read_at)
    .bind(n.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl Gateway for PgGateway {
    async fn work_order(&self, id: Uuid) -> LifecycleResult<Option<WorkOrder>> {
        let order = sqlx::query_as::<_, WorkOrder>("SELECT * FROM work_orders WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(order)
    }

    async fn work_orders(&self, filter: &WorkOrderFilter) -> LifecycleResult<Vec<WorkOrder>> {
        let orders = sqlx::query_as::<_, WorkOrder>(
            r#"
            SELECT * FROM work_orders
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::uuid IS NULL OR assignee_id = $2
                   OR ($3 AND assignee_id IS NULL AND status = 'pending'))
              AND ($4::work_order_status IS NULL OR status = $4)
            ORDER BY deadline, created_at
            "#,
        )
        .bind(filter.owner_id)
        .bind(filter.assignee_id)
        .bind(filter.include_unassigned)
        .bind(filter.status)
        .fetch_all(self.pool())
        .await?;
        Ok(orders)
    }

    async fn current_acceptance(
        &self,
        work_order_id: Uuid,
        drafter_id: Uuid,
    ) -> LifecycleResult<Option<Acceptance>> {
        let acceptance = sqlx::query_as::<_, Acceptance>(
            r#"
            SELECT * FROM acceptances
            WHERE work_order_id = $1 AND drafter_id = $2 AND superseded_at IS NULL
            "#,
        )
        .bind(work_order_id)
        .bind(drafter_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(acceptance)
    }

    async fn acceptances(&self, work_order_id: Uuid) -> LifecycleResult<Vec<Acceptance>> {
        let rows = sqlx::query_as::<_, Acceptance>(
            "SELECT * FROM acceptances WHERE work_order_id = $1 ORDER BY created_at",
        )
        .bind(work_order_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn deliveries(&self, work_order_id: Uuid) -> LifecycleResult<Vec<Delivery>> {
        let rows = sqlx::query_as::<_, Delivery>(
            "SELECT * FROM deliveries WHERE work_order_id = $1 ORDER BY delivered_at",
        )
        .bind(work_order_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn corrections(&self, work_order_id: Uuid) -> LifecycleResult<Vec<Correction>> {
        let rows = sqlx::query_as::<_, Correction>(
            "SELECT * FROM corrections WHERE work_order_id = $1 ORDER BY created_at",
        )
        .bind(work_order_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn activities(&self, work_order_id: Uuid) -> LifecycleResult<Vec<ActivityRecord>> {
        let rows = sqlx::query_as::<_, ActivityRecord>(
            "SELECT * FROM activities WHERE work_order_id = $1 ORDER BY created_at",
        )
        .bind(work_order_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn notifications(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
    ) -> LifecycleResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE recipient_id = $1 AND (NOT $2 OR read = false)
            ORDER BY created_at DESC
            "#,
        )
        .bind(recipient_id)
        .bind(unread_only)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn apply(&self, changes: ChangeSet) -> LifecycleResult<()> {
        let mut tx = self.pool().begin().await?;

        match &changes.work_order {
            Some(WorkOrderWrite::Insert(order)) => insert_work_order(&mut tx, order).await?,
            Some(WorkOrderWrite::Update {
                record,
                expected_version,
            }) => {
                if !update_work_order(&mut tx, record, *expected_version).await? {
                    // dropping tx rolls back
                    return Err(LifecycleError::Conflict(format!(
                        "work order {} changed since version {}",
                        record.id, expected_version
                    )));
                }
            }
            None => {}
        }
        for acceptance in &changes.acceptances {
            upsert_acceptance(&mut tx, acceptance).await?;
        }
        for delivery in &changes.deliveries {
            insert_delivery(&mut tx, delivery).await?;
        }
        for correction in &changes.corrections {
            insert_correction(&mut tx, correction).await?;
        }
        if !changes.resolved_corrections.is_empty() {
            sqlx::query("UPDATE corrections SET status = 'corrected' WHERE id = ANY($1)")
                .bind(changes.resolved_corrections.as_slice())
                .execute(&mut *tx)
                .await?;
        }
        for activity in &changes.activities {
            insert_activity(&mut tx, activity).await?;
        }
        for notification in &changes.notifications {
            insert_notification(&mut tx, notification).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
        at: DateTime<Utc>,
    ) -> LifecycleResult<Option<Notification>> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET read = true, read_at = COALESCE(read_at, $3)
            WHERE id = $1 AND recipient_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(recipient_id)
        .bind(at)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }
}
