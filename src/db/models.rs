use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use crate::identity::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "work_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    Thesis,
    Article,
    Masters,
    Doctoral,
    Monograph,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "work_order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Pending,
    Accepted,
    InProgress,
    AwaitingCorrection,
    Corrected,
    Completed,
    Cancelled,
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::AwaitingCorrection => "awaiting_correction",
            Self::Corrected => "corrected",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "acceptance_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceStatus {
    Pending,
    Read,
    Signed,
    Accepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activity_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    Creation,
    Acceptance,
    Delivery,
    Correction,
    Cancellation,
    Update,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub title: String,
    pub work_type: WorkType,
    pub description: String,
    pub source_link: Option<String>,
    pub from_scratch: bool,
    pub mandatory_corrections: bool,
    pub deadline: DateTime<Utc>,
    pub terms: String,
    pub status: WorkOrderStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// One drafter's agreement to a work order's terms. Only the row with
/// `superseded_at == None` is current for a (work order, drafter) pair.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Acceptance {
    pub id: Uuid,
    pub work_order_id: Uuid,
    pub drafter_id: Uuid,
    pub terms_read: bool,
    pub terms_read_at: Option<DateTime<Utc>>,
    pub signature: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub status: AcceptanceStatus,
    pub accepted_at: Option<DateTime<Utc>>,
    pub anti_plagiarism_commitment: bool,
    pub corrections_commitment: bool,
    pub refusal_reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub superseded_at: Option<DateTime<Utc>>,
}

impl Acceptance {
    pub fn pending(work_order_id: Uuid, drafter_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            work_order_id,
            drafter_id,
            terms_read: false,
            terms_read_at: None,
            signature: None,
            signed_at: None,
            status: AcceptanceStatus::Pending,
            accepted_at: None,
            anti_plagiarism_commitment: false,
            corrections_commitment: false,
            refusal_reason: None,
            ip_address: None,
            user_agent: None,
            created_at: now,
            updated_at: now,
            superseded_at: None,
        }
    }

    pub fn is_current(&self) -> bool {
        self.superseded_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub work_order_id: Uuid,
    pub drafter_id: Uuid,
    pub file_ref: String,
    pub anti_plagiarism_report_ref: Option<String>,
    pub notes: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Correction {
    pub id: Uuid,
    pub work_order_id: Uuid,
    pub delivery_id: Option<Uuid>,
    pub requester_id: Uuid,
    pub assignee_id: Uuid,
    pub description: String,
    pub reference_file_ref: Option<String>,
    pub deadline: DateTime<Utc>,
    pub status: WorkOrderStatus,
    pub requires_reacceptance: bool,
    pub reacceptance_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub work_order_id: Option<Uuid>,
    pub actor_id: Uuid,
    pub actor_role: Role,
    pub category: ActivityCategory,
    pub description: String,
    pub metadata: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub work_order_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient_id: Uuid,
        work_order_id: Option<Uuid>,
        title: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            work_order_id,
            title: title.into(),
            message: message.into(),
            read: false,
            read_at: None,
            created_at: now,
        }
    }
}
