use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Acceptance, ActivityRecord, Correction, Delivery, WorkOrder, WorkType};
use crate::error::{LifecycleError, LifecycleResult};

#[derive(Debug, Clone, Deserialize)]
pub struct NewWorkOrder {
    pub title: String,
    pub work_type: WorkType,
    #[serde(default)]
    pub description: String,
    pub source_link: Option<String>,
    #[serde(default = "default_true")]
    pub from_scratch: bool,
    #[serde(default)]
    pub mandatory_corrections: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub terms: String,
    pub assignee_id: Option<Uuid>,
}

fn default_true() -> bool {
    true
}

/// Owner edits. Absent fields are left alone; an empty `source_link` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkOrderPatch {
    pub title: Option<String>,
    pub work_type: Option<WorkType>,
    pub description: Option<String>,
    pub source_link: Option<String>,
    pub from_scratch: Option<bool>,
    pub mandatory_corrections: Option<bool>,
    pub deadline: Option<DateTime<Utc>>,
    pub terms: Option<String>,
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct AcceptInput {
    pub signature: String,
    pub anti_plagiarism_commitment: bool,
    pub corrections_commitment: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryInput {
    pub file_ref: String,
    pub anti_plagiarism_report_ref: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CompletionChecklist {
    #[serde(default)]
    pub antiplagiarism_sent: bool,
    #[serde(default)]
    pub preview_sent: bool,
    #[serde(default)]
    pub final_sent: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorrectionRequest {
    pub delivery_id: Option<Uuid>,
    pub description: String,
    pub deadline: Option<DateTime<Utc>>,
    pub reference_file_ref: Option<String>,
}

/// Work order as shown to callers, with overdue computed at read time.
#[derive(Debug, Clone, Serialize)]
pub struct WorkOrderView {
    #[serde(flatten)]
    pub work_order: WorkOrder,
    pub overdue: bool,
}

impl WorkOrderView {
    pub fn new(work_order: WorkOrder, now: DateTime<Utc>) -> Self {
        let overdue = work_order.is_overdue(now);
        Self {
            work_order,
            overdue,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkOrderDetails {
    #[serde(flatten)]
    pub view: WorkOrderView,
    pub acceptances: Vec<Acceptance>,
    pub deliveries: Vec<Delivery>,
    pub corrections: Vec<Correction>,
    pub activities: Vec<ActivityRecord>,
}

/// Trims a required free-text field, rejecting it when blank.
pub(crate) fn required(value: &str, field: &str) -> LifecycleResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LifecycleError::validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Trims an optional field, mapping blank to `None`.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
