use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::extract::{body, optional_body, ClientInfo};
use crate::config::StorageBackend;
use crate::db::{Acceptance, Correction, Delivery, Notification, WorkOrder, WorkOrderStatus};
use crate::error::LifecycleError;
use crate::identity::Identity;
use crate::lifecycle::{
    AcceptInput, CompletionChecklist, CorrectionRequest, DeliveryInput, NewWorkOrder,
    WorkOrderDetails, WorkOrderPatch, WorkOrderView,
};
use crate::state::AppState;

type ApiResult<T> = Result<T, LifecycleError>;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let storage = match state.config.storage {
        StorageBackend::Postgres => "postgres",
        StorageBackend::Memory => "memory",
    };
    Json(serde_json::json!({ "status": "ok", "storage": storage }))
}

pub async fn create_work_order(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    payload: Result<Json<NewWorkOrder>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<WorkOrder>)> {
    let input = body(payload)?;
    let order = state.engine.create(&caller, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<WorkOrderStatus>,
}

pub async fn list_work_orders(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<WorkOrderView>>> {
    Ok(Json(state.engine.list(&caller, query.status).await?))
}

pub async fn get_work_order(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkOrderDetails>> {
    Ok(Json(state.engine.details(&caller, id).await?))
}

pub async fn update_work_order(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
    payload: Result<Json<WorkOrderPatch>, JsonRejection>,
) -> ApiResult<Json<WorkOrder>> {
    let patch = body(payload)?;
    Ok(Json(state.engine.update(&caller, id, patch).await?))
}

pub async fn mark_terms_read(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Acceptance>> {
    Ok(Json(state.engine.mark_terms_read(&caller, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AcceptBody {
    signature: String,
    #[serde(default)]
    anti_plagiarism_commitment: bool,
    #[serde(default)]
    corrections_commitment: bool,
}

pub async fn accept_work_order(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    client: ClientInfo,
    Path(id): Path<Uuid>,
    payload: Result<Json<AcceptBody>, JsonRejection>,
) -> ApiResult<Json<Acceptance>> {
    let accept = body(payload)?;
    let input = AcceptInput {
        signature: accept.signature,
        anti_plagiarism_commitment: accept.anti_plagiarism_commitment,
        corrections_commitment: accept.corrections_commitment,
        ip_address: client.ip_address,
        user_agent: client.user_agent,
    };
    Ok(Json(state.engine.accept(&caller, id, input).await?))
}

#[derive(Debug, Deserialize)]
pub struct RefuseBody {
    reason: String,
}

pub async fn refuse_work_order(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
    payload: Result<Json<RefuseBody>, JsonRejection>,
) -> ApiResult<Json<Acceptance>> {
    let refuse = body(payload)?;
    Ok(Json(state.engine.refuse(&caller, id, &refuse.reason).await?))
}

pub async fn deliver_work_order(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
    payload: Result<Json<DeliveryInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Delivery>)> {
    let input = body(payload)?;
    let delivery = state.engine.deliver(&caller, id, input).await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

pub async fn complete_work_order(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
    payload: Result<Json<CompletionChecklist>, JsonRejection>,
) -> ApiResult<Json<WorkOrder>> {
    let checklist = body(payload)?;
    Ok(Json(state.engine.complete(&caller, id, checklist).await?))
}

pub async fn request_correction(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
    payload: Result<Json<CorrectionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Correction>)> {
    let request = body(payload)?;
    let correction = state.engine.request_correction(&caller, id, request).await?;
    Ok((StatusCode::CREATED, Json(correction)))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
    reason: Option<String>,
}

pub async fn cancel_work_order(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
    payload: Result<Json<CancelBody>, JsonRejection>,
) -> ApiResult<Json<WorkOrder>> {
    let cancel: CancelBody = optional_body(payload)?;
    Ok(Json(
        state
            .engine
            .cancel(&caller, id, cancel.reason.as_deref())
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    unread: bool,
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(state.engine.notifications(&caller, query.unread).await?))
}

pub async fn read_notification(
    State(state): State<Arc<AppState>>,
    caller: Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    Ok(Json(state.engine.mark_notification_read(&caller, id).await?))
}
