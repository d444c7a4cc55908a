mod api;
mod extract;

pub use api::*;
pub use extract::{ClientInfo, USER_ID_HEADER, USER_ROLE_HEADER};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::LifecycleError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/work-orders", post(create_work_order).get(list_work_orders))
        .route("/api/work-orders/:id", get(get_work_order).patch(update_work_order))
        .route("/api/work-orders/:id/terms-read", post(mark_terms_read))
        .route("/api/work-orders/:id/accept", post(accept_work_order))
        .route("/api/work-orders/:id/refuse", post(refuse_work_order))
        .route("/api/work-orders/:id/deliveries", post(deliver_work_order))
        .route("/api/work-orders/:id/complete", post(complete_work_order))
        .route("/api/work-orders/:id/corrections", post(request_correction))
        .route("/api/work-orders/:id/cancel", post(cancel_work_order))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/:id/read", post(read_notification))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        let status = match &self {
            LifecycleError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LifecycleError::PreconditionFailed(_) | LifecycleError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            LifecycleError::Unauthorized(_) => StatusCode::FORBIDDEN,
            LifecycleError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            LifecycleError::NotFound { .. } => StatusCode::NOT_FOUND,
            LifecycleError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = Json(serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
