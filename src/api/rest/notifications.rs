use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, patch, post};
use axum::Json;
use axum::Router;
use serde::Serialize;
use uuid::Uuid;

use crate::api::rest::current_actor;
use crate::error::DispatchError;
use crate::models::notification::{Notification, NotificationList};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/clear", delete(clear_read))
        .route("/notifications/:id", delete(delete_notification))
        .route("/notifications/:id/read", patch(mark_read))
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: usize,
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<NotificationList>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    Ok(Json(state.notifications.list(&actor)?))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    Ok(Json(state.notifications.mark_read(&actor, id)?))
}

async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CountResponse>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    let count = state.notifications.mark_all_read(&actor)?;
    Ok(Json(CountResponse { count }))
}

async fn delete_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<CountResponse>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    state.notifications.delete(&actor, id)?;
    Ok(Json(CountResponse { count: 1 }))
}

async fn clear_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CountResponse>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    let count = state.notifications.clear_read(&actor)?;
    Ok(Json(CountResponse { count }))
}
