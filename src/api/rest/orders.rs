use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::current_actor;
use crate::engine::lifecycle::DriverHistory;
use crate::error::DispatchError;
use crate::models::order::{Order, OrderDraft, OrderFilter, OrderPatch, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order).patch(update_order))
        .route("/orders/:id/status", patch(update_status))
        .route("/orders/:id/assign", post(assign_driver))
        .route("/driver/history", get(driver_history))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub driver_id: Uuid,
    /// Version of the order the dispatcher was looking at.
    #[serde(default)]
    pub expected_version: Option<u64>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<OrderDraft>,
) -> Result<Json<Order>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    let order = state.lifecycle.create_order(&actor, payload)?;
    Ok(Json(order))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Vec<Order>>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    Ok(Json(state.lifecycle.orders_for(&actor, filter)))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    let order = state.lifecycle.get_order(&actor, id)?;
    Ok(Json(order))
}

async fn update_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<OrderPatch>,
) -> Result<Json<Order>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    let order = state.lifecycle.update_order(id, &actor, payload)?;
    Ok(Json(order))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Order>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    let order = state.lifecycle.transition(id, &actor, payload.status)?;
    Ok(Json(order))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Order>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    let order = match payload.expected_version {
        Some(version) => state
            .assignments
            .assign_at_version(id, payload.driver_id, &actor, version)?,
        None => state.assignments.assign(id, payload.driver_id, &actor)?,
    };
    Ok(Json(order))
}

async fn driver_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DriverHistory>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    Ok(Json(state.lifecycle.driver_history(&actor)?))
}
