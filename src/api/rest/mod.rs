pub mod actors;
pub mod drivers;
pub mod notifications;
pub mod orders;
pub mod tracking;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::actor::Actor;
use crate::state::AppState;

/// Header carrying the id of the actor authenticated upstream.
pub const ACTOR_HEADER: &str = "x-actor-id";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(actors::router())
        .merge(orders::router())
        .merge(drivers::router())
        .merge(notifications::router())
        .merge(tracking::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Resolves the calling actor. A missing, malformed or unknown id is simply forbidden.
pub(crate) fn current_actor(state: &AppState, headers: &HeaderMap) -> Result<Actor, DispatchError> {
    let id = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or(DispatchError::Forbidden)?;

    state
        .actors
        .resolve(id)
        .map_err(|_| DispatchError::Forbidden)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    actors: usize,
    orders: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        actors: state.actors.len(),
        orders: state.orders.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
