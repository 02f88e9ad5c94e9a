use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use tracing::info;

use crate::api::rest::current_actor;
use crate::error::DispatchError;
use crate::models::actor::{Actor, DriverProfile, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/actors", post(create_actor))
}

#[derive(Deserialize)]
pub struct CreateActorRequest {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    pub role: Role,
    #[serde(default)]
    pub vehicle: Option<String>,
}

async fn create_actor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateActorRequest>,
) -> Result<Json<Actor>, DispatchError> {
    let caller = current_actor(&state, &headers)?;
    if caller.role != Role::Admin {
        return Err(DispatchError::Forbidden);
    }

    if payload.name.trim().is_empty() {
        return Err(DispatchError::Validation("name cannot be empty".to_string()));
    }
    if payload.vehicle.is_some() && payload.role != Role::Driver {
        return Err(DispatchError::Validation(
            "vehicle is only meaningful for drivers".to_string(),
        ));
    }

    let mut actor = Actor::new(payload.name, payload.phone, payload.role);
    if let Some(vehicle) = payload.vehicle {
        actor.driver = Some(DriverProfile::new(vehicle));
    }

    let actor = state.actors.insert(actor)?;
    info!(actor_id = %actor.id, role = %actor.role, created_by = %caller.id, "actor created");
    Ok(Json(actor))
}
