use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::current_actor;
use crate::engine::location::{AvailableDriver, DriverPosition, LocationReport};
use crate::error::DispatchError;
use crate::models::actor::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/driver/location", post(report_location))
        .route("/driver/availability", patch(set_availability))
        .route("/drivers", get(available_drivers))
        .route("/drivers/:id/location", get(driver_location))
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

#[derive(Deserialize)]
pub struct NearQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<LocationReport>,
) -> Result<Json<DriverPosition>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    Ok(Json(state.locations.report_location(&actor, payload)?))
}

async fn set_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AvailabilityRequest>,
) -> Result<Json<DriverPosition>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    Ok(Json(
        state
            .locations
            .set_availability(&actor, payload.is_available)?,
    ))
}

async fn available_drivers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<NearQuery>,
) -> Result<Json<Vec<AvailableDriver>>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    let near = match (query.lat, query.lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        (None, None) => None,
        _ => {
            return Err(DispatchError::Validation(
                "lat and lng must be given together".to_string(),
            ));
        }
    };
    Ok(Json(state.locations.available_drivers(&actor, near)?))
}

async fn driver_location(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverPosition>, DispatchError> {
    let actor = current_actor(&state, &headers)?;
    Ok(Json(state.locations.driver_location(&actor, id)?))
}
