use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Json;
use axum::Router;

use crate::engine::public_tracking::PublicOrderView;
use crate::error::DispatchError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/track/:tracking_id", get(track))
}

// Anonymous: no actor header is read here.
async fn track(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
) -> Result<Json<PublicOrderView>, DispatchError> {
    Ok(Json(state.tracking.lookup(&tracking_id)?))
}
