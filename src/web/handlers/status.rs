use std::collections::HashMap;

use axum::{Json, extract::State};

use crate::models::OccupancyRecord;
use crate::web::AppState;

/// Live relay sessions grouped by portal id
pub async fn streaming(State(state): State<AppState>) -> Json<HashMap<String, Vec<OccupancyRecord>>> {
    Json(state.pool.snapshot())
}
