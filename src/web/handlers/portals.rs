//! Portal administration handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};

use crate::errors::{AppError, AppResult};
use crate::models::PortalDraft;
use crate::services::{PortalReport, RefreshRequest};
use crate::web::AppState;

pub async fn add_portal(
    State(state): State<AppState>,
    Json(draft): Json<PortalDraft>,
) -> AppResult<(StatusCode, Json<PortalReport>)> {
    let report = state.admin.add_portal(draft).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// An empty body keeps the current MAC list and only tests new MACs
pub async fn refresh_portal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<PortalReport>> {
    let request = if body.is_empty() {
        RefreshRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::validation(format!("invalid refresh request: {e}")))?
    };
    let report = state.admin.refresh_portal(&id, request).await?;
    Ok(Json(report))
}
