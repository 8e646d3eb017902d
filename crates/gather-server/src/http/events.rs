//! Event CRUD + attend handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use gather_core::ids::EventId;
use gather_core::model::{
    EventCategory, EventPage, EventPatch, EventQuery, EventSnapshot, NewEvent,
};

use crate::server::AppState;

use super::{ApiError, AuthPrincipal};

/// Query string for `GET /api/events`. Categories arrive comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// 1-based page.
    pub page: Option<usize>,
    /// Page size.
    pub limit: Option<usize>,
    /// Free-text title term.
    pub term: Option<String>,
    /// Comma-separated category names.
    pub categories: Option<String>,
}

impl ListParams {
    fn into_query(self) -> EventQuery {
        let categories = self
            .categories
            .as_deref()
            .map(parse_categories)
            .unwrap_or_default();
        EventQuery {
            term: self.term,
            categories,
            page: self.page,
            limit: self.limit,
        }
    }
}

fn parse_categories(raw: &str) -> Vec<EventCategory> {
    raw.split(',')
        .filter_map(|part| {
            serde_json::from_value(Value::String(part.trim().to_lowercase())).ok()
        })
        .collect()
}

/// POST /api/events
pub async fn create_event(
    State(state): State<AppState>,
    AuthPrincipal(actor): AuthPrincipal,
    Json(new): Json<NewEvent>,
) -> Result<(StatusCode, Json<EventSnapshot>), ApiError> {
    let snapshot = state.updates.create_event(&actor, new).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/events
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<EventPage>, ApiError> {
    let page = state.updates.list_events(&params.into_query()).await?;
    Ok(Json(page))
}

/// GET /api/events/{id}
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EventSnapshot>, ApiError> {
    let snapshot = state.updates.get_event(&EventId::from(id)).await?;
    Ok(Json(snapshot))
}

/// PUT /api/events/{id}
pub async fn update_event(
    State(state): State<AppState>,
    AuthPrincipal(actor): AuthPrincipal,
    Path(id): Path<String>,
    Json(patch): Json<EventPatch>,
) -> Result<Json<EventSnapshot>, ApiError> {
    let snapshot = state
        .updates
        .update_event(&actor, &EventId::from(id), patch)
        .await?;
    Ok(Json(snapshot))
}

/// DELETE /api/events/{id}
pub async fn delete_event(
    State(state): State<AppState>,
    AuthPrincipal(actor): AuthPrincipal,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.updates.delete_event(&actor, &EventId::from(id)).await?;
    Ok(Json(json!({ "message": "Event deleted successfully" })))
}

/// POST /api/events/{id}/attend
pub async fn attend_event(
    State(state): State<AppState>,
    AuthPrincipal(actor): AuthPrincipal,
    Path(id): Path<String>,
) -> Result<Json<EventSnapshot>, ApiError> {
    let snapshot = state
        .updates
        .attend_event(&actor, &EventId::from(id))
        .await?;
    Ok(Json(snapshot))
}
