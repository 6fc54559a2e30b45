use axum::{
    Json,
    extract::rejection::JsonRejection,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

use crate::modules::backlog::application::commands::{CreateItem, UpdateItem};
use crate::modules::backlog::application::errors::BacklogError;
use crate::modules::backlog::core::filter::{ItemFilter, SortDirection, SortKey};
use crate::modules::backlog::core::item::{ItemStatus, ItemType, ItemValidationError};
use crate::shared::infrastructure::message_bus::relay::DeliveryStats;
use crate::shell::state::AppState;

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn error_response(error: BacklogError) -> Response {
    let status = match &error {
        BacklogError::Validation(_) => StatusCode::BAD_REQUEST,
        BacklogError::NotFound(_) | BacklogError::ExternalIdNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        BacklogError::InvalidRelationship { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BacklogError::HasChildren(_) => StatusCode::CONFLICT,
        BacklogError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        BacklogError::Infrastructure(e) => {
            tracing::error!(error = %e, "request failed on the primary store");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response();
        }
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

#[derive(Deserialize)]
pub struct CreateItemBody {
    #[serde(rename = "type")]
    pub item_type: String,
    pub title: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub story_points: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub assignee: Option<String>,
}

pub async fn create_item(
    State(state): State<AppState>,
    body: Result<Json<CreateItemBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    let item_type = match ItemType::from_str(&body.item_type) {
        Ok(t) => t,
        Err(e) => return error_response(e.into()),
    };

    let command = CreateItem {
        item_type,
        title: body.title,
        description: body.description,
        parent_id: body.parent_id,
        story_points: body.story_points,
        tags: body.tags,
        assignee: body.assignee,
    };

    match state.service.create_item(command).await {
        Ok(item) => (StatusCode::CREATED, Json(item)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_item(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.service.get_item(id).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct UpdateItemBody {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<Uuid>>,
    pub story_points: Option<i32>,
    pub priority: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateItemBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    let status = match body.status.as_deref().map(ItemStatus::from_str).transpose() {
        Ok(s) => s,
        Err(e) => return error_response(e.into()),
    };

    let patch = UpdateItem {
        title: body.title,
        description: body.description,
        status,
        parent_id: body.parent_id,
        story_points: body.story_points,
        priority: body.priority,
        assignee: body.assignee,
        tags: body.tags,
    };

    match state.service.update_item(id, patch).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.service.delete_item(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// Multi-valued filters are comma separated, e.g. `?type=EPIC,FEATURE&tags=ux,api`.
#[derive(Deserialize, Default)]
pub struct ListItemsParams {
    #[serde(rename = "type")]
    pub types: Option<String>,
    pub status: Option<String>,
    pub tags: Option<String>,
    pub parent_id: Option<Uuid>,
    pub assignee: Option<String>,
    pub search: Option<String>,
    pub sort: Option<SortKey>,
    pub direction: Option<SortDirection>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

impl ListItemsParams {
    pub fn into_filter(self) -> Result<ItemFilter, ItemValidationError> {
        let types = split_list(self.types.as_deref())
            .map(ItemType::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        let statuses = split_list(self.status.as_deref())
            .map(ItemStatus::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        let tags = split_list(self.tags.as_deref()).map(String::from).collect();

        Ok(ItemFilter {
            types,
            statuses,
            tags,
            parent_id: self.parent_id,
            assignee: self.assignee,
            search: self.search,
            sort: self.sort.unwrap_or_default(),
            direction: self.direction.unwrap_or_default(),
            limit: self.limit,
            offset: self.offset.unwrap_or(0),
        })
    }
}

pub async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ListItemsParams>,
) -> impl IntoResponse {
    let filter = match params.into_filter() {
        Ok(f) => f,
        Err(e) => return error_response(e.into()),
    };
    match state.service.list_items(filter).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_children(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.service.get_children(id).await {
        Ok(children) => Json(children).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct PriorityChange {
    pub id: Uuid,
    pub priority: i32,
}

#[derive(Deserialize)]
pub struct ReorderItemsBody {
    pub items: Vec<PriorityChange>,
}

pub async fn reorder_items(
    State(state): State<AppState>,
    body: Result<Json<ReorderItemsBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    let priorities = body
        .items
        .into_iter()
        .map(|change| (change.id, change.priority))
        .collect();

    match state.service.reorder_items(priorities).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct SetExternalIdBody {
    pub external_id: String,
}

pub async fn set_external_id(
    State(state): State<AppState>,
    Path((id, system)): Path<(Uuid, String)>,
    body: Result<Json<SetExternalIdBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    match state
        .service
        .set_external_id(id, &system, &body.external_id)
        .await
    {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_by_external_id(
    State(state): State<AppState>,
    Path((system, external_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state
        .service
        .get_item_by_external_id(&system, &external_id)
        .await
    {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn replay_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.service.replay_item(id).await {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.get_metrics().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub notifications: DeliveryStats,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        notifications: state.reports.stats().await,
    })
}
