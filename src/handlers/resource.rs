//! Resource CRUD handlers. The resource is resolved from the first path segment.

use crate::config::ResolvedResource;
use crate::error::AppError;
use crate::extractors::Authenticated;
use crate::query::parse_list_params;
use crate::response::{Deleted, NamedList};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

fn resource<'a>(state: &'a AppState, path_segment: &str) -> Result<&'a ResolvedResource, AppError> {
    state
        .catalog
        .resource_by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(format!("no resource at /{}", path_segment)))
}

/// An id that is not a UUID cannot exist.
fn parse_id(resource: &ResolvedResource, id_str: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id_str).map_err(|_| AppError::NotFound(format!("{} {}", resource.path_segment, id_str)))
}

pub async fn list(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(path_segment): Path<String>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    auth.require(&resource.read_scope())?;
    let Query(params) = params?;
    let params = parse_list_params(resource, &params)?;
    let docs = state.crud.find(resource, &params).await?;
    Ok(Json(NamedList::new(path_segment, docs, params.page)))
}

pub async fn create(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(path_segment): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    auth.require(&resource.write_scope())?;
    let Json(body) = body?;
    let doc = state.crud.create(resource, body).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn read(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    auth.require(&resource.read_scope())?;
    let id = parse_id(resource, &id_str)?;
    let doc = state.crud.get(resource, id).await?;
    Ok(Json(doc))
}

pub async fn update(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((path_segment, id_str)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    auth.require(&resource.write_scope())?;
    let id = parse_id(resource, &id_str)?;
    let Json(body) = body?;
    let doc = state.crud.update(resource, id, body).await?;
    Ok((StatusCode::ACCEPTED, Json(doc)))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    auth.require(&resource.write_scope())?;
    let id = parse_id(resource, &id_str)?;
    state.crud.delete(resource, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PurgeParams {
    #[serde(default)]
    pub source: Option<String>,
}

/// DELETE /{path}?source=... removes every record from that source.
pub async fn purge(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(path_segment): Path<String>,
    params: Result<Query<PurgeParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    auth.require(&resource.write_scope())?;
    let Query(params) = params?;
    let source = params
        .source
        .ok_or_else(|| AppError::Validation("source query parameter is required".into()))?;
    let deleted = state.crud.purge_source(resource, &source).await?;
    Ok(Json(Deleted { deleted }))
}
