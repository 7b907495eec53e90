//! Instance lifecycle endpoints

use crate::error::ApiError;
use crate::models::*;
use crate::ApiState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use fleet_common::{TenantId, ValidationError};
use fleet_orchestrator::{CreateRequest, LifecycleError, ResizeRequest};
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/", get(list_instances).post(create_instance))
        .route("/:id", get(get_instance).patch(resize_instance).delete(delete_instance))
}

/// Decode a JSON body, treating an empty or malformed one as a validation error
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::MalformedBody("empty body".into()).into());
    }
    serde_json::from_slice(body).map_err(|e| ValidationError::MalformedBody(e.to_string()).into())
}

/// Ids that cannot exist are answered without a store lookup
fn tenant_id(raw: String) -> Result<TenantId, ApiError> {
    let id = TenantId::from(raw);
    if id.is_well_formed() {
        Ok(id)
    } else {
        Err(LifecycleError::NotFound(id).into())
    }
}

/// List instances
#[utoipa::path(
    get,
    path = "/v1/instances",
    responses(
        (status = 200, description = "All instances in creation order", body = [InstanceView]),
        (status = 404, description = "No instances exist", body = ErrorResponse)
    ),
    tag = "instances",
    security(("api_key" = []))
)]
pub async fn list_instances(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<InstanceView>>, ApiError> {
    let records = state.orchestrator.list().await?;
    if records.is_empty() {
        return Err(ApiError::NoInstances);
    }
    Ok(Json(records.into_iter().map(InstanceView::from).collect()))
}

/// Get one instance
#[utoipa::path(
    get,
    path = "/v1/instances/{id}",
    params(("id" = String, Path, description = "Instance id")),
    responses(
        (status = 200, description = "Instance", body = InstanceView),
        (status = 404, description = "Unknown instance", body = ErrorResponse)
    ),
    tag = "instances",
    security(("api_key" = []))
)]
pub async fn get_instance(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<InstanceView>, ApiError> {
    let id = tenant_id(id)?;
    let record = state.orchestrator.get(&id).await?;
    Ok(Json(record.into()))
}

/// Create an instance
///
/// Returns as soon as the record exists; provisioning continues in the
/// background and is reflected in `status`.
#[utoipa::path(
    post,
    path = "/v1/instances",
    request_body = CreateInstance,
    responses(
        (status = 202, description = "Provisioning started", body = CreatedView),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "instances",
    security(("api_key" = []))
)]
pub async fn create_instance(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedView>), ApiError> {
    let input: CreateInstance = parse_body(&body)?;
    let created = state
        .orchestrator
        .create(CreateRequest {
            bucket: input.bucket,
            storage: input.storage,
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(created.into())))
}

/// Resize an instance
#[utoipa::path(
    patch,
    path = "/v1/instances/{id}",
    params(("id" = String, Path, description = "Instance id")),
    request_body = ResizeInstance,
    responses(
        (status = 202, description = "Resize processed", body = InstanceView),
        (status = 400, description = "Invalid request or shrinking quota", body = ErrorResponse),
        (status = 404, description = "Unknown instance", body = ErrorResponse),
        (status = 409, description = "Instance not ready or busy", body = ErrorResponse)
    ),
    tag = "instances",
    security(("api_key" = []))
)]
pub async fn resize_instance(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<InstanceView>), ApiError> {
    let id = tenant_id(id)?;
    let input: ResizeInstance = parse_body(&body)?;
    let record = state
        .orchestrator
        .resize(
            &id,
            ResizeRequest {
                storage: input.storage,
                bucket: input.bucket,
            },
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(record.into())))
}

/// Delete an instance
#[utoipa::path(
    delete,
    path = "/v1/instances/{id}",
    params(("id" = String, Path, description = "Instance id")),
    responses(
        (status = 202, description = "Record removed, teardown in progress", body = DeletedView),
        (status = 404, description = "Unknown instance", body = ErrorResponse),
        (status = 409, description = "Resize still running after the lock wait", body = ErrorResponse)
    ),
    tag = "instances",
    security(("api_key" = []))
)]
pub async fn delete_instance(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<DeletedView>), ApiError> {
    let id = tenant_id(id)?;
    state.orchestrator.delete(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(DeletedView::in_progress())))
}
