// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

use super::validation::{self, ValidationError};
use crate::application::{ErrorBody, MeasureFailure, MeasureService};

pub struct AppState {
    pub measure_service: Arc<dyn MeasureService>,
}

pub fn app(service: Arc<dyn MeasureService>, body_limit_bytes: usize) -> Router {
    let state = Arc::new(AppState {
        measure_service: service,
    });

    Router::new()
        .route("/upload", post(upload_measure))
        .route("/confirm", patch(confirm_measure))
        .route("/{customer_code}/list", get(list_measures))
        .route("/public/{file}", get(measure_image))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Failure answered to an HTTP caller.
pub enum ApiError {
    Validation(ValidationError),
    Workflow(MeasureFailure),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<MeasureFailure> for ApiError {
    fn from(err: MeasureFailure) -> Self {
        ApiError::Workflow(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, body): (u16, ErrorBody) = match self {
            ApiError::Validation(err) => (400, err.body()),
            ApiError::Workflow(err) => (err.status().http_code(), err.body()),
        };
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

/// Unwrap a JSON body, reporting unreadable payloads as `INVALID_DATA`.
fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    match payload {
        Ok(Json(value)) if value.is_object() => Ok(value),
        Ok(_) => Err(ValidationError::InvalidData("Request body must be a JSON object.".to_string()).into()),
        Err(rejection) => {
            debug!(reason = %rejection.body_text(), "Rejected request body");
            Err(ValidationError::InvalidData(rejection.body_text()).into())
        }
    }
}

async fn upload_measure(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let command = validation::create_command(&json_body(payload)?)?;
    let created = state.measure_service.create_measure(command).await?;
    Ok(Json(created))
}

async fn confirm_measure(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let command = validation::confirm_command(&json_body(payload)?)?;
    let confirmed = state.measure_service.update_measure(command).await?;
    Ok(Json(confirmed))
}

#[derive(Deserialize)]
struct ListQuery {
    measure_type: Option<String>,
}

async fn list_measures(
    State(state): State<Arc<AppState>>,
    Path(customer_code): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let measure_type = validation::list_filter(query.measure_type.as_deref())?;
    let measures = state
        .measure_service
        .get_measures(&customer_code, measure_type)
        .await?;
    Ok(Json(measures))
}

async fn measure_image(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (measure_id, extension) = validation::image_file(&file)?;
    let image = state.measure_service.get_image(measure_id).await?;

    let content_type = HeaderValue::from_str(&format!("image/{}", extension))
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok(([(header::CONTENT_TYPE, content_type)], image.bytes))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
