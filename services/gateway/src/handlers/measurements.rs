use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use types::ids::SourceId;
use types::measurement::Measurement;

/// Latest reading of every source, keyed by source.
pub async fn list_measurements(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state.reader.read_json()?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

pub async fn get_measurement(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Json<Measurement>, AppError> {
    let source = SourceId::from(source);
    state
        .reader
        .read_one(&source)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No measurement for source {}", source)))
}
