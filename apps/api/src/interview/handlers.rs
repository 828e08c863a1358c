use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::session::{InterviewSession, SessionSnapshot};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub text: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// POST /api/v1/interviews
pub async fn handle_create_interview(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    let session = Arc::new(InterviewSession::new(
        Uuid::new_v4(),
        state.settings.clone(),
        state.source.clone(),
        state.handoff.clone(),
    ));
    state.sessions.insert(session.clone()).await;
    info!(
        "Interview {} created ({} live)",
        session.id(),
        state.sessions.len().await
    );
    let snapshot = session.start().await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/v1/interviews/:id
pub async fn handle_get_interview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.sessions.get(id).await?;
    Ok(Json(session.snapshot()))
}

/// POST /api/v1/interviews/:id/answers
pub async fn handle_submit_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.sessions.get(id).await?;
    let snapshot = session.submit_answer(&req.text, req.code).await?;
    Ok(Json(snapshot))
}

/// POST /api/v1/interviews/:id/skip
pub async fn handle_skip_topic(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.sessions.get(id).await?;
    Ok(Json(session.skip_topic().await?))
}

/// POST /api/v1/interviews/:id/advance
pub async fn handle_advance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.sessions.get(id).await?;
    Ok(Json(session.advance().await?))
}

/// POST /api/v1/interviews/:id/submit
pub async fn handle_submit_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.sessions.get(id).await?;
    Ok(Json(session.submit_task().await?))
}

/// POST /api/v1/interviews/:id/terminate
pub async fn handle_terminate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.sessions.get(id).await?;
    Ok(Json(session.terminate()))
}

/// DELETE /api/v1/interviews/:id
pub async fn handle_delete_interview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let session = state.sessions.remove(id).await?;
    session.terminate();
    Ok(StatusCode::NO_CONTENT)
}
