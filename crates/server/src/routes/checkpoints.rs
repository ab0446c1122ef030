use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::Checkpoint;
use crate::error::AppError;
use crate::routes::{load_session, require_member, require_owner};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckpointRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub estimated_minutes: Option<i64>,
    /// Omitted on create: appended after the current last checkpoint
    #[serde(default)]
    pub seq: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_member(&state, &user, &session).await?;

    let checkpoints = state.db.list_checkpoints(&session.id).await?;
    let checkpoints: Vec<Value> = checkpoints
        .into_iter()
        .map(|c| {
            json!({
                "id": c.id,
                "title": c.title,
                "description": c.description,
                "seq": c.seq,
                "estimated_minutes": c.estimated_minutes,
            })
        })
        .collect();
    Ok(Json(json!({ "session_id": session.id, "checkpoints": checkpoints })))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
    Json(req): Json<CheckpointRequest>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_owner(&user, &session)?;
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    let seq = match req.seq {
        Some(seq) => seq,
        None => state.db.max_checkpoint_seq(&session.id).await? + 1,
    };
    let checkpoint = Checkpoint {
        id: Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        title: req.title.trim().to_string(),
        description: req.description,
        seq,
        estimated_minutes: req.estimated_minutes,
        deleted_at: None,
        created_at: None,
    };
    state.db.create_checkpoint(&checkpoint).await?;

    Ok(Json(json!({ "success": true, "checkpoint_id": checkpoint.id, "seq": seq })))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(checkpoint_id): Path<String>,
    Json(req): Json<CheckpointRequest>,
) -> Result<Json<Value>, AppError> {
    let mut checkpoint = load_checkpoint(&state, &checkpoint_id).await?;
    let session = load_session(&state, &checkpoint.session_id).await?;
    require_owner(&user, &session)?;
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    checkpoint.title = req.title.trim().to_string();
    checkpoint.description = req.description;
    checkpoint.estimated_minutes = req.estimated_minutes;
    if let Some(seq) = req.seq {
        checkpoint.seq = seq;
    }
    state.db.update_checkpoint(&checkpoint).await?;

    Ok(Json(json!({ "success": true })))
}

pub async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(checkpoint_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let checkpoint = load_checkpoint(&state, &checkpoint_id).await?;
    let session = load_session(&state, &checkpoint.session_id).await?;
    require_owner(&user, &session)?;

    state
        .db
        .soft_delete_checkpoint(&checkpoint.id, chrono::Utc::now())
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub(crate) async fn load_checkpoint(
    state: &AppState,
    id: &str,
) -> Result<Checkpoint, AppError> {
    state
        .db
        .get_checkpoint(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Checkpoint not found".to_string()))
}
