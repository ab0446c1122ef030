use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{ProgressMode, ServerToClient};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{Checkpoint, Progress};
use crate::error::AppError;
use crate::rooms::RoomKey;
use crate::routes::checkpoints::load_checkpoint;
use crate::routes::{load_session, require_member, require_owner};
use crate::state::AppState;
use crate::timer::{TimerError, TimerState};

#[derive(Debug, Default, Deserialize)]
pub struct ModeRequest {
    #[serde(default)]
    pub mode: ProgressMode,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModeQuery {
    #[serde(default)]
    pub mode: ProgressMode,
}

/// Resolve the checkpoint and verify the caller may record progress on it
async fn load_target(
    state: &AppState,
    user: &AuthUser,
    checkpoint_id: &str,
) -> Result<Checkpoint, AppError> {
    let checkpoint = load_checkpoint(state, checkpoint_id).await?;
    let session = load_session(state, &checkpoint.session_id).await?;
    require_member(state, user, &session).await?;
    Ok(checkpoint)
}

/// Load the swept progress row for the pair, creating it lazily
async fn load_or_create(
    state: &AppState,
    user: &AuthUser,
    checkpoint_id: &str,
    mode: ProgressMode,
) -> Result<Progress, AppError> {
    let now = Utc::now();
    if let Some(progress) = state
        .db
        .load_progress_swept(&user.id, checkpoint_id, mode.as_str(), now)
        .await?
    {
        return Ok(progress);
    }
    let progress = Progress {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        checkpoint_id: checkpoint_id.to_string(),
        mode: mode.as_str().to_string(),
        started_at: None,
        paused_at: None,
        is_paused: false,
        accumulated_seconds: 0,
        completed_at: None,
        duration_seconds: None,
    };
    state.db.insert_progress(&progress).await?;
    Ok(progress)
}

async fn save_timer(
    state: &AppState,
    progress: &mut Progress,
    timer: &TimerState,
) -> Result<(), AppError> {
    progress.apply_timer(timer);
    state.db.save_progress(progress).await?;
    Ok(())
}

fn conflict(err: TimerError) -> AppError {
    AppError::Conflict(err.to_string())
}

pub async fn status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(checkpoint_id): Path<String>,
    Query(query): Query<ModeQuery>,
) -> Result<Json<Value>, AppError> {
    load_target(&state, &user, &checkpoint_id).await?;
    let now = Utc::now();
    let progress = state
        .db
        .load_progress_swept(&user.id, &checkpoint_id, query.mode.as_str(), now)
        .await?;

    let Some(progress) = progress else {
        return Ok(Json(json!({
            "checkpoint_id": checkpoint_id,
            "started": false,
            "completed": false,
            "is_paused": false,
            "elapsed_seconds": 0,
        })));
    };
    let timer = progress.timer();
    Ok(Json(json!({
        "checkpoint_id": checkpoint_id,
        "started": timer.has_started(),
        "completed": timer.is_completed(),
        "is_paused": timer.is_paused,
        "elapsed_seconds": timer.elapsed_seconds(now),
        "duration_seconds": timer.duration_seconds,
    })))
}

pub async fn start(
    State(state): State<AppState>,
    user: AuthUser,
    Path(checkpoint_id): Path<String>,
    body: Option<Json<ModeRequest>>,
) -> Result<Json<Value>, AppError> {
    let mode = body.map(|Json(b)| b.mode).unwrap_or_default();
    load_target(&state, &user, &checkpoint_id).await?;

    let mut progress = load_or_create(&state, &user, &checkpoint_id, mode).await?;
    let mut timer = progress.timer();
    timer.start(Utc::now()).map_err(conflict)?;
    save_timer(&state, &mut progress, &timer).await?;

    Ok(Json(json!({
        "success": true,
        "checkpoint_id": checkpoint_id,
        "started_at": timer.running_since.map(|t| t.to_rfc3339()),
    })))
}

pub async fn pause(
    State(state): State<AppState>,
    user: AuthUser,
    Path(checkpoint_id): Path<String>,
    body: Option<Json<ModeRequest>>,
) -> Result<Json<Value>, AppError> {
    let mode = body.map(|Json(b)| b.mode).unwrap_or_default();
    load_target(&state, &user, &checkpoint_id).await?;

    let mut progress = load_or_create(&state, &user, &checkpoint_id, mode).await?;
    let mut timer = progress.timer();
    let elapsed = timer.pause(Utc::now()).map_err(conflict)?;
    save_timer(&state, &mut progress, &timer).await?;

    Ok(Json(json!({
        "success": true,
        "checkpoint_id": checkpoint_id,
        "status": "paused",
        "elapsed_seconds": elapsed,
    })))
}

pub async fn resume(
    State(state): State<AppState>,
    user: AuthUser,
    Path(checkpoint_id): Path<String>,
    body: Option<Json<ModeRequest>>,
) -> Result<Json<Value>, AppError> {
    let mode = body.map(|Json(b)| b.mode).unwrap_or_default();
    load_target(&state, &user, &checkpoint_id).await?;

    let mut progress = load_or_create(&state, &user, &checkpoint_id, mode).await?;
    let mut timer = progress.timer();
    match timer.resume(Utc::now()) {
        Ok(()) => {
            save_timer(&state, &mut progress, &timer).await?;
            Ok(Json(json!({
                "success": true,
                "checkpoint_id": checkpoint_id,
                "status": "resumed",
                "elapsed_seconds": timer.accumulated_seconds,
            })))
        }
        Err(err @ TimerError::PauseExpired) => {
            // the expired pause was force-stopped; persist that outcome
            save_timer(&state, &mut progress, &timer).await?;
            Err(conflict(err))
        }
        Err(err) => Err(conflict(err)),
    }
}

pub async fn stop(
    State(state): State<AppState>,
    user: AuthUser,
    Path(checkpoint_id): Path<String>,
    body: Option<Json<ModeRequest>>,
) -> Result<Json<Value>, AppError> {
    let mode = body.map(|Json(b)| b.mode).unwrap_or_default();
    load_target(&state, &user, &checkpoint_id).await?;

    let mut progress = load_or_create(&state, &user, &checkpoint_id, mode).await?;
    let mut timer = progress.timer();
    let total = timer.stop(Utc::now()).map_err(conflict)?;
    save_timer(&state, &mut progress, &timer).await?;

    Ok(Json(json!({
        "success": true,
        "checkpoint_id": checkpoint_id,
        "status": "stopped",
        "duration_seconds": total,
    })))
}

pub async fn reset(
    State(state): State<AppState>,
    user: AuthUser,
    Path(checkpoint_id): Path<String>,
    body: Option<Json<ModeRequest>>,
) -> Result<Json<Value>, AppError> {
    let mode = body.map(|Json(b)| b.mode).unwrap_or_default();
    load_target(&state, &user, &checkpoint_id).await?;

    let mut progress = load_or_create(&state, &user, &checkpoint_id, mode).await?;
    let mut timer = progress.timer();
    timer.reset();
    save_timer(&state, &mut progress, &timer).await?;

    Ok(Json(json!({
        "success": true,
        "checkpoint_id": checkpoint_id,
        "status": "reset",
    })))
}

pub async fn complete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(checkpoint_id): Path<String>,
    body: Option<Json<ModeRequest>>,
) -> Result<Json<Value>, AppError> {
    let mode = body.map(|Json(b)| b.mode).unwrap_or_default();
    let checkpoint = load_target(&state, &user, &checkpoint_id).await?;

    let mut progress = load_or_create(&state, &user, &checkpoint_id, mode).await?;
    let mut timer = progress.timer();
    let duration = timer.complete(Utc::now());
    save_timer(&state, &mut progress, &timer).await?;

    // Live completions show up on the instructor dashboard in real time
    if mode == ProgressMode::Live {
        state
            .rooms
            .broadcast(
                &RoomKey::Session(checkpoint.session_id.clone()),
                ServerToClient::ProgressUpdate {
                    session_id: checkpoint.session_id.clone(),
                    user_id: user.id.clone(),
                    username: user.username.clone(),
                    checkpoint_id: checkpoint_id.clone(),
                    status: "completed".to_string(),
                },
            )
            .await;
    }

    Ok(Json(json!({
        "success": true,
        "checkpoint_id": checkpoint_id,
        "duration_seconds": duration,
    })))
}

pub async fn uncomplete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(checkpoint_id): Path<String>,
    body: Option<Json<ModeRequest>>,
) -> Result<Json<Value>, AppError> {
    let mode = body.map(|Json(b)| b.mode).unwrap_or_default();
    let checkpoint = load_target(&state, &user, &checkpoint_id).await?;

    let now = Utc::now();
    let progress = state
        .db
        .load_progress_swept(&user.id, &checkpoint_id, mode.as_str(), now)
        .await?;
    let Some(mut progress) = progress else {
        return Err(AppError::Conflict("Nothing to uncomplete".to_string()));
    };
    let mut timer = progress.timer();
    if !timer.is_completed() {
        return Err(AppError::Conflict("Checkpoint is not completed".to_string()));
    }
    timer.uncomplete();
    save_timer(&state, &mut progress, &timer).await?;

    if mode == ProgressMode::Live {
        state
            .rooms
            .broadcast(
                &RoomKey::Session(checkpoint.session_id.clone()),
                ServerToClient::ProgressUpdate {
                    session_id: checkpoint.session_id.clone(),
                    user_id: user.id.clone(),
                    username: user.username.clone(),
                    checkpoint_id: checkpoint_id.clone(),
                    status: "uncompleted".to_string(),
                },
            )
            .await;
    }

    Ok(Json(json!({ "success": true, "checkpoint_id": checkpoint_id })))
}

/// Instructor view: per-student, per-checkpoint progress for one session
pub async fn session_matrix(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_owner(&user, &session)?;

    let now = Utc::now();
    let checkpoints = state.db.list_checkpoints(&session.id).await?;
    let enrollments = state.db.list_enrollments(&session.id).await?;

    let mut students = Vec::new();
    for enrollment in enrollments {
        let Some(student) = state.db.get_user_by_id(&enrollment.user_id).await? else {
            continue;
        };
        let mut per_checkpoint = serde_json::Map::new();
        for checkpoint in &checkpoints {
            let mut modes = serde_json::Map::new();
            for mode in [ProgressMode::Live, ProgressMode::SelfPaced] {
                let progress = state
                    .db
                    .load_progress_swept(&student.id, &checkpoint.id, mode.as_str(), now)
                    .await?;
                let entry = match progress {
                    Some(p) => {
                        let timer = p.timer();
                        json!({
                            "started": timer.has_started(),
                            "completed": timer.is_completed(),
                            "is_paused": timer.is_paused,
                            "elapsed_seconds": timer.elapsed_seconds(now),
                            "duration_seconds": timer.duration_seconds,
                        })
                    }
                    None => json!({
                        "started": false,
                        "completed": false,
                        "is_paused": false,
                        "elapsed_seconds": 0,
                    }),
                };
                modes.insert(mode.as_str().to_string(), entry);
            }
            per_checkpoint.insert(checkpoint.id.clone(), Value::Object(modes));
        }
        students.push(json!({
            "user_id": student.id,
            "username": student.username,
            "email": student.email,
            "progress": per_checkpoint,
        }));
    }

    Ok(Json(json!({
        "session_id": session.id,
        "checkpoints": checkpoints.iter().map(|c| json!({
            "id": c.id,
            "title": c.title,
            "seq": c.seq,
        })).collect::<Vec<_>>(),
        "students": students,
    })))
}

/// CSV export of the same matrix, one row per (student, checkpoint, mode)
pub async fn export_csv(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_owner(&user, &session)?;

    let now = Utc::now();
    let checkpoints = state.db.list_checkpoints(&session.id).await?;
    let enrollments = state.db.list_enrollments(&session.id).await?;

    let mut lines = vec![
        "username,email,checkpoint,mode,started,completed,elapsed_seconds".to_string(),
    ];
    for enrollment in enrollments {
        let Some(student) = state.db.get_user_by_id(&enrollment.user_id).await? else {
            continue;
        };
        for checkpoint in &checkpoints {
            for mode in [ProgressMode::Live, ProgressMode::SelfPaced] {
                let progress = state
                    .db
                    .load_progress_swept(&student.id, &checkpoint.id, mode.as_str(), now)
                    .await?;
                let (started, completed, elapsed) = match progress {
                    Some(p) => {
                        let timer = p.timer();
                        (
                            timer.has_started(),
                            timer.is_completed(),
                            timer.elapsed_seconds(now),
                        )
                    }
                    None => (false, false, 0),
                };
                lines.push(
                    [
                        csv_field(&student.username),
                        csv_field(&student.email),
                        csv_field(&checkpoint.title),
                        mode.as_str().to_string(),
                        started.to_string(),
                        completed.to_string(),
                        elapsed.to_string(),
                    ]
                    .join(","),
                );
            }
        }
    }

    let body = lines.join("\n");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"progress-{}.csv\"", session.id),
            ),
        ],
        body,
    ))
}

/// Quote a field if it carries a delimiter, per RFC 4180
pub(crate) fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
