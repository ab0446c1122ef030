use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::SessionType;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{AssignmentSubmission, Session};
use crate::error::AppError;
use crate::routes::{load_session, require_member, require_owner};
use crate::state::AppState;

fn require_assignment(session: &Session) -> Result<(), AppError> {
    if session.session_type != SessionType::Assignment.as_str() {
        return Err(AppError::Validation(
            "Not an assignment session".to_string(),
        ));
    }
    Ok(())
}

/// Students see their own submission; the instructor sees all of them
pub async fn view(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_assignment(&session)?;
    require_member(&state, &user, &session).await?;

    if user.owns(&session.instructor_id) {
        let submissions = state.db.list_submissions(&session.id).await?;
        let submissions: Vec<Value> = submissions.into_iter().map(submission_json).collect();
        return Ok(Json(json!({
            "session_id": session.id,
            "due_date": session.assignment_due_date.map(|t| t.to_rfc3339()),
            "submissions": submissions,
        })));
    }

    let submission = state.db.get_submission(&session.id, &user.id).await?;
    Ok(Json(json!({
        "session_id": session.id,
        "due_date": session.assignment_due_date.map(|t| t.to_rfc3339()),
        "submission": submission.map(submission_json),
    })))
}

fn submission_json(s: AssignmentSubmission) -> Value {
    json!({
        "user_id": s.user_id,
        "content": s.content,
        "file_name": s.file_name,
        "submitted_at": s.submitted_at.map(|t| t.to_rfc3339()),
        "score": s.score,
        "feedback": s.feedback,
        "graded_at": s.graded_at.map(|t| t.to_rfc3339()),
    })
}

/// Submit (or replace) the caller's assignment: text content plus an
/// optional attachment
pub async fn submit(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_assignment(&session)?;
    require_member(&state, &user, &session).await?;
    if user.owns(&session.instructor_id) {
        return Err(AppError::Forbidden(
            "Instructors do not submit assignments".to_string(),
        ));
    }
    if let Some(due) = session.assignment_due_date {
        if Utc::now() > due {
            return Err(AppError::Conflict("The due date has passed".to_string()));
        }
    }

    let mut content = None;
    let mut file_name = None;
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("content") => {
                content = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::Validation(e.to_string()))?,
                );
            }
            Some("file") => {
                file_name = field.file_name().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                file_bytes = Some(data.to_vec());
            }
            _ => {}
        }
    }

    if content.as_deref().map(str::trim).unwrap_or_default().is_empty() && file_bytes.is_none() {
        return Err(AppError::Validation(
            "A submission needs text content or a file".to_string(),
        ));
    }

    let mut file_path = None;
    if let (Some(name), Some(bytes)) = (&file_name, &file_bytes) {
        if bytes.len() as u64 > state.config.storage.max_upload_bytes {
            return Err(AppError::Validation(format!(
                "File exceeds the {} MB upload limit",
                state.config.storage.max_upload_bytes / (1024 * 1024)
            )));
        }
        let file_id = Uuid::new_v4().to_string();
        let rel = state
            .storage
            .save_upload(&session.id, &file_id, name, bytes)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        file_path = Some(rel);
    }

    let submission = AssignmentSubmission {
        id: Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        user_id: user.id.clone(),
        content,
        file_path,
        file_name,
        submitted_at: Some(Utc::now()),
        score: None,
        feedback: None,
        graded_at: None,
        graded_by: None,
    };
    state.db.upsert_submission(&submission).await?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub user_id: String,
    pub score: i64,
    #[serde(default)]
    pub feedback: Option<String>,
}

pub async fn grade(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
    Json(req): Json<GradeRequest>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_assignment(&session)?;
    require_owner(&user, &session)?;

    if state
        .db
        .get_submission(&session.id, &req.user_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("Submission not found".to_string()));
    }
    if req.score < 0 {
        return Err(AppError::Validation("Score must be non-negative".to_string()));
    }

    state
        .db
        .grade_submission(
            &session.id,
            &req.user_id,
            req.score,
            req.feedback.as_deref(),
            &user.id,
            Utc::now(),
        )
        .await?;

    Ok(Json(json!({ "success": true })))
}

/// Download a submission attachment: the submitter or the instructor
pub async fn download(
    State(state): State<AppState>,
    user: AuthUser,
    Path((session_id, user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let session = load_session(&state, &session_id).await?;
    if user.id != user_id {
        require_owner(&user, &session)?;
    }

    let submission = state
        .db
        .get_submission(&session.id, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;
    let file_path = submission
        .file_path
        .ok_or_else(|| AppError::NotFound("Submission has no attachment".to_string()))?;
    let file_name = submission.file_name.unwrap_or_else(|| "attachment".to_string());

    let bytes = state
        .storage
        .read_upload(&file_path)
        .await
        .map_err(|_| AppError::NotFound("Attachment missing from storage".to_string()))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/octet-stream".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name.replace('"', "")),
            ),
        ],
        bytes,
    ))
}
