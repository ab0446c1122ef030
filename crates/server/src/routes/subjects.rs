use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{new_invite_code, Subject};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubjectRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_visible")]
    pub is_visible: bool,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct SubjectInfo {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub instructor_id: String,
    /// Only exposed to the owning instructor
    pub invite_code: Option<String>,
    pub is_visible: bool,
}

impl SubjectInfo {
    fn from_subject(subject: Subject, viewer: &AuthUser) -> Self {
        let invite_code = if viewer.owns(&subject.instructor_id) {
            Some(subject.invite_code)
        } else {
            None
        };
        Self {
            id: subject.id,
            title: subject.title,
            description: subject.description,
            instructor_id: subject.instructor_id,
            invite_code,
            is_visible: subject.is_visible,
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<SubjectInfo>>, AppError> {
    let subjects = if user.is_teacher() {
        state.db.list_subjects_for_instructor(&user.id).await?
    } else {
        state.db.list_visible_subjects().await?
    };
    Ok(Json(
        subjects
            .into_iter()
            .map(|s| SubjectInfo::from_subject(s, &user))
            .collect(),
    ))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SubjectRequest>,
) -> Result<Json<SubjectInfo>, AppError> {
    if !user.is_teacher() {
        return Err(AppError::Forbidden(
            "Only instructors may create subjects".to_string(),
        ));
    }
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    let subject = Subject {
        id: Uuid::new_v4().to_string(),
        title: req.title.trim().to_string(),
        description: req.description,
        instructor_id: user.id.clone(),
        invite_code: new_invite_code(),
        is_visible: req.is_visible,
        deleted_at: None,
        created_at: None,
    };
    state.db.create_subject(&subject).await?;

    Ok(Json(SubjectInfo::from_subject(subject, &user)))
}

pub async fn view(
    State(state): State<AppState>,
    user: AuthUser,
    Path(subject_id): Path<String>,
) -> Result<Json<SubjectInfo>, AppError> {
    let subject = load_subject(&state, &subject_id).await?;
    if !subject.is_visible && !user.owns(&subject.instructor_id) {
        return Err(AppError::Forbidden("Subject is not visible".to_string()));
    }
    Ok(Json(SubjectInfo::from_subject(subject, &user)))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(subject_id): Path<String>,
    Json(req): Json<SubjectRequest>,
) -> Result<Json<Value>, AppError> {
    let subject = load_subject(&state, &subject_id).await?;
    require_subject_owner(&user, &subject)?;
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    state
        .db
        .update_subject(
            &subject.id,
            req.title.trim(),
            req.description.as_deref(),
            req.is_visible,
        )
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(subject_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let subject = load_subject(&state, &subject_id).await?;
    require_subject_owner(&user, &subject)?;

    state
        .db
        .soft_delete_subject(&subject.id, chrono::Utc::now())
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn regenerate_code(
    State(state): State<AppState>,
    user: AuthUser,
    Path(subject_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let subject = load_subject(&state, &subject_id).await?;
    require_subject_owner(&user, &subject)?;

    let code = new_invite_code();
    state.db.set_subject_invite_code(&subject.id, &code).await?;
    Ok(Json(json!({ "success": true, "invite_code": code })))
}

pub async fn sessions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(subject_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let subject = load_subject(&state, &subject_id).await?;
    if !subject.is_visible && !user.owns(&subject.instructor_id) {
        return Err(AppError::Forbidden("Subject is not visible".to_string()));
    }

    let sessions = state.db.list_sessions_by_subject(&subject.id).await?;
    let sessions: Vec<Value> = sessions
        .into_iter()
        .map(|s| {
            json!({
                "id": s.id,
                "title": s.title,
                "session_type": s.session_type,
                "week_number": s.week_number,
                "live_status": s.live_status,
            })
        })
        .collect();
    Ok(Json(json!({ "subject_id": subject.id, "sessions": sessions })))
}

async fn load_subject(state: &AppState, id: &str) -> Result<Subject, AppError> {
    state
        .db
        .get_subject(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subject not found".to_string()))
}

fn require_subject_owner(user: &AuthUser, subject: &Subject) -> Result<(), AppError> {
    if user.owns(&subject.instructor_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the owning instructor may do this".to_string(),
        ))
    }
}
