use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{LiveStatus, ServerToClient, SessionType};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{new_invite_code, Notification, Session};
use crate::error::AppError;
use crate::live::{self, Transition};
use crate::rooms::RoomKey;
use crate::routes::{load_session, require_member, require_owner};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub subject_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub session_type: SessionType,
    #[serde(default)]
    pub week_number: Option<i64>,
    #[serde(default)]
    pub attendance_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attendance_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub late_allowed: bool,
    #[serde(default)]
    pub late_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assignment_due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quiz_time_limit_minutes: Option<i64>,
    #[serde(default)]
    pub video_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub week_number: Option<i64>,
    #[serde(default)]
    pub attendance_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attendance_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub late_allowed: bool,
    #[serde(default)]
    pub late_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assignment_due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quiz_time_limit_minutes: Option<i64>,
    #[serde(default)]
    pub video_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub invite_code: String,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub subject_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub session_type: String,
    pub week_number: Option<i64>,
    pub live_status: Option<String>,
    pub current_checkpoint_id: Option<String>,
    /// Only exposed to the owning instructor
    pub invite_code: Option<String>,
    pub enrolled: bool,
}

impl SessionInfo {
    fn build(session: Session, viewer: &AuthUser, enrolled: bool) -> Self {
        let invite_code = if viewer.owns(&session.instructor_id) {
            Some(session.invite_code)
        } else {
            None
        };
        Self {
            id: session.id,
            subject_id: session.subject_id,
            title: session.title,
            description: session.description,
            session_type: session.session_type,
            week_number: session.week_number,
            live_status: session.live_status,
            current_checkpoint_id: session.current_checkpoint_id,
            invite_code,
            enrolled,
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<SessionInfo>>, AppError> {
    let sessions = if user.is_teacher() {
        state.db.list_sessions_for_instructor(&user.id).await?
    } else {
        state.db.list_sessions_for_student(&user.id).await?
    };
    let enrolled = !user.is_teacher();
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionInfo::build(s, &user, enrolled))
            .collect(),
    ))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionInfo>, AppError> {
    if !user.is_teacher() {
        return Err(AppError::Forbidden(
            "Only instructors may create sessions".to_string(),
        ));
    }
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if let Some(subject_id) = &req.subject_id {
        let subject = state
            .db
            .get_subject(subject_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Subject not found".to_string()))?;
        if !user.owns(&subject.instructor_id) {
            return Err(AppError::Forbidden(
                "Subject belongs to another instructor".to_string(),
            ));
        }
    }

    // Live sessions start in `preparing`; other types have no live lifecycle
    let live_status = match req.session_type {
        SessionType::Live => Some(LiveStatus::Preparing.as_str().to_string()),
        _ => None,
    };

    let session = Session {
        id: Uuid::new_v4().to_string(),
        subject_id: req.subject_id,
        title: req.title.trim().to_string(),
        description: req.description,
        session_type: req.session_type.as_str().to_string(),
        instructor_id: user.id.clone(),
        invite_code: new_invite_code(),
        week_number: req.week_number,
        live_status,
        current_checkpoint_id: None,
        attendance_start: req.attendance_start,
        attendance_end: req.attendance_end,
        late_allowed: req.late_allowed,
        late_end: req.late_end,
        assignment_due_date: req.assignment_due_date,
        quiz_time_limit_minutes: req.quiz_time_limit_minutes,
        video_url: req.video_url,
        material_file: None,
        deleted_at: None,
        created_at: None,
        updated_at: None,
    };
    state.db.create_session(&session).await?;

    Ok(Json(SessionInfo::build(session, &user, false)))
}

pub async fn view(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, AppError> {
    let session = load_session(&state, &session_id).await?;
    let enrolled = state.db.is_enrolled(&session.id, &user.id).await?;
    if !enrolled && !user.owns(&session.instructor_id) {
        return Err(AppError::Forbidden(
            "Not enrolled in this session".to_string(),
        ));
    }
    Ok(Json(SessionInfo::build(session, &user, enrolled)))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
    Json(req): Json<UpdateSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let mut session = load_session(&state, &session_id).await?;
    require_owner(&user, &session)?;
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    session.title = req.title.trim().to_string();
    session.description = req.description;
    session.week_number = req.week_number;
    session.attendance_start = req.attendance_start;
    session.attendance_end = req.attendance_end;
    session.late_allowed = req.late_allowed;
    session.late_end = req.late_end;
    session.assignment_due_date = req.assignment_due_date;
    session.quiz_time_limit_minutes = req.quiz_time_limit_minutes;
    session.video_url = req.video_url;
    state.db.update_session(&session).await?;

    Ok(Json(json!({ "success": true })))
}

pub async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_owner(&user, &session)?;

    state
        .db
        .soft_delete_session(&session.id, Utc::now())
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn enroll_by_code(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<EnrollRequest>,
) -> Result<Json<Value>, AppError> {
    let code = req.invite_code.trim().to_uppercase();
    let session = state
        .db
        .get_session_by_invite_code(&code)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid invite code".to_string()))?;

    if session.instructor_id == user.id {
        return Err(AppError::Conflict(
            "Instructors are not enrolled in their own sessions".to_string(),
        ));
    }
    state.db.enroll(&session.id, &user.id).await?;

    Ok(Json(json!({
        "success": true,
        "session_id": session.id,
        "title": session.title,
    })))
}

// Live lifecycle

pub async fn start_live(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_owner(&user, &session)?;
    match transition_live(&state, &session, LiveStatus::Live).await? {
        Transition::Started => {
            state
                .rooms
                .broadcast(
                    &RoomKey::Session(session.id.clone()),
                    ServerToClient::SessionStarted {
                        session_id: session.id.clone(),
                    },
                )
                .await;
            notify_enrolled(&state, &session, "session_started").await?;
            Ok(Json(json!({ "success": true, "live_status": "live" })))
        }
        Transition::NoOp => Ok(Json(json!({ "success": true, "live_status": "live" }))),
        Transition::Ended => unreachable!("start transition cannot end a session"),
    }
}

pub async fn end_live(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_owner(&user, &session)?;
    match transition_live(&state, &session, LiveStatus::Ended).await? {
        Transition::Ended => {
            // Freeze any still-running progress rows into a terminal saved state
            let now = Utc::now();
            let open = state.db.list_open_progress_for_session(&session.id).await?;
            for mut progress in open {
                let mut timer = progress.timer();
                if timer.stop(now).is_ok() {
                    progress.apply_timer(&timer);
                    state.db.save_progress(&progress).await?;
                }
            }

            state
                .rooms
                .broadcast(
                    &RoomKey::Session(session.id.clone()),
                    ServerToClient::SessionEnded {
                        session_id: session.id.clone(),
                    },
                )
                .await;
            Ok(Json(json!({ "success": true, "live_status": "ended" })))
        }
        Transition::NoOp => Ok(Json(json!({ "success": true, "live_status": "ended" }))),
        Transition::Started => unreachable!("end transition cannot start a session"),
    }
}

/// Validate and persist a live-status change. The row is the source of
/// truth; idempotent re-requests write nothing.
async fn transition_live(
    state: &AppState,
    session: &Session,
    target: LiveStatus,
) -> Result<Transition, AppError> {
    if session.session_type != SessionType::Live.as_str() {
        return Err(AppError::Validation("Not a live session".to_string()));
    }
    let current = session
        .live_status
        .as_deref()
        .and_then(LiveStatus::parse)
        .unwrap_or(LiveStatus::Preparing);

    let transition = live::transition(current, target)
        .map_err(|e| AppError::Conflict(e.to_string()))?;
    if transition != Transition::NoOp {
        state
            .db
            .set_live_status(&session.id, target.as_str())
            .await?;
    }
    Ok(transition)
}

async fn notify_enrolled(
    state: &AppState,
    session: &Session,
    kind: &str,
) -> Result<(), AppError> {
    let enrollments = state.db.list_enrollments(&session.id).await?;
    for enrollment in enrollments {
        state
            .db
            .insert_notification(&Notification {
                id: Uuid::new_v4().to_string(),
                user_id: enrollment.user_id,
                kind: kind.to_string(),
                body: format!("\"{}\" is now live", session.title),
                link: Some(format!("/sessions/{}", session.id)),
                is_read: false,
                created_at: None,
            })
            .await?;
    }
    Ok(())
}

// Chat history (reconnecting clients re-fetch state over HTTP)

pub async fn chat_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_member(&state, &user, &session).await?;

    let messages = state.db.list_chat_messages(&session.id).await?;
    let messages: Vec<Value> = messages
        .into_iter()
        .map(|m| {
            json!({
                "id": m.id,
                "user_id": m.user_id,
                "username": m.username,
                "role": m.role,
                "text": m.text,
                "created_at": m.created_at.map(|t| t.to_rfc3339()),
            })
        })
        .collect();
    Ok(Json(json!({ "session_id": session.id, "messages": messages })))
}
