use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{Attendance, Session};
use crate::error::AppError;
use crate::routes::progress::csv_field;
use crate::routes::{load_session, require_member, require_owner};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MarkRequest {
    pub user_id: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkMarkRequest {
    pub attendances: Vec<MarkRequest>,
}

fn default_status() -> String {
    "present".to_string()
}

const VALID_STATUSES: [&str; 3] = ["present", "late", "absent"];

/// Classify a self check-in against the session's attendance window.
/// On-time inside the window, `late` within the grace period, rejected
/// outside both. A session with no window accepts check-ins any time.
fn classify_self_check(
    now: DateTime<Utc>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    late_allowed: bool,
    late_end: Option<DateTime<Utc>>,
) -> Result<&'static str, AppError> {
    let (Some(start), Some(end)) = (start, end) else {
        return Ok("present");
    };
    if now < start {
        return Err(AppError::Conflict(
            "Attendance window has not opened yet".to_string(),
        ));
    }
    if now <= end {
        return Ok("present");
    }
    if late_allowed {
        match late_end {
            Some(late_end) if now <= late_end => return Ok("late"),
            None => return Ok("late"),
            _ => {}
        }
    }
    Err(AppError::Conflict("Attendance window has closed".to_string()))
}

fn classify_for_session(now: DateTime<Utc>, session: &Session) -> Result<&'static str, AppError> {
    classify_self_check(
        now,
        session.attendance_start,
        session.attendance_end,
        session.late_allowed,
        session.late_end,
    )
}

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_owner(&user, &session)?;

    let records = state.db.list_attendance(&session.id).await?;
    let records: Vec<Value> = records
        .into_iter()
        .map(|a| {
            json!({
                "user_id": a.user_id,
                "status": a.status,
                "checked_at": a.checked_at.map(|t| t.to_rfc3339()),
                "checked_by": a.checked_by,
                "notes": a.notes,
            })
        })
        .collect();
    Ok(Json(json!({ "session_id": session.id, "records": records })))
}

/// Instructor marks (or corrects) one student's attendance
pub async fn mark(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
    Json(req): Json<MarkRequest>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_owner(&user, &session)?;
    if !VALID_STATUSES.contains(&req.status.as_str()) {
        return Err(AppError::Validation(format!(
            "Invalid attendance status: {}",
            req.status
        )));
    }

    let attendance = Attendance {
        id: Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        user_id: req.user_id,
        status: req.status.clone(),
        checked_at: Some(Utc::now()),
        checked_by: Some(user.id.clone()),
        notes: req.notes,
    };
    state.db.upsert_attendance(&attendance).await?;

    Ok(Json(json!({ "success": true, "status": req.status })))
}

/// Student checks themselves in during the attendance window
pub async fn self_check(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_member(&state, &user, &session).await?;

    if let Some(existing) = state.db.get_attendance(&session.id, &user.id).await? {
        return Ok(Json(json!({
            "success": true,
            "status": existing.status,
            "already_checked": true,
        })));
    }

    let status = classify_for_session(Utc::now(), &session)?;
    let attendance = Attendance {
        id: Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        user_id: user.id.clone(),
        status: status.to_string(),
        checked_at: Some(Utc::now()),
        checked_by: None,
        notes: None,
    };
    state.db.upsert_attendance(&attendance).await?;

    Ok(Json(json!({ "success": true, "status": status })))
}

pub async fn bulk_mark(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
    Json(req): Json<BulkMarkRequest>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_owner(&user, &session)?;

    for entry in &req.attendances {
        if !VALID_STATUSES.contains(&entry.status.as_str()) {
            return Err(AppError::Validation(format!(
                "Invalid attendance status: {}",
                entry.status
            )));
        }
    }

    let count = req.attendances.len();
    for entry in req.attendances {
        let attendance = Attendance {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            user_id: entry.user_id,
            status: entry.status,
            checked_at: Some(Utc::now()),
            checked_by: Some(user.id.clone()),
            notes: entry.notes,
        };
        state.db.upsert_attendance(&attendance).await?;
    }

    Ok(Json(json!({ "success": true, "count": count })))
}

/// Per-student summary; the student themselves or the instructor may read it
pub async fn student_summary(
    State(state): State<AppState>,
    user: AuthUser,
    Path((session_id, user_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    if user.id != user_id {
        require_owner(&user, &session)?;
    }

    let record = state.db.get_attendance(&session.id, &user_id).await?;
    Ok(Json(json!({
        "session_id": session.id,
        "user_id": user_id,
        "status": record.as_ref().map(|r| r.status.clone()).unwrap_or_else(|| "absent".to_string()),
        "checked_at": record.and_then(|r| r.checked_at).map(|t| t.to_rfc3339()),
    })))
}

pub async fn export_csv(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_owner(&user, &session)?;

    let enrollments = state.db.list_enrollments(&session.id).await?;
    let mut lines = vec!["username,email,status,checked_at".to_string()];
    for enrollment in enrollments {
        let Some(student) = state.db.get_user_by_id(&enrollment.user_id).await? else {
            continue;
        };
        let record = state.db.get_attendance(&session.id, &student.id).await?;
        let (status, checked_at) = match record {
            Some(r) => (
                r.status,
                r.checked_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            ),
            None => ("absent".to_string(), String::new()),
        };
        lines.push(
            [
                csv_field(&student.username),
                csv_field(&student.email),
                status,
                checked_at,
            ]
            .join(","),
        );
    }

    let body = lines.join("\n");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"attendance-{}.csv\"", session.id),
            ),
        ],
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_no_window_is_always_present() {
        assert_eq!(
            classify_self_check(base(), None, None, false, None).unwrap(),
            "present"
        );
    }

    #[test]
    fn test_on_time_inside_window() {
        let start = base();
        let end = base() + Duration::minutes(10);
        assert_eq!(
            classify_self_check(base() + Duration::minutes(5), Some(start), Some(end), false, None)
                .unwrap(),
            "present"
        );
    }

    #[test]
    fn test_before_window_rejected() {
        let start = base();
        let end = base() + Duration::minutes(10);
        assert!(classify_self_check(
            base() - Duration::minutes(1),
            Some(start),
            Some(end),
            false,
            None
        )
        .is_err());
    }

    #[test]
    fn test_late_within_grace_period() {
        let start = base();
        let end = base() + Duration::minutes(10);
        let late_end = base() + Duration::minutes(30);
        assert_eq!(
            classify_self_check(
                base() + Duration::minutes(20),
                Some(start),
                Some(end),
                true,
                Some(late_end)
            )
            .unwrap(),
            "late"
        );
    }

    #[test]
    fn test_after_grace_period_rejected() {
        let start = base();
        let end = base() + Duration::minutes(10);
        let late_end = base() + Duration::minutes(30);
        assert!(classify_self_check(
            base() + Duration::minutes(31),
            Some(start),
            Some(end),
            true,
            Some(late_end)
        )
        .is_err());
    }

    #[test]
    fn test_late_not_allowed_rejected_after_end() {
        let start = base();
        let end = base() + Duration::minutes(10);
        assert!(classify_self_check(
            base() + Duration::minutes(11),
            Some(start),
            Some(end),
            false,
            None
        )
        .is_err());
    }
}
