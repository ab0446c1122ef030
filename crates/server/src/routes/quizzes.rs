use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::SessionType;
use std::collections::HashMap;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{QuizAttempt, QuizQuestion, Session};
use crate::error::AppError;
use crate::routes::{load_session, require_member, require_owner};
use crate::state::AppState;

fn require_quiz(session: &Session) -> Result<(), AppError> {
    if session.session_type != SessionType::Quiz.as_str() {
        return Err(AppError::Validation("Not a quiz session".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question_text: String,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    #[serde(default = "default_points")]
    pub points: i64,
}

fn default_points() -> i64 {
    1
}

pub async fn list_questions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_quiz(&session)?;
    require_member(&state, &user, &session).await?;
    let is_owner = user.owns(&session.instructor_id);

    let questions = state.db.list_quiz_questions(&session.id).await?;
    let questions: Vec<Value> = questions
        .into_iter()
        .map(|q| {
            let options: Value = q
                .options
                .as_deref()
                .and_then(|o| serde_json::from_str(o).ok())
                .unwrap_or(Value::Null);
            let mut entry = json!({
                "id": q.id,
                "question_text": q.question_text,
                "options": options,
                "points": q.points,
                "seq": q.seq,
            });
            // students never see the answer key
            if is_owner {
                entry["correct_answer"] = Value::String(q.correct_answer);
            }
            entry
        })
        .collect();

    Ok(Json(json!({
        "session_id": session.id,
        "time_limit_minutes": session.quiz_time_limit_minutes,
        "questions": questions,
    })))
}

pub async fn add_question(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
    Json(req): Json<QuestionRequest>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_quiz(&session)?;
    require_owner(&user, &session)?;
    if req.question_text.trim().is_empty() || req.correct_answer.trim().is_empty() {
        return Err(AppError::Validation(
            "Question text and correct answer are required".to_string(),
        ));
    }

    let existing = state.db.list_quiz_questions(&session.id).await?;
    let seq = existing.iter().map(|q| q.seq).max().unwrap_or(0) + 1;

    let question = QuizQuestion {
        id: Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        question_text: req.question_text.trim().to_string(),
        options: req
            .options
            .map(|o| serde_json::to_string(&o))
            .transpose()
            .map_err(|e| AppError::Internal(e.to_string()))?,
        correct_answer: req.correct_answer.trim().to_string(),
        points: req.points.max(1),
        seq,
        created_at: None,
    };
    state.db.insert_quiz_question(&question).await?;

    Ok(Json(json!({ "success": true, "question_id": question.id })))
}

pub async fn remove_question(
    State(state): State<AppState>,
    user: AuthUser,
    Path((session_id, question_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_quiz(&session)?;
    require_owner(&user, &session)?;

    state.db.delete_quiz_question(&question_id).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct AttemptRequest {
    /// question id -> given answer
    pub answers: HashMap<String, String>,
}

/// Answers are compared case-insensitively after trimming; each correct
/// answer earns the question's points.
fn score_attempt(questions: &[QuizQuestion], answers: &HashMap<String, String>) -> (i64, i64) {
    let mut score = 0;
    let mut max_score = 0;
    for question in questions {
        max_score += question.points;
        if let Some(given) = answers.get(&question.id) {
            if given.trim().eq_ignore_ascii_case(question.correct_answer.trim()) {
                score += question.points;
            }
        }
    }
    (score, max_score)
}

pub async fn submit_attempt(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
    Json(req): Json<AttemptRequest>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_quiz(&session)?;
    require_member(&state, &user, &session).await?;
    if user.owns(&session.instructor_id) {
        return Err(AppError::Forbidden(
            "Instructors do not take their own quiz".to_string(),
        ));
    }

    let questions = state.db.list_quiz_questions(&session.id).await?;
    if questions.is_empty() {
        return Err(AppError::Conflict("Quiz has no questions yet".to_string()));
    }
    let (score, max_score) = score_attempt(&questions, &req.answers);

    let attempt = QuizAttempt {
        id: Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        user_id: user.id.clone(),
        score,
        max_score,
        answers: Some(
            serde_json::to_string(&req.answers).map_err(|e| AppError::Internal(e.to_string()))?,
        ),
        started_at: Some(Utc::now()),
        completed_at: Some(Utc::now()),
    };
    state.db.insert_quiz_attempt(&attempt).await?;

    Ok(Json(json!({
        "success": true,
        "score": score,
        "max_score": max_score,
    })))
}

pub async fn list_attempts(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_quiz(&session)?;

    if user.owns(&session.instructor_id) {
        let attempts = state.db.list_quiz_attempts(&session.id).await?;
        let attempts: Vec<Value> = attempts
            .into_iter()
            .map(|a| {
                json!({
                    "user_id": a.user_id,
                    "score": a.score,
                    "max_score": a.max_score,
                    "completed_at": a.completed_at.map(|t| t.to_rfc3339()),
                })
            })
            .collect();
        return Ok(Json(json!({ "session_id": session.id, "attempts": attempts })));
    }

    require_member(&state, &user, &session).await?;
    let attempt = state.db.get_quiz_attempt(&session.id, &user.id).await?;
    Ok(Json(json!({
        "session_id": session.id,
        "attempt": attempt.map(|a| json!({
            "score": a.score,
            "max_score": a.max_score,
            "completed_at": a.completed_at.map(|t| t.to_rfc3339()),
        })),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, answer: &str, points: i64) -> QuizQuestion {
        QuizQuestion {
            id: id.to_string(),
            session_id: "sess-1".to_string(),
            question_text: "?".to_string(),
            options: None,
            correct_answer: answer.to_string(),
            points,
            seq: 0,
            created_at: None,
        }
    }

    #[test]
    fn test_score_attempt_counts_correct_answers() {
        let questions = vec![
            question("q1", "4", 2),
            question("q2", "Paris", 3),
            question("q3", "true", 1),
        ];
        let mut answers = HashMap::new();
        answers.insert("q1".to_string(), "4".to_string());
        answers.insert("q2".to_string(), " paris ".to_string());
        answers.insert("q3".to_string(), "false".to_string());

        let (score, max) = score_attempt(&questions, &answers);
        assert_eq!(score, 5);
        assert_eq!(max, 6);
    }

    #[test]
    fn test_score_attempt_missing_answers() {
        let questions = vec![question("q1", "a", 1), question("q2", "b", 1)];
        let (score, max) = score_attempt(&questions, &HashMap::new());
        assert_eq!(score, 0);
        assert_eq!(max, 2);
    }
}
