use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthUser;
use crate::db::Session;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

mod assignments;
mod attendance;
mod auth;
mod checkpoints;
mod forum;
mod health;
mod notifications;
mod progress;
mod quizzes;
mod sessions;
mod slides;
mod subjects;
mod ws;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Uploads (assignments, decks) can far exceed the axum default body cap;
    // per-kind limits are enforced again inside the handlers.
    let body_limit = state.config.storage.max_upload_bytes as usize;

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth routes
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        // Subjects
        .route("/subjects", get(subjects::list).post(subjects::create))
        .route(
            "/subjects/:subject_id",
            get(subjects::view)
                .put(subjects::update)
                .delete(subjects::remove),
        )
        .route(
            "/subjects/:subject_id/regenerate-code",
            post(subjects::regenerate_code),
        )
        .route("/subjects/:subject_id/sessions", get(subjects::sessions))
        // Sessions
        .route("/sessions", get(sessions::list).post(sessions::create))
        .route("/sessions/enroll", post(sessions::enroll_by_code))
        .route(
            "/sessions/:session_id",
            get(sessions::view)
                .put(sessions::update)
                .delete(sessions::remove),
        )
        .route("/sessions/:session_id/live/start", post(sessions::start_live))
        .route("/sessions/:session_id/live/end", post(sessions::end_live))
        .route("/sessions/:session_id/chat", get(sessions::chat_history))
        // Checkpoints
        .route(
            "/sessions/:session_id/checkpoints",
            get(checkpoints::list).post(checkpoints::create),
        )
        .route(
            "/checkpoints/:checkpoint_id",
            put(checkpoints::update).delete(checkpoints::remove),
        )
        // Progress timer APIs
        .route("/progress/:checkpoint_id", get(progress::status))
        .route("/progress/:checkpoint_id/start", post(progress::start))
        .route("/progress/:checkpoint_id/pause", post(progress::pause))
        .route("/progress/:checkpoint_id/resume", post(progress::resume))
        .route("/progress/:checkpoint_id/stop", post(progress::stop))
        .route("/progress/:checkpoint_id/reset", post(progress::reset))
        .route("/progress/:checkpoint_id/complete", post(progress::complete))
        .route(
            "/progress/:checkpoint_id/uncomplete",
            post(progress::uncomplete),
        )
        .route(
            "/progress/session/:session_id",
            get(progress::session_matrix),
        )
        .route(
            "/progress/session/:session_id/export.csv",
            get(progress::export_csv),
        )
        // Attendance
        .route(
            "/sessions/:session_id/attendance",
            get(attendance::list).post(attendance::mark),
        )
        .route(
            "/sessions/:session_id/attendance/self-check",
            post(attendance::self_check),
        )
        .route(
            "/sessions/:session_id/attendance/bulk",
            post(attendance::bulk_mark),
        )
        .route(
            "/sessions/:session_id/attendance/export.csv",
            get(attendance::export_csv),
        )
        .route(
            "/sessions/:session_id/attendance/student/:user_id",
            get(attendance::student_summary),
        )
        // Slide decks
        .route("/slides/upload/:session_id", post(slides::upload))
        .route("/slides/session/:session_id", get(slides::list_decks))
        .route("/slides/deck/:deck_id", get(slides::deck_status).delete(slides::remove))
        .route("/slides/deck/:deck_id/image/:slide_index", get(slides::image))
        .route(
            "/slides/deck/:deck_id/bookmarks",
            get(slides::bookmarks).post(slides::save_bookmark_memo),
        )
        .route(
            "/slides/deck/:deck_id/generate-checkpoints",
            post(slides::generate_checkpoints),
        )
        .route(
            "/slides/deck/:deck_id/save-checkpoints",
            post(slides::save_checkpoints),
        )
        // Assignments
        .route(
            "/sessions/:session_id/assignment",
            get(assignments::view).post(assignments::submit),
        )
        .route(
            "/sessions/:session_id/assignment/grade",
            post(assignments::grade),
        )
        .route(
            "/sessions/:session_id/assignment/file/:user_id",
            get(assignments::download),
        )
        // Quizzes
        .route(
            "/sessions/:session_id/quiz/questions",
            get(quizzes::list_questions).post(quizzes::add_question),
        )
        .route(
            "/sessions/:session_id/quiz/questions/:question_id",
            delete(quizzes::remove_question),
        )
        .route(
            "/sessions/:session_id/quiz/attempts",
            get(quizzes::list_attempts).post(quizzes::submit_attempt),
        )
        // Forum
        .route(
            "/sessions/:session_id/forum",
            get(forum::list_posts).post(forum::create_post),
        )
        .route("/forum/posts/:post_id", get(forum::view_post))
        .route("/forum/posts/:post_id/comments", post(forum::add_comment))
        .route("/forum/posts/:post_id/resolve", post(forum::resolve_post))
        .route(
            "/forum/posts/:post_id/comments/:comment_id/accept",
            post(forum::accept_comment),
        )
        // Notifications
        .route("/notifications", get(notifications::list))
        .route(
            "/notifications/:notification_id/read",
            post(notifications::mark_read),
        )
        // Real-time surface
        .route("/ws", get(ws::ws_handler))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// Access-check helpers shared by the handlers

pub(crate) async fn load_session(state: &AppState, session_id: &str) -> AppResult<Session> {
    state
        .db
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}

/// Owner-or-admin gate for mutating operations
pub(crate) fn require_owner(user: &AuthUser, session: &Session) -> AppResult<()> {
    if user.owns(&session.instructor_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the owning instructor may do this".to_string(),
        ))
    }
}

/// Members are the owning instructor and enrolled students
pub(crate) async fn require_member(
    state: &AppState,
    user: &AuthUser,
    session: &Session,
) -> AppResult<()> {
    if user.owns(&session.instructor_id) {
        return Ok(());
    }
    if state.db.is_enrolled(&session.id, &user.id).await? {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "Not enrolled in this session".to_string(),
    ))
}
