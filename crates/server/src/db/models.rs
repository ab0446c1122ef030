use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::timer::TimerState;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Subject {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub instructor_id: String,
    pub invite_code: String,
    pub is_visible: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// One unit of learning content; a live-typed session also carries the
/// live lifecycle and the attendance window.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: String,
    pub subject_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub session_type: String,
    pub instructor_id: String,
    pub invite_code: String,
    pub week_number: Option<i64>,
    pub live_status: Option<String>,
    pub current_checkpoint_id: Option<String>,
    pub attendance_start: Option<DateTime<Utc>>,
    pub attendance_end: Option<DateTime<Utc>>,
    pub late_allowed: bool,
    pub late_end: Option<DateTime<Utc>>,
    pub assignment_due_date: Option<DateTime<Utc>>,
    pub quiz_time_limit_minutes: Option<i64>,
    pub video_url: Option<String>,
    pub material_file: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Enrollment {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub enrolled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Checkpoint {
    pub id: String,
    pub session_id: String,
    pub title: String,
    pub description: Option<String>,
    pub seq: i64,
    pub estimated_minutes: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Historical record; never deleted. The timing fields are a stored
/// [`TimerState`] snapshot.
#[derive(Debug, Clone, FromRow)]
pub struct Progress {
    pub id: String,
    pub user_id: String,
    pub checkpoint_id: String,
    pub mode: String,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub accumulated_seconds: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

impl Progress {
    pub fn timer(&self) -> TimerState {
        TimerState {
            running_since: self.started_at,
            paused_at: self.paused_at,
            is_paused: self.is_paused,
            accumulated_seconds: self.accumulated_seconds,
            completed_at: self.completed_at,
            duration_seconds: self.duration_seconds,
        }
    }

    pub fn apply_timer(&mut self, timer: &TimerState) {
        self.started_at = timer.running_since;
        self.paused_at = timer.paused_at;
        self.is_paused = timer.is_paused;
        self.accumulated_seconds = timer.accumulated_seconds;
        self.completed_at = timer.completed_at;
        self.duration_seconds = timer.duration_seconds;
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Attendance {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub status: String,
    pub checked_at: Option<DateTime<Utc>>,
    pub checked_by: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SlideDeck {
    pub id: String,
    pub session_id: String,
    pub file_name: String,
    pub conversion_status: String,
    pub conversion_error: Option<String>,
    pub slide_count: i64,
    pub current_slide_index: i64,
    pub flag_threshold_count: i64,
    pub flag_threshold_rate: f64,
    pub estimated_minutes: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SlideReaction {
    pub id: String,
    pub deck_id: String,
    pub user_id: String,
    pub slide_index: i64,
    pub reaction: String,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SlideBookmark {
    pub id: String,
    pub deck_id: String,
    pub slide_index: i64,
    pub is_auto: bool,
    pub is_manual: bool,
    pub reason: Option<String>,
    pub memo: Option<String>,
    pub supplement_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub text: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub body: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct QuizQuestion {
    pub id: String,
    pub session_id: String,
    pub question_text: String,
    /// JSON array of answer options
    pub options: Option<String>,
    pub correct_answer: String,
    pub points: i64,
    pub seq: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct QuizAttempt {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub score: i64,
    pub max_score: i64,
    /// JSON object of question id -> given answer
    pub answers: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AssignmentSubmission {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub content: Option<String>,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub score: Option<i64>,
    pub feedback: Option<String>,
    pub graded_at: Option<DateTime<Utc>>,
    pub graded_by: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ForumPost {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub is_resolved: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ForumComment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub content: String,
    pub is_accepted: bool,
    pub created_at: Option<DateTime<Utc>>,
}
