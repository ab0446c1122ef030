use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::Rng;
use shared::ReactionCounts;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

mod models;

pub use models::*;

/// Invite codes are short uppercase alphanumerics, as handed out to students
pub fn new_invite_code() -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(path: &str) -> Result<Self> {
        // Ensure the directory exists
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'student',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS subjects (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                instructor_id TEXT NOT NULL REFERENCES users(id),
                invite_code TEXT UNIQUE NOT NULL,
                is_visible BOOLEAN NOT NULL DEFAULT 1,
                deleted_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                subject_id TEXT REFERENCES subjects(id),
                title TEXT NOT NULL,
                description TEXT,
                session_type TEXT NOT NULL DEFAULT 'live',
                instructor_id TEXT NOT NULL REFERENCES users(id),
                invite_code TEXT UNIQUE NOT NULL,
                week_number INTEGER,
                live_status TEXT,
                current_checkpoint_id TEXT,
                attendance_start DATETIME,
                attendance_end DATETIME,
                late_allowed BOOLEAN NOT NULL DEFAULT 0,
                late_end DATETIME,
                assignment_due_date DATETIME,
                quiz_time_limit_minutes INTEGER,
                video_url TEXT,
                material_file TEXT,
                deleted_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS enrollments (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                user_id TEXT NOT NULL REFERENCES users(id),
                enrolled_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(session_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                title TEXT NOT NULL,
                description TEXT,
                seq INTEGER NOT NULL DEFAULT 0,
                estimated_minutes INTEGER,
                deleted_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS progress (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                checkpoint_id TEXT NOT NULL REFERENCES checkpoints(id),
                mode TEXT NOT NULL DEFAULT 'self_paced',
                started_at DATETIME,
                paused_at DATETIME,
                is_paused BOOLEAN NOT NULL DEFAULT 0,
                accumulated_seconds INTEGER NOT NULL DEFAULT 0,
                completed_at DATETIME,
                duration_seconds INTEGER,
                UNIQUE(user_id, checkpoint_id, mode)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS attendance (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                user_id TEXT NOT NULL REFERENCES users(id),
                status TEXT NOT NULL DEFAULT 'present',
                checked_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                checked_by TEXT REFERENCES users(id),
                notes TEXT,
                UNIQUE(session_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS slide_decks (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                file_name TEXT NOT NULL,
                conversion_status TEXT NOT NULL DEFAULT 'pending',
                conversion_error TEXT,
                slide_count INTEGER NOT NULL DEFAULT 0,
                current_slide_index INTEGER NOT NULL DEFAULT 0,
                flag_threshold_count INTEGER NOT NULL DEFAULT 3,
                flag_threshold_rate REAL NOT NULL DEFAULT 0.5,
                estimated_minutes INTEGER,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS slide_reactions (
                id TEXT PRIMARY KEY,
                deck_id TEXT NOT NULL REFERENCES slide_decks(id),
                user_id TEXT NOT NULL REFERENCES users(id),
                slide_index INTEGER NOT NULL,
                reaction TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(deck_id, user_id, slide_index)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS slide_bookmarks (
                id TEXT PRIMARY KEY,
                deck_id TEXT NOT NULL REFERENCES slide_decks(id),
                slide_index INTEGER NOT NULL,
                is_auto BOOLEAN NOT NULL DEFAULT 0,
                is_manual BOOLEAN NOT NULL DEFAULT 0,
                reason TEXT,
                memo TEXT,
                supplement_url TEXT,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(deck_id, slide_index)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                user_id TEXT NOT NULL REFERENCES users(id),
                username TEXT NOT NULL,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                deleted_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                kind TEXT NOT NULL,
                body TEXT NOT NULL,
                link TEXT,
                is_read BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS quiz_questions (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                question_text TEXT NOT NULL,
                options TEXT,
                correct_answer TEXT NOT NULL,
                points INTEGER NOT NULL DEFAULT 1,
                seq INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS quiz_attempts (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                user_id TEXT NOT NULL REFERENCES users(id),
                score INTEGER NOT NULL DEFAULT 0,
                max_score INTEGER NOT NULL DEFAULT 0,
                answers TEXT,
                started_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                completed_at DATETIME
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS assignment_submissions (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                user_id TEXT NOT NULL REFERENCES users(id),
                content TEXT,
                file_path TEXT,
                file_name TEXT,
                submitted_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                score INTEGER,
                feedback TEXT,
                graded_at DATETIME,
                graded_by TEXT REFERENCES users(id),
                UNIQUE(session_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS forum_posts (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                user_id TEXT NOT NULL REFERENCES users(id),
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                is_resolved BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS forum_comments (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL REFERENCES forum_posts(id),
                user_id TEXT NOT NULL REFERENCES users(id),
                content TEXT NOT NULL,
                is_accepted BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS understanding_marks (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                checkpoint_id TEXT NOT NULL REFERENCES checkpoints(id),
                user_id TEXT NOT NULL REFERENCES users(id),
                status TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(session_id, checkpoint_id, user_id)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::info!("Database migrations completed");
        Ok(())
    }

    // User operations

    pub async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    // Subject operations
    //
    // Soft-deleted rows stay in the table; every read filters on
    // `deleted_at IS NULL` explicitly.

    pub async fn create_subject(&self, subject: &Subject) -> Result<()> {
        sqlx::query(
            "INSERT INTO subjects (id, title, description, instructor_id, invite_code, is_visible)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&subject.id)
        .bind(&subject.title)
        .bind(&subject.description)
        .bind(&subject.instructor_id)
        .bind(&subject.invite_code)
        .bind(subject.is_visible)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_subject(&self, id: &str) -> Result<Option<Subject>> {
        let subject = sqlx::query_as::<_, Subject>(
            "SELECT * FROM subjects WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subject)
    }

    pub async fn list_subjects_for_instructor(&self, instructor_id: &str) -> Result<Vec<Subject>> {
        let subjects = sqlx::query_as::<_, Subject>(
            "SELECT * FROM subjects WHERE instructor_id = ? AND deleted_at IS NULL
             ORDER BY created_at DESC",
        )
        .bind(instructor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subjects)
    }

    pub async fn list_visible_subjects(&self) -> Result<Vec<Subject>> {
        let subjects = sqlx::query_as::<_, Subject>(
            "SELECT * FROM subjects WHERE is_visible = 1 AND deleted_at IS NULL
             ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(subjects)
    }

    pub async fn update_subject(
        &self,
        id: &str,
        title: &str,
        description: Option<&str>,
        is_visible: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE subjects SET title = ?, description = ?, is_visible = ?
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(title)
        .bind(description)
        .bind(is_visible)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn soft_delete_subject(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE subjects SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_subject_invite_code(&self, id: &str, code: &str) -> Result<()> {
        sqlx::query("UPDATE subjects SET invite_code = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(code)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // Session operations

    pub async fn create_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, subject_id, title, description, session_type,
                instructor_id, invite_code, week_number, live_status,
                attendance_start, attendance_end, late_allowed, late_end,
                assignment_due_date, quiz_time_limit_minutes, video_url, material_file)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.subject_id)
        .bind(&session.title)
        .bind(&session.description)
        .bind(&session.session_type)
        .bind(&session.instructor_id)
        .bind(&session.invite_code)
        .bind(session.week_number)
        .bind(&session.live_status)
        .bind(session.attendance_start)
        .bind(session.attendance_end)
        .bind(session.late_allowed)
        .bind(session.late_end)
        .bind(session.assignment_due_date)
        .bind(session.quiz_time_limit_minutes)
        .bind(&session.video_url)
        .bind(&session.material_file)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    pub async fn get_session_by_invite_code(&self, code: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE invite_code = ? AND deleted_at IS NULL",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    pub async fn list_sessions_by_subject(&self, subject_id: &str) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE subject_id = ? AND deleted_at IS NULL
             ORDER BY week_number, created_at",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    pub async fn list_sessions_for_instructor(&self, instructor_id: &str) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE instructor_id = ? AND deleted_at IS NULL
             ORDER BY created_at DESC",
        )
        .bind(instructor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    pub async fn list_sessions_for_student(&self, user_id: &str) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT s.* FROM sessions s
             JOIN enrollments e ON e.session_id = s.id
             WHERE e.user_id = ? AND s.deleted_at IS NULL
             ORDER BY s.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    pub async fn update_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET title = ?, description = ?, week_number = ?,
                attendance_start = ?, attendance_end = ?, late_allowed = ?, late_end = ?,
                assignment_due_date = ?, quiz_time_limit_minutes = ?, video_url = ?,
                material_file = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&session.title)
        .bind(&session.description)
        .bind(session.week_number)
        .bind(session.attendance_start)
        .bind(session.attendance_end)
        .bind(session.late_allowed)
        .bind(session.late_end)
        .bind(session.assignment_due_date)
        .bind(session.quiz_time_limit_minutes)
        .bind(&session.video_url)
        .bind(&session.material_file)
        .bind(&session.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn soft_delete_session(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE sessions SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_live_status(&self, id: &str, status: &str) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET live_status = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_current_checkpoint(
        &self,
        session_id: &str,
        checkpoint_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET current_checkpoint_id = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(checkpoint_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // Enrollment operations

    pub async fn enroll(&self, session_id: &str, user_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO enrollments (id, session_id, user_id) VALUES (?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(session_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_enrolled(&self, session_id: &str, user_id: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM enrollments WHERE session_id = ? AND user_id = ?")
                .bind(session_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    pub async fn list_enrollments(&self, session_id: &str) -> Result<Vec<Enrollment>> {
        let enrollments = sqlx::query_as::<_, Enrollment>(
            "SELECT * FROM enrollments WHERE session_id = ? ORDER BY enrolled_at",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(enrollments)
    }

    pub async fn count_enrolled(&self, session_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM enrollments WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // Checkpoint operations

    pub async fn create_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        sqlx::query(
            "INSERT INTO checkpoints (id, session_id, title, description, seq, estimated_minutes)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&checkpoint.id)
        .bind(&checkpoint.session_id)
        .bind(&checkpoint.title)
        .bind(&checkpoint.description)
        .bind(checkpoint.seq)
        .bind(checkpoint.estimated_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>> {
        let checkpoint = sqlx::query_as::<_, Checkpoint>(
            "SELECT * FROM checkpoints WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(checkpoint)
    }

    pub async fn list_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>> {
        let checkpoints = sqlx::query_as::<_, Checkpoint>(
            "SELECT * FROM checkpoints WHERE session_id = ? AND deleted_at IS NULL ORDER BY seq",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(checkpoints)
    }

    pub async fn update_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        sqlx::query(
            "UPDATE checkpoints SET title = ?, description = ?, seq = ?, estimated_minutes = ?
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&checkpoint.title)
        .bind(&checkpoint.description)
        .bind(checkpoint.seq)
        .bind(checkpoint.estimated_minutes)
        .bind(&checkpoint.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn soft_delete_checkpoint(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE checkpoints SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn max_checkpoint_seq(&self, session_id: &str) -> Result<i64> {
        let (max,): (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(seq) FROM checkpoints WHERE session_id = ? AND deleted_at IS NULL",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(max.unwrap_or(0))
    }

    // Progress operations
    //
    // Rows are created lazily and never deleted. Loads go through
    // `load_progress_swept`, which applies the lazy auto-stop before the
    // caller sees the row.

    pub async fn get_progress(
        &self,
        user_id: &str,
        checkpoint_id: &str,
        mode: &str,
    ) -> Result<Option<Progress>> {
        let progress = sqlx::query_as::<_, Progress>(
            "SELECT * FROM progress WHERE user_id = ? AND checkpoint_id = ? AND mode = ?",
        )
        .bind(user_id)
        .bind(checkpoint_id)
        .bind(mode)
        .fetch_optional(&self.pool)
        .await?;
        Ok(progress)
    }

    /// Fetch a progress row with the auto-stop sweep applied (and persisted)
    /// before it is returned.
    pub async fn load_progress_swept(
        &self,
        user_id: &str,
        checkpoint_id: &str,
        mode: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Progress>> {
        let Some(mut progress) = self.get_progress(user_id, checkpoint_id, mode).await? else {
            return Ok(None);
        };
        let mut timer = progress.timer();
        if timer.sweep(now) {
            progress.apply_timer(&timer);
            self.save_progress(&progress).await?;
        }
        Ok(Some(progress))
    }

    pub async fn insert_progress(&self, progress: &Progress) -> Result<()> {
        sqlx::query(
            "INSERT INTO progress (id, user_id, checkpoint_id, mode, started_at, paused_at,
                is_paused, accumulated_seconds, completed_at, duration_seconds)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&progress.id)
        .bind(&progress.user_id)
        .bind(&progress.checkpoint_id)
        .bind(&progress.mode)
        .bind(progress.started_at)
        .bind(progress.paused_at)
        .bind(progress.is_paused)
        .bind(progress.accumulated_seconds)
        .bind(progress.completed_at)
        .bind(progress.duration_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_progress(&self, progress: &Progress) -> Result<()> {
        sqlx::query(
            "UPDATE progress SET started_at = ?, paused_at = ?, is_paused = ?,
                accumulated_seconds = ?, completed_at = ?, duration_seconds = ?
             WHERE id = ?",
        )
        .bind(progress.started_at)
        .bind(progress.paused_at)
        .bind(progress.is_paused)
        .bind(progress.accumulated_seconds)
        .bind(progress.completed_at)
        .bind(progress.duration_seconds)
        .bind(&progress.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_progress_for_user(&self, user_id: &str) -> Result<Vec<Progress>> {
        let records = sqlx::query_as::<_, Progress>("SELECT * FROM progress WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// All progress rows attached to a session's checkpoints
    pub async fn list_progress_for_session(&self, session_id: &str) -> Result<Vec<Progress>> {
        let records = sqlx::query_as::<_, Progress>(
            "SELECT p.* FROM progress p
             JOIN checkpoints c ON c.id = p.checkpoint_id
             WHERE c.session_id = ? AND c.deleted_at IS NULL",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Open (uncompleted, running or paused) rows for a session, collected
    /// when a live session ends so they can be force-stopped.
    pub async fn list_open_progress_for_session(&self, session_id: &str) -> Result<Vec<Progress>> {
        let records = sqlx::query_as::<_, Progress>(
            "SELECT p.* FROM progress p
             JOIN checkpoints c ON c.id = p.checkpoint_id
             WHERE c.session_id = ? AND c.deleted_at IS NULL
               AND p.completed_at IS NULL
               AND (p.started_at IS NOT NULL OR p.is_paused = 1)",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn count_completed(
        &self,
        checkpoint_ids: &[String],
        mode: &str,
    ) -> Result<HashMap<String, i64>> {
        let mut counts = HashMap::new();
        for checkpoint_id in checkpoint_ids {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM progress
                 WHERE checkpoint_id = ? AND mode = ? AND completed_at IS NOT NULL",
            )
            .bind(checkpoint_id)
            .bind(mode)
            .fetch_one(&self.pool)
            .await?;
            counts.insert(checkpoint_id.clone(), count);
        }
        Ok(counts)
    }

    // Attendance operations

    pub async fn upsert_attendance(&self, attendance: &Attendance) -> Result<()> {
        sqlx::query(
            "INSERT INTO attendance (id, session_id, user_id, status, checked_at, checked_by, notes)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id, user_id) DO UPDATE SET
                status = excluded.status,
                checked_at = excluded.checked_at,
                checked_by = excluded.checked_by,
                notes = excluded.notes",
        )
        .bind(&attendance.id)
        .bind(&attendance.session_id)
        .bind(&attendance.user_id)
        .bind(&attendance.status)
        .bind(attendance.checked_at)
        .bind(&attendance.checked_by)
        .bind(&attendance.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_attendance(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<Attendance>> {
        let attendance = sqlx::query_as::<_, Attendance>(
            "SELECT * FROM attendance WHERE session_id = ? AND user_id = ?",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attendance)
    }

    pub async fn list_attendance(&self, session_id: &str) -> Result<Vec<Attendance>> {
        let records = sqlx::query_as::<_, Attendance>(
            "SELECT * FROM attendance WHERE session_id = ? ORDER BY checked_at",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    // Slide deck operations

    pub async fn create_slide_deck(&self, deck: &SlideDeck) -> Result<()> {
        sqlx::query(
            "INSERT INTO slide_decks (id, session_id, file_name, conversion_status,
                slide_count, current_slide_index, flag_threshold_count, flag_threshold_rate,
                estimated_minutes)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&deck.id)
        .bind(&deck.session_id)
        .bind(&deck.file_name)
        .bind(&deck.conversion_status)
        .bind(deck.slide_count)
        .bind(deck.current_slide_index)
        .bind(deck.flag_threshold_count)
        .bind(deck.flag_threshold_rate)
        .bind(deck.estimated_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_slide_deck(&self, id: &str) -> Result<Option<SlideDeck>> {
        let deck = sqlx::query_as::<_, SlideDeck>("SELECT * FROM slide_decks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(deck)
    }

    pub async fn list_slide_decks(&self, session_id: &str) -> Result<Vec<SlideDeck>> {
        let decks = sqlx::query_as::<_, SlideDeck>(
            "SELECT * FROM slide_decks WHERE session_id = ? ORDER BY created_at DESC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(decks)
    }

    pub async fn set_deck_status(&self, id: &str, status: &str, error: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE slide_decks SET conversion_status = ?, conversion_error = ? WHERE id = ?",
        )
        .bind(status)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_deck_ready(&self, id: &str, slide_count: i64) -> Result<()> {
        sqlx::query(
            "UPDATE slide_decks SET conversion_status = 'ready', conversion_error = NULL,
                slide_count = ? WHERE id = ?",
        )
        .bind(slide_count)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_current_slide_index(&self, id: &str, slide_index: i64) -> Result<()> {
        sqlx::query("UPDATE slide_decks SET current_slide_index = ? WHERE id = ?")
            .bind(slide_index)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_slide_deck(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM slide_reactions WHERE deck_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM slide_bookmarks WHERE deck_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM slide_decks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // Slide reaction operations
    //
    // Latest value wins per (deck, student, slide).

    pub async fn upsert_reaction(
        &self,
        deck_id: &str,
        user_id: &str,
        slide_index: i64,
        reaction: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO slide_reactions (id, deck_id, user_id, slide_index, reaction, updated_at)
             VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(deck_id, user_id, slide_index) DO UPDATE SET
                reaction = excluded.reaction,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(deck_id)
        .bind(user_id)
        .bind(slide_index)
        .bind(reaction)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_reaction(
        &self,
        deck_id: &str,
        user_id: &str,
        slide_index: i64,
    ) -> Result<()> {
        sqlx::query(
            "DELETE FROM slide_reactions WHERE deck_id = ? AND user_id = ? AND slide_index = ?",
        )
        .bind(deck_id)
        .bind(user_id)
        .bind(slide_index)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_reactions(&self, deck_id: &str, slide_index: i64) -> Result<ReactionCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT reaction, COUNT(*) FROM slide_reactions
             WHERE deck_id = ? AND slide_index = ? GROUP BY reaction",
        )
        .bind(deck_id)
        .bind(slide_index)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = ReactionCounts::default();
        for (reaction, count) in rows {
            match reaction.as_str() {
                "understood" => counts.understood = count,
                "question" => counts.question = count,
                "hard" => counts.hard = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    pub async fn list_user_reactions(
        &self,
        deck_id: &str,
        user_id: &str,
    ) -> Result<Vec<SlideReaction>> {
        let reactions = sqlx::query_as::<_, SlideReaction>(
            "SELECT * FROM slide_reactions WHERE deck_id = ? AND user_id = ?",
        )
        .bind(deck_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reactions)
    }

    // Slide bookmark operations

    pub async fn get_bookmark(
        &self,
        deck_id: &str,
        slide_index: i64,
    ) -> Result<Option<SlideBookmark>> {
        let bookmark = sqlx::query_as::<_, SlideBookmark>(
            "SELECT * FROM slide_bookmarks WHERE deck_id = ? AND slide_index = ?",
        )
        .bind(deck_id)
        .bind(slide_index)
        .fetch_optional(&self.pool)
        .await?;
        Ok(bookmark)
    }

    pub async fn upsert_bookmark(&self, bookmark: &SlideBookmark) -> Result<()> {
        sqlx::query(
            "INSERT INTO slide_bookmarks (id, deck_id, slide_index, is_auto, is_manual,
                reason, memo, supplement_url, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(deck_id, slide_index) DO UPDATE SET
                is_auto = excluded.is_auto,
                is_manual = excluded.is_manual,
                reason = excluded.reason,
                memo = excluded.memo,
                supplement_url = excluded.supplement_url,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(&bookmark.id)
        .bind(&bookmark.deck_id)
        .bind(bookmark.slide_index)
        .bind(bookmark.is_auto)
        .bind(bookmark.is_manual)
        .bind(&bookmark.reason)
        .bind(&bookmark.memo)
        .bind(&bookmark.supplement_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_bookmark(&self, deck_id: &str, slide_index: i64) -> Result<()> {
        sqlx::query("DELETE FROM slide_bookmarks WHERE deck_id = ? AND slide_index = ?")
            .bind(deck_id)
            .bind(slide_index)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_bookmarks(&self, deck_id: &str) -> Result<Vec<SlideBookmark>> {
        let bookmarks = sqlx::query_as::<_, SlideBookmark>(
            "SELECT * FROM slide_bookmarks WHERE deck_id = ? ORDER BY slide_index",
        )
        .bind(deck_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookmarks)
    }

    // Chat operations

    pub async fn insert_chat_message(&self, message: &ChatMessage) -> Result<()> {
        sqlx::query(
            "INSERT INTO chat_messages (id, session_id, user_id, username, role, text)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(&message.user_id)
        .bind(&message.username)
        .bind(&message.role)
        .bind(&message.text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_chat_message(&self, id: &str) -> Result<Option<ChatMessage>> {
        let message = sqlx::query_as::<_, ChatMessage>(
            "SELECT * FROM chat_messages WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(message)
    }

    pub async fn update_chat_text(&self, id: &str, text: &str) -> Result<()> {
        sqlx::query("UPDATE chat_messages SET text = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(text)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn soft_delete_chat_message(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE chat_messages SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_chat_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT * FROM chat_messages WHERE session_id = ? AND deleted_at IS NULL
             ORDER BY created_at",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    // Understanding operations

    pub async fn set_understanding(
        &self,
        session_id: &str,
        checkpoint_id: &str,
        user_id: &str,
        status: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO understanding_marks (id, session_id, checkpoint_id, user_id, status)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(session_id, checkpoint_id, user_id) DO UPDATE SET
                status = excluded.status,
                created_at = CURRENT_TIMESTAMP",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(session_id)
        .bind(checkpoint_id)
        .bind(user_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_understanding(
        &self,
        session_id: &str,
        checkpoint_id: &str,
    ) -> Result<(i64, i64)> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM understanding_marks
             WHERE session_id = ? AND checkpoint_id = ? GROUP BY status",
        )
        .bind(session_id)
        .bind(checkpoint_id)
        .fetch_all(&self.pool)
        .await?;

        let mut understood = 0;
        let mut confused = 0;
        for (status, count) in rows {
            match status.as_str() {
                "understood" => understood = count,
                "confused" => confused = count,
                _ => {}
            }
        }
        Ok((understood, confused))
    }

    // Notification operations

    pub async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, body, link) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.body)
        .bind(&notification.link)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_notifications(&self, user_id: &str) -> Result<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at DESC LIMIT 100",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    pub async fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<()> {
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // Quiz operations

    pub async fn insert_quiz_question(&self, question: &QuizQuestion) -> Result<()> {
        sqlx::query(
            "INSERT INTO quiz_questions (id, session_id, question_text, options, correct_answer,
                points, seq)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&question.id)
        .bind(&question.session_id)
        .bind(&question.question_text)
        .bind(&question.options)
        .bind(&question.correct_answer)
        .bind(question.points)
        .bind(question.seq)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_quiz_questions(&self, session_id: &str) -> Result<Vec<QuizQuestion>> {
        let questions = sqlx::query_as::<_, QuizQuestion>(
            "SELECT * FROM quiz_questions WHERE session_id = ? ORDER BY seq",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    pub async fn delete_quiz_question(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM quiz_questions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<()> {
        sqlx::query(
            "INSERT INTO quiz_attempts (id, session_id, user_id, score, max_score, answers,
                started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&attempt.id)
        .bind(&attempt.session_id)
        .bind(&attempt.user_id)
        .bind(attempt.score)
        .bind(attempt.max_score)
        .bind(&attempt.answers)
        .bind(attempt.started_at)
        .bind(attempt.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_quiz_attempt(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<QuizAttempt>> {
        let attempt = sqlx::query_as::<_, QuizAttempt>(
            "SELECT * FROM quiz_attempts WHERE session_id = ? AND user_id = ?
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    pub async fn list_quiz_attempts(&self, session_id: &str) -> Result<Vec<QuizAttempt>> {
        let attempts = sqlx::query_as::<_, QuizAttempt>(
            "SELECT * FROM quiz_attempts WHERE session_id = ? ORDER BY started_at DESC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    // Assignment operations

    pub async fn upsert_submission(&self, submission: &AssignmentSubmission) -> Result<()> {
        sqlx::query(
            "INSERT INTO assignment_submissions (id, session_id, user_id, content, file_path,
                file_name, submitted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id, user_id) DO UPDATE SET
                content = excluded.content,
                file_path = excluded.file_path,
                file_name = excluded.file_name,
                submitted_at = excluded.submitted_at",
        )
        .bind(&submission.id)
        .bind(&submission.session_id)
        .bind(&submission.user_id)
        .bind(&submission.content)
        .bind(&submission.file_path)
        .bind(&submission.file_name)
        .bind(submission.submitted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_submission(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<AssignmentSubmission>> {
        let submission = sqlx::query_as::<_, AssignmentSubmission>(
            "SELECT * FROM assignment_submissions WHERE session_id = ? AND user_id = ?",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(submission)
    }

    pub async fn list_submissions(&self, session_id: &str) -> Result<Vec<AssignmentSubmission>> {
        let submissions = sqlx::query_as::<_, AssignmentSubmission>(
            "SELECT * FROM assignment_submissions WHERE session_id = ? ORDER BY submitted_at",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(submissions)
    }

    pub async fn grade_submission(
        &self,
        session_id: &str,
        user_id: &str,
        score: i64,
        feedback: Option<&str>,
        graded_by: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE assignment_submissions SET score = ?, feedback = ?, graded_at = ?, graded_by = ?
             WHERE session_id = ? AND user_id = ?",
        )
        .bind(score)
        .bind(feedback)
        .bind(now)
        .bind(graded_by)
        .bind(session_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // Forum operations

    pub async fn insert_forum_post(&self, post: &ForumPost) -> Result<()> {
        sqlx::query(
            "INSERT INTO forum_posts (id, session_id, user_id, title, content)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&post.id)
        .bind(&post.session_id)
        .bind(&post.user_id)
        .bind(&post.title)
        .bind(&post.content)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_forum_post(&self, id: &str) -> Result<Option<ForumPost>> {
        let post = sqlx::query_as::<_, ForumPost>("SELECT * FROM forum_posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    pub async fn list_forum_posts(&self, session_id: &str) -> Result<Vec<ForumPost>> {
        let posts = sqlx::query_as::<_, ForumPost>(
            "SELECT * FROM forum_posts WHERE session_id = ? ORDER BY created_at DESC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    pub async fn set_forum_post_resolved(&self, id: &str, resolved: bool) -> Result<()> {
        sqlx::query(
            "UPDATE forum_posts SET is_resolved = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(resolved)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_forum_comment(&self, comment: &ForumComment) -> Result<()> {
        sqlx::query(
            "INSERT INTO forum_comments (id, post_id, user_id, content) VALUES (?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(&comment.post_id)
        .bind(&comment.user_id)
        .bind(&comment.content)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_forum_comments(&self, post_id: &str) -> Result<Vec<ForumComment>> {
        let comments = sqlx::query_as::<_, ForumComment>(
            "SELECT * FROM forum_comments WHERE post_id = ? ORDER BY created_at",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    pub async fn accept_forum_comment(&self, comment_id: &str, post_id: &str) -> Result<()> {
        sqlx::query("UPDATE forum_comments SET is_accepted = 0 WHERE post_id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("UPDATE forum_comments SET is_accepted = 1 WHERE id = ?")
            .bind(comment_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("UPDATE forum_posts SET is_resolved = 1 WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_code_shape() {
        let code = new_invite_code();
        assert_eq!(code.len(), 8);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        // vanishingly unlikely to collide
        assert_ne!(new_invite_code(), code);
    }
}
