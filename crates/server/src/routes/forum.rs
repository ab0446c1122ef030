use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{ForumComment, ForumPost};
use crate::error::AppError;
use crate::routes::{load_session, require_member, require_owner};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

pub async fn list_posts(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_member(&state, &user, &session).await?;

    let posts = state.db.list_forum_posts(&session.id).await?;
    let posts: Vec<Value> = posts
        .into_iter()
        .map(|p| {
            json!({
                "id": p.id,
                "user_id": p.user_id,
                "title": p.title,
                "is_resolved": p.is_resolved,
                "created_at": p.created_at.map(|t| t.to_rfc3339()),
            })
        })
        .collect();
    Ok(Json(json!({ "session_id": session.id, "posts": posts })))
}

pub async fn create_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
    Json(req): Json<PostRequest>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_member(&state, &user, &session).await?;
    if req.title.trim().is_empty() || req.content.trim().is_empty() {
        return Err(AppError::Validation(
            "Title and content are required".to_string(),
        ));
    }

    let post = ForumPost {
        id: Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        user_id: user.id.clone(),
        title: req.title.trim().to_string(),
        content: req.content,
        is_resolved: false,
        created_at: None,
        updated_at: None,
    };
    state.db.insert_forum_post(&post).await?;

    Ok(Json(json!({ "success": true, "post_id": post.id })))
}

pub async fn view_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let post = load_post(&state, &post_id).await?;
    let session = load_session(&state, &post.session_id).await?;
    require_member(&state, &user, &session).await?;

    let comments = state.db.list_forum_comments(&post.id).await?;
    let comments: Vec<Value> = comments
        .into_iter()
        .map(|c| {
            json!({
                "id": c.id,
                "user_id": c.user_id,
                "content": c.content,
                "is_accepted": c.is_accepted,
                "created_at": c.created_at.map(|t| t.to_rfc3339()),
            })
        })
        .collect();

    Ok(Json(json!({
        "id": post.id,
        "session_id": post.session_id,
        "user_id": post.user_id,
        "title": post.title,
        "content": post.content,
        "is_resolved": post.is_resolved,
        "comments": comments,
    })))
}

pub async fn add_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<Value>, AppError> {
    let post = load_post(&state, &post_id).await?;
    let session = load_session(&state, &post.session_id).await?;
    require_member(&state, &user, &session).await?;
    if req.content.trim().is_empty() {
        return Err(AppError::Validation("Content is required".to_string()));
    }

    let comment = ForumComment {
        id: Uuid::new_v4().to_string(),
        post_id: post.id.clone(),
        user_id: user.id.clone(),
        content: req.content,
        is_accepted: false,
        created_at: None,
    };
    state.db.insert_forum_comment(&comment).await?;

    Ok(Json(json!({ "success": true, "comment_id": comment.id })))
}

/// The author or the instructor may close a question
pub async fn resolve_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let post = load_post(&state, &post_id).await?;
    let session = load_session(&state, &post.session_id).await?;
    if post.user_id != user.id {
        require_owner(&user, &session)?;
    }

    state.db.set_forum_post_resolved(&post.id, true).await?;
    Ok(Json(json!({ "success": true })))
}

/// Accepting an answer marks the post resolved and clears any prior accept
pub async fn accept_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let post = load_post(&state, &post_id).await?;
    let session = load_session(&state, &post.session_id).await?;
    if post.user_id != user.id {
        require_owner(&user, &session)?;
    }

    let comments = state.db.list_forum_comments(&post.id).await?;
    if !comments.iter().any(|c| c.id == comment_id) {
        return Err(AppError::NotFound("Comment not found".to_string()));
    }

    state.db.accept_forum_comment(&comment_id, &post.id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn load_post(state: &AppState, id: &str) -> Result<ForumPost, AppError> {
    state
        .db
        .get_forum_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
}
