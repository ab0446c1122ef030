use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::ConversionStatus;
use uuid::Uuid;

use crate::ai::CheckpointDraft;
use crate::auth::AuthUser;
use crate::db::{Checkpoint, SlideBookmark, SlideDeck};
use crate::error::AppError;
use crate::routes::{load_session, require_member, require_owner};
use crate::slides::spawn_conversion;
use crate::state::AppState;

const ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "ppt", "pptx"];

/// Upload a presentation or PDF and kick off conversion. Responds as soon as
/// the deck row exists; the caller polls `GET /slides/deck/:id`.
pub async fn upload(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_owner(&user, &session)?;

    let mut file_name = None;
    let mut bytes: Option<Vec<u8>> = None;
    let mut estimated_minutes = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                file_name = field.file_name().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                bytes = Some(data.to_vec());
            }
            Some("estimated_minutes") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                estimated_minutes = text.trim().parse::<i64>().ok().filter(|m| *m > 0);
            }
            _ => {}
        }
    }

    let file_name = file_name
        .ok_or_else(|| AppError::Validation("No file in upload".to_string()))?;
    let bytes = bytes.ok_or_else(|| AppError::Validation("No file in upload".to_string()))?;

    let extension = std::path::Path::new(&file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::Validation(
            "Only .pdf, .ppt and .pptx files can be uploaded".to_string(),
        ));
    }
    if bytes.len() as u64 > state.config.slides.max_upload_bytes {
        return Err(AppError::Validation(format!(
            "File exceeds the {} MB slide deck limit",
            state.config.slides.max_upload_bytes / (1024 * 1024)
        )));
    }

    let deck = SlideDeck {
        id: Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        file_name: file_name.clone(),
        conversion_status: ConversionStatus::Pending.as_str().to_string(),
        conversion_error: None,
        slide_count: 0,
        current_slide_index: 0,
        flag_threshold_count: state.config.slides.flag_threshold_count,
        flag_threshold_rate: state.config.slides.flag_threshold_rate,
        estimated_minutes,
        created_at: None,
    };
    state.db.create_slide_deck(&deck).await?;

    // Stage the raw upload, then hand off to the detached conversion task
    let source = std::env::temp_dir().join(format!("classline-{}.{}", deck.id, extension));
    tokio::fs::write(&source, &bytes)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    spawn_conversion(
        state.db.clone(),
        state.storage.clone(),
        state.config.slides.clone(),
        deck.id.clone(),
        source,
    );

    Ok(Json(json!({
        "success": true,
        "deck_id": deck.id,
        "conversion_status": deck.conversion_status,
    })))
}

pub async fn deck_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(deck_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deck = load_deck(&state, &deck_id).await?;
    let session = load_session(&state, &deck.session_id).await?;
    require_member(&state, &user, &session).await?;

    Ok(Json(json!({
        "id": deck.id,
        "session_id": deck.session_id,
        "file_name": deck.file_name,
        "conversion_status": deck.conversion_status,
        "conversion_error": deck.conversion_error,
        "slide_count": deck.slide_count,
        "current_slide_index": deck.current_slide_index,
        "estimated_minutes": deck.estimated_minutes,
    })))
}

pub async fn list_decks(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = load_session(&state, &session_id).await?;
    require_member(&state, &user, &session).await?;

    let decks = state.db.list_slide_decks(&session.id).await?;
    let decks: Vec<Value> = decks
        .into_iter()
        .map(|d| {
            json!({
                "id": d.id,
                "file_name": d.file_name,
                "conversion_status": d.conversion_status,
                "slide_count": d.slide_count,
                "current_slide_index": d.current_slide_index,
                "created_at": d.created_at.map(|t| t.to_rfc3339()),
            })
        })
        .collect();
    Ok(Json(json!({ "session_id": session.id, "decks": decks })))
}

/// Serve one converted slide image. Only `ready` decks expose images, so a
/// failed conversion never leaks a partial set.
pub async fn image(
    State(state): State<AppState>,
    user: AuthUser,
    Path((deck_id, slide_index)): Path<(String, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let deck = load_deck(&state, &deck_id).await?;
    let session = load_session(&state, &deck.session_id).await?;
    require_member(&state, &user, &session).await?;

    if deck.conversion_status != ConversionStatus::Ready.as_str() {
        return Err(AppError::NotFound("Deck is not ready".to_string()));
    }
    if slide_index < 0 || slide_index >= deck.slide_count {
        return Err(AppError::NotFound("No such slide".to_string()));
    }

    let bytes = state
        .storage
        .read_slide(&deck.id, slide_index)
        .await
        .map_err(|_| AppError::NotFound("Slide image missing".to_string()))?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

pub async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(deck_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deck = load_deck(&state, &deck_id).await?;
    let session = load_session(&state, &deck.session_id).await?;
    require_owner(&user, &session)?;

    state
        .storage
        .delete_deck(&deck.id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    state.db.delete_slide_deck(&deck.id).await?;

    Ok(Json(json!({ "success": true })))
}

pub async fn bookmarks(
    State(state): State<AppState>,
    user: AuthUser,
    Path(deck_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deck = load_deck(&state, &deck_id).await?;
    let session = load_session(&state, &deck.session_id).await?;
    require_owner(&user, &session)?;

    let bookmarks = state.db.list_bookmarks(&deck.id).await?;
    let bookmarks: Vec<Value> = bookmarks
        .into_iter()
        .map(|b| {
            json!({
                "slide_index": b.slide_index,
                "is_auto": b.is_auto,
                "is_manual": b.is_manual,
                "reason": b.reason,
                "memo": b.memo,
                "supplement_url": b.supplement_url,
            })
        })
        .collect();
    Ok(Json(json!({ "deck_id": deck.id, "bookmarks": bookmarks })))
}

#[derive(Debug, Deserialize)]
pub struct BookmarkMemoRequest {
    pub slide_index: i64,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub supplement_url: Option<String>,
}

/// Attach a review memo to a slide, creating a manual bookmark if none exists
pub async fn save_bookmark_memo(
    State(state): State<AppState>,
    user: AuthUser,
    Path(deck_id): Path<String>,
    Json(req): Json<BookmarkMemoRequest>,
) -> Result<Json<Value>, AppError> {
    let deck = load_deck(&state, &deck_id).await?;
    let session = load_session(&state, &deck.session_id).await?;
    require_owner(&user, &session)?;

    let bookmark = match state.db.get_bookmark(&deck.id, req.slide_index).await? {
        Some(mut bookmark) => {
            bookmark.memo = req.memo;
            bookmark.supplement_url = req.supplement_url;
            bookmark
        }
        None => SlideBookmark {
            id: Uuid::new_v4().to_string(),
            deck_id: deck.id.clone(),
            slide_index: req.slide_index,
            is_auto: false,
            is_manual: true,
            reason: None,
            memo: req.memo,
            supplement_url: req.supplement_url,
            updated_at: None,
        },
    };
    state.db.upsert_bookmark(&bookmark).await?;

    Ok(Json(json!({ "success": true })))
}

// AI checkpoint generation

pub async fn generate_checkpoints(
    State(state): State<AppState>,
    user: AuthUser,
    Path(deck_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deck = load_deck(&state, &deck_id).await?;
    let session = load_session(&state, &deck.session_id).await?;
    require_owner(&user, &session)?;

    if deck.conversion_status != ConversionStatus::Ready.as_str() || deck.slide_count == 0 {
        return Err(AppError::Conflict(
            "Slide conversion has not completed".to_string(),
        ));
    }

    let mut images = Vec::with_capacity(deck.slide_count as usize);
    for index in 0..deck.slide_count {
        let bytes = state
            .storage
            .read_slide(&deck.id, index)
            .await
            .map_err(|_| AppError::Internal("Slide image missing".to_string()))?;
        images.push(bytes);
    }

    let drafts = state
        .ai
        .generate_from_slides(&images)
        .await
        .map_err(|e| AppError::External(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "deck_id": deck.id,
        "deck_name": deck.file_name,
        "slide_count": deck.slide_count,
        "checkpoints": drafts,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SaveCheckpointsRequest {
    pub checkpoints: Vec<CheckpointDraft>,
}

/// Persist instructor-approved drafts, appended after the current last
/// checkpoint of the owning session
pub async fn save_checkpoints(
    State(state): State<AppState>,
    user: AuthUser,
    Path(deck_id): Path<String>,
    Json(req): Json<SaveCheckpointsRequest>,
) -> Result<Json<Value>, AppError> {
    let deck = load_deck(&state, &deck_id).await?;
    let session = load_session(&state, &deck.session_id).await?;
    require_owner(&user, &session)?;

    if req.checkpoints.is_empty() {
        return Err(AppError::Validation("No checkpoints to save".to_string()));
    }

    let mut seq = state.db.max_checkpoint_seq(&session.id).await?;
    let mut created = 0;
    for draft in req.checkpoints {
        if draft.title.trim().is_empty() {
            continue;
        }
        seq += 1;
        state
            .db
            .create_checkpoint(&Checkpoint {
                id: Uuid::new_v4().to_string(),
                session_id: session.id.clone(),
                title: draft.title.trim().to_string(),
                description: Some(draft.description),
                seq,
                estimated_minutes: Some(draft.estimated_minutes),
                deleted_at: None,
                created_at: None,
            })
            .await?;
        created += 1;
    }

    Ok(Json(json!({ "success": true, "created_count": created })))
}

async fn load_deck(state: &AppState, id: &str) -> Result<SlideDeck, AppError> {
    state
        .db
        .get_slide_deck(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Slide deck not found".to_string()))
}
