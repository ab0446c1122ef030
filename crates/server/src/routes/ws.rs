//! The real-time event router. One socket per client; the first message must
//! authenticate, after which events are handled strictly in arrival order for
//! that connection. Failed events are acknowledged to the sender only; the
//! rest of the room never sees them.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use shared::{
    ChatMessageInfo, CheckpointCompletion, ClientToServer, ConversionStatus, FlaggedSlide,
    LiveStatus, ProgressMode, ReactionCounts, ServerToClient, SlideReaction, TimerAction,
    Understanding,
};
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::{verify_token, Role};
use crate::db::{ChatMessage, Progress, Session, SlideBookmark, SlideDeck};
use crate::error::AppError;
use crate::rooms::RoomKey;
use crate::slides::update_auto_flag;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// The authenticated principal bound to one socket connection
#[derive(Debug, Clone)]
struct SocketUser {
    id: String,
    username: String,
    role: Role,
}

impl SocketUser {
    fn owns(&self, instructor_id: &str) -> bool {
        self.id == instructor_id || self.role == Role::Admin
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = Uuid::new_v4();

    // Wait for the authenticate message first
    let user: SocketUser;
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                let parsed: Result<ClientToServer, _> = serde_json::from_str(&text);
                match parsed {
                    Ok(ClientToServer::Authenticate { token }) => {
                        match authenticate(&state, &token).await {
                            Ok(authenticated) => {
                                let response = ServerToClient::Authenticated {
                                    user_id: authenticated.id.clone(),
                                    username: authenticated.username.clone(),
                                };
                                let text = match serde_json::to_string(&response) {
                                    Ok(text) => text,
                                    Err(_) => return,
                                };
                                if sender.send(Message::Text(text)).await.is_err() {
                                    return;
                                }
                                user = authenticated;
                                break;
                            }
                            Err(e) => {
                                let response = ServerToClient::error(e.to_string());
                                let text = serde_json::to_string(&response).unwrap_or_default();
                                let _ = sender.send(Message::Text(text)).await;
                                return;
                            }
                        }
                    }
                    _ => {
                        tracing::warn!("expected authenticate message first");
                        continue;
                    }
                }
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = sender.send(Message::Pong(data)).await;
            }
            Some(Err(e)) => {
                tracing::debug!("websocket error before auth: {}", e);
                return;
            }
            None => return,
            _ => continue,
        }
    }

    // Channel for sending messages to this client
    let (tx, mut rx) = mpsc::channel::<ServerToClient>(32);
    state.rooms.register(conn_id, tx);

    // Task to forward messages from the channel to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    tracing::info!("live client connected: {} ({})", user.username, conn_id);

    // Handle incoming events in arrival order
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let parsed: Result<ClientToServer, _> = serde_json::from_str(&text);
                match parsed {
                    Ok(event) => {
                        if let Err(e) = dispatch(&state, conn_id, &user, event).await {
                            // error ack goes to the sender only
                            state
                                .rooms
                                .send_to(&conn_id, ServerToClient::error(e.to_string()))
                                .await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("failed to parse client event: {}", e);
                        state
                            .rooms
                            .send_to(&conn_id, ServerToClient::error("malformed event"))
                            .await;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Disconnect removes room membership only; persisted writes stand
    state.rooms.unregister(&conn_id);
    send_task.abort();
    tracing::info!("live client disconnected: {} ({})", user.username, conn_id);
}

async fn authenticate(state: &AppState, token: &str) -> Result<SocketUser, AppError> {
    let claims = verify_token(token, &state.config.auth.jwt_secret)?;
    let user = state
        .db
        .get_user_by_id(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Auth("Unknown user".to_string()))?;
    let role = Role::parse(&user.role)
        .ok_or_else(|| AppError::Internal(format!("Invalid role in database: {}", user.role)))?;
    Ok(SocketUser {
        id: user.id,
        username: user.username,
        role,
    })
}

async fn dispatch(
    state: &AppState,
    conn_id: Uuid,
    user: &SocketUser,
    event: ClientToServer,
) -> Result<(), AppError> {
    match event {
        ClientToServer::Authenticate { .. } => Ok(()), // already authenticated
        ClientToServer::JoinSession { session_id } => {
            join_session(state, conn_id, user, &session_id).await
        }
        ClientToServer::LeaveSession { session_id } => {
            leave_session(state, conn_id, user, &session_id).await
        }
        ClientToServer::JoinDeck { deck_id } => join_deck(state, conn_id, user, &deck_id).await,
        ClientToServer::LeaveDeck { deck_id } => {
            state
                .rooms
                .leave(&RoomKey::Deck(deck_id), &conn_id);
            Ok(())
        }
        ClientToServer::ChatMessage { session_id, text } => {
            chat_message(state, user, &session_id, text).await
        }
        ClientToServer::ChatEdit {
            session_id,
            message_id,
            text,
        } => chat_edit(state, user, &session_id, &message_id, text).await,
        ClientToServer::ChatDelete {
            session_id,
            message_id,
        } => chat_delete(state, user, &session_id, &message_id).await,
        ClientToServer::ChangeSlide {
            deck_id,
            slide_index,
        } => change_slide(state, user, &deck_id, slide_index).await,
        ClientToServer::SetSlideReaction {
            deck_id,
            slide_index,
            reaction,
        } => set_slide_reaction(state, user, &deck_id, slide_index, reaction).await,
        ClientToServer::ToggleSlideBookmark {
            deck_id,
            slide_index,
        } => toggle_bookmark(state, user, &deck_id, slide_index).await,
        ClientToServer::CheckpointCompleted {
            checkpoint_id,
            mode,
        } => checkpoint_completed(state, user, &checkpoint_id, mode).await,
        ClientToServer::SetCurrentCheckpoint {
            session_id,
            checkpoint_id,
        } => set_current_checkpoint(state, user, &session_id, checkpoint_id).await,
        ClientToServer::TimerSync {
            session_id,
            checkpoint_id,
            action,
            elapsed_seconds,
        } => timer_sync(state, user, &session_id, &checkpoint_id, action, elapsed_seconds).await,
        ClientToServer::SubmitUnderstanding {
            session_id,
            checkpoint_id,
            status,
        } => submit_understanding(state, user, &session_id, &checkpoint_id, status).await,
        ClientToServer::RequestStats { session_id, mode } => {
            request_stats(state, conn_id, user, &session_id, mode).await
        }
        ClientToServer::RequestAggregates { deck_id } => {
            request_aggregates(state, conn_id, user, &deck_id).await
        }
    }
}

// Lookup and access helpers

async fn load_session(state: &AppState, session_id: &str) -> Result<Session, AppError> {
    state
        .db
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}

async fn load_deck(state: &AppState, deck_id: &str) -> Result<SlideDeck, AppError> {
    state
        .db
        .get_slide_deck(deck_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Slide deck not found".to_string()))
}

async fn require_member(
    state: &AppState,
    user: &SocketUser,
    session: &Session,
) -> Result<(), AppError> {
    if user.owns(&session.instructor_id) {
        return Ok(());
    }
    if state.db.is_enrolled(&session.id, &user.id).await? {
        return Ok(());
    }
    Err(AppError::Forbidden("Access denied to this session".to_string()))
}

fn require_owner(user: &SocketUser, session: &Session) -> Result<(), AppError> {
    if user.owns(&session.instructor_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the instructor may do this".to_string(),
        ))
    }
}

fn require_live(session: &Session) -> Result<(), AppError> {
    let live = session
        .live_status
        .as_deref()
        .and_then(LiveStatus::parse)
        .map(|s| s == LiveStatus::Live)
        .unwrap_or(false);
    if live {
        Ok(())
    } else {
        Err(AppError::Conflict("Session is not live".to_string()))
    }
}

// Session room events

async fn join_session(
    state: &AppState,
    conn_id: Uuid,
    user: &SocketUser,
    session_id: &str,
) -> Result<(), AppError> {
    let session = load_session(state, session_id).await?;
    require_member(state, user, &session).await?;

    let room = RoomKey::Session(session.id.clone());
    state.rooms.join(room.clone(), conn_id);
    state
        .rooms
        .broadcast(
            &room,
            ServerToClient::ParticipantJoined {
                session_id: session.id.clone(),
                user_id: user.id.clone(),
                username: user.username.clone(),
            },
        )
        .await;

    // the joiner gets a stats snapshot right away
    let completion = session_stats(state, &session.id, ProgressMode::Live).await?;
    state
        .rooms
        .send_to(
            &conn_id,
            ServerToClient::SessionStats {
                session_id: session.id,
                completion,
            },
        )
        .await;
    Ok(())
}

async fn leave_session(
    state: &AppState,
    conn_id: Uuid,
    user: &SocketUser,
    session_id: &str,
) -> Result<(), AppError> {
    let room = RoomKey::Session(session_id.to_string());
    state.rooms.leave(&room, &conn_id);
    state
        .rooms
        .broadcast(
            &room,
            ServerToClient::ParticipantLeft {
                session_id: session_id.to_string(),
                user_id: user.id.clone(),
                username: user.username.clone(),
            },
        )
        .await;
    Ok(())
}

async fn chat_message(
    state: &AppState,
    user: &SocketUser,
    session_id: &str,
    text: String,
) -> Result<(), AppError> {
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::Validation("Empty message".to_string()));
    }
    let session = load_session(state, session_id).await?;
    require_member(state, user, &session).await?;
    require_live(&session)?;

    let message = ChatMessage {
        id: Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        user_id: user.id.clone(),
        username: user.username.clone(),
        role: user.role.as_str().to_string(),
        text: text.clone(),
        deleted_at: None,
        created_at: None,
    };
    state.db.insert_chat_message(&message).await?;

    state
        .rooms
        .broadcast(
            &RoomKey::Session(session.id.clone()),
            ServerToClient::ChatMessage {
                session_id: session.id,
                message: ChatMessageInfo {
                    id: message.id,
                    user_id: message.user_id,
                    username: message.username,
                    role: message.role,
                    text,
                    created_at: Some(Utc::now().to_rfc3339()),
                },
            },
        )
        .await;
    Ok(())
}

/// Author-or-instructor gate shared by edit and delete
async fn load_own_chat_message(
    state: &AppState,
    user: &SocketUser,
    session_id: &str,
    message_id: &str,
) -> Result<(Session, ChatMessage), AppError> {
    let message = state
        .db
        .get_chat_message(message_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;
    if message.session_id != session_id {
        return Err(AppError::Validation("Message is not in this session".to_string()));
    }
    let session = load_session(state, session_id).await?;
    require_member(state, user, &session).await?;
    if message.user_id != user.id && !user.owns(&session.instructor_id) {
        return Err(AppError::Forbidden("Not your message".to_string()));
    }
    Ok((session, message))
}

async fn chat_edit(
    state: &AppState,
    user: &SocketUser,
    session_id: &str,
    message_id: &str,
    text: String,
) -> Result<(), AppError> {
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::Validation("Empty message".to_string()));
    }
    let (session, message) = load_own_chat_message(state, user, session_id, message_id).await?;

    state.db.update_chat_text(&message.id, &text).await?;
    state
        .rooms
        .broadcast(
            &RoomKey::Session(session.id.clone()),
            ServerToClient::ChatEdited {
                session_id: session.id,
                message_id: message.id,
                text,
            },
        )
        .await;
    Ok(())
}

async fn chat_delete(
    state: &AppState,
    user: &SocketUser,
    session_id: &str,
    message_id: &str,
) -> Result<(), AppError> {
    let (session, message) = load_own_chat_message(state, user, session_id, message_id).await?;

    state
        .db
        .soft_delete_chat_message(&message.id, Utc::now())
        .await?;
    state
        .rooms
        .broadcast(
            &RoomKey::Session(session.id.clone()),
            ServerToClient::ChatDeleted {
                session_id: session.id,
                message_id: message.id,
            },
        )
        .await;
    Ok(())
}

// Deck room events

async fn join_deck(
    state: &AppState,
    conn_id: Uuid,
    user: &SocketUser,
    deck_id: &str,
) -> Result<(), AppError> {
    let deck = load_deck(state, deck_id).await?;
    let session = load_session(state, &deck.session_id).await?;
    require_member(state, user, &session).await?;

    state.rooms.join(RoomKey::Deck(deck.id.clone()), conn_id);
    state
        .rooms
        .send_to(
            &conn_id,
            ServerToClient::DeckState {
                deck_id: deck.id,
                current_slide_index: deck.current_slide_index,
                slide_count: deck.slide_count,
            },
        )
        .await;
    Ok(())
}

async fn change_slide(
    state: &AppState,
    user: &SocketUser,
    deck_id: &str,
    slide_index: i64,
) -> Result<(), AppError> {
    let deck = load_deck(state, deck_id).await?;
    let session = load_session(state, &deck.session_id).await?;
    require_owner(user, &session)?;
    require_live(&session)?;
    if slide_index < 0 || slide_index >= deck.slide_count {
        return Err(AppError::Validation("Slide index out of range".to_string()));
    }

    state.db.set_current_slide_index(&deck.id, slide_index).await?;
    state
        .rooms
        .broadcast(
            &RoomKey::Deck(deck.id.clone()),
            ServerToClient::SlideChanged {
                deck_id: deck.id,
                slide_index,
            },
        )
        .await;
    Ok(())
}

async fn set_slide_reaction(
    state: &AppState,
    user: &SocketUser,
    deck_id: &str,
    slide_index: i64,
    reaction: SlideReaction,
) -> Result<(), AppError> {
    let deck = load_deck(state, deck_id).await?;
    let session = load_session(state, &deck.session_id).await?;
    if user.owns(&session.instructor_id) {
        return Err(AppError::Forbidden(
            "Instructors do not react to their own slides".to_string(),
        ));
    }
    require_member(state, user, &session).await?;
    require_live(&session)?;
    if deck.conversion_status != ConversionStatus::Ready.as_str()
        || slide_index < 0
        || slide_index >= deck.slide_count
    {
        return Err(AppError::Validation("Slide index out of range".to_string()));
    }

    match reaction {
        SlideReaction::None => {
            state
                .db
                .delete_reaction(&deck.id, &user.id, slide_index)
                .await?;
        }
        reaction => {
            state
                .db
                .upsert_reaction(&deck.id, &user.id, slide_index, reaction.as_str())
                .await?;
        }
    }

    let counts = state.db.count_reactions(&deck.id, slide_index).await?;
    let (flagged, reason) = update_auto_flag(&state.db, &deck, slide_index, &counts)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    state
        .rooms
        .broadcast(
            &RoomKey::Deck(deck.id.clone()),
            ServerToClient::SlideAggregateUpdated {
                deck_id: deck.id,
                slide_index,
                counts,
                flagged,
                reason,
            },
        )
        .await;
    Ok(())
}

async fn toggle_bookmark(
    state: &AppState,
    user: &SocketUser,
    deck_id: &str,
    slide_index: i64,
) -> Result<(), AppError> {
    let deck = load_deck(state, deck_id).await?;
    let session = load_session(state, &deck.session_id).await?;
    require_owner(user, &session)?;

    let bookmarked = match state.db.get_bookmark(&deck.id, slide_index).await? {
        Some(mut bookmark) => {
            if bookmark.is_auto && !bookmark.is_manual {
                bookmark.is_manual = true;
                state.db.upsert_bookmark(&bookmark).await?;
                true
            } else if bookmark.is_manual && !bookmark.is_auto {
                state.db.delete_bookmark(&deck.id, slide_index).await?;
                false
            } else {
                bookmark.is_manual = !bookmark.is_manual;
                let still = bookmark.is_manual || bookmark.is_auto;
                state.db.upsert_bookmark(&bookmark).await?;
                still
            }
        }
        None => {
            state
                .db
                .upsert_bookmark(&SlideBookmark {
                    id: Uuid::new_v4().to_string(),
                    deck_id: deck.id.clone(),
                    slide_index,
                    is_auto: false,
                    is_manual: true,
                    reason: None,
                    memo: None,
                    supplement_url: None,
                    updated_at: None,
                })
                .await?;
            true
        }
    };

    state
        .rooms
        .broadcast(
            &RoomKey::Deck(deck.id.clone()),
            ServerToClient::BookmarkUpdated {
                deck_id: deck.id,
                slide_index,
                bookmarked,
            },
        )
        .await;
    Ok(())
}

// Checkpoint events

async fn checkpoint_completed(
    state: &AppState,
    user: &SocketUser,
    checkpoint_id: &str,
    mode: ProgressMode,
) -> Result<(), AppError> {
    let checkpoint = state
        .db
        .get_checkpoint(checkpoint_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Checkpoint not found".to_string()))?;
    let session = load_session(state, &checkpoint.session_id).await?;
    require_member(state, user, &session).await?;
    if user.owns(&session.instructor_id) {
        return Err(AppError::Forbidden(
            "Instructors do not record completions".to_string(),
        ));
    }

    let now = Utc::now();
    let mut progress = match state
        .db
        .load_progress_swept(&user.id, checkpoint_id, mode.as_str(), now)
        .await?
    {
        Some(progress) => progress,
        None => {
            let progress = Progress {
                id: Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                checkpoint_id: checkpoint_id.to_string(),
                mode: mode.as_str().to_string(),
                started_at: None,
                paused_at: None,
                is_paused: false,
                accumulated_seconds: 0,
                completed_at: None,
                duration_seconds: None,
            };
            state.db.insert_progress(&progress).await?;
            progress
        }
    };
    let mut timer = progress.timer();
    timer.complete(now);
    progress.apply_timer(&timer);
    state.db.save_progress(&progress).await?;

    let room = RoomKey::Session(session.id.clone());
    state
        .rooms
        .broadcast(
            &room,
            ServerToClient::ProgressUpdate {
                session_id: session.id.clone(),
                user_id: user.id.clone(),
                username: user.username.clone(),
                checkpoint_id: checkpoint_id.to_string(),
                status: "completed".to_string(),
            },
        )
        .await;

    let completion = session_stats(state, &session.id, mode).await?;
    state
        .rooms
        .broadcast(
            &room,
            ServerToClient::SessionStats {
                session_id: session.id,
                completion,
            },
        )
        .await;
    Ok(())
}

async fn set_current_checkpoint(
    state: &AppState,
    user: &SocketUser,
    session_id: &str,
    checkpoint_id: Option<String>,
) -> Result<(), AppError> {
    let session = load_session(state, session_id).await?;
    require_owner(user, &session)?;

    if let Some(checkpoint_id) = &checkpoint_id {
        let checkpoint = state
            .db
            .get_checkpoint(checkpoint_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Checkpoint not found".to_string()))?;
        if checkpoint.session_id != session.id {
            return Err(AppError::Validation(
                "Checkpoint is not in this session".to_string(),
            ));
        }
    }

    state
        .db
        .set_current_checkpoint(&session.id, checkpoint_id.as_deref())
        .await?;
    state
        .rooms
        .broadcast(
            &RoomKey::Session(session.id.clone()),
            ServerToClient::CurrentCheckpointChanged {
                session_id: session.id,
                checkpoint_id,
            },
        )
        .await;
    Ok(())
}

/// Relay the instructor's classroom timer to the room; nothing is persisted
async fn timer_sync(
    state: &AppState,
    user: &SocketUser,
    session_id: &str,
    checkpoint_id: &str,
    action: TimerAction,
    elapsed_seconds: i64,
) -> Result<(), AppError> {
    let session = load_session(state, session_id).await?;
    require_owner(user, &session)?;

    state
        .rooms
        .broadcast(
            &RoomKey::Session(session.id.clone()),
            ServerToClient::TimerSync {
                session_id: session.id,
                checkpoint_id: checkpoint_id.to_string(),
                action,
                elapsed_seconds,
                is_running: action.is_running(),
            },
        )
        .await;
    Ok(())
}

async fn submit_understanding(
    state: &AppState,
    user: &SocketUser,
    session_id: &str,
    checkpoint_id: &str,
    status: Understanding,
) -> Result<(), AppError> {
    let session = load_session(state, session_id).await?;
    if user.owns(&session.instructor_id) {
        return Err(AppError::Forbidden(
            "Instructors do not submit understanding".to_string(),
        ));
    }
    require_member(state, user, &session).await?;
    require_live(&session)?;

    state
        .db
        .set_understanding(&session.id, checkpoint_id, &user.id, status.as_str())
        .await?;
    let (understood, confused) = state
        .db
        .count_understanding(&session.id, checkpoint_id)
        .await?;

    state
        .rooms
        .broadcast(
            &RoomKey::Session(session.id.clone()),
            ServerToClient::UnderstandingUpdated {
                session_id: session.id,
                checkpoint_id: checkpoint_id.to_string(),
                understood,
                confused,
            },
        )
        .await;
    Ok(())
}

// Read-only requests, answered to the requester only

async fn request_stats(
    state: &AppState,
    conn_id: Uuid,
    user: &SocketUser,
    session_id: &str,
    mode: ProgressMode,
) -> Result<(), AppError> {
    let session = load_session(state, session_id).await?;
    require_member(state, user, &session).await?;

    let completion = session_stats(state, &session.id, mode).await?;
    state
        .rooms
        .send_to(
            &conn_id,
            ServerToClient::SessionStats {
                session_id: session.id,
                completion,
            },
        )
        .await;
    Ok(())
}

async fn request_aggregates(
    state: &AppState,
    conn_id: Uuid,
    user: &SocketUser,
    deck_id: &str,
) -> Result<(), AppError> {
    let deck = load_deck(state, deck_id).await?;
    let session = load_session(state, &deck.session_id).await?;
    require_member(state, user, &session).await?;

    let mut aggregates: HashMap<i64, ReactionCounts> = HashMap::new();
    for slide_index in 0..deck.slide_count {
        aggregates.insert(
            slide_index,
            state.db.count_reactions(&deck.id, slide_index).await?,
        );
    }
    let flagged = state
        .db
        .list_bookmarks(&deck.id)
        .await?
        .into_iter()
        .map(|b| FlaggedSlide {
            slide_index: b.slide_index,
            is_auto: b.is_auto,
            is_manual: b.is_manual,
            reason: b.reason,
        })
        .collect();

    state
        .rooms
        .send_to(
            &conn_id,
            ServerToClient::SlideAggregates {
                deck_id: deck.id,
                aggregates,
                flagged,
            },
        )
        .await;
    Ok(())
}

/// Per-checkpoint completion counts against the enrolled headcount
async fn session_stats(
    state: &AppState,
    session_id: &str,
    mode: ProgressMode,
) -> Result<HashMap<String, CheckpointCompletion>, AppError> {
    let checkpoints = state.db.list_checkpoints(session_id).await?;
    let total = state.db.count_enrolled(session_id).await?;
    let checkpoint_ids: Vec<String> = checkpoints.iter().map(|c| c.id.clone()).collect();
    let completed = state
        .db
        .count_completed(&checkpoint_ids, mode.as_str())
        .await?;

    let mut stats = HashMap::new();
    for checkpoint in checkpoints {
        let completed = completed.get(&checkpoint.id).copied().unwrap_or(0);
        stats.insert(checkpoint.id, CheckpointCompletion { completed, total });
    }
    Ok(stats)
}
