use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Client <-> Server Messages
// ============================================================================

/// Messages sent from a browser client to the server over the live socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientToServer {
    /// Authenticate with JWT token; must be the first message on the socket
    Authenticate { token: String },

    /// Join the live room for a session
    JoinSession { session_id: String },

    /// Leave the live room for a session
    LeaveSession { session_id: String },

    /// Join the slide room for a deck (presenter or viewer page)
    JoinDeck { deck_id: String },

    /// Leave the slide room for a deck
    LeaveDeck { deck_id: String },

    /// Post a chat message to the session room
    ChatMessage { session_id: String, text: String },

    /// Edit an existing chat message (author or instructor)
    ChatEdit {
        session_id: String,
        message_id: String,
        text: String,
    },

    /// Soft-delete a chat message (author or instructor)
    ChatDelete {
        session_id: String,
        message_id: String,
    },

    /// Instructor moves the deck to a slide
    ChangeSlide { deck_id: String, slide_index: i64 },

    /// Student sets (or clears, with `none`) their reaction on a slide
    SetSlideReaction {
        deck_id: String,
        slide_index: i64,
        reaction: SlideReaction,
    },

    /// Instructor toggles the manual bookmark on a slide
    ToggleSlideBookmark { deck_id: String, slide_index: i64 },

    /// Student marks a checkpoint complete during a live session
    CheckpointCompleted {
        checkpoint_id: String,
        #[serde(default)]
        mode: ProgressMode,
    },

    /// Instructor points the room at a checkpoint
    SetCurrentCheckpoint {
        session_id: String,
        checkpoint_id: Option<String>,
    },

    /// Instructor broadcasts their checkpoint timer state to the room
    TimerSync {
        session_id: String,
        checkpoint_id: String,
        action: TimerAction,
        elapsed_seconds: i64,
    },

    /// Student reports understanding of the current checkpoint
    SubmitUnderstanding {
        session_id: String,
        checkpoint_id: String,
        status: Understanding,
    },

    /// Ask for the session's completion stats (sent to requester only)
    RequestStats {
        session_id: String,
        #[serde(default)]
        mode: ProgressMode,
    },

    /// Ask for all reaction aggregates of a deck (sent to requester only)
    RequestAggregates { deck_id: String },
}

/// Messages sent from the server to a browser client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerToClient {
    /// Authentication successful
    Authenticated { user_id: String, username: String },

    /// Error acknowledgment, delivered to the sender only
    Error { message: String },

    /// A member joined the session room
    ParticipantJoined {
        session_id: String,
        user_id: String,
        username: String,
    },

    /// A member left the session room
    ParticipantLeft {
        session_id: String,
        user_id: String,
        username: String,
    },

    /// The instructor opened the live session
    SessionStarted { session_id: String },

    /// The instructor ended the live session
    SessionEnded { session_id: String },

    /// New chat message in the room
    ChatMessage {
        session_id: String,
        message: ChatMessageInfo,
    },

    /// A chat message was edited
    ChatEdited {
        session_id: String,
        message_id: String,
        text: String,
    },

    /// A chat message was deleted
    ChatDeleted {
        session_id: String,
        message_id: String,
    },

    /// Authoritative slide position for the deck room
    SlideChanged { deck_id: String, slide_index: i64 },

    /// Deck snapshot delivered on joining a slide room
    DeckState {
        deck_id: String,
        current_slide_index: i64,
        slide_count: i64,
    },

    /// Recomputed reaction aggregate for one slide
    SlideAggregateUpdated {
        deck_id: String,
        slide_index: i64,
        counts: ReactionCounts,
        flagged: bool,
        reason: Option<String>,
    },

    /// Bookmark state changed for one slide
    BookmarkUpdated {
        deck_id: String,
        slide_index: i64,
        bookmarked: bool,
    },

    /// All aggregates and flagged slides of a deck (requester only)
    SlideAggregates {
        deck_id: String,
        aggregates: HashMap<i64, ReactionCounts>,
        flagged: Vec<FlaggedSlide>,
    },

    /// A student's progress on a checkpoint changed
    ProgressUpdate {
        session_id: String,
        user_id: String,
        username: String,
        checkpoint_id: String,
        status: String,
    },

    /// Per-checkpoint completion counts for the session
    SessionStats {
        session_id: String,
        completion: HashMap<String, CheckpointCompletion>,
    },

    /// The instructor pointed the room at a checkpoint
    CurrentCheckpointChanged {
        session_id: String,
        checkpoint_id: Option<String>,
    },

    /// Instructor timer state relayed to the room
    TimerSync {
        session_id: String,
        checkpoint_id: String,
        action: TimerAction,
        elapsed_seconds: i64,
        is_running: bool,
    },

    /// Understanding tallies for a checkpoint changed
    UnderstandingUpdated {
        session_id: String,
        checkpoint_id: String,
        understood: i64,
        confused: i64,
    },
}

// ============================================================================
// Shared Types
// ============================================================================

/// Lifecycle of a live-typed session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    Preparing,
    Live,
    Ended,
}

impl LiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveStatus::Preparing => "preparing",
            LiveStatus::Live => "live",
            LiveStatus::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preparing" => Some(LiveStatus::Preparing),
            "live" => Some(LiveStatus::Live),
            "ended" => Some(LiveStatus::Ended),
            _ => None,
        }
    }
}

/// What a session delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Live,
    Video,
    Material,
    Assignment,
    Quiz,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Live => "live",
            SessionType::Video => "video",
            SessionType::Material => "material",
            SessionType::Assignment => "assignment",
            SessionType::Quiz => "quiz",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "live" => Some(SessionType::Live),
            "video" => Some(SessionType::Video),
            "material" => Some(SessionType::Material),
            "assignment" => Some(SessionType::Assignment),
            "quiz" => Some(SessionType::Quiz),
            _ => None,
        }
    }
}

/// Per-slide feedback from a student; `none` clears a prior reaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideReaction {
    Understood,
    Question,
    Hard,
    #[default]
    None,
}

impl SlideReaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlideReaction::Understood => "understood",
            SlideReaction::Question => "question",
            SlideReaction::Hard => "hard",
            SlideReaction::None => "none",
        }
    }
}

/// Slide deck conversion lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Pending,
    Converting,
    Ready,
    Failed,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Pending => "pending",
            ConversionStatus::Converting => "converting",
            ConversionStatus::Ready => "ready",
            ConversionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ConversionStatus::Pending),
            "converting" => Some(ConversionStatus::Converting),
            "ready" => Some(ConversionStatus::Ready),
            "failed" => Some(ConversionStatus::Failed),
            _ => None,
        }
    }
}

/// Whether a progress record tracks live participation or self-paced study
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
    Live,
    #[default]
    SelfPaced,
}

impl ProgressMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressMode::Live => "live",
            ProgressMode::SelfPaced => "self_paced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "live" => Some(ProgressMode::Live),
            "self_paced" => Some(ProgressMode::SelfPaced),
            _ => None,
        }
    }
}

/// Instructor timer actions relayed to the room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerAction {
    Start,
    Pause,
    Resume,
    Stop,
}

impl TimerAction {
    pub fn is_running(&self) -> bool {
        matches!(self, TimerAction::Start | TimerAction::Resume)
    }
}

/// Student self-report on a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Understanding {
    Understood,
    Confused,
}

impl Understanding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Understanding::Understood => "understood",
            Understanding::Confused => "confused",
        }
    }
}

/// One chat message as delivered to room members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageInfo {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub text: String,
    pub created_at: Option<String>,
}

/// Reaction tallies for a single slide
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCounts {
    pub understood: i64,
    pub question: i64,
    pub hard: i64,
}

impl ReactionCounts {
    pub fn total(&self) -> i64 {
        self.understood + self.question + self.hard
    }

    /// Reactions signalling the slide needs another pass
    pub fn problem(&self) -> i64 {
        self.question + self.hard
    }
}

/// A slide carrying an auto or manual bookmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedSlide {
    pub slide_index: i64,
    pub is_auto: bool,
    pub is_manual: bool,
    pub reason: Option<String>,
}

/// Completion counts for one checkpoint
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CheckpointCompletion {
    pub completed: i64,
    pub total: i64,
}

// ============================================================================
// Helper implementations
// ============================================================================

impl ServerToClient {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticate_serialization() {
        let msg = ClientToServer::Authenticate {
            token: "jwt-token".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"authenticate\""));
        assert!(json.contains("\"token\":\"jwt-token\""));

        let deserialized: ClientToServer = serde_json::from_str(&json).unwrap();
        match deserialized {
            ClientToServer::Authenticate { token } => assert_eq!(token, "jwt-token"),
            _ => panic!("Expected Authenticate variant"),
        }
    }

    #[test]
    fn test_join_session_serialization() {
        let msg = ClientToServer::JoinSession {
            session_id: "sess-1".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"join_session\""));
        assert!(json.contains("\"session_id\":\"sess-1\""));
    }

    #[test]
    fn test_chat_message_roundtrip() {
        let msg = ClientToServer::ChatMessage {
            session_id: "sess-1".to_string(),
            text: "hello room".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"chat_message\""));

        let deserialized: ClientToServer = serde_json::from_str(&json).unwrap();
        match deserialized {
            ClientToServer::ChatMessage { session_id, text } => {
                assert_eq!(session_id, "sess-1");
                assert_eq!(text, "hello room");
            }
            _ => panic!("Expected ChatMessage variant"),
        }
    }

    #[test]
    fn test_set_slide_reaction_deserialization() {
        let json = r#"{"type":"set_slide_reaction","deck_id":"d1","slide_index":4,"reaction":"hard"}"#;
        let msg: ClientToServer = serde_json::from_str(json).unwrap();
        match msg {
            ClientToServer::SetSlideReaction {
                deck_id,
                slide_index,
                reaction,
            } => {
                assert_eq!(deck_id, "d1");
                assert_eq!(slide_index, 4);
                assert_eq!(reaction, SlideReaction::Hard);
            }
            _ => panic!("Expected SetSlideReaction variant"),
        }
    }

    #[test]
    fn test_checkpoint_completed_default_mode() {
        let json = r#"{"type":"checkpoint_completed","checkpoint_id":"cp-1"}"#;
        let msg: ClientToServer = serde_json::from_str(json).unwrap();
        match msg {
            ClientToServer::CheckpointCompleted { checkpoint_id, mode } => {
                assert_eq!(checkpoint_id, "cp-1");
                assert_eq!(mode, ProgressMode::SelfPaced);
            }
            _ => panic!("Expected CheckpointCompleted variant"),
        }
    }

    #[test]
    fn test_slide_changed_serialization() {
        let msg = ServerToClient::SlideChanged {
            deck_id: "d1".to_string(),
            slide_index: 7,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"slide_changed\""));
        assert!(json.contains("\"slide_index\":7"));
    }

    #[test]
    fn test_slide_aggregate_updated_serialization() {
        let msg = ServerToClient::SlideAggregateUpdated {
            deck_id: "d1".to_string(),
            slide_index: 2,
            counts: ReactionCounts {
                understood: 5,
                question: 2,
                hard: 1,
            },
            flagged: true,
            reason: Some("3 of 8 students stuck".to_string()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"slide_aggregate_updated\""));
        assert!(json.contains("\"understood\":5"));
        assert!(json.contains("\"flagged\":true"));
    }

    #[test]
    fn test_server_error_helper() {
        let msg = ServerToClient::error("access denied");
        match msg {
            ServerToClient::Error { message } => assert_eq!(message, "access denied"),
            _ => panic!("Expected Error variant"),
        }
    }

    #[test]
    fn test_live_status_parse_roundtrip() {
        for status in [LiveStatus::Preparing, LiveStatus::Live, LiveStatus::Ended] {
            assert_eq!(LiveStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LiveStatus::parse("bogus"), None);

        let json = serde_json::to_string(&LiveStatus::Preparing).unwrap();
        assert_eq!(json, "\"preparing\"");
    }

    #[test]
    fn test_session_type_parse_roundtrip() {
        for ty in [
            SessionType::Live,
            SessionType::Video,
            SessionType::Material,
            SessionType::Assignment,
            SessionType::Quiz,
        ] {
            assert_eq!(SessionType::parse(ty.as_str()), Some(ty));
        }
    }

    #[test]
    fn test_progress_mode_serialization() {
        let json = serde_json::to_string(&ProgressMode::SelfPaced).unwrap();
        assert_eq!(json, "\"self_paced\"");
        assert_eq!(ProgressMode::parse("self_paced"), Some(ProgressMode::SelfPaced));
        assert_eq!(ProgressMode::default(), ProgressMode::SelfPaced);
    }

    #[test]
    fn test_reaction_counts_totals() {
        let counts = ReactionCounts {
            understood: 4,
            question: 2,
            hard: 3,
        };
        assert_eq!(counts.total(), 9);
        assert_eq!(counts.problem(), 5);
    }

    #[test]
    fn test_timer_action_is_running() {
        assert!(TimerAction::Start.is_running());
        assert!(TimerAction::Resume.is_running());
        assert!(!TimerAction::Pause.is_running());
        assert!(!TimerAction::Stop.is_running());
    }

    #[test]
    fn test_session_stats_serialization() {
        let mut completion = HashMap::new();
        completion.insert(
            "cp-1".to_string(),
            CheckpointCompletion {
                completed: 3,
                total: 10,
            },
        );
        let msg = ServerToClient::SessionStats {
            session_id: "sess-1".to_string(),
            completion,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"session_stats\""));
        assert!(json.contains("\"completed\":3"));
    }
}
