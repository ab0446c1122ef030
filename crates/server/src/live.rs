//! Live session lifecycle: `preparing -> live -> ended`.
//!
//! Transitions are validated here; the route/event layer performs the
//! broadcasts and the end-of-session cleanup the transition prescribes.

use shared::LiveStatus;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("session has already ended")]
    AlreadyEnded,

    #[error("cannot move from {from:?} to {to:?}")]
    Invalid { from: LiveStatus, to: LiveStatus },
}

/// Outcome of a requested status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `preparing -> live`: open chat and slide broadcast, notify the room
    Started,
    /// `live -> ended`: freeze the deck position, close open progress rows
    Ended,
    /// Re-requesting the current state changes nothing
    NoOp,
}

pub fn transition(from: LiveStatus, to: LiveStatus) -> Result<Transition, TransitionError> {
    match (from, to) {
        (a, b) if a == b => Ok(Transition::NoOp),
        (LiveStatus::Ended, _) => Err(TransitionError::AlreadyEnded),
        (LiveStatus::Preparing, LiveStatus::Live) => Ok(Transition::Started),
        (LiveStatus::Live, LiveStatus::Ended) => Ok(Transition::Ended),
        (from, to) => Err(TransitionError::Invalid { from, to }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert_eq!(
            transition(LiveStatus::Preparing, LiveStatus::Live),
            Ok(Transition::Started)
        );
        assert_eq!(
            transition(LiveStatus::Live, LiveStatus::Ended),
            Ok(Transition::Ended)
        );
    }

    #[test]
    fn test_same_state_is_noop() {
        for s in [LiveStatus::Preparing, LiveStatus::Live, LiveStatus::Ended] {
            assert_eq!(transition(s, s), Ok(Transition::NoOp));
        }
    }

    #[test]
    fn test_ended_is_terminal() {
        assert_eq!(
            transition(LiveStatus::Ended, LiveStatus::Live),
            Err(TransitionError::AlreadyEnded)
        );
        assert_eq!(
            transition(LiveStatus::Ended, LiveStatus::Preparing),
            Err(TransitionError::AlreadyEnded)
        );
    }

    #[test]
    fn test_no_state_skipping_or_reverting() {
        assert_eq!(
            transition(LiveStatus::Preparing, LiveStatus::Ended),
            Err(TransitionError::Invalid {
                from: LiveStatus::Preparing,
                to: LiveStatus::Ended
            })
        );
        assert_eq!(
            transition(LiveStatus::Live, LiveStatus::Preparing),
            Err(TransitionError::Invalid {
                from: LiveStatus::Live,
                to: LiveStatus::Preparing
            })
        );
    }
}
