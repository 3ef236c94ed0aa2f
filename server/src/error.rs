//! Error taxonomy for rejected game actions
//!
//! Every rejection leaves the session untouched and is reported only to the
//! client that caused it, as a `Packet::Rejected` carrying the code below.

use shared::{CardId, ErrorCode, SessionId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("It is not your turn!")]
    NotYourTurn,

    #[error("Connection is not seated in this session")]
    UnknownActor,

    #[error("Card {0} does not exist on this board")]
    UnknownCard(CardId),

    #[error("Card {0} is already face up or matched")]
    CardUnavailable(CardId),

    #[error("The current pair is still being resolved")]
    ResolutionPending,

    #[error("The session has ended")]
    SessionEnded,

    #[error("Session {0} does not exist")]
    UnknownSession(SessionId),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("{0}")]
    Lobby(String),

    #[error("You must log in first")]
    NotLoggedIn,

    #[error("Session task is no longer running")]
    SessionClosed,
}

impl GameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GameError::NotYourTurn => ErrorCode::NotYourTurn,
            GameError::UnknownActor => ErrorCode::UnknownActor,
            GameError::UnknownCard(_) => ErrorCode::UnknownCard,
            GameError::CardUnavailable(_) => ErrorCode::CardUnavailable,
            GameError::ResolutionPending => ErrorCode::ResolutionPending,
            GameError::SessionEnded => ErrorCode::SessionEnded,
            GameError::UnknownSession(_) => ErrorCode::UnknownSession,
            GameError::Configuration(_) => ErrorCode::Configuration,
            GameError::Lobby(_) => ErrorCode::Lobby,
            GameError::NotLoggedIn => ErrorCode::NotLoggedIn,
            GameError::SessionClosed => ErrorCode::Internal,
        }
    }

    /// Requests the transport layer should have filtered out before they got here.
    pub fn is_defensive(&self) -> bool {
        matches!(self, GameError::UnknownActor | GameError::UnknownCard(_))
    }
}
