use crate::types::GamePhase;

/// Result type for game operations
pub type GameResult<T> = Result<T, GameError>;

/// Errors surfaced by room, session, and ledger operations. All of these
/// are recoverable at the call site; `StaleState` in particular means
/// "re-fetch and retry the same intent".
#[derive(Debug, Clone, thiserror::Error)]
pub enum GameError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("action not allowed during {phase:?} phase")]
    Phase { phase: GamePhase },

    #[error("phase changed concurrently (expected {expected:?}, now {actual:?})")]
    StaleState {
        expected: GamePhase,
        actual: GamePhase,
    },

    #[error("room is full")]
    RoomFull,

    #[error("room cannot be joined: {0}")]
    RoomNotJoinable(String),

    #[error("invalid vote: {0}")]
    InvalidVote(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl GameError {
    /// Stable wire code for the protocol's Error message.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Validation(_) => "VALIDATION",
            GameError::Authorization(_) => "UNAUTHORIZED",
            GameError::Phase { .. } => "WRONG_PHASE",
            GameError::StaleState { .. } => "STALE_STATE",
            GameError::RoomFull => "ROOM_FULL",
            GameError::RoomNotJoinable(_) => "ROOM_NOT_JOINABLE",
            GameError::InvalidVote(_) => "INVALID_VOTE",
            GameError::NotFound(_) => "NOT_FOUND",
        }
    }
}
