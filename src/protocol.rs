use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Realtime change events fanned out per room. Each variant carries only
/// enough to tell consumers *what to re-fetch*; the payload is never the
/// state itself, and event classes are not ordered relative to each other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum RoomEvent {
    MembershipChanged {
        room_id: RoomId,
    },
    PhaseChanged {
        room_id: RoomId,
        phase: GamePhase,
        reason: AdvanceReason,
    },
    EntriesChanged {
        room_id: RoomId,
    },
}

impl RoomEvent {
    pub fn room_id(&self) -> &RoomId {
        match self {
            RoomEvent::MembershipChanged { room_id } => room_id,
            RoomEvent::PhaseChanged { room_id, .. } => room_id,
            RoomEvent::EntriesChanged { room_id } => room_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom {
        name: String,
        game_mode: GameMode,
        difficulty: Difficulty,
        max_players: u32,
    },
    JoinRoom {
        join_code: String,
    },
    LeaveRoom,
    /// Owner-only. `expected_phase` is the phase the requester observed;
    /// the transition only applies if it still holds (optimistic
    /// concurrency).
    RequestPhase {
        expected_phase: GamePhase,
        new_phase: GamePhase,
        duration: Option<u32>,
    },
    GenerateImage {
        prompt: String,
    },
    SubmitEntry {
        prompt: String,
        image_url: String,
    },
    CastVote {
        submission_id: SubmissionId,
    },
    GetSession,
    GetSubmissions,
    GetVotingProgress,
}

/// A room together with its current roster, as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomView {
    #[serde(flatten)]
    pub room: Room,
    pub players: Vec<Member>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        user_id: UserId,
        display_name: String,
        server_now: DateTime<Utc>,
    },
    RoomJoined {
        room: RoomView,
    },
    RoomLeft {
        room_id: RoomId,
    },
    Phase {
        room_id: RoomId,
        phase: GamePhase,
        reason: AdvanceReason,
        server_now: DateTime<Utc>,
        deadline: Option<DateTime<Utc>>,
    },
    ImageGenerated {
        prompt: String,
        image_url: String,
    },
    EntryAccepted {
        submission: Submission,
    },
    VoteAccepted {
        room_id: RoomId,
        progress: VotingProgress,
    },
    Session {
        session: Option<Session>,
    },
    Submissions {
        list: Vec<SubmissionTally>,
    },
    Progress {
        progress: VotingProgress,
    },
    Event {
        event: RoomEvent,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn from_error(err: &crate::error::GameError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = RoomEvent::PhaseChanged {
            room_id: "r1".to_string(),
            phase: GamePhase::Results,
            reason: AdvanceReason::AllPlayersVoted,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["t"], "phase_changed");
        assert_eq!(json["phase"], "results");
        assert_eq!(json["reason"], "all_players_voted");
    }

    #[test]
    fn test_client_message_roundtrip() {
        let json = r#"{"t":"join_room","join_code":"abc123"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::JoinRoom { join_code } => assert_eq!(join_code, "abc123"),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
