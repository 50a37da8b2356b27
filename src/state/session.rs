use super::AppState;
use crate::error::{GameError, GameResult};
use crate::protocol::RoomEvent;
use crate::types::*;
use chrono::Utc;

/// The only legal edges: waiting -> playing -> voting -> results -> waiting.
fn is_valid_phase_transition(from: GamePhase, to: GamePhase) -> bool {
    use GamePhase::*;
    matches!(
        (from, to),
        (Waiting, Playing) | (Playing, Voting) | (Voting, Results) | (Results, Waiting)
    )
}

impl AppState {
    pub async fn current_session(&self, room_id: &RoomId) -> Option<Session> {
        self.sessions.read().await.get(room_id).cloned()
    }

    /// Owner-requested phase transition with optimistic concurrency: the
    /// transition applies only if the phase the requester observed still
    /// holds. The losing side of two concurrent requests gets StaleState
    /// and should re-fetch.
    pub async fn request_phase(
        &self,
        room_id: &RoomId,
        requested_by: &UserId,
        expected_phase: GamePhase,
        new_phase: GamePhase,
        duration: Option<u32>,
    ) -> GameResult<Session> {
        let now = Utc::now();
        let mut rooms = self.rooms.write().await;
        let mut sessions = self.sessions.write().await;

        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| GameError::NotFound("room".into()))?;
        if room.owner_id != *requested_by {
            return Err(GameError::Authorization(
                "only the room owner can change the game phase".into(),
            ));
        }
        let session = sessions
            .get_mut(room_id)
            .ok_or_else(|| GameError::NotFound("session".into()))?;

        // Single conditional update: advance only if the phase the
        // requester observed is still current
        if session.current_phase != expected_phase {
            return Err(GameError::StaleState {
                expected: expected_phase,
                actual: session.current_phase,
            });
        }
        if !is_valid_phase_transition(session.current_phase, new_phase) {
            return Err(GameError::Phase {
                phase: session.current_phase,
            });
        }

        apply_transition(room, session, new_phase, duration, &self.config, now);
        let updated = session.clone();
        drop(sessions);
        drop(rooms);

        self.events
            .publish(RoomEvent::PhaseChanged {
                room_id: room_id.clone(),
                phase: new_phase,
                reason: AdvanceReason::Owner,
            })
            .await;

        tracing::info!(room_id = %room_id, phase = ?new_phase, "phase changed by owner");
        Ok(updated)
    }

    /// Timeout sweep: advance every session whose phase deadline has
    /// elapsed. Runs from a server-side interval task so rounds progress
    /// even with every client disconnected. One room failing to resolve
    /// never stops the others. Returns the number of sessions advanced.
    pub async fn advance_due_sessions(&self) -> usize {
        let now = Utc::now();
        let mut advanced = Vec::new();
        {
            let mut rooms = self.rooms.write().await;
            let mut sessions = self.sessions.write().await;

            for session in sessions.values_mut() {
                if !session.timed_out(now) {
                    continue;
                }
                // Voting advances only on completion or owner override;
                // waiting has no deadline to begin with
                let next = match session.current_phase {
                    GamePhase::Playing => GamePhase::Voting,
                    GamePhase::Results => GamePhase::Waiting,
                    GamePhase::Waiting | GamePhase::Voting => continue,
                };
                let Some(room) = rooms.get_mut(&session.room_id) else {
                    tracing::warn!(room_id = %session.room_id, "session without room, skipping");
                    continue;
                };
                apply_transition(room, session, next, None, &self.config, now);
                advanced.push((session.room_id.clone(), next));
            }
        }

        for (room_id, phase) in &advanced {
            tracing::info!(room_id = %room_id, phase = ?phase, "phase auto-advanced on timeout");
            self.events
                .publish(RoomEvent::PhaseChanged {
                    room_id: room_id.clone(),
                    phase: *phase,
                    reason: AdvanceReason::Timeout,
                })
                .await;
        }
        advanced.len()
    }
}

/// Apply a validated transition in place. Round numbering advances when a
/// new round begins (waiting -> playing); ledger rows are round-tagged so
/// nothing needs deleting when the cycle wraps back to waiting.
pub(super) fn apply_transition(
    room: &mut Room,
    session: &mut Session,
    new_phase: GamePhase,
    duration: Option<u32>,
    config: &GameConfig,
    now: chrono::DateTime<Utc>,
) {
    if session.current_phase == GamePhase::Waiting && new_phase == GamePhase::Playing {
        session.round += 1;
    }
    session.current_phase = new_phase;
    session.phase_start_time = now;
    session.phase_duration = match new_phase {
        // Voting is completion-driven, waiting is untimed
        GamePhase::Voting | GamePhase::Waiting => 0,
        _ => duration.unwrap_or_else(|| config.default_duration(new_phase)),
    };
    session.last_activity = now;
    room.status = new_phase;
}
