use super::AppState;
use crate::types::*;
use chrono::Utc;
use std::time::Instant;

impl AppState {
    /// Force-close rooms that have been inactive past the grace window.
    /// Liveness is a single rule: any join, leave, phase change,
    /// submission, or vote touches the session's `last_activity`, and
    /// freshness is re-checked here under the write locks, so a room that
    /// saw activity mid-sweep is never reaped. One room going wrong is
    /// logged and skipped; the sweep continues for the rest.
    pub async fn reap_idle(&self, trigger: CleanupTrigger) -> CleanupReport {
        let started = Instant::now();
        let now = Utc::now();
        let grace = chrono::Duration::seconds(self.config.idle_grace_secs as i64);

        let mut report = CleanupReport {
            cleanup_id: ulid::Ulid::new().to_string(),
            trigger,
            cleaned_rooms: 0,
            cleaned_sessions: 0,
            cleaned_players: 0,
            cleaned_votes: 0,
            cleaned_submissions: 0,
            execution_time_ms: 0,
        };

        let mut reaped_ids = Vec::new();
        {
            let mut rooms = self.rooms.write().await;
            let mut members = self.members.write().await;
            let mut sessions = self.sessions.write().await;
            let mut submissions = self.submissions.write().await;
            let mut votes = self.votes.write().await;

            let stale: Vec<RoomId> = sessions
                .values()
                .filter(|s| now - s.last_activity > grace)
                .map(|s| s.room_id.clone())
                .collect();

            for room_id in stale {
                if rooms.remove(&room_id).is_none() {
                    tracing::warn!(room_id = %room_id, "stale session without room, skipping");
                    continue;
                }
                report.cleaned_rooms += 1;
                if sessions.remove(&room_id).is_some() {
                    report.cleaned_sessions += 1;
                }
                if let Some(roster) = members.remove(&room_id) {
                    report.cleaned_players += roster.len() as u32;
                }

                let before = submissions.len();
                submissions.retain(|_, s| s.room_id != room_id);
                report.cleaned_submissions += (before - submissions.len()) as u32;

                let before = votes.len();
                votes.retain(|_, v| v.room_id != room_id);
                report.cleaned_votes += (before - votes.len()) as u32;

                reaped_ids.push(room_id);
            }
        }

        for room_id in &reaped_ids {
            self.events.remove(room_id).await;
            tracing::info!(room_id = %room_id, "idle room reaped");
        }

        report.execution_time_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            cleanup_id = %report.cleanup_id,
            trigger = ?report.trigger,
            rooms = report.cleaned_rooms,
            sessions = report.cleaned_sessions,
            players = report.cleaned_players,
            votes = report.cleaned_votes,
            submissions = report.cleaned_submissions,
            elapsed_ms = report.execution_time_ms,
            "cleanup sweep finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GameResult;

    /// Age a room's last_activity past the grace window
    async fn age_room(state: &AppState, room_id: &RoomId, secs: i64) {
        let mut sessions = state.sessions.write().await;
        let session = sessions.get_mut(room_id).unwrap();
        session.last_activity = Utc::now() - chrono::Duration::seconds(secs);
    }

    async fn seed_room(state: &AppState, owner: &str) -> GameResult<crate::protocol::RoomView> {
        state
            .create_room(
                "Room",
                GameMode::Duel,
                Difficulty::Easy,
                &owner.to_string(),
                owner,
                2,
            )
            .await
    }

    #[tokio::test]
    async fn test_idle_room_fully_reaped() {
        let state = AppState::new();
        let view = seed_room(&state, "alice").await.unwrap();
        let joiner = "bob".to_string();
        state
            .join_room(&view.room.join_code, &joiner, "Bob")
            .await
            .unwrap();
        state
            .request_phase(
                &view.room.id,
                &"alice".to_string(),
                GamePhase::Waiting,
                GamePhase::Playing,
                None,
            )
            .await
            .unwrap();
        state
            .submit_entry(&view.room.id, &joiner, "a prompt", "img://1", 10.0)
            .await
            .unwrap();

        age_room(&state, &view.room.id, state.config.idle_grace_secs as i64 + 60).await;
        let report = state.reap_idle(CleanupTrigger::Scheduled).await;

        assert_eq!(report.cleaned_rooms, 1);
        assert_eq!(report.cleaned_sessions, 1);
        assert_eq!(report.cleaned_players, 2);
        assert_eq!(report.cleaned_submissions, 1);
        assert_eq!(report.cleaned_votes, 0);
        assert!(!report.cleanup_id.is_empty());

        assert!(state.room_view(&view.room.id).await.is_err());
        assert!(state.current_session(&view.room.id).await.is_none());
        assert!(state.events.subscribe(&view.room.id).await.is_none());
        assert!(state.submissions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_fresh_room_untouched_by_same_sweep() {
        let state = AppState::new();
        let stale = seed_room(&state, "alice").await.unwrap();
        let fresh = seed_room(&state, "bob").await.unwrap();

        age_room(&state, &stale.room.id, state.config.idle_grace_secs as i64 + 1).await;
        let report = state.reap_idle(CleanupTrigger::Scheduled).await;

        assert_eq!(report.cleaned_rooms, 1);
        assert!(state.room_view(&stale.room.id).await.is_err());
        assert!(state.room_view(&fresh.room.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_manual_trigger_reported() {
        let state = AppState::new();
        let report = state.reap_idle(CleanupTrigger::Manual).await;
        assert_eq!(report.trigger, CleanupTrigger::Manual);
        assert_eq!(report.cleaned_rooms, 0);
    }

    #[tokio::test]
    async fn test_activity_resets_the_clock() {
        let state = AppState::new();
        let view = seed_room(&state, "alice").await.unwrap();
        age_room(&state, &view.room.id, state.config.idle_grace_secs as i64 + 60).await;

        // A join inside the window makes the room live again
        state
            .join_room(&view.room.join_code, &"bob".to_string(), "Bob")
            .await
            .unwrap();

        let report = state.reap_idle(CleanupTrigger::Scheduled).await;
        assert_eq!(report.cleaned_rooms, 0);
        assert!(state.room_view(&view.room.id).await.is_ok());
    }
}
