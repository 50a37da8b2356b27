use super::session::apply_transition;
use super::AppState;
use crate::error::{GameError, GameResult};
use crate::protocol::RoomEvent;
use crate::types::*;
use chrono::Utc;
use std::collections::{HashMap, HashSet};

/// Distinct voters for a round. Departed players stay in this set; they
/// keep their vote but no longer gate completion.
fn round_voters(
    votes: &HashMap<VoteId, Vote>,
    room_id: &RoomId,
    round: u32,
) -> HashSet<UserId> {
    votes
        .values()
        .filter(|v| v.room_id == *room_id && v.round == round)
        .map(|v| v.voter_id.clone())
        .collect()
}

/// Completion rule: every *currently joined* player has voted this round.
pub(super) fn voting_complete(
    roster: &[Member],
    votes: &HashMap<VoteId, Vote>,
    room_id: &RoomId,
    round: u32,
) -> bool {
    if roster.is_empty() {
        return false;
    }
    let voters = round_voters(votes, room_id, round);
    roster.iter().all(|m| voters.contains(&m.user_id))
}

impl AppState {
    /// Record a vote. Re-voting overwrites the player's existing slot for
    /// the round (last vote counts); self-votes are rejected. The recount
    /// and the all-players-voted completion check run in the same critical
    /// section as the insert, so two racing last votes produce exactly one
    /// voting -> results transition.
    pub async fn cast_vote(
        &self,
        room_id: &RoomId,
        voter_id: &UserId,
        submission_id: &SubmissionId,
    ) -> GameResult<(Vote, VotingProgress)> {
        let now = Utc::now();
        let mut rooms = self.rooms.write().await;
        let members = self.members.read().await;
        let mut sessions = self.sessions.write().await;
        let submissions = self.submissions.read().await;
        let mut votes = self.votes.write().await;

        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| GameError::NotFound("room".into()))?;
        let roster = members
            .get(room_id)
            .ok_or_else(|| GameError::NotFound("room".into()))?;
        if !roster.iter().any(|m| m.user_id == *voter_id) {
            return Err(GameError::NotFound("room membership".into()));
        }
        let session = sessions
            .get_mut(room_id)
            .ok_or_else(|| GameError::NotFound("session".into()))?;
        if session.current_phase != GamePhase::Voting {
            return Err(GameError::Phase {
                phase: session.current_phase,
            });
        }
        let round = session.round;

        let submission = submissions
            .values()
            .find(|s| s.id == *submission_id && s.room_id == *room_id && s.round == round)
            .ok_or_else(|| GameError::NotFound("submission".into()))?;
        if submission.player_id == *voter_id {
            return Err(GameError::InvalidVote(
                "players cannot vote for their own submission".into(),
            ));
        }

        let vote = match votes
            .values_mut()
            .find(|v| v.room_id == *room_id && v.voter_id == *voter_id && v.round == round)
        {
            Some(existing) => {
                existing.submission_id = submission_id.clone();
                existing.created_at = now;
                existing.clone()
            }
            None => {
                let vote = Vote {
                    id: ulid::Ulid::new().to_string(),
                    room_id: room_id.clone(),
                    voter_id: voter_id.clone(),
                    round,
                    submission_id: submission_id.clone(),
                    created_at: now,
                };
                votes.insert(vote.id.clone(), vote.clone());
                vote
            }
        };

        let progress = VotingProgress {
            total_players: roster.len() as u32,
            voted_players: round_voters(&votes, room_id, round).len() as u32,
        };

        let completed = voting_complete(roster, &votes, room_id, round);
        if completed {
            apply_transition(room, session, GamePhase::Results, None, &self.config, now);
        } else {
            session.last_activity = now;
        }
        drop(votes);
        drop(submissions);
        drop(sessions);
        drop(members);
        drop(rooms);

        self.events
            .publish(RoomEvent::EntriesChanged {
                room_id: room_id.clone(),
            })
            .await;
        if completed {
            tracing::info!(room_id = %room_id, "all players voted, advancing to results");
            self.events
                .publish(RoomEvent::PhaseChanged {
                    room_id: room_id.clone(),
                    phase: GamePhase::Results,
                    reason: AdvanceReason::AllPlayersVoted,
                })
                .await;
        }

        Ok((vote, progress))
    }

    /// Current-round voting progress: distinct voters against the current
    /// roster size.
    pub async fn voting_progress(&self, room_id: &RoomId) -> GameResult<VotingProgress> {
        let members = self.members.read().await;
        let sessions = self.sessions.read().await;
        let votes = self.votes.read().await;

        let roster = members
            .get(room_id)
            .ok_or_else(|| GameError::NotFound("room".into()))?;
        let session = sessions
            .get(room_id)
            .ok_or_else(|| GameError::NotFound("session".into()))?;

        Ok(VotingProgress {
            total_players: roster.len() as u32,
            voted_players: round_voters(&votes, room_id, session.round).len() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RoomView;

    /// Three-player room in voting phase with one submission per player.
    /// Returns the view and each player's submission id.
    async fn voting_room(state: &AppState) -> (RoomView, HashMap<String, SubmissionId>) {
        let view = state
            .create_room(
                "Room",
                GameMode::Team,
                Difficulty::Easy,
                &"alice".to_string(),
                "Alice",
                4,
            )
            .await
            .unwrap();
        for (id, name) in [("bob", "Bob"), ("carol", "Carol")] {
            state
                .join_room(&view.room.join_code, &id.to_string(), name)
                .await
                .unwrap();
        }
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

        let mut by_player = HashMap::new();
        for player in ["alice", "bob", "carol"] {
            let submission = state
                .submit_entry(
                    &view.room.id,
                    &player.to_string(),
                    &format!("{player}'s prompt"),
                    &format!("img://{player}"),
                    50.0,
                )
                .await
                .unwrap();
            by_player.insert(player.to_string(), submission.id);
        }

        state
            .request_phase(
                &view.room.id,
                &"alice".to_string(),
                GamePhase::Playing,
                GamePhase::Voting,
                None,
            )
            .await
            .unwrap();
        (view, by_player)
    }

    #[tokio::test]
    async fn test_vote_requires_voting_phase() {
        let state = AppState::new();
        let view = state
            .create_room(
                "Room",
                GameMode::Duel,
                Difficulty::Easy,
                &"alice".to_string(),
                "Alice",
                2,
            )
            .await
            .unwrap();

        let err = state
            .cast_vote(&view.room.id, &"alice".to_string(), &"sub1".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "WRONG_PHASE");
    }

    #[tokio::test]
    async fn test_self_vote_rejected() {
        let state = AppState::new();
        let (view, subs) = voting_room(&state).await;

        let err = state
            .cast_vote(&view.room.id, &"alice".to_string(), &subs["alice"])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_VOTE");
    }

    #[tokio::test]
    async fn test_revote_overwrites_not_duplicates() {
        let state = AppState::new();
        let (view, subs) = voting_room(&state).await;

        let (_, progress) = state
            .cast_vote(&view.room.id, &"alice".to_string(), &subs["bob"])
            .await
            .unwrap();
        assert_eq!(progress.voted_players, 1);

        // Changing her mind keeps one vote on record; the last one counts
        let (vote, progress) = state
            .cast_vote(&view.room.id, &"alice".to_string(), &subs["carol"])
            .await
            .unwrap();
        assert_eq!(progress.voted_players, 1);
        assert_eq!(vote.submission_id, subs["carol"]);
        assert!(progress.voted_players <= progress.total_players);

        let tallies = state.round_submissions(&view.room.id).await.unwrap();
        let total_votes: u32 = tallies.iter().map(|t| t.votes_received).sum();
        assert_eq!(total_votes, 1);
    }

    #[tokio::test]
    async fn test_vote_for_unknown_submission() {
        let state = AppState::new();
        let (view, _) = voting_room(&state).await;

        let err = state
            .cast_vote(&view.room.id, &"alice".to_string(), &"no-such".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_non_member_cannot_vote() {
        let state = AppState::new();
        let (view, subs) = voting_room(&state).await;

        let err = state
            .cast_vote(&view.room.id, &"mallory".to_string(), &subs["alice"])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_all_votes_in_advances_to_results() {
        let state = AppState::new();
        let (view, subs) = voting_room(&state).await;

        state
            .cast_vote(&view.room.id, &"alice".to_string(), &subs["bob"])
            .await
            .unwrap();
        state
            .cast_vote(&view.room.id, &"bob".to_string(), &subs["carol"])
            .await
            .unwrap();

        // Not everyone has voted yet
        let session = state.current_session(&view.room.id).await.unwrap();
        assert_eq!(session.current_phase, GamePhase::Voting);

        state
            .cast_vote(&view.room.id, &"carol".to_string(), &subs["alice"])
            .await
            .unwrap();

        let session = state.current_session(&view.room.id).await.unwrap();
        assert_eq!(session.current_phase, GamePhase::Results);

        // A straggler vote after completion is a phase error, not a
        // second transition
        let err = state
            .cast_vote(&view.room.id, &"alice".to_string(), &subs["carol"])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "WRONG_PHASE");
    }

    #[tokio::test]
    async fn test_departure_during_voting_can_complete_round() {
        let state = AppState::new();
        let (view, subs) = voting_room(&state).await;

        state
            .cast_vote(&view.room.id, &"alice".to_string(), &subs["bob"])
            .await
            .unwrap();
        state
            .cast_vote(&view.room.id, &"bob".to_string(), &subs["alice"])
            .await
            .unwrap();

        // Carol never votes and leaves; the remaining roster has fully
        // voted, so her departure completes the round
        state
            .leave_room(&view.room.id, &"carol".to_string())
            .await
            .unwrap();

        let session = state.current_session(&view.room.id).await.unwrap();
        assert_eq!(session.current_phase, GamePhase::Results);
    }

    #[tokio::test]
    async fn test_departed_voter_still_counts_in_progress() {
        let state = AppState::new();
        let (view, subs) = voting_room(&state).await;

        state
            .cast_vote(&view.room.id, &"carol".to_string(), &subs["alice"])
            .await
            .unwrap();
        state
            .leave_room(&view.room.id, &"carol".to_string())
            .await
            .unwrap();

        let progress = state.voting_progress(&view.room.id).await.unwrap();
        assert_eq!(progress.total_players, 2);
        assert_eq!(progress.voted_players, 1);
    }
}
