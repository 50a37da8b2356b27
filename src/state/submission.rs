use super::AppState;
use crate::error::{GameError, GameResult};
use crate::protocol::RoomEvent;
use crate::types::*;
use chrono::Utc;

impl AppState {
    /// Record a player's entry for the current round. Players may iterate
    /// while the clock runs: re-submitting overwrites the same
    /// (room, player, round) slot and only the last entry goes to voting.
    pub async fn submit_entry(
        &self,
        room_id: &RoomId,
        player_id: &UserId,
        prompt: &str,
        image_url: &str,
        accuracy_score: f32,
    ) -> GameResult<Submission> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GameError::Validation("prompt must not be empty".into()));
        }
        if prompt.chars().count() > self.config.max_prompt_chars {
            return Err(GameError::Validation(format!(
                "prompt exceeds {} characters",
                self.config.max_prompt_chars
            )));
        }
        if accuracy_score < 0.0 {
            return Err(GameError::Validation(
                "accuracy score must be non-negative".into(),
            ));
        }

        let now = Utc::now();
        let members = self.members.read().await;
        let mut sessions = self.sessions.write().await;
        let mut submissions = self.submissions.write().await;

        let roster = members
            .get(room_id)
            .ok_or_else(|| GameError::NotFound("room".into()))?;
        if !roster.iter().any(|m| m.user_id == *player_id) {
            return Err(GameError::NotFound("room membership".into()));
        }
        let session = sessions
            .get_mut(room_id)
            .ok_or_else(|| GameError::NotFound("session".into()))?;
        if session.current_phase != GamePhase::Playing {
            return Err(GameError::Phase {
                phase: session.current_phase,
            });
        }

        let round = session.round;
        let submission = match submissions
            .values_mut()
            .find(|s| s.room_id == *room_id && s.player_id == *player_id && s.round == round)
        {
            Some(existing) => {
                existing.prompt = prompt.to_string();
                existing.image_url = image_url.to_string();
                existing.accuracy_score = accuracy_score;
                existing.created_at = now;
                existing.clone()
            }
            None => {
                let submission = Submission {
                    id: ulid::Ulid::new().to_string(),
                    room_id: room_id.clone(),
                    player_id: player_id.clone(),
                    round,
                    prompt: prompt.to_string(),
                    image_url: image_url.to_string(),
                    accuracy_score,
                    created_at: now,
                };
                submissions.insert(submission.id.clone(), submission.clone());
                submission
            }
        };

        session.last_activity = now;
        drop(submissions);
        drop(sessions);
        drop(members);

        self.events
            .publish(RoomEvent::EntriesChanged {
                room_id: room_id.clone(),
            })
            .await;

        tracing::debug!(room_id = %room_id, player_id = %player_id, "entry submitted");
        Ok(submission)
    }

    /// Current round's submissions with recounted vote tallies, oldest
    /// first. `votes_received` is always derived from the vote ledger.
    pub async fn round_submissions(&self, room_id: &RoomId) -> GameResult<Vec<SubmissionTally>> {
        let sessions = self.sessions.read().await;
        let submissions = self.submissions.read().await;
        let votes = self.votes.read().await;

        let session = sessions
            .get(room_id)
            .ok_or_else(|| GameError::NotFound("room".into()))?;
        let round = session.round;

        let mut list: Vec<SubmissionTally> = submissions
            .values()
            .filter(|s| s.room_id == *room_id && s.round == round)
            .map(|s| {
                let votes_received = votes
                    .values()
                    .filter(|v| v.submission_id == s.id)
                    .count() as u32;
                SubmissionTally {
                    submission: s.clone(),
                    votes_received,
                }
            })
            .collect();
        list.sort_by(|a, b| a.submission.created_at.cmp(&b.submission.created_at));
        Ok(list)
    }
}
