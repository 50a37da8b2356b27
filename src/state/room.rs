use super::session::apply_transition;
use super::vote::voting_complete;
use super::AppState;
use crate::error::{GameError, GameResult};
use crate::protocol::{RoomEvent, RoomView};
use crate::types::*;
use chrono::Utc;
use rand::prelude::*;

/// Join codes are short and human-typeable: uppercase base36, like the
/// codes players read off someone else's screen.
const JOIN_CODE_LEN: usize = 6;
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..JOIN_CODE_LEN)
        .map(|_| *JOIN_CODE_ALPHABET.choose(&mut rng).unwrap() as char)
        .collect()
}

/// Built-in target images, one pool per difficulty
const TARGET_IMAGES: &[(&str, Difficulty)] = &[
    (
        "https://images.unsplash.com/photo-1506744038136-46273834b3fb",
        Difficulty::Easy,
    ),
    (
        "https://images.unsplash.com/photo-1494790108377-be9c29b29330",
        Difficulty::Easy,
    ),
    (
        "https://images.unsplash.com/photo-1579546929518-9e396f3cc809",
        Difficulty::Medium,
    ),
    (
        "https://images.unsplash.com/photo-1513542789411-b6a5d4f31634",
        Difficulty::Medium,
    ),
    (
        "https://images.unsplash.com/photo-1533738363-b7f9aef128ce",
        Difficulty::Hard,
    ),
    (
        "https://images.unsplash.com/photo-1520288992255-dfb30894896b",
        Difficulty::Hard,
    ),
];

fn pick_target_image(difficulty: Difficulty) -> String {
    let pool: Vec<&str> = TARGET_IMAGES
        .iter()
        .filter(|(_, d)| *d == difficulty)
        .map(|(url, _)| *url)
        .collect();
    let mut rng = rand::rng();
    pool.choose(&mut rng)
        .expect("every difficulty has target images")
        .to_string()
}

impl AppState {
    /// Create a room, add the owner as its first member, and register the
    /// room's event channel.
    pub async fn create_room(
        &self,
        name: &str,
        game_mode: GameMode,
        difficulty: Difficulty,
        owner_id: &UserId,
        owner_name: &str,
        max_players: u32,
    ) -> GameResult<RoomView> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::Validation("room name must not be empty".into()));
        }
        let min_players = if game_mode == GameMode::Solo { 1 } else { 2 };
        if max_players < min_players {
            return Err(GameError::Validation(format!(
                "max_players must be at least {min_players} for this mode"
            )));
        }

        let now = Utc::now();
        let mut rooms = self.rooms.write().await;
        let mut members = self.members.write().await;
        let mut sessions = self.sessions.write().await;

        if let Some(room_id) = active_room_of(&members, owner_id) {
            return Err(GameError::RoomNotJoinable(format!(
                "already a member of room {room_id}"
            )));
        }

        // Collision-check the code against live rooms
        let mut join_code = generate_join_code();
        while rooms.values().any(|r| r.join_code == join_code) {
            join_code = generate_join_code();
        }

        let room = Room {
            id: ulid::Ulid::new().to_string(),
            name: name.to_string(),
            join_code,
            owner_id: owner_id.clone(),
            game_mode,
            difficulty,
            status: GamePhase::Waiting,
            target_image_url: pick_target_image(difficulty),
            max_players,
            created_at: now,
        };

        let owner = Member {
            user_id: owner_id.clone(),
            display_name: owner_name.to_string(),
            joined_at: now,
        };

        let session = Session {
            room_id: room.id.clone(),
            current_phase: GamePhase::Waiting,
            phase_start_time: now,
            phase_duration: 0,
            round: 0,
            last_activity: now,
        };

        rooms.insert(room.id.clone(), room.clone());
        members.insert(room.id.clone(), vec![owner.clone()]);
        sessions.insert(room.id.clone(), session);
        drop(sessions);
        drop(members);
        drop(rooms);

        self.events.register(&room.id).await;
        self.events
            .publish(RoomEvent::MembershipChanged {
                room_id: room.id.clone(),
            })
            .await;

        tracing::info!(room_id = %room.id, join_code = %room.join_code, "room created");

        Ok(RoomView {
            room,
            players: vec![owner],
        })
    }

    /// Join a room by its code. Codes resolve case-insensitively and only
    /// rooms still in `waiting` accept joins. Idempotent for players who
    /// are already members.
    pub async fn join_room(
        &self,
        join_code: &str,
        user_id: &UserId,
        display_name: &str,
    ) -> GameResult<RoomView> {
        let now = Utc::now();
        let mut rooms = self.rooms.write().await;
        let mut members = self.members.write().await;
        let mut sessions = self.sessions.write().await;

        let room = rooms
            .values_mut()
            .find(|r| r.join_code.eq_ignore_ascii_case(join_code.trim()))
            .ok_or_else(|| GameError::NotFound("room".into()))?;

        let roster = members.entry(room.id.clone()).or_default();

        // Already a member: return current state, no duplicate row
        if roster.iter().any(|m| m.user_id == *user_id) {
            let view = RoomView {
                room: room.clone(),
                players: roster.clone(),
            };
            return Ok(view);
        }

        if room.status != GamePhase::Waiting {
            return Err(GameError::RoomNotJoinable(
                "room is not accepting players mid-round".into(),
            ));
        }
        if roster.len() as u32 >= room.max_players {
            return Err(GameError::RoomFull);
        }
        if let Some(other) = active_room_of(&members, user_id) {
            return Err(GameError::RoomNotJoinable(format!(
                "already a member of room {other}"
            )));
        }

        // Re-borrow after the membership scan
        let roster = members.entry(room.id.clone()).or_default();
        roster.push(Member {
            user_id: user_id.clone(),
            display_name: display_name.to_string(),
            joined_at: now,
        });
        let view = RoomView {
            room: room.clone(),
            players: roster.clone(),
        };

        if let Some(session) = sessions.get_mut(&room.id) {
            session.last_activity = now;
        }
        drop(sessions);
        drop(members);
        drop(rooms);

        self.events
            .publish(RoomEvent::MembershipChanged {
                room_id: view.room.id.clone(),
            })
            .await;

        tracing::info!(room_id = %view.room.id, user_id = %user_id, "player joined");
        Ok(view)
    }

    /// Remove a player from a room. Returns Ok(false) when the user wasn't
    /// a member (no side effects). An owner leaving promotes the earliest
    /// remaining joiner; the last member leaving deletes the room.
    pub async fn leave_room(&self, room_id: &RoomId, user_id: &UserId) -> GameResult<bool> {
        let now = Utc::now();
        let mut rooms = self.rooms.write().await;
        let mut members = self.members.write().await;
        let mut sessions = self.sessions.write().await;

        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| GameError::NotFound("room".into()))?;
        let roster = match members.get_mut(room_id) {
            Some(r) => r,
            None => return Ok(false),
        };

        let before = roster.len();
        roster.retain(|m| m.user_id != *user_id);
        if roster.len() == before {
            return Ok(false);
        }

        let room_deleted = roster.is_empty();
        let mut completed_voting = false;
        if room_deleted {
            let mut submissions = self.submissions.write().await;
            let mut votes = self.votes.write().await;
            submissions.retain(|_, s| s.room_id != *room_id);
            votes.retain(|_, v| v.room_id != *room_id);
            members.remove(room_id);
            sessions.remove(room_id);
            rooms.remove(room_id);
        } else {
            if room.owner_id == *user_id {
                // Promote the earliest remaining joiner
                room.owner_id = roster[0].user_id.clone();
                tracing::info!(room_id = %room_id, new_owner = %room.owner_id, "ownership promoted");
            }
            if let Some(session) = sessions.get_mut(room_id) {
                session.last_activity = now;
                // A departure can be what completes the round: the
                // remaining roster may now have fully voted
                if session.current_phase == GamePhase::Voting {
                    let votes = self.votes.read().await;
                    if voting_complete(roster, &votes, room_id, session.round) {
                        apply_transition(
                            room,
                            session,
                            GamePhase::Results,
                            None,
                            &self.config,
                            now,
                        );
                        completed_voting = true;
                    }
                }
            }
        }
        drop(sessions);
        drop(members);
        drop(rooms);

        if room_deleted {
            self.events.remove(room_id).await;
            tracing::info!(room_id = %room_id, "room deleted after last player left");
        } else {
            self.events
                .publish(RoomEvent::MembershipChanged {
                    room_id: room_id.clone(),
                })
                .await;
            if completed_voting {
                tracing::info!(room_id = %room_id, "departure completed voting, advancing to results");
                self.events
                    .publish(RoomEvent::PhaseChanged {
                        room_id: room_id.clone(),
                        phase: GamePhase::Results,
                        reason: AdvanceReason::AllPlayersVoted,
                    })
                    .await;
            }
        }

        Ok(true)
    }

    /// Rooms in `waiting` with seats left, for the lobby list.
    pub async fn list_available_rooms(&self) -> Vec<RoomView> {
        let rooms = self.rooms.read().await;
        let members = self.members.read().await;
        rooms
            .values()
            .filter(|r| r.status == GamePhase::Waiting)
            .filter_map(|r| {
                let players = members.get(&r.id)?.clone();
                ((players.len() as u32) < r.max_players).then(|| RoomView {
                    room: r.clone(),
                    players,
                })
            })
            .collect()
    }

    pub async fn room_view(&self, room_id: &RoomId) -> GameResult<RoomView> {
        let rooms = self.rooms.read().await;
        let members = self.members.read().await;
        let room = rooms
            .get(room_id)
            .ok_or_else(|| GameError::NotFound("room".into()))?;
        Ok(RoomView {
            room: room.clone(),
            players: members.get(room_id).cloned().unwrap_or_default(),
        })
    }

    /// The room a user is currently a member of, if any.
    pub async fn active_room(&self, user_id: &UserId) -> Option<RoomId> {
        active_room_of(&*self.members.read().await, user_id)
    }
}

fn active_room_of(
    members: &std::collections::HashMap<RoomId, Vec<Member>>,
    user_id: &UserId,
) -> Option<RoomId> {
    members
        .iter()
        .find(|(_, roster)| roster.iter().any(|m| m.user_id == *user_id))
        .map(|(room_id, _)| room_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_room(state: &AppState, owner: &str) -> RoomView {
        state
            .create_room(
                "Test Room",
                GameMode::Duel,
                Difficulty::Easy,
                &owner.to_string(),
                owner,
                2,
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_join_code_shape() {
        let code = generate_join_code();
        assert_eq!(code.len(), JOIN_CODE_LEN);
        assert!(code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
    }

    #[test]
    fn test_target_pool_covers_all_difficulties() {
        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            assert!(!pick_target_image(difficulty).is_empty());
        }
    }

    #[tokio::test]
    async fn test_create_room_validations() {
        let state = AppState::new();

        let err = state
            .create_room(
                "  ",
                GameMode::Duel,
                Difficulty::Easy,
                &"u1".to_string(),
                "u1",
                4,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");

        let err = state
            .create_room(
                "Room",
                GameMode::Team,
                Difficulty::Easy,
                &"u1".to_string(),
                "u1",
                1,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");

        // Solo mode allows a single seat
        assert!(state
            .create_room(
                "Room",
                GameMode::Solo,
                Difficulty::Easy,
                &"u1".to_string(),
                "u1",
                1,
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_join_is_case_insensitive_and_idempotent() {
        let state = AppState::new();
        let view = make_room(&state, "alice").await;

        let joined = state
            .join_room(
                &view.room.join_code.to_lowercase(),
                &"bob".to_string(),
                "Bob",
            )
            .await
            .unwrap();
        assert_eq!(joined.players.len(), 2);

        // Joining again returns current state without duplicating the row
        let again = state
            .join_room(&view.room.join_code, &"bob".to_string(), "Bob")
            .await
            .unwrap();
        assert_eq!(again.players.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity_enforced() {
        let state = AppState::new();
        let view = make_room(&state, "alice").await;

        state
            .join_room(&view.room.join_code, &"bob".to_string(), "Bob")
            .await
            .unwrap();
        let err = state
            .join_room(&view.room.join_code, &"carol".to_string(), "Carol")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ROOM_FULL");

        let roster = state.room_view(&view.room.id).await.unwrap().players;
        assert!(roster.len() as u32 <= view.room.max_players);
    }

    #[tokio::test]
    async fn test_one_active_room_per_user() {
        let state = AppState::new();
        let first = make_room(&state, "alice").await;
        state
            .join_room(&first.room.join_code, &"bob".to_string(), "Bob")
            .await
            .unwrap();

        // Bob can neither create nor join a second room while active
        let err = state
            .create_room(
                "Second",
                GameMode::Duel,
                Difficulty::Easy,
                &"bob".to_string(),
                "Bob",
                2,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ROOM_NOT_JOINABLE");

        let other = state
            .create_room(
                "Other",
                GameMode::Duel,
                Difficulty::Easy,
                &"carol".to_string(),
                "Carol",
                2,
            )
            .await
            .unwrap();
        let err = state
            .join_room(&other.room.join_code, &"bob".to_string(), "Bob")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ROOM_NOT_JOINABLE");
    }

    #[tokio::test]
    async fn test_owner_leave_promotes_earliest_joiner() {
        let state = AppState::new();
        let view = state
            .create_room(
                "Room",
                GameMode::Team,
                Difficulty::Medium,
                &"alice".to_string(),
                "Alice",
                4,
            )
            .await
            .unwrap();
        state
            .join_room(&view.room.join_code, &"bob".to_string(), "Bob")
            .await
            .unwrap();
        state
            .join_room(&view.room.join_code, &"carol".to_string(), "Carol")
            .await
            .unwrap();

        assert!(state
            .leave_room(&view.room.id, &"alice".to_string())
            .await
            .unwrap());

        let room = state.room_view(&view.room.id).await.unwrap().room;
        assert_eq!(room.owner_id, "bob");
    }

    #[tokio::test]
    async fn test_last_leave_deletes_room() {
        let state = AppState::new();
        let view = make_room(&state, "alice").await;
        let room_id = view.room.id.clone();

        assert!(state
            .leave_room(&room_id, &"alice".to_string())
            .await
            .unwrap());
        assert!(state.room_view(&room_id).await.is_err());
        assert!(state.events.subscribe(&room_id).await.is_none());
    }

    #[tokio::test]
    async fn test_leave_when_not_member_is_silent() {
        let state = AppState::new();
        let view = make_room(&state, "alice").await;

        let left = state
            .leave_room(&view.room.id, &"stranger".to_string())
            .await
            .unwrap();
        assert!(!left);
        assert_eq!(state.room_view(&view.room.id).await.unwrap().players.len(), 1);
    }
}
