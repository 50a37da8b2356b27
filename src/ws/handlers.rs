//! WebSocket message dispatch
//!
//! Entry point for handling client messages. Every mutating call either
//! returns updated state or a typed Error the client can act on; the
//! room-scoped event subscription is managed by the socket loop based on
//! the RoomJoined/RoomLeft replies.

use crate::error::{GameError, GameResult};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::RoomId;
use std::sync::Arc;

use super::UserIdentity;

fn reply<T>(result: GameResult<T>, ok: impl FnOnce(T) -> ServerMessage) -> Option<ServerMessage> {
    match result {
        Ok(value) => Some(ok(value)),
        Err(err) => Some(ServerMessage::from_error(&err)),
    }
}

/// The room the user is currently in, required by room-scoped messages
async fn required_room(state: &Arc<AppState>, user: &UserIdentity) -> GameResult<RoomId> {
    state
        .active_room(&user.user_id)
        .await
        .ok_or_else(|| GameError::NotFound("room membership".into()))
}

/// Handle a client message and return the direct reply, if any
pub async fn handle_message(
    msg: ClientMessage,
    user: &UserIdentity,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::CreateRoom {
            name,
            game_mode,
            difficulty,
            max_players,
        } => reply(
            state
                .create_room(
                    &name,
                    game_mode,
                    difficulty,
                    &user.user_id,
                    &user.display_name,
                    max_players,
                )
                .await,
            |room| ServerMessage::RoomJoined { room },
        ),

        ClientMessage::JoinRoom { join_code } => reply(
            state
                .join_room(&join_code, &user.user_id, &user.display_name)
                .await,
            |room| ServerMessage::RoomJoined { room },
        ),

        ClientMessage::LeaveRoom => {
            let room_id = match required_room(state, user).await {
                Ok(room_id) => room_id,
                Err(err) => return Some(ServerMessage::from_error(&err)),
            };
            reply(
                state.leave_room(&room_id, &user.user_id).await,
                |_| ServerMessage::RoomLeft { room_id },
            )
        }

        ClientMessage::RequestPhase {
            expected_phase,
            new_phase,
            duration,
        } => {
            let room_id = match required_room(state, user).await {
                Ok(room_id) => room_id,
                Err(err) => return Some(ServerMessage::from_error(&err)),
            };
            reply(
                state
                    .request_phase(&room_id, &user.user_id, expected_phase, new_phase, duration)
                    .await,
                |session| ServerMessage::Phase {
                    room_id,
                    phase: session.current_phase,
                    reason: crate::types::AdvanceReason::Owner,
                    server_now: chrono::Utc::now(),
                    deadline: session.deadline(),
                },
            )
        }

        ClientMessage::GenerateImage { prompt } => {
            let Some(pipeline) = &state.images else {
                return Some(ServerMessage::Error {
                    code: "GENERATION_FAILED".to_string(),
                    msg: "image generation is not configured".to_string(),
                });
            };
            match pipeline.generate(&prompt).await {
                Ok(image) => Some(ServerMessage::ImageGenerated {
                    prompt,
                    image_url: image.url,
                }),
                // Generation failing is retryable, never fatal to the round
                Err(err) => {
                    tracing::warn!("image generation failed: {}", err);
                    Some(ServerMessage::Error {
                        code: "GENERATION_FAILED".to_string(),
                        msg: format!("{err}; you can try again"),
                    })
                }
            }
        }

        ClientMessage::SubmitEntry { prompt, image_url } => {
            let room_id = match required_room(state, user).await {
                Ok(room_id) => room_id,
                Err(err) => return Some(ServerMessage::from_error(&err)),
            };
            let accuracy_score = match (&state.images, state.room_view(&room_id).await) {
                (Some(pipeline), Ok(view)) => {
                    pipeline
                        .score_or_zero(&image_url, &view.room.target_image_url)
                        .await
                }
                _ => 0.0,
            };
            reply(
                state
                    .submit_entry(&room_id, &user.user_id, &prompt, &image_url, accuracy_score)
                    .await,
                |submission| ServerMessage::EntryAccepted { submission },
            )
        }

        ClientMessage::CastVote { submission_id } => {
            let room_id = match required_room(state, user).await {
                Ok(room_id) => room_id,
                Err(err) => return Some(ServerMessage::from_error(&err)),
            };
            reply(
                state.cast_vote(&room_id, &user.user_id, &submission_id).await,
                |(_, progress)| ServerMessage::VoteAccepted { room_id, progress },
            )
        }

        ClientMessage::GetSession => {
            let room_id = match required_room(state, user).await {
                Ok(room_id) => room_id,
                Err(err) => return Some(ServerMessage::from_error(&err)),
            };
            Some(ServerMessage::Session {
                session: state.current_session(&room_id).await,
            })
        }

        ClientMessage::GetSubmissions => {
            let room_id = match required_room(state, user).await {
                Ok(room_id) => room_id,
                Err(err) => return Some(ServerMessage::from_error(&err)),
            };
            reply(state.round_submissions(&room_id).await, |list| {
                ServerMessage::Submissions { list }
            })
        }

        ClientMessage::GetVotingProgress => {
            let room_id = match required_room(state, user).await {
                Ok(room_id) => room_id,
                Err(err) => return Some(ServerMessage::from_error(&err)),
            };
            reply(state.voting_progress(&room_id).await, |progress| {
                ServerMessage::Progress { progress }
            })
        }
    }
}
