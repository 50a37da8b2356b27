mod cleanup;
mod room;
mod session;
mod submission;
mod vote;

use crate::broadcast::RoomEvents;
use crate::imagegen::ImagePipeline;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state. Every room's session is independent; the
/// collections below are the single source of truth and conflicting writes
/// to the same session are serialized under the write locks.
///
/// Lock order (always acquired in this order, never the reverse):
/// rooms -> members -> sessions -> submissions -> votes.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<RoomId, Room>>>,
    /// Roster per room, in join order (earliest first)
    pub members: Arc<RwLock<HashMap<RoomId, Vec<Member>>>>,
    pub sessions: Arc<RwLock<HashMap<RoomId, Session>>>,
    pub submissions: Arc<RwLock<HashMap<SubmissionId, Submission>>>,
    pub votes: Arc<RwLock<HashMap<VoteId, Vote>>>,
    pub events: RoomEvents,
    pub config: GameConfig,
    pub images: Option<Arc<ImagePipeline>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::new_with_images(None, GameConfig::default())
    }

    pub fn new_with_images(images: Option<Arc<ImagePipeline>>, config: GameConfig) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            members: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            submissions: Arc::new(RwLock::new(HashMap::new())),
            votes: Arc::new(RwLock::new(HashMap::new())),
            events: RoomEvents::new(),
            config,
            images,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
