use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type RoomId = String;
pub type UserId = String;
pub type SubmissionId = String;
pub type VoteId = String;

/// The four phases a room cycles through. `waiting` is both the initial
/// state and the state a room returns to between rounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Waiting,
    Playing,
    Voting,
    Results,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Solo,
    Duel,
    Team,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Why a phase transition happened, surfaced to clients for UI messaging.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceReason {
    Owner,
    Timeout,
    AllPlayersVoted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub join_code: String,
    pub owner_id: UserId,
    pub game_mode: GameMode,
    pub difficulty: Difficulty,
    /// Mirrors the session's current phase
    pub status: GamePhase,
    pub target_image_url: String,
    pub max_players: u32,
    pub created_at: DateTime<Utc>,
}

/// A player's membership in a room. Join order is preserved so that the
/// earliest remaining joiner can inherit ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

/// Live phase-tracking state for a room. Exactly one per room; reset in
/// place (never recreated) when a round ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub room_id: RoomId,
    pub current_phase: GamePhase,
    pub phase_start_time: DateTime<Utc>,
    /// Seconds until the phase times out; 0 means no timeout
    pub phase_duration: u32,
    /// Increments on every waiting -> playing transition. Submissions and
    /// votes are tagged with this, so a new round starts clean.
    pub round: u32,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// The deterministic deadline for the current phase, if it has one.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        if self.phase_duration == 0 {
            return None;
        }
        Some(self.phase_start_time + chrono::Duration::seconds(self.phase_duration as i64))
    }

    /// Whether the phase deadline has elapsed at `now`.
    pub fn timed_out(&self, now: DateTime<Utc>) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub room_id: RoomId,
    pub player_id: UserId,
    pub round: u32,
    pub prompt: String,
    pub image_url: String,
    /// 0-100 similarity score from the external scorer; stored as given
    pub accuracy_score: f32,
    pub created_at: DateTime<Utc>,
}

/// A submission together with its recounted vote tally. `votes_received`
/// is derived from the vote ledger, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionTally {
    #[serde(flatten)]
    pub submission: Submission,
    pub votes_received: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub room_id: RoomId,
    pub voter_id: UserId,
    pub round: u32,
    pub submission_id: SubmissionId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VotingProgress {
    pub total_players: u32,
    pub voted_players: u32,
}

/// What triggered a cleanup sweep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CleanupTrigger {
    Scheduled,
    Manual,
}

/// Audit record for one reaper sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    pub cleanup_id: String,
    pub trigger: CleanupTrigger,
    pub cleaned_rooms: u32,
    pub cleaned_sessions: u32,
    pub cleaned_players: u32,
    pub cleaned_votes: u32,
    pub cleaned_submissions: u32,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Default duration of the playing phase in seconds
    pub playing_seconds: u32,
    /// How often the timeout sweep runs
    pub sweep_interval_secs: u64,
    /// How often the idle reaper runs
    pub reaper_interval_secs: u64,
    /// Rooms inactive for longer than this are reaped
    pub idle_grace_secs: u64,
    pub max_prompt_chars: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            playing_seconds: 180,
            sweep_interval_secs: 5,
            reaper_interval_secs: 60,
            idle_grace_secs: 1800,
            max_prompt_chars: 500,
        }
    }
}

impl GameConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
            std::env::var(key)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        }

        Self {
            playing_seconds: env_parse("PLAYING_SECONDS", defaults.playing_seconds),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECONDS", defaults.sweep_interval_secs),
            reaper_interval_secs: env_parse(
                "REAPER_INTERVAL_SECONDS",
                defaults.reaper_interval_secs,
            ),
            idle_grace_secs: env_parse("IDLE_GRACE_SECONDS", defaults.idle_grace_secs),
            max_prompt_chars: env_parse("MAX_PROMPT_CHARS", defaults.max_prompt_chars),
        }
    }

    /// Default duration for a phase when the owner doesn't provide one.
    /// Voting never has a duration-based timeout; results is open-ended
    /// unless the owner passes one explicitly.
    pub fn default_duration(&self, phase: GamePhase) -> u32 {
        match phase {
            GamePhase::Playing => self.playing_seconds,
            GamePhase::Waiting | GamePhase::Voting | GamePhase::Results => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GameConfig::default();
        assert_eq!(config.playing_seconds, 180);
        assert_eq!(config.default_duration(GamePhase::Playing), 180);
        assert_eq!(config.default_duration(GamePhase::Voting), 0);
        assert_eq!(config.default_duration(GamePhase::Results), 0);
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&GamePhase::Waiting).unwrap(),
            "\"waiting\""
        );
        assert_eq!(
            serde_json::to_string(&GamePhase::Results).unwrap(),
            "\"results\""
        );
    }

    #[test]
    fn test_session_deadline() {
        let now = Utc::now();
        let session = Session {
            room_id: "room".to_string(),
            current_phase: GamePhase::Playing,
            phase_start_time: now,
            phase_duration: 180,
            round: 1,
            last_activity: now,
        };

        assert!(!session.timed_out(now + chrono::Duration::seconds(179)));
        assert!(session.timed_out(now + chrono::Duration::seconds(181)));

        let untimed = Session {
            phase_duration: 0,
            ..session
        };
        assert_eq!(untimed.deadline(), None);
        assert!(!untimed.timed_out(now + chrono::Duration::days(1)));
    }
}
