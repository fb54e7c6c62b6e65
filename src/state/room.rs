use std::time::SystemTime;

use indexmap::IndexMap;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    dao::models::{
        PlayerEntity, QuestionEntity, RoomEntity, RoomMode, RoundResultEntity,
        TeamRoundResultEntity,
    },
    state::state_machine::RoomState,
};

/// Identity handed over by the external auth provider at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Stable user id.
    pub id: String,
    /// Display name.
    pub username: String,
}

impl UserIdentity {
    /// Build an identity from the provider-issued id and display name.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// Read-only room snapshot published to the UI layer.
///
/// Folds the document's per-player maps into the seat list so subscribers can
/// render a seat without chasing ids across maps.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    /// Room identifier (invite code for private rooms).
    pub id: String,
    /// How the room was opened.
    pub mode: RoomMode,
    /// User allowed to start the room, for private rooms.
    pub owner_id: Option<String>,
    /// Lifecycle state.
    pub state: RoomState,
    /// Current round, starting at 1.
    pub round_number: u32,
    /// Seats in join order.
    pub players: Vec<Player>,
    /// The two competing teams with their running scores folded in.
    pub teams: Vec<Team>,
    /// Question in play, while the room is `playing`.
    pub current_question: Option<Question>,
    /// Results of completed rounds.
    pub round_results: Vec<RoundResult>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 round-start timestamp, once a round started.
    pub started_at: Option<String>,
}

/// One seat of the room snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Stable player id.
    pub id: String,
    /// Display name.
    pub username: String,
    /// Team the player is seated on.
    pub team_id: String,
    /// Whether the seat is filled by a synthetic player.
    pub is_synthetic: bool,
    /// Whether this player has answered the current question.
    pub has_answered: bool,
}

/// Team view with the running score folded in from the score map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    /// Stable team id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display color.
    pub color: String,
    /// Member ids in seat order.
    pub player_ids: Vec<String>,
    /// Accumulated points.
    pub score: i64,
}

/// Question view shown while a round is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Stable question id.
    pub id: String,
    /// Question text.
    pub text: String,
    /// Seconds players have to answer.
    pub time_limit_secs: u32,
}

/// Per-team outcome of one completed round.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamRoundResult {
    /// Points awarded for the round.
    pub score: i64,
    /// Raw answer similarity in `[0, 1]`.
    pub similarity: f64,
    /// Submitted answers keyed by player id.
    pub answers: IndexMap<String, String>,
    /// Display names keyed by player id.
    pub player_names: IndexMap<String, String>,
}

/// Outcome of one completed round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResult {
    /// Round the result belongs to.
    pub round_number: u32,
    /// Question text captured at scoring time.
    pub question_text: String,
    /// Per-team outcome keyed by team id.
    pub team_results: IndexMap<String, TeamRoundResult>,
}

/// Render a system timestamp as RFC 3339 for snapshot consumers.
fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

impl From<&RoomEntity> for Room {
    fn from(entity: &RoomEntity) -> Self {
        let players = entity
            .players
            .iter()
            .map(|player| Player::from_entity(player, &entity.has_answered))
            .collect();
        let teams = entity
            .teams
            .iter()
            .map(|team| Team {
                id: team.id.clone(),
                name: team.name.clone(),
                color: team.color.clone(),
                player_ids: team.player_ids.clone(),
                score: entity.scores.get(&team.id).copied().unwrap_or_default(),
            })
            .collect();

        Self {
            id: entity.id.clone(),
            mode: entity.mode,
            owner_id: entity.owner_id.clone(),
            state: entity.state,
            round_number: entity.round_number,
            players,
            teams,
            current_question: entity.current_question.as_ref().map(Into::into),
            round_results: entity.round_results.iter().map(Into::into).collect(),
            created_at: format_system_time(entity.created_at),
            started_at: entity.started_at.map(format_system_time),
        }
    }
}

impl Player {
    fn from_entity(entity: &PlayerEntity, has_answered: &IndexMap<String, bool>) -> Self {
        Self {
            id: entity.id.clone(),
            username: entity.username.clone(),
            team_id: entity.team_id.clone(),
            is_synthetic: entity.is_synthetic,
            has_answered: has_answered.get(&entity.id).copied().unwrap_or_default(),
        }
    }
}

impl From<&QuestionEntity> for Question {
    fn from(entity: &QuestionEntity) -> Self {
        Self {
            id: entity.id.clone(),
            text: entity.text.clone(),
            time_limit_secs: entity.time_limit_secs,
        }
    }
}

impl From<&TeamRoundResultEntity> for TeamRoundResult {
    fn from(entity: &TeamRoundResultEntity) -> Self {
        Self {
            score: entity.score,
            similarity: entity.similarity,
            answers: entity.answers.clone(),
            player_names: entity.player_names.clone(),
        }
    }
}

impl From<&RoundResultEntity> for RoundResult {
    fn from(entity: &RoundResultEntity) -> Self {
        Self {
            round_number: entity.round_number,
            question_text: entity.question_text.clone(),
            team_results: entity
                .team_results
                .iter()
                .map(|(team_id, result)| (team_id.clone(), result.into()))
                .collect(),
        }
    }
}
